use std::time::Duration;

/// Minimum pixel count (h*w) to use channel-level Rayon parallelism.
pub const PARALLEL_PIXEL_THRESHOLD: usize = 65_536;

/// Minimum surviving sample pairs for a per-channel linear fit.
pub const MIN_FIT_SAMPLES: usize = 3;

/// Default lower rejection bound for linear fit samples (exclusive).
pub const DEFAULT_REJECT_LOW: f32 = 0.0;

/// Default upper rejection bound for linear fit samples (exclusive).
pub const DEFAULT_REJECT_HIGH: f32 = 0.92;

/// Default clamping threshold for bicubic spline and Lanczos interpolation.
pub const DEFAULT_CLAMPING_THRESHOLD: f32 = 0.3;

/// Offset between drizzle integration and star alignment pixel coordinates.
pub const DRIZZLE_PIXEL_CENTER_SHIFT: f64 = 0.5;

/// Coordinator wait when no slot is ready and no frame is pending.
pub const SCHEDULER_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Determinants below this magnitude are treated as singular.
pub const SINGULAR_EPSILON: f64 = 1e-15;

/// Default output postfix appended to comet-aligned frames.
pub const DEFAULT_OUTPUT_POSTFIX: &str = "_ca";

/// Default output file extension.
pub const DEFAULT_OUTPUT_EXTENSION: &str = ".tif";

/// Postfix of the optional star-aligned drizzle intermediate.
pub const STAR_ALIGNED_POSTFIX: &str = "_sa";

/// Postfix of the optional comet-aligned drizzle intermediate.
pub const COMET_ALIGNED_POSTFIX: &str = "_ca";

/// Extension of drizzle metadata companion files.
pub const DRIZZLE_EXTENSION: &str = "drz";
