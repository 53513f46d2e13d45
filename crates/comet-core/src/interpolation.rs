//! Pixel interpolation kernels used by the resampler.
//!
//! Samples outside the image replicate the nearest edge pixel. The cubic
//! filters share one Mitchell-Netravali family kernel parameterized by
//! `(B, C)`; Lanczos kernels are normalized so their weights sum to one.

use std::f64::consts::PI;

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::consts::DEFAULT_CLAMPING_THRESHOLD;
use crate::image::Sample;

/// Interpolation algorithm selectable in the configuration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum PixelInterpolation {
    NearestNeighbor,
    Bilinear,
    /// Catmull-Rom cubic spline with linear clamping.
    #[default]
    BicubicSpline,
    BicubicBSpline,
    Lanczos3,
    Lanczos4,
    Lanczos5,
    MitchellNetravali,
    CatmullRom,
    CubicBSpline,
}

impl std::fmt::Display for PixelInterpolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NearestNeighbor => write!(f, "Nearest Neighbor"),
            Self::Bilinear => write!(f, "Bilinear"),
            Self::BicubicSpline => write!(f, "Bicubic Spline"),
            Self::BicubicBSpline => write!(f, "Bicubic B-Spline"),
            Self::Lanczos3 => write!(f, "Lanczos-3"),
            Self::Lanczos4 => write!(f, "Lanczos-4"),
            Self::Lanczos5 => write!(f, "Lanczos-5"),
            Self::MitchellNetravali => write!(f, "Mitchell-Netravali Filter"),
            Self::CatmullRom => write!(f, "Catmull-Rom Spline Filter"),
            Self::CubicBSpline => write!(f, "Cubic B-Spline Filter"),
        }
    }
}

impl PixelInterpolation {
    pub const ALL: [PixelInterpolation; 10] = [
        Self::NearestNeighbor,
        Self::Bilinear,
        Self::BicubicSpline,
        Self::BicubicBSpline,
        Self::Lanczos3,
        Self::Lanczos4,
        Self::Lanczos5,
        Self::MitchellNetravali,
        Self::CatmullRom,
        Self::CubicBSpline,
    ];

    /// Whether the kernel passes exactly through the sample values.
    pub fn is_interpolating(&self) -> bool {
        !matches!(
            self,
            Self::BicubicBSpline | Self::MitchellNetravali | Self::CubicBSpline
        )
    }

    fn kernel(&self) -> Kernel {
        match self {
            Self::NearestNeighbor => Kernel::Nearest,
            Self::Bilinear => Kernel::Bilinear,
            Self::BicubicSpline | Self::CatmullRom => Kernel::Cubic { b: 0.0, c: 0.5 },
            Self::BicubicBSpline | Self::CubicBSpline => Kernel::Cubic { b: 1.0, c: 0.0 },
            Self::MitchellNetravali => Kernel::Cubic {
                b: 1.0 / 3.0,
                c: 1.0 / 3.0,
            },
            Self::Lanczos3 => Kernel::Lanczos(3),
            Self::Lanczos4 => Kernel::Lanczos(4),
            Self::Lanczos5 => Kernel::Lanczos(5),
        }
    }

    /// Effective clamping threshold for this method, if clamping applies.
    fn clamping(&self, threshold: f32) -> Option<f64> {
        match self {
            Self::BicubicSpline => Some(threshold as f64),
            // Clamping is disabled for Lanczos when the threshold is 1.
            Self::Lanczos3 | Self::Lanczos4 | Self::Lanczos5 if threshold < 1.0 => {
                Some(threshold as f64)
            }
            _ => None,
        }
    }
}

/// Interpolation method plus its tuning, fixed for the duration of a run.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct InterpolationConfig {
    #[serde(default)]
    pub method: PixelInterpolation,
    /// Neighbor differences above this (normalized) value make bicubic
    /// spline and Lanczos fall back to linear interpolation.
    #[serde(default = "default_clamping_threshold")]
    pub clamping_threshold: f32,
}

fn default_clamping_threshold() -> f32 {
    DEFAULT_CLAMPING_THRESHOLD
}

impl Default for InterpolationConfig {
    fn default() -> Self {
        Self {
            method: PixelInterpolation::default(),
            clamping_threshold: DEFAULT_CLAMPING_THRESHOLD,
        }
    }
}

impl InterpolationConfig {
    pub fn new(method: PixelInterpolation) -> Self {
        Self {
            method,
            ..Default::default()
        }
    }

    /// Build an interpolator over one channel.
    pub fn interpolator<'a, S: Sample>(&self, data: &'a Array2<S>) -> Interpolator<'a, S> {
        Interpolator {
            data,
            kernel: self.method.kernel(),
            clamp: self
                .method
                .clamping(self.clamping_threshold)
                .map(|t| t * S::full_scale()),
        }
    }
}

/// Widest footprint of any kernel: Lanczos-5 spans 10 samples per axis.
const MAX_TAPS: usize = 10;

#[derive(Clone, Copy, Debug)]
enum Kernel {
    Nearest,
    Bilinear,
    Cubic { b: f64, c: f64 },
    Lanczos(usize),
}

impl Kernel {
    fn radius(&self) -> usize {
        match self {
            Kernel::Nearest | Kernel::Bilinear => 1,
            Kernel::Cubic { .. } => 2,
            Kernel::Lanczos(a) => *a,
        }
    }

    fn weight(&self, x: f64) -> f64 {
        match *self {
            Kernel::Cubic { b, c } => mitchell_netravali(x, b, c),
            Kernel::Lanczos(a) => lanczos(x, a as f64),
            Kernel::Nearest | Kernel::Bilinear => (1.0 - x.abs()).max(0.0),
        }
    }
}

/// Mitchell-Netravali cubic family. `(0, 0.5)` is Catmull-Rom, `(1, 0)` is
/// the cubic B-spline.
fn mitchell_netravali(x: f64, b: f64, c: f64) -> f64 {
    let x = x.abs();
    let v = if x < 1.0 {
        (12.0 - 9.0 * b - 6.0 * c) * x * x * x + (-18.0 + 12.0 * b + 6.0 * c) * x * x
            + (6.0 - 2.0 * b)
    } else if x < 2.0 {
        (-b - 6.0 * c) * x * x * x + (6.0 * b + 30.0 * c) * x * x + (-12.0 * b - 48.0 * c) * x
            + (8.0 * b + 24.0 * c)
    } else {
        0.0
    };
    v / 6.0
}

fn lanczos(x: f64, a: f64) -> f64 {
    if x.abs() < 1e-12 {
        return 1.0;
    }
    if x.abs() >= a {
        return 0.0;
    }
    let pi_x = PI * x;
    let pi_x_a = pi_x / a;
    (pi_x.sin() / pi_x) * (pi_x_a.sin() / pi_x_a)
}

/// Samples one channel at fractional coordinates.
pub struct Interpolator<'a, S: Sample> {
    data: &'a Array2<S>,
    kernel: Kernel,
    /// Clamping threshold in native sample units.
    clamp: Option<f64>,
}

impl<S: Sample> Interpolator<'_, S> {
    /// Interpolated value at column `x`, row `y`.
    pub fn sample(&self, x: f64, y: f64) -> S {
        let v = match self.kernel {
            Kernel::Nearest => self.pixel(x.round() as i64, y.round() as i64),
            Kernel::Bilinear => self.bilinear(x, y),
            _ => self.separable(x, y),
        };
        S::from_f64(v)
    }

    fn pixel(&self, col: i64, row: i64) -> f64 {
        let (h, w) = self.data.dim();
        let r = row.clamp(0, h as i64 - 1) as usize;
        let c = col.clamp(0, w as i64 - 1) as usize;
        self.data[[r, c]].to_f64()
    }

    fn bilinear(&self, x: f64, y: f64) -> f64 {
        let x0 = x.floor() as i64;
        let y0 = y.floor() as i64;
        let fx = x - x0 as f64;
        let fy = y - y0 as f64;

        let p00 = self.pixel(x0, y0);
        let p10 = self.pixel(x0 + 1, y0);
        let p01 = self.pixel(x0, y0 + 1);
        let p11 = self.pixel(x0 + 1, y0 + 1);

        let top = p00 + fx * (p10 - p00);
        let bottom = p01 + fx * (p11 - p01);
        top + fy * (bottom - top)
    }

    /// Normalized kernel weights for the `2 * radius` taps around `frac`.
    fn weights(&self, frac: f64) -> [f64; MAX_TAPS] {
        let r = self.kernel.radius() as i64;
        let mut w = [0.0; MAX_TAPS];
        for (i, v) in w.iter_mut().take(2 * r as usize).enumerate() {
            *v = self.kernel.weight(frac - (i as i64 - r + 1) as f64);
        }
        let sum: f64 = w.iter().sum();
        if sum.abs() > 1e-12 {
            w.iter_mut().for_each(|v| *v /= sum);
        }
        w
    }

    fn separable(&self, x: f64, y: f64) -> f64 {
        let r = self.kernel.radius() as i64;
        let taps = 2 * r as usize;
        let x0 = x.floor() as i64;
        let y0 = y.floor() as i64;
        let fx = x - x0 as f64;
        let fy = y - y0 as f64;
        let wx = self.weights(fx);
        let wy = self.weights(fy);

        let mut row_values = [0.0; MAX_TAPS];
        let mut samples = [0.0; MAX_TAPS];
        for (j, row_value) in row_values.iter_mut().take(taps).enumerate() {
            let py = y0 - r + 1 + j as i64;
            for (i, s) in samples.iter_mut().take(taps).enumerate() {
                *s = self.pixel(x0 - r + 1 + i as i64, py);
            }
            *row_value = self.combine(&samples[..taps], &wx[..taps], fx);
        }
        self.combine(&row_values[..taps], &wy[..taps], fy)
    }

    /// Weighted sum of a 1-D footprint, falling back to linear interpolation
    /// between the two central samples when neighbors jump more than the
    /// clamping threshold.
    fn combine(&self, samples: &[f64], weights: &[f64], frac: f64) -> f64 {
        if let Some(threshold) = self.clamp {
            let jumps = samples.windows(2).any(|p| (p[1] - p[0]).abs() > threshold);
            if jumps {
                let mid = samples.len() / 2 - 1;
                return samples[mid] + frac * (samples[mid + 1] - samples[mid]);
            }
        }
        samples.iter().zip(weights).map(|(s, w)| s * w).sum()
    }
}
