use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::consts::{
    DEFAULT_OUTPUT_EXTENSION, DEFAULT_OUTPUT_POSTFIX, DEFAULT_REJECT_HIGH, DEFAULT_REJECT_LOW,
};
use crate::error::{CometError, Result};
use crate::frame::FrameDescriptor;
use crate::interpolation::InterpolationConfig;

/// Everything a comet alignment run needs.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AlignmentConfig {
    #[serde(default)]
    pub targets: Vec<FrameDescriptor>,
    /// Index into `targets` of the frame whose comet position is the origin.
    #[serde(default)]
    pub reference: usize,
    #[serde(default)]
    pub output: OutputConfig,
    pub operand: Option<OperandConfig>,
    #[serde(default)]
    pub drizzle: DrizzleOutputConfig,
    #[serde(default)]
    pub interpolation: InterpolationConfig,
    /// Upper bound on worker slots. Defaults to the rayon thread count.
    pub threads: Option<usize>,
}

impl Default for AlignmentConfig {
    fn default() -> Self {
        Self {
            targets: Vec::new(),
            reference: 0,
            output: OutputConfig::default(),
            operand: None,
            drizzle: DrizzleOutputConfig::default(),
            interpolation: InterpolationConfig::default(),
            threads: None,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Empty means "next to each source file".
    #[serde(default)]
    pub directory: PathBuf,
    #[serde(default)]
    pub prefix: String,
    #[serde(default = "default_postfix")]
    pub postfix: String,
    #[serde(default = "default_extension")]
    pub extension: String,
    #[serde(default)]
    pub overwrite: bool,
}

fn default_postfix() -> String {
    DEFAULT_OUTPUT_POSTFIX.to_string()
}

fn default_extension() -> String {
    DEFAULT_OUTPUT_EXTENSION.to_string()
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::new(),
            prefix: String::new(),
            postfix: default_postfix(),
            extension: default_extension(),
            overwrite: false,
        }
    }
}

/// Image subtracted from every target.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OperandConfig {
    pub path: PathBuf,
    /// `true`: the operand is a comet integration, moved to each frame's
    /// comet position and subtracted (star-aligned output).
    /// `false`: the operand is a star integration, subtracted before the
    /// target is moved to the comet position (comet-aligned output).
    #[serde(default = "default_true")]
    pub subtract_mode: bool,
    /// The operand was produced by drizzle integration and uses its pixel
    /// coordinate convention.
    #[serde(default)]
    pub drizzle_integration: bool,
    #[serde(default = "default_true")]
    pub normalize: bool,
    #[serde(default)]
    pub linear_fit: LinearFitConfig,
}

fn default_true() -> bool {
    true
}

impl OperandConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            subtract_mode: true,
            drizzle_integration: false,
            normalize: true,
            linear_fit: LinearFitConfig::default(),
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct LinearFitConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_reject_low")]
    pub reject_low: f32,
    #[serde(default = "default_reject_high")]
    pub reject_high: f32,
}

fn default_reject_low() -> f32 {
    DEFAULT_REJECT_LOW
}

fn default_reject_high() -> f32 {
    DEFAULT_REJECT_HIGH
}

impl Default for LinearFitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            reject_low: DEFAULT_REJECT_LOW,
            reject_high: DEFAULT_REJECT_HIGH,
        }
    }
}

/// Optional drizzle intermediates written alongside the reconstructed
/// drizzle source.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct DrizzleOutputConfig {
    #[serde(default)]
    pub save_star_aligned: bool,
    #[serde(default)]
    pub save_comet_aligned: bool,
}

impl AlignmentConfig {
    /// Check that a run can start, including that every input file exists.
    pub fn validate(&self) -> Result<()> {
        self.validate_settings()?;
        let dir = &self.output.directory;
        if !dir.as_os_str().is_empty() && !dir.is_dir() {
            return Err(CometError::Config(format!(
                "The specified output directory does not exist: {}",
                dir.display()
            )));
        }
        if let Some(operand) = &self.operand {
            if !operand.path.is_file() {
                return Err(CometError::Config(format!(
                    "The specified operand file does not exist: {}",
                    operand.path.display()
                )));
            }
        }
        if let Some(missing) = self
            .targets
            .iter()
            .find(|t| t.enabled && !t.path.is_file())
        {
            return Err(CometError::Config(format!(
                "File not found: {}",
                missing.path.display()
            )));
        }
        Ok(())
    }

    /// The checks of [`validate`](Self::validate) that do not touch the
    /// filesystem.
    pub fn validate_settings(&self) -> Result<()> {
        if self.targets.is_empty() {
            return Err(CometError::Config(
                "No target frames have been specified".into(),
            ));
        }
        if self.reference >= self.targets.len() {
            return Err(CometError::Config(format!(
                "Reference frame index {} is out of range (0..{})",
                self.reference,
                self.targets.len()
            )));
        }
        if let Some(operand) = &self.operand {
            let fit = &operand.linear_fit;
            let in_unit = |v: f32| (0.0..=1.0).contains(&v);
            if !in_unit(fit.reject_low) || !in_unit(fit.reject_high) || fit.reject_low >= fit.reject_high {
                return Err(CometError::Config(format!(
                    "Invalid linear fit rejection bounds: low {}, high {}",
                    fit.reject_low, fit.reject_high
                )));
            }
        }
        if !(0.0..=1.0).contains(&self.interpolation.clamping_threshold) {
            return Err(CometError::Config(format!(
                "Clamping threshold must be in [0, 1], got {}",
                self.interpolation.clamping_threshold
            )));
        }
        if self.threads == Some(0) {
            return Err(CometError::Config("threads must be at least 1".into()));
        }
        Ok(())
    }

    /// Whether an operand image takes part in the run.
    pub fn has_operand(&self) -> bool {
        self.operand.is_some()
    }
}
