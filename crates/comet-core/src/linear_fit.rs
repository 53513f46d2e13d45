//! Per-channel photometric matching between two images.
//!
//! The regression minimizes absolute deviations, so stars and hot pixels
//! that survive the rejection bounds barely move the fitted line.

use rayon::prelude::*;
use tracing::debug;

use crate::consts::{MIN_FIT_SAMPLES, PARALLEL_PIXEL_THRESHOLD};
use crate::error::{CometError, Result};
use crate::image::{Image, PixelBuffer, Sample};
use crate::with_image;

/// `y = intercept + slope * x` with its mean absolute deviation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LinearFit {
    pub intercept: f64,
    pub slope: f64,
    pub adev: f64,
}

impl LinearFit {
    /// Least absolute deviation fit of `y` against `x`.
    ///
    /// Starts from the least squares solution and then brackets and bisects
    /// the root of the L1 normal equation in the slope.
    pub fn fit(x: &[f64], y: &[f64]) -> Self {
        let n = x.len().min(y.len());
        let (x, y) = (&x[..n], &y[..n]);
        if n == 0 {
            return Self {
                intercept: f64::NAN,
                slope: f64::NAN,
                adev: f64::NAN,
            };
        }
        let nf = n as f64;

        let sx: f64 = x.iter().sum();
        let sy: f64 = y.iter().sum();
        let sxy: f64 = x.iter().zip(y).map(|(a, b)| a * b).sum();
        let sxx: f64 = x.iter().map(|a| a * a).sum();
        let del = nf * sxx - sx * sx;

        let mut bb = (nf * sxy - sx * sy) / del;
        let aa = (sy - bb * sx) / nf;
        let chisq: f64 = x
            .iter()
            .zip(y)
            .map(|(xi, yi)| {
                let r = yi - (aa + bb * xi);
                r * r
            })
            .sum();
        let mut sigb = (chisq / del).sqrt();

        let mut residuals = vec![0.0; n];
        let mut b1 = bb;
        let (mut f1, mut a, mut abdev) = rofunc(x, y, b1, &mut residuals);

        if sigb > 0.0 && sigb.is_finite() {
            let mut b2 = bb + (3.0 * sigb).copysign(f1);
            let (mut f2, a2, d2) = rofunc(x, y, b2, &mut residuals);
            if b2 == b1 {
                return Self {
                    intercept: a2,
                    slope: b2,
                    adev: d2 / nf,
                };
            }
            (a, abdev) = (a2, d2);
            bb = b2;

            while f1 * f2 > 0.0 {
                bb = b2 + 1.6 * (b2 - b1);
                b1 = b2;
                f1 = f2;
                b2 = bb;
                (f2, a, abdev) = rofunc(x, y, b2, &mut residuals);
                if !bb.is_finite() {
                    break;
                }
            }

            sigb *= 0.01;
            while (b2 - b1).abs() > sigb {
                bb = b1 + 0.5 * (b2 - b1);
                if bb == b1 || bb == b2 {
                    break;
                }
                let (f, fa, fd) = rofunc(x, y, bb, &mut residuals);
                (a, abdev) = (fa, fd);
                if f * f1 >= 0.0 {
                    f1 = f;
                    b1 = bb;
                } else {
                    b2 = bb;
                }
            }
        }

        Self {
            intercept: a,
            slope: bb,
            adev: abdev / nf,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.intercept.is_finite() && self.slope.is_finite() && self.adev.is_finite()
    }

    pub fn eval(&self, x: f64) -> f64 {
        self.intercept + self.slope * x
    }

    /// Human readable function and deviation lines for channel `c`.
    pub fn describe(&self, c: usize) -> [String; 2] {
        let sign = if self.slope < 0.0 { '-' } else { '+' };
        [
            format!(
                "y{c} = {:+.6} {sign} {:.6} * x{c}",
                self.intercept,
                self.slope.abs()
            ),
            format!("sigma{c} = {:+.6}", self.adev),
        ]
    }
}

/// Sign of the L1 normal equation for slope `b`, plus the matching
/// intercept (median of residuals) and total absolute deviation.
fn rofunc(x: &[f64], y: &[f64], b: f64, residuals: &mut [f64]) -> (f64, f64, f64) {
    for ((r, xi), yi) in residuals.iter_mut().zip(x).zip(y) {
        *r = yi - b * xi;
    }
    let a = median_in_place(residuals);

    let mut sum = 0.0;
    let mut abdev = 0.0;
    for (xi, yi) in x.iter().zip(y) {
        let mut d = yi - (b * xi + a);
        abdev += d.abs();
        if *yi != 0.0 {
            d /= yi.abs();
        }
        if d.abs() > f64::EPSILON {
            sum += if d >= 0.0 { *xi } else { -xi };
        }
    }
    (sum, a, abdev)
}

fn median_in_place(values: &mut [f64]) -> f64 {
    let n = values.len();
    let mid = n / 2;
    let (lower, upper, _) = values.select_nth_unstable_by(mid, f64::total_cmp);
    if n % 2 == 1 {
        *upper
    } else {
        let below = lower.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        (below + *upper) / 2.0
    }
}

/// Fits one image onto another's photometric scale.
#[derive(Clone, Copy, Debug)]
pub struct LinearFitEngine {
    reject_low: f64,
    reject_high: f64,
}

impl LinearFitEngine {
    /// Samples outside the open interval `(reject_low, reject_high)` of the
    /// normalized range are ignored by [`fit`](Self::fit).
    pub fn new(reject_low: f32, reject_high: f32) -> Self {
        Self {
            reject_low: reject_low as f64,
            reject_high: reject_high as f64,
        }
    }

    /// One fit per channel of `sample`, mapping `sample` values onto
    /// `reference` values at the same pixel.
    pub fn fit(&self, sample: &PixelBuffer, reference: &PixelBuffer) -> Result<Vec<LinearFit>> {
        if sample.geometry() != reference.geometry() {
            let (width, height) = sample.geometry();
            let (actual_width, actual_height) = reference.geometry();
            return Err(CometError::GeometryMismatch {
                width,
                height,
                actual_width,
                actual_height,
            });
        }
        let fits = with_image!(sample, s => with_image!(reference, r => self.fit_image(s, r)))?;
        for (c, fit) in fits.iter().enumerate() {
            debug!(
                channel = c,
                intercept = fit.intercept,
                slope = fit.slope,
                adev = fit.adev,
                "linear fit"
            );
        }
        Ok(fits)
    }

    fn fit_image<S: Sample, T: Sample>(
        &self,
        sample: &Image<S>,
        reference: &Image<T>,
    ) -> Result<Vec<LinearFit>> {
        let last = reference.num_channels() - 1;
        let fit_channel = |c: usize| -> Result<LinearFit> {
            let (x, y) = self.collect_pairs(sample, reference, c, c.min(last));
            if x.len() < MIN_FIT_SAMPLES {
                return Err(CometError::InsufficientData { channel: c });
            }
            let fit = LinearFit::fit(&x, &y);
            if !fit.is_valid() {
                return Err(CometError::InvalidFit { channel: c });
            }
            Ok(fit)
        };

        if sample.width() * sample.height() >= PARALLEL_PIXEL_THRESHOLD {
            (0..sample.num_channels())
                .into_par_iter()
                .map(fit_channel)
                .collect()
        } else {
            (0..sample.num_channels()).map(fit_channel).collect()
        }
    }

    fn collect_pairs<S: Sample, T: Sample>(
        &self,
        sample: &Image<S>,
        reference: &Image<T>,
        sample_channel: usize,
        reference_channel: usize,
    ) -> (Vec<f64>, Vec<f64>) {
        let in_range = |v: f64| v > self.reject_low && v < self.reject_high;
        let mut x = Vec::new();
        let mut y = Vec::new();
        for (s, r) in sample
            .channel(sample_channel)
            .iter()
            .zip(reference.channel(reference_channel).iter())
        {
            let (s, r) = (s.to_unit(), r.to_unit());
            if in_range(s) && in_range(r) {
                x.push(s);
                y.push(r);
            }
        }
        (x, y)
    }

    /// Replace every non-black sample `v` with `fit.eval(v)` and truncate the
    /// result to the legal range. Channels beyond `fits` reuse the last fit.
    pub fn apply(&self, image: &mut PixelBuffer, fits: &[LinearFit]) {
        if fits.is_empty() {
            return;
        }
        with_image!(image, img => apply_image(img, fits));
    }
}

fn apply_image<S: Sample>(image: &mut Image<S>, fits: &[LinearFit]) {
    let last = fits.len() - 1;
    for (c, channel) in image.channels_mut().iter_mut().enumerate() {
        let fit = fits[c.min(last)];
        channel.mapv_inplace(|v| {
            if v.is_black() {
                v
            } else {
                S::from_unit(fit.eval(v.to_unit()))
            }
        });
    }
    image.truncate();
}
