use ndarray::Array2;
use tracing::debug;

use crate::error::Result;
use crate::homography::Homography;
use crate::image::{Image, PixelBuffer, Sample};
use crate::interpolation::InterpolationConfig;
use crate::progress::{CancelToken, JobMonitor};
use crate::with_image;

/// Geometric warp of whole images through a [`Homography`].
#[derive(Clone, Copy, Debug, Default)]
pub struct Resampler {
    interpolation: InterpolationConfig,
}

impl Resampler {
    pub fn new(interpolation: InterpolationConfig) -> Self {
        Self { interpolation }
    }

    /// Replace `buffer` with its warp through `matrix`.
    ///
    /// Output pixel `(x, y)` samples the input at `matrix.apply(x, y)`;
    /// pixels whose source falls outside the image stay black. The row
    /// counter of `monitor` is advanced after every output row. On
    /// cancellation `buffer` is left untouched.
    pub fn warp(
        &self,
        buffer: &mut PixelBuffer,
        matrix: &Homography,
        cancel: &CancelToken,
        monitor: &JobMonitor,
    ) -> Result<()> {
        debug!(matrix = %matrix, method = %self.interpolation.method, "warping image");
        with_image!(buffer, img => {
            let output = self.warp_image(img, matrix, cancel, monitor)?;
            *img = output;
        });
        Ok(())
    }

    fn warp_image<S: Sample>(
        &self,
        input: &Image<S>,
        matrix: &Homography,
        cancel: &CancelToken,
        monitor: &JobMonitor,
    ) -> Result<Image<S>> {
        let (w, h) = (input.width(), input.height());
        let interpolators: Vec<_> = input
            .channels()
            .iter()
            .map(|c| self.interpolation.interpolator(c))
            .collect();
        let mut outputs: Vec<Array2<S>> = (0..input.num_channels())
            .map(|_| Array2::from_elem((h, w), S::default()))
            .collect();

        for y in 0..h {
            for x in 0..w {
                let (sx, sy) = matrix.apply(x as f64, y as f64)?;
                if sx >= 0.0 && sx < w as f64 && sy >= 0.0 && sy < h as f64 {
                    for (out, interp) in outputs.iter_mut().zip(&interpolators) {
                        out[[y, x]] = interp.sample(sx, sy);
                    }
                }
            }
            cancel.check()?;
            monitor.set_row(y);
        }

        Image::from_channels(outputs, input.color_space())
    }
}
