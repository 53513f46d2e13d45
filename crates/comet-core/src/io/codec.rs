use std::path::Path;

use image::{DynamicImage, ImageBuffer, ImageFormat, Luma, Rgb};
use ndarray::Array2;
use tracing::debug;

use super::{DecodedImage, EmbeddedMetadata, FormatCapabilities, FrameCodec};
use crate::error::{CometError, Result};
use crate::image::{ColorSpace, Image, PixelBuffer, Sample};

/// [`FrameCodec`] backed by the `image` crate.
///
/// Gray and RGB images with 8-bit, 16-bit or 32-bit float samples are read
/// natively; alpha is dropped and any other layout is widened to RGB float.
/// No supported format stores keywords, ICC profiles or XML metadata.
#[derive(Clone, Copy, Debug, Default)]
pub struct ImageCodec;

impl ImageCodec {
    pub fn new() -> Self {
        Self
    }
}

impl FrameCodec for ImageCodec {
    fn read(&self, path: &Path) -> Result<Vec<DecodedImage>> {
        let img = image::open(path)?;
        debug!(path = %path.display(), color = ?img.color(), "decoded image");
        let buffer = match img {
            DynamicImage::ImageLuma8(buf) => {
                let (w, h) = buf.dimensions();
                gray(w, h, buf.into_raw())?
            }
            DynamicImage::ImageLuma16(buf) => {
                let (w, h) = buf.dimensions();
                gray(w, h, buf.into_raw())?
            }
            DynamicImage::ImageLumaA8(_) => {
                let buf = img.to_luma8();
                let (w, h) = buf.dimensions();
                gray(w, h, buf.into_raw())?
            }
            DynamicImage::ImageLumaA16(_) => {
                let buf = img.to_luma16();
                let (w, h) = buf.dimensions();
                gray(w, h, buf.into_raw())?
            }
            DynamicImage::ImageRgb8(buf) => {
                let (w, h) = buf.dimensions();
                rgb(w, h, &buf.into_raw())?
            }
            DynamicImage::ImageRgba8(_) => {
                let buf = img.to_rgb8();
                let (w, h) = buf.dimensions();
                rgb(w, h, &buf.into_raw())?
            }
            DynamicImage::ImageRgb16(buf) => {
                let (w, h) = buf.dimensions();
                rgb(w, h, &buf.into_raw())?
            }
            DynamicImage::ImageRgba16(_) => {
                let buf = img.to_rgb16();
                let (w, h) = buf.dimensions();
                rgb(w, h, &buf.into_raw())?
            }
            other => {
                let buf = other.to_rgb32f();
                let (w, h) = buf.dimensions();
                rgb(w, h, &buf.into_raw())?
            }
        };
        Ok(vec![DecodedImage {
            buffer,
            metadata: EmbeddedMetadata::default(),
        }])
    }

    fn capabilities(&self, _extension: &str) -> FormatCapabilities {
        FormatCapabilities::default()
    }

    fn write(&self, path: &Path, buffer: &PixelBuffer, _metadata: &EmbeddedMetadata) -> Result<()> {
        let format = path
            .extension()
            .and_then(|e| ImageFormat::from_extension(e))
            .ok_or_else(|| {
                CometError::UnsupportedFormat(format!("no encoder for {}", path.display()))
            })?;

        let dynamic = match buffer {
            _ if format == ImageFormat::OpenExr => to_dynamic_rgb32f(&rescale::<f32>(buffer))?,
            PixelBuffer::U8(img) => to_dynamic_u8(img)?,
            PixelBuffer::U16(img) => to_dynamic_u16(img)?,
            _ => to_dynamic_u16(&rescale::<u16>(buffer))?,
        };

        debug!(path = %path.display(), ?format, "encoding image");
        dynamic.save_with_format(path, format)?;
        Ok(())
    }
}

fn size_error(w: u32, h: u32) -> CometError {
    CometError::UnsupportedFormat(format!("pixel data does not fit {w}x{h}"))
}

fn gray<S: Sample>(w: u32, h: u32, raw: Vec<S>) -> Result<PixelBuffer>
where
    PixelBuffer: From<Image<S>>,
{
    let data = Array2::from_shape_vec((h as usize, w as usize), raw).map_err(|_| size_error(w, h))?;
    Ok(Image::from_gray(data).into())
}

fn rgb<S: Sample>(w: u32, h: u32, raw: &[S]) -> Result<PixelBuffer>
where
    PixelBuffer: From<Image<S>>,
{
    let (w, h) = (w as usize, h as usize);
    if raw.len() != w * h * 3 {
        return Err(size_error(w as u32, h as u32));
    }
    let channels = (0..3)
        .map(|c| Array2::from_shape_fn((h, w), |(row, col)| raw[(row * w + col) * 3 + c]))
        .collect();
    Ok(Image::from_channels(channels, ColorSpace::Rgb)?.into())
}

/// Convert any buffer to another sample type through the normalized domain.
fn rescale<T: Sample>(buffer: &PixelBuffer) -> Image<T> {
    crate::with_image!(buffer, img => {
        let channels = img
            .channels()
            .iter()
            .map(|c| c.mapv(|v| T::from_unit(v.to_unit().clamp(0.0, 1.0))))
            .collect();
        Image::from_channels(channels, img.color_space())
            .unwrap_or_else(|_| Image::new(img.width(), img.height(), 1, ColorSpace::Gray))
    })
}

fn gray_samples<S: Sample>(img: &Image<S>) -> Vec<S> {
    img.channel(0).iter().copied().collect()
}

/// Interleaved RGB samples, replicating the gray plane when needed.
fn interleave_rgb<S: Sample>(img: &Image<S>) -> Vec<S> {
    let last = img.num_channels() - 1;
    let mut out = Vec::with_capacity(img.width() * img.height() * 3);
    for row in 0..img.height() {
        for col in 0..img.width() {
            for c in 0..3 {
                out.push(img.channel(c.min(last))[[row, col]]);
            }
        }
    }
    out
}

fn to_dynamic_u8(img: &Image<u8>) -> Result<DynamicImage> {
    let (w, h) = (img.width() as u32, img.height() as u32);
    Ok(match img.color_space() {
        ColorSpace::Gray => DynamicImage::ImageLuma8(
            ImageBuffer::<Luma<u8>, _>::from_raw(w, h, gray_samples(img))
                .ok_or_else(|| size_error(w, h))?,
        ),
        ColorSpace::Rgb => DynamicImage::ImageRgb8(
            ImageBuffer::<Rgb<u8>, _>::from_raw(w, h, interleave_rgb(img))
                .ok_or_else(|| size_error(w, h))?,
        ),
    })
}

fn to_dynamic_u16(img: &Image<u16>) -> Result<DynamicImage> {
    let (w, h) = (img.width() as u32, img.height() as u32);
    Ok(match img.color_space() {
        ColorSpace::Gray => DynamicImage::ImageLuma16(
            ImageBuffer::<Luma<u16>, _>::from_raw(w, h, gray_samples(img))
                .ok_or_else(|| size_error(w, h))?,
        ),
        ColorSpace::Rgb => DynamicImage::ImageRgb16(
            ImageBuffer::<Rgb<u16>, _>::from_raw(w, h, interleave_rgb(img))
                .ok_or_else(|| size_error(w, h))?,
        ),
    })
}

fn to_dynamic_rgb32f(img: &Image<f32>) -> Result<DynamicImage> {
    let (w, h) = (img.width() as u32, img.height() as u32);
    Ok(DynamicImage::ImageRgb32F(
        ImageBuffer::<Rgb<f32>, _>::from_raw(w, h, interleave_rgb(img))
            .ok_or_else(|| size_error(w, h))?,
    ))
}

