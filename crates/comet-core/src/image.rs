use ndarray::Array2;
use num_traits::{AsPrimitive, Bounded};
use rayon::prelude::*;

use crate::consts::PARALLEL_PIXEL_THRESHOLD;
use crate::error::{CometError, Result};

/// A numeric sample representation a [`PixelBuffer`] can hold.
///
/// Integer samples span `[0, MAX]`, floating samples span `[0.0, 1.0]`.
/// The "unit" conversions map either onto the normalized `[0, 1]` range.
pub trait Sample: Copy + Default + PartialOrd + Send + Sync + 'static {
    const FORMAT: SampleFormat;

    /// Native value as f64, without normalization.
    fn to_f64(self) -> f64;

    /// Native value from f64. Integer types round and saturate.
    fn from_f64(value: f64) -> Self;

    /// Largest legal native value.
    fn full_scale() -> f64;

    fn to_unit(self) -> f64 {
        self.to_f64() / Self::full_scale()
    }

    fn from_unit(value: f64) -> Self {
        Self::from_f64(value * Self::full_scale())
    }

    /// Black pixels are left untouched by fitting and normalization.
    fn is_black(self) -> bool {
        self.to_f64() <= 0.0
    }
}

macro_rules! integer_sample {
    ($t:ty, $format:expr) => {
        impl Sample for $t {
            const FORMAT: SampleFormat = $format;

            fn to_f64(self) -> f64 {
                self.as_()
            }

            fn from_f64(value: f64) -> Self {
                if value.is_nan() {
                    0
                } else {
                    value.round().clamp(0.0, Self::full_scale()).as_()
                }
            }

            fn full_scale() -> f64 {
                <$t as Bounded>::max_value().as_()
            }
        }
    };
}

integer_sample!(u8, SampleFormat::U8);
integer_sample!(u16, SampleFormat::U16);
integer_sample!(u32, SampleFormat::U32);

impl Sample for f32 {
    const FORMAT: SampleFormat = SampleFormat::F32;

    fn to_f64(self) -> f64 {
        self as f64
    }

    fn from_f64(value: f64) -> Self {
        value as f32
    }

    fn full_scale() -> f64 {
        1.0
    }
}

impl Sample for f64 {
    const FORMAT: SampleFormat = SampleFormat::F64;

    fn to_f64(self) -> f64 {
        self
    }

    fn from_f64(value: f64) -> Self {
        value
    }

    fn full_scale() -> f64 {
        1.0
    }
}

/// Runtime tag of the concrete sample type held by a [`PixelBuffer`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SampleFormat {
    U8,
    U16,
    U32,
    F32,
    F64,
}

impl SampleFormat {
    pub fn bits_per_sample(&self) -> u8 {
        match self {
            Self::U8 => 8,
            Self::U16 => 16,
            Self::U32 | Self::F32 => 32,
            Self::F64 => 64,
        }
    }

    pub fn is_float(&self) -> bool {
        matches!(self, Self::F32 | Self::F64)
    }
}

impl std::fmt::Display for SampleFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = if self.is_float() { "float" } else { "integer" };
        write!(f, "{}-bit {}", self.bits_per_sample(), kind)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ColorSpace {
    #[default]
    Gray,
    Rgb,
}

/// Planar multi-channel image of one sample type.
///
/// Each channel is an `Array2` with shape `(height, width)`.
#[derive(Clone, Debug, PartialEq)]
pub struct Image<S: Sample> {
    channels: Vec<Array2<S>>,
    color_space: ColorSpace,
}

impl<S: Sample> Image<S> {
    /// Zero-filled image.
    pub fn new(width: usize, height: usize, channels: usize, color_space: ColorSpace) -> Self {
        Self {
            channels: (0..channels.max(1))
                .map(|_| Array2::from_elem((height, width), S::default()))
                .collect(),
            color_space,
        }
    }

    pub fn from_channels(channels: Vec<Array2<S>>, color_space: ColorSpace) -> Result<Self> {
        let Some(first) = channels.first() else {
            return Err(CometError::UnsupportedFormat("image without channels".into()));
        };
        let dim = first.dim();
        if channels.iter().any(|c| c.dim() != dim) {
            return Err(CometError::UnsupportedFormat(
                "channels have different dimensions".into(),
            ));
        }
        Ok(Self {
            channels,
            color_space,
        })
    }

    pub fn from_gray(data: Array2<S>) -> Self {
        Self {
            channels: vec![data],
            color_space: ColorSpace::Gray,
        }
    }

    pub fn width(&self) -> usize {
        self.channels[0].ncols()
    }

    pub fn height(&self) -> usize {
        self.channels[0].nrows()
    }

    pub fn num_channels(&self) -> usize {
        self.channels.len()
    }

    pub fn color_space(&self) -> ColorSpace {
        self.color_space
    }

    pub fn channel(&self, c: usize) -> &Array2<S> {
        &self.channels[c]
    }

    pub fn channel_mut(&mut self, c: usize) -> &mut Array2<S> {
        &mut self.channels[c]
    }

    pub fn channels(&self) -> &[Array2<S>] {
        &self.channels
    }

    pub fn channels_mut(&mut self) -> &mut [Array2<S>] {
        &mut self.channels
    }

    /// Clamp every sample to the legal range of its representation.
    pub fn truncate(&mut self) {
        if !S::FORMAT.is_float() {
            return;
        }
        for channel in &mut self.channels {
            channel.mapv_inplace(|v| {
                let f = v.to_f64();
                if f.is_nan() {
                    S::from_f64(0.0)
                } else {
                    S::from_f64(f.clamp(0.0, 1.0))
                }
            });
        }
    }

    /// Per-channel median in the normalized `[0, 1]` domain.
    pub fn medians(&self) -> Vec<f64> {
        if self.width() * self.height() >= PARALLEL_PIXEL_THRESHOLD {
            self.channels.par_iter().map(channel_median).collect()
        } else {
            self.channels.iter().map(channel_median).collect()
        }
    }

    /// Subtract each channel's median from every non-black sample.
    pub fn subtract_median(&mut self) {
        let medians = self.medians();
        for (channel, median) in self.channels.iter_mut().zip(medians) {
            channel.mapv_inplace(|v| {
                if v.is_black() {
                    v
                } else {
                    S::from_unit(v.to_unit() - median)
                }
            });
        }
    }

    /// `self -= other`, sample by sample, in the normalized domain.
    ///
    /// Channels missing from `other` reuse its last channel.
    pub fn subtract<T: Sample>(&mut self, other: &Image<T>) -> Result<()> {
        if (other.width(), other.height()) != (self.width(), self.height()) {
            return Err(CometError::GeometryMismatch {
                width: self.width(),
                height: self.height(),
                actual_width: other.width(),
                actual_height: other.height(),
            });
        }
        let last = other.num_channels() - 1;
        for (c, channel) in self.channels.iter_mut().enumerate() {
            let rhs = &other.channels[c.min(last)];
            ndarray::Zip::from(channel).and(rhs).for_each(|a, &b| {
                *a = S::from_unit(a.to_unit() - b.to_unit());
            });
        }
        Ok(())
    }
}

fn channel_median<S: Sample>(channel: &Array2<S>) -> f64 {
    let mut values: Vec<f64> = channel.iter().map(|v| v.to_unit()).collect();
    let n = values.len();
    if n == 0 {
        return 0.0;
    }
    let mid = n / 2;
    let (lower, upper, _) = values.select_nth_unstable_by(mid, f64::total_cmp);
    let upper = *upper;
    if n % 2 == 1 {
        upper
    } else {
        let lower = lower.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        (lower + upper) / 2.0
    }
}

/// An image whose sample representation is chosen at runtime.
#[derive(Clone, Debug, PartialEq)]
pub enum PixelBuffer {
    U8(Image<u8>),
    U16(Image<u16>),
    U32(Image<u32>),
    F32(Image<f32>),
    F64(Image<f64>),
}

/// Bind the concrete `Image<S>` inside a [`PixelBuffer`] and evaluate an
/// expression generic over `S`.
#[macro_export]
macro_rules! with_image {
    ($buffer:expr, $image:ident => $body:expr) => {
        match $buffer {
            $crate::image::PixelBuffer::U8($image) => $body,
            $crate::image::PixelBuffer::U16($image) => $body,
            $crate::image::PixelBuffer::U32($image) => $body,
            $crate::image::PixelBuffer::F32($image) => $body,
            $crate::image::PixelBuffer::F64($image) => $body,
        }
    };
}

impl PixelBuffer {
    pub fn width(&self) -> usize {
        with_image!(self, img => img.width())
    }

    pub fn height(&self) -> usize {
        with_image!(self, img => img.height())
    }

    pub fn num_channels(&self) -> usize {
        with_image!(self, img => img.num_channels())
    }

    pub fn color_space(&self) -> ColorSpace {
        with_image!(self, img => img.color_space())
    }

    pub fn sample_format(&self) -> SampleFormat {
        match self {
            Self::U8(_) => SampleFormat::U8,
            Self::U16(_) => SampleFormat::U16,
            Self::U32(_) => SampleFormat::U32,
            Self::F32(_) => SampleFormat::F32,
            Self::F64(_) => SampleFormat::F64,
        }
    }

    /// `(width, height)`
    pub fn geometry(&self) -> (usize, usize) {
        (self.width(), self.height())
    }

    pub fn truncate(&mut self) {
        with_image!(self, img => img.truncate())
    }

    pub fn subtract_median(&mut self) {
        with_image!(self, img => img.subtract_median())
    }

    pub fn subtract(&mut self, other: &PixelBuffer) -> Result<()> {
        with_image!(self, lhs => with_image!(other, rhs => lhs.subtract(rhs)))
    }

    /// Normalized sample value at `(channel, row, col)`.
    pub fn unit_value(&self, channel: usize, row: usize, col: usize) -> f64 {
        with_image!(self, img => img.channel(channel)[[row, col]].to_unit())
    }
}

macro_rules! buffer_from_image {
    ($t:ty, $variant:ident) => {
        impl From<Image<$t>> for PixelBuffer {
            fn from(image: Image<$t>) -> Self {
                PixelBuffer::$variant(image)
            }
        }
    };
}

buffer_from_image!(u8, U8);
buffer_from_image!(u16, U16);
buffer_from_image!(u32, U32);
buffer_from_image!(f32, F32);
buffer_from_image!(f64, F64);
