use ndarray::Array2;

use comet_core::error::CometError;
use comet_core::image::{ColorSpace, Image, PixelBuffer, SampleFormat};
use comet_core::io::{EmbeddedMetadata, FormatCapabilities, FrameCodec, ImageCodec};

fn write_and_read(name: &str, buffer: &PixelBuffer) -> PixelBuffer {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(name);
    let codec = ImageCodec::new();
    codec
        .write(&path, buffer, &EmbeddedMetadata::default())
        .unwrap();
    let mut images = codec.read(&path).unwrap();
    assert_eq!(images.len(), 1);
    images.remove(0).buffer
}

#[test]
fn test_u16_gray_tiff_round_trip() {
    let data = Array2::from_shape_fn((12, 20), |(r, c)| (r * 3000 + c * 7) as u16);
    let buffer: PixelBuffer = Image::from_gray(data).into();
    let back = write_and_read("gray.tif", &buffer);
    assert_eq!(back, buffer);
}

#[test]
fn test_u8_rgb_png_round_trip() {
    let channel = |k: usize| Array2::from_shape_fn((9, 7), |(r, c)| ((r * 7 + c) * k % 256) as u8);
    let buffer: PixelBuffer =
        Image::from_channels(vec![channel(1), channel(3), channel(5)], ColorSpace::Rgb)
            .unwrap()
            .into();
    let back = write_and_read("rgb.png", &buffer);
    assert_eq!(back.color_space(), ColorSpace::Rgb);
    assert_eq!(back, buffer);
}

#[test]
fn test_float_written_as_16_bit() {
    let data = Array2::from_shape_fn((4, 4), |(r, c)| (r * 4 + c) as f32 / 15.0);
    let buffer: PixelBuffer = Image::from_gray(data).into();
    let back = write_and_read("float.tif", &buffer);
    assert_eq!(back.sample_format(), SampleFormat::U16);
    assert_eq!(back.geometry(), (4, 4));
    for r in 0..4 {
        for c in 0..4 {
            let expected = (r * 4 + c) as f64 / 15.0;
            assert!((back.unit_value(0, r, c) - expected).abs() < 1e-4);
        }
    }
}

#[test]
fn test_unknown_extension_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let buffer: PixelBuffer = Image::from_gray(Array2::<u8>::zeros((2, 2))).into();
    let result = ImageCodec::new().write(
        &dir.path().join("frame.nope"),
        &buffer,
        &EmbeddedMetadata::default(),
    );
    assert!(matches!(result, Err(CometError::UnsupportedFormat(_))));
}

#[test]
fn test_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    assert!(ImageCodec::new().read(&dir.path().join("absent.png")).is_err());
}

#[test]
fn test_no_embedded_data_support() {
    assert_eq!(ImageCodec::new().capabilities("tif"), FormatCapabilities::default());
}
