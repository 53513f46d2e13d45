#![allow(dead_code)]

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use comet_core::config::AlignmentConfig;
use comet_core::error::{CometError, Result};
use comet_core::frame::FrameDescriptor;
use comet_core::image::{Image, PixelBuffer};
use comet_core::io::{DecodedImage, EmbeddedMetadata, FormatCapabilities, FrameCodec};
use ndarray::Array2;

/// In-memory codec that records every write.
#[derive(Default)]
pub struct MemoryCodec {
    images: Mutex<HashMap<PathBuf, DecodedImage>>,
    written: Mutex<Vec<(PathBuf, PixelBuffer, EmbeddedMetadata)>>,
    active_writes: AtomicUsize,
    max_active_writes: AtomicUsize,
    capabilities: FormatCapabilities,
    fail_writes: bool,
}

impl MemoryCodec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Codec whose every write fails.
    pub fn failing() -> Self {
        Self {
            fail_writes: true,
            ..Default::default()
        }
    }

    pub fn with_capabilities(capabilities: FormatCapabilities) -> Self {
        Self {
            capabilities,
            ..Default::default()
        }
    }

    pub fn insert(&self, path: impl Into<PathBuf>, buffer: PixelBuffer) {
        self.insert_with_metadata(path, buffer, EmbeddedMetadata::default());
    }

    pub fn insert_with_metadata(
        &self,
        path: impl Into<PathBuf>,
        buffer: PixelBuffer,
        metadata: EmbeddedMetadata,
    ) {
        self.images
            .lock()
            .unwrap()
            .insert(path.into(), DecodedImage { buffer, metadata });
    }

    pub fn written(&self) -> Vec<(PathBuf, PixelBuffer, EmbeddedMetadata)> {
        self.written.lock().unwrap().clone()
    }

    pub fn written_paths(&self) -> Vec<PathBuf> {
        self.written().into_iter().map(|(p, _, _)| p).collect()
    }

    pub fn written_buffer(&self, path: &Path) -> Option<PixelBuffer> {
        self.written()
            .into_iter()
            .find(|(p, _, _)| p == path)
            .map(|(_, b, _)| b)
    }

    pub fn max_active_writes(&self) -> usize {
        self.max_active_writes.load(Ordering::SeqCst)
    }
}

impl FrameCodec for MemoryCodec {
    fn read(&self, path: &Path) -> Result<Vec<DecodedImage>> {
        match self.images.lock().unwrap().get(path) {
            Some(image) => Ok(vec![image.clone()]),
            None => Err(CometError::Io(io::Error::new(
                io::ErrorKind::NotFound,
                format!("{} not found", path.display()),
            ))),
        }
    }

    fn capabilities(&self, _extension: &str) -> FormatCapabilities {
        self.capabilities
    }

    fn write(&self, path: &Path, buffer: &PixelBuffer, metadata: &EmbeddedMetadata) -> Result<()> {
        if self.fail_writes {
            return Err(CometError::Io(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "read-only volume",
            )));
        }
        let active = self.active_writes.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active_writes.fetch_max(active, Ordering::SeqCst);
        std::thread::sleep(Duration::from_millis(2));
        self.written
            .lock()
            .unwrap()
            .push((path.to_path_buf(), buffer.clone(), metadata.clone()));
        self.active_writes.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Single-channel f32 image filled from `f(row, col)`.
pub fn gray_f32(width: usize, height: usize, f: impl Fn(usize, usize) -> f32) -> PixelBuffer {
    let data = Array2::from_shape_fn((height, width), |(r, c)| f(r, c));
    Image::from_gray(data).into()
}

/// Smooth, strictly positive test image.
pub fn gradient(width: usize, height: usize) -> PixelBuffer {
    gray_f32(width, height, |r, c| {
        0.2 + 0.3 * (c as f32 / width as f32) + 0.2 * (r as f32 / height as f32)
    })
}

/// Black frame with one bright pixel.
pub fn single_star(width: usize, height: usize, row: usize, col: usize) -> PixelBuffer {
    gray_f32(width, height, |r, c| if (r, c) == (row, col) { 1.0 } else { 0.0 })
}

pub fn f32_channel(buffer: &PixelBuffer, c: usize) -> Array2<f32> {
    match buffer {
        PixelBuffer::F32(img) => img.channel(c).clone(),
        other => panic!("expected f32 buffer, got {:?}", other.sample_format()),
    }
}

/// `count` frames named `/virtual/frame_NN.tif`, registered in `codec`,
/// with the comet drifting one pixel per frame.
pub fn virtual_frames(codec: &MemoryCodec, count: usize, size: usize) -> Vec<FrameDescriptor> {
    (0..count)
        .map(|i| {
            let path = PathBuf::from(format!("/virtual/frame_{i:02}.tif"));
            codec.insert(&path, gradient(size, size));
            FrameDescriptor::new(path, 10.0 + i as f64, 12.0 + 0.5 * i as f64)
        })
        .collect()
}

pub fn config_for(targets: Vec<FrameDescriptor>) -> AlignmentConfig {
    AlignmentConfig {
        targets,
        ..Default::default()
    }
}
