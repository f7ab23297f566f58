//! Image preprocessing.
//!
//! Turns an encoded upload into the tensor the classifier was trained on:
//!
//! 1. decode the JPEG/PNG buffer
//! 2. stretch to exactly 224x224 (no aspect-ratio preservation)
//! 3. drop alpha, keep RGB in decoder order
//! 4. flatten row-major, channel-last
//! 5. scale `u8` to `f32` by `1/255`, nothing else
//! 6. shape `[1, 224, 224, 3]`
//!
//! Any change here (filter, layout, scaling) silently shifts every prediction,
//! so the pipeline is fixed rather than configurable.

use std::io::Cursor;

use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat, ImageReader};
use ndarray::ArrayView4;

use crate::model::config::{EngineConfig, DEFAULT_MAX_IMAGE_BYTES, DEFAULT_MAX_PIXELS};
use crate::utils::error::{NoduleScanError, Result};
use crate::{CHANNELS, IMAGE_SIZE};

/// Network input shape: batch, height, width, channels
pub const INPUT_SHAPE: [usize; 4] = [1, IMAGE_SIZE, IMAGE_SIZE, CHANNELS];

/// Number of elements in an input tensor
pub const INPUT_LEN: usize = IMAGE_SIZE * IMAGE_SIZE * CHANNELS;

const RESIZE_FILTER: FilterType = FilterType::Lanczos3;

const ACCEPTED_FORMATS: [ImageFormat; 2] = [ImageFormat::Jpeg, ImageFormat::Png];

/// Bounds checked before an upload is decoded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PreprocessLimits {
    pub max_image_bytes: usize,
    pub max_pixels: u64,
}

impl Default for PreprocessLimits {
    fn default() -> Self {
        Self {
            max_image_bytes: DEFAULT_MAX_IMAGE_BYTES,
            max_pixels: DEFAULT_MAX_PIXELS,
        }
    }
}

impl From<&EngineConfig> for PreprocessLimits {
    fn from(config: &EngineConfig) -> Self {
        Self {
            max_image_bytes: config.max_image_bytes,
            max_pixels: config.max_pixels,
        }
    }
}

/// A `[1, 224, 224, 3]` channel-last tensor with values in `[0, 1]`
#[derive(Debug, Clone, PartialEq)]
pub struct InputTensor {
    data: Vec<f32>,
}

impl InputTensor {
    /// Wrap an already-normalized buffer of exactly `INPUT_LEN` elements
    pub fn from_vec(data: Vec<f32>) -> Result<Self> {
        if data.len() != INPUT_LEN {
            return Err(NoduleScanError::Preprocessing(format!(
                "tensor has {} elements, expected {}",
                data.len(),
                INPUT_LEN
            )));
        }
        Ok(Self { data })
    }

    pub fn shape(&self) -> [usize; 4] {
        INPUT_SHAPE
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    /// Indexed view, `[batch, y, x, channel]`
    pub fn as_array(&self) -> ArrayView4<'_, f32> {
        ArrayView4::from_shape(INPUT_SHAPE, &self.data)
            .expect("input tensor length is checked at construction")
    }
}

/// Decode an encoded JPEG/PNG buffer after checking size, format and dimensions
pub fn decode_image(bytes: &[u8], limits: &PreprocessLimits) -> Result<DynamicImage> {
    if bytes.is_empty() {
        return Err(NoduleScanError::Preprocessing("image buffer is empty".into()));
    }
    if bytes.len() > limits.max_image_bytes {
        return Err(NoduleScanError::Preprocessing(format!(
            "image is {} bytes, limit is {}",
            bytes.len(),
            limits.max_image_bytes
        )));
    }

    let format = image::guess_format(bytes)
        .map_err(|_| NoduleScanError::Preprocessing("unrecognized image format".into()))?;
    if !ACCEPTED_FORMATS.contains(&format) {
        return Err(NoduleScanError::Preprocessing(format!(
            "unsupported image format {:?}, expected JPEG or PNG",
            format
        )));
    }

    // Header only: refuse oversized images before allocating pixel buffers
    let (width, height) = ImageReader::with_format(Cursor::new(bytes), format).into_dimensions()?;
    if width == 0 || height == 0 {
        return Err(NoduleScanError::Preprocessing(format!(
            "invalid image dimensions {}x{}",
            width, height
        )));
    }
    let pixels = u64::from(width) * u64::from(height);
    if pixels > limits.max_pixels {
        return Err(NoduleScanError::Preprocessing(format!(
            "image is {}x{} ({} pixels), limit is {}",
            width, height, pixels, limits.max_pixels
        )));
    }

    Ok(image::load_from_memory_with_format(bytes, format)?)
}

/// Resize, strip alpha, flatten and scale a decoded image
pub fn tensorize(image: &DynamicImage) -> Result<InputTensor> {
    let size = IMAGE_SIZE as u32;
    let resized = image.resize_exact(size, size, RESIZE_FILTER);
    let rgb = resized.to_rgb8();

    let data: Vec<f32> = rgb.as_raw().iter().map(|&v| f32::from(v) / 255.0).collect();
    InputTensor::from_vec(data)
}

/// Full preprocessing pipeline from encoded bytes to input tensor
pub fn preprocess(bytes: &[u8], limits: &PreprocessLimits) -> Result<InputTensor> {
    let image = decode_image(bytes, limits)?;
    tensorize(&image)
}
