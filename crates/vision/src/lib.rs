//! Upload validation and model-input preprocessing for leaf photographs.

use image::imageops::FilterType;
use image::DynamicImage;
use leafcare_core::{ImageConfig, ImageMetadata};
use ndarray::Array4;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationErrorKind {
    TooLarge,
    UnsupportedFormat,
    TooSmall,
    Corrupt,
}

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("File too large. Maximum size: {max_mb} MB")]
    TooLarge { size_mb: f64, max_mb: f64 },
    #[error("Unsupported format. Supported: {}", supported.join(", "))]
    UnsupportedFormat {
        extension: Option<String>,
        supported: Vec<String>,
    },
    #[error("Image too small. Minimum dimensions: {min_width}x{min_height}")]
    TooSmall {
        width: u32,
        height: u32,
        min_width: u32,
        min_height: u32,
    },
    #[error("Invalid image file: {0}")]
    Corrupt(#[source] image::ImageError),
}

impl ValidationError {
    pub fn kind(&self) -> ValidationErrorKind {
        match self {
            Self::TooLarge { .. } => ValidationErrorKind::TooLarge,
            Self::UnsupportedFormat { .. } => ValidationErrorKind::UnsupportedFormat,
            Self::TooSmall { .. } => ValidationErrorKind::TooSmall,
            Self::Corrupt(_) => ValidationErrorKind::Corrupt,
        }
    }

    pub fn code(&self) -> &'static str {
        match self.kind() {
            ValidationErrorKind::TooLarge => "TOO_LARGE",
            ValidationErrorKind::UnsupportedFormat => "UNSUPPORTED_FORMAT",
            ValidationErrorKind::TooSmall => "TOO_SMALL",
            ValidationErrorKind::Corrupt => "CORRUPT_IMAGE",
        }
    }
}

/// A submission that passed validation, kept decoded so preprocessing does
/// not decode twice.
#[derive(Debug, Clone)]
pub struct ValidatedImage {
    pub metadata: ImageMetadata,
    pub image: DynamicImage,
}

#[derive(Debug, Clone)]
pub struct ImageValidator {
    config: ImageConfig,
    supported: Vec<String>,
    input_size: [u32; 2],
}

impl ImageValidator {
    /// `input_size` is the model's `[width, height]`.
    pub fn new(config: ImageConfig, input_size: [u32; 2]) -> Self {
        let supported = config
            .supported_formats
            .iter()
            .map(|ext| ext.trim().trim_start_matches('.').to_lowercase())
            .collect();
        Self {
            config,
            supported,
            input_size,
        }
    }

    pub fn input_size(&self) -> [u32; 2] {
        self.input_size
    }

    pub fn validate(&self, bytes: &[u8], filename: &str) -> Result<ImageMetadata, ValidationError> {
        self.inspect(bytes, filename).map(|validated| validated.metadata)
    }

    /// Checks size, extension, decodability and minimum dimensions, in that order.
    /// An aspect ratio outside the configured range only sets a warning.
    pub fn inspect(&self, bytes: &[u8], filename: &str) -> Result<ValidatedImage, ValidationError> {
        let size_mb = bytes.len() as f64 / BYTES_PER_MB;
        if size_mb > self.config.max_size_mb {
            return Err(ValidationError::TooLarge {
                size_mb,
                max_mb: self.config.max_size_mb,
            });
        }

        let extension = file_extension(filename);
        let format = match extension {
            Some(ref ext) if self.supported.contains(ext) => ext.clone(),
            _ => {
                return Err(ValidationError::UnsupportedFormat {
                    extension,
                    supported: self.supported.clone(),
                })
            }
        };

        let image = image::load_from_memory(bytes).map_err(ValidationError::Corrupt)?;
        let (width, height) = (image.width(), image.height());
        let [min_width, min_height] = self.config.min_dimensions;
        if width < min_width || height < min_height {
            return Err(ValidationError::TooSmall {
                width,
                height,
                min_width,
                min_height,
            });
        }

        let aspect_ratio = width as f32 / height as f32;
        let (min_ratio, max_ratio) = (self.config.min_aspect_ratio, self.config.max_aspect_ratio);
        let warning = (aspect_ratio < min_ratio || aspect_ratio > max_ratio).then(|| {
            format!(
                "Extreme aspect ratio detected: {aspect_ratio:.2}. Recommended range: {min_ratio}-{max_ratio}"
            )
        });

        debug!(width, height, format = %format, "image validated");
        Ok(ValidatedImage {
            metadata: ImageMetadata {
                width,
                height,
                aspect_ratio,
                size_mb,
                format,
                warning,
            },
            image,
        })
    }

    pub fn preprocess(&self, bytes: &[u8]) -> Result<Array4<f32>, ValidationError> {
        let image = image::load_from_memory(bytes).map_err(ValidationError::Corrupt)?;
        Ok(self.to_tensor(&image))
    }

    /// RGB, Lanczos3 resize to the model input, values in [0, 1], NHWC with batch 1.
    pub fn to_tensor(&self, image: &DynamicImage) -> Array4<f32> {
        let [width, height] = self.input_size;
        let rgb = image.to_rgb8();
        let resized = image::imageops::resize(&rgb, width, height, FilterType::Lanczos3);

        Array4::from_shape_fn(
            (1, height as usize, width as usize, 3),
            |(_, y, x, channel)| resized.get_pixel(x as u32, y as u32)[channel] as f32 / 255.0,
        )
    }
}

/// Lowercased text after the last `.`; `None` when there is no dot.
pub fn file_extension(filename: &str) -> Option<String> {
    filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.trim().to_lowercase())
        .filter(|ext| !ext.is_empty())
}
