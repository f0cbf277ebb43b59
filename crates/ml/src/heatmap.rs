use std::io::Cursor;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use image::imageops::FilterType;
use image::{DynamicImage, GrayImage, ImageFormat, Luma, Rgb, RgbImage};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HeatmapError {
    #[error("expected {expected} cell scores, got {actual}")]
    CellCount { expected: usize, actual: usize },
    #[error("heatmap size must be positive")]
    EmptySize,
    #[error("failed encoding heatmap")]
    Encode(#[from] image::ImageError),
}

/// Renders a `grid × grid` score map as a base64 PNG of `size` (`[w, h]`).
pub fn render(cell_scores: &[f32], grid: usize, size: [u32; 2]) -> Result<String, HeatmapError> {
    if cell_scores.len() != grid * grid || grid == 0 {
        return Err(HeatmapError::CellCount {
            expected: grid * grid,
            actual: cell_scores.len(),
        });
    }
    let [width, height] = size;
    if width == 0 || height == 0 {
        return Err(HeatmapError::EmptySize);
    }

    let normalized = normalize(cell_scores);
    let side = grid as u32;
    let cells = GrayImage::from_fn(side, side, |x, y| {
        Luma([(normalized[(y * side + x) as usize] * 255.0).round() as u8])
    });
    let upscaled = image::imageops::resize(&cells, width, height, FilterType::Triangle);

    let coloured = RgbImage::from_fn(width, height, |x, y| {
        jet(upscaled.get_pixel(x, y)[0] as f32 / 255.0)
    });

    let mut png = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(coloured).write_to(&mut png, ImageFormat::Png)?;
    Ok(STANDARD.encode(png.into_inner()))
}

fn normalize(values: &[f32]) -> Vec<f32> {
    let (min, max) = values
        .iter()
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), v| {
            (lo.min(*v), hi.max(*v))
        });
    let span = max - min;
    values
        .iter()
        .map(|v| {
            if span > f32::EPSILON && span.is_finite() {
                (v - min) / span
            } else {
                0.5
            }
        })
        .collect()
}

fn jet(value: f32) -> Rgb<u8> {
    let v = value.clamp(0.0, 1.0);
    let channel = |offset: f32| ((1.5 - (4.0 * v - offset).abs()).clamp(0.0, 1.0) * 255.0) as u8;
    Rgb([channel(3.0), channel(2.0), channel(1.0)])
}
