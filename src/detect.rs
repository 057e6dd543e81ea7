use anyhow::{Context, Result};
use image::DynamicImage;
use image::imageops::FilterType;
use tracing::{info, warn};

use crate::data;
use crate::geometry::{self, PercentBox};
use crate::providers::Collaborator;
use crate::region::Region;
use crate::settings::Settings;

pub const CHUNK_HEIGHT: u32 = 2048;
pub const MAX_DIMENSION: u32 = 2048;
pub const PADDING_RATIO: f64 = 0.05;
pub const JPEG_QUALITY: u8 = 80;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectOptions {
    pub chunk_height: u32,
    pub max_dimension: u32,
    pub padding_ratio: f64,
    pub jpeg_quality: u8,
}

impl Default for DetectOptions {
    fn default() -> Self {
        Self {
            chunk_height: CHUNK_HEIGHT,
            max_dimension: MAX_DIMENSION,
            padding_ratio: PADDING_RATIO,
            jpeg_quality: JPEG_QUALITY,
        }
    }
}

impl From<&Settings> for DetectOptions {
    fn from(settings: &Settings) -> Self {
        Self {
            chunk_height: settings.chunk_height.max(1),
            max_dimension: settings.max_dimension.max(1),
            padding_ratio: settings.padding_ratio,
            jpeg_quality: settings.jpeg_quality,
        }
    }
}

/// A horizontal slice of the source image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkSpan {
    pub index: usize,
    pub offset: u32,
    pub height: u32,
}

/// What a detection run produced. Regions found before a failing chunk are
/// kept alongside the failure.
#[derive(Debug)]
pub struct DetectionReport {
    pub regions: Vec<Region>,
    pub chunks_processed: usize,
    pub chunks_total: usize,
    pub failure: Option<anyhow::Error>,
}

pub fn plan_chunks(image_height: u32, chunk_height: u32) -> Vec<ChunkSpan> {
    let chunk_height = chunk_height.max(1);
    let count = image_height.div_ceil(chunk_height);
    (0..count)
        .map(|index| {
            let offset = index * chunk_height;
            ChunkSpan {
                index: index as usize,
                offset,
                height: chunk_height.min(image_height - offset),
            }
        })
        .collect()
}

/// Crops the chunk out of `image` and, for wide images, shrinks it uniformly so
/// the width fits `max_dimension`. Only the request is scaled.
pub fn chunk_request_image(
    image: &DynamicImage,
    span: &ChunkSpan,
    max_dimension: u32,
) -> DynamicImage {
    let width = image.width();
    let chunk = image.crop_imm(0, span.offset, width, span.height);
    if width <= max_dimension {
        return chunk;
    }
    let scale = max_dimension as f64 / width as f64;
    let scaled_width = ((width as f64 * scale).round() as u32).max(1);
    let scaled_height = ((span.height as f64 * scale).round() as u32).max(1);
    chunk.resize_exact(scaled_width, scaled_height, FilterType::Triangle)
}

/// Pads each percent box, maps it through the unscaled chunk into image pixels
/// and builds idle regions. Boxes that end up with no area are dropped.
pub fn map_chunk_boxes(
    boxes: &[PercentBox],
    span: &ChunkSpan,
    image_width: u32,
    image_height: u32,
    padding_ratio: f64,
) -> Vec<Region> {
    boxes
        .iter()
        .filter_map(|raw| {
            let padded = geometry::pad_percent_box(raw, padding_ratio);
            if padded.is_degenerate() {
                return None;
            }
            let local =
                geometry::percent_to_chunk_pixels(&padded, image_width as f64, span.height as f64);
            let rect = geometry::chunk_to_image(&local, span.offset as f64);
            Region::new(rect, image_width, image_height)
        })
        .collect()
}

async fn detect_chunk<C>(
    image: &DynamicImage,
    span: &ChunkSpan,
    collaborator: &C,
    options: &DetectOptions,
) -> Result<Vec<Region>>
where
    C: Collaborator + ?Sized,
{
    let request = chunk_request_image(image, span, options.max_dimension);
    let attachment = data::encode_jpeg(&request, options.jpeg_quality)
        .with_context(|| format!("failed to encode chunk {}", span.index + 1))?;
    let boxes = collaborator
        .detect_text_regions(attachment)
        .await
        .with_context(|| format!("detection failed for chunk {}", span.index + 1))?;
    Ok(map_chunk_boxes(
        &boxes,
        span,
        image.width(),
        image.height(),
        options.padding_ratio,
    ))
}

/// Runs detection chunk by chunk, one request at a time, and stops at the
/// first failing chunk.
pub async fn detect_regions<C>(
    image: &DynamicImage,
    collaborator: &C,
    options: &DetectOptions,
) -> DetectionReport
where
    C: Collaborator + ?Sized,
{
    let spans = plan_chunks(image.height(), options.chunk_height);
    let mut report = DetectionReport {
        regions: Vec::new(),
        chunks_processed: 0,
        chunks_total: spans.len(),
        failure: None,
    };
    for span in &spans {
        info!(
            "detecting chunk {}/{} (y={}, h={})",
            span.index + 1,
            spans.len(),
            span.offset,
            span.height
        );
        match detect_chunk(image, span, collaborator, options).await {
            Ok(found) => {
                info!("chunk {} yielded {} regions", span.index + 1, found.len());
                report.regions.extend(found);
                report.chunks_processed += 1;
            }
            Err(err) => {
                warn!("{:#}", err);
                report.failure = Some(err);
                break;
            }
        }
    }
    report
}
