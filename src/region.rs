use anyhow::{Context, Result};
use image::RgbaImage;
use serde::Serialize;
use uuid::Uuid;

use crate::data;
use crate::geometry::{PixelBounds, PixelRect};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RegionStatus {
    Idle,
    Cleaning,
    Cleaned,
    Error,
}

impl RegionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RegionStatus::Idle => "idle",
            RegionStatus::Cleaning => "cleaning",
            RegionStatus::Cleaned => "cleaned",
            RegionStatus::Error => "error",
        }
    }

    /// Regions the cleaner picks up: fresh ones and failed ones.
    pub fn is_cleanable(&self) -> bool {
        matches!(self, RegionStatus::Idle | RegionStatus::Error)
    }
}

/// A cleaned patch returned by the cleaning model. The raster is decoded when
/// the patch is built, so anything holding a `CleanedPatch` can draw it.
#[derive(Debug, Clone)]
pub struct CleanedPatch {
    data_uri: String,
    mime: String,
    raster: RgbaImage,
}

impl CleanedPatch {
    pub fn from_data_uri(data_uri: String) -> Result<Self> {
        let (mime, bytes) = data::parse_data_uri(&data_uri)?;
        let raster = image::load_from_memory(&bytes)
            .with_context(|| format!("failed to decode cleaned patch ({})", mime))?
            .to_rgba8();
        Ok(Self {
            data_uri,
            mime,
            raster,
        })
    }

    pub fn data_uri(&self) -> &str {
        &self.data_uri
    }

    pub fn mime(&self) -> &str {
        &self.mime
    }

    pub fn raster(&self) -> &RgbaImage {
        &self.raster
    }
}

#[derive(Debug, Clone)]
pub struct Region {
    id: Uuid,
    rect: PixelRect,
    status: RegionStatus,
    cleaned_image: Option<CleanedPatch>,
}

impl Region {
    /// Builds an idle region clamped to the image. Returns `None` when the
    /// rectangle has no area inside the image.
    pub fn new(rect: PixelRect, image_width: u32, image_height: u32) -> Option<Self> {
        let rect = rect.clamp_to(image_width as f64, image_height as f64)?;
        Some(Self {
            id: Uuid::new_v4(),
            rect,
            status: RegionStatus::Idle,
            cleaned_image: None,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn rect(&self) -> &PixelRect {
        &self.rect
    }

    pub fn x(&self) -> f64 {
        self.rect.x
    }

    pub fn y(&self) -> f64 {
        self.rect.y
    }

    pub fn width(&self) -> f64 {
        self.rect.width
    }

    pub fn height(&self) -> f64 {
        self.rect.height
    }

    pub fn status(&self) -> RegionStatus {
        self.status
    }

    pub fn cleaned_image(&self) -> Option<&CleanedPatch> {
        self.cleaned_image.as_ref()
    }

    pub fn bounds(&self, image_width: u32, image_height: u32) -> Option<PixelBounds> {
        self.rect.to_bounds(image_width, image_height)
    }

    pub(crate) fn mark_cleaning(&mut self) {
        self.status = RegionStatus::Cleaning;
        self.cleaned_image = None;
    }

    pub(crate) fn mark_cleaned(&mut self, patch: CleanedPatch) {
        self.status = RegionStatus::Cleaned;
        self.cleaned_image = Some(patch);
    }

    pub(crate) fn mark_error(&mut self) {
        self.status = RegionStatus::Error;
        self.cleaned_image = None;
    }
}
