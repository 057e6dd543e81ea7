use anyhow::{Context, Result};
use image::imageops::{self, FilterType};
use image::{DynamicImage, ImageFormat, RgbaImage};
use std::path::{Path, PathBuf};

use crate::region::{Region, RegionStatus};

pub const DEFAULT_EXPORT_NAME: &str = "cleaned-manga.png";

/// Draws the base image, then every cleaned patch in list order. The output
/// depends only on the inputs, so calling it again after any change is safe.
pub fn render(source: &DynamicImage, regions: &[Region]) -> RgbaImage {
    let mut surface = source.to_rgba8();
    let (width, height) = surface.dimensions();
    for region in regions {
        if region.status() != RegionStatus::Cleaned {
            continue;
        }
        let (Some(patch), Some(bounds)) = (region.cleaned_image(), region.bounds(width, height))
        else {
            continue;
        };
        let raster = patch.raster();
        if raster.dimensions() == (bounds.width, bounds.height) {
            imageops::overlay(&mut surface, raster, bounds.x as i64, bounds.y as i64);
        } else {
            let fitted = imageops::resize(raster, bounds.width, bounds.height, FilterType::Triangle);
            imageops::overlay(&mut surface, &fitted, bounds.x as i64, bounds.y as i64);
        }
    }
    surface
}

/// Writes the surface as PNG. The file is written next to its destination
/// first and renamed into place.
pub fn export_png(surface: &RgbaImage, path: &Path) -> Result<PathBuf> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("failed to create output dir: {}", dir.display()))?;
    let mut file = tempfile::Builder::new()
        .prefix(".manga-cleaner-")
        .suffix(".png")
        .tempfile_in(&dir)
        .with_context(|| "failed to create temp export file")?;
    surface
        .write_to(&mut file, ImageFormat::Png)
        .with_context(|| "failed to encode export PNG")?;
    file.persist(path)
        .with_context(|| format!("failed to write export: {}", path.display()))?;
    Ok(path.to_path_buf())
}
