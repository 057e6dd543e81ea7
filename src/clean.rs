use anyhow::{Result, anyhow};
use image::DynamicImage;
use tracing::{debug, info, warn};

use crate::data;
use crate::providers::Collaborator;
use crate::region::{CleanedPatch, Region};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanSummary {
    pub attempted: usize,
    pub cleaned: usize,
    pub failed: usize,
}

/// Copies the region's pixels out of the source image at their original size.
pub fn crop_region(image: &DynamicImage, region: &Region) -> Result<DynamicImage> {
    let bounds = region
        .bounds(image.width(), image.height())
        .ok_or_else(|| anyhow!("region {} lies outside the image", region.id()))?;
    Ok(image.crop_imm(bounds.x, bounds.y, bounds.width, bounds.height))
}

async fn request_patch<C>(
    image: &DynamicImage,
    region: &Region,
    collaborator: &C,
) -> Result<CleanedPatch>
where
    C: Collaborator + ?Sized,
{
    let crop = crop_region(image, region)?;
    let attachment = data::encode_png(&crop)?;
    let data_uri = collaborator.clean_text_region(attachment).await?;
    let patch = CleanedPatch::from_data_uri(data_uri)?;
    debug!(
        "patch for region {}: {} {}x{} ({} byte data URI)",
        region.id(),
        patch.mime(),
        patch.raster().width(),
        patch.raster().height(),
        patch.data_uri().len()
    );
    Ok(patch)
}

/// Cleans every idle or failed region, one at a time. A failure marks that
/// region as `Error` and the loop moves on. `on_change` sees the list after
/// each status transition.
pub async fn clean_regions<C, F>(
    image: &DynamicImage,
    regions: &mut [Region],
    collaborator: &C,
    mut on_change: F,
) -> CleanSummary
where
    C: Collaborator + ?Sized,
    F: FnMut(&[Region]),
{
    let pending: Vec<usize> = regions
        .iter()
        .enumerate()
        .filter(|(_, region)| region.status().is_cleanable())
        .map(|(index, _)| index)
        .collect();

    let mut summary = CleanSummary::default();
    for index in pending {
        summary.attempted += 1;
        regions[index].mark_cleaning();
        on_change(&*regions);

        let outcome = request_patch(image, &regions[index], collaborator).await;
        let region = &mut regions[index];
        match outcome {
            Ok(patch) => {
                info!("cleaned region {}", region.id());
                region.mark_cleaned(patch);
                summary.cleaned += 1;
            }
            Err(err) => {
                warn!("failed to clean region {}: {:#}", region.id(), err);
                region.mark_error();
                summary.failed += 1;
            }
        }
        on_change(&*regions);
    }
    summary
}
