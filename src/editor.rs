use anyhow::{Context, Result, anyhow};
use image::{DynamicImage, RgbaImage};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::info;
use uuid::Uuid;

use crate::clean::{self, CleanSummary};
use crate::compositor;
use crate::data::DataAttachment;
use crate::detect::{self, DetectOptions};
use crate::geometry::{self, DisplayRect, PercentBox, PixelRect, Point};
use crate::providers::Collaborator;
use crate::region::{Region, RegionStatus};
use crate::selection::SelectionTool;
use crate::settings::Settings;

pub const DETECT_FAILED_MESSAGE: &str = "Failed to detect text. You can draw boxes manually.";

/// The loaded page. Never mutated; cleaning works on copies.
#[derive(Debug, Clone)]
pub struct SourceImage {
    image: DynamicImage,
    mime: Option<String>,
}

impl SourceImage {
    pub fn from_attachment(attachment: &DataAttachment) -> Result<Self> {
        let image = image::load_from_memory(&attachment.bytes).with_context(|| {
            format!(
                "failed to decode image{}",
                attachment
                    .name
                    .as_deref()
                    .map(|name| format!(" '{}'", name))
                    .unwrap_or_default()
            )
        })?;
        Ok(Self {
            image,
            mime: Some(attachment.mime.clone()),
        })
    }

    pub fn from_image(image: DynamicImage) -> Self {
        Self { image, mime: None }
    }

    pub fn image(&self) -> &DynamicImage {
        &self.image
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn mime(&self) -> Option<&str> {
        self.mime.as_deref()
    }

    fn size(&self) -> (u32, u32) {
        (self.width(), self.height())
    }
}

/// Region placement as a percentage of the image, for overlays on a scaled
/// display.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct OverlayBox {
    pub id: Uuid,
    pub status: RegionStatus,
    pub placement: PercentBox,
}

/// Owns the page, its regions and the composited output. Every mutation goes
/// through here and is followed by a redraw when it can change pixels.
/// Detect and clean hold `&mut self` until they finish, so nothing else can
/// touch the editor while one is running.
#[derive(Debug, Default)]
pub struct Editor {
    source: Option<SourceImage>,
    regions: Vec<Region>,
    selection: SelectionTool,
    surface: Option<RgbaImage>,
    detect_options: DetectOptions,
}

impl Editor {
    pub fn new(settings: &Settings) -> Self {
        Self {
            selection: SelectionTool::new(settings.min_selection_size),
            detect_options: DetectOptions::from(settings),
            ..Self::default()
        }
    }

    /// Replaces the page. Regions belong to one image, so they are dropped.
    pub fn load_image(&mut self, source: SourceImage) {
        info!(
            "loaded {} image {}x{}",
            source.mime().unwrap_or("decoded"),
            source.width(),
            source.height()
        );
        self.source = Some(source);
        self.regions.clear();
        self.selection = SelectionTool::new(self.selection.min_size());
        self.redraw();
    }

    pub fn clear(&mut self) {
        self.source = None;
        self.regions.clear();
        self.surface = None;
        self.selection = SelectionTool::new(self.selection.min_size());
    }

    pub fn source(&self) -> Option<&SourceImage> {
        self.source.as_ref()
    }

    pub fn regions(&self) -> &[Region] {
        &self.regions
    }

    pub fn surface(&self) -> Option<&RgbaImage> {
        self.surface.as_ref()
    }

    pub fn selection(&self) -> &SelectionTool {
        &self.selection
    }

    /// Regions still waiting for their first cleaning attempt.
    pub fn pending_count(&self) -> usize {
        self.regions
            .iter()
            .filter(|region| region.status() == RegionStatus::Idle)
            .count()
    }

    pub fn overlay_boxes(&self) -> Vec<OverlayBox> {
        let Some(source) = self.source.as_ref() else {
            return Vec::new();
        };
        self.regions
            .iter()
            .map(|region| OverlayBox {
                id: region.id(),
                status: region.status(),
                placement: geometry::image_to_percent(
                    region.rect(),
                    source.width() as f64,
                    source.height() as f64,
                ),
            })
            .collect()
    }

    /// Adds an idle region in image pixels. Returns its id, or `None` when the
    /// rectangle falls outside the image.
    pub fn add_region(&mut self, rect: PixelRect) -> Option<Uuid> {
        let (width, height) = self.source.as_ref()?.size();
        let region = Region::new(rect, width, height)?;
        let id = region.id();
        self.regions.push(region);
        Some(id)
    }

    /// Removes a region unless it is being cleaned right now.
    pub fn remove_region(&mut self, id: Uuid) -> bool {
        let Some(index) = self.regions.iter().position(|region| region.id() == id) else {
            return false;
        };
        if self.regions[index].status() == RegionStatus::Cleaning {
            return false;
        }
        let removed = self.regions.remove(index);
        if removed.status() == RegionStatus::Cleaned {
            self.redraw();
        }
        true
    }

    pub fn pointer_down(&mut self, pointer: Point, display: &DisplayRect) {
        let Some(size) = self.source.as_ref().map(SourceImage::size) else {
            return;
        };
        self.selection.begin(pointer, display, size);
    }

    pub fn pointer_move(&mut self, pointer: Point, display: &DisplayRect) {
        let Some(size) = self.source.as_ref().map(SourceImage::size) else {
            return;
        };
        self.selection.update(pointer, display, size);
    }

    pub fn pointer_up(&mut self) -> Option<Uuid> {
        let rect = self.selection.finish()?;
        self.add_region(rect)
    }

    pub fn pointer_leave(&mut self) -> Option<Uuid> {
        let rect = self.selection.leave()?;
        self.add_region(rect)
    }

    /// Runs chunked detection and appends what it finds. Regions from chunks
    /// that succeeded stay even when a later chunk fails.
    pub async fn detect_all<C>(&mut self, collaborator: &C) -> Result<usize>
    where
        C: Collaborator + ?Sized,
    {
        let Some(source) = self.source.as_ref() else {
            return Err(anyhow!("no image loaded"));
        };
        let report =
            detect::detect_regions(source.image(), collaborator, &self.detect_options).await;

        let found = report.regions.len();
        self.regions.extend(report.regions);
        info!(
            "detection added {} regions from {}/{} chunks",
            found, report.chunks_processed, report.chunks_total
        );
        match report.failure {
            Some(err) => Err(err.context(DETECT_FAILED_MESSAGE)),
            None => Ok(found),
        }
    }

    /// Cleans idle and failed regions one by one, redrawing whenever a patch
    /// lands.
    pub async fn clean_all<C>(&mut self, collaborator: &C) -> Result<CleanSummary>
    where
        C: Collaborator + ?Sized,
    {
        let Editor {
            source,
            regions,
            surface,
            ..
        } = self;
        let Some(source) = source.as_ref() else {
            return Err(anyhow!("no image loaded"));
        };
        let mut drawn = cleaned_count(regions);
        let summary = clean::clean_regions(source.image(), regions, collaborator, |list| {
            let now = cleaned_count(list);
            if now != drawn {
                *surface = Some(compositor::render(source.image(), list));
                drawn = now;
            }
        })
        .await;
        info!(
            "cleaned {}/{} regions ({} failed)",
            summary.cleaned, summary.attempted, summary.failed
        );
        Ok(summary)
    }

    pub fn redraw(&mut self) {
        self.surface = self
            .source
            .as_ref()
            .map(|source| compositor::render(source.image(), &self.regions));
    }

    /// Exports the last completed draw as PNG.
    pub fn export(&mut self, path: &Path) -> Result<PathBuf> {
        if self.surface.is_none() {
            self.redraw();
        }
        let surface = self
            .surface
            .as_ref()
            .ok_or_else(|| anyhow!("no image loaded"))?;
        compositor::export_png(surface, path)
    }
}

fn cleaned_count(regions: &[Region]) -> usize {
    regions
        .iter()
        .filter(|region| region.status() == RegionStatus::Cleaned)
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::{ScriptedCollaborator, blank_image, solid_png_data_uri};

    fn editor_with(width: u32, height: u32) -> Editor {
        let mut editor = Editor::default();
        editor.load_image(SourceImage::from_image(blank_image(width, height)));
        editor
    }

    fn display(width: f64, height: f64) -> DisplayRect {
        DisplayRect {
            left: 0.0,
            top: 0.0,
            width,
            height,
        }
    }

    #[test]
    fn attachment_keeps_its_media_type() {
        let png = crate::data::encode_png(&blank_image(8, 6)).expect("png");
        let source = SourceImage::from_attachment(&png).expect("source");
        assert_eq!(source.mime(), Some("image/png"));
        assert_eq!((source.width(), source.height()), (8, 6));
        assert_eq!(SourceImage::from_image(blank_image(1, 1)).mime(), None);
    }

    #[test]
    fn loading_a_new_image_discards_regions() {
        let mut editor = editor_with(100, 100);
        editor
            .add_region(PixelRect {
                x: 1.0,
                y: 1.0,
                width: 20.0,
                height: 20.0,
            })
            .expect("region");
        assert_eq!(editor.regions().len(), 1);
        editor.load_image(SourceImage::from_image(blank_image(50, 50)));
        assert!(editor.regions().is_empty());
        assert_eq!(editor.surface().map(|s| s.dimensions()), Some((50, 50)));
    }

    #[test]
    fn pointer_drag_commits_one_idle_region() {
        let mut editor = editor_with(1000, 1000);
        let view = display(500.0, 500.0);
        editor.pointer_down(Point { x: 10.0, y: 10.0 }, &view);
        editor.pointer_move(Point { x: 15.5, y: 15.5 }, &view);
        let id = editor.pointer_up().expect("committed");
        let region = &editor.regions()[0];
        assert_eq!(region.id(), id);
        assert_eq!(region.status(), RegionStatus::Idle);
        assert_eq!((region.width(), region.height()), (11.0, 11.0));
        assert_eq!(editor.pending_count(), 1);

        editor.pointer_down(Point { x: 10.0, y: 10.0 }, &view);
        editor.pointer_move(Point { x: 15.0, y: 100.0 }, &view);
        assert!(editor.pointer_leave().is_none());
        assert_eq!(editor.regions().len(), 1);
    }

    #[test]
    fn drag_hanging_off_the_edge_is_sized_after_clamping() {
        let mut editor = editor_with(1000, 1000);
        let view = display(1000.0, 1000.0);
        editor.pointer_down(Point { x: 995.0, y: 100.0 }, &view);
        editor.pointer_move(Point { x: 1045.0, y: 150.0 }, &view);
        assert!(editor.pointer_leave().is_none());
        assert!(editor.regions().is_empty());

        editor.pointer_down(Point { x: 950.0, y: 100.0 }, &view);
        editor.pointer_move(Point { x: 1045.0, y: 150.0 }, &view);
        editor.pointer_up().expect("committed");
        let region = &editor.regions()[0];
        assert_eq!((region.x(), region.width()), (950.0, 50.0));
    }

    #[test]
    fn drags_without_an_image_do_nothing() {
        let mut editor = Editor::default();
        editor.pointer_down(Point { x: 0.0, y: 0.0 }, &display(10.0, 10.0));
        assert!(!editor.selection().is_drawing());
        assert!(editor.pointer_up().is_none());
    }

    #[test]
    fn overlays_are_percent_of_image() {
        let mut editor = editor_with(200, 400);
        editor
            .add_region(PixelRect {
                x: 50.0,
                y: 100.0,
                width: 100.0,
                height: 200.0,
            })
            .expect("region");
        let overlay = editor.overlay_boxes();
        assert_eq!(
            overlay[0].placement,
            PercentBox {
                ymin: 25.0,
                xmin: 25.0,
                ymax: 75.0,
                xmax: 75.0
            }
        );
    }

    #[tokio::test]
    async fn detection_appends_to_existing_regions() {
        let mut editor = editor_with(100, 100);
        editor
            .add_region(PixelRect {
                x: 0.0,
                y: 0.0,
                width: 20.0,
                height: 20.0,
            })
            .expect("manual");
        let collaborator = ScriptedCollaborator::new().detect_ok(vec![PercentBox {
            ymin: 50.0,
            xmin: 50.0,
            ymax: 70.0,
            xmax: 70.0,
        }]);
        let found = editor.detect_all(&collaborator).await.expect("detect");
        assert_eq!(found, 1);
        assert_eq!(editor.regions().len(), 2);
    }

    #[tokio::test]
    async fn detection_failure_surfaces_single_message() {
        let mut editor = editor_with(100, 100);
        let collaborator = ScriptedCollaborator::new().detect_err("HTTP 500");
        let err = editor.detect_all(&collaborator).await.unwrap_err();
        assert_eq!(err.to_string(), DETECT_FAILED_MESSAGE);
        assert!(editor.regions().is_empty());
    }

    #[tokio::test]
    async fn clean_then_export_reflects_patches() {
        let mut editor = editor_with(40, 40);
        let id = editor
            .add_region(PixelRect {
                x: 10.0,
                y: 10.0,
                width: 12.0,
                height: 12.0,
            })
            .expect("region");
        let collaborator =
            ScriptedCollaborator::new().clean_ok(solid_png_data_uri(12, 12, [255, 255, 255, 255]));
        let summary = editor.clean_all(&collaborator).await.expect("clean");
        assert_eq!(summary.cleaned, 1);
        assert_eq!(editor.pending_count(), 0);

        let surface = editor.surface().expect("surface");
        assert_eq!(surface.get_pixel(15, 15).0, [255, 255, 255, 255]);
        assert_eq!(surface.get_pixel(5, 5).0, [0, 0, 0, 255]);

        let again = editor.clean_all(&ScriptedCollaborator::new()).await.expect("clean");
        assert_eq!(again.attempted, 0);

        let dir = tempfile::tempdir().expect("tempdir");
        let path = editor
            .export(&dir.path().join(compositor::DEFAULT_EXPORT_NAME))
            .expect("export");
        let exported = image::open(&path).expect("open").to_rgba8();
        assert_eq!(exported.get_pixel(15, 15).0, [255, 255, 255, 255]);

        assert!(editor.remove_region(id));
        assert_eq!(
            editor.surface().expect("surface").get_pixel(15, 15).0,
            [0, 0, 0, 255]
        );
    }

    #[tokio::test]
    async fn operations_need_an_image() {
        let mut editor = Editor::default();
        let collaborator = ScriptedCollaborator::new();
        assert!(editor.detect_all(&collaborator).await.is_err());
        assert!(editor.clean_all(&collaborator).await.is_err());
        assert!(editor.export(Path::new("unused.png")).is_err());
    }
}
