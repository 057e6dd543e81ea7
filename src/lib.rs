use anyhow::{Context, Result, anyhow};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub mod clean;
pub mod compositor;
pub mod data;
pub mod detect;
pub mod editor;
pub mod geometry;
pub mod logging;
mod providers;
pub mod region;
pub mod selection;
pub mod server;
pub mod settings;
#[cfg(test)]
mod test_util;

pub use editor::{Editor, SourceImage};
pub use geometry::{PercentBox, PixelRect};
pub use providers::{Collaborator, ContentItem, ContentPart, Gemini, InlineData, ProviderFuture};
pub use region::{Region, RegionStatus};

#[derive(Debug, Clone)]
pub struct Config {
    pub data: String,
    pub output: Option<String>,
    pub detect: bool,
    pub regions: Vec<PixelRect>,
    pub passes: u32,
    pub key: Option<String>,
    pub detect_model: Option<String>,
    pub clean_model: Option<String>,
    pub settings_path: Option<String>,
}

pub async fn run(config: Config) -> Result<String> {
    let settings_path = config.settings_path.as_deref().map(Path::new);
    let settings = settings::load_settings(settings_path)?;
    let key = providers::resolve_key(config.key.as_deref())
        .with_context(|| "no API key found for Gemini")?;

    let mut gemini = Gemini::new(key)
        .with_detect_model(
            config
                .detect_model
                .clone()
                .unwrap_or_else(|| settings.detect_model.clone()),
        )
        .with_clean_model(
            config
                .clean_model
                .clone()
                .unwrap_or_else(|| settings.clean_model.clone()),
        );
    if let Some(base_url) = settings.gemini_base_url.as_deref() {
        gemini = gemini.with_base_url(base_url);
    }

    let attachment = data::load_attachment(Path::new(&config.data))?;
    let source = SourceImage::from_attachment(&attachment)?;
    let mut editor = Editor::new(&settings);
    editor.load_image(source);

    process(&mut editor, &gemini, &config).await?;

    let output = config
        .output
        .as_deref()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(&settings.output_file_name));
    let written = editor.export(&output)?;
    Ok(format_summary(editor.regions(), &written))
}

/// Detect (optionally), add manual boxes, then run the requested clean passes.
async fn process<C>(editor: &mut Editor, collaborator: &C, config: &Config) -> Result<()>
where
    C: Collaborator + ?Sized,
{
    if config.detect {
        match editor.detect_all(collaborator).await {
            Ok(found) => info!("detected {} regions", found),
            Err(err) => warn!("{:#}", err),
        }
    }

    for rect in &config.regions {
        if add_manual_region(editor, rect).is_none() {
            warn!(
                "ignored region {},{},{},{}: too small or outside the image",
                rect.x, rect.y, rect.width, rect.height
            );
        }
    }

    if editor.regions().is_empty() {
        return Err(anyhow!(
            "no regions to clean; pass --region x,y,w,h to mark text manually"
        ));
    }

    for _ in 0..config.passes.max(1) {
        let summary = editor.clean_all(collaborator).await?;
        if summary.attempted == 0 {
            break;
        }
    }
    Ok(())
}

/// Feeds a rectangle through the same drag gesture a pointer would make, on a
/// display that shows the image at its natural size.
fn add_manual_region(editor: &mut Editor, rect: &PixelRect) -> Option<uuid::Uuid> {
    let (width, height) = editor
        .source()
        .map(|source| (source.width(), source.height()))?;
    let display = geometry::DisplayRect {
        left: 0.0,
        top: 0.0,
        width: width as f64,
        height: height as f64,
    };
    editor.pointer_down(geometry::Point { x: rect.x, y: rect.y }, &display);
    editor.pointer_move(
        geometry::Point {
            x: rect.x + rect.width,
            y: rect.y + rect.height,
        },
        &display,
    );
    editor.pointer_up()
}

fn format_summary(regions: &[Region], written: &Path) -> String {
    let mut lines = regions
        .iter()
        .map(|region| {
            format!(
                "{} {} {},{},{},{}",
                region.id(),
                region.status().as_str(),
                region.x().round(),
                region.y().round(),
                region.width().round(),
                region.height().round()
            )
        })
        .collect::<Vec<_>>();
    lines.push(format!("saved: {}", written.display()));
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::Settings;
    use crate::test_util::{ScriptedCollaborator, blank_image, solid_png_data_uri};

    fn config(detect: bool, regions: Vec<PixelRect>, passes: u32) -> Config {
        Config {
            data: String::new(),
            output: None,
            detect,
            regions,
            passes,
            key: None,
            detect_model: None,
            clean_model: None,
            settings_path: None,
        }
    }

    fn editor(width: u32, height: u32) -> Editor {
        let mut editor = Editor::new(&Settings::default());
        editor.load_image(SourceImage::from_image(blank_image(width, height)));
        editor
    }

    fn rect(x: f64, y: f64, width: f64, height: f64) -> PixelRect {
        PixelRect {
            x,
            y,
            width,
            height,
        }
    }

    #[tokio::test]
    async fn manual_regions_are_cleaned_without_detection() {
        let mut editor = editor(200, 200);
        let collaborator =
            ScriptedCollaborator::new().clean_ok(solid_png_data_uri(40, 30, [255, 255, 255, 255]));
        let config = config(false, vec![rect(10.0, 20.0, 40.0, 30.0)], 1);

        process(&mut editor, &collaborator, &config)
            .await
            .expect("process");

        assert!(collaborator.detect_calls().is_empty());
        assert_eq!(editor.regions().len(), 1);
        assert_eq!(editor.regions()[0].status(), RegionStatus::Cleaned);
        assert_eq!(editor.regions()[0].rect(), &rect(10.0, 20.0, 40.0, 30.0));
    }

    #[tokio::test]
    async fn tiny_manual_region_is_ignored() {
        let mut editor = editor(200, 200);
        let collaborator = ScriptedCollaborator::new();
        let config = config(false, vec![rect(10.0, 10.0, 8.0, 40.0)], 1);

        let err = process(&mut editor, &collaborator, &config)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("no regions"));
    }

    #[tokio::test]
    async fn region_mostly_off_the_page_is_ignored() {
        let mut editor = editor(1000, 1000);
        let collaborator = ScriptedCollaborator::new();
        let config = config(false, vec![rect(995.0, 0.0, 50.0, 50.0)], 1);

        let err = process(&mut editor, &collaborator, &config)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("no regions"));
        assert!(collaborator.clean_calls().is_empty());
    }

    #[tokio::test]
    async fn detection_failure_still_cleans_manual_regions() {
        let mut editor = editor(100, 100);
        let collaborator = ScriptedCollaborator::new()
            .detect_err("quota")
            .clean_ok(solid_png_data_uri(20, 20, [255, 255, 255, 255]));
        let config = config(true, vec![rect(0.0, 0.0, 20.0, 20.0)], 1);

        process(&mut editor, &collaborator, &config)
            .await
            .expect("process");
        assert_eq!(editor.regions()[0].status(), RegionStatus::Cleaned);
    }

    #[tokio::test]
    async fn second_pass_retries_failed_regions() {
        let mut editor = editor(100, 100);
        let collaborator = ScriptedCollaborator::new()
            .detect_ok(vec![PercentBox {
                ymin: 10.0,
                xmin: 10.0,
                ymax: 30.0,
                xmax: 30.0,
            }])
            .clean_err("busy")
            .clean_ok(solid_png_data_uri(22, 22, [255, 255, 255, 255]));
        let config = config(true, Vec::new(), 2);

        process(&mut editor, &collaborator, &config)
            .await
            .expect("process");
        assert_eq!(collaborator.clean_calls().len(), 2);
        assert_eq!(editor.regions()[0].status(), RegionStatus::Cleaned);
    }

    #[test]
    fn summary_lists_regions_then_path() {
        let region = Region::new(rect(1.4, 2.6, 30.0, 40.0), 100, 100).expect("region");
        let id = region.id();
        let summary = format_summary(&[region], Path::new("out.png"));
        assert_eq!(summary, format!("{} idle 1,3,30,40\nsaved: out.png", id));
    }
}
