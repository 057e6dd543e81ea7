use std::path::Path;

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use manga_cleaner_rust::PixelRect;

#[derive(Parser, Debug)]
#[command(
    name = "manga-cleaner-rust",
    version,
    about = "Remove text from manga and webtoon pages with Gemini"
)]
struct Cli {
    /// Page image to clean (png/jpeg/webp)
    #[arg(short = 'd', long = "data")]
    data: Option<String>,

    /// Where to write the cleaned PNG (default from settings [output])
    #[arg(short = 'o', long = "output")]
    output: Option<String>,

    /// Skip automatic text detection and only clean --region boxes
    #[arg(long = "no-detect")]
    no_detect: bool,

    /// Manual region in image pixels: x,y,width,height (repeatable)
    #[arg(short = 'R', long = "region", value_parser = parse_region)]
    regions: Vec<PixelRect>,

    /// Clean passes; later passes retry regions that failed
    #[arg(long = "passes", default_value_t = 1)]
    passes: u32,

    /// API key (overrides GEMINI_API_KEY / GOOGLE_API_KEY)
    #[arg(short = 'k', long = "key")]
    key: Option<String>,

    /// Model used to find text regions
    #[arg(long = "detect-model")]
    detect_model: Option<String>,

    /// Model used to paint text out
    #[arg(long = "clean-model")]
    clean_model: Option<String>,

    /// Read extra settings from a local TOML file
    #[arg(short = 'r', long = "read-settings")]
    read_settings: Option<String>,

    /// Enable verbose logging
    #[arg(long = "verbose")]
    verbose: bool,

    /// Run the Gemini proxy server (optional bind address)
    #[arg(long = "server", num_args = 0..=1, default_missing_value = "")]
    server: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    manga_cleaner_rust::logging::init(cli.verbose)?;

    if let Some(addr) = cli.server.as_deref() {
        return run_server(&cli, addr).await;
    }

    let data = cli
        .data
        .ok_or_else(|| anyhow!("--data is required (path to the page image)"))?;
    let output = manga_cleaner_rust::run(manga_cleaner_rust::Config {
        data,
        output: cli.output,
        detect: !cli.no_detect,
        regions: cli.regions,
        passes: cli.passes,
        key: cli.key,
        detect_model: cli.detect_model,
        clean_model: cli.clean_model,
        settings_path: cli.read_settings,
    })
    .await?;

    println!("{}", output);
    Ok(())
}

async fn run_server(cli: &Cli, addr: &str) -> Result<()> {
    let settings_path = cli.read_settings.as_deref().map(Path::new);
    let mut settings = manga_cleaner_rust::settings::load_settings(settings_path)?;
    if !addr.trim().is_empty() {
        settings.server_addr = addr.trim().to_string();
    }
    let key = manga_cleaner_rust::server::resolve_server_key(cli.key.as_deref());
    manga_cleaner_rust::server::run_server(settings, key).await
}

fn parse_region(value: &str) -> Result<PixelRect> {
    let numbers = value
        .split(',')
        .map(|part| {
            part.trim()
                .parse::<f64>()
                .with_context(|| format!("invalid number in region: {}", part))
        })
        .collect::<Result<Vec<_>>>()?;
    let &[x, y, width, height] = numbers.as_slice() else {
        return Err(anyhow!("region must be x,y,width,height: {}", value));
    };
    let finite = [x, y, width, height].iter().all(|number| number.is_finite());
    if !finite || width <= 0.0 || height <= 0.0 {
        return Err(anyhow!("region must have a positive size: {}", value));
    }
    Ok(PixelRect {
        x,
        y,
        width,
        height,
    })
}
