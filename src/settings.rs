use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

const DEFAULT_SETTINGS_TOML: &str = include_str!("../settings.toml");

#[derive(Debug, Clone)]
pub struct Settings {
    pub detect_model: String,
    pub chunk_height: u32,
    pub max_dimension: u32,
    pub padding_ratio: f64,
    pub jpeg_quality: u8,
    pub clean_model: String,
    pub min_selection_size: f64,
    pub server_addr: String,
    pub server_model: String,
    pub gemini_base_url: Option<String>,
    pub output_file_name: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            detect_model: "gemini-2.5-flash".to_string(),
            chunk_height: 2048,
            max_dimension: 2048,
            padding_ratio: 0.05,
            jpeg_quality: 80,
            clean_model: "gemini-2.5-flash-image".to_string(),
            min_selection_size: 10.0,
            server_addr: "127.0.0.1:8787".to_string(),
            server_model: "gemini-2.5-flash".to_string(),
            gemini_base_url: None,
            output_file_name: crate::compositor::DEFAULT_EXPORT_NAME.to_string(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct SettingsFile {
    detect: Option<DetectSettings>,
    clean: Option<CleanSettings>,
    selection: Option<SelectionSettings>,
    server: Option<ServerSettings>,
    output: Option<OutputSettings>,
}

#[derive(Debug, Default, Deserialize)]
struct DetectSettings {
    model: Option<String>,
    chunk_height: Option<u32>,
    max_dimension: Option<u32>,
    padding_ratio: Option<f64>,
    jpeg_quality: Option<u8>,
}

#[derive(Debug, Default, Deserialize)]
struct CleanSettings {
    model: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct SelectionSettings {
    min_size: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerSettings {
    addr: Option<String>,
    model: Option<String>,
    gemini_base_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct OutputSettings {
    file_name: Option<String>,
}

pub fn load_settings(extra_path: Option<&Path>) -> Result<Settings> {
    let mut settings = Settings::default();
    settings.merge_str(DEFAULT_SETTINGS_TOML, Path::new("<embedded settings.toml>"))?;
    ensure_home_settings_file()?;

    let mut ordered_paths = Vec::new();
    ordered_paths.push(PathBuf::from("settings.toml"));
    ordered_paths.push(PathBuf::from("settings.local.toml"));

    if let Some(home) = home_dir() {
        ordered_paths.push(home.join("settings.toml"));
        ordered_paths.push(home.join("settings.local.toml"));
    }

    if let Some(extra) = extra_path {
        if !extra.exists() {
            return Err(anyhow!("settings file not found: {}", extra.display()));
        }
        ordered_paths.push(extra.to_path_buf());
    }

    for path in ordered_paths {
        if path.exists() {
            let content = fs::read_to_string(&path)
                .with_context(|| format!("failed to read settings: {}", path.display()))?;
            settings.merge_str(&content, &path)?;
        }
    }

    Ok(settings)
}

impl Settings {
    pub(crate) fn merge_str(&mut self, content: &str, origin: &Path) -> Result<()> {
        let parsed: SettingsFile = toml::from_str(content)
            .with_context(|| format!("failed to parse settings: {}", origin.display()))?;
        self.merge(parsed);
        Ok(())
    }

    fn merge(&mut self, incoming: SettingsFile) {
        if let Some(detect) = incoming.detect {
            if let Some(model) = non_empty(detect.model) {
                self.detect_model = model;
            }
            if let Some(height) = detect.chunk_height.filter(|value| *value > 0) {
                self.chunk_height = height;
            }
            if let Some(max) = detect.max_dimension.filter(|value| *value > 0) {
                self.max_dimension = max;
            }
            if let Some(ratio) = detect.padding_ratio.filter(|value| *value >= 0.0) {
                self.padding_ratio = ratio;
            }
            if let Some(quality) = detect.jpeg_quality.filter(|value| (1..=100).contains(value)) {
                self.jpeg_quality = quality;
            }
        }
        if let Some(clean) = incoming.clean {
            if let Some(model) = non_empty(clean.model) {
                self.clean_model = model;
            }
        }
        if let Some(selection) = incoming.selection {
            if let Some(size) = selection.min_size.filter(|value| *value >= 0.0) {
                self.min_selection_size = size;
            }
        }
        if let Some(server) = incoming.server {
            if let Some(addr) = non_empty(server.addr) {
                self.server_addr = addr;
            }
            if let Some(model) = non_empty(server.model) {
                self.server_model = model;
            }
            if let Some(url) = non_empty(server.gemini_base_url) {
                self.gemini_base_url = Some(url);
            }
        }
        if let Some(output) = incoming.output {
            if let Some(name) = non_empty(output.file_name) {
                self.output_file_name = name;
            }
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.trim().is_empty())
}

fn ensure_home_settings_file() -> Result<()> {
    let Some(home) = home_dir() else {
        return Ok(());
    };
    fs::create_dir_all(&home)
        .with_context(|| format!("failed to create settings directory: {}", home.display()))?;
    let path = home.join("settings.toml");
    if !path.exists() {
        fs::write(&path, DEFAULT_SETTINGS_TOML)
            .with_context(|| format!("failed to write settings: {}", path.display()))?;
    }
    Ok(())
}

fn home_dir() -> Option<PathBuf> {
    std::env::var("HOME").ok().and_then(|home| {
        let home = home.trim();
        if home.is_empty() {
            None
        } else {
            Some(Path::new(home).join(".manga-cleaner-rust"))
        }
    })
}
