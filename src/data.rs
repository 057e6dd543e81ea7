use anyhow::{Context, Result, anyhow};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageFormat};
use std::io::Cursor;
use std::path::Path;

pub const PNG_MIME: &str = "image/png";
pub const JPEG_MIME: &str = "image/jpeg";
pub const WEBP_MIME: &str = "image/webp";

/// Encoded image bytes plus their media type, as sent to a collaborator.
#[derive(Debug, Clone)]
pub struct DataAttachment {
    pub bytes: Vec<u8>,
    pub mime: String,
    pub name: Option<String>,
}

impl DataAttachment {
    pub fn new(bytes: Vec<u8>, mime: impl Into<String>) -> Self {
        Self {
            bytes,
            mime: mime.into(),
            name: None,
        }
    }

    pub fn base64(&self) -> String {
        BASE64.encode(&self.bytes)
    }
}

pub fn load_attachment(path: &Path) -> Result<DataAttachment> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("failed to read image file: {}", path.display()))?;
    let mime = detect_image_mime(&bytes, Some(path))?;
    let name = path
        .file_name()
        .and_then(|value| value.to_str())
        .map(|value| value.to_string());
    Ok(DataAttachment { bytes, mime, name })
}

pub fn sniff_mime(bytes: &[u8]) -> Option<String> {
    let kind = infer::get(bytes)?;
    let detected = kind.mime_type();
    if detected.starts_with("image/") {
        Some(detected.to_string())
    } else {
        None
    }
}

fn detect_image_mime(bytes: &[u8], path: Option<&Path>) -> Result<String> {
    if let Some(detected) = sniff_mime(bytes) {
        return Ok(detected);
    }
    if let Some(kind) = infer::get(bytes) {
        return Err(anyhow!(
            "expected image data (detected '{}')",
            kind.mime_type()
        ));
    }
    let ext = path
        .and_then(|path| path.extension())
        .and_then(|value| value.to_str())
        .map(|value| value.to_lowercase());
    if let Some(mime) = ext.as_deref().and_then(mime_from_extension) {
        return Ok(mime.to_string());
    }
    Err(anyhow!(
        "unable to detect image type for '{}'",
        path.map(|value| value.display().to_string())
            .unwrap_or_else(|| "stdin".to_string())
    ))
}

fn mime_from_extension(ext: &str) -> Option<&'static str> {
    match ext {
        "png" => Some(PNG_MIME),
        "jpg" | "jpeg" => Some(JPEG_MIME),
        "webp" => Some(WEBP_MIME),
        "gif" => Some("image/gif"),
        "bmp" => Some("image/bmp"),
        "tiff" | "tif" => Some("image/tiff"),
        _ => None,
    }
}

pub fn to_data_uri(mime: &str, base64_data: &str) -> String {
    format!("data:{};base64,{}", mime, base64_data)
}

/// Splits `data:<mime>;base64,<payload>` into its media type and decoded bytes.
pub fn parse_data_uri(uri: &str) -> Result<(String, Vec<u8>)> {
    let rest = uri
        .trim()
        .strip_prefix("data:")
        .ok_or_else(|| anyhow!("not a data URI"))?;
    let (meta, payload) = rest
        .split_once(',')
        .ok_or_else(|| anyhow!("data URI has no payload"))?;
    let mime = meta
        .strip_suffix(";base64")
        .ok_or_else(|| anyhow!("data URI is not base64 encoded"))?;
    let bytes = BASE64
        .decode(payload.trim())
        .with_context(|| "failed to decode data URI payload")?;
    Ok((mime.to_string(), bytes))
}

pub fn encode_png(image: &DynamicImage) -> Result<DataAttachment> {
    let mut bytes = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .with_context(|| "failed to encode PNG")?;
    Ok(DataAttachment::new(bytes, PNG_MIME))
}

/// JPEG has no alpha channel, so the image is flattened to RGB first.
pub fn encode_jpeg(image: &DynamicImage, quality: u8) -> Result<DataAttachment> {
    let mut bytes = Vec::new();
    let rgb = image.to_rgb8();
    JpegEncoder::new_with_quality(&mut bytes, quality.clamp(1, 100))
        .encode_image(&rgb)
        .with_context(|| "failed to encode JPEG")?;
    Ok(DataAttachment::new(bytes, JPEG_MIME))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbaImage;

    #[test]
    fn data_uri_round_trip_keeps_mime() {
        let uri = to_data_uri("image/webp", &BASE64.encode(b"abc"));
        let (mime, bytes) = parse_data_uri(&uri).expect("parse");
        assert_eq!(mime, "image/webp");
        assert_eq!(bytes, b"abc");
    }

    #[test]
    fn plain_strings_are_not_data_uris() {
        assert!(parse_data_uri("image/png;base64,AAAA").is_err());
        assert!(parse_data_uri("data:image/png,AAAA").is_err());
    }

    #[test]
    fn encoders_report_their_mime() {
        let image = DynamicImage::ImageRgba8(RgbaImage::new(3, 2));
        let png = encode_png(&image).expect("png");
        assert_eq!(png.mime, PNG_MIME);
        assert_eq!(sniff_mime(&png.bytes).as_deref(), Some(PNG_MIME));
        let jpeg = encode_jpeg(&image, 80).expect("jpeg");
        assert_eq!(sniff_mime(&jpeg.bytes).as_deref(), Some(JPEG_MIME));
    }

    #[test]
    fn extension_fallback_only_for_unknown_bytes() {
        assert_eq!(
            detect_image_mime(b"????", Some(Path::new("page.JPG"))).expect("mime"),
            JPEG_MIME
        );
        assert!(detect_image_mime(b"????", None).is_err());
    }
}
