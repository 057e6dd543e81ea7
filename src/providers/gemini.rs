use anyhow::anyhow;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, warn};

use super::{Collaborator, ProviderFuture};
use crate::data::{self, DataAttachment};
use crate::geometry::PercentBox;

pub(crate) const BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";
pub(crate) const DEFAULT_DETECT_MODEL: &str = "gemini-2.5-flash";
pub(crate) const DEFAULT_CLEAN_MODEL: &str = "gemini-2.5-flash-image";

const DETECT_PROMPT: &str = "Analyze this manga/manhwa image and find all text, speech bubbles, and sound effects. Return their bounding boxes as percentages (0-100) of the image's width and height. Do not include the whole image, only the specific text regions.";
const CLEAN_PROMPT: &str = "Remove all text from this image. Keep the background, textures, and speech bubble borders intact. Do not add any new elements or characters. Output only the cleaned image.";

/// One turn of a `generateContent` conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ContentItem {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default)]
    pub parts: Vec<ContentPart>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ContentPart {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        alias = "inline_data"
    )]
    pub inline_data: Option<InlineData>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InlineData {
    #[serde(alias = "mime_type")]
    pub mime_type: String,
    pub data: String,
}

impl ContentPart {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            inline_data: None,
        }
    }

    pub fn inline(mime_type: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            text: None,
            inline_data: Some(InlineData {
                mime_type: mime_type.into(),
                data: data.into(),
            }),
        }
    }

    pub fn attachment(attachment: &DataAttachment) -> Self {
        Self::inline(attachment.mime.clone(), attachment.base64())
    }
}

impl ContentItem {
    pub fn user(parts: Vec<ContentPart>) -> Self {
        Self {
            role: Some("user".to_string()),
            parts,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Gemini {
    key: String,
    base_url: String,
    detect_model: String,
    clean_model: String,
}

impl Gemini {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            base_url: BASE_URL.to_string(),
            detect_model: DEFAULT_DETECT_MODEL.to_string(),
            clean_model: DEFAULT_CLEAN_MODEL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        if !base_url.trim().is_empty() {
            self.base_url = base_url.trim_end_matches('/').to_string();
        }
        self
    }

    pub fn with_detect_model(mut self, model: impl Into<String>) -> Self {
        let model = model.into();
        if !model.trim().is_empty() {
            self.detect_model = model;
        }
        self
    }

    pub fn with_clean_model(mut self, model: impl Into<String>) -> Self {
        let model = model.into();
        if !model.trim().is_empty() {
            self.clean_model = model;
        }
        self
    }

    /// Sends a `generateContent` request and returns the first candidate's first
    /// text part.
    pub async fn generate_reply(
        &self,
        model: &str,
        contents: Vec<ContentItem>,
    ) -> anyhow::Result<String> {
        let response = self.generate_content(model, contents, None).await?;
        extract_reply(&response)
    }

    async fn generate_content(
        &self,
        model: &str,
        contents: Vec<ContentItem>,
        generation_config: Option<Value>,
    ) -> anyhow::Result<GeminiResponse> {
        let client = reqwest::Client::new();
        let url = format!("{}/{}:generateContent", self.base_url, model);
        let mut body = json!({ "contents": contents });
        if let Some(config) = generation_config {
            body["generationConfig"] = config;
        }

        debug!("Gemini request to model {}", model);
        let response = client
            .post(&url)
            .header("x-goog-api-key", self.key.clone())
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(anyhow!(
                "Gemini API error ({}): {}",
                status,
                extract_gemini_error(&text).unwrap_or(text)
            ));
        }
        serde_json::from_str(&text)
            .map_err(|err| anyhow!("failed to parse Gemini response JSON: {}", err))
    }
}

impl Collaborator for Gemini {
    fn detect_text_regions(&self, image: DataAttachment) -> ProviderFuture<Vec<PercentBox>> {
        let this = self.clone();
        Box::pin(async move {
            let contents = vec![ContentItem::user(vec![
                ContentPart::attachment(&image),
                ContentPart::text(DETECT_PROMPT),
            ])];
            let config = json!({
                "responseMimeType": "application/json",
                "responseSchema": detection_schema(),
            });
            let response = this
                .generate_content(&this.detect_model, contents, Some(config))
                .await?;
            Ok(parse_detection_boxes(&response.text()))
        })
    }

    fn clean_text_region(&self, image: DataAttachment) -> ProviderFuture<String> {
        let this = self.clone();
        Box::pin(async move {
            let contents = vec![ContentItem::user(vec![
                ContentPart::attachment(&image),
                ContentPart::text(CLEAN_PROMPT),
            ])];
            let response = this
                .generate_content(&this.clean_model, contents, None)
                .await?;
            extract_inline_image(&response)
        })
    }
}

fn detection_schema() -> Value {
    let edge = |description: &str| json!({ "type": "NUMBER", "description": description });
    json!({
        "type": "ARRAY",
        "items": {
            "type": "OBJECT",
            "properties": {
                "ymin": edge("Top edge percentage (0-100)"),
                "xmin": edge("Left edge percentage (0-100)"),
                "ymax": edge("Bottom edge percentage (0-100)"),
                "xmax": edge("Right edge percentage (0-100)"),
            },
            "required": ["ymin", "xmin", "ymax", "xmax"],
        }
    })
}

/// Reads the detection model's JSON text. Anything that is not an array of
/// boxes counts as no detections; entries missing an edge are skipped.
pub(crate) fn parse_detection_boxes(text: &str) -> Vec<PercentBox> {
    let trimmed = strip_code_fence(text.trim());
    let trimmed = if trimmed.is_empty() { "[]" } else { trimmed };
    let value: Value = match serde_json::from_str(trimmed) {
        Ok(value) => value,
        Err(err) => {
            warn!("failed to parse detection JSON: {}", err);
            return Vec::new();
        }
    };
    let Some(items) = value.as_array() else {
        warn!("detection JSON is not an array");
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| {
            let edge = |key: &str| item.get(key).and_then(Value::as_f64);
            Some(PercentBox {
                ymin: edge("ymin")?,
                xmin: edge("xmin")?,
                ymax: edge("ymax")?,
                xmax: edge("xmax")?,
            })
        })
        .collect()
}

fn strip_code_fence(text: &str) -> &str {
    let Some(inner) = text.strip_prefix("```") else {
        return text;
    };
    let inner = inner.strip_prefix("json").unwrap_or(inner);
    inner.strip_suffix("```").unwrap_or(inner).trim()
}

fn extract_reply(response: &GeminiResponse) -> anyhow::Result<String> {
    response
        .candidates
        .first()
        .and_then(|candidate| candidate.content.as_ref())
        .and_then(|content| content.parts.first())
        .and_then(|part| part.text.clone())
        .ok_or_else(|| anyhow!("no text reply returned from Gemini"))
}

fn extract_inline_image(response: &GeminiResponse) -> anyhow::Result<String> {
    let parts = response
        .candidates
        .first()
        .and_then(|candidate| candidate.content.as_ref())
        .map(|content| content.parts.as_slice())
        .unwrap_or_default();
    parts
        .iter()
        .find_map(|part| part.inline_data.as_ref())
        .map(|inline| data::to_data_uri(&inline.mime_type, &inline.data))
        .ok_or_else(|| anyhow!("no image returned from Gemini"))
}

fn extract_gemini_error(body: &str) -> Option<String> {
    #[derive(Deserialize)]
    struct ErrorBody {
        error: Option<GeminiError>,
    }

    #[derive(Deserialize)]
    struct GeminiError {
        message: Option<String>,
        status: Option<String>,
        code: Option<i32>,
    }

    let parsed: ErrorBody = serde_json::from_str(body).ok()?;
    let error = parsed.error?;
    Some(format_error_parts(
        error.message,
        error.status,
        error.code.map(|value| value.to_string()),
    ))
}

fn format_error_parts(
    message: Option<String>,
    kind: Option<String>,
    code: Option<String>,
) -> String {
    let mut parts = Vec::new();
    if let Some(message) = message
        && !message.trim().is_empty()
    {
        parts.push(message);
    }
    if let Some(kind) = kind
        && !kind.trim().is_empty()
    {
        parts.push(format!("type: {}", kind));
    }
    if let Some(code) = code
        && !code.trim().is_empty()
    {
        parts.push(format!("code: {}", code));
    }
    if parts.is_empty() {
        "unknown error".to_string()
    } else {
        parts.join(" | ")
    }
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

impl GeminiResponse {
    /// Concatenated text of the first candidate.
    fn text(&self) -> String {
        self.candidates
            .first()
            .and_then(|candidate| candidate.content.as_ref())
            .map(|content| {
                content
                    .parts
                    .iter()
                    .filter_map(|part| part.text.as_deref())
                    .collect::<String>()
            })
            .unwrap_or_default()
    }
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiContent>,
}

#[derive(Debug, Deserialize)]
struct GeminiContent {
    #[serde(default)]
    parts: Vec<ContentPart>,
}
