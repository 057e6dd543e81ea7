use axum::http::{Method, StatusCode};
use tracing::error;

use crate::data::JPEG_MIME;
use crate::providers::{ContentItem, ContentPart, Gemini};

use super::models::ProxyRequest;
use super::state::ServerState;

#[derive(Debug)]
pub(crate) struct ServerError {
    pub(crate) status: StatusCode,
    pub(crate) message: String,
}

impl ServerError {
    fn method_not_allowed() -> Self {
        Self {
            status: StatusCode::METHOD_NOT_ALLOWED,
            message: "Method Not Allowed".to_string(),
        }
    }

    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }
}

impl From<anyhow::Error> for ServerError {
    fn from(err: anyhow::Error) -> Self {
        ServerError::internal(err.to_string())
    }
}

pub(crate) async fn proxy_request(
    state: &ServerState,
    method: &Method,
    body: &[u8],
) -> Result<String, ServerError> {
    if *method != Method::POST {
        return Err(ServerError::method_not_allowed());
    }
    let Some(key) = state.key.as_deref().filter(|key| !key.trim().is_empty()) else {
        return Err(ServerError::internal(
            "API key is not configured (set GEMINI_API_KEY)",
        ));
    };

    let request = parse_request(body)?;
    let contents = build_contents(request);
    if contents.is_empty() {
        return Err(ServerError::bad_request(
            "text, imageBase64 or history is required",
        ));
    }

    let mut gemini = Gemini::new(key);
    if let Some(base_url) = state.settings.gemini_base_url.as_deref() {
        gemini = gemini.with_base_url(base_url);
    }
    gemini
        .generate_reply(&state.settings.server_model, contents)
        .await
        .map_err(|err| {
            error!("Gemini API Error: {:#}", err);
            ServerError::from(err)
        })
}

fn parse_request(body: &[u8]) -> Result<ProxyRequest, ServerError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(ProxyRequest::default());
    }
    serde_json::from_slice(body)
        .map_err(|err| ServerError::bad_request(format!("invalid JSON body: {}", err)))
}

/// Prior turns first, then a user turn with the text and/or inline image.
fn build_contents(request: ProxyRequest) -> Vec<ContentItem> {
    let mut contents = request.history.unwrap_or_default();
    let mut parts = Vec::new();
    if let Some(text) = request.text.filter(|text| !text.is_empty()) {
        parts.push(ContentPart::text(text));
    }
    if let Some(data) = request.image_base64.filter(|data| !data.is_empty()) {
        let mime = request
            .mime_type
            .filter(|mime| !mime.trim().is_empty())
            .unwrap_or_else(|| JPEG_MIME.to_string());
        parts.push(ContentPart::inline(mime, data));
    }
    if !parts.is_empty() {
        contents.push(ContentItem::user(parts));
    }
    contents
}
