use serde::{Deserialize, Serialize};

use crate::providers::ContentItem;

#[derive(Debug, Deserialize, Default)]
#[serde(default, rename_all = "camelCase")]
pub(crate) struct ProxyRequest {
    pub(crate) text: Option<String>,
    pub(crate) image_base64: Option<String>,
    pub(crate) mime_type: Option<String>,
    pub(crate) history: Option<Vec<ContentItem>>,
}

#[derive(Debug, Serialize)]
pub(crate) struct ProxyResponse {
    pub(crate) reply: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct ErrorResponse {
    pub(crate) error: String,
}
