use anyhow::anyhow;
use image::{DynamicImage, Rgba, RgbaImage, RgbImage};
use std::collections::VecDeque;
use std::sync::Mutex;

use crate::data::{self, DataAttachment};
use crate::geometry::PercentBox;
use crate::providers::{Collaborator, ProviderFuture};

/// Black RGB page.
pub(crate) fn blank_image(width: u32, height: u32) -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::new(width, height))
}

pub(crate) fn solid_png_data_uri(width: u32, height: u32, color: [u8; 4]) -> String {
    let image = DynamicImage::ImageRgba8(RgbaImage::from_pixel(width, height, Rgba(color)));
    let encoded = data::encode_png(&image).expect("encode png");
    data::to_data_uri(&encoded.mime, &encoded.base64())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct CallRecord {
    pub(crate) width: u32,
    pub(crate) height: u32,
    pub(crate) mime: String,
}

/// Replays queued answers in order and records what it was asked. An empty
/// detect queue answers with no boxes; an empty clean queue fails.
#[derive(Default)]
pub(crate) struct ScriptedCollaborator {
    detections: Mutex<VecDeque<Result<Vec<PercentBox>, String>>>,
    cleanings: Mutex<VecDeque<Result<String, String>>>,
    detect_calls: Mutex<Vec<CallRecord>>,
    clean_calls: Mutex<Vec<CallRecord>>,
}

impl ScriptedCollaborator {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn detect_ok(self, boxes: Vec<PercentBox>) -> Self {
        self.detections.lock().expect("lock").push_back(Ok(boxes));
        self
    }

    pub(crate) fn detect_err(self, message: &str) -> Self {
        self.detections
            .lock()
            .expect("lock")
            .push_back(Err(message.to_string()));
        self
    }

    pub(crate) fn clean_ok(self, data_uri: String) -> Self {
        self.cleanings.lock().expect("lock").push_back(Ok(data_uri));
        self
    }

    pub(crate) fn clean_err(self, message: &str) -> Self {
        self.cleanings
            .lock()
            .expect("lock")
            .push_back(Err(message.to_string()));
        self
    }

    pub(crate) fn detect_calls(&self) -> Vec<CallRecord> {
        self.detect_calls.lock().expect("lock").clone()
    }

    pub(crate) fn clean_calls(&self) -> Vec<CallRecord> {
        self.clean_calls.lock().expect("lock").clone()
    }
}

fn record(image: &DataAttachment) -> CallRecord {
    let decoded = image::load_from_memory(&image.bytes).expect("collaborator input decodes");
    CallRecord {
        width: decoded.width(),
        height: decoded.height(),
        mime: image.mime.clone(),
    }
}

impl Collaborator for ScriptedCollaborator {
    fn detect_text_regions(&self, image: DataAttachment) -> ProviderFuture<Vec<PercentBox>> {
        self.detect_calls.lock().expect("lock").push(record(&image));
        let next = self
            .detections
            .lock()
            .expect("lock")
            .pop_front()
            .unwrap_or_else(|| Ok(Vec::new()));
        Box::pin(async move { next.map_err(|message| anyhow!(message)) })
    }

    fn clean_text_region(&self, image: DataAttachment) -> ProviderFuture<String> {
        self.clean_calls.lock().expect("lock").push(record(&image));
        let next = self
            .cleanings
            .lock()
            .expect("lock")
            .pop_front()
            .unwrap_or_else(|| Err("no scripted cleaning left".to_string()));
        Box::pin(async move { next.map_err(|message| anyhow!(message)) })
    }
}
