//! Face detector client.
//!
//! Sends a frame to the face-detector HTTP API (`POST {base}/detect`) and
//! returns the face crop when one is found.

use crate::types::DetectionCrop;
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

const DEFAULT_MIN_SIZE: u32 = 80;

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("detector request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("invalid detector configuration: {0}")]
    Config(String),
}

/// Finds a face in one frame.
#[async_trait]
pub trait FaceDetector: Send + Sync {
    /// `Ok(None)` means the detector looked and found no usable face.
    async fn detect(&self, frame: &[u8]) -> Result<Option<DetectionCrop>, DetectorError>;
}

/// Detection request parameters forwarded as form fields.
#[derive(Debug, Clone)]
pub struct DetectParams {
    /// Smallest face edge in pixels. The face search rejects crops under 80px.
    pub min_size: u32,
    pub start_x: Option<u32>,
    pub start_y: Option<u32>,
    pub end_x: Option<u32>,
    pub end_y: Option<u32>,
    pub confidence: Option<f32>,
}

impl Default for DetectParams {
    fn default() -> Self {
        Self {
            min_size: DEFAULT_MIN_SIZE,
            start_x: None,
            start_y: None,
            end_x: None,
            end_y: None,
            confidence: None,
        }
    }
}

impl DetectParams {
    fn form_fields(&self) -> Vec<(&'static str, String)> {
        let mut fields = vec![("minSize", self.min_size.to_string())];
        let optional = [
            ("startX", self.start_x),
            ("startY", self.start_y),
            ("endX", self.end_x),
            ("endY", self.end_y),
        ];
        fields.extend(
            optional
                .into_iter()
                .filter_map(|(name, value)| value.map(|v| (name, v.to_string()))),
        );
        if let Some(confidence) = self.confidence {
            fields.push(("confidence", confidence.to_string()));
        }
        fields
    }
}

#[derive(Deserialize)]
struct DetectorErrorBody {
    error: Option<String>,
}

/// HTTP client for the face-detector service.
pub struct HttpFaceDetector {
    client: reqwest::Client,
    endpoint: String,
    params: DetectParams,
}

impl HttpFaceDetector {
    pub fn new(
        base_url: &str,
        params: DetectParams,
        timeout: Duration,
    ) -> Result<Self, DetectorError> {
        if base_url.is_empty() {
            return Err(DetectorError::Config("detector base URL is empty".into()));
        }
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: format!("{}/detect", base_url.trim_end_matches('/')),
            params,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl FaceDetector for HttpFaceDetector {
    async fn detect(&self, frame: &[u8]) -> Result<Option<DetectionCrop>, DetectorError> {
        let mut form = Form::new();
        for (name, value) in self.params.form_fields() {
            form = form.text(name, value);
        }
        let file = Part::bytes(frame.to_vec())
            .file_name("image.jpg")
            .mime_str("image/jpeg")?;
        form = form.part("file", file);

        let response = self.client.post(&self.endpoint).multipart(form).send().await?;

        let status = response.status();
        if !status.is_success() {
            if tracing::enabled!(tracing::Level::DEBUG) {
                let reason = response
                    .json::<DetectorErrorBody>()
                    .await
                    .ok()
                    .and_then(|b| b.error)
                    .unwrap_or_default();
                tracing::debug!(
                    status = status.as_u16(),
                    reason = %reason,
                    "detector found no face"
                );
            }
            return Ok(None);
        }

        let body = response.bytes().await?;
        Ok(Some(DetectionCrop(body.to_vec())))
    }
}
