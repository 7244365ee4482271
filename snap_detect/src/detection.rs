use crate::config::DetectionServiceConfig;
use crate::image::{ImageHandle, JPEG_MIME};
use async_trait::async_trait;
use reqwest::{
    multipart::{Form, Part},
    Client,
};
use serde::{Deserialize, Serialize};
use std::{fmt, time::Duration};
use thiserror::Error;
use tracing::instrument;

const UPLOAD_FIELD: &str = "file";
// The service contract expects every upload under this name and type.
const UPLOAD_FILENAME: &str = "photo.jpg";

#[derive(Error, Debug)]
pub enum DetectionError {
    #[error("Failed to reach detection service: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("Detection service answered with status {status}")]
    Service { status: u16 },
    #[error("Detection service returned malformed JSON: {0}")]
    MalformedResponse(#[from] serde_json::Error),
}

/// What the session keeps from a failed upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectionErrorKind {
    Transport,
    Service(u16),
    MalformedResponse,
}

impl DetectionError {
    pub fn kind(&self) -> DetectionErrorKind {
        match self {
            DetectionError::Transport(_) => DetectionErrorKind::Transport,
            DetectionError::Service { status } => DetectionErrorKind::Service(*status),
            DetectionError::MalformedResponse(_) => DetectionErrorKind::MalformedResponse,
        }
    }
}

impl DetectionErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DetectionErrorKind::Transport => "transport",
            DetectionErrorKind::Service(_) => "service",
            DetectionErrorKind::MalformedResponse => "malformed_response",
        }
    }
}

impl fmt::Display for DetectionErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DetectionErrorKind::Service(status) => write!(f, "service error ({})", status),
            DetectionErrorKind::Transport => f.write_str("could not reach the detection service"),
            DetectionErrorKind::MalformedResponse => f.write_str("unreadable detection response"),
        }
    }
}

/// Detection payload exactly as the service sent it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DetectionResult(serde_json::Value);

impl DetectionResult {
    pub fn new(value: serde_json::Value) -> Self {
        Self(value)
    }

    pub fn as_value(&self) -> &serde_json::Value {
        &self.0
    }

    pub fn into_inner(self) -> serde_json::Value {
        self.0
    }
}

impl From<serde_json::Value> for DetectionResult {
    fn from(value: serde_json::Value) -> Self {
        Self(value)
    }
}

impl fmt::Display for DetectionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match serde_json::to_string_pretty(&self.0) {
            Ok(pretty) => f.write_str(&pretty),
            Err(_) => write!(f, "{}", self.0),
        }
    }
}

#[async_trait]
pub trait DetectionService: Send + Sync {
    async fn detect(&self, handle: &ImageHandle) -> Result<DetectionResult, DetectionError>;
}

#[derive(Debug, Clone)]
pub struct HttpDetectionClient {
    client: Client,
    base_url: String,
    endpoint: String,
}

impl HttpDetectionClient {
    pub fn new(config: &DetectionServiceConfig) -> Result<Self, DetectionError> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            endpoint: config.endpoint(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Hits the service root so startup can report whether it is reachable.
    pub async fn check_available(&self) -> Result<(), DetectionError> {
        let response = self.client.get(format!("{}/", self.base_url)).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(DetectionError::Service {
                status: status.as_u16(),
            });
        }
        Ok(())
    }

    fn build_form(handle: &ImageHandle) -> Result<Form, DetectionError> {
        let part = Part::stream(handle.bytes().clone())
            .file_name(UPLOAD_FILENAME)
            .mime_str(JPEG_MIME)?;
        Ok(Form::new().part(UPLOAD_FIELD, part))
    }
}

#[async_trait]
impl DetectionService for HttpDetectionClient {
    #[instrument(skip(self, handle), fields(bytes = handle.len(), source_mime = handle.mime_type()))]
    async fn detect(&self, handle: &ImageHandle) -> Result<DetectionResult, DetectionError> {
        let form = Self::build_form(handle)?;

        // `multipart` sets `Content-Type: multipart/form-data; boundary=...`.
        let response = self
            .client
            .post(&self.endpoint)
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!("Detection service returned {}", status);
            return Err(DetectionError::Service {
                status: status.as_u16(),
            });
        }

        let body = response.bytes().await?;
        let value: serde_json::Value = serde_json::from_slice(&body)?;
        tracing::debug!("Received detection payload of {} bytes", body.len());

        Ok(DetectionResult::new(value))
    }
}
