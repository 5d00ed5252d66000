use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, error};
use url::Url;

use crate::attachment::ImageBlob;

pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Status reported when the transport never produced an HTTP response.
pub const FALLBACK_STATUS: u16 = 500;
pub const FALLBACK_MESSAGE: &str = "Unknown API error";

const TEXT_ENDPOINT: &str = "ask/text";
const IMAGE_ENDPOINT: &str = "ask/image";
const CHAT_ENDPOINT: &str = "ask/chat";

/// Fields checked, in order, for a human readable message in an error body
const DETAIL_FIELDS: [&str; 3] = ["detail", "error", "message"];

/// A failed call, normalized to a status code and a message fit for display.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ApiError {
    pub status: u16,
    pub message: String,
}

impl ApiError {
    pub fn new(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        let message = if message.trim().is_empty() {
            FALLBACK_MESSAGE.to_string()
        } else {
            message
        };
        Self { status, message }
    }

    /// Non-2xx response: prefer the server's own explanation.
    fn from_response(status: StatusCode, body: &str) -> Self {
        let detail = serde_json::from_str::<Value>(body)
            .ok()
            .and_then(|json| server_detail(&json));

        let message =
            detail.unwrap_or_else(|| format!("Request failed with status code {}", status.as_u16()));
        Self::new(status.as_u16(), message)
    }

    /// The call failed before (or while) a response was received.
    fn from_transport(err: reqwest::Error, timeout: Duration) -> Self {
        let status = err.status().map(|s| s.as_u16()).unwrap_or(FALLBACK_STATUS);
        if err.is_timeout() {
            return Self::new(status, format!("timeout of {}ms exceeded", timeout.as_millis()));
        }
        Self::new(status, err.to_string())
    }
}

fn server_detail(body: &Value) -> Option<String> {
    DETAIL_FIELDS.iter().find_map(|field| match body.get(field)? {
        Value::Null => None,
        Value::String(text) if text.trim().is_empty() => None,
        Value::String(text) => Some(text.clone()),
        // FastAPI validation errors carry a structured `detail`
        other => Some(other.to_string()),
    })
}

/// Response body shared by every `/ask/*` endpoint
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AskResponse {
    pub analysis: String,
    pub request_id: Option<String>,
    pub status: Option<String>,
    pub input: Option<Value>,
    pub elapsed_ms: Option<u64>,
}

/// Where and how long to talk to the analysis service
#[derive(Debug, Clone)]
pub struct ClientConfig {
    base_url: Url,
    timeout: Duration,
}

impl ClientConfig {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, url::ParseError> {
        let mut base_url = Url::parse(base_url.trim())?;
        // Url::join replaces the last path segment unless the base ends in '/'
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Ok(Self { base_url, timeout })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn endpoint(&self, path: &str) -> Result<Url, url::ParseError> {
        self.base_url.join(path.trim_start_matches('/'))
    }
}

/// The three operations offered by the analysis service.
///
/// Each call performs exactly one round trip. Nothing is retried, cached or queued.
#[async_trait]
pub trait AgriApi: Send + Sync {
    /// Text-only question, `POST /ask/text`
    async fn ask_text(&self, query: &str) -> Result<AskResponse, ApiError>;

    /// Image-only diagnosis, `POST /ask/image`
    async fn ask_image(&self, image: &ImageBlob) -> Result<AskResponse, ApiError>;

    /// Combined question, `POST /ask/chat`. The `file` field is sent only when an image is present.
    async fn ask_chat(&self, query: &str, image: Option<&ImageBlob>) -> Result<AskResponse, ApiError>;
}

pub struct AgriClient {
    config: ClientConfig,
    client: reqwest::Client,
}

impl AgriClient {
    pub fn new(config: ClientConfig) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ApiError::from_transport(e, config.timeout))?;

        Ok(Self { config, client })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    async fn post_form(&self, endpoint: &str, form: Form) -> Result<AskResponse, ApiError> {
        let url = self
            .config
            .endpoint(endpoint)
            .map_err(|e| ApiError::new(FALLBACK_STATUS, format!("Invalid endpoint {endpoint}: {e}")))?;

        debug!("[API REQUEST] POST {}", url);

        let response = self
            .client
            .post(url.clone())
            .multipart(form)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| self.transport_error(e))?;

        if !status.is_success() {
            let err = ApiError::from_response(status, &body);
            error!("[API ERROR] POST {} failed with {}: {}", url, err.status, err.message);
            return Err(err);
        }

        debug!("[API RESPONSE] {} from {}: {}", status.as_u16(), url, body);

        serde_json::from_str::<AskResponse>(&body).map_err(|e| {
            error!("[API ERROR] Malformed response from {}: {}", url, e);
            ApiError::new(status.as_u16(), format!("Malformed response from server: {e}"))
        })
    }

    fn transport_error(&self, err: reqwest::Error) -> ApiError {
        let err = ApiError::from_transport(err, self.config.timeout);
        error!("[API ERROR] {} ({})", err.message, err.status);
        err
    }
}

fn image_part(image: &ImageBlob) -> Result<Part, ApiError> {
    Part::bytes(image.bytes().to_vec())
        .file_name(image.file_name().to_string())
        .mime_str(image.mime())
        .map_err(|e| ApiError::new(FALLBACK_STATUS, format!("Invalid image type {}: {e}", image.mime())))
}

fn query_form(query: &str) -> Form {
    let query = query.trim();
    let form = Form::new();
    if query.is_empty() {
        form
    } else {
        form.text("query", query.to_string())
    }
}

#[async_trait]
impl AgriApi for AgriClient {
    async fn ask_text(&self, query: &str) -> Result<AskResponse, ApiError> {
        self.post_form(TEXT_ENDPOINT, query_form(query)).await
    }

    async fn ask_image(&self, image: &ImageBlob) -> Result<AskResponse, ApiError> {
        let form = Form::new().part("file", image_part(image)?);
        self.post_form(IMAGE_ENDPOINT, form).await
    }

    async fn ask_chat(&self, query: &str, image: Option<&ImageBlob>) -> Result<AskResponse, ApiError> {
        // The combined endpoint always receives the query field, even when empty
        let form = Form::new().text("query", query.trim().to_string());
        let form = match image {
            Some(image) => form.part("file", image_part(image)?),
            None => form,
        };
        self.post_form(CHAT_ENDPOINT, form).await
    }
}
