use std::time::Duration;

pub use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_REQUEST_ATTEMPTS: usize = 2;
pub const DEFAULT_HISTORY_LIMIT: usize = 3;
pub const DEFAULT_GALLERY_LIMIT: usize = 50;

#[derive(Debug, Clone)]
pub struct ApiClientConfig {
    pub base_url: String,
    pub timeout_ms: u64,
    pub request_attempts: usize,
}

impl ApiClientConfig {
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
            request_attempts: DEFAULT_REQUEST_ATTEMPTS,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ApiClient {
    base_url: String,
    timeout: Duration,
    request_attempts: usize,
    http: reqwest::Client,
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("API base URL is missing")]
    BaseUrlMissing,
    #[error("invalid request path")]
    InvalidPath,
    #[error("request failed: {message}")]
    Request { message: String },
    #[error("failed to read response: {message}")]
    Read { message: String },
    #[error("{detail}")]
    Http { status: StatusCode, detail: String },
    #[error("invalid response body: {message}")]
    Decode { message: String },
}

/// Server-side job status as reported by `GET /api/v1/status`.
///
/// `idle` until the first job starts; `complete`/`error` are terminal and
/// persist until the next job overwrites them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Idle,
    Running,
    Complete,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStatus {
    pub status: JobState,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Default for JobStatus {
    fn default() -> Self {
        Self {
            status: JobState::Idle,
            message: "Ready".to_string(),
            image_path: None,
            error: None,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PromptRequest {
    pub prompt: String,
}

#[derive(Debug, Deserialize)]
pub struct PromptResponse {
    pub prompt: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptHistoryItem {
    pub timestamp: String,
    pub prompt: String,
}

#[derive(Debug, Deserialize)]
pub struct PromptHistoryResponse {
    pub prompts: Vec<PromptHistoryItem>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GenerationStartResponse {
    pub status: String,
    pub message: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerStatus {
    pub enabled: bool,
    pub schedule_time: String,
    #[serde(default)]
    pub next_run: Option<String>,
    pub timezone: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SuccessResponse {
    pub success: bool,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageInfo {
    pub filename: String,
    pub path: String,
    pub url: String,
    pub created_at: String,
    pub size_bytes: u64,
}

#[derive(Debug, Deserialize)]
pub struct ImageGalleryResponse {
    pub images: Vec<ImageInfo>,
    pub total: usize,
}

impl ApiClient {
    pub fn new(config: ApiClientConfig) -> Result<Self, ApiError> {
        let base_url = normalize_base_url(&config.base_url)?;
        Ok(Self {
            base_url,
            timeout: Duration::from_millis(config.timeout_ms.max(250)),
            request_attempts: config.request_attempts.max(1),
            http: reqwest::Client::new(),
        })
    }

    pub fn from_base_url(base_url: &str) -> Result<Self, ApiError> {
        Self::new(ApiClientConfig::new(base_url))
    }

    #[must_use]
    pub fn endpoint(&self, path: &str) -> Option<String> {
        let trimmed = path.trim();
        if trimmed.is_empty() {
            return None;
        }
        if trimmed.starts_with('/') {
            Some(format!("{}{}", self.base_url, trimmed))
        } else {
            Some(format!("{}/{}", self.base_url, trimmed))
        }
    }

    #[must_use]
    pub fn current_prompt_path() -> &'static str {
        "/api/v1/prompts/current"
    }

    #[must_use]
    pub fn prompt_history_path(limit: usize) -> String {
        format!("/api/v1/prompts/history?limit={limit}")
    }

    #[must_use]
    pub fn generate_path() -> &'static str {
        "/api/v1/generate"
    }

    #[must_use]
    pub fn status_path() -> &'static str {
        "/api/v1/status"
    }

    #[must_use]
    pub fn scheduler_path() -> &'static str {
        "/api/v1/scheduler"
    }

    #[must_use]
    pub fn health_path() -> &'static str {
        "/api/v1/health"
    }

    #[must_use]
    pub fn images_path(limit: usize) -> String {
        format!("/api/v1/images?limit={limit}")
    }

    #[must_use]
    pub fn display_image_path(filename: &str) -> String {
        format!("/api/v1/display/{}", filename.trim())
    }

    /// Fetch the current prompt text.
    pub async fn current_prompt(&self) -> Result<String, ApiError> {
        let response: PromptResponse = self.get_json(Self::current_prompt_path()).await?;
        Ok(response.prompt)
    }

    /// Persist a new prompt. The server broadcasts a `prompt_update` to all
    /// connected realtime clients on success.
    pub async fn save_prompt(&self, prompt: &str) -> Result<SuccessResponse, ApiError> {
        let request = PromptRequest {
            prompt: prompt.to_string(),
        };
        self.put_json(Self::current_prompt_path(), &request).await
    }

    /// Fetch the most recent prompt history entries, newest first.
    pub async fn prompt_history(&self, limit: usize) -> Result<Vec<PromptHistoryItem>, ApiError> {
        let response: PromptHistoryResponse = self
            .get_json(Self::prompt_history_path(limit).as_str())
            .await?;
        Ok(response.prompts)
    }

    /// Kick off a generation job. The server answers 409 with a `detail`
    /// message when a job is already running.
    pub async fn start_generation(&self) -> Result<GenerationStartResponse, ApiError> {
        self.post_empty(Self::generate_path()).await
    }

    pub async fn job_status(&self) -> Result<JobStatus, ApiError> {
        self.get_json(Self::status_path()).await
    }

    pub async fn scheduler_status(&self) -> Result<SchedulerStatus, ApiError> {
        self.get_json(Self::scheduler_path()).await
    }

    pub async fn health(&self) -> Result<HealthResponse, ApiError> {
        self.get_json(Self::health_path()).await
    }

    pub async fn images(&self, limit: usize) -> Result<Vec<ImageInfo>, ApiError> {
        let response: ImageGalleryResponse =
            self.get_json(Self::images_path(limit).as_str()).await?;
        Ok(response.images)
    }

    /// Push an already-generated image to the e-ink device.
    pub async fn display_image(&self, filename: &str) -> Result<SuccessResponse, ApiError> {
        self.post_empty(Self::display_image_path(filename).as_str())
            .await
    }

    pub async fn get_json<T>(&self, path: &str) -> Result<T, ApiError>
    where
        T: for<'de> serde::Deserialize<'de>,
    {
        let url = self.endpoint(path).ok_or(ApiError::InvalidPath)?;
        let response = self
            .send_with_retry(|| self.http.get(url.as_str()))
            .await?;
        decode_json_response(response).await
    }

    pub async fn put_json<Req, Res>(&self, path: &str, payload: &Req) -> Result<Res, ApiError>
    where
        Req: Serialize + ?Sized,
        Res: for<'de> serde::Deserialize<'de>,
    {
        let url = self.endpoint(path).ok_or(ApiError::InvalidPath)?;
        let response = self
            .send_with_retry(|| self.http.put(url.as_str()).json(payload))
            .await?;
        decode_json_response(response).await
    }

    pub async fn post_empty<Res>(&self, path: &str) -> Result<Res, ApiError>
    where
        Res: for<'de> serde::Deserialize<'de>,
    {
        let url = self.endpoint(path).ok_or(ApiError::InvalidPath)?;
        let response = self
            .send_with_retry(|| self.http.post(url.as_str()))
            .await?;
        decode_json_response(response).await
    }

    async fn send_with_retry<F>(&self, build: F) -> Result<reqwest::Response, ApiError>
    where
        F: Fn() -> reqwest::RequestBuilder,
    {
        let mut last_error: Option<String> = None;

        for attempt in 0..self.request_attempts {
            let request = build()
                .header("x-request-id", format!("req_{}", Uuid::new_v4().simple()))
                .timeout(self.timeout);

            match request.send().await {
                Ok(response) => return Ok(response),
                Err(error) => {
                    last_error = Some(error.to_string());
                    if attempt + 1 >= self.request_attempts {
                        break;
                    }
                }
            }
        }

        Err(ApiError::Request {
            message: last_error.unwrap_or_else(|| "unknown".to_string()),
        })
    }
}

/// Map a non-2xx response to an error carrying the server's `detail` message
/// when the body provides one, falling back to `HTTP <code>`.
pub fn format_http_error(status: StatusCode, body: &[u8]) -> ApiError {
    let detail = serde_json::from_slice::<serde_json::Value>(body)
        .ok()
        .and_then(|value| {
            value
                .get("detail")
                .and_then(|detail| detail.as_str())
                .map(|detail| detail.to_string())
        })
        .filter(|detail| !detail.trim().is_empty())
        .unwrap_or_else(|| format!("HTTP {}", status.as_u16()));
    ApiError::Http { status, detail }
}

fn normalize_base_url(base_url: &str) -> Result<String, ApiError> {
    let trimmed = base_url.trim();
    if trimmed.is_empty() {
        return Err(ApiError::BaseUrlMissing);
    }
    Ok(trimmed.trim_end_matches('/').to_string())
}

async fn decode_json_response<T>(response: reqwest::Response) -> Result<T, ApiError>
where
    T: for<'de> serde::Deserialize<'de>,
{
    let status = response.status();
    let bytes = response.bytes().await.map_err(|error| ApiError::Read {
        message: error.to_string(),
    })?;

    if !status.is_success() {
        return Err(format_http_error(status, &bytes));
    }

    serde_json::from_slice::<T>(&bytes).map_err(|error| ApiError::Decode {
        message: error.to_string(),
    })
}
