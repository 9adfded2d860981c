//! HTTP client for the lab notebook backend.
//!
//! All operations are JSON-over-REST with optional bearer-token auth. The
//! session layer holds the client behind the [`NotebookApi`] trait so tests
//! can swap in an in-memory backend.

use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use url::Url;

use crate::protocol::{
    Cell, CellListResponse, CellPatch, InstallOutput, KernelStatus, Notebook, NotebookPatch,
    ResourceId,
};

/// Default per-request timeout. Package installs can legitimately take much
/// longer than other calls, so they get their own budget.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const INSTALL_TIMEOUT: Duration = Duration::from_secs(300);

/// Error type for backend operations.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("invalid base URL: {0}")]
    BaseUrl(#[from] url::ParseError),

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("backend returned HTTP {status}")]
    Backend {
        status: u16,
        detail: Option<String>,
        error: Option<String>,
    },
}

impl ApiError {
    /// Convert to a single user-facing message.
    ///
    /// Preference order: the backend's structured `detail` field, then its
    /// `error` field, then a status-qualified fallback, then the raw
    /// transport error.
    pub fn user_message(&self, fallback: &str) -> String {
        match self {
            ApiError::Backend {
                detail: Some(detail),
                ..
            } => detail.clone(),
            ApiError::Backend {
                error: Some(error), ..
            } => error.clone(),
            ApiError::Backend { status, .. } => format!("{} (HTTP {})", fallback, status),
            ApiError::Transport(e) => e.to_string(),
            ApiError::BaseUrl(e) => e.to_string(),
        }
    }
}

/// Operations the notebook session performs against the backend.
///
/// Mirrors the REST surface one-to-one; implemented by [`ApiClient`] and by
/// the in-memory fake in the session crate's tests.
#[async_trait]
pub trait NotebookApi: Send + Sync {
    async fn get_notebook(&self, id: &ResourceId) -> Result<Notebook, ApiError>;
    async fn list_cells(&self, notebook_id: &ResourceId) -> Result<Vec<Cell>, ApiError>;
    async fn update_notebook(
        &self,
        id: &ResourceId,
        patch: &NotebookPatch,
    ) -> Result<Notebook, ApiError>;
    async fn delete_notebook(&self, id: &ResourceId) -> Result<(), ApiError>;
    async fn create_cell(
        &self,
        notebook_id: &ResourceId,
        patch: &CellPatch,
    ) -> Result<Cell, ApiError>;
    async fn update_cell(&self, cell_id: &ResourceId, patch: &CellPatch)
        -> Result<Cell, ApiError>;
    async fn run_cell(&self, cell_id: &ResourceId, code: &str) -> Result<Cell, ApiError>;
    async fn kernel_status(&self) -> Result<KernelStatus, ApiError>;
    async fn install_package(&self, package: &str) -> Result<InstallOutput, ApiError>;
}

/// REST client for the lab backend.
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    bearer_token: Option<String>,
    timeout: Duration,
}

impl ApiClient {
    /// Create a client for the given base URL (e.g. `http://host:8000/api`).
    pub fn new(base_url: &str) -> Result<Self, ApiError> {
        let parsed = Url::parse(base_url)?;
        let base_url = parsed.as_str().trim_end_matches('/').to_string();
        let http = reqwest::Client::builder().build()?;
        Ok(ApiClient {
            http,
            base_url,
            bearer_token: None,
            timeout: DEFAULT_TIMEOUT,
        })
    }

    /// Attach a bearer token to every request.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        let token = token.into();
        self.bearer_token = if token.is_empty() { None } else { Some(token) };
        self
    }

    /// Override the default per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn prepare(&self, req: reqwest::RequestBuilder, timeout: Duration) -> reqwest::RequestBuilder {
        let req = req.timeout(timeout);
        match &self.bearer_token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        debug!("[lab-api] GET {}", path);
        let req = self.http.get(self.endpoint(path));
        let resp = self.prepare(req, self.timeout).send().await?;
        Ok(check(resp).await?.json::<T>().await?)
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        method: reqwest::Method,
        path: &str,
        body: &impl Serialize,
        timeout: Duration,
    ) -> Result<T, ApiError> {
        debug!("[lab-api] {} {}", method, path);
        let req = self.http.request(method, self.endpoint(path)).json(body);
        let resp = self.prepare(req, timeout).send().await?;
        Ok(check(resp).await?.json::<T>().await?)
    }

    async fn delete(&self, path: &str) -> Result<(), ApiError> {
        debug!("[lab-api] DELETE {}", path);
        let req = self.http.delete(self.endpoint(path));
        let resp = self.prepare(req, self.timeout).send().await?;
        check(resp).await?;
        Ok(())
    }
}

/// Map a non-2xx response to [`ApiError::Backend`], extracting the
/// structured `detail`/`error` fields when the body is JSON.
async fn check(resp: reqwest::Response) -> Result<reqwest::Response, ApiError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body: Value = resp.json().await.unwrap_or(Value::Null);
    Err(ApiError::Backend {
        status: status.as_u16(),
        detail: message_field(&body, "detail"),
        error: message_field(&body, "error"),
    })
}

/// Extract a human-readable message field. Non-string values (DRF can nest
/// validation errors) are rendered as compact JSON.
fn message_field(body: &Value, key: &str) -> Option<String> {
    match body.get(key)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Null => None,
        Value::String(_) => None,
        other => Some(other.to_string()),
    }
}

#[async_trait]
impl NotebookApi for ApiClient {
    async fn get_notebook(&self, id: &ResourceId) -> Result<Notebook, ApiError> {
        self.get_json(&format!("/notebooks/{}", id)).await
    }

    async fn list_cells(&self, notebook_id: &ResourceId) -> Result<Vec<Cell>, ApiError> {
        let list: CellListResponse = self
            .get_json(&format!("/notebooks/{}/cells", notebook_id))
            .await?;
        Ok(list.into_cells())
    }

    async fn update_notebook(
        &self,
        id: &ResourceId,
        patch: &NotebookPatch,
    ) -> Result<Notebook, ApiError> {
        self.send_json(
            reqwest::Method::PATCH,
            &format!("/notebooks/{}", id),
            patch,
            self.timeout,
        )
        .await
    }

    async fn delete_notebook(&self, id: &ResourceId) -> Result<(), ApiError> {
        self.delete(&format!("/notebooks/{}", id)).await
    }

    async fn create_cell(
        &self,
        notebook_id: &ResourceId,
        patch: &CellPatch,
    ) -> Result<Cell, ApiError> {
        self.send_json(
            reqwest::Method::POST,
            &format!("/notebooks/{}/cells", notebook_id),
            patch,
            self.timeout,
        )
        .await
    }

    async fn update_cell(
        &self,
        cell_id: &ResourceId,
        patch: &CellPatch,
    ) -> Result<Cell, ApiError> {
        self.send_json(
            reqwest::Method::PATCH,
            &format!("/cells/{}", cell_id),
            patch,
            self.timeout,
        )
        .await
    }

    async fn run_cell(&self, cell_id: &ResourceId, code: &str) -> Result<Cell, ApiError> {
        self.send_json(
            reqwest::Method::POST,
            &format!("/cells/{}/run", cell_id),
            &serde_json::json!({ "code": code }),
            self.timeout,
        )
        .await
    }

    async fn kernel_status(&self) -> Result<KernelStatus, ApiError> {
        self.get_json("/kernel/status").await
    }

    async fn install_package(&self, package: &str) -> Result<InstallOutput, ApiError> {
        self.send_json(
            reqwest::Method::POST,
            "/kernel/install",
            &serde_json::json!({ "package": package }),
            INSTALL_TIMEOUT,
        )
        .await
    }
}
