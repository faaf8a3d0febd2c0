//! HTTP client for the Cloudiverse backend.
//!
//! Every call goes to `{base}/api/...` with an optional bearer token. Non-2xx
//! responses become [`ApiError`] variants; 401 and 403 are kept apart so the
//! caller can log out or show an upgrade prompt.

use std::time::Duration;

use reqwest::{Method, RequestBuilder, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::Settings;
use crate::error::ApiError;
use crate::poll::{
    CONNECTION_POLL_INTERVAL, CancelToken, ConnectionStatus, DEPLOY_POLL_INTERVAL,
    DeploymentStatus, PollOutcome, poll_until,
};
use crate::reconcile::{ReconcileAction, ReconcileResponse, Service};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ArchitectureRequest {
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace_id: Option<String>,
    #[serde(flatten)]
    pub requirements: serde_json::Map<String, Value>,
}

#[derive(Debug, Clone, Serialize)]
struct ReconcileRequest<'a> {
    #[serde(flatten)]
    action: &'a ReconcileAction,
    #[serde(skip_serializing_if = "Option::is_none")]
    workspace_id: Option<&'a str>,
    current_services: &'a [Service],
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workspace {
    #[serde(alias = "_id")]
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(flatten)]
    pub state: serde_json::Map<String, Value>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum WorkspaceList {
    Bare(Vec<Workspace>),
    Wrapped { workspaces: Vec<Workspace> },
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AuthResponse {
    pub token: String,
    #[serde(default)]
    pub user: Option<Value>,
}

#[derive(Debug, Clone, Serialize)]
struct Credentials<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
    email: &'a str,
    password: &'a str,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DeploymentJob {
    #[serde(alias = "jobId")]
    pub job_id: String,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: Url,
    token: Option<String>,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Result<Self, ApiError> {
        let base_url =
            Url::parse(base_url.trim()).map_err(|_| ApiError::BaseUrl(base_url.to_string()))?;
        if base_url.cannot_be_a_base() || !matches!(base_url.scheme(), "http" | "https") {
            return Err(ApiError::BaseUrl(base_url.to_string()));
        }

        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            http,
            base_url,
            token: None,
        })
    }

    pub fn from_settings(settings: &Settings) -> Result<Self, ApiError> {
        Ok(Self::new(settings.api_base_url())?.with_token(settings.token().map(str::to_owned)))
    }

    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token.filter(|token| !token.is_empty());
        self
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, ApiError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ApiError::BaseUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .push("api")
            .extend(segments);
        Ok(url)
    }

    fn request(&self, method: Method, segments: &[&str]) -> Result<RequestBuilder, ApiError> {
        let url = self.endpoint(segments)?;
        log::debug!(method:% = method, url:% = url; "api request");
        let builder = self.http.request(method, url);
        Ok(match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        })
    }

    async fn send<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T, ApiError> {
        let response = builder.send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            let err = error_from_response(status, &body);
            log::warn!(status = status.as_u16(), error:% = err; "api call failed");
            return Err(err);
        }

        if body.trim().is_empty() {
            return Ok(serde_json::from_value(Value::Null)?);
        }
        Ok(serde_json::from_str(&body)?)
    }

    async fn get<T: DeserializeOwned>(&self, segments: &[&str]) -> Result<T, ApiError> {
        self.send(self.request(Method::GET, segments)?).await
    }

    async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        segments: &[&str],
        body: &B,
    ) -> Result<T, ApiError> {
        self.send(self.request(Method::POST, segments)?.json(body))
            .await
    }

    async fn put<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        segments: &[&str],
        body: &B,
    ) -> Result<T, ApiError> {
        self.send(self.request(Method::PUT, segments)?.json(body))
            .await
    }

    /// Returns the raw response; the report module knows how to read it.
    pub async fn generate_architecture(
        &self,
        request: &ArchitectureRequest,
    ) -> Result<Value, ApiError> {
        self.post(&["workflow", "architecture"], request).await
    }

    pub async fn validate_completeness(&self, payload: &Value) -> Result<Value, ApiError> {
        self.post(&["architecture", "validate-completeness"], payload)
            .await
    }

    pub async fn reconcile(
        &self,
        workspace_id: Option<&str>,
        action: &ReconcileAction,
        current_services: &[Service],
    ) -> Result<ReconcileResponse, ApiError> {
        let request = ReconcileRequest {
            action,
            workspace_id,
            current_services,
        };
        self.post(&["architecture", "reconcile"], &request).await
    }

    pub async fn list_workspaces(&self) -> Result<Vec<Workspace>, ApiError> {
        let list: WorkspaceList = self.get(&["workspaces"]).await?;
        Ok(match list {
            WorkspaceList::Bare(workspaces) | WorkspaceList::Wrapped { workspaces } => workspaces,
        })
    }

    pub async fn get_workspace(&self, id: &str) -> Result<Workspace, ApiError> {
        self.get(&["workspaces", id]).await
    }

    pub async fn save_workspace(&self, workspace: &Value) -> Result<Workspace, ApiError> {
        self.post(&["workspaces"], workspace).await
    }

    /// Attaches a PNG data URL to a workspace so the report can embed it later.
    pub async fn save_diagram_snapshot(
        &self,
        workspace_id: &str,
        data_url: &str,
    ) -> Result<Value, ApiError> {
        let body = serde_json::json!({ "diagram_image": data_url });
        self.put(&["workspaces", workspace_id, "diagram"], &body)
            .await
    }

    pub async fn connect_cloud(&self, provider: &str, credentials: &Value) -> Result<Value, ApiError> {
        self.post(&["cloud", provider, "connect"], credentials)
            .await
    }

    pub async fn connection_status(&self, provider: &str) -> Result<ConnectionStatus, ApiError> {
        self.get(&["cloud", provider, "status"]).await
    }

    pub async fn deploy_resources(&self, payload: &Value) -> Result<DeploymentJob, ApiError> {
        self.post(&["workflow", "deploy", "resources"], payload)
            .await
    }

    pub async fn deploy_status(&self, job_id: &str) -> Result<DeploymentStatus, ApiError> {
        self.get(&["workflow", "deploy", job_id, "status"]).await
    }

    /// Polls the job every two seconds until it completes, fails or `token` fires.
    pub async fn wait_for_deployment(
        &self,
        job_id: &str,
        token: &CancelToken,
    ) -> Result<PollOutcome<DeploymentStatus>, ApiError> {
        poll_until(
            DEPLOY_POLL_INTERVAL,
            token,
            || self.deploy_status(job_id),
            DeploymentStatus::is_terminal,
            ApiError::is_fatal,
        )
        .await
    }

    pub async fn wait_for_connection(
        &self,
        provider: &str,
        token: &CancelToken,
    ) -> Result<PollOutcome<ConnectionStatus>, ApiError> {
        poll_until(
            CONNECTION_POLL_INTERVAL,
            token,
            || self.connection_status(provider),
            ConnectionStatus::is_settled,
            ApiError::is_fatal,
        )
        .await
    }

    pub async fn billing_status(&self) -> Result<Value, ApiError> {
        self.get(&["billing", "status"]).await
    }

    pub async fn get_profile(&self) -> Result<Value, ApiError> {
        self.get(&["auth", "profile"]).await
    }

    pub async fn update_profile(&self, profile: &Value) -> Result<Value, ApiError> {
        self.put(&["auth", "profile"], profile).await
    }

    pub async fn delete_profile(&self) -> Result<(), ApiError> {
        let _: Value = self
            .send(self.request(Method::DELETE, &["auth", "profile"])?)
            .await?;
        Ok(())
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<AuthResponse, ApiError> {
        let credentials = Credentials {
            name: None,
            email,
            password,
        };
        self.post(&["auth", "login"], &credentials).await
    }

    pub async fn register(
        &self,
        name: &str,
        email: &str,
        password: &str,
    ) -> Result<AuthResponse, ApiError> {
        let credentials = Credentials {
            name: Some(name),
            email,
            password,
        };
        self.post(&["auth", "register"], &credentials).await
    }
}

/// Maps a failed response to the error taxonomy. The backend's `message` or
/// `error` field is preferred over a generic text.
pub fn error_from_response(status: StatusCode, body: &str) -> ApiError {
    let message = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|value| {
            ["message", "error"].iter().find_map(|key| {
                value
                    .get(key)
                    .and_then(Value::as_str)
                    .map(str::trim)
                    .filter(|text| !text.is_empty())
                    .map(str::to_string)
            })
        })
        .unwrap_or_else(|| format!("Request failed with status {}", status.as_u16()));

    match status {
        StatusCode::UNAUTHORIZED => ApiError::Unauthorized(message),
        StatusCode::FORBIDDEN => ApiError::PlanRequired(message),
        other => ApiError::Status {
            code: other.as_u16(),
            message,
        },
    }
}
