//! API client module
//!
//! This module provides HTTP client functionality to interact with the autopm API server.

use std::sync::Arc;

use reqwest::{Client as ReqwestClient, Error as ReqwestError, Response};
use serde::{de::DeserializeOwned, Deserialize};

use super::server::{AnalysisResponse, AuditRequest, MoveTaskRequest, NavigateRequest};
use crate::models::{DashboardSnapshot, FileItem, LogEntry, NewTask, Task, TaskStatus, ThinkingPlan};
use crate::sync::SyncOutcome;

/// API client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000".to_string(),
        }
    }
}

/// Generic API response structure
#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    success: bool,
    data: Option<T>,
    error: Option<String>,
}

/// Client errors
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] ReqwestError),

    #[error("API error: {0}")]
    Api(String),

    #[error("Missing data in response")]
    MissingData,
}

/// API client for the autopm service
#[derive(Debug, Clone)]
pub struct Client {
    http_client: Arc<ReqwestClient>,
    config: ClientConfig,
}

impl Default for Client {
    fn default() -> Self {
        Self::new()
    }
}

impl Client {
    /// Create a new client with default configuration
    pub fn new() -> Self {
        Self::with_config(ClientConfig::default())
    }

    /// Create a new client with custom configuration
    pub fn with_config(config: ClientConfig) -> Self {
        Self {
            http_client: Arc::new(ReqwestClient::new()),
            config,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    // Every endpoint answers with the same envelope, error statuses included
    async fn read_response<T: DeserializeOwned>(response: Response) -> Result<T, ClientError> {
        let status = response.status();
        let api_response: ApiResponse<T> = match response.json().await {
            Ok(api_response) => api_response,
            Err(_) if !status.is_success() => {
                return Err(ClientError::Api(format!("HTTP error: {}", status)))
            }
            Err(e) => return Err(e.into()),
        };

        if api_response.success {
            api_response.data.ok_or(ClientError::MissingData)
        } else {
            Err(ClientError::Api(
                api_response
                    .error
                    .unwrap_or_else(|| "Unknown API error".to_string()),
            ))
        }
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        let response = self.http_client.get(self.url(path)).send().await?;
        Self::read_response(response).await
    }

    async fn post<B: serde::Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: Option<&B>,
    ) -> Result<T, ClientError> {
        let mut request = self.http_client.post(self.url(path));
        if let Some(body) = body {
            request = request.json(body);
        }
        Self::read_response(request.send().await?).await
    }

    /// Get everything the dashboard shows
    pub async fn get_dashboard(&self) -> Result<DashboardSnapshot, ClientError> {
        self.get("/api/dashboard").await
    }

    /// Get the board's tasks
    pub async fn get_tasks(&self) -> Result<Vec<Task>, ClientError> {
        self.get("/api/tasks").await
    }

    /// Add a task to the backlog
    pub async fn create_task(&self, new_task: &NewTask) -> Result<Task, ClientError> {
        self.post("/api/tasks", Some(new_task)).await
    }

    /// Move a task to another column
    pub async fn move_task(&self, id: &str, status: TaskStatus) -> Result<Task, ClientError> {
        let path = format!("/api/tasks/{}/move", id);
        self.post(&path, Some(&MoveTaskRequest { status })).await
    }

    /// Get the project tree
    pub async fn get_files(&self) -> Result<Vec<FileItem>, ClientError> {
        self.get("/api/files").await
    }

    /// Start a dependency audit on a file
    pub async fn audit_file(&self, name: &str) -> Result<String, ClientError> {
        let request = AuditRequest {
            name: name.to_string(),
        };
        self.post("/api/files/audit", Some(&request)).await
    }

    /// Record a sidebar navigation
    pub async fn navigate(&self, tab: &str) -> Result<String, ClientError> {
        let request = NavigateRequest {
            tab: tab.to_string(),
        };
        self.post("/api/navigate", Some(&request)).await
    }

    /// Get the terminal log, oldest first
    pub async fn get_logs(&self) -> Result<Vec<LogEntry>, ClientError> {
        self.get("/api/logs").await
    }

    /// Get the thinking feed, newest first
    pub async fn get_plans(&self) -> Result<Vec<ThinkingPlan>, ClientError> {
        self.get("/api/plans").await
    }

    /// Run a sync cycle now
    pub async fn sync(&self) -> Result<SyncOutcome, ClientError> {
        self.post::<(), _>("/api/sync", None).await
    }

    /// Ask for an architecture summary of the project tree
    pub async fn analyze(&self) -> Result<String, ClientError> {
        let response: AnalysisResponse = self.post::<(), _>("/api/analyze", None).await?;
        Ok(response.summary)
    }
}
