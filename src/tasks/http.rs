//! HTTP client for an external task-management service.
//!
//! Contract: `POST {base_url}/tasks` with a JSON `TaskRequest`, answered by
//! `{"id": "..."}` on success.

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::TaskBridgeError;

use super::{TaskId, TaskRequest, TaskService};

pub struct HttpTaskService {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Deserialize)]
struct CreatedTask {
    id: serde_json::Value,
}

impl HttpTaskService {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn tasks_url(&self) -> String {
        format!("{}/tasks", self.base_url)
    }
}

/// Accept either a string or numeric id.
fn parse_task_id(created: CreatedTask) -> Result<TaskId, TaskBridgeError> {
    match created.id {
        serde_json::Value::String(s) if !s.is_empty() => Ok(TaskId(s)),
        serde_json::Value::Number(n) => Ok(TaskId(n.to_string())),
        other => Err(TaskBridgeError::InvalidResponse {
            reason: format!("unusable task id: {other}"),
        }),
    }
}

#[async_trait]
impl TaskService for HttpTaskService {
    async fn create_task(&self, request: TaskRequest) -> Result<TaskId, TaskBridgeError> {
        let response = self
            .client
            .post(self.tasks_url())
            .json(&request)
            .send()
            .await
            .map_err(|e| TaskBridgeError::RequestFailed {
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TaskBridgeError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let created: CreatedTask =
            response
                .json()
                .await
                .map_err(|e| TaskBridgeError::InvalidResponse {
                    reason: e.to_string(),
                })?;

        parse_task_id(created)
    }
}
