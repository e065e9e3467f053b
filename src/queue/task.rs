//! Units of work executed by the queue.

use crate::error::{Error, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::future::Future;

/// Raw outcome of one task attempt, before status checking and JSON decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskResponse {
    /// HTTP status code
    pub status: u16,
    /// Reason phrase reported alongside the status
    pub status_text: String,
    /// Undecoded response body
    pub body: String,
}

impl TaskResponse {
    /// A 200 response carrying `body` serialized as JSON.
    pub fn ok_json(body: &Value) -> Self {
        Self {
            status: 200,
            status_text: "OK".to_string(),
            body: body.to_string(),
        }
    }

    /// A bodiless response with the given status.
    pub fn status(status: u16, status_text: &str) -> Self {
        Self {
            status,
            status_text: status_text.to_string(),
            body: String::new(),
        }
    }

    /// Drain a `reqwest` response.
    pub async fn from_reqwest(response: reqwest::Response) -> Result<Self> {
        let status = response.status();
        let status_text = status.canonical_reason().unwrap_or_default().to_string();
        let body = response.text().await?;
        Ok(Self {
            status: status.as_u16(),
            status_text,
            body,
        })
    }

    /// Check the status and decode the body.
    ///
    /// Statuses in `[400, 600)` become [`Error::Http`]. An empty successful
    /// body decodes to `Value::Null`.
    pub fn into_json(self) -> Result<Value> {
        if (400..600).contains(&self.status) {
            return Err(Error::http(self.status, &self.status_text));
        }
        if self.body.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&self.body)?)
    }
}

/// An operation the queue can run, possibly several times.
///
/// Implementations hold the request parameters and must be safe to re-run:
/// the queue calls [`Task::run`] once per attempt.
#[async_trait]
pub trait Task: Send + Sync {
    /// Perform one attempt.
    async fn run(&self) -> Result<TaskResponse>;
}

#[async_trait]
impl<F, Fut> Task for F
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<TaskResponse>> + Send,
{
    async fn run(&self) -> Result<TaskResponse> {
        (self)().await
    }
}
