// src/session/client.rs

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use url::Url;

use crate::models::submission::{ScoreSummary, SubmitRequest, SubmitResponse};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubmitError {
    #[error("could not reach the submit endpoint: {0}")]
    Transport(String),

    #[error("submit request timed out")]
    Timeout,

    #[error("submit endpoint answered with status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("submission rejected: {0}")]
    Rejected(String),
}

/// The server acknowledged the submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SubmitAck {
    pub summary: Option<ScoreSummary>,
}

/// Sends a finished attempt to the submit endpoint.
#[async_trait]
pub trait SubmitClient: Send + Sync {
    async fn submit(&self, request: &SubmitRequest) -> Result<SubmitAck, SubmitError>;
}

/// Interprets a submit endpoint reply. `success: false` is a failure even
/// when the status is 2xx.
pub fn interpret(status: u16, body: Option<SubmitResponse>) -> Result<SubmitAck, SubmitError> {
    let ok_status = (200..300).contains(&status);
    match body {
        Some(resp) if ok_status && resp.success => Ok(SubmitAck { summary: resp.data }),
        Some(resp) if ok_status => Err(SubmitError::Rejected(
            resp.error.unwrap_or_else(|| "submission was not accepted".to_string()),
        )),
        Some(resp) => Err(SubmitError::Status {
            status,
            message: resp.error.unwrap_or_default(),
        }),
        None if ok_status => Err(SubmitError::Rejected("unreadable response body".to_string())),
        None => Err(SubmitError::Status {
            status,
            message: String::new(),
        }),
    }
}

/// `reqwest` client for `POST {base}/api/forms/{id}/responses`.
#[derive(Debug, Clone)]
pub struct HttpSubmitClient {
    http: reqwest::Client,
    base: Url,
}

impl HttpSubmitClient {
    pub fn new(base: Url, timeout: Duration) -> Result<Self, SubmitError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SubmitError::Transport(e.to_string()))?;
        Ok(Self { http, base })
    }

    pub fn endpoint(&self, request: &SubmitRequest) -> Result<Url, SubmitError> {
        self.base
            .join(&format!("api/forms/{}/responses", request.form_id))
            .map_err(|e| SubmitError::Transport(e.to_string()))
    }
}

#[async_trait]
impl SubmitClient for HttpSubmitClient {
    async fn submit(&self, request: &SubmitRequest) -> Result<SubmitAck, SubmitError> {
        let url = self.endpoint(request)?;
        let response = self.http.post(url).json(request).send().await.map_err(|e| {
            if e.is_timeout() {
                SubmitError::Timeout
            } else {
                SubmitError::Transport(e.to_string())
            }
        })?;

        let status = response.status().as_u16();
        let body = response.json::<SubmitResponse>().await.ok();
        interpret(status, body)
    }
}
