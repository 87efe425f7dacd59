use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use std::time::Duration;
use thiserror::Error;

/// How the inference endpoint answered one request.
#[derive(Debug, Clone, PartialEq)]
pub enum InferenceReply {
    /// 2xx with an `image` field (URL or data URI).
    Image(String),
    /// 503: the model is still loading. `estimated_time` is in seconds.
    Warming { estimated_time: f64 },
    /// Any other non-2xx status.
    Failed { status: u16, error: String },
}

#[derive(Error, Debug)]
pub enum InferenceError {
    #[error("{context}: {source}")]
    Network {
        context: String,
        source: reqwest::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    InvalidResponse(String),
}

#[async_trait]
pub trait InferenceTransport: Send + Sync {
    async fn generate(&self, prompt: &str) -> std::result::Result<InferenceReply, InferenceError>;
}

/// Posts `{ "input": prompt }` to a single endpoint.
pub struct HttpInference {
    client: Client,
    endpoint: String,
}

impl HttpInference {
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build inference HTTP client")?;
        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl InferenceTransport for HttpInference {
    async fn generate(&self, prompt: &str) -> std::result::Result<InferenceReply, InferenceError> {
        let resp = self
            .client
            .post(&self.endpoint)
            .json(&json!({ "input": prompt }))
            .send()
            .await
            .map_err(|source| InferenceError::Network {
                context: format!("failed to reach inference endpoint {}", self.endpoint),
                source,
            })?;

        let status = resp.status();
        let body = resp.bytes().await.map_err(|source| InferenceError::Network {
            context: "failed to read inference response".to_string(),
            source,
        })?;

        classify_response(status, &body)
    }
}

pub fn classify_response(
    status: StatusCode,
    body: &[u8],
) -> std::result::Result<InferenceReply, InferenceError> {
    if status.is_success() {
        let data: Value = serde_json::from_slice(body)?;
        return data
            .get("image")
            .and_then(Value::as_str)
            .filter(|image| !image.is_empty())
            .map(|image| InferenceReply::Image(image.to_string()))
            .ok_or_else(|| InferenceError::InvalidResponse("response has no image".to_string()));
    }

    let data: Value = serde_json::from_slice(body).unwrap_or(Value::Null);

    if status == StatusCode::SERVICE_UNAVAILABLE {
        let estimated_time = data
            .get("estimated_time")
            .and_then(value_to_seconds)
            .unwrap_or(0.0);
        return Ok(InferenceReply::Warming { estimated_time });
    }

    let error = data
        .get("error")
        .and_then(Value::as_str)
        .map(ToOwned::to_owned)
        .or_else(|| {
            let text = String::from_utf8_lossy(body).trim().to_string();
            (!text.is_empty()).then_some(text)
        })
        .unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("request failed")
                .to_string()
        });

    Ok(InferenceReply::Failed {
        status: status.as_u16(),
        error,
    })
}

fn value_to_seconds(value: &Value) -> Option<f64> {
    value
        .as_f64()
        .or_else(|| value.as_str().and_then(|v| v.trim().parse::<f64>().ok()))
}
