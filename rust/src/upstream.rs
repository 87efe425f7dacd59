//! Forwards prompts to the hosted model behind `/api/generate`.
//!
//! The hosted model answers with raw image bytes, so the image is handed back
//! to the page as a `data:` URI.

use anyhow::{Context, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, warn};

use crate::inference::{classify_response, InferenceError, InferenceReply};

pub struct UpstreamClient {
    client: Client,
    model_url: String,
    auth_token: Option<String>,
}

impl UpstreamClient {
    pub fn new(model_url: &str, auth_token: Option<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build upstream HTTP client")?;
        Ok(Self {
            client,
            model_url: model_url.trim().to_string(),
            auth_token: auth_token.filter(|t| !t.trim().is_empty()),
        })
    }

    pub fn is_configured(&self) -> bool {
        !self.model_url.is_empty() && self.auth_token.is_some()
    }

    pub async fn forward(&self, input: &str) -> std::result::Result<InferenceReply, InferenceError> {
        let mut request = self
            .client
            .post(&self.model_url)
            .json(&json!({ "inputs": input }));
        if let Some(token) = &self.auth_token {
            request = request.bearer_auth(token);
        }

        let resp = request.send().await.map_err(|source| InferenceError::Network {
            context: format!("failed to reach upstream model {}", self.model_url),
            source,
        })?;

        let status = resp.status();
        let content_type = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(ToOwned::to_owned);
        let body = resp.bytes().await.map_err(|source| InferenceError::Network {
            context: "failed to read upstream response".to_string(),
            source,
        })?;

        if status.is_success() {
            debug!(bytes = body.len(), "upstream returned image");
            return Ok(InferenceReply::Image(to_data_uri(content_type.as_deref(), &body)));
        }

        let reply = classify_response(status, &body)?;
        if let InferenceReply::Failed { status, error } = &reply {
            warn!(status, "upstream model error: {error}");
        }
        Ok(reply)
    }
}

pub fn to_data_uri(content_type: Option<&str>, bytes: &[u8]) -> String {
    let mime = content_type
        .and_then(|v| v.split(';').next())
        .map(str::trim)
        .filter(|v| v.starts_with("image/"))
        .unwrap_or("image/jpeg");
    format!("data:{mime};base64,{}", STANDARD.encode(bytes))
}
