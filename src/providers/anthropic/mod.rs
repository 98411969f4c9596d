//! Anthropic provider adapter.
//!
//! Drives the Messages API with an `x-api-key` header. The base URL is
//! overridable so integration tests can point the adapter at a mock server.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::http::{PROBE_TIMEOUT, build_client, classify_status, classify_transport_error};
use crate::core::request::OperationRequest;
use crate::error::{Result, SwitchyardError};
use crate::providers::InvokeResponse;

/// Production API base URL.
const API_BASE: &str = "https://api.anthropic.com";

/// API version header value.
const API_VERSION: &str = "2023-06-01";

/// Output cap requested per invocation.
const MAX_TOKENS: u32 = 4096;

/// Adapter for the Anthropic Messages API.
pub struct AnthropicAdapter {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<Message<'a>>,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
    model: String,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: String,
}

impl AnthropicAdapter {
    /// Create an adapter against the production endpoint.
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        Self::with_base_url(api_key, API_BASE)
    }

    /// Create an adapter against an arbitrary base URL (tests).
    pub fn with_base_url(api_key: impl Into<String>, base_url: impl Into<String>) -> Result<Self> {
        Ok(Self {
            client: build_client(crate::core::http::DEFAULT_TIMEOUT)?,
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Invoke the Messages API.
    pub async fn invoke(
        &self,
        request: &OperationRequest,
        model: &str,
        timeout: Duration,
    ) -> Result<InvokeResponse> {
        let provider = "anthropic";
        let body = MessagesRequest {
            model,
            max_tokens: MAX_TOKENS,
            messages: vec![Message {
                role: "user",
                content: &request.input,
            }],
        };

        let response = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .timeout(timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| classify_transport_error(provider, &e, timeout))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(provider, status.as_u16(), &body));
        }

        let parsed: MessagesResponse = response.json().await.map_err(|e| {
            SwitchyardError::ProviderApi {
                provider: provider.to_string(),
                status_code: Some(status.as_u16()),
                message: format!("response parse failure: {e}"),
            }
        })?;

        let output = parsed
            .content
            .first()
            .map(|block| block.text.clone())
            .unwrap_or_default();

        Ok(InvokeResponse {
            output,
            model: parsed.model,
        })
    }

    /// Reachability probe against the models listing endpoint.
    pub async fn probe(&self) -> bool {
        self.client
            .get(format!("{}/v1/models", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .timeout(PROBE_TIMEOUT)
            .send()
            .await
            .is_ok_and(|r| r.status().is_success() || r.status().is_client_error())
    }
}
