//! OpenAI provider adapter.
//!
//! Drives the Chat Completions API with a bearer token. Base URL is
//! overridable for tests.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::http::{PROBE_TIMEOUT, build_client, classify_status, classify_transport_error};
use crate::core::request::OperationRequest;
use crate::error::{Result, SwitchyardError};
use crate::providers::InvokeResponse;

/// Production API base URL.
const API_BASE: &str = "https://api.openai.com";

/// Adapter for the OpenAI Chat Completions API.
pub struct OpenAiAdapter {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
    model: String,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: String,
}

impl OpenAiAdapter {
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

    /// Invoke the Chat Completions API.
    pub async fn invoke(
        &self,
        request: &OperationRequest,
        model: &str,
        timeout: Duration,
    ) -> Result<InvokeResponse> {
        let provider = "openai";
        let body = ChatRequest {
            model,
            messages: vec![ChatMessage {
                role: "user",
                content: &request.input,
            }],
        };

        let response = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
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

        let parsed: ChatResponse = response.json().await.map_err(|e| {
            SwitchyardError::ProviderApi {
                provider: provider.to_string(),
                status_code: Some(status.as_u16()),
                message: format!("response parse failure: {e}"),
            }
        })?;

        let output = parsed
            .choices
            .first()
            .map(|choice| choice.message.content.clone())
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
            .bearer_auth(&self.api_key)
            .timeout(PROBE_TIMEOUT)
            .send()
            .await
            .is_ok_and(|r| r.status().is_success() || r.status().is_client_error())
    }
}
