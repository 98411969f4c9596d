//! Gemini provider adapter.
//!
//! Drives the `generateContent` API with a key query parameter. Base URL is
//! overridable for tests.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::http::{PROBE_TIMEOUT, build_client, classify_status, classify_transport_error};
use crate::core::request::OperationRequest;
use crate::error::{Result, SwitchyardError};
use crate::providers::InvokeResponse;

/// Production API base URL.
const API_BASE: &str = "https://generativelanguage.googleapis.com";

/// Adapter for the Gemini `generateContent` API.
pub struct GeminiAdapter {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
}

#[derive(Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct GenerateResponse {
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: CandidateContent,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: String,
}

impl GeminiAdapter {
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

    /// Invoke the `generateContent` API.
    pub async fn invoke(
        &self,
        request: &OperationRequest,
        model: &str,
        timeout: Duration,
    ) -> Result<InvokeResponse> {
        let provider = "gemini";
        let body = GenerateRequest {
            contents: vec![Content {
                parts: vec![Part {
                    text: &request.input,
                }],
            }],
        };

        let url = format!(
            "{}/v1beta/models/{model}:generateContent?key={}",
            self.base_url, self.api_key
        );
        let response = self
            .client
            .post(url)
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

        let parsed: GenerateResponse = response.json().await.map_err(|e| {
            SwitchyardError::ProviderApi {
                provider: provider.to_string(),
                status_code: Some(status.as_u16()),
                message: format!("response parse failure: {e}"),
            }
        })?;

        let output = parsed
            .candidates
            .first()
            .and_then(|c| c.content.parts.first())
            .map(|part| part.text.clone())
            .unwrap_or_default();

        Ok(InvokeResponse {
            output,
            model: model.to_string(),
        })
    }

    /// Reachability probe against the models listing endpoint.
    pub async fn probe(&self) -> bool {
        self.client
            .get(format!(
                "{}/v1beta/models?key={}",
                self.base_url, self.api_key
            ))
            .timeout(PROBE_TIMEOUT)
            .send()
            .await
            .is_ok_and(|r| r.status().is_success() || r.status().is_client_error())
    }
}
