//! HTTP client utilities.
//!
//! Provides a shared HTTP client builder for all provider adapters.

use std::time::Duration;

use reqwest::{Client, ClientBuilder};

use crate::error::{Result, SwitchyardError};

/// Default timeout for HTTP requests.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Timeout for reachability probes.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Build a configured HTTP client.
///
/// # Errors
///
/// Returns error if client construction fails.
pub fn build_client(timeout: Duration) -> Result<Client> {
    ClientBuilder::new()
        .timeout(timeout)
        .user_agent(format!("switchyard/{}", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| SwitchyardError::Config(format!("HTTP client construction failed: {e}")))
}

/// Map a `reqwest` transport error to a provider-category error.
#[must_use]
pub fn classify_transport_error(provider: &str, err: &reqwest::Error, timeout: Duration) -> SwitchyardError {
    if err.is_timeout() {
        SwitchyardError::ProviderTimeout {
            provider: provider.to_string(),
            seconds: timeout.as_secs(),
        }
    } else if err.is_connect() {
        SwitchyardError::ProviderUnreachable {
            provider: provider.to_string(),
            message: err.to_string(),
        }
    } else {
        SwitchyardError::ProviderApi {
            provider: provider.to_string(),
            status_code: err.status().map(|s| s.as_u16()),
            message: err.to_string(),
        }
    }
}

/// Map a non-success HTTP status to a provider-category error.
#[must_use]
pub fn classify_status(provider: &str, status: u16, body: &str) -> SwitchyardError {
    let message = if body.is_empty() {
        format!("HTTP {status}")
    } else {
        format!("HTTP {status}: {}", body.chars().take(200).collect::<String>())
    };
    match status {
        401 | 403 => SwitchyardError::ProviderAuth {
            provider: provider.to_string(),
            message,
        },
        429 => SwitchyardError::RateLimited {
            provider: provider.to_string(),
            retry_after: None,
            message,
        },
        _ => SwitchyardError::ProviderApi {
            provider: provider.to_string(),
            status_code: Some(status),
            message,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_classification() {
        assert!(matches!(
            classify_status("anthropic", 401, ""),
            SwitchyardError::ProviderAuth { .. }
        ));
        assert!(matches!(
            classify_status("anthropic", 429, "slow down"),
            SwitchyardError::RateLimited { .. }
        ));
        assert!(matches!(
            classify_status("anthropic", 503, ""),
            SwitchyardError::ProviderApi {
                status_code: Some(503),
                ..
            }
        ));
    }

    #[test]
    fn status_message_is_truncated() {
        let long = "x".repeat(1000);
        let err = classify_status("openai", 500, &long);
        assert!(err.to_string().len() < 300);
    }
}
