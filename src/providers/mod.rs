//! Provider adapters.
//!
//! Every backend is wrapped behind one uniform adapter surface: invoke with a
//! bounded timeout, estimate cost for a request, and a lightweight
//! reachability probe. Adapters are a closed set of tagged variants; a new
//! backend is a new variant, not ad-hoc shape matching. Native SDK calling
//! conventions are converted to plain `async` + timeout at this boundary so
//! the router's control flow reads as straight-line logic.

pub mod anthropic;
pub mod gemini;
pub mod openai;

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::pricing::PricingRegistry;
use crate::core::request::OperationRequest;
use crate::error::{Result, SwitchyardError};

pub use anthropic::AnthropicAdapter;
pub use gemini::GeminiAdapter;
pub use openai::OpenAiAdapter;

// =============================================================================
// Provider Enum
// =============================================================================

/// Supported backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderId {
    Anthropic,
    OpenAi,
    Gemini,
}

impl ProviderId {
    /// All providers in default priority order.
    pub const ALL: &'static [Self] = &[Self::Anthropic, Self::OpenAi, Self::Gemini];

    /// CLI / config name for this provider.
    #[must_use]
    pub const fn cli_name(self) -> &'static str {
        match self {
            Self::Anthropic => "anthropic",
            Self::OpenAi => "openai",
            Self::Gemini => "gemini",
        }
    }

    /// Display name for human output.
    #[must_use]
    pub const fn display_name(self) -> &'static str {
        match self {
            Self::Anthropic => "Anthropic",
            Self::OpenAi => "OpenAI",
            Self::Gemini => "Gemini",
        }
    }

    /// Environment variable holding this provider's API key.
    ///
    /// The encrypted secret store is an external collaborator; by the time a
    /// key reaches this process it is a plain environment capability.
    #[must_use]
    pub const fn api_key_env(self) -> &'static str {
        match self {
            Self::Anthropic => "ANTHROPIC_API_KEY",
            Self::OpenAi => "OPENAI_API_KEY",
            Self::Gemini => "GEMINI_API_KEY",
        }
    }

    /// Built-in default model for this provider.
    #[must_use]
    pub const fn default_model(self) -> &'static str {
        match self {
            Self::Anthropic => "claude-sonnet-4-20250514",
            Self::OpenAi => "gpt-4o",
            Self::Gemini => "gemini-2.0-flash",
        }
    }

    /// Parse from CLI argument or config value.
    pub fn from_cli_name(name: &str) -> Result<Self> {
        let lower = name.to_lowercase();
        Self::ALL
            .iter()
            .find(|p| p.cli_name() == lower)
            .copied()
            .ok_or_else(|| SwitchyardError::UnknownProvider(name.to_string()))
    }
}

impl std::fmt::Display for ProviderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.cli_name())
    }
}

// =============================================================================
// Invocation Types
// =============================================================================

/// Response from a successful provider invocation.
#[derive(Debug, Clone)]
pub struct InvokeResponse {
    /// Response payload.
    pub output: String,
    /// Model that actually served the request.
    pub model: String,
}

/// Classify an invocation failure for the failover policy.
///
/// Timeouts, unreachable backends, rate limits, and 5xx-equivalent API
/// errors are retryable against the next candidate; auth failures and other
/// 4xx responses are terminal for the whole operation.
#[must_use]
pub fn invocation_retryable(err: &SwitchyardError) -> bool {
    match err {
        SwitchyardError::ProviderTimeout { .. }
        | SwitchyardError::ProviderUnreachable { .. }
        | SwitchyardError::RateLimited { .. } => true,
        SwitchyardError::ProviderApi { status_code, .. } => {
            status_code.is_none_or(|code| code >= 500)
        }
        _ => false,
    }
}

// =============================================================================
// Provider Adapter
// =============================================================================

/// Uniform interface to one backend.
pub enum ProviderAdapter {
    Anthropic(AnthropicAdapter),
    OpenAi(OpenAiAdapter),
    Gemini(GeminiAdapter),
    /// Scripted adapter for tests; behaves per a queued script.
    #[cfg(any(test, feature = "test-utils"))]
    Scripted(crate::test_utils::ScriptedAdapter),
}

impl ProviderAdapter {
    /// Which provider this adapter fronts.
    #[must_use]
    pub fn id(&self) -> ProviderId {
        match self {
            Self::Anthropic(_) => ProviderId::Anthropic,
            Self::OpenAi(_) => ProviderId::OpenAi,
            Self::Gemini(_) => ProviderId::Gemini,
            #[cfg(any(test, feature = "test-utils"))]
            Self::Scripted(a) => a.id(),
        }
    }

    /// Invoke the backend with a bounded timeout.
    ///
    /// # Errors
    ///
    /// Returns a provider-category error classified for the failover policy
    /// by [`invocation_retryable`].
    pub async fn invoke(
        &self,
        request: &OperationRequest,
        model: &str,
        timeout: Duration,
    ) -> Result<InvokeResponse> {
        match self {
            Self::Anthropic(a) => a.invoke(request, model, timeout).await,
            Self::OpenAi(a) => a.invoke(request, model, timeout).await,
            Self::Gemini(a) => a.invoke(request, model, timeout).await,
            #[cfg(any(test, feature = "test-utils"))]
            Self::Scripted(a) => a.invoke(request, model, timeout).await,
        }
    }

    /// Estimate the cost of serving `request` through this provider.
    ///
    /// Returns `None` when the pricing registry carries no rate for this
    /// provider and operation class.
    #[must_use]
    pub fn estimate_cost(
        &self,
        request: &OperationRequest,
        pricing: &PricingRegistry,
    ) -> Option<f64> {
        pricing.estimate(self.id(), request.class, request.estimated_units)
    }

    /// Lightweight reachability probe.
    pub async fn probe(&self) -> bool {
        match self {
            Self::Anthropic(a) => a.probe().await,
            Self::OpenAi(a) => a.probe().await,
            Self::Gemini(a) => a.probe().await,
            #[cfg(any(test, feature = "test-utils"))]
            Self::Scripted(a) => a.probe(),
        }
    }
}

impl std::fmt::Debug for ProviderAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("ProviderAdapter")
            .field(&self.id().cli_name())
            .finish()
    }
}

// =============================================================================
// Adapter Registry
// =============================================================================

/// Ordered set of configured adapters.
///
/// Order is the configured routing priority; candidate lists preserve it.
pub struct AdapterRegistry {
    adapters: Vec<ProviderAdapter>,
}

impl AdapterRegistry {
    /// Build a registry from adapters already in priority order.
    #[must_use]
    pub fn new(adapters: Vec<ProviderAdapter>) -> Self {
        Self { adapters }
    }

    /// Build HTTP adapters for every provider in `priority` whose API key is
    /// present in the environment. Providers without keys are skipped with a
    /// warning.
    pub fn from_env(priority: &[ProviderId]) -> Result<Self> {
        let mut adapters = Vec::new();
        for &provider in priority {
            let Ok(key) = std::env::var(provider.api_key_env()) else {
                tracing::warn!(
                    provider = provider.cli_name(),
                    env = provider.api_key_env(),
                    "no API key in environment, provider skipped"
                );
                continue;
            };
            let adapter = match provider {
                ProviderId::Anthropic => ProviderAdapter::Anthropic(AnthropicAdapter::new(key)?),
                ProviderId::OpenAi => ProviderAdapter::OpenAi(OpenAiAdapter::new(key)?),
                ProviderId::Gemini => ProviderAdapter::Gemini(GeminiAdapter::new(key)?),
            };
            adapters.push(adapter);
        }
        Ok(Self { adapters })
    }

    /// Look up the adapter for a provider.
    #[must_use]
    pub fn get(&self, provider: ProviderId) -> Option<&ProviderAdapter> {
        self.adapters.iter().find(|a| a.id() == provider)
    }

    /// Providers in priority order, with `preferred` (when configured and
    /// present) moved to the front.
    #[must_use]
    pub fn priority(&self, preferred: Option<ProviderId>) -> Vec<ProviderId> {
        let mut order: Vec<ProviderId> = self.adapters.iter().map(ProviderAdapter::id).collect();
        if let Some(p) = preferred {
            if let Some(pos) = order.iter().position(|&id| id == p) {
                let head = order.remove(pos);
                order.insert(0, head);
            }
        }
        order
    }

    /// Number of configured adapters.
    #[must_use]
    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    /// Whether no adapters are configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }

    /// Iterate adapters in priority order.
    pub fn iter(&self) -> impl Iterator<Item = &ProviderAdapter> {
        self.adapters.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_from_cli_name() {
        assert_eq!(
            ProviderId::from_cli_name("anthropic").unwrap(),
            ProviderId::Anthropic
        );
        assert_eq!(
            ProviderId::from_cli_name("OpenAI").unwrap(),
            ProviderId::OpenAi
        );
        assert!(ProviderId::from_cli_name("mystery").is_err());
    }

    #[test]
    fn retryable_classification() {
        assert!(invocation_retryable(&SwitchyardError::ProviderTimeout {
            provider: "openai".to_string(),
            seconds: 30,
        }));
        assert!(invocation_retryable(&SwitchyardError::ProviderApi {
            provider: "openai".to_string(),
            status_code: Some(503),
            message: "overloaded".to_string(),
        }));
        assert!(invocation_retryable(&SwitchyardError::RateLimited {
            provider: "openai".to_string(),
            retry_after: None,
            message: "slow down".to_string(),
        }));

        assert!(!invocation_retryable(&SwitchyardError::ProviderApi {
            provider: "openai".to_string(),
            status_code: Some(400),
            message: "bad request".to_string(),
        }));
        assert!(!invocation_retryable(&SwitchyardError::ProviderAuth {
            provider: "openai".to_string(),
            message: "invalid key".to_string(),
        }));
    }

    #[test]
    fn registry_priority_respects_preference() {
        let registry = crate::test_utils::registry_of(vec![
            crate::test_utils::ScriptedAdapter::new(ProviderId::Anthropic),
            crate::test_utils::ScriptedAdapter::new(ProviderId::OpenAi),
            crate::test_utils::ScriptedAdapter::new(ProviderId::Gemini),
        ]);

        assert_eq!(
            registry.priority(None),
            vec![ProviderId::Anthropic, ProviderId::OpenAi, ProviderId::Gemini]
        );
        assert_eq!(
            registry.priority(Some(ProviderId::Gemini)),
            vec![ProviderId::Gemini, ProviderId::Anthropic, ProviderId::OpenAi]
        );
        // Preference for an unconfigured provider changes nothing.
        let partial = crate::test_utils::registry_of(vec![
            crate::test_utils::ScriptedAdapter::new(ProviderId::OpenAi),
        ]);
        assert_eq!(
            partial.priority(Some(ProviderId::Anthropic)),
            vec![ProviderId::OpenAi]
        );
    }

    #[test]
    fn adapter_estimate_delegates_to_pricing() {
        use crate::core::request::{OperationClass, OperationRequest};
        use crate::test_utils::{static_pricing, uniform_price_table};

        let adapter = ProviderAdapter::Scripted(crate::test_utils::ScriptedAdapter::new(
            ProviderId::OpenAi,
        ));
        let pricing = static_pricing(uniform_price_table(2.0));
        let request =
            OperationRequest::new("u1", OperationClass::Generate, "hi").with_units(1500);

        let estimate = adapter.estimate_cost(&request, &pricing).unwrap();
        assert!((estimate - 3.0).abs() < 1e-12);
    }

    #[test]
    fn empty_registry_has_no_candidates() {
        let registry = AdapterRegistry::new(vec![]);
        assert!(registry.is_empty());
        assert!(registry.priority(Some(ProviderId::Gemini)).is_empty());
    }
}
