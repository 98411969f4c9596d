//! Configuration file loading and validation.
//!
//! Loads configuration from:
//! - Linux/macOS: `~/.config/switchyard/config.toml`
//! - Windows: `%APPDATA%/switchyard/config.toml`
//!
//! The path can be overridden by the `--config` flag or the
//! `SWITCHYARD_CONFIG` environment variable. Every section is optional;
//! missing values take built-in defaults, and `validate()` runs after any
//! load.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::approval::ApprovalConfig;
use crate::core::health::BreakerConfig;
use crate::core::ledger::LedgerConfig;
use crate::core::request::Criticality;
use crate::error::{Result, SwitchyardError};
use crate::providers::ProviderId;
use crate::storage::paths::AppPaths;

/// Environment variable overriding the config file path.
pub const ENV_CONFIG: &str = "SWITCHYARD_CONFIG";

// =============================================================================
// Sections
// =============================================================================

/// `[budget]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BudgetSection {
    /// Ceiling per identity per UTC day, in USD.
    pub daily_ceiling_usd: f64,
    /// Seconds before an uncommitted reservation is treated as abandoned.
    pub reservation_ttl_secs: u64,
}

impl Default for BudgetSection {
    fn default() -> Self {
        Self {
            daily_ceiling_usd: 25.0,
            reservation_ttl_secs: 120,
        }
    }
}

/// `[approval]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApprovalSection {
    /// Estimated cost at or above which approval is required. Omit to
    /// disable cost gating.
    pub cost_threshold_usd: Option<f64>,
    /// Criticality level at or above which approval is required. Omit to
    /// disable criticality gating.
    pub criticality_threshold: Option<String>,
    /// Seconds to wait for a decision before failing closed.
    pub wait_timeout_secs: u64,
}

impl Default for ApprovalSection {
    fn default() -> Self {
        Self {
            cost_threshold_usd: Some(1.0),
            criticality_threshold: Some("elevated".to_string()),
            wait_timeout_secs: 300,
        }
    }
}

/// `[breaker]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakerSection {
    /// Failures within the window that open the breaker.
    pub failure_threshold: u32,
    /// Sliding window length in seconds.
    pub window_secs: u64,
    /// Base cool-down in seconds before a half-open trial.
    pub cooldown_secs: u64,
    /// Cap on the cool-down doubling exponent.
    pub max_backoff_exponent: u32,
}

impl Default for BreakerSection {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            window_secs: 300,
            cooldown_secs: 60,
            max_backoff_exponent: 5,
        }
    }
}

/// `[routing]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingSection {
    /// Providers in priority order.
    pub provider_priority: Vec<String>,
    /// Per-candidate invocation timeout in seconds.
    pub invoke_timeout_secs: u64,
}

impl Default for RoutingSection {
    fn default() -> Self {
        Self {
            provider_priority: ProviderId::ALL
                .iter()
                .map(|p| p.cli_name().to_string())
                .collect(),
            invoke_timeout_secs: 60,
        }
    }
}

/// `[pricing]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PricingSection {
    /// Refresh interval for the cached price table, in seconds.
    pub cache_ttl_secs: u64,
    /// Optional TOML pricing file layered over built-in rates.
    pub table: Option<PathBuf>,
}

impl Default for PricingSection {
    fn default() -> Self {
        Self {
            cache_ttl_secs: 900,
            table: None,
        }
    }
}

/// `[audit]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditSection {
    /// Bound on one chain append, in milliseconds.
    pub append_timeout_ms: u64,
    /// Override for the chain log file path.
    pub log_file: Option<PathBuf>,
}

impl Default for AuditSection {
    fn default() -> Self {
        Self {
            append_timeout_ms: 2000,
            log_file: None,
        }
    }
}

// =============================================================================
// Root Config
// =============================================================================

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    pub budget: BudgetSection,
    pub approval: ApprovalSection,
    pub breaker: BreakerSection,
    pub routing: RoutingSection,
    pub pricing: PricingSection,
    pub audit: AuditSection,
}

impl RouterConfig {
    /// Load from an explicit path.
    ///
    /// # Errors
    ///
    /// Returns `ConfigParse` for unreadable or invalid TOML, plus anything
    /// `validate()` rejects.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| SwitchyardError::ConfigParse {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        let config: Self = toml::from_str(&content).map_err(|e| SwitchyardError::ConfigParse {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Resolve the effective config: explicit flag path, then
    /// `SWITCHYARD_CONFIG`, then the platform config file, then defaults
    /// when no file exists.
    pub fn resolve(flag_path: Option<&Path>) -> Result<Self> {
        if let Some(path) = flag_path {
            return Self::load(path);
        }
        if let Ok(env_path) = std::env::var(ENV_CONFIG) {
            let trimmed = env_path.trim();
            if !trimmed.is_empty() {
                return Self::load(Path::new(trimmed));
            }
        }
        let default_path = AppPaths::new().config_file();
        if default_path.exists() {
            return Self::load(&default_path);
        }
        let config = Self::default();
        config.validate()?;
        Ok(config)
    }

    /// Validate invariants the type system cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.budget.daily_ceiling_usd <= 0.0 || !self.budget.daily_ceiling_usd.is_finite() {
            return Err(SwitchyardError::ConfigInvalid {
                key: "budget.daily_ceiling_usd".to_string(),
                message: "must be a positive number".to_string(),
            });
        }
        if self.budget.reservation_ttl_secs == 0 {
            return Err(SwitchyardError::ConfigInvalid {
                key: "budget.reservation_ttl_secs".to_string(),
                message: "must be greater than 0".to_string(),
            });
        }
        if let Some(threshold) = self.approval.cost_threshold_usd {
            if threshold <= 0.0 || !threshold.is_finite() {
                return Err(SwitchyardError::ConfigInvalid {
                    key: "approval.cost_threshold_usd".to_string(),
                    message: "must be a positive number".to_string(),
                });
            }
        }
        if let Some(level) = &self.approval.criticality_threshold {
            Criticality::from_cli_name(level)?;
        }
        if self.breaker.failure_threshold == 0 {
            return Err(SwitchyardError::ConfigInvalid {
                key: "breaker.failure_threshold".to_string(),
                message: "must be greater than 0".to_string(),
            });
        }
        if self.breaker.window_secs == 0 || self.breaker.cooldown_secs == 0 {
            return Err(SwitchyardError::ConfigInvalid {
                key: "breaker.window_secs / breaker.cooldown_secs".to_string(),
                message: "must be greater than 0".to_string(),
            });
        }
        if self.routing.provider_priority.is_empty() {
            return Err(SwitchyardError::ConfigInvalid {
                key: "routing.provider_priority".to_string(),
                message: "must list at least one provider".to_string(),
            });
        }
        for name in &self.routing.provider_priority {
            ProviderId::from_cli_name(name)?;
        }
        if self.routing.invoke_timeout_secs == 0 {
            return Err(SwitchyardError::ConfigInvalid {
                key: "routing.invoke_timeout_secs".to_string(),
                message: "must be greater than 0".to_string(),
            });
        }
        if self.audit.append_timeout_ms == 0 {
            return Err(SwitchyardError::ConfigInvalid {
                key: "audit.append_timeout_ms".to_string(),
                message: "must be greater than 0".to_string(),
            });
        }
        Ok(())
    }

    /// Providers in configured priority order.
    pub fn provider_priority(&self) -> Result<Vec<ProviderId>> {
        self.routing
            .provider_priority
            .iter()
            .map(|name| ProviderId::from_cli_name(name))
            .collect()
    }

    /// Ledger tuning from the `[budget]` section.
    #[must_use]
    pub fn ledger_config(&self) -> LedgerConfig {
        LedgerConfig {
            daily_ceiling_usd: self.budget.daily_ceiling_usd,
            reservation_ttl: Duration::from_secs(self.budget.reservation_ttl_secs),
        }
    }

    /// Breaker tuning from the `[breaker]` section.
    #[must_use]
    pub fn breaker_config(&self) -> BreakerConfig {
        BreakerConfig {
            failure_threshold: self.breaker.failure_threshold,
            window: Duration::from_secs(self.breaker.window_secs),
            cooldown: Duration::from_secs(self.breaker.cooldown_secs),
            max_backoff_exponent: self.breaker.max_backoff_exponent,
        }
    }

    /// Approval tuning from the `[approval]` section.
    ///
    /// # Errors
    ///
    /// Returns `ConfigInvalid` for an unknown criticality level (also caught
    /// by `validate()`).
    pub fn approval_config(&self) -> Result<ApprovalConfig> {
        let criticality_threshold = self
            .approval
            .criticality_threshold
            .as_deref()
            .map(Criticality::from_cli_name)
            .transpose()?;
        Ok(ApprovalConfig {
            cost_threshold_usd: self.approval.cost_threshold_usd,
            criticality_threshold,
            wait_timeout: Duration::from_secs(self.approval.wait_timeout_secs),
        })
    }

    /// Per-candidate invocation timeout.
    #[must_use]
    pub const fn invoke_timeout(&self) -> Duration {
        Duration::from_secs(self.routing.invoke_timeout_secs)
    }

    /// Audit append bound.
    #[must_use]
    pub const fn append_timeout(&self) -> Duration {
        Duration::from_millis(self.audit.append_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        let config = RouterConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.provider_priority().unwrap(), ProviderId::ALL.to_vec());
    }

    #[test]
    fn partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[budget]
daily_ceiling_usd = 10.0

[routing]
provider_priority = ["openai", "anthropic"]
"#,
        )
        .unwrap();

        let config = RouterConfig::load(&path).unwrap();
        assert!((config.budget.daily_ceiling_usd - 10.0).abs() < 1e-9);
        assert_eq!(config.budget.reservation_ttl_secs, 120);
        assert_eq!(
            config.provider_priority().unwrap(),
            vec![ProviderId::OpenAi, ProviderId::Anthropic]
        );
        assert_eq!(config.breaker.failure_threshold, 3);
    }

    #[test]
    fn rejects_zero_ceiling() {
        let config = RouterConfig {
            budget: BudgetSection {
                daily_ceiling_usd: 0.0,
                ..BudgetSection::default()
            },
            ..RouterConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(SwitchyardError::ConfigInvalid { .. })
        ));
    }

    #[test]
    fn rejects_unknown_priority_provider() {
        let config = RouterConfig {
            routing: RoutingSection {
                provider_priority: vec!["anthropic".to_string(), "mystery".to_string()],
                ..RoutingSection::default()
            },
            ..RouterConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(SwitchyardError::UnknownProvider(_))
        ));
    }

    #[test]
    fn rejects_empty_priority() {
        let config = RouterConfig {
            routing: RoutingSection {
                provider_priority: vec![],
                ..RoutingSection::default()
            },
            ..RouterConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_unknown_criticality() {
        let config = RouterConfig {
            approval: ApprovalSection {
                criticality_threshold: Some("apocalyptic".to_string()),
                ..ApprovalSection::default()
            },
            ..RouterConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn malformed_toml_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[budget\ndaily_ceiling_usd = ").unwrap();
        assert!(matches!(
            RouterConfig::load(&path),
            Err(SwitchyardError::ConfigParse { .. })
        ));
    }

    #[test]
    fn approval_config_parses_threshold_level() {
        let config = RouterConfig::default();
        let approval = config.approval_config().unwrap();
        assert_eq!(approval.criticality_threshold, Some(Criticality::Elevated));
        assert_eq!(approval.wait_timeout, Duration::from_secs(300));
    }
}
