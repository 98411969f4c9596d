//! Pricing registry.
//!
//! Maps `(provider, operation class)` to a unit cost and carries the default
//! model per provider. The registry fronts a [`PricingSource`] and refreshes
//! its table on a cache interval; a refresh failure keeps serving the stale
//! table rather than failing requests.
//!
//! Cost estimation is intentionally simple: `unit_cost_per_1k * units /
//! 1000`, with a one-unit minimum. The declared size hint on the request is
//! the unit count.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde::Deserialize;

use crate::core::request::OperationClass;
use crate::error::{Result, SwitchyardError};
use crate::providers::ProviderId;

/// Default refresh interval for the cached table.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(900);

// =============================================================================
// Price Table
// =============================================================================

/// A snapshot of unit costs, USD per 1,000 units.
#[derive(Debug, Clone, Default)]
pub struct PriceTable {
    unit_costs: HashMap<(ProviderId, OperationClass), f64>,
    models: HashMap<ProviderId, String>,
}

impl PriceTable {
    /// Empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the unit cost for a provider and class.
    pub fn set(&mut self, provider: ProviderId, class: OperationClass, usd_per_1k: f64) {
        self.unit_costs.insert((provider, class), usd_per_1k);
    }

    /// Override the model used for a provider.
    pub fn set_model(&mut self, provider: ProviderId, model: impl Into<String>) {
        self.models.insert(provider, model.into());
    }

    /// Unit cost for a provider and class, if priced.
    #[must_use]
    pub fn unit_cost(&self, provider: ProviderId, class: OperationClass) -> Option<f64> {
        self.unit_costs.get(&(provider, class)).copied()
    }

    /// Model to request from a provider.
    #[must_use]
    pub fn model_for(&self, provider: ProviderId) -> String {
        self.models
            .get(&provider)
            .cloned()
            .unwrap_or_else(|| provider.default_model().to_string())
    }

    /// Providers that carry a price for `class`, in no particular order.
    #[must_use]
    pub fn providers_for(&self, class: OperationClass) -> Vec<ProviderId> {
        ProviderId::ALL
            .iter()
            .copied()
            .filter(|p| self.unit_costs.contains_key(&(*p, class)))
            .collect()
    }

    /// Built-in rates.
    ///
    /// Blended input/output token rates per 1K units, rounded from published
    /// provider pricing. Good enough for reservation estimates; exact
    /// metering is the provider's bill.
    #[must_use]
    pub fn builtin() -> Self {
        let mut table = Self::new();

        table.set(ProviderId::Anthropic, OperationClass::Generate, 0.009);
        table.set(ProviderId::Anthropic, OperationClass::Moderate, 0.003);

        table.set(ProviderId::OpenAi, OperationClass::Generate, 0.007);
        table.set(ProviderId::OpenAi, OperationClass::Embed, 0.000_13);
        table.set(ProviderId::OpenAi, OperationClass::Transcribe, 0.006);
        table.set(ProviderId::OpenAi, OperationClass::Moderate, 0.002);

        table.set(ProviderId::Gemini, OperationClass::Generate, 0.000_4);
        table.set(ProviderId::Gemini, OperationClass::Embed, 0.000_07);

        table
    }
}

// =============================================================================
// Pricing Sources
// =============================================================================

/// Where price tables come from.
pub trait PricingSource: Send + Sync {
    /// Load a fresh table.
    fn load(&self) -> Result<PriceTable>;
}

/// The compiled-in table.
pub struct BuiltinPricing;

impl PricingSource for BuiltinPricing {
    fn load(&self) -> Result<PriceTable> {
        Ok(PriceTable::builtin())
    }
}

/// A TOML pricing file layered over the built-in table.
///
/// ```toml
/// [anthropic]
/// model = "claude-sonnet-4-20250514"
/// generate = 0.009
/// moderate = 0.003
/// ```
pub struct FilePricing {
    path: PathBuf,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ProviderRates {
    model: Option<String>,
    generate: Option<f64>,
    embed: Option<f64>,
    transcribe: Option<f64>,
    moderate: Option<f64>,
}

impl FilePricing {
    /// Create a source reading from `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn apply(table: &mut PriceTable, provider: ProviderId, rates: &ProviderRates) {
        if let Some(model) = &rates.model {
            table.set_model(provider, model.clone());
        }
        let pairs = [
            (OperationClass::Generate, rates.generate),
            (OperationClass::Embed, rates.embed),
            (OperationClass::Transcribe, rates.transcribe),
            (OperationClass::Moderate, rates.moderate),
        ];
        for (class, rate) in pairs {
            if let Some(usd) = rate {
                table.set(provider, class, usd);
            }
        }
    }
}

impl PricingSource for FilePricing {
    fn load(&self) -> Result<PriceTable> {
        let content = std::fs::read_to_string(&self.path)?;
        let parsed: HashMap<String, ProviderRates> =
            toml::from_str(&content).map_err(|e| SwitchyardError::ConfigParse {
                path: self.path.display().to_string(),
                message: e.to_string(),
            })?;

        let mut table = PriceTable::builtin();
        for (name, rates) in &parsed {
            let provider = ProviderId::from_cli_name(name)?;
            Self::apply(&mut table, provider, rates);
        }
        Ok(table)
    }
}

// =============================================================================
// Pricing Registry
// =============================================================================

struct Cached {
    table: PriceTable,
    fetched_at: Instant,
}

/// TTL-cached pricing front.
pub struct PricingRegistry {
    source: Box<dyn PricingSource>,
    ttl: Duration,
    cached: Mutex<Cached>,
}

impl PricingRegistry {
    /// Create a registry over `source`, loading the initial table.
    pub fn new(source: Box<dyn PricingSource>, ttl: Duration) -> Result<Self> {
        let table = source.load()?;
        Ok(Self {
            source,
            ttl,
            cached: Mutex::new(Cached {
                table,
                fetched_at: Instant::now(),
            }),
        })
    }

    /// Registry over the compiled-in table with the default TTL.
    #[must_use]
    pub fn builtin() -> Self {
        Self::new(Box::new(BuiltinPricing), DEFAULT_CACHE_TTL)
            .expect("builtin pricing source cannot fail")
    }

    /// Registry from configuration: the pricing file if configured, the
    /// built-in table otherwise.
    pub fn from_config(table_path: Option<&Path>, ttl: Duration) -> Result<Self> {
        match table_path {
            Some(path) => Self::new(Box::new(FilePricing::new(path)), ttl),
            None => Self::new(Box::new(BuiltinPricing), ttl),
        }
    }

    fn with_table<R>(&self, f: impl FnOnce(&PriceTable) -> R) -> R {
        let mut cached = self.cached.lock().expect("pricing lock poisoned");
        if cached.fetched_at.elapsed() >= self.ttl {
            match self.source.load() {
                Ok(table) => {
                    cached.table = table;
                    cached.fetched_at = Instant::now();
                }
                Err(e) => {
                    // Keep serving the stale table.
                    tracing::warn!(error = %e, "pricing refresh failed, serving stale table");
                    cached.fetched_at = Instant::now();
                }
            }
        }
        f(&cached.table)
    }

    /// Estimate the cost of `units` units of `class` work on `provider`.
    ///
    /// Returns `None` when the pair is not priced.
    #[must_use]
    pub fn estimate(&self, provider: ProviderId, class: OperationClass, units: u64) -> Option<f64> {
        self.with_table(|table| {
            table
                .unit_cost(provider, class)
                .map(|per_1k| per_1k * (units.max(1) as f64) / 1000.0)
        })
    }

    /// Model to request from `provider`.
    #[must_use]
    pub fn model_for(&self, provider: ProviderId) -> String {
        self.with_table(|table| table.model_for(provider))
    }

    /// Providers that can serve `class`, in no particular order.
    #[must_use]
    pub fn providers_for(&self, class: OperationClass) -> Vec<ProviderId> {
        self.with_table(|table| table.providers_for(class))
    }
}
