//! Shared harness for integration tests: assembles a router from scripted
//! adapters with tight timings suitable for test runs.

use std::sync::Arc;
use std::time::Duration;

use switchyard::audit::store::AuditStore;
use switchyard::audit::AuditLog;
use switchyard::core::approval::{ApprovalConfig, ApprovalGate};
use switchyard::core::health::{BreakerConfig, HealthMonitor};
use switchyard::core::ledger::{BudgetLedger, LedgerConfig};
use switchyard::core::request::Criticality;
use switchyard::core::router::{Router, RouterParts};
use switchyard::test_utils::{
    ScriptedAdapter, approve_all, reject_all, registry_of, stall_all, static_pricing,
    uniform_price_table,
};

/// How the harness answers approval tickets.
#[allow(dead_code)]
pub enum ApprovalMode {
    /// No thresholds configured; the gate is never consulted.
    Off,
    /// Thresholds active; every ticket approved.
    ApproveAll,
    /// Thresholds active; every ticket rejected.
    RejectAll,
    /// Thresholds active; tickets received but never answered.
    Stall,
    /// Thresholds active; no backend attached at all.
    Disconnected,
}

/// Harness knobs. `Default` gives a permissive router: high ceiling, $1 per
/// 1K units everywhere, approval off, a 3-failure breaker with fast
/// cool-down, and a short invoke timeout.
pub struct Options {
    pub ceiling_usd: f64,
    pub price_per_1k: f64,
    pub approval: ApprovalMode,
    pub cost_threshold_usd: Option<f64>,
    pub criticality_threshold: Option<Criticality>,
    pub approval_wait: Duration,
    pub breaker: BreakerConfig,
    pub invoke_timeout: Duration,
    pub reservation_ttl: Duration,
    pub audit_store: Option<Arc<dyn AuditStore>>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            ceiling_usd: 1000.0,
            price_per_1k: 1.0,
            approval: ApprovalMode::Off,
            cost_threshold_usd: Some(1.0),
            criticality_threshold: Some(Criticality::Elevated),
            approval_wait: Duration::from_millis(200),
            breaker: BreakerConfig {
                failure_threshold: 3,
                window: Duration::from_secs(60),
                cooldown: Duration::from_millis(50),
                max_backoff_exponent: 2,
            },
            invoke_timeout: Duration::from_millis(100),
            reservation_ttl: Duration::from_secs(60),
            audit_store: None,
        }
    }
}

/// Build a router over scripted adapters.
#[allow(dead_code)]
pub fn router_with(adapters: Vec<ScriptedAdapter>, options: Options) -> Router {
    let approval_config = match options.approval {
        ApprovalMode::Off => ApprovalConfig {
            cost_threshold_usd: None,
            criticality_threshold: None,
            wait_timeout: options.approval_wait,
        },
        _ => ApprovalConfig {
            cost_threshold_usd: options.cost_threshold_usd,
            criticality_threshold: options.criticality_threshold,
            wait_timeout: options.approval_wait,
        },
    };

    let approval = match options.approval {
        ApprovalMode::Off | ApprovalMode::Disconnected => {
            ApprovalGate::disconnected(approval_config.wait_timeout)
        }
        ApprovalMode::ApproveAll => {
            let (gate, rx) = ApprovalGate::new(approval_config.wait_timeout);
            approve_all(rx);
            gate
        }
        ApprovalMode::RejectAll => {
            let (gate, rx) = ApprovalGate::new(approval_config.wait_timeout);
            reject_all(rx);
            gate
        }
        ApprovalMode::Stall => {
            let (gate, rx) = ApprovalGate::new(approval_config.wait_timeout);
            stall_all(rx);
            gate
        }
    };

    let audit = match options.audit_store {
        Some(store) => {
            AuditLog::open(store, Duration::from_millis(500)).expect("audit store opens")
        }
        None => AuditLog::in_memory(),
    };

    Router::new(RouterParts {
        adapters: registry_of(adapters),
        pricing: Arc::new(static_pricing(uniform_price_table(options.price_per_1k))),
        health: Arc::new(HealthMonitor::new(options.breaker.clone())),
        ledger: Arc::new(BudgetLedger::new(LedgerConfig {
            daily_ceiling_usd: options.ceiling_usd,
            reservation_ttl: options.reservation_ttl,
        })),
        approval: Arc::new(approval),
        audit: Arc::new(audit),
        approval_config,
        invoke_timeout: options.invoke_timeout,
    })
}
