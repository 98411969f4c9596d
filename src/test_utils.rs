//! Test utilities: scripted adapters, approval harnesses, and failure
//! injection for the audit store.
//!
//! Available to unit tests and, via the `test-utils` feature, to the
//! integration test crates.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::audit::store::{AuditStore, Checkpoint, MemoryAuditStore};
use crate::audit::AuditEntry;
use crate::core::approval::{ApprovalDecision, ApprovalTicket};
use crate::core::pricing::{PriceTable, PricingRegistry, PricingSource};
use crate::core::request::{OperationClass, OperationRequest};
use crate::error::{Result, SwitchyardError};
use crate::providers::{AdapterRegistry, InvokeResponse, ProviderAdapter, ProviderId};

// =============================================================================
// Scripted Adapter
// =============================================================================

/// One scripted invocation outcome.
#[derive(Debug, Clone)]
pub enum ScriptedCall {
    /// Return this output.
    Succeed { output: String },
    /// 503-equivalent server error (retryable).
    FailServer,
    /// 400-equivalent client error (terminal).
    FailBadRequest,
    /// Credential rejection (terminal).
    FailAuth,
    /// Time out after the caller's invoke timeout.
    FailTimeout,
    /// Never answer; sleeps far past any test timeout. Pair with
    /// cancellation.
    Hang,
}

/// Adapter that follows a queued script, defaulting to echo on empty.
pub struct ScriptedAdapter {
    id: ProviderId,
    script: Mutex<VecDeque<ScriptedCall>>,
    invocations: Arc<AtomicU32>,
}

impl ScriptedAdapter {
    /// Adapter for `id` with an empty script (every call echoes).
    #[must_use]
    pub fn new(id: ProviderId) -> Self {
        Self {
            id,
            script: Mutex::new(VecDeque::new()),
            invocations: Arc::new(AtomicU32::new(0)),
        }
    }

    /// Adapter primed with a script, consumed front to back.
    #[must_use]
    pub fn with_script(id: ProviderId, script: Vec<ScriptedCall>) -> Self {
        Self {
            id,
            script: Mutex::new(script.into()),
            invocations: Arc::new(AtomicU32::new(0)),
        }
    }

    /// Which provider this adapter impersonates.
    #[must_use]
    pub const fn id(&self) -> ProviderId {
        self.id
    }

    /// How many invocations reached this adapter.
    #[must_use]
    pub fn invocations(&self) -> u32 {
        self.invocations.load(Ordering::SeqCst)
    }

    /// Shared counter handle, usable after the adapter moves into a
    /// registry.
    #[must_use]
    pub fn invocation_counter(&self) -> Arc<AtomicU32> {
        Arc::clone(&self.invocations)
    }

    /// Scripted invoke. Signature mirrors the real adapters.
    pub async fn invoke(
        &self,
        request: &OperationRequest,
        _model: &str,
        timeout: Duration,
    ) -> Result<InvokeResponse> {
        self.invocations.fetch_add(1, Ordering::SeqCst);
        let call = self
            .script
            .lock()
            .expect("script lock poisoned")
            .pop_front()
            .unwrap_or(ScriptedCall::Succeed {
                output: format!("echo:{}", request.input),
            });

        let provider = self.id.cli_name().to_string();
        match call {
            ScriptedCall::Succeed { output } => Ok(InvokeResponse {
                output,
                model: format!("scripted-{provider}"),
            }),
            ScriptedCall::FailServer => Err(SwitchyardError::ProviderApi {
                provider,
                status_code: Some(503),
                message: "scripted server error".to_string(),
            }),
            ScriptedCall::FailBadRequest => Err(SwitchyardError::ProviderApi {
                provider,
                status_code: Some(400),
                message: "scripted client error".to_string(),
            }),
            ScriptedCall::FailAuth => Err(SwitchyardError::ProviderAuth {
                provider,
                message: "scripted auth failure".to_string(),
            }),
            ScriptedCall::FailTimeout => {
                tokio::time::sleep(timeout).await;
                Err(SwitchyardError::ProviderTimeout {
                    provider,
                    seconds: timeout.as_secs(),
                })
            }
            ScriptedCall::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err(SwitchyardError::ProviderTimeout {
                    provider,
                    seconds: 3600,
                })
            }
        }
    }

    /// Scripted probe; always reachable.
    #[must_use]
    pub const fn probe(&self) -> bool {
        true
    }
}

/// Wrap scripted adapters into a priority-ordered registry.
#[must_use]
pub fn registry_of(adapters: Vec<ScriptedAdapter>) -> AdapterRegistry {
    AdapterRegistry::new(
        adapters
            .into_iter()
            .map(ProviderAdapter::Scripted)
            .collect(),
    )
}

// =============================================================================
// Pricing Helpers
// =============================================================================

/// Pricing source serving a fixed table.
pub struct StaticPricing(pub PriceTable);

impl PricingSource for StaticPricing {
    fn load(&self) -> Result<PriceTable> {
        Ok(self.0.clone())
    }
}

/// Table pricing every `(provider, class)` pair at `usd_per_1k`.
#[must_use]
pub fn uniform_price_table(usd_per_1k: f64) -> PriceTable {
    let mut table = PriceTable::new();
    for &provider in ProviderId::ALL {
        for &class in OperationClass::ALL {
            table.set(provider, class, usd_per_1k);
        }
    }
    table
}

/// Registry over a fixed table, never refreshing mid-test.
#[must_use]
pub fn static_pricing(table: PriceTable) -> PricingRegistry {
    PricingRegistry::new(Box::new(StaticPricing(table)), Duration::from_secs(3600))
        .expect("static pricing source cannot fail")
}

// =============================================================================
// Approval Backends
// =============================================================================

/// Backend that approves every ticket.
pub fn approve_all(mut rx: mpsc::Receiver<ApprovalTicket>) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(ticket) = rx.recv().await {
            let _ = ticket.responder.send(ApprovalDecision::Approve);
        }
    })
}

/// Backend that rejects every ticket.
pub fn reject_all(mut rx: mpsc::Receiver<ApprovalTicket>) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(ticket) = rx.recv().await {
            let _ = ticket.responder.send(ApprovalDecision::Reject);
        }
    })
}

/// Backend that receives tickets but never answers them, forcing the wait
/// timeout. Responders are held (not dropped) until the channel closes.
pub fn stall_all(mut rx: mpsc::Receiver<ApprovalTicket>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut parked = Vec::new();
        while let Some(ticket) = rx.recv().await {
            parked.push(ticket.responder);
        }
    })
}

// =============================================================================
// Failing Audit Store
// =============================================================================

/// Audit store whose appends can be switched to fail, for exercising the
/// fail-closed contract.
#[derive(Default)]
pub struct FailingAuditStore {
    inner: MemoryAuditStore,
    failing: AtomicBool,
}

impl FailingAuditStore {
    /// Store that succeeds until told otherwise.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Toggle append failures.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

impl AuditStore for FailingAuditStore {
    fn append(&self, entry: &AuditEntry) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(SwitchyardError::Io(std::io::Error::other(
                "injected audit store failure",
            )));
        }
        self.inner.append(entry)
    }

    fn read_all(&self) -> Result<Vec<AuditEntry>> {
        self.inner.read_all()
    }

    fn checkpoint(&self) -> Result<Option<Checkpoint>> {
        self.inner.checkpoint()
    }
}
