//! The operation router.
//!
//! `route` is the single dispatch point: validate, build the candidate list,
//! estimate cost, reserve budget, gate on approval, write the pending audit
//! entry, then invoke with failover. The pending append is fail-closed: if
//! it cannot be confirmed, the provider is never invoked and the reservation
//! is released. Side effects are observable only through the audit log and
//! the budget ledger; the router itself holds no persistent state beyond the
//! in-flight table that supports cancellation.
//!
//! Failover policy: candidates are attempted at most once each, in priority
//! order. Retryable failures (timeout, connection, 5xx-equivalent, rate
//! limit) move on to the next candidate after releasing the failed
//! candidate's reservation; terminal failures stop the loop. The pending
//! entry is written once per operation, before the first invocation, and is
//! always followed by exactly one terminal entry.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::sync::Notify;

use crate::audit::{AuditEventKind, AuditLog};
use crate::core::approval::{ApprovalConfig, ApprovalGate, ApprovalOutcome};
use crate::core::health::{Admission, HealthMonitor};
use crate::core::ledger::BudgetLedger;
use crate::core::pricing::PricingRegistry;
use crate::core::request::{OperationId, OperationRequest, OperationResult};
use crate::error::{Result, SwitchyardError};
use crate::providers::{AdapterRegistry, ProviderId, invocation_retryable};

/// Cancellation token shared between `route` and `cancel`.
struct CancelToken {
    cancelled: AtomicBool,
    notify: Notify,
}

impl CancelToken {
    fn new() -> Self {
        Self {
            cancelled: AtomicBool::new(false),
            notify: Notify::new(),
        }
    }

    fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    async fn wait(&self) {
        loop {
            let notified = self.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

/// Everything a router is assembled from.
pub struct RouterParts {
    /// Adapters in priority order.
    pub adapters: AdapterRegistry,
    /// Pricing registry.
    pub pricing: Arc<PricingRegistry>,
    /// Health monitor.
    pub health: Arc<HealthMonitor>,
    /// Budget ledger.
    pub ledger: Arc<BudgetLedger>,
    /// Approval gate.
    pub approval: Arc<ApprovalGate>,
    /// Audit log.
    pub audit: Arc<AuditLog>,
    /// Approval thresholds.
    pub approval_config: ApprovalConfig,
    /// Per-candidate invocation timeout.
    pub invoke_timeout: Duration,
}

/// The operation router.
pub struct Router {
    adapters: AdapterRegistry,
    pricing: Arc<PricingRegistry>,
    health: Arc<HealthMonitor>,
    ledger: Arc<BudgetLedger>,
    approval: Arc<ApprovalGate>,
    audit: Arc<AuditLog>,
    approval_config: ApprovalConfig,
    invoke_timeout: Duration,
    in_flight: Mutex<HashMap<OperationId, Arc<CancelToken>>>,
}

impl Router {
    /// Assemble a router.
    #[must_use]
    pub fn new(parts: RouterParts) -> Self {
        Self {
            adapters: parts.adapters,
            pricing: parts.pricing,
            health: parts.health,
            ledger: parts.ledger,
            approval: parts.approval,
            audit: parts.audit,
            approval_config: parts.approval_config,
            invoke_timeout: parts.invoke_timeout,
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    /// Budget ledger shared with this router.
    #[must_use]
    pub fn ledger(&self) -> &Arc<BudgetLedger> {
        &self.ledger
    }

    /// Health monitor shared with this router.
    #[must_use]
    pub fn health(&self) -> &Arc<HealthMonitor> {
        &self.health
    }

    /// Audit log shared with this router.
    #[must_use]
    pub fn audit(&self) -> &Arc<AuditLog> {
        &self.audit
    }

    /// Cancel an in-flight operation. Returns whether one was found.
    pub fn cancel(&self, id: &OperationId) -> bool {
        let in_flight = self.in_flight.lock().expect("in-flight lock poisoned");
        if let Some(token) = in_flight.get(id) {
            token.cancel();
            true
        } else {
            false
        }
    }

    /// Route one operation end to end.
    pub async fn route(&self, request: OperationRequest) -> Result<OperationResult> {
        request.validate()?;

        let token = Arc::new(CancelToken::new());
        self.in_flight
            .lock()
            .expect("in-flight lock poisoned")
            .insert(request.id.clone(), Arc::clone(&token));

        let result = self.route_inner(&request, &token).await;

        self.in_flight
            .lock()
            .expect("in-flight lock poisoned")
            .remove(&request.id);
        result
    }

    async fn route_inner(
        &self,
        request: &OperationRequest,
        cancel: &CancelToken,
    ) -> Result<OperationResult> {
        let op = request.id.as_str();
        let digest = request.payload_digest();

        self.ledger.sweep_abandoned();

        // Candidate providers: configured priority, restricted to providers
        // priced for this class. Breaker admission happens per candidate so
        // a breaker that half-opens mid-loop still gets its trial.
        let priced = self.pricing.providers_for(request.class);
        let candidates: Vec<ProviderId> = self
            .adapters
            .priority(request.preferred_provider)
            .into_iter()
            .filter(|p| priced.contains(p))
            .collect();

        let mut pending_written = false;
        let mut approved_amount: Option<f64> = None;
        let mut attempts: u32 = 0;
        let mut last_error: Option<SwitchyardError> = None;
        let mut skipped: Vec<String> = Vec::new();

        for provider in candidates {
            if cancel.is_cancelled() {
                return self.finish_cancelled(op, &digest, pending_written).await;
            }

            let admission = self.health.admit(provider);
            if admission == Admission::Skip {
                tracing::debug!(operation = op, provider = %provider, "skipped: breaker open");
                skipped.push(format!("{provider}: breaker open"));
                continue;
            }
            let trial = admission == Admission::Trial;

            let Some(estimated) =
                self.pricing
                    .estimate(provider, request.class, request.estimated_units)
            else {
                if trial {
                    self.health.release_trial(provider);
                }
                skipped.push(format!("{provider}: no price for {}", request.class));
                continue;
            };

            let reservation = match self.ledger.reserve(&request.identity, op, estimated) {
                Ok(id) => id,
                Err(e) => {
                    if trial {
                        self.health.release_trial(provider);
                    }
                    if matches!(e, SwitchyardError::BudgetExceeded { .. }) {
                        tracing::info!(operation = op, identity = %request.identity, "budget rejected");
                        self.append_terminal(AuditEventKind::BudgetRejected, op, &digest)
                            .await;
                    }
                    return Err(e);
                }
            };

            // Approval, when the threshold is crossed. A grant covers later
            // failover candidates up to the approved amount; a costlier
            // candidate asks again.
            if let Some(reason) = self
                .approval_config
                .required_reason(estimated, request.criticality)
            {
                let covered = approved_amount.is_some_and(|granted| estimated <= granted + 1e-9);
                if !covered {
                    let outcome = tokio::select! {
                        () = cancel.wait() => {
                            self.ledger.release(reservation);
                            if trial {
                                self.health.release_trial(provider);
                            }
                            return self.finish_cancelled(op, &digest, pending_written).await;
                        }
                        outcome = self.approval.request(request.id.clone(), reason) => outcome,
                    };
                    if !outcome.is_approved() {
                        self.ledger.release(reservation);
                        if trial {
                            self.health.release_trial(provider);
                        }
                        self.append_terminal(AuditEventKind::ApprovalRejected, op, &digest)
                            .await;
                        let reason = if outcome == ApprovalOutcome::TimedOut {
                            "approval wait timed out"
                        } else {
                            "rejected by approver"
                        };
                        return Err(SwitchyardError::ApprovalDenied {
                            operation_id: op.to_string(),
                            reason: reason.to_string(),
                        });
                    }
                    approved_amount = Some(estimated);
                }
            }

            // Fail-closed: the pending record must be durable before any
            // side effect. Written once per operation.
            if !pending_written {
                if let Err(e) = self
                    .audit
                    .append(AuditEventKind::Pending, op, &digest)
                    .await
                {
                    self.ledger.release(reservation);
                    if trial {
                        self.health.release_trial(provider);
                    }
                    tracing::error!(operation = op, error = %e, "pending append failed, refusing to invoke");
                    return Err(e);
                }
                pending_written = true;
            }

            let Some(adapter) = self.adapters.get(provider) else {
                // Candidate list was derived from the registry; a miss here
                // means the registry changed under us. Treat as skip.
                self.ledger.release(reservation);
                if trial {
                    self.health.release_trial(provider);
                }
                skipped.push(format!("{provider}: adapter missing"));
                continue;
            };

            attempts += 1;
            let model = self.pricing.model_for(provider);
            let invoke_started = Instant::now();
            tracing::info!(
                operation = op,
                provider = %provider,
                model = %model,
                estimated_usd = estimated,
                attempt = attempts,
                "invoking provider"
            );

            let outcome = tokio::select! {
                () = cancel.wait() => {
                    self.ledger.release(reservation);
                    if trial {
                        self.health.release_trial(provider);
                    }
                    return self.finish_cancelled(op, &digest, pending_written).await;
                }
                result = adapter.invoke(request, &model, self.invoke_timeout) => result,
            };

            match outcome {
                Ok(response) => {
                    let committed = match self.ledger.commit(reservation) {
                        Ok(amount) => amount,
                        Err(e) => {
                            // Reservation aged out during a slow invoke; the
                            // spend still happened.
                            tracing::error!(operation = op, error = %e, "commit failed after success");
                            estimated
                        }
                    };
                    self.health.record_success(provider);
                    self.append_terminal(AuditEventKind::Completed, op, &digest)
                        .await;
                    tracing::info!(
                        operation = op,
                        provider = %provider,
                        committed_usd = committed,
                        "operation completed"
                    );
                    return Ok(OperationResult {
                        operation_id: request.id.clone(),
                        provider,
                        model: response.model,
                        output: response.output,
                        committed_usd: committed,
                        duration_ms: invoke_started.elapsed().as_millis() as u64,
                        attempts,
                    });
                }
                Err(e) => {
                    self.health.record_failure(provider);
                    self.ledger.release(reservation);
                    let retryable = invocation_retryable(&e);
                    tracing::warn!(
                        operation = op,
                        provider = %provider,
                        error = %e,
                        retryable,
                        "invocation failed"
                    );
                    last_error = Some(e);
                    if !retryable {
                        break;
                    }
                }
            }
        }

        // Exhausted: either every candidate failed or none was eligible.
        self.append_terminal(AuditEventKind::Failed, op, &digest).await;

        if attempts == 1 {
            if let Some(SwitchyardError::ProviderTimeout { provider, seconds }) = &last_error {
                return Err(SwitchyardError::ProviderTimeout {
                    provider: provider.clone(),
                    seconds: *seconds,
                });
            }
        }

        let mut detail = match &last_error {
            Some(e) => format!("last failure: {e}"),
            None => "no eligible candidates".to_string(),
        };
        if !skipped.is_empty() {
            detail.push_str(&format!(" (skipped: {})", skipped.join(", ")));
        }
        Err(SwitchyardError::AllProvidersExhausted {
            operation_id: op.to_string(),
            detail,
        })
    }

    async fn finish_cancelled(
        &self,
        op: &str,
        digest: &str,
        pending_written: bool,
    ) -> Result<OperationResult> {
        // A pending operation may not silently vanish from the record.
        if pending_written {
            self.append_terminal(AuditEventKind::Failed, op, digest).await;
        }
        tracing::info!(operation = op, "operation cancelled");
        Err(SwitchyardError::Cancelled {
            operation_id: op.to_string(),
        })
    }

    /// Append a terminal entry, logging (not propagating) failures.
    ///
    /// The fail-closed contract applies to the pending entry only: by the
    /// time a terminal entry is written the decision it records has already
    /// happened, so an append failure here is an observability loss, not a
    /// reason to change the outcome.
    async fn append_terminal(&self, kind: AuditEventKind, op: &str, digest: &str) {
        if let Err(e) = self.audit.append(kind, op, digest).await {
            tracing::error!(operation = op, kind = %kind, error = %e, "terminal audit append failed");
        }
    }
}
