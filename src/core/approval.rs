//! Human-in-the-loop approval gate.
//!
//! Operations whose estimated cost or criticality crosses the configured
//! threshold block on a decision before any provider is invoked. The gate
//! forwards tickets over an mpsc channel to whatever backend answers them
//! (a terminal prompt in the CLI, a scripted responder in tests) and waits
//! on a oneshot reply with a bounded timeout.
//!
//! The gate fails closed: a dropped responder, a closed channel, and an
//! elapsed timeout are all terminal rejections, never an implicit approval.
//! A terminal outcome is immutable; late replies are discarded.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};

use crate::core::request::{Criticality, OperationId};

/// How many terminal records the gate retains for status output.
const HISTORY_CAPACITY: usize = 256;

/// Approval gating thresholds.
#[derive(Debug, Clone)]
pub struct ApprovalConfig {
    /// Estimated cost at or above which approval is required.
    pub cost_threshold_usd: Option<f64>,
    /// Criticality at or above which approval is required.
    pub criticality_threshold: Option<Criticality>,
    /// How long to wait for a decision.
    pub wait_timeout: Duration,
}

impl Default for ApprovalConfig {
    fn default() -> Self {
        Self {
            cost_threshold_usd: Some(1.0),
            criticality_threshold: Some(Criticality::Elevated),
            wait_timeout: Duration::from_secs(300),
        }
    }
}

impl ApprovalConfig {
    /// Why `estimated_usd` / `criticality` would need approval, if at all.
    #[must_use]
    pub fn required_reason(
        &self,
        estimated_usd: f64,
        criticality: Criticality,
    ) -> Option<ApprovalReason> {
        if let Some(threshold) = self.cost_threshold_usd {
            if estimated_usd >= threshold {
                return Some(ApprovalReason::CostThreshold {
                    estimated_usd,
                    threshold_usd: threshold,
                });
            }
        }
        if let Some(threshold) = self.criticality_threshold {
            if criticality >= threshold {
                return Some(ApprovalReason::Criticality { level: criticality });
            }
        }
        None
    }
}

/// Why an operation crossed the approval threshold.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum ApprovalReason {
    /// Estimated cost at or above the configured threshold.
    CostThreshold {
        estimated_usd: f64,
        threshold_usd: f64,
    },
    /// Criticality at or above the configured threshold.
    Criticality { level: Criticality },
}

impl std::fmt::Display for ApprovalReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CostThreshold {
                estimated_usd,
                threshold_usd,
            } => write!(
                f,
                "estimated ${estimated_usd:.4} meets threshold ${threshold_usd:.2}"
            ),
            Self::Criticality { level } => write!(f, "criticality {level}"),
        }
    }
}

/// Terminal (or pending) state of one approval request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalOutcome {
    /// Awaiting a decision.
    Pending,
    /// Explicitly approved.
    Approved,
    /// Explicitly rejected.
    Rejected,
    /// No decision within the wait timeout; treated as rejection.
    TimedOut,
}

impl ApprovalOutcome {
    /// Whether this outcome permits the operation to proceed.
    #[must_use]
    pub const fn is_approved(self) -> bool {
        matches!(self, Self::Approved)
    }
}

/// One approval request and its outcome.
#[derive(Debug, Clone, Serialize)]
pub struct ApprovalRecord {
    /// Operation awaiting approval.
    pub operation_id: OperationId,
    /// When the gate was asked.
    pub requested_at: DateTime<Utc>,
    /// Why the threshold was crossed.
    pub reason: ApprovalReason,
    /// Outcome; terminal values are immutable once set.
    pub outcome: ApprovalOutcome,
}

/// The decision a backend returns for a ticket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalDecision {
    Approve,
    Reject,
}

/// A pending approval delivered to the decision backend.
#[derive(Debug)]
pub struct ApprovalTicket {
    /// The pending record (outcome is `Pending`).
    pub record: ApprovalRecord,
    /// Channel for the decision. Dropping it rejects the operation.
    pub responder: oneshot::Sender<ApprovalDecision>,
}

/// The approval gate.
pub struct ApprovalGate {
    tx: mpsc::Sender<ApprovalTicket>,
    wait_timeout: Duration,
    history: Mutex<VecDeque<ApprovalRecord>>,
}

impl ApprovalGate {
    /// Create a gate and the ticket stream its backend consumes.
    #[must_use]
    pub fn new(wait_timeout: Duration) -> (Self, mpsc::Receiver<ApprovalTicket>) {
        let (tx, rx) = mpsc::channel(16);
        (
            Self {
                tx,
                wait_timeout,
                history: Mutex::new(VecDeque::new()),
            },
            rx,
        )
    }

    /// A gate with no backend attached; every request fails closed.
    #[must_use]
    pub fn disconnected(wait_timeout: Duration) -> Self {
        let (gate, rx) = Self::new(wait_timeout);
        drop(rx);
        gate
    }

    fn record(&self, record: ApprovalRecord) {
        let mut history = self.history.lock().expect("approval history lock poisoned");
        if history.len() >= HISTORY_CAPACITY {
            history.pop_front();
        }
        history.push_back(record);
    }

    /// Ask for approval and wait for a terminal outcome.
    ///
    /// Never returns `Pending`. An unreachable backend or an elapsed wait
    /// timeout both come back as rejections.
    pub async fn request(
        &self,
        operation_id: OperationId,
        reason: ApprovalReason,
    ) -> ApprovalOutcome {
        let mut record = ApprovalRecord {
            operation_id: operation_id.clone(),
            requested_at: Utc::now(),
            reason,
            outcome: ApprovalOutcome::Pending,
        };

        let (responder, decision_rx) = oneshot::channel();
        let ticket = ApprovalTicket {
            record: record.clone(),
            responder,
        };

        if self.tx.send(ticket).await.is_err() {
            // Backend gone: fail closed.
            tracing::warn!(operation = %operation_id, "approval backend unreachable, rejecting");
            record.outcome = ApprovalOutcome::Rejected;
            self.record(record);
            return ApprovalOutcome::Rejected;
        }

        let outcome = match tokio::time::timeout(self.wait_timeout, decision_rx).await {
            Ok(Ok(ApprovalDecision::Approve)) => ApprovalOutcome::Approved,
            Ok(Ok(ApprovalDecision::Reject)) => ApprovalOutcome::Rejected,
            // Responder dropped without answering: fail closed.
            Ok(Err(_)) => ApprovalOutcome::Rejected,
            Err(_) => ApprovalOutcome::TimedOut,
        };

        tracing::info!(operation = %operation_id, ?outcome, "approval settled");
        record.outcome = outcome;
        self.record(record);
        outcome
    }

    /// Recent terminal records, oldest first.
    #[must_use]
    pub fn recent(&self) -> Vec<ApprovalRecord> {
        self.history
            .lock()
            .expect("approval history lock poisoned")
            .iter()
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn op() -> OperationId {
        OperationId::generate()
    }

    const REASON: ApprovalReason = ApprovalReason::Criticality {
        level: Criticality::Critical,
    };

    #[test]
    fn threshold_reasons() {
        let config = ApprovalConfig {
            cost_threshold_usd: Some(1.0),
            criticality_threshold: Some(Criticality::Elevated),
            wait_timeout: Duration::from_secs(1),
        };

        assert!(config.required_reason(0.5, Criticality::Routine).is_none());
        assert!(matches!(
            config.required_reason(2.0, Criticality::Routine),
            Some(ApprovalReason::CostThreshold { .. })
        ));
        assert!(matches!(
            config.required_reason(0.1, Criticality::Critical),
            Some(ApprovalReason::Criticality { .. })
        ));
    }

    #[test]
    fn thresholds_can_be_disabled() {
        let config = ApprovalConfig {
            cost_threshold_usd: None,
            criticality_threshold: None,
            wait_timeout: Duration::from_secs(1),
        };
        assert!(config.required_reason(1e9, Criticality::Critical).is_none());
    }

    #[tokio::test]
    async fn approval_flows_through_backend() {
        let (gate, mut rx) = ApprovalGate::new(Duration::from_secs(5));

        let backend = tokio::spawn(async move {
            let ticket = rx.recv().await.unwrap();
            assert_eq!(ticket.record.outcome, ApprovalOutcome::Pending);
            ticket.responder.send(ApprovalDecision::Approve).unwrap();
        });

        let outcome = gate.request(op(), REASON).await;
        assert_eq!(outcome, ApprovalOutcome::Approved);
        backend.await.unwrap();

        let history = gate.recent();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].outcome, ApprovalOutcome::Approved);
    }

    #[tokio::test]
    async fn rejection_flows_through_backend() {
        let (gate, mut rx) = ApprovalGate::new(Duration::from_secs(5));

        tokio::spawn(async move {
            let ticket = rx.recv().await.unwrap();
            ticket.responder.send(ApprovalDecision::Reject).unwrap();
        });

        assert_eq!(gate.request(op(), REASON).await, ApprovalOutcome::Rejected);
    }

    #[tokio::test]
    async fn timeout_is_a_rejection() {
        let (gate, mut rx) = ApprovalGate::new(Duration::from_millis(30));

        // Backend receives the ticket but never answers.
        let backend = tokio::spawn(async move {
            let _ticket = rx.recv().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
        });

        let outcome = gate.request(op(), REASON).await;
        assert_eq!(outcome, ApprovalOutcome::TimedOut);
        assert!(!outcome.is_approved());
        backend.abort();
    }

    #[tokio::test]
    async fn dropped_responder_fails_closed() {
        let (gate, mut rx) = ApprovalGate::new(Duration::from_secs(5));

        tokio::spawn(async move {
            let ticket = rx.recv().await.unwrap();
            drop(ticket.responder);
        });

        assert_eq!(gate.request(op(), REASON).await, ApprovalOutcome::Rejected);
    }

    #[tokio::test]
    async fn unreachable_backend_fails_closed() {
        let gate = ApprovalGate::disconnected(Duration::from_secs(5));
        assert_eq!(gate.request(op(), REASON).await, ApprovalOutcome::Rejected);
    }
}
