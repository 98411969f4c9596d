//! Tamper-evident audit log.
//!
//! Every operation's lifecycle lands here as a chained-hash record: each
//! entry embeds the hash of its predecessor, and its own hash covers all of
//! its fields, so editing, deleting, or reordering any past entry breaks the
//! chain at that point. The log is strictly append-only with a single
//! internally-serialized writer; no other component appends directly.
//!
//! The append path is fail-closed by contract: when a store write cannot be
//! confirmed within the append timeout, the caller must treat the operation
//! as unrecorded and refuse to proceed. Corrections are new entries
//! referencing the original operation id, never edits.

pub mod store;

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{Result, SwitchyardError};

pub use store::{AuditStore, Checkpoint, FileAuditStore, MemoryAuditStore};

/// `previous_hash` of the very first entry.
pub const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

/// Default bound on one store append.
pub const DEFAULT_APPEND_TIMEOUT: Duration = Duration::from_secs(2);

// =============================================================================
// Entry Types
// =============================================================================

/// Lifecycle event kinds recorded in the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventKind {
    /// Recorded before the provider is invoked.
    Pending,
    /// Operation completed and its reservation committed.
    Completed,
    /// Operation failed, was exhausted, or was cancelled mid-flight.
    Failed,
    /// Reservation rejected by the budget ledger.
    BudgetRejected,
    /// Approval gate rejected or timed out.
    ApprovalRejected,
}

impl AuditEventKind {
    /// Wire name, also the hash-input token.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::BudgetRejected => "budget_rejected",
            Self::ApprovalRejected => "approval_rejected",
        }
    }

    /// Whether this kind terminates an operation's audit lifecycle.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl std::fmt::Display for AuditEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One immutable chain entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Monotonically increasing position, starting at 0.
    pub index: u64,
    /// When the entry was sealed.
    pub timestamp: DateTime<Utc>,
    /// Lifecycle event kind.
    pub kind: AuditEventKind,
    /// Operation this entry belongs to.
    pub operation_id: String,
    /// Digest of the operation payload; never the raw input or credentials.
    pub payload_digest: String,
    /// Hash of the previous entry ([`GENESIS_HASH`] for index 0).
    pub previous_hash: String,
    /// This entry's hash over all fields above.
    pub hash: String,
}

impl AuditEntry {
    /// Recompute the hash from this entry's own fields.
    #[must_use]
    pub fn computed_hash(&self) -> String {
        compute_hash(
            self.index,
            &self.timestamp,
            self.kind,
            &self.operation_id,
            &self.payload_digest,
            &self.previous_hash,
        )
    }
}

fn compute_hash(
    index: u64,
    timestamp: &DateTime<Utc>,
    kind: AuditEventKind,
    operation_id: &str,
    payload_digest: &str,
    previous_hash: &str,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(index.to_string().as_bytes());
    hasher.update(b"\n");
    hasher.update(
        timestamp
            .to_rfc3339_opts(SecondsFormat::Micros, true)
            .as_bytes(),
    );
    hasher.update(b"\n");
    hasher.update(kind.as_str().as_bytes());
    hasher.update(b"\n");
    hasher.update(operation_id.as_bytes());
    hasher.update(b"\n");
    hasher.update(payload_digest.as_bytes());
    hasher.update(b"\n");
    hasher.update(previous_hash.as_bytes());
    hex::encode(hasher.finalize())
}

// =============================================================================
// Verification
// =============================================================================

/// Outcome of a chain verification pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum VerifyOutcome {
    /// Every entry recomputes and links correctly.
    Valid {
        /// Number of entries verified.
        length: u64,
    },
    /// First index at which the chain breaks.
    TamperedAt {
        index: u64,
        reason: String,
    },
}

impl VerifyOutcome {
    /// Whether the chain held up.
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        matches!(self, Self::Valid { .. })
    }
}

/// Verify a sequence of entries read from a store.
///
/// Recomputes every hash and checks every link; also checks positional
/// indices so silent reordering or mid-chain deletion is caught at the
/// first affected entry.
#[must_use]
pub fn verify_entries(entries: &[AuditEntry]) -> VerifyOutcome {
    let mut previous_hash = GENESIS_HASH.to_string();

    for (position, entry) in entries.iter().enumerate() {
        let expected_index = position as u64;
        if entry.index != expected_index {
            return VerifyOutcome::TamperedAt {
                index: expected_index,
                reason: format!(
                    "index discontinuity: expected {expected_index}, found {}",
                    entry.index
                ),
            };
        }
        if entry.previous_hash != previous_hash {
            return VerifyOutcome::TamperedAt {
                index: entry.index,
                reason: "previous hash mismatch".to_string(),
            };
        }
        if entry.computed_hash() != entry.hash {
            return VerifyOutcome::TamperedAt {
                index: entry.index,
                reason: "entry hash mismatch".to_string(),
            };
        }
        previous_hash = entry.hash.clone();
    }

    VerifyOutcome::Valid {
        length: entries.len() as u64,
    }
}

// =============================================================================
// Audit Log
// =============================================================================

struct ChainState {
    next_index: u64,
    last_hash: String,
}

/// The single-writer audit log.
pub struct AuditLog {
    state: tokio::sync::Mutex<ChainState>,
    store: Arc<dyn AuditStore>,
    append_timeout: Duration,
}

impl AuditLog {
    /// Open a log over `store`, resuming from its checkpoint so no index or
    /// hash is ever reused across restarts.
    pub fn open(store: Arc<dyn AuditStore>, append_timeout: Duration) -> Result<Self> {
        let state = match store.checkpoint()? {
            Some(checkpoint) => ChainState {
                next_index: checkpoint.next_index,
                last_hash: checkpoint.last_hash,
            },
            None => ChainState {
                next_index: 0,
                last_hash: GENESIS_HASH.to_string(),
            },
        };
        Ok(Self {
            state: tokio::sync::Mutex::new(state),
            store,
            append_timeout,
        })
    }

    /// In-memory log for tests and ephemeral runs.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::open(Arc::new(MemoryAuditStore::new()), DEFAULT_APPEND_TIMEOUT)
            .expect("memory store checkpoint cannot fail")
    }

    /// Append one entry. Fail-closed: any store error or timeout surfaces
    /// as `AuditUnavailable` and the chain state is not advanced.
    ///
    /// The writer is serialized internally; concurrent callers append in
    /// whatever order they acquire the writer slot.
    pub async fn append(
        &self,
        kind: AuditEventKind,
        operation_id: &str,
        payload_digest: &str,
    ) -> Result<AuditEntry> {
        let mut state = self.state.lock().await;

        let timestamp = Utc::now();
        let hash = compute_hash(
            state.next_index,
            &timestamp,
            kind,
            operation_id,
            payload_digest,
            &state.last_hash,
        );
        let entry = AuditEntry {
            index: state.next_index,
            timestamp,
            kind,
            operation_id: operation_id.to_string(),
            payload_digest: payload_digest.to_string(),
            previous_hash: state.last_hash.clone(),
            hash,
        };

        // Store appends may touch disk or network; run them off the async
        // threads and bound them with the configured timeout.
        let store = Arc::clone(&self.store);
        let to_write = entry.clone();
        let write = tokio::task::spawn_blocking(move || store.append(&to_write));

        match tokio::time::timeout(self.append_timeout, write).await {
            Ok(Ok(Ok(()))) => {}
            Ok(Ok(Err(e))) => {
                return Err(SwitchyardError::AuditUnavailable {
                    reason: e.to_string(),
                });
            }
            Ok(Err(join_err)) => {
                return Err(SwitchyardError::AuditUnavailable {
                    reason: format!("append task failed: {join_err}"),
                });
            }
            Err(_) => {
                return Err(SwitchyardError::AuditUnavailable {
                    reason: format!(
                        "append timed out after {}ms",
                        self.append_timeout.as_millis()
                    ),
                });
            }
        }

        state.next_index += 1;
        state.last_hash = entry.hash.clone();
        tracing::debug!(index = entry.index, kind = %kind, operation = operation_id, "audit entry appended");
        Ok(entry)
    }

    /// Read-only ordered export of the whole chain.
    pub fn export(&self) -> Result<Vec<AuditEntry>> {
        self.store.read_all()
    }

    /// Verify the whole chain as stored.
    pub fn verify(&self) -> Result<VerifyOutcome> {
        let entries = self.store.read_all()?;
        Ok(verify_entries(&entries))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn log_with_entries(n: usize) -> AuditLog {
        let log = AuditLog::in_memory();
        for i in 0..n {
            log.append(AuditEventKind::Pending, &format!("op-{i}"), "digest")
                .await
                .unwrap();
        }
        log
    }

    #[tokio::test]
    async fn appends_chain_from_genesis() {
        let log = log_with_entries(3).await;
        let entries = log.export().unwrap();

        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].previous_hash, GENESIS_HASH);
        assert_eq!(entries[1].previous_hash, entries[0].hash);
        assert_eq!(entries[2].previous_hash, entries[1].hash);
        assert_eq!(entries[2].index, 2);
    }

    #[tokio::test]
    async fn untouched_chain_verifies() {
        let log = log_with_entries(5).await;
        assert_eq!(log.verify().unwrap(), VerifyOutcome::Valid { length: 5 });
    }

    #[tokio::test]
    async fn empty_chain_is_valid() {
        let log = AuditLog::in_memory();
        assert!(log.verify().unwrap().is_valid());
    }

    #[test]
    fn mutating_any_field_is_detected_at_that_index() {
        let entries = tokio_test::block_on(async {
            let log = log_with_entries(4).await;
            log.export().unwrap()
        });

        // Tamper with each mutable field of entry 2 in turn.
        let mut cases: Vec<(&str, Vec<AuditEntry>)> = Vec::new();

        let mut tampered = entries.clone();
        tampered[2].operation_id = "op-evil".to_string();
        cases.push(("operation_id", tampered));

        let mut tampered = entries.clone();
        tampered[2].payload_digest = "f".repeat(64);
        cases.push(("payload_digest", tampered));

        let mut tampered = entries.clone();
        tampered[2].kind = AuditEventKind::Completed;
        cases.push(("kind", tampered));

        let mut tampered = entries.clone();
        tampered[2].timestamp = tampered[2].timestamp + chrono::Duration::seconds(1);
        cases.push(("timestamp", tampered));

        for (field, tampered) in cases {
            match verify_entries(&tampered) {
                VerifyOutcome::TamperedAt { index, .. } => {
                    assert_eq!(index, 2, "tampered {field} should break at index 2");
                }
                VerifyOutcome::Valid { .. } => panic!("tampered {field} passed verification"),
            }
        }
    }

    #[test]
    fn rewritten_hash_breaks_link_at_next_entry() {
        let mut entries = tokio_test::block_on(async {
            let log = log_with_entries(4).await;
            log.export().unwrap()
        });

        // An attacker who edits entry 1 *and* recomputes its hash still
        // loses: entry 2's stored previous_hash no longer matches.
        entries[1].operation_id = "op-evil".to_string();
        entries[1].hash = entries[1].computed_hash();

        match verify_entries(&entries) {
            VerifyOutcome::TamperedAt { index, .. } => assert_eq!(index, 2),
            VerifyOutcome::Valid { .. } => panic!("recomputed tamper passed verification"),
        }
    }

    #[test]
    fn mid_chain_deletion_is_detected() {
        let mut entries = tokio_test::block_on(async {
            let log = log_with_entries(4).await;
            log.export().unwrap()
        });

        entries.remove(1);
        match verify_entries(&entries) {
            VerifyOutcome::TamperedAt { index, .. } => assert_eq!(index, 1),
            VerifyOutcome::Valid { .. } => panic!("deletion passed verification"),
        }
    }

    #[tokio::test]
    async fn concurrent_appends_serialize_without_gaps() {
        let log = std::sync::Arc::new(AuditLog::in_memory());
        let mut handles = Vec::new();
        for i in 0..16 {
            let log = std::sync::Arc::clone(&log);
            handles.push(tokio::spawn(async move {
                log.append(AuditEventKind::Pending, &format!("op-{i}"), "digest")
                    .await
                    .unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let entries = log.export().unwrap();
        assert_eq!(entries.len(), 16);
        assert!(verify_entries(&entries).is_valid());
    }

    #[tokio::test]
    async fn failed_append_does_not_advance_the_chain() {
        use crate::test_utils::FailingAuditStore;

        let store = Arc::new(FailingAuditStore::new());
        let log = AuditLog::open(Arc::clone(&store) as Arc<dyn AuditStore>, DEFAULT_APPEND_TIMEOUT)
            .unwrap();

        log.append(AuditEventKind::Pending, "op-0", "digest")
            .await
            .unwrap();

        store.set_failing(true);
        let err = log
            .append(AuditEventKind::Pending, "op-1", "digest")
            .await
            .unwrap_err();
        assert!(matches!(err, SwitchyardError::AuditUnavailable { .. }));

        // Index 1 was not consumed by the failed attempt.
        store.set_failing(false);
        let entry = log
            .append(AuditEventKind::Completed, "op-0", "digest")
            .await
            .unwrap();
        assert_eq!(entry.index, 1);
    }
}
