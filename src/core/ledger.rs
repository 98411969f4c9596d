//! Per-identity daily budget ledger.
//!
//! The ledger tracks reserved and committed spend per `(identity, UTC day)`
//! against a configured ceiling. The ceiling check and the reservation
//! increment happen under one lock, so two concurrent requests can never
//! both fit into the same remaining headroom. A reservation that is neither
//! committed nor released within the TTL is treated as abandoned and swept,
//! preventing permanent budget leakage from crashed operations.
//!
//! Buckets roll over at UTC midnight; unused budget does not carry over.
//! Committed spend is written through to the spend history store (when one
//! is attached) and reloaded lazily on the first touch of a bucket, so
//! restarts do not forget what was already spent today.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::{NaiveDate, Utc};
use serde::Serialize;

use crate::error::{Result, SwitchyardError};
use crate::storage::spend_history::SpendHistory;

/// Tolerance for floating-point ceiling comparisons.
const EPSILON: f64 = 1e-9;

static RESERVATION_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Ledger tuning parameters.
#[derive(Debug, Clone)]
pub struct LedgerConfig {
    /// Ceiling per identity per UTC day, in USD.
    pub daily_ceiling_usd: f64,
    /// How long an uncommitted reservation may live before it is swept.
    pub reservation_ttl: Duration,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            daily_ceiling_usd: 25.0,
            reservation_ttl: Duration::from_secs(120),
        }
    }
}

/// Handle to one outstanding reservation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ReservationId(u64);

impl std::fmt::Display for ReservationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "r-{}", self.0)
    }
}

/// Point-in-time budget usage for one identity today.
#[derive(Debug, Clone, Serialize)]
pub struct BudgetUsage {
    /// Identity queried.
    pub identity: String,
    /// UTC day bucket.
    pub day: NaiveDate,
    /// Currently reserved (uncommitted) spend.
    pub reserved_usd: f64,
    /// Committed spend.
    pub committed_usd: f64,
    /// Configured ceiling.
    pub ceiling_usd: f64,
    /// Remaining headroom.
    pub remaining_usd: f64,
}

#[derive(Debug, Default)]
struct Bucket {
    reserved: f64,
    committed: f64,
}

#[derive(Debug)]
struct Reservation {
    identity: String,
    day: NaiveDate,
    amount: f64,
    operation_id: String,
    created_at: Instant,
}

#[derive(Default)]
struct LedgerInner {
    buckets: HashMap<(String, NaiveDate), Bucket>,
    reservations: HashMap<ReservationId, Reservation>,
}

/// The budget ledger.
pub struct BudgetLedger {
    config: LedgerConfig,
    inner: Mutex<LedgerInner>,
    history: Option<Arc<SpendHistory>>,
}

impl BudgetLedger {
    /// Create an in-memory ledger.
    #[must_use]
    pub fn new(config: LedgerConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(LedgerInner::default()),
            history: None,
        }
    }

    /// Create a ledger that writes committed spend through to `history` and
    /// seeds buckets from it on first touch.
    #[must_use]
    pub fn with_history(config: LedgerConfig, history: Arc<SpendHistory>) -> Self {
        Self {
            config,
            inner: Mutex::new(LedgerInner::default()),
            history: Some(history),
        }
    }

    /// Configured daily ceiling.
    #[must_use]
    pub const fn ceiling_usd(&self) -> f64 {
        self.config.daily_ceiling_usd
    }

    fn seed_bucket(&self, identity: &str, day: NaiveDate) -> Bucket {
        let committed = self
            .history
            .as_ref()
            .and_then(|h| match h.committed_total(identity, day) {
                Ok(total) => Some(total),
                Err(e) => {
                    tracing::warn!(identity, error = %e, "spend history read failed, seeding bucket at zero");
                    None
                }
            })
            .unwrap_or(0.0);
        Bucket {
            reserved: 0.0,
            committed,
        }
    }

    fn sweep_locked(inner: &mut LedgerInner, ttl: Duration, now: Instant) -> usize {
        let expired: Vec<ReservationId> = inner
            .reservations
            .iter()
            .filter(|(_, r)| now.duration_since(r.created_at) >= ttl)
            .map(|(id, _)| *id)
            .collect();
        for id in &expired {
            if let Some(reservation) = inner.reservations.remove(id) {
                tracing::warn!(
                    reservation = %id,
                    operation = %reservation.operation_id,
                    identity = %reservation.identity,
                    amount = reservation.amount,
                    "abandoned reservation swept"
                );
                if let Some(bucket) = inner
                    .buckets
                    .get_mut(&(reservation.identity.clone(), reservation.day))
                {
                    bucket.reserved = (bucket.reserved - reservation.amount).max(0.0);
                }
            }
        }
        expired.len()
    }

    /// Reserve `amount_usd` against `identity`'s budget for today.
    ///
    /// The ceiling check and the increment are one indivisible step.
    ///
    /// # Errors
    ///
    /// `BudgetExceeded` when reserved + committed + amount would exceed the
    /// ceiling; `InvalidRequest` for a non-positive amount.
    pub fn reserve(
        &self,
        identity: &str,
        operation_id: &str,
        amount_usd: f64,
    ) -> Result<ReservationId> {
        if amount_usd <= 0.0 || !amount_usd.is_finite() {
            return Err(SwitchyardError::InvalidRequest {
                reason: format!("reservation amount must be positive, got {amount_usd}"),
            });
        }

        let day = Utc::now().date_naive();
        let mut inner = self.inner.lock().expect("ledger lock poisoned");
        Self::sweep_locked(&mut inner, self.config.reservation_ttl, Instant::now());

        let ceiling = self.config.daily_ceiling_usd;
        let bucket = inner
            .buckets
            .entry((identity.to_string(), day))
            .or_insert_with(|| self.seed_bucket(identity, day));

        let in_use = bucket.reserved + bucket.committed;
        if in_use + amount_usd > ceiling + EPSILON {
            let remaining = (ceiling - in_use).max(0.0);
            return Err(SwitchyardError::BudgetExceeded {
                identity: identity.to_string(),
                requested: amount_usd,
                remaining,
                ceiling,
            });
        }

        bucket.reserved += amount_usd;
        let id = ReservationId(RESERVATION_COUNTER.fetch_add(1, Ordering::Relaxed));
        inner.reservations.insert(
            id,
            Reservation {
                identity: identity.to_string(),
                day,
                amount: amount_usd,
                operation_id: operation_id.to_string(),
                created_at: Instant::now(),
            },
        );
        tracing::debug!(reservation = %id, identity, amount = amount_usd, "budget reserved");
        Ok(id)
    }

    /// Convert a reservation into committed spend. Returns the amount.
    ///
    /// # Errors
    ///
    /// Returns `Config` error if the reservation is unknown (already
    /// committed, released, or swept).
    pub fn commit(&self, id: ReservationId) -> Result<f64> {
        let (identity, day, amount, operation_id) = {
            let mut inner = self.inner.lock().expect("ledger lock poisoned");
            let reservation = inner.reservations.remove(&id).ok_or_else(|| {
                SwitchyardError::Config(format!("unknown reservation {id} (expired or settled)"))
            })?;
            if let Some(bucket) = inner
                .buckets
                .get_mut(&(reservation.identity.clone(), reservation.day))
            {
                bucket.reserved = (bucket.reserved - reservation.amount).max(0.0);
                bucket.committed += reservation.amount;
            }
            (
                reservation.identity,
                reservation.day,
                reservation.amount,
                reservation.operation_id,
            )
        };

        // Write-through after the lock; a history failure must not undo an
        // in-memory commit that already happened.
        if let Some(history) = &self.history {
            if let Err(e) = history.record(&identity, day, &operation_id, amount) {
                tracing::error!(identity, error = %e, "committed spend not persisted");
            }
        }
        tracing::debug!(reservation = %id, identity, amount, "budget committed");
        Ok(amount)
    }

    /// Release a reservation without committing it. Unknown ids are ignored
    /// (the sweep may have raced the caller).
    pub fn release(&self, id: ReservationId) {
        let mut inner = self.inner.lock().expect("ledger lock poisoned");
        if let Some(reservation) = inner.reservations.remove(&id) {
            if let Some(bucket) = inner
                .buckets
                .get_mut(&(reservation.identity.clone(), reservation.day))
            {
                bucket.reserved = (bucket.reserved - reservation.amount).max(0.0);
            }
            tracing::debug!(reservation = %id, identity = %reservation.identity, "budget released");
        }
    }

    /// Sweep abandoned reservations; returns how many were released.
    pub fn sweep_abandoned(&self) -> usize {
        let mut inner = self.inner.lock().expect("ledger lock poisoned");
        Self::sweep_locked(&mut inner, self.config.reservation_ttl, Instant::now())
    }

    /// Current usage for an identity today.
    #[must_use]
    pub fn usage(&self, identity: &str) -> BudgetUsage {
        let day = Utc::now().date_naive();
        let mut inner = self.inner.lock().expect("ledger lock poisoned");
        let bucket = inner
            .buckets
            .entry((identity.to_string(), day))
            .or_insert_with(|| self.seed_bucket(identity, day));
        let ceiling = self.config.daily_ceiling_usd;
        BudgetUsage {
            identity: identity.to_string(),
            day,
            reserved_usd: bucket.reserved,
            committed_usd: bucket.committed,
            ceiling_usd: ceiling,
            remaining_usd: (ceiling - bucket.reserved - bucket.committed).max(0.0),
        }
    }
}
