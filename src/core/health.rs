//! Per-provider health tracking and circuit breaking.
//!
//! Each provider gets a breaker with a sliding failure window: enough
//! failures inside the window opens the breaker and removes the provider
//! from candidate selection. After a cool-down the breaker half-opens and
//! admits exactly one trial request, regardless of how many callers arrive
//! concurrently; the trial outcome closes or re-opens the breaker. Repeated
//! re-opens back the cool-down off exponentially.
//!
//! States are created lazily on first use and reset, never deleted.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::providers::ProviderId;

/// Breaker tuning parameters.
#[derive(Debug, Clone)]
pub struct BreakerConfig {
    /// Failures within the window that open the breaker.
    pub failure_threshold: u32,
    /// Sliding window length for counting failures.
    pub window: Duration,
    /// Base cool-down before an open breaker half-opens.
    pub cooldown: Duration,
    /// Cap on the cool-down doubling exponent.
    pub max_backoff_exponent: u32,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            window: Duration::from_secs(300),
            cooldown: Duration::from_secs(60),
            max_backoff_exponent: 5,
        }
    }
}

/// Breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakerState {
    /// Normal operation.
    Closed,
    /// Excluded from candidates until the cool-down elapses.
    Open,
    /// One trial request permitted.
    HalfOpen,
}

impl std::fmt::Display for BreakerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half-open",
        };
        write!(f, "{label}")
    }
}

/// Result of asking to route through a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Breaker closed; go ahead.
    Ready,
    /// Breaker half-open; the caller holds the single trial slot and must
    /// report the outcome (or release the slot on cancellation).
    Trial,
    /// Breaker open, or the trial slot is already taken; skip the provider.
    Skip,
}

/// Point-in-time view of one provider's breaker, for status output.
#[derive(Debug, Clone, Serialize)]
pub struct BreakerSnapshot {
    /// Provider.
    pub provider: ProviderId,
    /// Current state.
    pub state: BreakerState,
    /// Failures currently inside the window.
    pub recent_failures: u32,
    /// Consecutive re-opens feeding the backoff.
    pub reopen_count: u32,
}

#[derive(Debug)]
struct BreakerEntry {
    state: BreakerState,
    failures: VecDeque<Instant>,
    opened_at: Option<Instant>,
    reopen_count: u32,
    trial_in_flight: bool,
}

impl BreakerEntry {
    fn new() -> Self {
        Self {
            state: BreakerState::Closed,
            failures: VecDeque::new(),
            opened_at: None,
            reopen_count: 0,
            trial_in_flight: false,
        }
    }

    fn prune_window(&mut self, window: Duration, now: Instant) {
        while let Some(&oldest) = self.failures.front() {
            if now.duration_since(oldest) >= window {
                self.failures.pop_front();
            } else {
                break;
            }
        }
    }

    /// Promote OPEN to HALF_OPEN once the (backed-off) cool-down elapses.
    fn promote(&mut self, config: &BreakerConfig, now: Instant) {
        if self.state != BreakerState::Open {
            return;
        }
        let Some(opened_at) = self.opened_at else {
            return;
        };
        // Shift clamp keeps a misconfigured exponent from overflowing.
        let exponent = self.reopen_count.min(config.max_backoff_exponent).min(16);
        let cooldown = config.cooldown.saturating_mul(1_u32 << exponent);
        if now.duration_since(opened_at) >= cooldown {
            self.state = BreakerState::HalfOpen;
            self.trial_in_flight = false;
        }
    }

    fn open(&mut self, now: Instant) {
        self.state = BreakerState::Open;
        self.opened_at = Some(now);
        self.trial_in_flight = false;
    }
}

/// Health monitor owning every provider breaker.
///
/// Sole mutator of breaker state; the router only calls through the narrow
/// contract below.
pub struct HealthMonitor {
    config: BreakerConfig,
    entries: Mutex<HashMap<ProviderId, BreakerEntry>>,
}

impl HealthMonitor {
    /// Create a monitor with the given tuning.
    #[must_use]
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Current state for a provider, applying any due cool-down promotion.
    #[must_use]
    pub fn state(&self, provider: ProviderId) -> BreakerState {
        let mut entries = self.entries.lock().expect("health lock poisoned");
        let entry = entries.entry(provider).or_insert_with(BreakerEntry::new);
        entry.promote(&self.config, Instant::now());
        entry.state
    }

    /// Ask to route through `provider`.
    ///
    /// A `Trial` admission takes the half-open slot; the caller must follow
    /// up with [`Self::record_success`], [`Self::record_failure`], or
    /// [`Self::release_trial`]. Concurrent callers during HALF_OPEN receive
    /// `Skip`, exactly as if the breaker were open.
    #[must_use]
    pub fn admit(&self, provider: ProviderId) -> Admission {
        let now = Instant::now();
        let mut entries = self.entries.lock().expect("health lock poisoned");
        let entry = entries.entry(provider).or_insert_with(BreakerEntry::new);
        entry.promote(&self.config, now);

        match entry.state {
            BreakerState::Closed => Admission::Ready,
            BreakerState::Open => Admission::Skip,
            BreakerState::HalfOpen => {
                if entry.trial_in_flight {
                    Admission::Skip
                } else {
                    entry.trial_in_flight = true;
                    Admission::Trial
                }
            }
        }
    }

    /// Record a successful invocation.
    pub fn record_success(&self, provider: ProviderId) {
        let mut entries = self.entries.lock().expect("health lock poisoned");
        let entry = entries.entry(provider).or_insert_with(BreakerEntry::new);
        if entry.state == BreakerState::HalfOpen {
            // Trial succeeded: close and forget the failure history.
            entry.state = BreakerState::Closed;
            entry.failures.clear();
            entry.opened_at = None;
            entry.reopen_count = 0;
        }
        entry.trial_in_flight = false;
    }

    /// Record a failed invocation.
    pub fn record_failure(&self, provider: ProviderId) {
        let now = Instant::now();
        let mut entries = self.entries.lock().expect("health lock poisoned");
        let entry = entries.entry(provider).or_insert_with(BreakerEntry::new);

        match entry.state {
            BreakerState::HalfOpen => {
                // Trial failed: re-open with a longer cool-down.
                entry.reopen_count = entry.reopen_count.saturating_add(1);
                entry.open(now);
            }
            BreakerState::Closed => {
                entry.prune_window(self.config.window, now);
                entry.failures.push_back(now);
                if entry.failures.len() as u32 >= self.config.failure_threshold {
                    entry.reopen_count = 0;
                    entry.open(now);
                }
            }
            BreakerState::Open => {
                // Late failure report from an invocation that started before
                // the breaker opened; the window keeps it for posterity.
                entry.prune_window(self.config.window, now);
                entry.failures.push_back(now);
            }
        }
    }

    /// Give back an unused trial slot (cancellation path). No transition.
    pub fn release_trial(&self, provider: ProviderId) {
        let mut entries = self.entries.lock().expect("health lock poisoned");
        if let Some(entry) = entries.get_mut(&provider) {
            entry.trial_in_flight = false;
        }
    }

    /// Snapshot every known breaker for status output.
    #[must_use]
    pub fn snapshot(&self) -> Vec<BreakerSnapshot> {
        let now = Instant::now();
        let mut entries = self.entries.lock().expect("health lock poisoned");
        let mut out: Vec<BreakerSnapshot> = entries
            .iter_mut()
            .map(|(provider, entry)| {
                entry.promote(&self.config, now);
                entry.prune_window(self.config.window, now);
                BreakerSnapshot {
                    provider: *provider,
                    state: entry.state,
                    recent_failures: entry.failures.len() as u32,
                    reopen_count: entry.reopen_count,
                }
            })
            .collect();
        out.sort_by_key(|s| s.provider.cli_name());
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_config() -> BreakerConfig {
        BreakerConfig {
            failure_threshold: 3,
            window: Duration::from_millis(200),
            cooldown: Duration::from_millis(50),
            max_backoff_exponent: 2,
        }
    }

    #[test]
    fn starts_closed_and_ready() {
        let monitor = HealthMonitor::new(BreakerConfig::default());
        assert_eq!(monitor.state(ProviderId::Anthropic), BreakerState::Closed);
        assert_eq!(monitor.admit(ProviderId::Anthropic), Admission::Ready);
    }

    #[test]
    fn opens_at_failure_threshold() {
        let monitor = HealthMonitor::new(fast_config());
        monitor.record_failure(ProviderId::OpenAi);
        monitor.record_failure(ProviderId::OpenAi);
        assert_eq!(monitor.state(ProviderId::OpenAi), BreakerState::Closed);

        monitor.record_failure(ProviderId::OpenAi);
        assert_eq!(monitor.state(ProviderId::OpenAi), BreakerState::Open);
        assert_eq!(monitor.admit(ProviderId::OpenAi), Admission::Skip);
    }

    #[test]
    fn window_is_sliding_not_bucketed() {
        let monitor = HealthMonitor::new(BreakerConfig {
            window: Duration::from_millis(40),
            ..fast_config()
        });
        monitor.record_failure(ProviderId::Gemini);
        monitor.record_failure(ProviderId::Gemini);
        std::thread::sleep(Duration::from_millis(60));
        // The first two failures have aged out; this third one alone must
        // not open the breaker.
        monitor.record_failure(ProviderId::Gemini);
        assert_eq!(monitor.state(ProviderId::Gemini), BreakerState::Closed);
    }

    #[test]
    fn half_opens_after_cooldown() {
        let monitor = HealthMonitor::new(fast_config());
        for _ in 0..3 {
            monitor.record_failure(ProviderId::Anthropic);
        }
        assert_eq!(monitor.state(ProviderId::Anthropic), BreakerState::Open);

        std::thread::sleep(Duration::from_millis(60));
        assert_eq!(monitor.state(ProviderId::Anthropic), BreakerState::HalfOpen);
    }

    #[test]
    fn half_open_grants_exactly_one_trial() {
        let monitor = HealthMonitor::new(fast_config());
        for _ in 0..3 {
            monitor.record_failure(ProviderId::Anthropic);
        }
        std::thread::sleep(Duration::from_millis(60));

        assert_eq!(monitor.admit(ProviderId::Anthropic), Admission::Trial);
        // Everyone else is turned away while the trial is in flight.
        assert_eq!(monitor.admit(ProviderId::Anthropic), Admission::Skip);
        assert_eq!(monitor.admit(ProviderId::Anthropic), Admission::Skip);
    }

    #[test]
    fn trial_success_closes_and_resets_window() {
        let monitor = HealthMonitor::new(fast_config());
        for _ in 0..3 {
            monitor.record_failure(ProviderId::OpenAi);
        }
        std::thread::sleep(Duration::from_millis(60));
        assert_eq!(monitor.admit(ProviderId::OpenAi), Admission::Trial);

        monitor.record_success(ProviderId::OpenAi);
        assert_eq!(monitor.state(ProviderId::OpenAi), BreakerState::Closed);

        // Window was reset: two fresh failures stay under the threshold.
        monitor.record_failure(ProviderId::OpenAi);
        monitor.record_failure(ProviderId::OpenAi);
        assert_eq!(monitor.state(ProviderId::OpenAi), BreakerState::Closed);
    }

    #[test]
    fn trial_failure_reopens_with_backoff() {
        let monitor = HealthMonitor::new(fast_config());
        for _ in 0..3 {
            monitor.record_failure(ProviderId::Gemini);
        }
        std::thread::sleep(Duration::from_millis(60));
        assert_eq!(monitor.admit(ProviderId::Gemini), Admission::Trial);

        monitor.record_failure(ProviderId::Gemini);
        assert_eq!(monitor.state(ProviderId::Gemini), BreakerState::Open);

        // Base cool-down has doubled; the original interval is not enough.
        std::thread::sleep(Duration::from_millis(60));
        assert_eq!(monitor.state(ProviderId::Gemini), BreakerState::Open);
        std::thread::sleep(Duration::from_millis(60));
        assert_eq!(monitor.state(ProviderId::Gemini), BreakerState::HalfOpen);
    }

    #[test]
    fn released_trial_frees_the_slot() {
        let monitor = HealthMonitor::new(fast_config());
        for _ in 0..3 {
            monitor.record_failure(ProviderId::Anthropic);
        }
        std::thread::sleep(Duration::from_millis(60));
        assert_eq!(monitor.admit(ProviderId::Anthropic), Admission::Trial);
        monitor.release_trial(ProviderId::Anthropic);
        // Slot free again, state unchanged.
        assert_eq!(monitor.admit(ProviderId::Anthropic), Admission::Trial);
    }

    #[test]
    fn snapshot_reports_all_touched_providers() {
        let monitor = HealthMonitor::new(fast_config());
        monitor.record_failure(ProviderId::Anthropic);
        monitor.record_success(ProviderId::OpenAi);

        let snapshot = monitor.snapshot();
        assert_eq!(snapshot.len(), 2);
        let anthropic = snapshot
            .iter()
            .find(|s| s.provider == ProviderId::Anthropic)
            .unwrap();
        assert_eq!(anthropic.recent_failures, 1);
        assert_eq!(anthropic.state, BreakerState::Closed);
    }
}
