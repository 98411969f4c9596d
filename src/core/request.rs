//! Operation request model.
//!
//! An [`OperationRequest`] describes one unit of work submitted to the
//! router: who is asking, which class of operation, how large it is expected
//! to be, and how critical it is. Requests are immutable once submitted; the
//! builder-style setters consume `self` and are only usable before the
//! request is handed to the router.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::LazyLock;

use chrono::Utc;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{Result, SwitchyardError};
use crate::providers::ProviderId;

/// Maximum accepted identity length.
pub const MAX_IDENTITY_LEN: usize = 128;

/// Identity syntax: local-part-like token, optionally with dots and dashes.
static IDENTITY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._@-]*$").expect("static regex"));

static OPERATION_COUNTER: AtomicU64 = AtomicU64::new(0);

// =============================================================================
// Operation Class
// =============================================================================

/// The class of work an operation performs.
///
/// Pricing is keyed by `(provider, class)`; unknown classes are rejected at
/// validation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationClass {
    /// Text generation / chat completion.
    Generate,
    /// Embedding vectors.
    Embed,
    /// Audio transcription.
    Transcribe,
    /// Content moderation / classification.
    Moderate,
}

impl OperationClass {
    /// All operation classes.
    pub const ALL: &'static [Self] = &[Self::Generate, Self::Embed, Self::Transcribe, Self::Moderate];

    /// CLI name for this class.
    #[must_use]
    pub const fn cli_name(self) -> &'static str {
        match self {
            Self::Generate => "generate",
            Self::Embed => "embed",
            Self::Transcribe => "transcribe",
            Self::Moderate => "moderate",
        }
    }

    /// Parse from CLI argument.
    pub fn from_cli_name(name: &str) -> Result<Self> {
        let lower = name.to_lowercase();
        Self::ALL
            .iter()
            .find(|c| c.cli_name() == lower)
            .copied()
            .ok_or_else(|| SwitchyardError::UnknownOperationClass(name.to_string()))
    }
}

impl std::fmt::Display for OperationClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.cli_name())
    }
}

// =============================================================================
// Criticality
// =============================================================================

/// How sensitive an operation is, independent of its cost.
///
/// Operations at or above the configured criticality threshold are gated on
/// human approval even when their estimated cost is small.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Criticality {
    /// Everyday operation; no special handling.
    #[default]
    Routine,
    /// Elevated sensitivity (e.g. acts on user data).
    Elevated,
    /// Critical operation; always gated.
    Critical,
}

impl Criticality {
    /// All levels in ascending order.
    pub const ALL: &'static [Self] = &[Self::Routine, Self::Elevated, Self::Critical];

    /// CLI name for this level.
    #[must_use]
    pub const fn cli_name(self) -> &'static str {
        match self {
            Self::Routine => "routine",
            Self::Elevated => "elevated",
            Self::Critical => "critical",
        }
    }

    /// Parse from CLI argument.
    pub fn from_cli_name(name: &str) -> Result<Self> {
        let lower = name.to_lowercase();
        Self::ALL
            .iter()
            .find(|c| c.cli_name() == lower)
            .copied()
            .ok_or_else(|| SwitchyardError::ConfigInvalid {
                key: "criticality".to_string(),
                message: format!("unknown level '{name}' (routine, elevated, critical)"),
            })
    }
}

impl std::fmt::Display for Criticality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.cli_name())
    }
}

// =============================================================================
// Operation Id
// =============================================================================

/// Unique identifier for one submitted operation.
///
/// Derived from the submission timestamp and a process-wide counter, so ids
/// are unique within a process and sort roughly by submission time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperationId(String);

impl OperationId {
    /// Mint a fresh operation id.
    #[must_use]
    pub fn generate() -> Self {
        let seq = OPERATION_COUNTER.fetch_add(1, Ordering::Relaxed);
        let millis = Utc::now().timestamp_millis().max(0);
        Self(format!("op-{millis:013x}-{seq:04x}"))
    }

    /// View as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for OperationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// Operation Request
// =============================================================================

/// One unit of work submitted to the router.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationRequest {
    /// Unique id assigned at construction.
    pub id: OperationId,
    /// Who is asking. Budget accounting is keyed by this value.
    pub identity: String,
    /// Operation class.
    pub class: OperationClass,
    /// Declared size hint in units (e.g. estimated tokens).
    pub estimated_units: u64,
    /// Operation payload. Never written to the audit log in raw form.
    pub input: String,
    /// Explicit provider preference, if any.
    pub preferred_provider: Option<ProviderId>,
    /// Criticality tag.
    pub criticality: Criticality,
}

impl OperationRequest {
    /// Create a request with a fresh id and routine criticality.
    #[must_use]
    pub fn new(identity: impl Into<String>, class: OperationClass, input: impl Into<String>) -> Self {
        let input = input.into();
        // Rough default: one unit per 4 bytes of input, minimum 1.
        let estimated_units = (input.len() as u64 / 4).max(1);
        Self {
            id: OperationId::generate(),
            identity: identity.into(),
            class,
            estimated_units,
            input,
            preferred_provider: None,
            criticality: Criticality::default(),
        }
    }

    /// Override the declared size hint.
    #[must_use]
    pub const fn with_units(mut self, units: u64) -> Self {
        self.estimated_units = units;
        self
    }

    /// Prefer a specific provider when it is healthy.
    #[must_use]
    pub const fn with_preferred_provider(mut self, provider: ProviderId) -> Self {
        self.preferred_provider = Some(provider);
        self
    }

    /// Set the criticality tag.
    #[must_use]
    pub const fn with_criticality(mut self, criticality: Criticality) -> Self {
        self.criticality = criticality;
        self
    }

    /// Validate the request.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRequest` for an empty or malformed identity, an
    /// over-long identity, or a zero-sized request.
    pub fn validate(&self) -> Result<()> {
        if self.identity.is_empty() {
            return Err(SwitchyardError::InvalidRequest {
                reason: "identity must not be empty".to_string(),
            });
        }
        if self.identity.len() > MAX_IDENTITY_LEN {
            return Err(SwitchyardError::InvalidRequest {
                reason: format!("identity exceeds {MAX_IDENTITY_LEN} characters"),
            });
        }
        if !IDENTITY_RE.is_match(&self.identity) {
            return Err(SwitchyardError::InvalidRequest {
                reason: format!("identity '{}' contains invalid characters", self.identity),
            });
        }
        if self.estimated_units == 0 {
            return Err(SwitchyardError::InvalidRequest {
                reason: "estimated units must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    /// Digest of the request suitable for the audit log.
    ///
    /// Covers identity, class, size, and criticality plus a hash of the
    /// input. The raw input never leaves this function.
    #[must_use]
    pub fn payload_digest(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.id.as_str().as_bytes());
        hasher.update(b"\n");
        hasher.update(self.identity.as_bytes());
        hasher.update(b"\n");
        hasher.update(self.class.cli_name().as_bytes());
        hasher.update(b"\n");
        hasher.update(self.estimated_units.to_le_bytes());
        hasher.update(b"\n");
        hasher.update(self.criticality.cli_name().as_bytes());
        hasher.update(b"\n");
        hasher.update(Sha256::digest(self.input.as_bytes()));
        hex::encode(hasher.finalize())
    }
}

// =============================================================================
// Operation Result
// =============================================================================

/// Successful outcome of a routed operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationResult {
    /// The operation this result answers.
    pub operation_id: OperationId,
    /// Provider that served the request.
    pub provider: ProviderId,
    /// Model that served the request.
    pub model: String,
    /// Response payload.
    pub output: String,
    /// Amount committed against the identity's budget.
    pub committed_usd: f64,
    /// Wall-clock duration of the winning invocation.
    pub duration_ms: u64,
    /// How many candidates were attempted (1 = no failover).
    pub attempts: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operation_ids_are_unique() {
        let a = OperationId::generate();
        let b = OperationId::generate();
        assert_ne!(a, b);
        assert!(a.as_str().starts_with("op-"));
    }

    #[test]
    fn operation_class_round_trips() {
        for class in OperationClass::ALL {
            assert_eq!(
                OperationClass::from_cli_name(class.cli_name()).unwrap(),
                *class
            );
        }
        assert!(OperationClass::from_cli_name("paint").is_err());
    }

    #[test]
    fn criticality_ordering() {
        assert!(Criticality::Critical > Criticality::Elevated);
        assert!(Criticality::Elevated > Criticality::Routine);
    }

    #[test]
    fn validate_rejects_empty_identity() {
        let request = OperationRequest::new("", OperationClass::Generate, "hello");
        assert!(matches!(
            request.validate(),
            Err(SwitchyardError::InvalidRequest { .. })
        ));
    }

    #[test]
    fn validate_rejects_bad_identity_syntax() {
        let request = OperationRequest::new("user one", OperationClass::Generate, "hello");
        assert!(request.validate().is_err());

        let request = OperationRequest::new("-leading", OperationClass::Generate, "hello");
        assert!(request.validate().is_err());
    }

    #[test]
    fn validate_accepts_email_like_identities() {
        for identity in ["u1", "alice@example.com", "team.bot-7", "a_b"] {
            let request = OperationRequest::new(identity, OperationClass::Embed, "x");
            assert!(request.validate().is_ok(), "{identity}");
        }
    }

    #[test]
    fn validate_rejects_zero_units() {
        let request =
            OperationRequest::new("u1", OperationClass::Generate, "hello").with_units(0);
        assert!(request.validate().is_err());
    }

    #[test]
    fn default_units_scale_with_input() {
        let small = OperationRequest::new("u1", OperationClass::Generate, "hi");
        assert_eq!(small.estimated_units, 1);

        let big = OperationRequest::new("u1", OperationClass::Generate, "x".repeat(4000));
        assert_eq!(big.estimated_units, 1000);
    }

    #[test]
    fn payload_digest_hides_input() {
        let request = OperationRequest::new("u1", OperationClass::Generate, "super secret prompt");
        let digest = request.payload_digest();
        assert_eq!(digest.len(), 64);
        assert!(!digest.contains("secret"));
    }

    #[test]
    fn payload_digest_changes_with_input() {
        let a = OperationRequest::new("u1", OperationClass::Generate, "alpha");
        let mut b = a.clone();
        b.input = "beta".to_string();
        assert_ne!(a.payload_digest(), b.payload_digest());
    }
}
