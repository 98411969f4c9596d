//! Error types for switchyard.
//!
//! Uses `thiserror` for structured error types that map to exit codes.
//!
//! ## Error Taxonomy
//!
//! Errors fall into five categories:
//! - **Routing**: terminal outcomes of a `route` call (budget, approval,
//!   audit availability, provider exhaustion)
//! - **Provider**: failures surfaced by an individual backend invocation
//! - **Configuration**: config file parsing, validation, or missing values
//! - **Storage**: spend history or audit store failures
//! - **Internal**: unexpected errors, bugs, or unclassified issues
//!
//! Each routing rejection is distinguishable by [`RouteErrorKind`] so a caller
//! can decide whether to retry later (budget, approval) or not at all
//! (invalid request, audit unavailable). Every error also carries a stable
//! code (e.g. `SWYD-R001`) for programmatic handling.

use std::time::Duration;
use thiserror::Error;

// =============================================================================
// Error Categories
// =============================================================================

/// High-level error categories for classification and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Terminal routing outcomes (budget, approval, exhaustion).
    Routing,
    /// Provider-specific failures (timeouts, API errors, unreachable).
    Provider,
    /// Configuration issues (parse errors, invalid values, missing files).
    Configuration,
    /// Persistent store issues (audit log, spend history).
    Storage,
    /// Internal errors (bugs, unexpected state, unclassified).
    Internal,
}

impl ErrorCategory {
    /// Returns a human-readable description of the category.
    #[must_use]
    pub const fn description(&self) -> &'static str {
        match self {
            Self::Routing => "Routing error",
            Self::Provider => "Provider error",
            Self::Configuration => "Configuration error",
            Self::Storage => "Storage error",
            Self::Internal => "Internal error",
        }
    }

    /// Returns a short code prefix for this category.
    #[must_use]
    pub const fn code_prefix(&self) -> &'static str {
        match self {
            Self::Routing => "R",
            Self::Provider => "P",
            Self::Configuration => "C",
            Self::Storage => "S",
            Self::Internal => "X",
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.description())
    }
}

// =============================================================================
// Route Error Kinds
// =============================================================================

/// The terminal outcome kinds a `route` call can reject with.
///
/// Serialized into the CLI `--json` output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteErrorKind {
    /// Malformed request; rejected before any side effect.
    InvalidRequest,
    /// Reservation rejected by the budget ledger.
    BudgetExceeded,
    /// Approval gate rejected, timed out, or was unreachable.
    ApprovalDenied,
    /// The pending audit entry could not be written; operation never ran.
    AuditUnavailable,
    /// Every eligible candidate was tried (or excluded) and failed.
    AllProvidersExhausted,
    /// The only attempted candidate timed out.
    ProviderTimeout,
    /// The caller cancelled the in-flight operation.
    Cancelled,
}

impl RouteErrorKind {
    /// Whether a caller could reasonably retry the same request later.
    #[must_use]
    pub const fn retry_later(self) -> bool {
        matches!(
            self,
            Self::BudgetExceeded
                | Self::ApprovalDenied
                | Self::AllProvidersExhausted
                | Self::ProviderTimeout
        )
    }
}

impl std::fmt::Display for RouteErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::InvalidRequest => "invalid_request",
            Self::BudgetExceeded => "budget_exceeded",
            Self::ApprovalDenied => "approval_denied",
            Self::AuditUnavailable => "audit_unavailable",
            Self::AllProvidersExhausted => "all_providers_exhausted",
            Self::ProviderTimeout => "provider_timeout",
            Self::Cancelled => "cancelled",
        };
        write!(f, "{label}")
    }
}

// =============================================================================
// Exit Codes
// =============================================================================

/// Process exit codes for the CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExitCode {
    /// Success
    Success = 0,
    /// Unexpected failure
    GeneralError = 1,
    /// Request rejected by routing policy (budget, approval, exhaustion)
    Rejected = 2,
    /// Parse/format/configuration errors
    ParseError = 3,
    /// Timeout
    Timeout = 4,
    /// Audit chain unavailable or integrity failure
    Integrity = 5,
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code as i32
    }
}

/// Main error type for switchyard operations.
#[derive(Error, Debug)]
pub enum SwitchyardError {
    // ==========================================================================
    // Routing outcomes (Category: Routing)
    // ==========================================================================
    /// Request failed validation before any side effect.
    #[error("invalid request: {reason}")]
    InvalidRequest {
        reason: String,
    },

    /// The budget ledger rejected the reservation.
    #[error(
        "budget exceeded for {identity}: requested ${requested:.4}, ${remaining:.4} of ${ceiling:.2} remaining today"
    )]
    BudgetExceeded {
        identity: String,
        requested: f64,
        remaining: f64,
        ceiling: f64,
    },

    /// The approval gate rejected, timed out, or was unreachable.
    #[error("approval denied for operation {operation_id}: {reason}")]
    ApprovalDenied {
        operation_id: String,
        reason: String,
    },

    /// The pending audit entry could not be written; the operation never ran.
    #[error("audit log unavailable: {reason}")]
    AuditUnavailable {
        reason: String,
    },

    /// All eligible candidates were tried or excluded.
    #[error("all providers exhausted for operation {operation_id}: {detail}")]
    AllProvidersExhausted {
        operation_id: String,
        detail: String,
    },

    /// The only attempted candidate timed out.
    #[error("provider {provider} timed out after {seconds}s")]
    ProviderTimeout {
        provider: String,
        seconds: u64,
    },

    /// The caller cancelled the in-flight operation.
    #[error("operation {operation_id} cancelled")]
    Cancelled {
        operation_id: String,
    },

    // ==========================================================================
    // Provider errors (Category: Provider)
    // ==========================================================================
    /// Provider API returned an error response.
    #[error("provider {provider} API error: {message}")]
    ProviderApi {
        provider: String,
        status_code: Option<u16>,
        message: String,
    },

    /// Provider could not be reached.
    #[error("provider {provider} unreachable: {message}")]
    ProviderUnreachable {
        provider: String,
        message: String,
    },

    /// Credentials for a provider are missing or rejected.
    #[error("credentials missing or rejected for {provider}: {message}")]
    ProviderAuth {
        provider: String,
        message: String,
    },

    /// Rate limited by provider.
    #[error("rate limited by {provider}: {message}")]
    RateLimited {
        provider: String,
        retry_after: Option<Duration>,
        message: String,
    },

    // ==========================================================================
    // Configuration errors (Category: Configuration)
    // ==========================================================================
    /// Configuration file could not be parsed.
    #[error("config parse error at {path}: {message}")]
    ConfigParse {
        path: String,
        message: String,
    },

    /// Invalid value in configuration.
    #[error("invalid config value for '{key}': {message}")]
    ConfigInvalid {
        key: String,
        message: String,
    },

    /// Unknown provider name in configuration or CLI arguments.
    #[error("unknown provider: {0}")]
    UnknownProvider(String),

    /// Unknown operation class name.
    #[error("unknown operation class: {0}")]
    UnknownOperationClass(String),

    /// Generic configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    // ==========================================================================
    // Storage errors (Category: Storage)
    // ==========================================================================
    /// The audit chain failed verification.
    #[error("audit chain tampered at index {index}: {reason}")]
    AuditTampered {
        index: u64,
        reason: String,
    },

    /// Spend history database failure.
    #[error("spend history error: {0}")]
    SpendHistory(#[from] rusqlite::Error),

    // ==========================================================================
    // Internal errors (Category: Internal)
    // ==========================================================================
    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Catch-all for other errors.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl SwitchyardError {
    /// The routing outcome kind, if this error is a terminal routing outcome.
    #[must_use]
    pub const fn route_kind(&self) -> Option<RouteErrorKind> {
        match self {
            Self::InvalidRequest { .. } => Some(RouteErrorKind::InvalidRequest),
            Self::BudgetExceeded { .. } => Some(RouteErrorKind::BudgetExceeded),
            Self::ApprovalDenied { .. } => Some(RouteErrorKind::ApprovalDenied),
            Self::AuditUnavailable { .. } => Some(RouteErrorKind::AuditUnavailable),
            Self::AllProvidersExhausted { .. } => Some(RouteErrorKind::AllProvidersExhausted),
            Self::ProviderTimeout { .. } => Some(RouteErrorKind::ProviderTimeout),
            Self::Cancelled { .. } => Some(RouteErrorKind::Cancelled),
            _ => None,
        }
    }

    /// Map error to a process exit code.
    #[must_use]
    pub const fn exit_code(&self) -> ExitCode {
        match self {
            Self::InvalidRequest { .. }
            | Self::ConfigParse { .. }
            | Self::ConfigInvalid { .. }
            | Self::UnknownProvider(_)
            | Self::UnknownOperationClass(_)
            | Self::Config(_) => ExitCode::ParseError,

            Self::BudgetExceeded { .. }
            | Self::ApprovalDenied { .. }
            | Self::AllProvidersExhausted { .. }
            | Self::Cancelled { .. } => ExitCode::Rejected,

            Self::ProviderTimeout { .. } => ExitCode::Timeout,

            Self::AuditUnavailable { .. } | Self::AuditTampered { .. } => ExitCode::Integrity,

            Self::ProviderApi { .. }
            | Self::ProviderUnreachable { .. }
            | Self::ProviderAuth { .. }
            | Self::RateLimited { .. }
            | Self::SpendHistory(_)
            | Self::Io(_)
            | Self::Json(_)
            | Self::Other(_) => ExitCode::GeneralError,
        }
    }

    /// Returns the error category for classification and logging.
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidRequest { .. }
            | Self::BudgetExceeded { .. }
            | Self::ApprovalDenied { .. }
            | Self::AuditUnavailable { .. }
            | Self::AllProvidersExhausted { .. }
            | Self::ProviderTimeout { .. }
            | Self::Cancelled { .. } => ErrorCategory::Routing,

            Self::ProviderApi { .. }
            | Self::ProviderUnreachable { .. }
            | Self::ProviderAuth { .. }
            | Self::RateLimited { .. } => ErrorCategory::Provider,

            Self::ConfigParse { .. }
            | Self::ConfigInvalid { .. }
            | Self::UnknownProvider(_)
            | Self::UnknownOperationClass(_)
            | Self::Config(_) => ErrorCategory::Configuration,

            Self::AuditTampered { .. } | Self::SpendHistory(_) => ErrorCategory::Storage,

            Self::Io(_) | Self::Json(_) | Self::Other(_) => ErrorCategory::Internal,
        }
    }

    /// Returns a stable error code for programmatic handling.
    ///
    /// Format: `SWYD-{category}{number}` where category is:
    /// - R: Routing
    /// - P: Provider
    /// - C: Configuration
    /// - S: Storage
    /// - X: Internal
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            // Routing outcomes (R001-R099)
            Self::InvalidRequest { .. } => "SWYD-R001",
            Self::BudgetExceeded { .. } => "SWYD-R002",
            Self::ApprovalDenied { .. } => "SWYD-R003",
            Self::AuditUnavailable { .. } => "SWYD-R004",
            Self::AllProvidersExhausted { .. } => "SWYD-R005",
            Self::ProviderTimeout { .. } => "SWYD-R006",
            Self::Cancelled { .. } => "SWYD-R007",

            // Provider errors (P001-P099)
            Self::ProviderApi { .. } => "SWYD-P001",
            Self::ProviderUnreachable { .. } => "SWYD-P002",
            Self::ProviderAuth { .. } => "SWYD-P003",
            Self::RateLimited { .. } => "SWYD-P004",

            // Configuration errors (C001-C099)
            Self::ConfigParse { .. } => "SWYD-C001",
            Self::ConfigInvalid { .. } => "SWYD-C002",
            Self::UnknownProvider(_) => "SWYD-C003",
            Self::UnknownOperationClass(_) => "SWYD-C004",
            Self::Config(_) => "SWYD-C005",

            // Storage errors (S001-S099)
            Self::AuditTampered { .. } => "SWYD-S001",
            Self::SpendHistory(_) => "SWYD-S002",

            // Internal errors (X001-X099)
            Self::Io(_) => "SWYD-X001",
            Self::Json(_) => "SWYD-X002",
            Self::Other(_) => "SWYD-X099",
        }
    }

    /// Returns whether the underlying condition is potentially transient.
    ///
    /// Transient conditions include provider timeouts, unreachable backends,
    /// rate limits, and exhaustion of currently-unhealthy candidates. Budget
    /// and approval rejections are policy outcomes, not transient faults.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ProviderTimeout { .. }
                | Self::ProviderUnreachable { .. }
                | Self::RateLimited { .. }
                | Self::AllProvidersExhausted { .. }
        )
    }

    /// Returns the retry-after duration if this error specifies one.
    #[must_use]
    pub const fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    /// Returns the provider name if this error is provider-specific.
    #[must_use]
    pub fn provider(&self) -> Option<&str> {
        match self {
            Self::ProviderTimeout { provider, .. }
            | Self::ProviderApi { provider, .. }
            | Self::ProviderUnreachable { provider, .. }
            | Self::ProviderAuth { provider, .. }
            | Self::RateLimited { provider, .. } => Some(provider),
            Self::UnknownProvider(p) => Some(p),
            _ => None,
        }
    }
}

/// Result type alias for switchyard operations.
pub type Result<T> = std::result::Result<T, SwitchyardError>;

// =============================================================================
// Tests
// =============================================================================
