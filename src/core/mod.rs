//! Core routing machinery: request model, pricing, health, budget,
//! approval, and the router itself.

pub mod approval;
pub mod health;
pub mod http;
pub mod ledger;
pub mod logging;
pub mod pricing;
pub mod request;
pub mod router;

pub use approval::{
    ApprovalConfig, ApprovalDecision, ApprovalGate, ApprovalOutcome, ApprovalReason,
    ApprovalRecord, ApprovalTicket,
};
pub use health::{Admission, BreakerConfig, BreakerSnapshot, BreakerState, HealthMonitor};
pub use ledger::{BudgetLedger, BudgetUsage, LedgerConfig, ReservationId};
pub use pricing::{BuiltinPricing, FilePricing, PriceTable, PricingRegistry, PricingSource};
pub use request::{Criticality, OperationClass, OperationId, OperationRequest, OperationResult};
pub use router::{Router, RouterParts};
