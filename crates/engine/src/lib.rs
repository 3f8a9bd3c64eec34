//! LinkVault Link Access & Entitlement Engine
//!
//! The rules behind link sharing: how a link is created, gated, and viewed,
//! and how an account's plan quota and credit balance fund creations and are
//! settled from payment confirmations.
//!
//! ## Components
//!
//! - [`entitlement`]: the per-account ledger (plan, quota counter, credits)
//! - [`plans`]: immutable plan catalog and the tagged link allowance
//! - [`links`]: link persistence and atomic view counting
//! - [`authorizer`]: the gatekeeper in front of link creation
//! - [`gate`]: the visit state machine (lookup, expiry, password, grant)
//! - [`settlement`]: exactly-once application of payment confirmations
//! - [`transactions`]: the append-only settled-payment audit trail

pub mod authorizer;
pub mod entitlement;
pub mod error;
pub mod gate;
pub mod links;
pub mod password;
pub mod plans;
pub mod settlement;
pub mod transactions;

pub use authorizer::{AuthorizedLink, CreateLinkRequest, LinkAuthorizer};
pub use entitlement::{
    decide_funding, AccountEntitlement, EntitlementService, FundingDecision, FundingSource,
};
pub use error::{EngineError, EngineResult};
pub use gate::{AccessGate, GateState};
pub use links::{Link, LinkStats, LinkStore, NewLink};
pub use plans::{LinksLimit, Plan, PlanCatalog};
pub use settlement::{SettlementOutcome, SettlementService};
pub use transactions::{
    NewTransaction, PaymentMethod, TransactionKind, TransactionRecord, TransactionStore,
};
