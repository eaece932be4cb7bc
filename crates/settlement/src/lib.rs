//! Settlement domain module.
//!
//! Payments applied against invoices and challans: allocation bounds, derived
//! payment status, and overdue interest. Pure logic; storage and locking live
//! in the infra crate.

pub mod balance;
pub mod event;
pub mod payment;
pub mod target;

pub use balance::{EnrichedDocument, SettlementDocument, SettlementStatus, enrich, overdue_interest};
pub use event::{PaymentAllocated, SettlementEvent, SettlementTargetRegistered};
pub use payment::{
    AllocationRequest, NewPayment, Payment, PaymentKind, PaymentRequest, SettlementAllocation,
    plan_allocation,
};
pub use target::{DocumentRef, SettlementTarget, TargetRegistration, TargetType};
