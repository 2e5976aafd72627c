pub mod approvals;
pub mod audit;
pub mod config;
pub mod domain;
pub mod errors;
pub mod ledger;
pub mod workflow;

pub use approvals::{ApprovalGate, ApprovalRule, CostApprovalEngine, CostEvent, CostTransition};
pub use audit::{AuditEvent, AuditSink, InMemoryAuditSink, TracingAuditSink};
pub use domain::actor::{AccessPolicy, Actor, Permission, Role, UserId};
pub use domain::cost::{CostRequest, CostRequestId, CostStatus, NewCostRequest};
pub use domain::ledger::{LedgerMatchKey, LedgerTransaction, NewLedgerTransaction};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use ledger::{SyncReport, SyncTrigger};
pub use workflow::{ActorContext, CostRequestStore, CostWorkflow, LedgerBook};
