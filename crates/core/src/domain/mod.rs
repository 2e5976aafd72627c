pub mod actor;
pub mod cost;
pub mod ledger;
