//! Local persistence: the upload ledger and the storage budget.

pub mod ledger;
pub mod manager;
