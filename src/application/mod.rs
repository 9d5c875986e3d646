//! Application layer containing the reconciliation logic.
//!
//! `scorer` and `policy` are pure. `suggestions` and `ledger` drive the
//! store through units of work, and `engine` is the facade callers use.

pub mod batch;
pub mod engine;
pub mod ledger;
pub mod policy;
pub mod scorer;
pub mod suggestions;
