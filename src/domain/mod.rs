//! Domain model: the two reconciliation aggregates, their lifecycle and the
//! persistence port the application layer drives.

pub mod actor;
pub mod matching;
pub mod order;
pub mod ports;
pub mod status;
pub mod transaction;
