//! Storage adapters implementing [`crate::domain::ports::ReconciliationStore`].

pub mod in_memory;
#[cfg(feature = "storage-rocksdb")]
pub mod rocksdb;
mod staging;
