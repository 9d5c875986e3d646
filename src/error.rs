use std::fmt;
use thiserror::Error;

/// The kind of record a lookup failed to find.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    Transaction,
    Order,
    Batch,
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Entity::Transaction => f.write_str("bank transaction"),
            Entity::Order => f.write_str("order"),
            Entity::Batch => f.write_str("batch"),
        }
    }
}

#[derive(Error, Debug)]
pub enum ReconError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: Entity, id: String },
    #[error("Policy violation: {0}")]
    PolicyViolation(String),
    #[error("Persistence failure: {0}")]
    Persistence(String),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[cfg(feature = "storage-rocksdb")]
    #[error("RocksDB error: {0}")]
    RocksDb(#[from] rocksdb::Error),
    #[error("Suggestion run cancelled")]
    Cancelled,
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ReconError {
    pub fn transaction_not_found(hash: impl Into<String>) -> Self {
        Self::NotFound {
            entity: Entity::Transaction,
            id: hash.into(),
        }
    }

    pub fn order_not_found(order_id: impl Into<String>) -> Self {
        Self::NotFound {
            entity: Entity::Order,
            id: order_id.into(),
        }
    }

    pub fn policy(message: impl Into<String>) -> Self {
        Self::PolicyViolation(message.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub fn is_policy_violation(&self) -> bool {
        matches!(self, Self::PolicyViolation(_))
    }

    /// True when the underlying store aborted; the operation may be retried.
    pub fn is_persistence_failure(&self) -> bool {
        match self {
            Self::Persistence(_) | Self::Serialization(_) => true,
            #[cfg(feature = "storage-rocksdb")]
            Self::RocksDb(_) => true,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, ReconError>;
