use serde::{Deserialize, Serialize};

/// The authenticated identity on whose behalf a ledger operation runs.
///
/// Authentication happens upstream; the core only records `id` and checks
/// `privileged` where an operation needs it.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone)]
pub struct Actor {
    pub id: String,
    pub privileged: bool,
}

impl Actor {
    pub fn operator(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            privileged: false,
        }
    }

    pub fn admin(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            privileged: true,
        }
    }

    /// Internal jobs such as the suggestion run.
    pub fn system() -> Self {
        Self::operator("system")
    }
}
