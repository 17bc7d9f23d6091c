use serde::{Deserialize, Serialize};
use strum::AsRefStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr)]
pub enum OperationMode {
    Purchasing,
    Restoring,
}

/// Correlates a purchase/restore call with the store callbacks it causes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OperationToken(Uuid);

impl OperationToken {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for OperationToken {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for OperationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
