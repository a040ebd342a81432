use serde::{Deserialize, Serialize};

/// A VM as reported by the director
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instance {
    pub name: String,
    pub ip: String,
    pub state: String,
}
