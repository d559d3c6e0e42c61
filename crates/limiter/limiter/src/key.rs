use serde::{Deserialize, Serialize};

use weir_core::LimitName;

/// Logical key addressing one counter or bucket: the limit name plus a
/// caller-supplied partition (e.g. tenant and user).
///
/// This is the sharding unit for every backend. The name comes first in
/// the canonical form so unrelated limits can never collide on a shared
/// partition value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LimitKey {
    pub name: LimitName,
    pub partition: String,
}

impl LimitKey {
    /// Create a new logical key.
    #[must_use]
    pub fn new(name: impl Into<LimitName>, partition: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            partition: partition.into(),
        }
    }

    /// Return the canonical string representation: `name:partition`
    #[must_use]
    pub fn canonical(&self) -> String {
        format!("{}:{}", self.name, self.partition)
    }
}

impl std::fmt::Display for LimitKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.canonical())
    }
}
