use std::collections::HashMap;

/// Trait for external feature-flag sources.
///
/// The engine only consumes a boolean "is this gate active" signal; flag
/// storage and evaluation live elsewhere.
pub trait FlagSource: Send + Sync {
    /// Return the flag's state, or `None` when the flag is unknown to
    /// this source. The caller applies its configured fallback for
    /// unknown flags.
    fn is_enabled(&self, flag: &str) -> Option<bool>;
}

/// Fixed flag table, for configuration files and tests.
#[derive(Debug, Clone, Default)]
pub struct StaticFlags {
    flags: HashMap<String, bool>,
}

impl StaticFlags {
    /// Create an empty flag table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a flag entry.
    #[must_use]
    pub fn with(mut self, flag: impl Into<String>, enabled: bool) -> Self {
        self.flags.insert(flag.into(), enabled);
        self
    }
}

impl FlagSource for StaticFlags {
    fn is_enabled(&self, flag: &str) -> Option<bool> {
        self.flags.get(flag).copied()
    }
}

impl FromIterator<(String, bool)> for StaticFlags {
    fn from_iter<I: IntoIterator<Item = (String, bool)>>(iter: I) -> Self {
        Self {
            flags: iter.into_iter().collect(),
        }
    }
}
