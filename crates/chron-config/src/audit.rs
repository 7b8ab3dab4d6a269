//! Engine behavior settings.

use chron_core::enums::LateAttribution;
use serde::{Deserialize, Serialize};

/// Default attempts for dictionary get-or-create.
const fn default_dictionary_retry_attempts() -> u32 {
    4
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuditConfig {
    /// What to do with a user/description supplied after the changeset exists.
    #[serde(default)]
    pub late_attribution: LateAttribution,

    /// Attempts for table/field/user get-or-create before giving up.
    #[serde(default = "default_dictionary_retry_attempts")]
    pub dictionary_retry_attempts: u32,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            late_attribution: LateAttribution::default(),
            dictionary_retry_attempts: default_dictionary_retry_attempts(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_correct() {
        let config = AuditConfig::default();
        assert_eq!(config.late_attribution, LateAttribution::Warn);
        assert_eq!(config.dictionary_retry_attempts, 4);
    }
}
