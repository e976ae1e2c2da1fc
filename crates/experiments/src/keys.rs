//! Storage key layout shared by every engine writing to the same store.

use splitsite_core::config::{AssignmentScope, StorageConfig};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageKeys {
    prefix: String,
    scope: AssignmentScope,
}

impl Default for StorageKeys {
    fn default() -> Self {
        Self::new("splitsite", AssignmentScope::Visitor)
    }
}

impl StorageKeys {
    pub fn new(prefix: impl Into<String>, scope: AssignmentScope) -> Self {
        Self {
            prefix: prefix.into(),
            scope,
        }
    }

    pub fn from_config(config: &StorageConfig) -> Self {
        Self::new(config.key_prefix.clone(), config.assignment_scope)
    }

    pub fn scope(&self) -> AssignmentScope {
        self.scope
    }

    pub fn user_id(&self) -> String {
        format!("{}_user_id", self.prefix)
    }

    /// Slot holding the computed assignment for a visitor.
    pub fn assignment(&self, experiment_key: &str, identifier: &str, bucket: u8) -> String {
        match self.scope {
            AssignmentScope::Visitor => {
                format!("{}_exp_{}_user_{}", self.prefix, experiment_key, identifier)
            }
            AssignmentScope::Bucket => format!("{}_exp_{}_{}", self.prefix, experiment_key, bucket),
        }
    }

    pub fn experiment_override(&self, experiment_key: &str) -> String {
        format!("{}_exp_override_{}", self.prefix, experiment_key)
    }

    pub fn flag_override(&self, flag_key: &str) -> String {
        format!("{}_flag_{}", self.prefix, flag_key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout() {
        let visitor = StorageKeys::default();
        assert_eq!(visitor.user_id(), "splitsite_user_id");
        assert_eq!(
            visitor.assignment("hero", "anon_1_x", 42),
            "splitsite_exp_hero_user_anon_1_x"
        );
        assert_eq!(visitor.experiment_override("hero"), "splitsite_exp_override_hero");
        assert_eq!(visitor.flag_override("beta"), "splitsite_flag_beta");

        let bucket = StorageKeys::new("site", AssignmentScope::Bucket);
        assert_eq!(bucket.assignment("hero", "anon_1_x", 42), "site_exp_hero_42");
    }
}
