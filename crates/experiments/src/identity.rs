//! Anonymous visitor identifiers.

use chrono::Utc;
use rand::distributions::Alphanumeric;
use rand::Rng;

/// Source of fresh anonymous identifiers. Any `Fn() -> String` qualifies,
/// which is how tests pin identifiers.
pub trait IdGenerator: Send + Sync {
    fn generate(&self) -> String;
}

impl<F> IdGenerator for F
where
    F: Fn() -> String + Send + Sync,
{
    fn generate(&self) -> String {
        self()
    }
}

/// `anon_<unix-millis>_<9 lowercase alphanumerics>`.
#[derive(Debug, Default, Clone, Copy)]
pub struct AnonymousIdGenerator;

const SUFFIX_LEN: usize = 9;

impl IdGenerator for AnonymousIdGenerator {
    fn generate(&self) -> String {
        let suffix: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(SUFFIX_LEN)
            .map(|b| (b as char).to_ascii_lowercase())
            .collect();
        format!("anon_{}_{}", Utc::now().timestamp_millis(), suffix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_anonymous_id_format() {
        let id = AnonymousIdGenerator.generate();
        let parts: Vec<&str> = id.split('_').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "anon");
        assert!(parts[1].parse::<i64>().is_ok());
        assert_eq!(parts[2].len(), SUFFIX_LEN);
        assert!(parts[2]
            .chars()
            .all(|c| c.is_ascii_digit() || c.is_ascii_lowercase()));
    }

    #[test]
    fn test_anonymous_ids_are_unique() {
        let ids: HashSet<String> = (0..1000).map(|_| AnonymousIdGenerator.generate()).collect();
        assert_eq!(ids.len(), 1000);
    }

    #[test]
    fn test_closure_generator() {
        let generator = || "fixed-visitor".to_string();
        assert_eq!(generator.generate(), "fixed-visitor");
    }
}
