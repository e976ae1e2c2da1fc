//! Deterministic bucketing.
//!
//! The hash is 32-bit FNV-1a over UTF-8 bytes followed by the MurmurHash3
//! `fmix32` finalizer. It is not cryptographic; it only has to be stable
//! across runs and platforms and spread visitors evenly over the buckets.
//! Changing it reshuffles every visitor that has no stored assignment.

use splitsite_core::types::{ExperimentDefinition, VariantDefinition};

/// Number of buckets allocation weights are expressed against.
pub const BUCKET_COUNT: u32 = 100;

const FNV_OFFSET_BASIS: u32 = 0x811c_9dc5;
const FNV_PRIME: u32 = 0x0100_0193;

#[must_use]
pub fn stable_hash32(input: &str) -> u32 {
    let mut h = FNV_OFFSET_BASIS;
    for b in input.as_bytes() {
        h ^= *b as u32;
        h = h.wrapping_mul(FNV_PRIME);
    }
    fmix32(h)
}

#[inline]
fn fmix32(mut h: u32) -> u32 {
    h ^= h >> 16;
    h = h.wrapping_mul(0x85eb_ca6b);
    h ^= h >> 13;
    h = h.wrapping_mul(0xc2b2_ae35);
    h ^ (h >> 16)
}

/// Bucket in `[0, 100)` for a visitor within one experiment.
#[must_use]
pub fn bucket_for(identifier: &str, experiment_key: &str) -> u8 {
    let hash = stable_hash32(&format!("{identifier}-{experiment_key}"));
    (hash % BUCKET_COUNT) as u8
}

/// Walk variants in declared order and return the first whose cumulative
/// weight exceeds `bucket`. `None` when the bucket lies past the total.
pub fn select_variant(
    experiment: &ExperimentDefinition,
    bucket: u8,
) -> Option<&VariantDefinition> {
    let bucket = bucket as u32;
    let mut cumulative = 0u32;
    for variant in &experiment.variants {
        cumulative = cumulative.saturating_add(variant.weight);
        if bucket < cumulative {
            return Some(variant);
        }
    }
    None
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn experiment(weights: &[(&str, u32)]) -> ExperimentDefinition {
        ExperimentDefinition {
            key: "pricing_cta".into(),
            name: String::new(),
            description: None,
            active: true,
            control: "control".into(),
            variants: weights
                .iter()
                .map(|(name, weight)| VariantDefinition {
                    name: name.to_string(),
                    value: json!(name),
                    weight: *weight,
                })
                .collect(),
        }
    }

    #[test]
    fn test_hash_is_pinned() {
        // Stored assignments depend on these values never changing.
        assert_eq!(stable_hash32(""), 0xab3e_7c0b);
        assert_eq!(stable_hash32("abc"), 0x1cc9_3dbc);
        assert_eq!(bucket_for("visitor-0", "pricing_cta"), 0);
        assert_eq!(bucket_for("visitor-1", "pricing_cta"), 29);
        assert_eq!(bucket_for("user-1", "pricing_cta"), 81);
    }

    #[test]
    fn test_bucket_depends_on_experiment() {
        let a: Vec<u8> = (0..20).map(|n| bucket_for(&format!("v{n}"), "exp_a")).collect();
        let b: Vec<u8> = (0..20).map(|n| bucket_for(&format!("v{n}"), "exp_b")).collect();
        assert_ne!(a, b);
        assert!(a.iter().chain(b.iter()).all(|bucket| *bucket < 100));
    }

    #[test]
    fn test_cumulative_selection() {
        let exp = experiment(&[("control", 40), ("a", 30), ("b", 30)]);
        assert_eq!(select_variant(&exp, 0).unwrap().name, "control");
        assert_eq!(select_variant(&exp, 39).unwrap().name, "control");
        assert_eq!(select_variant(&exp, 40).unwrap().name, "a");
        assert_eq!(select_variant(&exp, 69).unwrap().name, "a");
        assert_eq!(select_variant(&exp, 70).unwrap().name, "b");
        assert_eq!(select_variant(&exp, 99).unwrap().name, "b");
    }

    #[test]
    fn test_under_and_over_allocation() {
        let under = experiment(&[("control", 40), ("a", 40)]);
        assert!(select_variant(&under, 80).is_none());

        let over = experiment(&[("control", 60), ("a", 60), ("b", 10)]);
        let reached: Vec<_> = (0..100u8)
            .filter_map(|b| select_variant(&over, b))
            .map(|v| v.name.as_str())
            .collect();
        assert!(!reached.contains(&"b"));
    }

    #[test]
    fn test_allocation_coverage() {
        let exp = experiment(&[("control", 40), ("a", 30), ("b", 30)]);
        let mut counts = std::collections::HashMap::new();
        for n in 0..10_000 {
            let bucket = bucket_for(&format!("visitor-{n}"), &exp.key);
            let variant = select_variant(&exp, bucket).unwrap();
            *counts.entry(variant.name.clone()).or_insert(0usize) += 1;
        }

        for (name, expected) in [("control", 4000.0), ("a", 3000.0), ("b", 3000.0)] {
            let got = counts[name] as f64;
            assert!(
                (got - expected).abs() <= 300.0,
                "variant {name}: expected ~{expected}, got {got}"
            );
        }
    }
}
