use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Conventional name of the variant every degraded path falls back to.
pub const DEFAULT_CONTROL_VARIANT: &str = "control";

// ─── Experimentation ────────────────────────────────────────────────────

/// A/B/n experiment definition, authored in the catalog and immutable at
/// runtime.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExperimentDefinition {
    pub key: String,
    /// Display name; falls back to `key` when empty.
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(default = "default_control")]
    pub control: String,
    /// Bucketing walks variants in this order.
    pub variants: Vec<VariantDefinition>,
}

/// One treatment of an experiment together with its traffic weight.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VariantDefinition {
    pub name: String,
    /// Payload handed to callers when this variant is selected.
    #[serde(default)]
    pub value: serde_json::Value,
    /// Percentage of the 100 buckets allocated to this variant.
    #[serde(default)]
    pub weight: u32,
}

impl ExperimentDefinition {
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            &self.key
        } else {
            &self.name
        }
    }

    pub fn variant(&self, name: &str) -> Option<&VariantDefinition> {
        self.variants.iter().find(|v| v.name == name)
    }

    pub fn control_variant(&self) -> Option<&VariantDefinition> {
        self.variant(&self.control)
    }

    pub fn variant_names(&self) -> Vec<String> {
        self.variants.iter().map(|v| v.name.clone()).collect()
    }

    /// Sum of variant weights, saturating at `u32::MAX`.
    pub fn total_weight(&self) -> u32 {
        self.variants
            .iter()
            .fold(0u32, |total, v| total.saturating_add(v.weight))
    }
}

/// Named boolean with a static default.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FeatureFlagDefinition {
    pub key: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub default: bool,
}

fn default_active() -> bool {
    true
}

fn default_control() -> String {
    DEFAULT_CONTROL_VARIANT.to_string()
}

// ─── Analytics ──────────────────────────────────────────────────────────

/// Analytics event handed to an [`EventSink`](crate::event_bus::EventSink).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyticsEvent {
    pub event_id: Uuid,
    pub event_type: EventType,
    /// Flat property bag, serialised as-is by sinks.
    pub properties: serde_json::Map<String, serde_json::Value>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    ExperimentExposure,
    ExperimentConversion,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::ExperimentExposure => "experiment_exposure",
            EventType::ExperimentConversion => "experiment_conversion",
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl AnalyticsEvent {
    /// Convenience accessor for string-valued properties.
    pub fn property_str(&self, name: &str) -> Option<&str> {
        self.properties.get(name).and_then(|v| v.as_str())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_definition_defaults() {
        let def: ExperimentDefinition = serde_json::from_value(json!({
            "key": "hero_headline",
            "variants": [
                { "name": "control", "value": "Ship faster", "weight": 50 },
                { "name": "bold", "value": "Ship twice as fast", "weight": 50 }
            ]
        }))
        .unwrap();

        assert!(def.active);
        assert_eq!(def.control, "control");
        assert_eq!(def.display_name(), "hero_headline");
        assert_eq!(def.total_weight(), 100);
        assert_eq!(def.control_variant().unwrap().value, json!("Ship faster"));
        assert_eq!(def.variant_names(), vec!["control", "bold"]);
    }

    #[test]
    fn test_event_type_wire_names() {
        assert_eq!(
            serde_json::to_value(EventType::ExperimentExposure).unwrap(),
            json!("experiment_exposure")
        );
        assert_eq!(EventType::ExperimentConversion.to_string(), "experiment_conversion");
    }
}
