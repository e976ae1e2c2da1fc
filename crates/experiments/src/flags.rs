//! Feature flags: static defaults with a stored per-browser override.

use serde::Serialize;
use splitsite_core::error::{SplitSiteError, SplitSiteResult};
use tracing::{debug, info};

use crate::engine::ExperimentEngine;

/// Flag evaluation for the admin surface.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct FlagStatus {
    pub key: String,
    pub description: Option<String>,
    pub default: bool,
    pub override_value: Option<bool>,
    pub enabled: bool,
}

fn parse_override(raw: &str) -> Option<bool> {
    match raw {
        "true" => Some(true),
        "false" => Some(false),
        _ => None,
    }
}

impl ExperimentEngine {
    /// Stored override if it parses, else the static default, else `false`.
    pub fn is_feature_enabled(&self, flag_key: &str) -> bool {
        if let Some(enabled) = self.flag_override(flag_key) {
            return enabled;
        }
        self.catalog()
            .flag(flag_key)
            .map(|flag| flag.default)
            .unwrap_or(false)
    }

    /// The stored override, ignoring anything other than `"true"`/`"false"`.
    pub fn flag_override(&self, flag_key: &str) -> Option<bool> {
        let raw = self.read_key(&self.keys.flag_override(flag_key))?;
        let parsed = parse_override(&raw);
        if parsed.is_none() && !raw.is_empty() {
            debug!(flag = %flag_key, value = %raw, "Ignoring malformed flag override");
        }
        parsed
    }

    pub fn set_flag_override(&self, flag_key: &str, enabled: bool) -> SplitSiteResult<()> {
        if self.catalog().flag(flag_key).is_none() {
            return Err(SplitSiteError::UnknownFlag(flag_key.to_string()));
        }
        self.store
            .set(&self.keys.flag_override(flag_key), if enabled { "true" } else { "false" })?;
        info!(flag = %flag_key, enabled = enabled, "Feature flag override set");
        Ok(())
    }

    /// Remove the override; the static default applies again.
    pub fn clear_flag_override(&self, flag_key: &str) -> SplitSiteResult<()> {
        self.store.remove(&self.keys.flag_override(flag_key))?;
        info!(flag = %flag_key, "Feature flag override cleared");
        Ok(())
    }

    /// Every declared flag in catalog order.
    pub fn flags(&self) -> Vec<FlagStatus> {
        self.catalog()
            .flags()
            .iter()
            .map(|flag| {
                let override_value = self.flag_override(&flag.key);
                FlagStatus {
                    key: flag.key.clone(),
                    description: flag.description.clone(),
                    default: flag.default,
                    override_value,
                    enabled: override_value.unwrap_or(flag.default),
                }
            })
            .collect()
    }
}
