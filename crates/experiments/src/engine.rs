//! Experimentation engine for A/B/n testing.
//!
//! Resolution order for a visitor, first match wins: unknown or inactive
//! experiment (control), manual override, stored assignment, fresh bucketing.
//! Only fresh bucketing persists an assignment and emits an exposure event.
//! Storage failures read as "nothing stored" and never reach the caller.

use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::{json, Map, Value};
use splitsite_cache::KeyValueStore;
use splitsite_core::error::{SplitSiteError, SplitSiteResult};
use splitsite_core::event_bus::{make_event, noop_sink, EventSink};
use splitsite_core::types::{EventType, ExperimentDefinition, VariantDefinition};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::catalog::ExperimentCatalog;
use crate::hash::{bucket_for, select_variant};
use crate::identity::{AnonymousIdGenerator, IdGenerator};
use crate::keys::StorageKeys;

/// Upper bound on assignments held in memory while the store refuses writes.
/// Visitors past it are re-bucketed deterministically on every read.
const SESSION_ASSIGNMENT_LIMIT: usize = 1024;

/// Which step of the resolution order produced a variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionSource {
    UnknownExperiment,
    Inactive,
    Override,
    Stored,
    Computed,
    /// Bucket fell past the cumulative allocation; control was assigned.
    Fallback,
}

#[derive(Debug, Clone, Serialize)]
pub struct VariantResolution {
    pub experiment_key: String,
    pub variant: Option<String>,
    pub value: Option<Value>,
    pub bucket: Option<u8>,
    pub user_id: Option<String>,
    pub source: ResolutionSource,
}

/// Entry of the admin listing of active experiments.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ExperimentSummary {
    pub key: String,
    pub name: String,
    pub variants: Vec<String>,
}

/// Per-visitor view of one experiment for the admin surface.
#[derive(Debug, Clone, Serialize)]
pub struct ExperimentOverview {
    pub key: String,
    pub name: String,
    pub active: bool,
    pub variants: Vec<String>,
    pub override_variant: Option<String>,
    pub assigned_variant: Option<String>,
    /// `None` when no identifier was given and no anonymous id exists yet.
    pub bucket: Option<u8>,
}

struct Resolved<'a> {
    variant: Option<&'a VariantDefinition>,
    bucket: Option<u8>,
    user_id: Option<String>,
    source: ResolutionSource,
}

pub struct ExperimentEngine {
    catalog: ExperimentCatalog,
    pub(crate) store: Arc<dyn KeyValueStore>,
    event_sink: Arc<dyn EventSink>,
    pub(crate) keys: StorageKeys,
    id_generator: Box<dyn IdGenerator>,
    session_user_id: Mutex<Option<String>>,
    /// Assignments the store refused to persist, keyed by storage slot.
    /// Bounded by `SESSION_ASSIGNMENT_LIMIT`.
    session_assignments: DashMap<String, String>,
}

impl ExperimentEngine {
    pub fn new(catalog: ExperimentCatalog, store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            catalog,
            store,
            event_sink: noop_sink(),
            keys: StorageKeys::default(),
            id_generator: Box::new(AnonymousIdGenerator),
            session_user_id: Mutex::new(None),
            session_assignments: DashMap::new(),
        }
    }

    /// Attach an event sink for exposure and conversion events.
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.event_sink = sink;
        self
    }

    pub fn with_storage_keys(mut self, keys: StorageKeys) -> Self {
        self.keys = keys;
        self
    }

    pub fn with_id_generator(mut self, generator: impl IdGenerator + 'static) -> Self {
        self.id_generator = Box::new(generator);
        self
    }

    pub fn catalog(&self) -> &ExperimentCatalog {
        &self.catalog
    }

    /// Value of the variant this visitor sees. `None` only when the
    /// experiment is unknown or has no usable control variant.
    pub fn get_variant(&self, experiment_key: &str, identifier: Option<&str>) -> Option<&Value> {
        self.resolve(experiment_key, identifier)
            .variant
            .map(|v| &v.value)
    }

    /// Same resolution as [`get_variant`](Self::get_variant), reporting how
    /// the variant was reached.
    pub fn get_variant_details(
        &self,
        experiment_key: &str,
        identifier: Option<&str>,
    ) -> VariantResolution {
        let resolved = self.resolve(experiment_key, identifier);
        VariantResolution {
            experiment_key: experiment_key.to_string(),
            variant: resolved.variant.map(|v| v.name.clone()),
            value: resolved.variant.map(|v| v.value.clone()),
            bucket: resolved.bucket,
            user_id: resolved.user_id,
            source: resolved.source,
        }
    }

    /// The anonymous identifier of this browser, created and persisted on
    /// first use. Memoised so an unavailable store still yields one id per
    /// engine.
    pub fn user_id(&self) -> String {
        let mut cached = self.session_user_id.lock();
        if let Some(id) = cached.as_ref() {
            return id.clone();
        }

        let key = self.keys.user_id();
        let id = match self.read_key(&key) {
            Some(id) if !id.is_empty() => id,
            _ => {
                let id = self.id_generator.generate();
                self.write_key(&key, &id);
                debug!(user_id = %id, "Anonymous visitor id created");
                id
            }
        };
        *cached = Some(id.clone());
        id
    }

    /// The anonymous id if one is memoised or stored. Never creates one.
    fn existing_user_id(&self) -> Option<String> {
        if let Some(id) = self.session_user_id.lock().as_ref() {
            return Some(id.clone());
        }
        self.read_key(&self.keys.user_id()).filter(|id| !id.is_empty())
    }

    fn resolve_user_id(&self, identifier: Option<&str>) -> String {
        match identifier {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => self.user_id(),
        }
    }

    fn resolve(&self, experiment_key: &str, identifier: Option<&str>) -> Resolved<'_> {
        let Some(experiment) = self.catalog.experiment(experiment_key) else {
            debug!(experiment = %experiment_key, "Unknown experiment");
            return Resolved {
                variant: None,
                bucket: None,
                user_id: None,
                source: ResolutionSource::UnknownExperiment,
            };
        };

        if !experiment.active {
            return Resolved {
                variant: experiment.control_variant(),
                bucket: None,
                user_id: None,
                source: ResolutionSource::Inactive,
            };
        }

        if let Some(variant) = self.read_override(experiment) {
            return Resolved {
                variant: Some(variant),
                bucket: None,
                user_id: None,
                source: ResolutionSource::Override,
            };
        }

        let user_id = self.resolve_user_id(identifier);
        let bucket = bucket_for(&user_id, &experiment.key);
        let slot = self.keys.assignment(&experiment.key, &user_id, bucket);

        if let Some(name) = self.lookup_assignment(&slot) {
            match experiment.variant(&name) {
                Some(variant) => {
                    return Resolved {
                        variant: Some(variant),
                        bucket: Some(bucket),
                        user_id: Some(user_id),
                        source: ResolutionSource::Stored,
                    }
                }
                None => debug!(
                    experiment = %experiment.key,
                    stored = %name,
                    "Stored variant no longer exists; reassigning"
                ),
            }
        }

        let (variant, source) = match select_variant(experiment, bucket) {
            Some(variant) => (Some(variant), ResolutionSource::Computed),
            None => (experiment.control_variant(), ResolutionSource::Fallback),
        };

        if let Some(variant) = variant {
            self.persist_assignment(&slot, &variant.name);
            self.emit_exposure(experiment, variant, bucket, &user_id);
        }

        Resolved {
            variant,
            bucket: Some(bucket),
            user_id: Some(user_id),
            source,
        }
    }

    fn read_override<'a>(&self, experiment: &'a ExperimentDefinition) -> Option<&'a VariantDefinition> {
        let name = self.read_key(&self.keys.experiment_override(&experiment.key))?;
        if name.is_empty() {
            return None;
        }
        let variant = experiment.variant(&name);
        if variant.is_none() {
            debug!(
                experiment = %experiment.key,
                override_variant = %name,
                "Ignoring override naming an unknown variant"
            );
        }
        variant
    }

    fn lookup_assignment(&self, slot: &str) -> Option<String> {
        self.read_key(slot)
            .or_else(|| self.session_assignments.get(slot).map(|v| v.value().clone()))
    }

    fn persist_assignment(&self, slot: &str, variant: &str) {
        if self.write_key(slot, variant) {
            self.session_assignments.remove(slot);
        } else if self.session_assignments.len() < SESSION_ASSIGNMENT_LIMIT
            || self.session_assignments.contains_key(slot)
        {
            self.session_assignments
                .insert(slot.to_string(), variant.to_string());
        } else {
            metrics::counter!("experiments.session_cache_full").increment(1);
            debug!(slot = %slot, "Session assignment cache full; assignment not retained");
        }
    }

    fn emit_exposure(
        &self,
        experiment: &ExperimentDefinition,
        variant: &VariantDefinition,
        bucket: u8,
        user_id: &str,
    ) {
        let mut properties = Map::new();
        properties.insert("experiment_key".into(), json!(experiment.key));
        properties.insert("experiment_name".into(), json!(experiment.display_name()));
        properties.insert("variant".into(), json!(variant.name));
        properties.insert("user_bucket".into(), json!(bucket));
        properties.insert("user_id".into(), json!(user_id));

        metrics::counter!("experiments.exposures").increment(1);
        debug!(
            experiment = %experiment.key,
            variant = %variant.name,
            bucket = bucket,
            "Experiment exposure"
        );
        self.event_sink
            .emit(make_event(EventType::ExperimentExposure, properties));
    }

    /// Attribute a goal to the visitor's stored assignment. Returns whether
    /// an `experiment_conversion` event was emitted; nothing is emitted for
    /// visitors who were never bucketed or for inactive experiments.
    pub fn track_conversion(
        &self,
        experiment_key: &str,
        conversion_event: &str,
        metadata: Option<&Map<String, Value>>,
        identifier: Option<&str>,
    ) -> bool {
        let Some(experiment) = self.catalog.experiment(experiment_key) else {
            return false;
        };
        if !experiment.active {
            return false;
        }

        let user_id = self.resolve_user_id(identifier);
        let bucket = bucket_for(&user_id, &experiment.key);
        let slot = self.keys.assignment(&experiment.key, &user_id, bucket);
        let Some(variant) = self
            .lookup_assignment(&slot)
            .filter(|name| experiment.variant(name).is_some())
        else {
            debug!(
                experiment = %experiment.key,
                conversion_event = %conversion_event,
                "No assignment on record; conversion not attributed"
            );
            return false;
        };

        // Metadata first so the attribution fields cannot be overwritten.
        let mut properties = metadata.cloned().unwrap_or_default();
        properties.insert("experiment_key".into(), json!(experiment.key));
        properties.insert("variant".into(), json!(variant));
        properties.insert("conversion_event".into(), json!(conversion_event));
        properties.insert("user_id".into(), json!(user_id));

        metrics::counter!("experiments.conversions").increment(1);
        self.event_sink
            .emit(make_event(EventType::ExperimentConversion, properties));
        true
    }

    // ─── Admin surface ──────────────────────────────────────────────────

    /// Force `variant` for every visitor of this experiment.
    pub fn set_override(&self, experiment_key: &str, variant: &str) -> SplitSiteResult<()> {
        let experiment = self.known_experiment(experiment_key)?;
        if experiment.variant(variant).is_none() {
            return Err(SplitSiteError::UnknownVariant {
                experiment: experiment_key.to_string(),
                variant: variant.to_string(),
            });
        }
        self.store
            .set(&self.keys.experiment_override(experiment_key), variant)?;
        info!(experiment = %experiment_key, variant = %variant, "Experiment override set");
        Ok(())
    }

    /// Blank the override slot; bucketing applies again.
    pub fn clear_override(&self, experiment_key: &str) -> SplitSiteResult<()> {
        self.known_experiment(experiment_key)?;
        self.store
            .set(&self.keys.experiment_override(experiment_key), "")?;
        info!(experiment = %experiment_key, "Experiment override cleared");
        Ok(())
    }

    /// Forget the visitor's assignment so the next read re-buckets and emits
    /// a fresh exposure.
    pub fn clear_assignment(
        &self,
        experiment_key: &str,
        identifier: Option<&str>,
    ) -> SplitSiteResult<()> {
        let experiment = self.known_experiment(experiment_key)?;
        let user_id = self.resolve_user_id(identifier);
        let bucket = bucket_for(&user_id, &experiment.key);
        let slot = self.keys.assignment(&experiment.key, &user_id, bucket);
        self.session_assignments.remove(&slot);
        self.store.remove(&slot)?;
        info!(experiment = %experiment_key, user_id = %user_id, "Assignment cleared");
        Ok(())
    }

    /// Active experiments in catalog order.
    pub fn active_experiments(&self) -> Vec<ExperimentSummary> {
        self.catalog
            .experiments()
            .iter()
            .filter(|e| e.active)
            .map(|e| ExperimentSummary {
                key: e.key.clone(),
                name: e.display_name().to_string(),
                variants: e.variant_names(),
            })
            .collect()
    }

    /// Read-only status of every experiment for one visitor. Without an
    /// identifier the stored anonymous id is used; none is created, so a
    /// fresh browser reports no bucket and no assignment.
    pub fn experiment_overview(&self, identifier: Option<&str>) -> Vec<ExperimentOverview> {
        let user_id = match identifier {
            Some(id) if !id.is_empty() => Some(id.to_string()),
            _ => self.existing_user_id(),
        };
        self.catalog
            .experiments()
            .iter()
            .map(|experiment| {
                let bucket = user_id.as_deref().map(|id| bucket_for(id, &experiment.key));
                let assigned_variant = match (user_id.as_deref(), bucket) {
                    (Some(id), Some(bucket)) => self
                        .lookup_assignment(&self.keys.assignment(&experiment.key, id, bucket))
                        .filter(|name| experiment.variant(name).is_some()),
                    _ => None,
                };
                ExperimentOverview {
                    key: experiment.key.clone(),
                    name: experiment.display_name().to_string(),
                    active: experiment.active,
                    variants: experiment.variant_names(),
                    override_variant: self.read_override(experiment).map(|v| v.name.clone()),
                    assigned_variant,
                    bucket,
                }
            })
            .collect()
    }

    fn known_experiment(&self, experiment_key: &str) -> SplitSiteResult<&ExperimentDefinition> {
        self.catalog
            .experiment(experiment_key)
            .ok_or_else(|| SplitSiteError::UnknownExperiment(experiment_key.to_string()))
    }

    // ─── Best-effort storage ────────────────────────────────────────────

    pub(crate) fn read_key(&self, key: &str) -> Option<String> {
        match self.store.get(key) {
            Ok(value) => value,
            Err(e) => {
                metrics::counter!("experiments.store_errors").increment(1);
                warn!(key = %key, error = %e, "Storage read failed; treating as absent");
                None
            }
        }
    }

    pub(crate) fn write_key(&self, key: &str, value: &str) -> bool {
        match self.store.set(key, value) {
            Ok(()) => true,
            Err(e) => {
                metrics::counter!("experiments.store_errors").increment(1);
                warn!(key = %key, error = %e, "Storage write failed");
                false
            }
        }
    }
}
