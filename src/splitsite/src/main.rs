//! SplitSite: operator CLI for the site's experiments and feature flags.
//!
//! Wires the catalog, the file-backed store and the analytics logger into an
//! engine, runs one command, prints JSON on stdout and flushes analytics
//! before exiting.

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::{Map, Value};
use splitsite_analytics::AnalyticsLogger;
use splitsite_cache::{DisabledStore, FileStore, KeyValueStore};
use splitsite_core::config::AppConfig;
use splitsite_core::event_bus::{noop_sink, EventSink};
use splitsite_experiments::{ExperimentCatalog, ExperimentEngine, StorageKeys};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "splitsite")]
#[command(about = "Deterministic A/B bucketing and feature flags for the site")]
#[command(version)]
struct Cli {
    /// Experiment catalog (TOML or JSON)
    #[arg(long, env = "SPLITSITE_CATALOG")]
    catalog: Option<PathBuf>,

    /// Persistent store file (overrides config)
    #[arg(long, env = "SPLITSITE__STORAGE__PATH")]
    store: Option<String>,

    /// Analytics output file (overrides config)
    #[arg(long, env = "SPLITSITE__ANALYTICS__OUTPUT_PATH")]
    events: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Resolve the variant a visitor sees
    Variant {
        experiment: String,

        /// Visitor id (defaults to the stored anonymous id)
        #[arg(short, long)]
        user: Option<String>,

        /// Print bucket and resolution source as well
        #[arg(long, default_value_t = false)]
        details: bool,
    },

    /// Evaluate a feature flag
    Flag { key: String },

    /// Attribute a conversion to the visitor's assigned variant
    Convert {
        experiment: String,
        event: String,

        #[arg(short, long)]
        user: Option<String>,

        /// Metadata entries as key=value (value parsed as JSON when possible)
        #[arg(short, long = "meta")]
        meta: Vec<String>,
    },

    /// Force or release a variant for an experiment
    Override {
        #[command(subcommand)]
        action: OverrideAction,
    },

    /// Force or release a feature flag value
    FlagOverride {
        #[command(subcommand)]
        action: FlagOverrideAction,
    },

    /// List active experiments
    List,

    /// Show every experiment's override and assignment for a visitor
    Status {
        #[arg(short, long)]
        user: Option<String>,
    },

    /// List feature flags with their effective values
    Flags,

    /// Forget a visitor's assignment so the next read re-buckets
    Reset {
        experiment: String,

        #[arg(short, long)]
        user: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
enum OverrideAction {
    Set { experiment: String, variant: String },
    Clear { experiment: String },
}

#[derive(Subcommand, Debug)]
enum FlagOverrideAction {
    Set {
        key: String,

        /// `true` or `false`
        #[arg(action = clap::ArgAction::Set)]
        enabled: bool,
    },
    Clear { key: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr; stdout carries command output.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "splitsite=info".into()),
        )
        .json()
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = match cli.catalog.as_deref() {
        Some(path) => AppConfig::load(Some(path))
            .with_context(|| format!("failed to load catalog {}", path.display()))?,
        None => AppConfig::load(None).unwrap_or_else(|e| {
            warn!(error = %e, "Failed to load config, using defaults");
            AppConfig::default()
        }),
    };

    // Apply CLI overrides
    if let Some(store) = cli.store {
        config.storage.path = store;
    }
    if let Some(events) = cli.events {
        config.analytics.output_path = events;
    }

    info!(
        store = %config.storage.path,
        experiments = config.experiments.len(),
        flags = config.flags.len(),
        "Configuration loaded"
    );

    let catalog = ExperimentCatalog::from_config(&config)?;

    let store: Arc<dyn KeyValueStore> = match FileStore::open(&config.storage.path) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            warn!(
                error = %e,
                path = %config.storage.path,
                "Store unavailable, running without persistence"
            );
            Arc::new(DisabledStore::new(e.to_string()))
        }
    };

    let logger = match AnalyticsLogger::new(&config.analytics).await {
        Ok(logger) => Some(Arc::new(logger)),
        Err(e) => {
            warn!(error = %e, "Analytics logger unavailable, events will be discarded");
            None
        }
    };
    let sink: Arc<dyn EventSink> = match &logger {
        Some(logger) => logger.clone(),
        None => noop_sink(),
    };

    let engine = ExperimentEngine::new(catalog, store)
        .with_event_sink(sink)
        .with_storage_keys(StorageKeys::from_config(&config.storage));

    let result = run(&engine, cli.command);

    if let Some(logger) = logger {
        logger.shutdown().await;
    }

    print_json(&result?)
}

fn run(engine: &ExperimentEngine, command: Commands) -> anyhow::Result<Value> {
    let output = match command {
        Commands::Variant {
            experiment,
            user,
            details,
        } => {
            if details {
                serde_json::to_value(engine.get_variant_details(&experiment, user.as_deref()))?
            } else {
                engine
                    .get_variant(&experiment, user.as_deref())
                    .cloned()
                    .unwrap_or(Value::Null)
            }
        }
        Commands::Flag { key } => Value::Bool(engine.is_feature_enabled(&key)),
        Commands::Convert {
            experiment,
            event,
            user,
            meta,
        } => {
            let metadata = parse_metadata(&meta)?;
            let tracked =
                engine.track_conversion(&experiment, &event, Some(&metadata), user.as_deref());
            serde_json::json!({ "tracked": tracked })
        }
        Commands::Override { action } => {
            match action {
                OverrideAction::Set {
                    experiment,
                    variant,
                } => engine.set_override(&experiment, &variant)?,
                OverrideAction::Clear { experiment } => engine.clear_override(&experiment)?,
            }
            serde_json::json!({ "ok": true })
        }
        Commands::FlagOverride { action } => {
            match action {
                FlagOverrideAction::Set { key, enabled } => {
                    engine.set_flag_override(&key, enabled)?
                }
                FlagOverrideAction::Clear { key } => engine.clear_flag_override(&key)?,
            }
            serde_json::json!({ "ok": true })
        }
        Commands::List => serde_json::to_value(engine.active_experiments())?,
        Commands::Status { user } => {
            serde_json::to_value(engine.experiment_overview(user.as_deref()))?
        }
        Commands::Flags => serde_json::to_value(engine.flags())?,
        Commands::Reset { experiment, user } => {
            engine.clear_assignment(&experiment, user.as_deref())?;
            serde_json::json!({ "ok": true })
        }
    };
    Ok(output)
}

fn parse_metadata(entries: &[String]) -> anyhow::Result<Map<String, Value>> {
    let mut metadata = Map::new();
    for entry in entries {
        let (key, raw) = entry
            .split_once('=')
            .with_context(|| format!("metadata entry '{entry}' is not key=value"))?;
        let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
        metadata.insert(key.to_string(), value);
    }
    Ok(metadata)
}

fn print_json(value: &impl Serialize) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
