//! Asynchronous analytics logger that batches experiment events and appends
//! them to a JSON-lines file. Uses a channel-based architecture so emitting
//! never blocks the caller.

use parking_lot::Mutex;
use splitsite_core::config::AnalyticsConfig;
use splitsite_core::event_bus::EventSink;
use splitsite_core::types::AnalyticsEvent;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Analytics logger with background batch writer.
pub struct AnalyticsLogger {
    sender: Mutex<Option<mpsc::Sender<AnalyticsEvent>>>,
    writer: Mutex<Option<JoinHandle<()>>>,
    dropped: AtomicU64,
}

impl AnalyticsLogger {
    /// Create a new analytics logger and spawn the background writer.
    /// Must be called from within a tokio runtime.
    pub async fn new(config: &AnalyticsConfig) -> anyhow::Result<Self> {
        let (sender, receiver) = mpsc::channel::<AnalyticsEvent>(config.channel_capacity.max(1));

        let writer = BatchWriter::open(Path::new(&config.output_path)).await?;
        let batch_size = config.batch_size.max(1);
        let flush_interval = std::time::Duration::from_millis(config.flush_interval_ms.max(1));

        // Spawn background batch writer
        let handle = tokio::spawn(async move {
            writer.run(receiver, batch_size, flush_interval).await;
        });

        info!(output = %config.output_path, "Analytics logger initialized");

        Ok(Self {
            sender: Mutex::new(Some(sender)),
            writer: Mutex::new(Some(handle)),
            dropped: AtomicU64::new(0),
        })
    }

    /// Number of events dropped because the channel was full or closed.
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Close the channel and wait for the writer to flush what it holds.
    /// Events emitted afterwards are dropped.
    pub async fn shutdown(&self) {
        drop(self.sender.lock().take());
        let handle = self.writer.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!(error = %e, "Analytics writer task failed");
            }
        }
    }

    fn record_drop(&self, reason: &dyn std::fmt::Display) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("analytics.dropped").increment(1);
        warn!("Analytics event dropped: {}", reason);
    }
}

impl EventSink for AnalyticsLogger {
    /// Non-blocking: a full or closed channel drops the event.
    fn emit(&self, event: AnalyticsEvent) {
        let guard = self.sender.lock();
        let Some(sender) = guard.as_ref() else {
            self.record_drop(&"logger shut down");
            return;
        };
        if let Err(e) = sender.try_send(event) {
            self.record_drop(&e);
        } else {
            metrics::counter!("analytics.queued").increment(1);
        }
    }
}

/// Background writer that batches events and flushes them to disk.
struct BatchWriter {
    path: PathBuf,
    file: tokio::fs::File,
}

impl BatchWriter {
    async fn open(path: &Path) -> anyhow::Result<Self> {
        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await?;
        Ok(Self {
            path: path.to_path_buf(),
            file,
        })
    }

    async fn run(
        mut self,
        mut receiver: mpsc::Receiver<AnalyticsEvent>,
        batch_size: usize,
        flush_interval: std::time::Duration,
    ) {
        let mut buffer: Vec<AnalyticsEvent> = Vec::with_capacity(batch_size);
        let mut interval = tokio::time::interval(flush_interval);

        loop {
            tokio::select! {
                received = receiver.recv() => match received {
                    Some(event) => {
                        buffer.push(event);
                        if buffer.len() >= batch_size {
                            self.flush(&mut buffer).await;
                        }
                    }
                    None => {
                        self.flush(&mut buffer).await;
                        break;
                    }
                },
                _ = interval.tick() => {
                    if !buffer.is_empty() {
                        self.flush(&mut buffer).await;
                    }
                }
            }
        }

        debug!(path = %self.path.display(), "Analytics writer stopped");
    }

    async fn flush(&mut self, buffer: &mut Vec<AnalyticsEvent>) {
        let count = buffer.len();
        if count == 0 {
            return;
        }
        debug!(count = count, "Flushing analytics batch");

        // One JSON object per line
        let mut payload = String::new();
        for e in buffer.iter() {
            if let Ok(json) = serde_json::to_string(e) {
                payload.push_str(&json);
                payload.push('\n');
            }
        }
        buffer.clear();

        let result = async {
            self.file.write_all(payload.as_bytes()).await?;
            self.file.flush().await
        }
        .await;

        match result {
            Ok(()) => {
                metrics::counter!("analytics.flushed").increment(count as u64);
                debug!(count = count, "Analytics batch flushed successfully");
            }
            Err(e) => {
                metrics::counter!("analytics.flush_errors").increment(1);
                error!(error = %e, count = count, "Failed to flush analytics batch");
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::{json, Map, Value};
    use splitsite_core::event_bus::make_event;
    use splitsite_core::types::EventType;

    fn config_for(path: &Path, batch_size: usize, channel_capacity: usize) -> AnalyticsConfig {
        AnalyticsConfig {
            output_path: path.to_string_lossy().into_owned(),
            batch_size,
            flush_interval_ms: 10,
            channel_capacity,
        }
    }

    fn exposure(variant: &str) -> AnalyticsEvent {
        let mut props = Map::new();
        props.insert("experiment_key".into(), json!("hero_headline"));
        props.insert("variant".into(), json!(variant));
        make_event(EventType::ExperimentExposure, props)
    }

    fn read_lines(path: &Path) -> Vec<Value> {
        std::fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn test_events_written_as_json_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.jsonl");
        let logger = AnalyticsLogger::new(&config_for(&path, 2, 100)).await.unwrap();

        logger.emit(exposure("control"));
        logger.emit(exposure("bold"));
        logger.emit(exposure("control"));
        logger.shutdown().await;

        let lines = read_lines(&path);
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0]["event_type"], json!("experiment_exposure"));
        assert_eq!(lines[1]["properties"]["variant"], json!("bold"));
        assert_eq!(logger.dropped_count(), 0);
    }

    #[tokio::test]
    async fn test_full_channel_drops_instead_of_blocking() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.jsonl");
        let logger = AnalyticsLogger::new(&config_for(&path, 100, 1)).await.unwrap();

        // The writer cannot run until this task yields, so only one fits.
        for _ in 0..5 {
            logger.emit(exposure("control"));
        }
        assert_eq!(logger.dropped_count(), 4);

        logger.shutdown().await;
        assert_eq!(read_lines(&path).len(), 1);
    }

    #[tokio::test]
    async fn test_emit_after_shutdown_is_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.jsonl");
        let logger = AnalyticsLogger::new(&config_for(&path, 10, 10)).await.unwrap();

        logger.shutdown().await;
        logger.emit(exposure("control"));

        assert_eq!(logger.dropped_count(), 1);
        assert!(read_lines(&path).is_empty());
    }
}
