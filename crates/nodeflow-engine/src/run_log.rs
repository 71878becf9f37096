use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use nodeflow_core::event::EventBus;
use nodeflow_core::types::FlowEvent;

/// JSONL run logger.
///
/// Subscribes to the EventBus and appends one JSON object per line to
/// `{log_dir}/{timestamp}.jsonl`. Stops after the first `flow-finished`.
pub struct RunLogger {
    log_dir: PathBuf,
    level: u8,
}

#[derive(Serialize)]
struct LogEntry {
    timestamp: String,
    run_id: String,
    event_type: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    node_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<serde_json::Value>,
}

impl RunLogger {
    /// `level`: 1 = run summary, 2 = per node, 3 = gate activity.
    pub fn new(log_dir: PathBuf, level: u8) -> Self {
        Self { log_dir, level }
    }

    /// Run as a background task until cancelled or the run finishes.
    /// Returns the path written, if the file could be opened.
    pub async fn run(self, event_bus: Arc<EventBus>, cancel: CancellationToken) -> Option<PathBuf> {
        let rx = event_bus.subscribe();
        self.write_events(rx, cancel).await
    }

    /// Subscribe now and log on a spawned task, so no event published after
    /// this call is missed.
    pub fn spawn(
        self,
        event_bus: &EventBus,
        cancel: CancellationToken,
    ) -> tokio::task::JoinHandle<Option<PathBuf>> {
        let rx = event_bus.subscribe();
        tokio::spawn(self.write_events(rx, cancel))
    }

    async fn write_events(
        self,
        mut rx: broadcast::Receiver<FlowEvent>,
        cancel: CancellationToken,
    ) -> Option<PathBuf> {
        if let Err(e) = tokio::fs::create_dir_all(&self.log_dir).await {
            error!(error = %e, "Failed to create log directory");
            return None;
        }

        let timestamp = Utc::now().format("%Y%m%d_%H%M%S_%3f").to_string();
        let log_path = self.log_dir.join(format!("{}.jsonl", timestamp));

        let file = match tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)
            .await
        {
            Ok(f) => f,
            Err(e) => {
                error!(error = %e, path = %log_path.display(), "Failed to open log file");
                return None;
            }
        };

        info!(path = %log_path.display(), "RunLogger started");

        let mut writer = tokio::io::BufWriter::new(file);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("RunLogger cancelled");
                    break;
                }
                result = rx.recv() => {
                    match result {
                        Ok(event) => {
                            let Some(entry) = self.event_to_entry(&event) else {
                                continue;
                            };

                            if let Ok(json) = serde_json::to_string(&entry) {
                                let line = format!("{}\n", json);
                                if let Err(e) = writer.write_all(line.as_bytes()).await {
                                    error!(error = %e, "Failed to write log entry");
                                    break;
                                }
                                if let Err(e) = writer.flush().await {
                                    error!(error = %e, "Failed to flush log");
                                }
                            }

                            if matches!(event, FlowEvent::FlowFinished { .. }) {
                                break;
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            debug!(skipped = n, "RunLogger lagged, skipped events");
                        }
                        Err(broadcast::error::RecvError::Closed) => {
                            debug!("EventBus closed, RunLogger stopping");
                            break;
                        }
                    }
                }
            }
        }

        writer.flush().await.ok();
        debug!(path = %log_path.display(), "RunLogger finished");
        Some(log_path)
    }

    fn event_to_entry(&self, event: &FlowEvent) -> Option<LogEntry> {
        let entry = |node_id: Option<&String>, detail: Option<serde_json::Value>| LogEntry {
            timestamp: Utc::now().to_rfc3339(),
            run_id: event.run_id().to_string(),
            event_type: event.kind(),
            node_id: node_id.cloned(),
            detail,
        };

        match event {
            FlowEvent::FlowStarted {
                start_node_id,
                mode,
                node_count,
                ..
            } => Some(entry(
                Some(start_node_id),
                Some(serde_json::json!({ "mode": mode, "nodeCount": node_count })),
            )),
            FlowEvent::FlowFinished {
                status,
                executed,
                duration_ms,
                ..
            } => Some(entry(
                None,
                Some(serde_json::json!({
                    "status": status,
                    "executed": executed,
                    "durationMs": duration_ms,
                })),
            )),
            FlowEvent::Warning { message, .. } => {
                Some(entry(None, Some(serde_json::json!({ "message": message }))))
            }

            FlowEvent::NodeStarted { node_id, kind, .. } if self.level >= 2 => {
                Some(entry(Some(node_id), Some(serde_json::json!({ "kind": kind }))))
            }
            FlowEvent::NodeFinished {
                node_id,
                result_type,
                summary,
                duration_ms,
                ..
            } if self.level >= 2 => Some(entry(
                Some(node_id),
                Some(serde_json::json!({
                    "resultType": result_type,
                    "summary": truncate_str(summary, 200),
                    "durationMs": duration_ms,
                })),
            )),

            FlowEvent::Paused { node_id, reason, .. } if self.level >= 3 => {
                Some(entry(Some(node_id), Some(serde_json::json!({ "reason": reason }))))
            }
            FlowEvent::Resumed { node_id, .. } if self.level >= 3 => Some(entry(Some(node_id), None)),

            _ => None,
        }
    }
}

/// Truncate on a char boundary.
fn truncate_str(s: &str, max_len: usize) -> &str {
    if s.len() <= max_len {
        return s;
    }
    let mut end = max_len;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
