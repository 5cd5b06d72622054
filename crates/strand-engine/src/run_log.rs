use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tokio::sync::broadcast::Receiver;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use strand_core::event::{EventBus, WorkflowEvent};

/// JSONL run-trajectory logger.
///
/// Subscribes to the EventBus and appends one JSON object per workflow event
/// to `{log_dir}/runs_{timestamp}.jsonl`. Lines are flushed as they are
/// written, so a crash loses at most the event in flight.
pub struct RunLogger {
    log_dir: PathBuf,
}

#[derive(Serialize)]
struct LogEntry {
    timestamp: String,
    run_id: String,
    event_type: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<serde_json::Value>,
}

impl RunLogger {
    pub fn new(log_dir: impl Into<PathBuf>) -> Self {
        Self {
            log_dir: log_dir.into(),
        }
    }

    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }

    /// Subscribe to `event_bus` and log on a background task until cancelled
    /// or the bus closes.
    pub fn spawn(self, event_bus: &EventBus, cancel: CancellationToken) -> JoinHandle<()> {
        let rx = event_bus.subscribe();
        tokio::spawn(self.run(rx, cancel))
    }

    async fn run(self, mut rx: Receiver<WorkflowEvent>, cancel: CancellationToken) {
        if let Err(e) = tokio::fs::create_dir_all(&self.log_dir).await {
            error!(error = %e, "Failed to create log directory");
            return;
        }

        let timestamp = Utc::now().format("%Y%m%d_%H%M%S").to_string();
        let log_path = self.log_dir.join(format!("runs_{}.jsonl", timestamp));

        let file = match tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)
            .await
        {
            Ok(f) => f,
            Err(e) => {
                error!(error = %e, path = %log_path.display(), "Failed to open log file");
                return;
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
                            let entry = event_to_entry(&event);
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
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                            debug!(skipped = n, "RunLogger lagged, skipped events");
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Closed) => {
                            debug!("EventBus closed, RunLogger stopping");
                            break;
                        }
                    }
                }
            }
        }

        writer.flush().await.ok();
        debug!(path = %log_path.display(), "RunLogger finished");
    }
}

fn event_to_entry(event: &WorkflowEvent) -> LogEntry {
    let (event_type, detail) = match event {
        WorkflowEvent::RunStarted { graph_id, .. } => {
            ("run_started", Some(serde_json::json!({ "graph_id": graph_id })))
        }
        WorkflowEvent::StepCompleted {
            step, node, tool, ..
        } => (
            "step_completed",
            Some(serde_json::json!({ "step": step, "node": node, "tool": tool })),
        ),
        WorkflowEvent::RunCompleted { steps, status, .. } => (
            "run_completed",
            Some(serde_json::json!({ "steps": steps, "status": status })),
        ),
        WorkflowEvent::RunFailed { node, failure, .. } => (
            "run_failed",
            Some(serde_json::json!({
                "node": node,
                "kind": failure.kind,
                "message": failure.message,
            })),
        ),
    };

    LogEntry {
        timestamp: Utc::now().to_rfc3339(),
        run_id: event.run_id().to_string(),
        event_type,
        detail,
    }
}
