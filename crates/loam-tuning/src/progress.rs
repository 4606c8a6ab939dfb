use crate::job::JobId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEvent {
    Started { job_id: JobId },
    Message { job_id: JobId, message: String },
    Step { job_id: JobId, step: u64, total: u64, loss: f64, lr: f64 },
    Checkpoint { job_id: JobId, step: u64 },
    Finished { job_id: JobId },
}

pub trait ProgressSink: Send + Sync {
    fn on_event(&self, event: ProgressEvent);
}

#[derive(Debug, Default)]
pub struct StdoutProgressSink;

impl ProgressSink for StdoutProgressSink {
    fn on_event(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::Started { job_id } => println!("[tune:{job_id}] started"),
            ProgressEvent::Message { job_id, message } => println!("[tune:{job_id}] {message}"),
            ProgressEvent::Step { job_id, step, total, loss, lr } => {
                println!("[tune:{job_id}] step {step}/{total} loss {loss:.4} lr {lr:.2e}");
            }
            ProgressEvent::Checkpoint { job_id, step } => {
                println!("[tune:{job_id}] checkpoint at step {step}");
            }
            ProgressEvent::Finished { job_id } => println!("[tune:{job_id}] finished"),
        }
    }
}

/// Sink that drops every event; used by tests and the merge path.
#[derive(Debug, Default)]
pub struct NullProgressSink;

impl ProgressSink for NullProgressSink {
    fn on_event(&self, _event: ProgressEvent) {}
}
