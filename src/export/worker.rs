use super::{EventExporter, ExportJob};
use crate::error::{ExportError, Result};
use crate::events::{ChaincamEvent, EventBus};

use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Sending half of the bounded export queue.
///
/// Jobs are exported one at a time in submission order. A full queue makes
/// `submit` wait rather than drop the event.
#[derive(Clone)]
pub struct ExportQueue {
    sender: mpsc::Sender<ExportJob>,
}

impl ExportQueue {
    pub async fn submit(&self, job: ExportJob) -> Result<()> {
        if self.sender.capacity() == 0 {
            warn!(
                "Export queue full, detection waits for event {} to be queued",
                job.event_id
            );
        }
        self.sender
            .send(job)
            .await
            .map_err(|_| ExportError::QueueClosed)?;
        Ok(())
    }

    /// Free slots in the queue
    pub fn available(&self) -> usize {
        self.sender.capacity()
    }
}

/// What the worker exported over its lifetime
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExportTally {
    pub events: u64,
    /// Events with every requested artifact written
    pub complete: u64,
    pub failed_artifacts: u64,
}

/// Start the export worker. The worker exits once every queue handle has
/// been dropped and the remaining jobs are exported.
pub fn spawn_export_worker(
    exporter: Arc<dyn EventExporter>,
    capacity: usize,
    event_bus: EventBus,
) -> (ExportQueue, JoinHandle<ExportTally>) {
    let (sender, receiver) = mpsc::channel(capacity.max(1));
    let handle = tokio::spawn(export_worker(receiver, exporter, event_bus));
    (ExportQueue { sender }, handle)
}

async fn export_worker(
    mut queue_rx: mpsc::Receiver<ExportJob>,
    exporter: Arc<dyn EventExporter>,
    event_bus: EventBus,
) -> ExportTally {
    info!("Export worker started");
    let mut tally = ExportTally::default();

    while let Some(job) = queue_rx.recv().await {
        let event_id = job.event_id.clone();
        debug!("Processing export job for event {}", event_id);

        let report = exporter.export(job).await;
        tally.events += 1;
        tally.failed_artifacts += report.failed.len() as u64;
        if report.is_complete() {
            tally.complete += 1;
        }

        for (kind, error) in &report.failed {
            let _ = event_bus
                .publish(ChaincamEvent::ExportFailed {
                    event_id: event_id.clone(),
                    artifact: kind.to_string(),
                    error: error.clone(),
                })
                .await;
        }

        let _ = event_bus
            .publish(ChaincamEvent::ExportCompleted {
                event_id,
                artifacts: report
                    .written
                    .iter()
                    .map(|(_, path)| path.display().to_string())
                    .collect(),
            })
            .await;
    }

    info!(
        "Export worker stopped after {} events ({} with failed artifacts)",
        tally.events,
        tally.events - tally.complete
    );
    tally
}
