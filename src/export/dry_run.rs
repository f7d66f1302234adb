use super::{EventExporter, ExportJob, ExportReport};
use async_trait::async_trait;
use tracing::info;

/// Logs closed events instead of writing them
#[derive(Debug, Default)]
pub struct DryRunExporter;

#[async_trait]
impl EventExporter for DryRunExporter {
    async fn export(&self, job: ExportJob) -> ExportReport {
        info!(
            "[dry run] event {}: {} frames, mean hits {:.1}, {} ({})",
            job.event_id,
            job.summary.frame_count,
            job.summary.mean_hits,
            job.summary.classification.as_str(),
            job.reason
        );
        ExportReport::default()
    }
}
