use super::detection::{DetectionLoop, SnapshotTarget};
use super::{ChaincamOrchestrator, ComponentState};
use crate::analyzer::MotionEngine;
use crate::camera::{open_source, FrameSource};
use crate::error::Result;
use crate::export::{
    resolve_timestamp_timezone, spawn_export_worker, DryRunExporter, EventExporter, EventNamer,
    FileExporter,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

pub(super) const COMPONENTS: [&str; 3] = ["source", "export", "detection"];

impl ChaincamOrchestrator {
    /// Register components in their stopped state
    pub async fn initialize(&mut self) -> Result<()> {
        info!("Initializing chaincam components");

        let mut states = self.component_states.lock().await;
        for component in COMPONENTS {
            states.insert(component.to_string(), ComponentState::Stopped);
        }
        drop(states);

        Ok(())
    }

    /// Open the configured source and start detecting
    pub async fn start(&mut self) -> Result<()> {
        self.set_component_state("source", ComponentState::Starting)
            .await;

        let source = match open_source(&self.config.source, self.config.engine.cycle_interval()).await {
            Ok(source) => source,
            Err(e) => {
                error!("Failed to open frame source: {}", e);
                self.set_component_state("source", ComponentState::Failed)
                    .await;
                return Err(e);
            }
        };

        let exporter: Arc<dyn EventExporter> = if self.dry_run {
            info!("Dry run: events are logged, nothing is written");
            Arc::new(DryRunExporter)
        } else {
            let exporter = FileExporter::new(self.config.export.clone());
            exporter.prepare().await?;
            Arc::new(exporter)
        };

        self.start_with(source, exporter).await
    }

    /// Start detecting on an already opened source
    pub async fn start_with(
        &mut self,
        source: Box<dyn FrameSource>,
        exporter: Arc<dyn EventExporter>,
    ) -> Result<()> {
        info!("Starting chaincam on {}", source.describe());
        self.set_component_state("source", ComponentState::Running)
            .await;

        // Export worker first so the loop always has somewhere to send events
        self.set_component_state("export", ComponentState::Starting)
            .await;
        let (queue, worker) = spawn_export_worker(
            exporter,
            self.config.export.queue_capacity,
            self.event_bus.clone(),
        );
        self.export_worker = Some(worker);
        self.set_component_state("export", ComponentState::Running)
            .await;

        self.set_component_state("detection", ComponentState::Starting)
            .await;
        let timezone = resolve_timestamp_timezone(&self.config.export.timestamp_timezone);
        let engine = MotionEngine::new(self.config.engine.clone(), timezone);
        let mut detection = DetectionLoop::new(
            engine,
            source,
            EventNamer::new(timezone),
            queue,
            self.event_bus.clone(),
            &self.config.source,
        );

        if self.config.export.snapshot && !self.dry_run {
            detection = detection.with_snapshot(SnapshotTarget {
                root: PathBuf::from(&self.config.export.path),
                quality: self.config.export.jpeg_quality,
            });
        }

        self.detection = Some(tokio::spawn(
            detection.run(self.cancellation_token.child_token()),
        ));
        self.set_component_state("detection", ComponentState::Running)
            .await;

        info!("Chaincam started");
        Ok(())
    }
}
