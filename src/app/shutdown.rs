use super::types::LoopReport;
use super::{ChaincamOrchestrator, ComponentState};
use crate::error::{ChaincamError, Result};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{error, info, warn};

impl ChaincamOrchestrator {
    fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.config.system.shutdown_timeout_seconds)
    }

    /// Wait for a cancelled detection loop to flush and stop
    pub(super) async fn await_detection(
        &self,
        mut handle: JoinHandle<LoopReport>,
    ) -> Result<LoopReport> {
        self.set_component_state("detection", ComponentState::Stopping)
            .await;

        match timeout(self.shutdown_timeout(), &mut handle).await {
            Ok(Ok(report)) => Ok(report),
            Ok(Err(e)) => Err(ChaincamError::component("detection", e.to_string())),
            Err(_) => {
                handle.abort();
                Err(ChaincamError::system(format!(
                    "Detection loop did not stop within {}s",
                    self.config.system.shutdown_timeout_seconds
                )))
            }
        }
    }

    /// Stop the session and drain queued exports. Returns the exit code.
    pub async fn shutdown(&mut self, detection: Result<LoopReport>) -> i32 {
        info!("Beginning graceful shutdown");
        self.cancellation_token.cancel();

        let mut exit_code = 0;

        match detection {
            Ok(report) => {
                self.set_component_state("detection", ComponentState::Stopped)
                    .await;
                if !report.reason.is_clean() {
                    error!("Detection ended abnormally: {}", report.reason);
                    exit_code = 1;
                }
                self.last_report = Some(report);
            }
            Err(_) => {
                self.set_component_state("detection", ComponentState::Failed)
                    .await;
                exit_code = 1;
            }
        }
        self.set_component_state("source", ComponentState::Stopped)
            .await;

        if let Err(e) = self.stop_export_worker().await {
            error!("Error stopping export: {}", e);
            exit_code = 1;
        }

        info!("Graceful shutdown completed with exit code: {}", exit_code);
        exit_code
    }

    async fn stop_export_worker(&mut self) -> Result<()> {
        let mut worker = match self.export_worker.take() {
            Some(worker) => worker,
            None => return Ok(()),
        };

        info!("Waiting for queued exports to finish");
        self.set_component_state("export", ComponentState::Stopping)
            .await;

        match timeout(self.shutdown_timeout(), &mut worker).await {
            Ok(Ok(tally)) => {
                self.set_component_state("export", ComponentState::Stopped)
                    .await;
                info!(
                    "Exported {} events, {} artifact failures",
                    tally.events, tally.failed_artifacts
                );
                self.export_tally = Some(tally);
                Ok(())
            }
            Ok(Err(e)) => {
                self.set_component_state("export", ComponentState::Failed)
                    .await;
                Err(ChaincamError::component("export", e.to_string()))
            }
            Err(_) => {
                warn!("Abandoning exports still queued at shutdown");
                worker.abort();
                self.set_component_state("export", ComponentState::Failed)
                    .await;
                Err(ChaincamError::system(format!(
                    "Export queue not drained within {}s",
                    self.config.system.shutdown_timeout_seconds
                )))
            }
        }
    }
}
