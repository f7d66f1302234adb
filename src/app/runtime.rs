use super::types::LoopReport;
use super::{ChaincamOrchestrator, ShutdownReason};
use crate::error::{ChaincamError, Result};
use crate::events::ChaincamEvent;
use std::sync::Arc;
use std::time::SystemTime;
use tokio::signal;
use tokio::sync::{oneshot, Mutex};
use tracing::{error, info};

impl ChaincamOrchestrator {
    /// Run until the source ends or a shutdown is requested, then shut
    /// down and return the process exit code
    pub async fn run(&mut self) -> Result<i32> {
        let shutdown_sender = self
            .shutdown_sender
            .take()
            .ok_or_else(|| ChaincamError::system("Shutdown sender already taken"))?;
        let mut shutdown_receiver = self
            .shutdown_receiver
            .take()
            .ok_or_else(|| ChaincamError::system("Shutdown receiver already taken"))?;
        let mut detection = self
            .detection
            .take()
            .ok_or_else(|| ChaincamError::system("Detection loop not started"))?;

        self.setup_signal_handlers(shutdown_sender);
        info!("Chaincam is running");

        let token = self.cancellation_token.clone();
        let mut requested = None;
        let finished = tokio::select! {
            joined = &mut detection => Some(joined),
            reason = &mut shutdown_receiver => {
                requested = Some(reason.unwrap_or_else(|_| {
                    ShutdownReason::Error("Shutdown channel closed unexpectedly".to_string())
                }));
                None
            }
            _ = token.cancelled() => {
                requested = Some(ShutdownReason::UserRequest);
                None
            }
        };

        let detection_result = match finished {
            Some(joined) => joined.map_err(|e| ChaincamError::component("detection", e.to_string())),
            None => {
                let reason = requested.unwrap_or(ShutdownReason::UserRequest);
                info!("Shutdown initiated: {}", reason);
                let _ = self
                    .event_bus
                    .publish(ChaincamEvent::ShutdownRequested {
                        timestamp: SystemTime::now(),
                        reason: reason.to_string(),
                    })
                    .await;
                self.cancellation_token.cancel();

                self.await_detection(detection).await.map(|report| LoopReport {
                    reason: match report.reason {
                        ShutdownReason::UserRequest => reason,
                        other => other,
                    },
                    ..report
                })
            }
        };

        if let Err(e) = &detection_result {
            error!("Detection loop failed: {}", e);
        }

        let exit_code = self.shutdown(detection_result).await;
        info!("Chaincam shutdown complete");
        Ok(exit_code)
    }

    /// Set up signal handlers for graceful shutdown
    fn setup_signal_handlers(&self, shutdown_sender: oneshot::Sender<ShutdownReason>) {
        let shutdown_sender = Arc::new(Mutex::new(Some(shutdown_sender)));

        // Handle SIGTERM (systemd stop) - Unix only
        #[cfg(unix)]
        {
            let shutdown_sender_sigterm = Arc::clone(&shutdown_sender);
            tokio::spawn(async move {
                let mut sigterm =
                    match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                        Ok(sigterm) => sigterm,
                        Err(e) => {
                            error!("Failed to register SIGTERM handler: {}", e);
                            return;
                        }
                    };
                if sigterm.recv().await.is_some() {
                    info!("Received SIGTERM signal");
                    if let Some(sender) = shutdown_sender_sigterm.lock().await.take() {
                        let _ = sender.send(ShutdownReason::Signal("SIGTERM".to_string()));
                    }
                }
            });
        }

        // Handle SIGINT (Ctrl+C) - Cross-platform
        let shutdown_sender_sigint = Arc::clone(&shutdown_sender);
        tokio::spawn(async move {
            if let Ok(()) = signal::ctrl_c().await {
                info!("Received SIGINT signal (Ctrl+C)");
                if let Some(sender) = shutdown_sender_sigint.lock().await.take() {
                    let _ = sender.send(ShutdownReason::Signal("SIGINT".to_string()));
                }
            }
        });
    }
}
