use super::types::{ComponentState, LoopReport, ShutdownReason};
use crate::config::ChaincamConfig;
use crate::events::EventBus;
use crate::export::ExportTally;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Owns one detection session: the frame source, the detection loop, and
/// the export worker behind it
pub struct ChaincamOrchestrator {
    pub(super) config: ChaincamConfig,
    pub(super) event_bus: EventBus,
    pub(super) dry_run: bool,

    // Running tasks
    pub(super) detection: Option<JoinHandle<LoopReport>>,
    pub(super) export_worker: Option<JoinHandle<ExportTally>>,

    // Lifecycle management
    pub(super) component_states: Arc<Mutex<HashMap<String, ComponentState>>>,
    pub(super) shutdown_sender: Option<oneshot::Sender<ShutdownReason>>,
    pub(super) shutdown_receiver: Option<oneshot::Receiver<ShutdownReason>>,
    pub(super) cancellation_token: CancellationToken,
    pub(super) last_report: Option<LoopReport>,
    pub(super) export_tally: Option<ExportTally>,
}

impl ChaincamOrchestrator {
    /// Create a new orchestrator with the given configuration
    pub fn new(config: ChaincamConfig) -> Self {
        let event_bus = EventBus::new(config.system.event_bus_capacity);
        let (shutdown_sender, shutdown_receiver) = oneshot::channel();

        Self {
            config,
            event_bus,
            dry_run: false,
            detection: None,
            export_worker: None,
            component_states: Arc::new(Mutex::new(HashMap::new())),
            shutdown_sender: Some(shutdown_sender),
            shutdown_receiver: Some(shutdown_receiver),
            cancellation_token: CancellationToken::new(),
            last_report: None,
            export_tally: None,
        }
    }

    /// Log closed events instead of writing artifacts
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn config(&self) -> &ChaincamConfig {
        &self.config
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    /// Cancelling this token stops the session as a signal would
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation_token.clone()
    }

    /// Detection loop result, available after shutdown
    pub fn last_report(&self) -> Option<&LoopReport> {
        self.last_report.as_ref()
    }

    /// Export counts, available after shutdown
    pub fn export_tally(&self) -> Option<ExportTally> {
        self.export_tally
    }
}
