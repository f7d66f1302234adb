mod animation;
mod chain;
mod dry_run;
mod files;
mod naming;
mod overlay;
mod worker;

pub use dry_run::DryRunExporter;
pub use files::{write_atomic, FileExporter};
pub(crate) use files::write_snapshot;
pub use naming::EventNamer;
pub use overlay::{resolve_timestamp_timezone, TimestampOverlay};
pub use worker::{spawn_export_worker, ExportQueue, ExportTally};

use crate::capture::{EventSummary, FlushReason, MotionEvent};
use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;

/// Artifact kinds produced for a closed event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Chain,
    Delta,
    Stats,
    Metadata,
    Animation,
}

impl ArtifactKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactKind::Chain => "chain",
            ArtifactKind::Delta => "delta",
            ArtifactKind::Stats => "stats",
            ArtifactKind::Metadata => "metadata",
            ArtifactKind::Animation => "animation",
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A closed event handed to the exporter
#[derive(Debug, Clone)]
pub struct ExportJob {
    /// Export name, `MM-DD-YYYY_HH-MM-SS` plus optional suffixes
    pub event_id: String,
    pub event: MotionEvent,
    pub summary: EventSummary,
    pub reason: FlushReason,
}

/// Per-artifact results of one export
#[derive(Debug, Clone, Default)]
pub struct ExportReport {
    pub written: Vec<(ArtifactKind, PathBuf)>,
    pub failed: Vec<(ArtifactKind, String)>,
}

impl ExportReport {
    pub fn record(&mut self, kind: ArtifactKind, result: crate::error::Result<PathBuf>) {
        match result {
            Ok(path) => self.written.push((kind, path)),
            Err(e) => self.failed.push((kind, e.to_string())),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn wrote(&self, kind: ArtifactKind) -> bool {
        self.written.iter().any(|(k, _)| *k == kind)
    }
}

/// Persists closed events.
///
/// Implementations report failures per artifact instead of failing the whole
/// export, and never leave a partially written artifact under its final name.
#[async_trait]
pub trait EventExporter: Send + Sync {
    async fn export(&self, job: ExportJob) -> ExportReport;
}
