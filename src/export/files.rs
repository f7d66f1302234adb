use super::{
    animation::{encode_gif, optimize_gif},
    chain::{encode_jpeg, render_chain, render_delta_chain},
    overlay::TimestampOverlay,
    ArtifactKind, EventExporter, ExportJob, ExportReport,
};
use crate::capture::{EventSummary, FlushReason, HitRecord};
use crate::config::ExportConfig;
use crate::error::{ChaincamError, ExportError, Result};
use crate::frame::Frame;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

/// Write `bytes` to `path` through a hidden sibling file and a rename, so the
/// final name never refers to a partial file.
pub async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .ok_or_else(|| ChaincamError::system(format!("not a file path: {}", path.display())))?;
    let partial = path.with_file_name(format!(".{}.partial", file_name));

    let result = async {
        let mut file = fs::File::create(&partial).await?;
        file.write_all(bytes).await?;
        file.sync_all().await?;
        drop(file);
        fs::rename(&partial, path).await
    }
    .await;

    if let Err(e) = result {
        let _ = fs::remove_file(&partial).await;
        return Err(e.into());
    }
    Ok(())
}

#[derive(Debug, Serialize)]
struct EventMetadata<'a> {
    event_id: &'a str,
    reason: FlushReason,
    frame_count: usize,
    started_at: Option<DateTime<Utc>>,
    ended_at: Option<DateTime<Utc>>,
    summary: &'a EventSummary,
    hits: &'a [HitRecord],
}

/// Per-hit lines followed by the event summary line
fn stats_block(event_id: &str, hits: &[HitRecord], summary: &EventSummary) -> String {
    let mut block = String::new();
    for hit in hits {
        let _ = writeln!(block, "{}", hit);
    }
    let _ = writeln!(
        block,
        "\t\t\t\tAverage: {}\t[{:.2} {:.2} {:.2}], {}",
        summary.mean_hits,
        summary.mean_color[0],
        summary.mean_color[1],
        summary.mean_color[2],
        event_id
    );
    block
}

async fn run_blocking<T, F>(artifact: &'static str, work: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| ExportError::Render {
            artifact,
            details: format!("render task failed: {}", e),
        })?
}

/// Writes event artifacts under the configured export directory
pub struct FileExporter {
    config: ExportConfig,
    root: PathBuf,
    overlay: Option<Arc<TimestampOverlay>>,
}

impl FileExporter {
    pub fn new(config: ExportConfig) -> Self {
        let overlay = TimestampOverlay::from_config(&config).map(Arc::new);
        Self {
            root: PathBuf::from(&config.path),
            config,
            overlay,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the export directory if needed
    pub async fn prepare(&self) -> Result<()> {
        if !self.root.exists() {
            fs::create_dir_all(&self.root).await?;
            info!("Created export directory: {}", self.root.display());
        }
        Ok(())
    }

    async fn write_chain(&self, job: &ExportJob) -> Result<PathBuf> {
        let frames: Vec<Frame> = job.event.frames().to_vec();
        let overlay = self.overlay.clone();
        let quality = self.config.jpeg_quality;
        let jpeg = run_blocking("chain", move || {
            let chain = render_chain(&frames, overlay.as_deref())?;
            encode_jpeg(&chain, quality)
        })
        .await?;

        let path = self.root.join(format!("{}_chain.jpg", job.event_id));
        write_atomic(&path, &jpeg).await?;
        Ok(path)
    }

    async fn write_delta(&self, job: &ExportJob) -> Result<PathBuf> {
        let deltas = job.event.deltas().to_vec();
        let quality = self.config.jpeg_quality;
        let jpeg = run_blocking("delta", move || {
            let chain = render_delta_chain(&deltas)?;
            encode_jpeg(&chain, quality)
        })
        .await?;

        let path = self.root.join(format!("{}_delta.jpg", job.event_id));
        write_atomic(&path, &jpeg).await?;
        Ok(path)
    }

    /// Append the event block by rewriting the whole log atomically. A failed
    /// write leaves the previous log in place, and a block already at the end
    /// of the log is not written again.
    async fn append_stats(&self, job: &ExportJob) -> Result<PathBuf> {
        let path = self.root.join(&self.config.stats_file);
        let block = stats_block(&job.event_id, job.event.hits(), &job.summary);

        let mut contents = match fs::read_to_string(&path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(e) => return Err(e.into()),
        };
        if contents.ends_with(&block) {
            debug!("Stats for {} already logged", job.event_id);
            return Ok(path);
        }
        if !contents.is_empty() && !contents.ends_with('\n') {
            contents.push('\n');
        }
        contents.push_str(&block);

        write_atomic(&path, contents.as_bytes()).await?;
        Ok(path)
    }

    async fn write_metadata(&self, job: &ExportJob) -> Result<PathBuf> {
        let metadata = EventMetadata {
            event_id: &job.event_id,
            reason: job.reason,
            frame_count: job.event.len(),
            started_at: job.event.started_at().map(DateTime::<Utc>::from),
            ended_at: job.event.ended_at().map(DateTime::<Utc>::from),
            summary: &job.summary,
            hits: job.event.hits(),
        };
        let json = serde_json::to_string_pretty(&metadata).map_err(|e| {
            ChaincamError::component("exporter", format!("Failed to serialize metadata: {}", e))
        })?;

        let path = self.root.join(format!("{}.json", job.event_id));
        write_atomic(&path, json.as_bytes()).await?;
        debug!("Saved metadata to {}", path.display());
        Ok(path)
    }

    async fn write_animation(&self, job: &ExportJob) -> Result<PathBuf> {
        let frames: Vec<Frame> = job.event.frames().to_vec();
        let frame_seconds = self.config.animation_frame_seconds;
        let gif = run_blocking("animation", move || encode_gif(&frames, frame_seconds)).await?;

        let path = self.root.join(format!("{}.gif", job.event_id));
        write_atomic(&path, &gif).await?;

        if !self.config.optimizer.is_empty() {
            if let Err(e) = optimize_gif(&path, &self.config.optimizer, &self.config.optimizer_args).await {
                warn!("GIF optimization skipped for {}: {}", job.event_id, e);
            }
        }
        Ok(path)
    }
}

#[async_trait]
impl EventExporter for FileExporter {
    async fn export(&self, job: ExportJob) -> ExportReport {
        info!(
            "Exporting event {} ({} frames, mean hits {:.1})",
            job.event_id,
            job.event.len(),
            job.summary.mean_hits
        );

        let mut report = ExportReport::default();
        if self.config.chain {
            report.record(ArtifactKind::Chain, self.write_chain(&job).await);
        }
        if self.config.delta {
            report.record(ArtifactKind::Delta, self.write_delta(&job).await);
        }
        report.record(ArtifactKind::Stats, self.append_stats(&job).await);
        if self.config.metadata {
            report.record(ArtifactKind::Metadata, self.write_metadata(&job).await);
        }
        if self.config.animation {
            report.record(ArtifactKind::Animation, self.write_animation(&job).await);
        }

        for (kind, error) in &report.failed {
            warn!("Failed to write {} for event {}: {}", kind, job.event_id, error);
        }
        report
    }
}

/// Replace `latest.jpg` in `root` with the given frame
pub(crate) async fn write_snapshot(root: &Path, frame: Frame, quality: u8) -> Result<PathBuf> {
    let jpeg = run_blocking("snapshot", move || encode_jpeg(frame.image(), quality)).await?;
    let path = root.join("latest.jpg");
    write_atomic(&path, &jpeg).await?;
    Ok(path)
}
