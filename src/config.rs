use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ChaincamConfig {
    pub engine: EngineConfig,
    pub source: SourceConfig,
    pub export: ExportConfig,
    pub system: SystemConfig,
}

/// Differencing algorithm used for every cycle of a session
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DifferenceStrategy {
    /// CIE L*a*b* difference averaged over all three channels
    Lab,
    /// YUV difference over the U and V channels only
    ChromaYuv,
    /// Raw RGB difference followed by dilation and region extraction
    RawContour,
}

/// How the reference frame follows the live feed
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceMode {
    /// Reference is replaced by every new frame
    Rolling,
    /// Reference is held until the scene has been still for `reference_refresh_seconds`
    Anchor,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct EngineConfig {
    /// Differencing strategy
    #[serde(default = "default_strategy")]
    pub strategy: DifferenceStrategy,

    /// Reference frame tracking mode
    #[serde(default = "default_reference_mode")]
    pub reference_mode: ReferenceMode,

    /// Threshold applied to the smoothed difference map (Lab and chroma strategies)
    #[serde(default = "default_difference_threshold")]
    pub difference_threshold: f64,

    /// Unit-range threshold for the raw contour strategy
    #[serde(default = "default_contour_threshold")]
    pub contour_threshold: f64,

    /// 3x3 dilation passes applied to the raw contour mask
    #[serde(default = "default_dilate_iterations")]
    pub dilate_iterations: u8,

    /// Pixel count (or region area for the contour strategy) needed for a hit
    #[serde(default = "default_min_hit_pixels")]
    pub min_hit_pixels: u64,

    /// Gaussian kernel size, must be odd
    #[serde(default = "default_blur_kernel_size")]
    pub blur_kernel_size: u32,

    /// Idle time after the last motion frame before an event is closed
    #[serde(default = "default_event_timeout_seconds")]
    pub event_timeout_seconds: f64,

    /// Frame count at which an event is closed even while motion continues
    #[serde(default = "default_max_event_length")]
    pub max_event_length: usize,

    /// Mean hit metric at or below which an event is labelled low-activity
    #[serde(default)]
    pub classification_threshold: Option<f64>,

    /// Target time between cycles
    #[serde(default = "default_cycle_interval_seconds")]
    pub cycle_interval_seconds: f64,

    /// Stillness required before an anchor reference is replaced
    #[serde(default = "default_reference_refresh_seconds")]
    pub reference_refresh_seconds: f64,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Replay image files from a directory in name order
    Directory,
    /// Live V4L2 camera (requires the `camera` feature)
    Camera,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct SourceConfig {
    #[serde(default = "default_source_kind")]
    pub kind: SourceKind,

    /// Directory of frames for the replay source
    #[serde(default)]
    pub directory: Option<String>,

    /// Camera device index (e.g., 0 for /dev/video0)
    #[serde(default = "default_device_index")]
    pub device_index: u32,

    /// Camera resolution (width, height)
    #[serde(default = "default_resolution")]
    pub resolution: (u32, u32),

    /// Delay before retrying after a failed capture
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Consecutive capture failures tolerated before the loop gives up
    #[serde(default = "default_max_consecutive_failures")]
    pub max_consecutive_failures: u32,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ExportConfig {
    /// Base path for exported artifacts
    #[serde(default = "default_export_path")]
    pub path: String,

    /// Append-only statistics log, relative to `path`
    #[serde(default = "default_stats_file")]
    pub stats_file: String,

    /// Write the stacked frame chain image
    #[serde(default = "default_true")]
    pub chain: bool,

    /// Write the stacked difference image
    #[serde(default = "default_true")]
    pub delta: bool,

    /// Write a JSON summary next to the images
    #[serde(default = "default_false")]
    pub metadata: bool,

    /// Write an animated GIF of the event
    #[serde(default = "default_false")]
    pub animation: bool,

    /// Display time of each GIF frame
    #[serde(default = "default_animation_frame_seconds")]
    pub animation_frame_seconds: f64,

    /// External GIF optimizer command; empty disables the pass
    #[serde(default = "default_optimizer")]
    pub optimizer: String,

    /// Arguments passed to the optimizer before `<input> -o <output>`
    #[serde(default = "default_optimizer_args")]
    pub optimizer_args: Vec<String>,

    /// Closed events allowed to wait for the export worker
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Timezone used for export names, hour-of-day and overlays
    #[serde(default = "default_timestamp_timezone")]
    pub timestamp_timezone: String,

    /// Draw the capture time onto chain frames
    #[serde(default = "default_false")]
    pub timestamp_overlay: bool,

    /// Path to TrueType font file for timestamp overlay
    #[serde(default = "default_timestamp_font_path")]
    pub timestamp_font_path: String,

    /// Font size for timestamp overlay
    #[serde(default = "default_timestamp_font_size")]
    pub timestamp_font_size: f64,

    /// JPEG quality for chain and delta images
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,

    /// Keep `latest.jpg` updated with the most recent frame
    #[serde(default = "default_false")]
    pub snapshot: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct SystemConfig {
    /// Event bus capacity
    #[serde(default = "default_event_bus_capacity")]
    pub event_bus_capacity: usize,

    /// Time allowed for queued exports to finish during shutdown
    #[serde(default = "default_shutdown_timeout_seconds")]
    pub shutdown_timeout_seconds: u64,
}

impl EngineConfig {
    pub fn cycle_interval(&self) -> Duration {
        Duration::from_secs_f64(self.cycle_interval_seconds)
    }

    pub fn event_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.event_timeout_seconds)
    }

    pub fn reference_refresh(&self) -> Duration {
        Duration::from_secs_f64(self.reference_refresh_seconds)
    }

    /// Validate engine values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.blur_kernel_size == 0 || self.blur_kernel_size % 2 == 0 {
            return Err(ConfigError::Message(format!(
                "Engine blur_kernel_size must be a positive odd number, got {}",
                self.blur_kernel_size
            )));
        }

        check_non_negative("difference_threshold", self.difference_threshold)?;
        check_non_negative("contour_threshold", self.contour_threshold)?;
        check_non_negative("event_timeout_seconds", self.event_timeout_seconds)?;
        check_non_negative("reference_refresh_seconds", self.reference_refresh_seconds)?;
        if let Some(threshold) = self.classification_threshold {
            check_non_negative("classification_threshold", threshold)?;
        }

        // A period that rounds down to zero nanoseconds cannot drive a timer
        match Duration::try_from_secs_f64(self.cycle_interval_seconds) {
            Ok(interval) if !interval.is_zero() => {}
            _ => {
                return Err(ConfigError::Message(format!(
                    "Engine cycle_interval_seconds must be a positive duration of at least 1ns, got {}",
                    self.cycle_interval_seconds
                )));
            }
        }

        if self.max_event_length < 2 {
            return Err(ConfigError::Message(
                "Engine max_event_length must be at least 2".to_string(),
            ));
        }

        if self.strategy == DifferenceStrategy::RawContour && self.contour_threshold >= 1.0 {
            warn!(
                "contour_threshold {} is outside the unit-range difference; the raw contour strategy will never report motion",
                self.contour_threshold
            );
        }

        Ok(())
    }
}

fn check_non_negative(name: &str, value: f64) -> Result<(), ConfigError> {
    if !value.is_finite() || value < 0.0 {
        return Err(ConfigError::Message(format!(
            "Engine {} must be a finite, non-negative number, got {}",
            name, value
        )));
    }
    Ok(())
}

impl ChaincamConfig {
    /// Load configuration from default sources (file + environment variables)
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_file("chaincam.toml")
    }

    /// Load configuration from a specific file path
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_str = path.as_ref().to_string_lossy();
        debug!("Loading configuration from: {}", path_str);

        let settings = Config::builder()
            // Start with default values
            .set_default("engine.strategy", "lab")?
            .set_default("engine.reference_mode", "rolling")?
            .set_default("engine.difference_threshold", default_difference_threshold())?
            .set_default("engine.contour_threshold", default_contour_threshold())?
            .set_default("engine.dilate_iterations", default_dilate_iterations() as i64)?
            .set_default("engine.min_hit_pixels", default_min_hit_pixels() as i64)?
            .set_default("engine.blur_kernel_size", default_blur_kernel_size() as i64)?
            .set_default("engine.event_timeout_seconds", default_event_timeout_seconds())?
            .set_default("engine.max_event_length", default_max_event_length() as i64)?
            .set_default("engine.cycle_interval_seconds", default_cycle_interval_seconds())?
            .set_default(
                "engine.reference_refresh_seconds",
                default_reference_refresh_seconds(),
            )?
            .set_default("source.kind", "directory")?
            .set_default("source.directory", "./frames")?
            .set_default("source.device_index", default_device_index() as i64)?
            .set_default(
                "source.resolution",
                vec![
                    default_resolution().0 as i64,
                    default_resolution().1 as i64,
                ],
            )?
            .set_default("source.retry_backoff_ms", default_retry_backoff_ms() as i64)?
            .set_default(
                "source.max_consecutive_failures",
                default_max_consecutive_failures() as i64,
            )?
            .set_default("export.path", default_export_path())?
            .set_default("export.stats_file", default_stats_file())?
            .set_default("export.chain", true)?
            .set_default("export.delta", true)?
            .set_default("export.metadata", false)?
            .set_default("export.animation", false)?
            .set_default(
                "export.animation_frame_seconds",
                default_animation_frame_seconds(),
            )?
            .set_default("export.optimizer", default_optimizer())?
            .set_default("export.optimizer_args", default_optimizer_args())?
            .set_default("export.queue_capacity", default_queue_capacity() as i64)?
            .set_default("export.timestamp_timezone", default_timestamp_timezone())?
            .set_default("export.timestamp_overlay", false)?
            .set_default("export.timestamp_font_path", default_timestamp_font_path())?
            .set_default("export.timestamp_font_size", default_timestamp_font_size())?
            .set_default("export.jpeg_quality", default_jpeg_quality() as i64)?
            .set_default("export.snapshot", false)?
            .set_default(
                "system.event_bus_capacity",
                default_event_bus_capacity() as i64,
            )?
            .set_default(
                "system.shutdown_timeout_seconds",
                default_shutdown_timeout_seconds() as i64,
            )?
            // Add configuration file (optional)
            .add_source(File::with_name(&path_str).required(false))
            // Environment variables, e.g. CHAINCAM_ENGINE__MIN_HIT_PIXELS=4000
            .add_source(
                Environment::with_prefix("CHAINCAM")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: ChaincamConfig = settings.try_deserialize()?;

        info!("Configuration loaded successfully");
        debug!("Final configuration: {:#?}", config);

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.engine.validate()?;

        if self.source.kind == SourceKind::Directory
            && self
                .source
                .directory
                .as_deref()
                .map_or(true, |dir| dir.trim().is_empty())
        {
            return Err(ConfigError::Message(
                "Directory source requires source.directory".to_string(),
            ));
        }

        if self.source.resolution.0 == 0 || self.source.resolution.1 == 0 {
            return Err(ConfigError::Message(
                "Source resolution must be greater than 0".to_string(),
            ));
        }

        if !(1..=16).contains(&self.export.queue_capacity) {
            return Err(ConfigError::Message(format!(
                "Export queue_capacity must be between 1 and 16, got {}",
                self.export.queue_capacity
            )));
        }

        if !(1..=100).contains(&self.export.jpeg_quality) {
            return Err(ConfigError::Message(format!(
                "Export jpeg_quality must be between 1 and 100, got {}",
                self.export.jpeg_quality
            )));
        }

        if !self.export.animation_frame_seconds.is_finite()
            || self.export.animation_frame_seconds <= 0.0
        {
            return Err(ConfigError::Message(
                "Export animation_frame_seconds must be greater than 0".to_string(),
            ));
        }

        if self.export.stats_file.trim().is_empty() {
            return Err(ConfigError::Message(
                "Export stats_file must not be empty".to_string(),
            ));
        }

        if self.system.event_bus_capacity == 0 {
            return Err(ConfigError::Message(
                "Event bus capacity must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            strategy: default_strategy(),
            reference_mode: default_reference_mode(),
            difference_threshold: default_difference_threshold(),
            contour_threshold: default_contour_threshold(),
            dilate_iterations: default_dilate_iterations(),
            min_hit_pixels: default_min_hit_pixels(),
            blur_kernel_size: default_blur_kernel_size(),
            event_timeout_seconds: default_event_timeout_seconds(),
            max_event_length: default_max_event_length(),
            classification_threshold: None,
            cycle_interval_seconds: default_cycle_interval_seconds(),
            reference_refresh_seconds: default_reference_refresh_seconds(),
        }
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            kind: default_source_kind(),
            directory: Some("./frames".to_string()),
            device_index: default_device_index(),
            resolution: default_resolution(),
            retry_backoff_ms: default_retry_backoff_ms(),
            max_consecutive_failures: default_max_consecutive_failures(),
        }
    }
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            path: default_export_path(),
            stats_file: default_stats_file(),
            chain: true,
            delta: true,
            metadata: false,
            animation: false,
            animation_frame_seconds: default_animation_frame_seconds(),
            optimizer: default_optimizer(),
            optimizer_args: default_optimizer_args(),
            queue_capacity: default_queue_capacity(),
            timestamp_timezone: default_timestamp_timezone(),
            timestamp_overlay: false,
            timestamp_font_path: default_timestamp_font_path(),
            timestamp_font_size: default_timestamp_font_size(),
            jpeg_quality: default_jpeg_quality(),
            snapshot: false,
        }
    }
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            event_bus_capacity: default_event_bus_capacity(),
            shutdown_timeout_seconds: default_shutdown_timeout_seconds(),
        }
    }
}

impl Default for ChaincamConfig {
    fn default() -> Self {
        Self {
            engine: EngineConfig::default(),
            source: SourceConfig::default(),
            export: ExportConfig::default(),
            system: SystemConfig::default(),
        }
    }
}

// Default value functions
fn default_strategy() -> DifferenceStrategy {
    DifferenceStrategy::Lab
}
fn default_reference_mode() -> ReferenceMode {
    ReferenceMode::Rolling
}
fn default_difference_threshold() -> f64 {
    10.0
}
fn default_contour_threshold() -> f64 {
    0.25
}
fn default_dilate_iterations() -> u8 {
    2
}
fn default_min_hit_pixels() -> u64 {
    5500
}
fn default_blur_kernel_size() -> u32 {
    21
}
fn default_event_timeout_seconds() -> f64 {
    60.0
}
fn default_max_event_length() -> usize {
    30
}
fn default_cycle_interval_seconds() -> f64 {
    1.0
}
fn default_reference_refresh_seconds() -> f64 {
    60.0
}

fn default_source_kind() -> SourceKind {
    SourceKind::Directory
}
fn default_device_index() -> u32 {
    0
}
fn default_resolution() -> (u32, u32) {
    (1280, 720)
}
fn default_retry_backoff_ms() -> u64 {
    500
}
fn default_max_consecutive_failures() -> u32 {
    10
}

fn default_export_path() -> String {
    "./events".to_string()
}
fn default_stats_file() -> String {
    "data.txt".to_string()
}
fn default_true() -> bool {
    true
}
fn default_false() -> bool {
    false
}
fn default_animation_frame_seconds() -> f64 {
    1.0
}
fn default_optimizer() -> String {
    "gifsicle".to_string()
}
fn default_optimizer_args() -> Vec<String> {
    vec!["-O3".to_string(), "--lossy=35".to_string()]
}
fn default_queue_capacity() -> usize {
    3
}
fn default_timestamp_timezone() -> String {
    "UTC".to_string()
}
fn default_timestamp_font_path() -> String {
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf".to_string()
}
fn default_timestamp_font_size() -> f64 {
    18.0
}
fn default_jpeg_quality() -> u8 {
    90
}

fn default_event_bus_capacity() -> usize {
    100
}
fn default_shutdown_timeout_seconds() -> u64 {
    30
}
