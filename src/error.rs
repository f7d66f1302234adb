use thiserror::Error;

#[derive(Error, Debug)]
pub enum ChaincamError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("Camera error: {0}")]
    Camera(#[from] CameraError),

    #[error("Analyzer error: {0}")]
    Analyzer(#[from] AnalyzerError),

    #[error("Export error: {0}")]
    Export(#[from] ExportError),

    #[error("Event bus error: {0}")]
    EventBus(#[from] EventBusError),

    #[error("System error: {message}")]
    System { message: String },

    #[error("Component error in {component}: {message}")]
    Component { component: String, message: String },
}

/// Acquisition failures. Each one is fatal to the cycle it happened in.
#[derive(Error, Debug)]
pub enum CameraError {
    #[error("Failed to open frame source {device}: {details}")]
    DeviceOpen { device: String, details: String },

    #[error("Frame source configuration error: {details}")]
    Configuration { details: String },

    #[error("Frame capture failed: {details}")]
    Capture { details: String },

    #[error("Malformed frame: {details}")]
    InvalidFrame { details: String },
}

#[derive(Error, Debug)]
pub enum AnalyzerError {
    #[error(
        "Frame dimensions {actual_width}x{actual_height} do not match reference {expected_width}x{expected_height}"
    )]
    DimensionMismatch {
        expected_width: u32,
        expected_height: u32,
        actual_width: u32,
        actual_height: u32,
    },

    #[error("Frame processing failed: {details}")]
    FrameProcessing { details: String },
}

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("Failed to write {artifact} artifact: {details}")]
    Artifact {
        artifact: &'static str,
        details: String,
    },

    #[error("Failed to render {artifact}: {details}")]
    Render {
        artifact: &'static str,
        details: String,
    },

    #[error("Export queue closed")]
    QueueClosed,
}

#[derive(Error, Debug)]
pub enum EventBusError {
    #[error("Failed to publish event: {details}")]
    PublishFailed { details: String },

    #[error("Event channel closed")]
    ChannelClosed,
}

impl ChaincamError {
    pub fn system<S: Into<String>>(message: S) -> Self {
        Self::System {
            message: message.into(),
        }
    }

    pub fn component<C: Into<String>, M: Into<String>>(component: C, message: M) -> Self {
        Self::Component {
            component: component.into(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ChaincamError>;
