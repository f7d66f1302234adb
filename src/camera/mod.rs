#[cfg(all(feature = "camera", target_os = "linux"))]
mod v4l2;
mod interface;
mod mock;
mod replay;
#[cfg(test)]
mod tests;

#[cfg(all(feature = "camera", target_os = "linux"))]
pub use v4l2::GstCameraSource;
pub use interface::{open_source, FrameSource};
pub use mock::MockFrameSource;
pub use replay::DirectorySource;
