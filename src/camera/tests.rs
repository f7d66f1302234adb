use super::*;
use crate::config::{SourceConfig, SourceKind};
use crate::error::{CameraError, ChaincamError};
use image::{Rgb, RgbImage};
use std::path::Path;
use std::time::Duration;

fn write_image(dir: &Path, name: &str, width: u32, height: u32, color: [u8; 3]) {
    RgbImage::from_pixel(width, height, Rgb(color))
        .save(dir.join(name))
        .unwrap();
}

fn create_test_source_config(directory: Option<String>) -> SourceConfig {
    SourceConfig {
        kind: SourceKind::Directory,
        directory,
        ..SourceConfig::default()
    }
}

#[tokio::test]
async fn test_directory_source_replays_in_name_order() {
    let dir = tempfile::tempdir().unwrap();
    write_image(dir.path(), "frame_002.png", 4, 3, [0, 255, 0]);
    write_image(dir.path(), "frame_001.png", 4, 3, [255, 0, 0]);
    write_image(dir.path(), "frame_003.png", 4, 3, [0, 0, 255]);
    std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

    let mut source = DirectorySource::open(dir.path(), Duration::from_secs(2))
        .await
        .unwrap();
    assert!(!source.is_live());
    assert_eq!(source.remaining(), 3);

    let first = source.capture().await.unwrap().unwrap();
    let second = source.capture().await.unwrap().unwrap();
    let third = source.capture().await.unwrap().unwrap();
    assert!(source.capture().await.unwrap().is_none());

    assert_eq!(*first.image().get_pixel(0, 0), Rgb([255, 0, 0]));
    assert_eq!(*second.image().get_pixel(0, 0), Rgb([0, 255, 0]));
    assert_eq!(*third.image().get_pixel(0, 0), Rgb([0, 0, 255]));
    assert_eq!((first.id, second.id, third.id), (0, 1, 2));

    assert_eq!(
        second.timestamp.duration_since(first.timestamp).unwrap(),
        Duration::from_secs(2)
    );
    assert_eq!(
        third.timestamp.duration_since(first.timestamp).unwrap(),
        Duration::from_secs(4)
    );
}

#[tokio::test]
async fn test_directory_source_rejects_resolution_change() {
    let dir = tempfile::tempdir().unwrap();
    write_image(dir.path(), "a.png", 4, 3, [0, 0, 0]);
    write_image(dir.path(), "b.png", 5, 3, [0, 0, 0]);
    write_image(dir.path(), "c.png", 4, 3, [0, 0, 0]);

    let mut source = DirectorySource::open(dir.path(), Duration::from_secs(1))
        .await
        .unwrap();
    assert!(source.capture().await.unwrap().is_some());
    assert!(matches!(
        source.capture().await,
        Err(ChaincamError::Camera(CameraError::InvalidFrame { .. }))
    ));
    // The malformed file is skipped, replay continues
    assert!(source.capture().await.unwrap().is_some());
}

#[tokio::test]
async fn test_directory_source_rejects_corrupt_file() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("broken.jpg"), b"not a jpeg").unwrap();

    let mut source = DirectorySource::open(dir.path(), Duration::from_secs(1))
        .await
        .unwrap();
    assert!(matches!(
        source.capture().await,
        Err(ChaincamError::Camera(CameraError::InvalidFrame { .. }))
    ));
    assert!(source.capture().await.unwrap().is_none());
}

#[tokio::test]
async fn test_open_source_requires_directory() {
    let result = open_source(&create_test_source_config(None), Duration::from_secs(1)).await;
    assert!(matches!(
        result,
        Err(ChaincamError::Camera(CameraError::Configuration { .. }))
    ));

    let missing = create_test_source_config(Some("/nonexistent/chaincam/frames".to_string()));
    let result = open_source(&missing, Duration::from_secs(1)).await;
    assert!(matches!(
        result,
        Err(ChaincamError::Camera(CameraError::DeviceOpen { .. }))
    ));
}

#[cfg(not(all(feature = "camera", target_os = "linux")))]
#[tokio::test]
async fn test_camera_source_needs_feature() {
    let config = SourceConfig {
        kind: SourceKind::Camera,
        ..SourceConfig::default()
    };
    let result = open_source(&config, Duration::from_secs(1)).await;
    assert!(matches!(
        result,
        Err(ChaincamError::Camera(CameraError::DeviceOpen { .. }))
    ));
}

#[tokio::test]
async fn test_mock_source_script() {
    let mut source = MockFrameSource::new(Duration::from_secs(1))
        .frame(RgbImage::new(2, 2))
        .failure("sensor timeout")
        .frame(RgbImage::new(2, 2));
    assert!(!source.is_live());
    assert_eq!(source.remaining(), 3);

    let first = source.capture().await.unwrap().unwrap();
    assert!(matches!(
        source.capture().await,
        Err(ChaincamError::Camera(CameraError::Capture { .. }))
    ));
    let second = source.capture().await.unwrap().unwrap();
    assert!(source.capture().await.unwrap().is_none());

    assert_eq!((first.id, second.id), (0, 1));
    assert_eq!(
        second.timestamp.duration_since(first.timestamp).unwrap(),
        Duration::from_secs(2)
    );
    assert!(MockFrameSource::new(Duration::from_secs(1)).live().is_live());
}
