use crate::config::ExportConfig;
use crate::error::{ChaincamError, Result};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_text_mut, text_size};
use rusttype::{Font, Scale};
use std::time::SystemTime;
use tracing::{debug, warn};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f %Z";

/// Resolve configured timezone, falling back to UTC on parse errors
pub fn resolve_timestamp_timezone(tz_name: &str) -> Tz {
    match tz_name.parse::<Tz>() {
        Ok(tz) => tz,
        Err(_) => {
            warn!(
                "Invalid timestamp timezone '{}', falling back to UTC",
                tz_name
            );
            chrono_tz::UTC
        }
    }
}

/// Draws capture timestamps onto chain frames. The font is loaded once.
pub struct TimestampOverlay {
    font: Font<'static>,
    scale: Scale,
    font_size: f32,
    timezone: Tz,
}

impl TimestampOverlay {
    pub fn load(config: &ExportConfig) -> Result<Self> {
        let font_data = std::fs::read(&config.timestamp_font_path).map_err(|e| {
            ChaincamError::component(
                "timestamp_overlay",
                format!(
                    "Failed to read font file '{}': {}",
                    config.timestamp_font_path, e
                ),
            )
        })?;

        let font = Font::try_from_vec(font_data).ok_or_else(|| {
            ChaincamError::component(
                "timestamp_overlay",
                format!("Failed to parse font file '{}'", config.timestamp_font_path),
            )
        })?;

        let font_size = config.timestamp_font_size as f32;
        debug!(
            "Loaded overlay font {} at size {}",
            config.timestamp_font_path, font_size
        );

        Ok(Self {
            font,
            scale: Scale::uniform(font_size),
            font_size,
            timezone: resolve_timestamp_timezone(&config.timestamp_timezone),
        })
    }

    /// Overlay for an export config, or `None` when disabled or unusable
    pub fn from_config(config: &ExportConfig) -> Option<Self> {
        if !config.timestamp_overlay {
            return None;
        }
        match Self::load(config) {
            Ok(overlay) => Some(overlay),
            Err(e) => {
                warn!("Timestamp overlay disabled: {}", e);
                None
            }
        }
    }

    pub fn format_timestamp(&self, timestamp: SystemTime) -> String {
        DateTime::<Utc>::from(timestamp)
            .with_timezone(&self.timezone)
            .format(TIMESTAMP_FORMAT)
            .to_string()
    }

    /// Stamp the bottom-left corner over a darkened box
    pub fn apply(&self, image: &mut RgbImage, timestamp: SystemTime) {
        let text = self.format_timestamp(timestamp);

        let x: u32 = 10;
        let y: u32 = image
            .height()
            .saturating_sub((self.font_size * 1.5) as u32);
        let (text_width, text_height) = text_size(self.scale, &self.font, &text);

        for dy in 0..(text_height.max(0) as u32 + 10) {
            for dx in 0..(text_width.max(0) as u32 + 10) {
                let px = x.saturating_sub(5) + dx;
                let py = y.saturating_sub(5) + dy;
                if px < image.width() && py < image.height() {
                    let pixel = image.get_pixel(px, py);
                    let darkened = Rgb([pixel[0] / 3, pixel[1] / 3, pixel[2] / 3]);
                    image.put_pixel(px, py, darkened);
                }
            }
        }

        draw_text_mut(
            image,
            Rgb([255, 255, 255]),
            x as i32,
            y as i32,
            self.scale,
            &self.font,
            &text,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_timezone_falls_back_to_utc() {
        assert_eq!(resolve_timestamp_timezone("Not/AZone"), chrono_tz::UTC);
        assert_eq!(
            resolve_timestamp_timezone("Asia/Tokyo"),
            chrono_tz::Asia::Tokyo
        );
    }

    #[test]
    fn test_missing_font_disables_overlay() {
        let config = ExportConfig {
            timestamp_overlay: true,
            timestamp_font_path: "/nonexistent/font.ttf".to_string(),
            ..ExportConfig::default()
        };
        assert!(TimestampOverlay::load(&config).is_err());
        assert!(TimestampOverlay::from_config(&config).is_none());
    }

    #[test]
    fn test_disabled_overlay_is_not_loaded() {
        let config = ExportConfig {
            timestamp_overlay: false,
            ..ExportConfig::default()
        };
        assert!(TimestampOverlay::from_config(&config).is_none());
    }
}
