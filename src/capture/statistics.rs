use super::accumulator::HitRecord;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Activity label assigned at event close
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Classification {
    LowActivity,
    HighActivity,
}

impl Classification {
    pub fn as_str(&self) -> &'static str {
        match self {
            Classification::LowActivity => "low-activity",
            Classification::HighActivity => "high-activity",
        }
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Aggregate statistics for one closed event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventSummary {
    pub frame_count: usize,
    pub mean_hits: f64,
    pub mean_color: [f64; 3],
    pub classification: Classification,
    /// Threshold the classification was made against, if one is configured
    pub classification_threshold: Option<f64>,
}

impl EventSummary {
    /// Name suffix, present only when classification is configured
    pub fn label(&self) -> Option<&'static str> {
        self.classification_threshold
            .map(|_| self.classification.as_str())
    }
}

pub struct EventStatistics;

impl EventStatistics {
    /// Summarize the hit records of one event. Returns `None` for no records.
    pub fn summarize(hits: &[HitRecord], classification_threshold: Option<f64>) -> Option<EventSummary> {
        if hits.is_empty() {
            return None;
        }

        let count = hits.len() as f64;
        let mean_hits = hits.iter().map(|hit| hit.hit_metric as f64).sum::<f64>() / count;

        let mut mean_color = [0.0f64; 3];
        for hit in hits {
            for (acc, value) in mean_color.iter_mut().zip(hit.average_color.iter()) {
                *acc += *value as f64;
            }
        }
        for component in mean_color.iter_mut() {
            *component /= count;
        }

        let classification = match classification_threshold {
            Some(threshold) if mean_hits <= threshold => Classification::LowActivity,
            _ => Classification::HighActivity,
        };

        Some(EventSummary {
            frame_count: hits.len(),
            mean_hits,
            mean_color,
            classification,
            classification_threshold,
        })
    }
}
