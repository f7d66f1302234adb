use super::difference::Difference;
use crate::frame::Frame;
use std::collections::HashSet;

/// Result of scoring one differencing pass
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HitEvaluation {
    pub is_motion: bool,
    /// Set pixel count, or qualifying region count for the contour strategy
    pub hit_metric: u64,
    /// Mean color of the current frame under the mask, only computed for motion
    pub average_color: Option<[u8; 3]>,
}

impl HitEvaluation {
    /// Evaluation for a cycle with nothing to compare against
    pub fn still() -> Self {
        Self {
            is_motion: false,
            hit_metric: 0,
            average_color: None,
        }
    }
}

/// Reduces a motion mask to a hit metric and a motion decision
#[derive(Debug, Clone, Copy)]
pub struct HitEvaluator {
    min_hit_pixels: u64,
}

impl HitEvaluator {
    pub fn new(min_hit_pixels: u64) -> Self {
        Self { min_hit_pixels }
    }

    pub fn evaluate(&self, difference: &Difference, frame: &Frame) -> HitEvaluation {
        match (&difference.regions, &difference.labels) {
            (Some(regions), Some(labels)) => {
                let qualifying: HashSet<u32> = regions
                    .iter()
                    .filter(|region| region.area >= self.min_hit_pixels)
                    .map(|region| region.label)
                    .collect();
                let hit_metric = qualifying.len() as u64;
                let is_motion = hit_metric > 0;
                let average_color = if is_motion {
                    masked_mean(frame, |x, y| qualifying.contains(&labels.get_pixel(x, y)[0]))
                } else {
                    None
                };

                HitEvaluation {
                    is_motion,
                    hit_metric,
                    average_color,
                }
            }
            _ => {
                let hit_metric = difference.mask.count();
                let is_motion = hit_metric > self.min_hit_pixels;
                let average_color = if is_motion {
                    masked_mean(frame, |x, y| difference.mask.is_set(x, y))
                } else {
                    None
                };

                HitEvaluation {
                    is_motion,
                    hit_metric,
                    average_color,
                }
            }
        }
    }
}

/// Truncating per-channel mean over the selected pixels
fn masked_mean<F>(frame: &Frame, selected: F) -> Option<[u8; 3]>
where
    F: Fn(u32, u32) -> bool,
{
    let mut sums = [0u64; 3];
    let mut count = 0u64;

    for (x, y, pixel) in frame.image().enumerate_pixels() {
        if selected(x, y) {
            for (sum, value) in sums.iter_mut().zip(pixel.0.iter()) {
                *sum += *value as u64;
            }
            count += 1;
        }
    }

    if count == 0 {
        return None;
    }

    Some([
        (sums[0] / count) as u8,
        (sums[1] / count) as u8,
        (sums[2] / count) as u8,
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::difference::Differencer;
    use crate::config::{DifferenceStrategy, EngineConfig};
    use image::{Rgb, RgbImage};
    use std::time::SystemTime;

    fn differencer(strategy: DifferenceStrategy) -> Differencer {
        Differencer::new(&EngineConfig {
            strategy,
            blur_kernel_size: 1,
            ..EngineConfig::default()
        })
    }

    fn frame_with_block(id: u64, side: u32, color: [u8; 3]) -> Frame {
        let mut image = RgbImage::from_pixel(60, 60, Rgb([0, 0, 0]));
        for y in 0..side {
            for x in 0..side {
                image.put_pixel(x, y, Rgb(color));
            }
        }
        Frame::new(id, SystemTime::now(), image)
    }

    #[test]
    fn test_identical_frames_score_zero() {
        let frame = frame_with_block(1, 10, [200, 50, 50]);
        let copy = frame_with_block(2, 10, [200, 50, 50]);
        for strategy in [
            DifferenceStrategy::Lab,
            DifferenceStrategy::ChromaYuv,
            DifferenceStrategy::RawContour,
        ] {
            let difference = differencer(strategy)
                .compute(&frame, Some(&copy))
                .unwrap()
                .unwrap();
            let evaluation = HitEvaluator::new(0).evaluate(&difference, &frame);
            assert_eq!(evaluation.hit_metric, 0);
            assert!(!evaluation.is_motion);
            assert!(evaluation.average_color.is_none());
        }
    }

    #[test]
    fn test_mask_hit_must_exceed_minimum() {
        let reference = frame_with_block(1, 0, [0, 0, 0]);
        let current = frame_with_block(2, 10, [255, 0, 0]);
        let difference = differencer(DifferenceStrategy::Lab)
            .compute(&current, Some(&reference))
            .unwrap()
            .unwrap();

        let at_limit = HitEvaluator::new(100).evaluate(&difference, &current);
        assert_eq!(at_limit.hit_metric, 100);
        assert!(!at_limit.is_motion);

        let below_limit = HitEvaluator::new(99).evaluate(&difference, &current);
        assert!(below_limit.is_motion);
        assert_eq!(below_limit.average_color, Some([255, 0, 0]));
    }

    #[test]
    fn test_contour_counts_qualifying_regions() {
        let reference = frame_with_block(1, 0, [0, 0, 0]);
        let mut image = RgbImage::from_pixel(60, 60, Rgb([0, 0, 0]));
        // Corner block, dilated to 12x12
        for y in 0..10 {
            for x in 0..10 {
                image.put_pixel(x, y, Rgb([0, 255, 0]));
            }
        }
        // Single pixel, dilated to 5x5
        image.put_pixel(40, 40, Rgb([255, 255, 255]));
        let current = Frame::new(2, SystemTime::now(), image);

        let difference = differencer(DifferenceStrategy::RawContour)
            .compute(&current, Some(&reference))
            .unwrap()
            .unwrap();

        let evaluation = HitEvaluator::new(25).evaluate(&difference, &current);
        assert_eq!(evaluation.hit_metric, 2);
        assert!(evaluation.is_motion);

        let evaluation = HitEvaluator::new(26).evaluate(&difference, &current);
        assert_eq!(evaluation.hit_metric, 1);
        assert!(evaluation.is_motion);

        let evaluation = HitEvaluator::new(500).evaluate(&difference, &current);
        assert_eq!(evaluation.hit_metric, 0);
        assert!(!evaluation.is_motion);
        assert!(evaluation.average_color.is_none());
    }

    #[test]
    fn test_contour_color_covers_only_qualifying_regions() {
        let reference = frame_with_block(1, 0, [0, 0, 0]);
        let mut image = RgbImage::from_pixel(60, 60, Rgb([0, 0, 0]));
        for y in 2..8 {
            for x in 2..8 {
                image.put_pixel(x, y, Rgb([255, 255, 255]));
            }
        }
        image.put_pixel(40, 40, Rgb([255, 0, 0]));
        let current = Frame::new(2, SystemTime::now(), image);

        let difference = differencer(DifferenceStrategy::RawContour)
            .compute(&current, Some(&reference))
            .unwrap()
            .unwrap();
        let evaluation = HitEvaluator::new(30).evaluate(&difference, &current);
        assert_eq!(evaluation.hit_metric, 1);

        // 6x6 white core inside a 10x10 dilated region: 36 * 255 / 100
        let color = evaluation.average_color.unwrap();
        assert_eq!(color, [91, 91, 91]);
    }

    #[test]
    fn test_masked_mean_truncates() {
        let mut image = RgbImage::from_pixel(2, 1, Rgb([0, 0, 0]));
        image.put_pixel(0, 0, Rgb([1, 2, 3]));
        image.put_pixel(1, 0, Rgb([2, 3, 5]));
        let frame = Frame::new(1, SystemTime::now(), image);

        assert_eq!(masked_mean(&frame, |_, _| true), Some([1, 2, 4]));
        assert_eq!(masked_mean(&frame, |_, _| false), None);
    }
}
