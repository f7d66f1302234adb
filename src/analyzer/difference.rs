use super::color::{rgb_to_chroma, rgb_to_lab};
use crate::config::{DifferenceStrategy, EngineConfig};
use crate::error::{AnalyzerError, Result};
use crate::frame::Frame;

use image::{GrayImage, ImageBuffer, Luma, RgbImage};
use imageproc::{
    distance_transform::Norm,
    filter::separable_filter_equal,
    map::map_colors,
    morphology::dilate,
    region_labelling::{connected_components, Connectivity},
};
use std::collections::BTreeMap;
use tracing::trace;

type FloatImage = ImageBuffer<Luma<f32>, Vec<f32>>;

/// Per-pixel difference between two frames, same dimensions as the frames
#[derive(Debug, Clone, PartialEq)]
pub struct DifferenceMap {
    image: FloatImage,
}

impl DifferenceMap {
    fn from_image(image: FloatImage) -> Self {
        Self { image }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    pub fn get(&self, x: u32, y: u32) -> f32 {
        self.image.get_pixel(x, y)[0]
    }

    pub fn values(&self) -> &[f32] {
        self.image.as_raw()
    }

    pub fn max_value(&self) -> f32 {
        self.values().iter().copied().fold(0.0, f32::max)
    }

    /// Render with values saturated into 0..=255
    pub fn to_luma(&self) -> GrayImage {
        map_colors(&self.image, |p| Luma([p[0].round().clamp(0.0, 255.0) as u8]))
    }
}

/// Binary motion mask. Set pixels hold 255, clear pixels 0.
#[derive(Debug, Clone, PartialEq)]
pub struct MotionMask {
    image: GrayImage,
}

impl MotionMask {
    fn from_image(image: GrayImage) -> Self {
        Self { image }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    pub fn is_set(&self, x: u32, y: u32) -> bool {
        self.image.get_pixel(x, y)[0] != 0
    }

    /// Number of set pixels
    pub fn count(&self) -> u64 {
        self.image.pixels().filter(|p| p[0] != 0).count() as u64
    }

    pub fn as_image(&self) -> &GrayImage {
        &self.image
    }
}

/// One connected region of the raw contour mask
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub label: u32,
    /// Pixel area of the region
    pub area: u64,
}

/// Visualization retained alongside each frame of an open event
#[derive(Debug, Clone, PartialEq)]
pub enum Delta {
    Map(DifferenceMap),
    Mask(MotionMask),
}

impl Delta {
    pub fn dimensions(&self) -> (u32, u32) {
        match self {
            Delta::Map(map) => map.dimensions(),
            Delta::Mask(mask) => mask.dimensions(),
        }
    }

    #[cfg(test)]
    pub(crate) fn from_luma(image: GrayImage) -> Self {
        Delta::Mask(MotionMask::from_image(image))
    }

    pub fn to_luma(&self) -> GrayImage {
        match self {
            Delta::Map(map) => map.to_luma(),
            Delta::Mask(mask) => mask.as_image().clone(),
        }
    }
}

/// Output of one differencing pass
#[derive(Debug, Clone)]
pub struct Difference {
    pub mask: MotionMask,
    pub map: DifferenceMap,
    /// Connected regions, raw contour strategy only
    pub regions: Option<Vec<Region>>,
    pub(crate) labels: Option<ImageBuffer<Luma<u32>, Vec<u32>>>,
}

impl Difference {
    /// The visualization kept for the event chain: the difference map for the
    /// smoothed strategies, the dilated mask for the contour strategy.
    pub fn into_delta(self) -> Delta {
        if self.regions.is_some() {
            Delta::Mask(self.mask)
        } else {
            Delta::Map(self.map)
        }
    }
}

/// Computes motion masks from a frame and its reference
#[derive(Debug, Clone)]
pub struct Differencer {
    strategy: DifferenceStrategy,
    difference_threshold: f32,
    contour_threshold: f32,
    blur_kernel: Vec<f32>,
    dilate_iterations: u8,
}

impl Differencer {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            strategy: config.strategy,
            difference_threshold: config.difference_threshold as f32,
            contour_threshold: config.contour_threshold as f32,
            blur_kernel: gaussian_kernel(config.blur_kernel_size),
            dilate_iterations: config.dilate_iterations,
        }
    }

    pub fn strategy(&self) -> DifferenceStrategy {
        self.strategy
    }

    /// Difference `current` against `reference`.
    ///
    /// Returns `Ok(None)` when there is no reference yet, which the engine
    /// treats as a still cycle.
    pub fn compute(&self, current: &Frame, reference: Option<&Frame>) -> Result<Option<Difference>> {
        let reference = match reference {
            Some(reference) => reference,
            None => return Ok(None),
        };

        if current.dimensions() != reference.dimensions() {
            let (expected_width, expected_height) = reference.dimensions();
            let (actual_width, actual_height) = current.dimensions();
            return Err(AnalyzerError::DimensionMismatch {
                expected_width,
                expected_height,
                actual_width,
                actual_height,
            }
            .into());
        }

        let difference = match self.strategy {
            DifferenceStrategy::Lab => {
                let raw = channel_difference(current.image(), reference.image(), rgb_to_lab);
                self.smoothed(raw)
            }
            DifferenceStrategy::ChromaYuv => {
                let raw = channel_difference(current.image(), reference.image(), rgb_to_chroma);
                self.smoothed(raw)
            }
            DifferenceStrategy::RawContour => self.contoured(current.image(), reference.image()),
        };

        trace!(
            "Frame {} vs {}: {:?} peak difference {:.3}",
            current.id,
            reference.id,
            self.strategy,
            difference.map.max_value()
        );

        Ok(Some(difference))
    }

    fn smoothed(&self, raw: DifferenceMap) -> Difference {
        let map = if self.blur_kernel.len() > 1 {
            DifferenceMap::from_image(separable_filter_equal(&raw.image, &self.blur_kernel))
        } else {
            raw
        };
        let mask = threshold(&map, self.difference_threshold);
        Difference {
            mask,
            map,
            regions: None,
            labels: None,
        }
    }

    fn contoured(&self, current: &RgbImage, reference: &RgbImage) -> Difference {
        let unit = DifferenceMap::from_image(FloatImage::from_fn(
            current.width(),
            current.height(),
            |x, y| {
                let a = current.get_pixel(x, y);
                let b = reference.get_pixel(x, y);
                let sum: u32 = (0..3).map(|c| a[c].abs_diff(b[c]) as u32).sum();
                Luma([sum as f32 / (3.0 * 255.0)])
            },
        ));

        let thresholded = threshold(&unit, self.contour_threshold);
        let dilated = if self.dilate_iterations > 0 {
            dilate(thresholded.as_image(), Norm::LInf, self.dilate_iterations)
        } else {
            thresholded.as_image().clone()
        };

        let labels = connected_components(&dilated, Connectivity::Eight, Luma([0u8]));
        let mut areas: BTreeMap<u32, u64> = BTreeMap::new();
        for pixel in labels.pixels() {
            if pixel[0] > 0 {
                *areas.entry(pixel[0]).or_insert(0) += 1;
            }
        }
        let regions = areas
            .into_iter()
            .map(|(label, area)| Region { label, area })
            .collect();

        // Scale to bytes so the visual matches the other strategies
        let map = DifferenceMap::from_image(map_colors(&unit.image, |p| Luma([p[0] * 255.0])));

        Difference {
            mask: MotionMask::from_image(dilated),
            map,
            regions: Some(regions),
            labels: Some(labels),
        }
    }
}

/// Sum of absolute per-channel differences after projection, divided by the
/// channel count.
fn channel_difference<const N: usize>(
    current: &RgbImage,
    reference: &RgbImage,
    project: fn([u8; 3]) -> [u8; N],
) -> DifferenceMap {
    DifferenceMap::from_image(FloatImage::from_fn(
        current.width(),
        current.height(),
        |x, y| {
            let pa = project(current.get_pixel(x, y).0);
            let pb = project(reference.get_pixel(x, y).0);
            let sum: u32 = pa
                .iter()
                .zip(pb.iter())
                .map(|(a, b)| a.abs_diff(*b) as u32)
                .sum();
            Luma([sum as f32 / N as f32])
        },
    ))
}

/// Set where the difference strictly exceeds `level`
fn threshold(map: &DifferenceMap, level: f32) -> MotionMask {
    MotionMask::from_image(map_colors(&map.image, |p| {
        Luma([if p[0] > level { 255u8 } else { 0u8 }])
    }))
}

/// Normalized 1-D Gaussian for an odd kernel size, with sigma derived from the
/// size the way OpenCV does when sigma is left at zero.
pub(crate) fn gaussian_kernel(size: u32) -> Vec<f32> {
    let size = size.max(1) as usize;
    if size == 1 {
        return vec![1.0];
    }

    let sigma = 0.3 * ((size as f64 - 1.0) * 0.5 - 1.0) + 0.8;
    let center = (size / 2) as f64;
    let weights: Vec<f64> = (0..size)
        .map(|i| {
            let d = i as f64 - center;
            (-(d * d) / (2.0 * sigma * sigma)).exp()
        })
        .collect();
    let total: f64 = weights.iter().sum();
    weights.iter().map(|w| (w / total) as f32).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;
    use std::time::SystemTime;

    fn config_for(strategy: DifferenceStrategy) -> EngineConfig {
        EngineConfig {
            strategy,
            blur_kernel_size: 5,
            ..EngineConfig::default()
        }
    }

    fn solid(id: u64, width: u32, height: u32, color: [u8; 3]) -> Frame {
        Frame::new(id, SystemTime::now(), RgbImage::from_pixel(width, height, Rgb(color)))
    }

    fn with_square(id: u64, base: [u8; 3], square: [u8; 3], origin: u32, side: u32) -> Frame {
        let mut image = RgbImage::from_pixel(40, 30, Rgb(base));
        for y in origin..origin + side {
            for x in origin..origin + side {
                image.put_pixel(x, y, Rgb(square));
            }
        }
        Frame::new(id, SystemTime::now(), image)
    }

    const ALL: [DifferenceStrategy; 3] = [
        DifferenceStrategy::Lab,
        DifferenceStrategy::ChromaYuv,
        DifferenceStrategy::RawContour,
    ];

    #[test]
    fn test_first_frame_has_no_mask() {
        for strategy in ALL {
            let differencer = Differencer::new(&config_for(strategy));
            let frame = solid(1, 8, 8, [10, 20, 30]);
            assert!(differencer.compute(&frame, None).unwrap().is_none());
        }
    }

    #[test]
    fn test_identical_frames_have_empty_mask() {
        for strategy in ALL {
            let differencer = Differencer::new(&config_for(strategy));
            let a = with_square(1, [40, 90, 160], [250, 10, 10], 5, 8);
            let b = with_square(2, [40, 90, 160], [250, 10, 10], 5, 8);
            let difference = differencer.compute(&a, Some(&b)).unwrap().unwrap();
            assert_eq!(difference.mask.count(), 0, "{:?}", strategy);
            assert_eq!(difference.map.max_value(), 0.0);
            if let Some(regions) = &difference.regions {
                assert!(regions.is_empty());
            }
        }
    }

    #[test]
    fn test_mask_preserves_frame_shape() {
        for strategy in ALL {
            let differencer = Differencer::new(&config_for(strategy));
            let a = solid(1, 37, 23, [0, 0, 0]);
            let b = solid(2, 37, 23, [255, 255, 255]);
            let difference = differencer.compute(&a, Some(&b)).unwrap().unwrap();
            assert_eq!(difference.mask.dimensions(), (37, 23));
            assert_eq!(difference.map.dimensions(), (37, 23));
        }
    }

    #[test]
    fn test_dimension_mismatch_fails_fast() {
        let differencer = Differencer::new(&config_for(DifferenceStrategy::Lab));
        let a = solid(1, 8, 8, [0, 0, 0]);
        let b = solid(2, 8, 9, [0, 0, 0]);
        let result = differencer.compute(&a, Some(&b));
        assert!(matches!(
            result,
            Err(crate::error::ChaincamError::Analyzer(
                AnalyzerError::DimensionMismatch { .. }
            ))
        ));
    }

    #[test]
    fn test_lab_detects_moving_square() {
        let differencer = Differencer::new(&config_for(DifferenceStrategy::Lab));
        let still = solid(1, 40, 30, [40, 90, 160]);
        let moved = with_square(2, [40, 90, 160], [250, 240, 10], 10, 10);
        let difference = differencer.compute(&moved, Some(&still)).unwrap().unwrap();

        assert!(difference.mask.is_set(15, 15));
        assert!(!difference.mask.is_set(0, 0));
        assert!(difference.regions.is_none());
        assert!(matches!(difference.into_delta(), Delta::Map(_)));
    }

    #[test]
    fn test_chroma_ignores_pure_brightness_change() {
        let differencer = Differencer::new(&config_for(DifferenceStrategy::ChromaYuv));
        let dark = solid(1, 20, 20, [60, 60, 60]);
        let bright = solid(2, 20, 20, [200, 200, 200]);
        let difference = differencer.compute(&bright, Some(&dark)).unwrap().unwrap();
        assert_eq!(difference.mask.count(), 0);

        let lab = Differencer::new(&config_for(DifferenceStrategy::Lab));
        let difference = lab.compute(&bright, Some(&dark)).unwrap().unwrap();
        assert_eq!(difference.mask.count(), 400);
    }

    #[test]
    fn test_contour_regions_are_dilated() {
        let differencer = Differencer::new(&config_for(DifferenceStrategy::RawContour));
        let still = solid(1, 40, 30, [0, 0, 0]);
        let moved = with_square(2, [0, 0, 0], [255, 255, 255], 10, 4);
        let difference = differencer.compute(&moved, Some(&still)).unwrap().unwrap();

        let regions = difference.regions.clone().unwrap();
        assert_eq!(regions.len(), 1);
        // 4x4 square grown by two pixels on each side
        assert_eq!(regions[0].area, 64);
        assert_eq!(difference.mask.count(), 64);
        assert!(matches!(difference.into_delta(), Delta::Mask(_)));
    }

    #[test]
    fn test_contour_separates_distant_regions() {
        let differencer = Differencer::new(&config_for(DifferenceStrategy::RawContour));
        let still = solid(1, 40, 30, [0, 0, 0]);
        let mut image = RgbImage::from_pixel(40, 30, Rgb([0, 0, 0]));
        image.put_pixel(2, 2, Rgb([255, 255, 255]));
        for y in 15..25 {
            for x in 25..35 {
                image.put_pixel(x, y, Rgb([255, 255, 255]));
            }
        }
        let moved = Frame::new(2, SystemTime::now(), image);
        let difference = differencer.compute(&moved, Some(&still)).unwrap().unwrap();

        let mut areas: Vec<u64> = difference.regions.unwrap().iter().map(|r| r.area).collect();
        areas.sort_unstable();
        assert_eq!(areas, vec![25, 196]);
    }

    #[test]
    fn test_contour_threshold_above_unit_range_never_fires() {
        let mut config = config_for(DifferenceStrategy::RawContour);
        config.contour_threshold = 254.0;
        let differencer = Differencer::new(&config);
        let a = solid(1, 10, 10, [0, 0, 0]);
        let b = solid(2, 10, 10, [255, 255, 255]);
        let difference = differencer.compute(&a, Some(&b)).unwrap().unwrap();
        assert_eq!(difference.mask.count(), 0);
    }

    #[test]
    fn test_gaussian_kernel_is_normalized() {
        let kernel = gaussian_kernel(21);
        assert_eq!(kernel.len(), 21);
        let sum: f32 = kernel.iter().sum();
        assert!((sum - 1.0).abs() < 1e-5);
        assert_eq!(kernel[0], kernel[20]);
        assert!(kernel[10] > kernel[9]);
        assert_eq!(gaussian_kernel(1), vec![1.0]);
    }

    #[test]
    fn test_blur_preserves_constant_maps() {
        let differencer = Differencer::new(&config_for(DifferenceStrategy::Lab));
        let raw = DifferenceMap::from_image(FloatImage::from_pixel(6, 4, Luma([12.0])));
        let smoothed = differencer.smoothed(raw);
        for value in smoothed.map.values() {
            assert!((value - 12.0).abs() < 1e-4);
        }
        assert_eq!(smoothed.mask.count(), 0);
    }

    #[test]
    fn test_blur_spreads_a_spike_symmetrically() {
        let differencer = Differencer::new(&config_for(DifferenceStrategy::Lab));
        let mut spike = FloatImage::new(9, 9);
        spike.put_pixel(4, 4, Luma([100.0]));
        let map = differencer.smoothed(DifferenceMap::from_image(spike)).map;

        let total: f32 = map.values().iter().sum();
        assert!((total - 100.0).abs() < 1e-2);
        assert!(map.get(4, 4) < 100.0);
        assert!(map.get(4, 4) > map.get(5, 4));
        assert!((map.get(3, 4) - map.get(5, 4)).abs() < 1e-5);
        assert!((map.get(4, 2) - map.get(2, 4)).abs() < 1e-5);
        assert_eq!(map.get(0, 0), 0.0);
    }

    #[test]
    fn test_threshold_is_strict() {
        let mut image = FloatImage::new(3, 1);
        image.put_pixel(0, 0, Luma([25.0]));
        image.put_pixel(1, 0, Luma([25.5]));
        let mask = threshold(&DifferenceMap::from_image(image), 25.0);
        assert!(!mask.is_set(0, 0));
        assert!(mask.is_set(1, 0));
        assert!(!mask.is_set(2, 0));
        assert_eq!(mask.count(), 1);
    }
}
