pub mod contours;
pub mod preprocessing;
pub mod steps;

use std::path::Path;

use image::DynamicImage;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::error::DetectionError;
use crate::models::BoundingBox;
use steps::{BlurStep, DilateStep, EdgeDetectionStep, StepChain};

/// Produces the initial candidate regions for an image.
///
/// Implementations must return the same sequence for the same image; the
/// verification diff relies on it. An empty sequence is a valid answer.
pub trait AutoDetector: Send + Sync {
    fn detect(&self, image: &DynamicImage) -> Result<Vec<BoundingBox>, DetectionError>;

    fn name(&self) -> &str;
}

/// Tuning for [`ContourDetector`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    pub blur_sigma: f32,
    pub canny_low: f32,
    pub canny_high: f32,
    /// How far edge pixels are grown before labelling. Larger values join
    /// words into lines and lines into paragraphs.
    pub dilate_radius: u8,
    /// Components with fewer pixels than this are treated as noise.
    pub min_area: u32,
    pub padding: u32,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            blur_sigma: 1.5,
            canny_low: 50.0,
            canny_high: 100.0,
            dilate_radius: 6,
            min_area: 30,
            padding: 4,
        }
    }
}

/// Edge and connected-component block detector.
pub struct ContourDetector {
    config: DetectorConfig,
    chain: StepChain,
}

impl ContourDetector {
    pub fn new(config: DetectorConfig) -> Self {
        let chain = Self::build_chain(&config);
        Self { config, chain }
    }

    fn build_chain(config: &DetectorConfig) -> StepChain {
        StepChain::new()
            .add_step(BlurStep {
                sigma: config.blur_sigma,
            })
            .add_step(EdgeDetectionStep {
                low_threshold: config.canny_low,
                high_threshold: config.canny_high,
            })
            .add_step(DilateStep {
                radius: config.dilate_radius,
            })
    }

    /// Save every intermediate image under `output_dir`, which must be empty.
    pub fn with_debug(mut self, output_dir: impl AsRef<Path>) -> Result<Self, DetectionError> {
        self.chain = Self::build_chain(&self.config).with_debug(output_dir)?;
        Ok(self)
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }
}

impl Default for ContourDetector {
    fn default() -> Self {
        Self::new(DetectorConfig::default())
    }
}

impl AutoDetector for ContourDetector {
    #[instrument(skip_all, fields(width = image.width(), height = image.height()))]
    fn detect(&self, image: &DynamicImage) -> Result<Vec<BoundingBox>, DetectionError> {
        let (width, height) = (image.width(), image.height());
        if width == 0 || height == 0 {
            return Err(DetectionError::EmptyImage { width, height });
        }

        let mask = self.chain.run(image)?;
        let found = contours::find_contours(&mask, self.config.min_area);
        debug!(contours = found.len(), "Contours found");

        let boxes = found
            .iter()
            .map(|c| c.padded_box(self.config.padding, width, height))
            .collect();
        let blocks = contours::merge_overlapping(boxes);

        info!(blocks = blocks.len(), "Detection complete");
        Ok(blocks)
    }

    fn name(&self) -> &str {
        "contour"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn page_with_blobs() -> DynamicImage {
        let mut img = RgbImage::from_pixel(200, 120, Rgb([255, 255, 255]));
        for (x0, y0) in [(120u32, 70u32), (20, 20)] {
            for y in y0..y0 + 20 {
                for x in x0..x0 + 40 {
                    img.put_pixel(x, y, Rgb([0, 0, 0]));
                }
            }
        }
        DynamicImage::ImageRgb8(img)
    }

    #[test]
    fn blank_page_has_no_blocks() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(50, 50, Rgb([255, 255, 255])));
        let blocks = ContourDetector::default().detect(&img).unwrap();
        assert!(blocks.is_empty());
    }

    #[test]
    fn empty_image_is_an_error() {
        let img = DynamicImage::new_rgb8(0, 0);
        let err = ContourDetector::default().detect(&img).unwrap_err();
        assert!(matches!(err, DetectionError::EmptyImage { .. }));
    }

    #[test]
    fn separated_blobs_become_blocks_in_reading_order() {
        let detector = ContourDetector::default();
        let blocks = detector.detect(&page_with_blobs()).unwrap();

        assert_eq!(blocks.len(), 2);
        assert!(blocks[0].top < blocks[1].top);
        assert!(blocks[0].left <= 20 && blocks[0].right() >= 60);
        assert!(blocks[1].left <= 120 && blocks[1].right() >= 160);
        for b in &blocks {
            assert!(b.fits_within(200, 120));
        }
    }

    #[test]
    fn debug_output_has_one_directory_per_transforming_step() {
        let dir = tempfile::TempDir::new().unwrap();
        let out = dir.path().join("debug");
        let detector = ContourDetector::default().with_debug(&out).unwrap();
        detector.detect(&page_with_blobs()).unwrap();

        let mut names: Vec<String> = std::fs::read_dir(&out)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        assert_eq!(
            names,
            ["00_input", "01_gaussian_blur", "02_edge_detection", "03_dilation"]
        );
    }

    #[test]
    fn detection_is_stable() {
        let detector = ContourDetector::default();
        let img = page_with_blobs();
        assert_eq!(detector.detect(&img).unwrap(), detector.detect(&img).unwrap());
    }
}
