use std::path::{Path, PathBuf};

use image::{DynamicImage, GrayImage};
use tracing::debug;

use crate::detection::preprocessing;
use crate::error::DetectionError;

/// One image-to-image preprocessing stage of the detector.
pub trait DetectionStep: Send + Sync {
    fn apply(&self, image: GrayImage) -> GrayImage;

    /// Human-readable name (used in logs and debug directory names)
    fn name(&self) -> &str;
}

/// Apply Gaussian blur
pub struct BlurStep {
    pub sigma: f32,
}

impl DetectionStep for BlurStep {
    fn apply(&self, image: GrayImage) -> GrayImage {
        preprocessing::apply_blur(&image, self.sigma)
    }

    fn name(&self) -> &str {
        "Gaussian Blur"
    }
}

/// Detect edges using Canny
pub struct EdgeDetectionStep {
    pub low_threshold: f32,
    pub high_threshold: f32,
}

impl DetectionStep for EdgeDetectionStep {
    fn apply(&self, image: GrayImage) -> GrayImage {
        preprocessing::detect_edges(&image, self.low_threshold, self.high_threshold)
    }

    fn name(&self) -> &str {
        "Edge Detection"
    }
}

/// Fuse neighbouring strokes into blocks
pub struct DilateStep {
    pub radius: u8,
}

impl DetectionStep for DilateStep {
    fn apply(&self, image: GrayImage) -> GrayImage {
        preprocessing::merge_strokes(&image, self.radius)
    }

    fn name(&self) -> &str {
        "Dilation"
    }
}

/// Debug output settings for a step chain
#[derive(Clone, Debug)]
pub struct DebugConfig {
    /// Root directory for debug outputs
    pub output_dir: PathBuf,
}

impl DebugConfig {
    /// The directory must be empty or non-existent
    pub fn new(output_dir: PathBuf) -> Result<Self, DetectionError> {
        let debug_err = |e: std::io::Error| DetectionError::DebugOutput {
            path: output_dir.clone(),
            reason: e.to_string(),
        };

        if output_dir.exists() {
            let mut entries = std::fs::read_dir(&output_dir).map_err(debug_err)?;
            if entries.next().is_some() {
                return Err(DetectionError::DebugOutput {
                    path: output_dir.clone(),
                    reason: "debug directory is not empty".to_string(),
                });
            }
        } else {
            std::fs::create_dir_all(&output_dir).map_err(debug_err)?;
        }

        Ok(Self { output_dir })
    }

    fn save(&self, dir_name: &str, image: &GrayImage) -> Result<(), DetectionError> {
        let step_dir = self.output_dir.join(dir_name);
        let output_path = step_dir.join("01.png");
        std::fs::create_dir_all(&step_dir).map_err(|e| DetectionError::DebugOutput {
            path: step_dir.clone(),
            reason: e.to_string(),
        })?;
        image.save(&output_path).map_err(|e| DetectionError::DebugOutput {
            path: output_path.clone(),
            reason: e.to_string(),
        })?;
        debug!("Debug: saved {}/01.png", dir_name);
        Ok(())
    }
}

/// Ordered preprocessing steps, run once per image.
#[derive(Default)]
pub struct StepChain {
    steps: Vec<Box<dyn DetectionStep>>,
    debug: Option<DebugConfig>,
}

impl StepChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_step(mut self, step: impl DetectionStep + 'static) -> Self {
        self.steps.push(Box::new(step));
        self
    }

    pub fn with_debug(mut self, output_dir: impl AsRef<Path>) -> Result<Self, DetectionError> {
        self.debug = Some(DebugConfig::new(output_dir.as_ref().to_path_buf())?);
        Ok(self)
    }

    /// Convert to grayscale, run every step in order and return the final mask.
    pub fn run(&self, input: &DynamicImage) -> Result<GrayImage, DetectionError> {
        let mut data = preprocessing::to_grayscale(input);

        if let Some(debug_config) = &self.debug {
            debug_config.save("00_input", &data)?;
        }

        for (step_idx, step) in self.steps.iter().enumerate() {
            debug!(step = step.name(), "Running detection step");
            data = step.apply(data);

            if let Some(debug_config) = &self.debug {
                let dir_name = format!(
                    "{:02}_{}",
                    step_idx + 1,
                    step.name().to_lowercase().replace(' ', "_")
                );
                debug_config.save(&dir_name, &data)?;
            }
        }

        Ok(data)
    }
}
