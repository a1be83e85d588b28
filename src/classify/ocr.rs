use image::DynamicImage;
use ocrs::{ImageSource, OcrEngine, OcrEngineParams};
use rten::Model;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument};

use crate::classify::{Classifier, crop, encode_png_base64};
use crate::error::ClassifyError;
use crate::models::{BoundingBox, Classification};

const DETECTION_MODEL_FILENAME: &str = "text-detection.rten";
const RECOGNITION_MODEL_FILENAME: &str = "text-recognition.rten";

/// Standard cache location used by `ocrs-cli`
fn default_model_dir() -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_CACHE_HOME") {
        return PathBuf::from(xdg).join("ocrs");
    }
    let home = std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .unwrap_or_else(|_| ".".to_string());
    Path::new(&home).join(".cache/ocrs")
}

/// Where the OCR models live.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcrConfig {
    pub detection_model_path: PathBuf,
    pub recognition_model_path: PathBuf,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self::from_dir(default_model_dir())
    }
}

impl OcrConfig {
    /// Expects `text-detection.rten` and `text-recognition.rten` in `dir`.
    pub fn from_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self {
            detection_model_path: dir.join(DETECTION_MODEL_FILENAME),
            recognition_model_path: dir.join(RECOGNITION_MODEL_FILENAME),
        }
    }

    pub fn validate(&self) -> Result<(), ClassifyError> {
        for path in [&self.detection_model_path, &self.recognition_model_path] {
            if !path.exists() {
                return Err(ClassifyError::Recognition(format!(
                    "OCR model not found at {}. Please run: ocrs-cli --help (or download models manually)",
                    path.display()
                )));
            }
        }
        Ok(())
    }
}

/// Turns a cropped region into text.
pub trait TextRecognizer: Send + Sync {
    fn recognize(&self, image: &DynamicImage) -> Result<String, ClassifyError>;
}

/// `ocrs` engine with models loaded once and reused for every region.
pub struct OcrsRecognizer {
    engine: OcrEngine,
}

impl OcrsRecognizer {
    #[instrument(skip_all, fields(detection = %config.detection_model_path.display()))]
    pub fn new(config: &OcrConfig) -> Result<Self, ClassifyError> {
        config.validate()?;

        let load = |path: &Path| {
            Model::load_file(path).map_err(|e| {
                ClassifyError::Recognition(format!("failed to load model {}: {}", path.display(), e))
            })
        };
        let detection_model = load(&config.detection_model_path)?;
        let recognition_model = load(&config.recognition_model_path)?;

        let engine = OcrEngine::new(OcrEngineParams {
            detection_model: Some(detection_model),
            recognition_model: Some(recognition_model),
            ..Default::default()
        })
        .map_err(|e| ClassifyError::Recognition(format!("failed to initialise OCR engine: {}", e)))?;

        info!("OCR engine initialized successfully");
        Ok(Self { engine })
    }
}

impl TextRecognizer for OcrsRecognizer {
    fn recognize(&self, image: &DynamicImage) -> Result<String, ClassifyError> {
        let img = image.to_rgb8();

        let img_source = ImageSource::from_bytes(img.as_raw(), img.dimensions())
            .map_err(|e| ClassifyError::Recognition(format!("bad image source: {}", e)))?;
        let ocr_input = self
            .engine
            .prepare_input(img_source)
            .map_err(|e| ClassifyError::Recognition(format!("OCR preprocessing failed: {}", e)))?;
        let text = self
            .engine
            .get_text(&ocr_input)
            .map_err(|e| ClassifyError::Recognition(format!("OCR failed: {}", e)))?;

        Ok(text.trim().to_string())
    }
}

/// Text when the recognizer finds enough characters, image otherwise.
pub struct OcrClassifier<R> {
    recognizer: R,
    min_text_chars: usize,
}

impl OcrClassifier<OcrsRecognizer> {
    /// Load the `ocrs` models described by `config`.
    pub fn from_config(config: &OcrConfig) -> Result<Self, ClassifyError> {
        Ok(Self::new(OcrsRecognizer::new(config)?))
    }
}

impl<R: TextRecognizer> OcrClassifier<R> {
    pub fn new(recognizer: R) -> Self {
        Self {
            recognizer,
            min_text_chars: 2,
        }
    }

    /// Minimum alphanumeric characters for a region to count as text.
    pub fn with_min_text_chars(mut self, min_text_chars: usize) -> Self {
        self.min_text_chars = min_text_chars;
        self
    }

    fn looks_like_text(&self, text: &str) -> bool {
        text.chars().filter(|c| c.is_alphanumeric()).count() >= self.min_text_chars
    }
}

impl<R: TextRecognizer> Classifier for OcrClassifier<R> {
    fn classify(&self, bbox: &BoundingBox, image: &DynamicImage) -> Result<Classification, ClassifyError> {
        let region = crop(image, bbox)?;
        let text = self.recognizer.recognize(&region)?;

        if self.looks_like_text(&text) {
            debug!(%bbox, chars = text.len(), "Region recognized as text");
            Ok(Classification::text(text))
        } else {
            debug!(%bbox, "Region kept as image");
            Ok(Classification::image(encode_png_base64(&region)?))
        }
    }

    fn name(&self) -> &str {
        "ocr"
    }
}
