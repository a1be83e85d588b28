#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use blockscan::classify::Classifier;
use blockscan::error::{ClassifyError, DetectionError, VerificationError};
use blockscan::verification::VerificationAdapter;
use blockscan::{AutoDetector, BoundingBox, Classification, LookupClassifier};
use image::{DynamicImage, ImageBuffer, Rgb};
use tempfile::NamedTempFile;

/// The eight blocks of the sample campaign letter, in reading order.
pub fn letter_boxes() -> Vec<BoundingBox> {
    letter().into_iter().map(|(b, _)| b).collect()
}

/// Boxes of the sample letter with what a reader finds in each.
pub fn letter() -> Vec<(BoundingBox, Classification)> {
    vec![
        (BoundingBox::new(290, 23, 164, 124), Classification::image("imagedata")),
        (BoundingBox::new(547, 82, 131, 35), Classification::text("11.23.99")),
        (BoundingBox::new(78, 135, 103, 37), Classification::text("alan,")),
        (
            BoundingBox::new(64, 210, 634, 258),
            Classification::text(
                "I understand that you have volunteered for my campaign. I am grateful to have you on my team",
            ),
        ),
        (
            BoundingBox::new(48, 477, 604, 287),
            Classification::text(
                "Your state is very important to winning back the White House. I am working hard to build a strong grassroot aggregation to carry MI.",
            ),
        ),
        (
            BoundingBox::new(38, 776, 622, 156),
            Classification::text("I hope you will continue working hard. Together I am confident we will win."),
        ),
        (BoundingBox::new(394, 909, 262, 85), Classification::image("image")),
        (BoundingBox::new(170, 944, 165, 49), Classification::text("Sincerely,")),
    ]
}

pub fn letter_classifier() -> LookupClassifier {
    letter().into_iter().collect()
}

/// A white page large enough to hold every letter box.
pub fn blank_page() -> DynamicImage {
    DynamicImage::ImageRgb8(ImageBuffer::from_pixel(720, 1000, Rgb([255u8, 255, 255])))
}

/// Saves `image` as a PNG temp file that is removed when dropped.
pub fn save_temp_png(image: &DynamicImage) -> NamedTempFile {
    let file = tempfile::Builder::new()
        .suffix(".png")
        .tempfile()
        .expect("Failed to create temp image file");
    image
        .save_with_format(file.path(), image::ImageFormat::Png)
        .expect("Failed to save test image");
    file
}

/// Detector returning a fixed list.
pub struct FixedDetector(pub Vec<BoundingBox>);

impl AutoDetector for FixedDetector {
    fn detect(&self, _image: &DynamicImage) -> Result<Vec<BoundingBox>, DetectionError> {
        Ok(self.0.clone())
    }

    fn name(&self) -> &str {
        "fixed"
    }
}

/// Detector that rejects every image.
pub struct FailingDetector;

impl AutoDetector for FailingDetector {
    fn detect(&self, image: &DynamicImage) -> Result<Vec<BoundingBox>, DetectionError> {
        Err(DetectionError::EmptyImage {
            width: image.width(),
            height: image.height(),
        })
    }

    fn name(&self) -> &str {
        "failing"
    }
}

/// Verifier returning its input unchanged.
pub struct IdentityVerifier;

impl VerificationAdapter for IdentityVerifier {
    fn verify(&self, _image: &DynamicImage, boxes: &[BoundingBox]) -> Result<Vec<BoundingBox>, VerificationError> {
        Ok(boxes.to_vec())
    }
}

/// Verifier returning a fixed list regardless of input.
pub struct ReplacingVerifier(pub Vec<BoundingBox>);

impl VerificationAdapter for ReplacingVerifier {
    fn verify(&self, _image: &DynamicImage, _boxes: &[BoundingBox]) -> Result<Vec<BoundingBox>, VerificationError> {
        Ok(self.0.clone())
    }
}

/// Verifier whose transport always fails.
pub struct UnreachableVerifier;

impl VerificationAdapter for UnreachableVerifier {
    fn verify(&self, _image: &DynamicImage, _boxes: &[BoundingBox]) -> Result<Vec<BoundingBox>, VerificationError> {
        Err(VerificationError::Command("connection refused".to_string()))
    }
}

/// Wraps a classifier and records the boxes it was asked about.
pub struct RecordingClassifier<C> {
    pub inner: C,
    pub calls: Arc<Mutex<Vec<BoundingBox>>>,
}

impl<C> RecordingClassifier<C> {
    /// Returns the classifier and a handle to its call log.
    pub fn new(inner: C) -> (Self, Arc<Mutex<Vec<BoundingBox>>>) {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let classifier = Self {
            inner,
            calls: calls.clone(),
        };
        (classifier, calls)
    }
}

impl<C: Classifier> Classifier for RecordingClassifier<C> {
    fn classify(&self, bbox: &BoundingBox, image: &DynamicImage) -> Result<Classification, ClassifyError> {
        self.calls.lock().unwrap().push(*bbox);
        self.inner.classify(bbox, image)
    }

    fn name(&self) -> &str {
        "recording"
    }
}
