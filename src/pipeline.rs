use std::path::Path;
use std::str::FromStr;

use image::DynamicImage;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::acquire;
use crate::classify::Classifier;
use crate::detection::AutoDetector;
use crate::error::{ClassifyError, PipelineError, Result, VerificationError};
use crate::models::{BoundingBox, Classification, Document, Region};
use crate::output::{DocumentWriter, WriteOutcome};
use crate::verification::VerificationAdapter;

/// What to do when a single region cannot be classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClassificationPolicy {
    /// Record empty text for the region, report it in [`RunOutcome::failures`]
    /// and keep going. The written document itself cannot tell such a region
    /// from one that really holds no text; [`RunOutcome::placeholder_indices`]
    /// is the only record of the difference.
    #[default]
    Placeholder,
    /// Fail the whole run on the first region that cannot be classified.
    Abort,
}

impl FromStr for ClassificationPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "placeholder" => Ok(ClassificationPolicy::Placeholder),
            "abort" => Ok(ClassificationPolicy::Abort),
            other => Err(format!("unknown policy `{other}` (expected placeholder or abort)")),
        }
    }
}

/// Run configuration, passed to [`Orchestrator::new`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub classification_policy: ClassificationPolicy,
    /// Regions smaller than this many pixels are recorded as empty text
    /// without being classified. Zero disables the rule.
    pub min_block_area: u64,
}

/// Pipeline stages, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Detecting,
    Verifying,
    Classifying,
    Serializing,
    Done,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Stage::Detecting => "detecting",
            Stage::Verifying => "verifying",
            Stage::Classifying => "classifying",
            Stage::Serializing => "serializing",
            Stage::Done => "done",
        };
        f.write_str(name)
    }
}

/// A region that got a placeholder instead of a real classification.
#[derive(Debug)]
pub struct RegionFailure {
    pub index: usize,
    pub bbox: BoundingBox,
    pub error: ClassifyError,
}

/// Everything one run produced.
#[derive(Debug)]
pub struct RunOutcome {
    pub document: Document,
    /// Detector output before verification.
    pub detected: Vec<BoundingBox>,
    /// Set when verification failed and the detector output was used as is.
    pub verification_failure: Option<VerificationError>,
    /// Degenerate boxes that were dropped before classification.
    pub rejected: Vec<BoundingBox>,
    pub failures: Vec<RegionFailure>,
}

impl RunOutcome {
    /// True when the document was produced with a fallback of some kind.
    pub fn is_degraded(&self) -> bool {
        self.verification_failure.is_some() || !self.failures.is_empty()
    }

    /// Indices of regions written as empty-text placeholders, ascending.
    pub fn placeholder_indices(&self) -> Vec<usize> {
        self.failures.iter().map(|f| f.index).collect()
    }
}

/// Runs detection, best-effort verification and classification for one image
/// at a time. Holds no state between runs.
pub struct Orchestrator {
    config: PipelineConfig,
    detector: Box<dyn AutoDetector>,
    verifier: Box<dyn VerificationAdapter>,
    classifier: Box<dyn Classifier>,
}

impl Orchestrator {
    pub fn new(
        config: PipelineConfig,
        detector: impl AutoDetector + 'static,
        verifier: impl VerificationAdapter + 'static,
        classifier: impl Classifier + 'static,
    ) -> Self {
        Self {
            config,
            detector: Box::new(detector),
            verifier: Box::new(verifier),
            classifier: Box::new(classifier),
        }
    }

    /// Build the document for `image`.
    ///
    /// Only detection, a classification failure under
    /// [`ClassificationPolicy::Abort`], or a broken invariant end the run
    /// early. Verification failures fall back to the detector's boxes.
    #[instrument(skip_all, fields(width = image.width(), height = image.height(), detector = self.detector.name()))]
    pub fn run(&self, image: &DynamicImage) -> Result<RunOutcome> {
        enter(Stage::Detecting);
        let detected = self.detector.detect(image)?;
        info!(boxes = detected.len(), "Detected candidate regions");

        enter(Stage::Verifying);
        let (boxes, verification_failure) = match self.verifier.verify(image, &detected) {
            Ok(boxes) => (boxes, None),
            Err(e) => {
                warn!(error = %e, "Verification failed; continuing with unverified detector output");
                (detected.clone(), Some(e))
            }
        };

        let (accepted, rejected): (Vec<BoundingBox>, Vec<BoundingBox>) =
            boxes.into_iter().partition(|b| !b.is_degenerate());
        for bbox in &rejected {
            warn!(%bbox, "Dropping box with no area");
        }

        // Indices are fixed from here on.
        let mut regions: Vec<Region> = accepted.into_iter().map(Region::new).collect();

        enter(Stage::Classifying);
        let mut failures = Vec::new();
        for (index, region) in regions.iter_mut().enumerate() {
            let bbox = region.bbox;
            let classification = match self.classify_region(&bbox, image) {
                Ok(classification) => classification,
                Err(error) => match self.config.classification_policy {
                    ClassificationPolicy::Abort => {
                        return Err(PipelineError::Classification {
                            index,
                            bbox,
                            source: error,
                        });
                    }
                    ClassificationPolicy::Placeholder => {
                        warn!(index, %bbox, error = %error, "Region left unrecognized");
                        failures.push(RegionFailure { index, bbox, error });
                        Classification::text("")
                    }
                },
            };
            region.classify(classification)?;
        }

        let document = Document::new(regions);
        if let Some(index) = document.first_unclassified() {
            return Err(PipelineError::Unclassified {
                index,
                bbox: document.regions()[index].bbox,
            });
        }

        info!(
            regions = document.len(),
            rejected = rejected.len(),
            failures = failures.len(),
            verified = verification_failure.is_none(),
            "Document assembled"
        );

        Ok(RunOutcome {
            document,
            detected,
            verification_failure,
            rejected,
            failures,
        })
    }

    /// Run and hand the document to `writer`.
    pub fn run_to(&self, image: &DynamicImage, writer: &DocumentWriter) -> Result<(RunOutcome, WriteOutcome)> {
        let outcome = self.run(image)?;

        enter(Stage::Serializing);
        let written = writer.write(&outcome.document)?;

        enter(Stage::Done);
        Ok((outcome, written))
    }

    /// Load `path`, run, and write. The image is dropped when the run ends.
    pub fn run_file(&self, path: impl AsRef<Path>, writer: &DocumentWriter) -> Result<(RunOutcome, WriteOutcome)> {
        let image = acquire::load_image(path)?;
        self.run_to(&image, writer)
    }

    fn classify_region(&self, bbox: &BoundingBox, image: &DynamicImage) -> std::result::Result<Classification, ClassifyError> {
        if bbox.area() < self.config.min_block_area {
            debug!(%bbox, "Region below minimum area; recorded as empty text");
            return Ok(Classification::text(""));
        }
        self.classifier.classify(bbox, image)
    }
}

fn enter(stage: Stage) {
    debug!(%stage, "Entering stage");
}
