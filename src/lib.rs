pub mod acquire;
pub mod classify;
pub mod detection;
pub mod error;
pub mod models;
pub mod output;
pub mod pipeline;
pub mod verification;

pub use classify::{Classifier, ImageClassifier, LookupClassifier, OcrClassifier};
pub use detection::{AutoDetector, ContourDetector, DetectorConfig};
pub use error::{PipelineError, Result};
pub use models::{BlockRecord, BoundingBox, Classification, Document, Region};
pub use output::{DocumentWriter, OutputFormat, WriteOutcome};
pub use pipeline::{ClassificationPolicy, Orchestrator, PipelineConfig, RunOutcome};
pub use verification::{MatchPolicy, ReconcilingVerifier, VerificationAdapter};
