// Error types, one enum per pipeline stage.

use std::path::PathBuf;

use thiserror::Error;

use crate::models::BoundingBox;

/// Reading and decoding the input image. Always fatal.
#[derive(Debug, Error)]
pub enum AcquisitionError {
    #[error("file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("failed to decode image {}: {source}", .path.display())]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
}

/// Automatic region detection. Always fatal.
#[derive(Debug, Error)]
pub enum DetectionError {
    #[error("image has no pixels ({width}x{height})")]
    EmptyImage { width: u32, height: u32 },

    #[error("failed to write debug output to {}: {reason}", .path.display())]
    DebugOutput { path: PathBuf, reason: String },
}

/// Human verification. Recoverable: the pipeline falls back to detector output.
#[derive(Debug, Error)]
pub enum VerificationError {
    #[error("cannot read corrections from {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed corrections: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("reviewer command failed: {0}")]
    Command(String),

    #[error("reviewer did not answer within {0:?}")]
    Timeout(std::time::Duration),

    #[error("reviewer rejected the request: {0}")]
    Rejected(String),
}

/// Classifying one region.
#[derive(Debug, Error)]
pub enum ClassifyError {
    #[error("box {bbox} lies outside the {width}x{height} image")]
    OutOfBounds {
        bbox: BoundingBox,
        width: u32,
        height: u32,
    },

    #[error("box {0} has no area")]
    Degenerate(BoundingBox),

    #[error("no classification available for box {0}")]
    NoMatch(BoundingBox),

    #[error("text recognition failed: {0}")]
    Recognition(String),

    #[error("failed to encode region image: {0}")]
    Encode(#[from] image::ImageError),
}

/// Writing the serialized document. Always fatal.
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("cannot create output next to {}: {source}", .path.display())]
    Create {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize document for {}: {reason}", .path.display())]
    Serialize { path: PathBuf, reason: String },

    #[error("failed to write {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to move output into place at {}: {source}", .path.display())]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Document(#[from] Box<PipelineError>),
}

/// Fatal outcome of a pipeline run.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Acquisition(#[from] AcquisitionError),

    #[error("detection failed: {0}")]
    Detection(#[from] DetectionError),

    #[error("classification of region {index} {bbox} failed: {source}")]
    Classification {
        index: usize,
        bbox: BoundingBox,
        #[source]
        source: ClassifyError,
    },

    #[error("region {index} {bbox} reached serialization unclassified")]
    Unclassified { index: usize, bbox: BoundingBox },

    #[error("region {0} was classified twice")]
    AlreadyClassified(BoundingBox),

    #[error(transparent)]
    Output(#[from] OutputError),
}

pub type Result<T> = std::result::Result<T, PipelineError>;

/// Parsing a serialized document back into records.
#[derive(Debug, Error)]
pub enum ReadError {
    #[error("malformed XML at byte {position}: {reason}")]
    Xml { position: usize, reason: String },

    #[error("malformed JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("block {block} is missing attribute `{name}`")]
    MissingAttribute { block: usize, name: &'static str },

    #[error("block {block} has invalid `{name}` value {value:?}")]
    InvalidValue {
        block: usize,
        name: &'static str,
        value: String,
    },
}
