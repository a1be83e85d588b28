mod fixtures;
#[allow(unused_imports)]
pub use fixtures::*;

// Re-export commonly used types from blockscan for tests; each test binary
// uses a different subset.
#[allow(unused_imports)]
pub use blockscan::{
    BlockRecord, BoundingBox, ClassificationPolicy, Classification, Document, DocumentWriter, LookupClassifier,
    Orchestrator, PipelineConfig, PipelineError, WriteOutcome,
};
