pub mod channel;
pub mod reconcile;

use image::DynamicImage;
use tracing::{info, instrument};

use crate::error::VerificationError;
use crate::models::BoundingBox;

pub use channel::{CorrectionsFile, ExternalCommand, PassThrough, VerificationChannel};
pub use reconcile::{BoxEdit, MatchPolicy, Reconciliation, reconcile};

/// Corrects detector output: may add, remove or resize boxes, or fail.
///
/// Failure never aborts a run; the orchestrator falls back to the boxes it
/// passed in.
pub trait VerificationAdapter: Send + Sync {
    fn verify(&self, image: &DynamicImage, boxes: &[BoundingBox]) -> Result<Vec<BoundingBox>, VerificationError>;
}

/// Sends boxes over a [`VerificationChannel`] and diffs the answer against
/// what was sent.
pub struct ReconcilingVerifier<C> {
    channel: C,
    policy: MatchPolicy,
}

impl<C: VerificationChannel> ReconcilingVerifier<C> {
    pub fn new(channel: C) -> Self {
        Self {
            channel,
            policy: MatchPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: MatchPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Ask the reviewer and return the full diff.
    #[instrument(skip_all, fields(channel = self.channel.name(), boxes = boxes.len()))]
    pub fn review(&self, image: &DynamicImage, boxes: &[BoundingBox]) -> Result<Reconciliation, VerificationError> {
        let corrected = self.channel.request(image, boxes)?;
        let rec = reconcile(boxes, &corrected, self.policy);

        info!(
            kept = rec.kept(),
            resized = rec.resized(),
            added = rec.added(),
            removed = rec.removed(),
            "Review reconciled"
        );
        Ok(rec)
    }
}

impl<C: VerificationChannel> VerificationAdapter for ReconcilingVerifier<C> {
    fn verify(&self, image: &DynamicImage, boxes: &[BoundingBox]) -> Result<Vec<BoundingBox>, VerificationError> {
        self.review(image, boxes).map(|rec| rec.boxes)
    }
}

impl<T: VerificationAdapter + ?Sized> VerificationAdapter for Box<T> {
    fn verify(&self, image: &DynamicImage, boxes: &[BoundingBox]) -> Result<Vec<BoundingBox>, VerificationError> {
        (**self).verify(image, boxes)
    }
}
