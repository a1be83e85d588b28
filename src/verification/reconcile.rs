use serde::{Deserialize, Serialize};

use crate::models::BoundingBox;

/// How a corrected box is paired with a detected one.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MatchPolicy {
    /// All four coordinates must be equal.
    #[default]
    Exact,
    /// Boxes match when their intersection over union reaches `min_iou`.
    Overlap { min_iou: f32 },
}

impl MatchPolicy {
    /// Index of the unclaimed detected box that `candidate` corresponds to.
    ///
    /// An exact match always wins. Under `Overlap` the highest IoU at or above
    /// the threshold is taken, earliest index on ties.
    fn find(&self, candidate: &BoundingBox, detected: &[BoundingBox], claimed: &[bool]) -> Option<usize> {
        let unclaimed = || detected.iter().enumerate().filter(move |(i, _)| !claimed[*i]);

        if let Some((i, _)) = unclaimed().find(|(_, d)| *d == candidate) {
            return Some(i);
        }

        match *self {
            MatchPolicy::Exact => None,
            MatchPolicy::Overlap { min_iou } => {
                let mut best: Option<(usize, f32)> = None;
                for (i, d) in unclaimed() {
                    let score = d.iou(candidate);
                    if score < min_iou || score == 0.0 {
                        continue;
                    }
                    if best.is_none_or(|(_, s)| score > s) {
                        best = Some((i, score));
                    }
                }
                best.map(|(i, _)| i)
            }
        }
    }
}

/// What happened to one box during review.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoxEdit {
    Kept(BoundingBox),
    Resized { from: BoundingBox, to: BoundingBox },
    Added(BoundingBox),
    Removed(BoundingBox),
}

/// Corrected box sequence plus the diff against the detector output.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Reconciliation {
    /// Boxes in the order the reviewer returned them.
    pub boxes: Vec<BoundingBox>,
    pub edits: Vec<BoxEdit>,
}

impl Reconciliation {
    pub fn kept(&self) -> usize {
        self.count(|e| matches!(e, BoxEdit::Kept(_)))
    }

    pub fn resized(&self) -> usize {
        self.count(|e| matches!(e, BoxEdit::Resized { .. }))
    }

    pub fn added(&self) -> usize {
        self.count(|e| matches!(e, BoxEdit::Added(_)))
    }

    pub fn removed(&self) -> usize {
        self.count(|e| matches!(e, BoxEdit::Removed(_)))
    }

    /// True when every box survived review with its exact geometry. Order is
    /// not compared.
    pub fn is_unchanged(&self) -> bool {
        self.edits.iter().all(|e| matches!(e, BoxEdit::Kept(_)))
    }

    fn count(&self, pred: impl Fn(&BoxEdit) -> bool) -> usize {
        self.edits.iter().filter(|e| pred(e)).count()
    }
}

/// Diff the reviewer's boxes against the detector's.
///
/// Edits for corrected boxes come first, in corrected order, followed by
/// removals in detector order.
pub fn reconcile(detected: &[BoundingBox], corrected: &[BoundingBox], policy: MatchPolicy) -> Reconciliation {
    let mut claimed = vec![false; detected.len()];
    let mut edits = Vec::with_capacity(corrected.len());

    for bbox in corrected {
        let edit = match policy.find(bbox, detected, &claimed) {
            Some(i) => {
                claimed[i] = true;
                if detected[i] == *bbox {
                    BoxEdit::Kept(*bbox)
                } else {
                    BoxEdit::Resized {
                        from: detected[i],
                        to: *bbox,
                    }
                }
            }
            None => BoxEdit::Added(*bbox),
        };
        edits.push(edit);
    }

    edits.extend(
        detected
            .iter()
            .zip(&claimed)
            .filter(|(_, taken)| !**taken)
            .map(|(d, _)| BoxEdit::Removed(*d)),
    );

    Reconciliation {
        boxes: corrected.to_vec(),
        edits,
    }
}
