//! Integration tests for the detection, verification and classification
//! pipeline.
//!
//! Tests cover:
//! - Region order and index contiguity
//! - Fallback to detector output when verification fails
//! - Degenerate box rejection and the empty-image case
//! - Classification failure policies

mod common;

use blockscan::error::ClassifyError;
use blockscan::verification::{CorrectionsFile, PassThrough};
use blockscan::{ImageClassifier, MatchPolicy, ReconcilingVerifier, RunOutcome};
use common::*;

fn letter_orchestrator(verifier: impl blockscan::VerificationAdapter + 'static) -> Orchestrator {
    Orchestrator::new(
        PipelineConfig::default(),
        FixedDetector(letter_boxes()),
        verifier,
        letter_classifier(),
    )
}

fn records(outcome: &RunOutcome) -> Vec<BlockRecord> {
    outcome.document.records().expect("document should be fully classified")
}

#[test]
fn two_block_scenario() -> anyhow::Result<()> {
    let boxes = vec![BoundingBox::new(290, 23, 164, 124), BoundingBox::new(547, 82, 131, 35)];
    let classifier = LookupClassifier::new()
        .with(boxes[0], Classification::image("<encoded>"))
        .with(boxes[1], Classification::text("11.23.99"));
    let orchestrator = Orchestrator::new(
        PipelineConfig::default(),
        FixedDetector(boxes),
        IdentityVerifier,
        classifier,
    );

    let outcome = orchestrator.run(&blank_page())?;

    assert_eq!(
        records(&outcome),
        vec![
            BlockRecord {
                index: 0,
                left: 290,
                top: 23,
                width: 164,
                height: 124,
                is_image: true,
                data: "<encoded>".to_string(),
            },
            BlockRecord {
                index: 1,
                left: 547,
                top: 82,
                width: 131,
                height: 35,
                is_image: false,
                data: "11.23.99".to_string(),
            },
        ]
    );
    assert!(!outcome.is_degraded());
    Ok(())
}

#[test]
fn order_and_indices_follow_detector_output() -> anyhow::Result<()> {
    let outcome = letter_orchestrator(IdentityVerifier).run(&blank_page())?;
    let recs = records(&outcome);

    assert_eq!(recs.len(), 8);
    for (i, rec) in recs.iter().enumerate() {
        assert_eq!(rec.index, i);
        assert_eq!(rec.bbox(), letter_boxes()[i]);
    }
    assert_eq!(recs[7].data, "Sincerely,");
    Ok(())
}

#[test]
fn verifier_order_wins() -> anyhow::Result<()> {
    let mut reordered = letter_boxes();
    reordered.reverse();
    reordered.remove(0);

    let outcome = letter_orchestrator(ReplacingVerifier(reordered.clone())).run(&blank_page())?;
    let got: Vec<BoundingBox> = records(&outcome).iter().map(|r| r.bbox()).collect();
    assert_eq!(got, reordered);
    assert_eq!(outcome.detected, letter_boxes());
    Ok(())
}

#[test]
fn classifier_runs_once_per_region_in_order() -> anyhow::Result<()> {
    let (classifier, calls) = RecordingClassifier::new(letter_classifier());
    let orchestrator = Orchestrator::new(
        PipelineConfig::default(),
        FixedDetector(letter_boxes()),
        IdentityVerifier,
        classifier,
    );

    orchestrator.run(&blank_page())?;
    assert_eq!(*calls.lock().unwrap(), letter_boxes());
    Ok(())
}

#[test]
fn transport_failure_equals_identity_verification() -> anyhow::Result<()> {
    let page = blank_page();
    let verified = letter_orchestrator(IdentityVerifier).run(&page)?;
    let fallback = letter_orchestrator(UnreachableVerifier).run(&page)?;

    assert_eq!(fallback.document, verified.document);
    assert!(fallback.verification_failure.is_some());
    assert!(fallback.is_degraded());
    assert!(verified.verification_failure.is_none());
    Ok(())
}

#[test]
fn missing_corrections_file_falls_back() -> anyhow::Result<()> {
    let verifier = ReconcilingVerifier::new(CorrectionsFile::new("/nonexistent/corrections.json"));
    let outcome = letter_orchestrator(verifier).run(&blank_page())?;

    assert_eq!(outcome.document.len(), 8);
    assert!(outcome.verification_failure.is_some());
    Ok(())
}

#[test]
fn corrections_file_replaces_detector_boxes() -> anyhow::Result<()> {
    let dir = tempfile::TempDir::new()?;
    let path = dir.path().join("corrections.json");
    let corrected = vec![letter_boxes()[1], letter_boxes()[0]];
    std::fs::write(&path, serde_json::to_string(&corrected)?)?;

    let verifier = ReconcilingVerifier::new(CorrectionsFile::new(&path)).with_policy(MatchPolicy::Overlap { min_iou: 0.5 });
    let outcome = letter_orchestrator(verifier).run(&blank_page())?;

    let recs = records(&outcome);
    assert_eq!(recs.len(), 2);
    assert_eq!(recs[0].data, "11.23.99");
    assert_eq!(recs[1].data, "imagedata");
    Ok(())
}

#[test]
fn empty_image_produces_empty_document() -> anyhow::Result<()> {
    let orchestrator = Orchestrator::new(
        PipelineConfig::default(),
        FixedDetector(vec![]),
        ReconcilingVerifier::new(PassThrough),
        LookupClassifier::new(),
    );

    let (outcome, written) = orchestrator.run_to(&blank_page(), &DocumentWriter::listing())?;
    assert!(outcome.document.is_empty());
    assert_eq!(written, WriteOutcome::Listing(vec![]));
    Ok(())
}

#[test]
fn degenerate_boxes_never_become_regions() -> anyhow::Result<()> {
    let good = letter_boxes();
    let mut boxes = vec![BoundingBox::new(10, 10, 0, 20)];
    boxes.push(good[0]);
    boxes.push(BoundingBox::new(10, 10, 20, 0));
    boxes.push(good[1]);

    let (classifier, calls) = RecordingClassifier::new(letter_classifier());
    let orchestrator = Orchestrator::new(
        PipelineConfig::default(),
        FixedDetector(vec![]),
        ReplacingVerifier(boxes),
        classifier,
    );

    let outcome = orchestrator.run(&blank_page())?;
    let recs = records(&outcome);

    assert_eq!(recs.len(), 2);
    assert_eq!((recs[0].index, recs[1].index), (0, 1));
    assert_eq!(outcome.rejected.len(), 2);
    assert_eq!(*calls.lock().unwrap(), vec![good[0], good[1]]);
    Ok(())
}

#[test]
fn detector_failure_is_fatal() {
    let orchestrator = Orchestrator::new(
        PipelineConfig::default(),
        FailingDetector,
        IdentityVerifier,
        letter_classifier(),
    );

    let err = orchestrator.run(&blank_page()).unwrap_err();
    assert!(matches!(err, PipelineError::Detection(_)));
}

#[test]
fn unknown_region_gets_a_placeholder() -> anyhow::Result<()> {
    let stranger = BoundingBox::new(1, 1, 5, 5);
    let mut boxes = letter_boxes();
    boxes.insert(1, stranger);

    let outcome = letter_orchestrator(ReplacingVerifier(boxes)).run(&blank_page())?;
    let recs = records(&outcome);

    assert_eq!(recs.len(), 9);
    assert_eq!(recs[1].bbox(), stranger);
    assert!(!recs[1].is_image);
    assert_eq!(recs[1].data, "");
    assert_eq!(recs[2].data, "11.23.99");

    assert_eq!(outcome.failures.len(), 1);
    assert_eq!(outcome.failures[0].index, 1);
    assert!(matches!(outcome.failures[0].error, ClassifyError::NoMatch(_)));
    assert_eq!(outcome.placeholder_indices(), vec![1]);
    assert!(outcome.is_degraded());
    Ok(())
}

#[test]
fn empty_text_from_the_classifier_is_not_a_placeholder() -> anyhow::Result<()> {
    let blank = BoundingBox::new(10, 10, 20, 20);
    let classifier = LookupClassifier::new().with(blank, Classification::text(""));
    let orchestrator = Orchestrator::new(
        PipelineConfig::default(),
        FixedDetector(vec![blank]),
        IdentityVerifier,
        classifier,
    );

    let outcome = orchestrator.run(&blank_page())?;
    assert_eq!(records(&outcome)[0].data, "");
    assert!(outcome.placeholder_indices().is_empty());
    assert!(!outcome.is_degraded());
    Ok(())
}

#[test]
fn abort_policy_stops_on_first_failure() {
    let config = PipelineConfig {
        classification_policy: ClassificationPolicy::Abort,
        ..Default::default()
    };
    let stranger = BoundingBox::new(1, 1, 5, 5);
    let orchestrator = Orchestrator::new(
        config,
        FixedDetector(vec![letter_boxes()[0], stranger]),
        IdentityVerifier,
        letter_classifier(),
    );

    let err = orchestrator.run(&blank_page()).unwrap_err();
    match err {
        PipelineError::Classification { index, bbox, .. } => {
            assert_eq!(index, 1);
            assert_eq!(bbox, stranger);
        }
        other => panic!("expected classification error, got {other:?}"),
    }
}

#[test]
fn out_of_range_box_is_a_region_failure() -> anyhow::Result<()> {
    let orchestrator = Orchestrator::new(
        PipelineConfig::default(),
        FixedDetector(vec![BoundingBox::new(700, 990, 50, 50), BoundingBox::new(0, 0, 10, 10)]),
        IdentityVerifier,
        ImageClassifier,
    );

    let outcome = orchestrator.run(&blank_page())?;
    assert_eq!(outcome.document.len(), 2);
    assert_eq!(outcome.failures.len(), 1);
    assert!(matches!(outcome.failures[0].error, ClassifyError::OutOfBounds { .. }));
    assert!(records(&outcome)[1].is_image);
    Ok(())
}

#[test]
fn reruns_are_identical() -> anyhow::Result<()> {
    let orchestrator = letter_orchestrator(IdentityVerifier);
    let page = blank_page();
    let first = orchestrator.run(&page)?;
    let second = orchestrator.run(&page)?;
    assert_eq!(first.document, second.document);
    Ok(())
}

#[test]
fn missing_input_file_is_an_acquisition_error() {
    let orchestrator = letter_orchestrator(IdentityVerifier);
    let err = orchestrator
        .run_file("/nonexistent/letter.png", &DocumentWriter::listing())
        .unwrap_err();
    assert!(matches!(
        err,
        PipelineError::Acquisition(blockscan::error::AcquisitionError::NotFound(_))
    ));
}

#[test]
fn run_file_reads_the_image() -> anyhow::Result<()> {
    let file = save_temp_png(&blank_page());
    let (outcome, written) = letter_orchestrator(IdentityVerifier).run_file(file.path(), &DocumentWriter::listing())?;

    assert_eq!(outcome.document.len(), 8);
    match written {
        WriteOutcome::Listing(recs) => assert_eq!(recs, records(&outcome)),
        other => panic!("expected listing, got {other:?}"),
    }
    Ok(())
}
