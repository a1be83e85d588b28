use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

use blockscan::acquire;
use blockscan::classify::{ImageClassifier, OcrClassifier, OcrConfig};
use blockscan::verification::{CorrectionsFile, ExternalCommand, PassThrough, VerificationAdapter};
use blockscan::{
    ClassificationPolicy, Classifier, ContourDetector, DetectorConfig, DocumentWriter, MatchPolicy, Orchestrator,
    OutputFormat, PipelineConfig, ReconcilingVerifier, WriteOutcome,
};

#[derive(Parser)]
#[command(name = "blockscan")]
#[command(about = "Convert a scanned document into ordered text and image blocks")]
struct Cli {
    /// Source image (bmp, jpg, png, pnm, tiff, ...)
    #[arg(short = 'i', long = "input", value_name = "IMAGE")]
    input: PathBuf,

    /// Destination file; the block listing is printed when omitted
    #[arg(short = 'o', long = "output", value_name = "FILE")]
    output: Option<PathBuf>,

    /// Output format (defaults to the output file's extension)
    #[arg(long, value_name = "xml|json")]
    format: Option<OutputFormat>,

    /// JSON file with reviewer-corrected boxes
    #[arg(long, value_name = "FILE", conflicts_with = "reviewer")]
    corrections: Option<PathBuf>,

    /// Reviewer program: reads a review request on stdin, answers on stdout
    #[arg(long, value_name = "PROGRAM")]
    reviewer: Option<PathBuf>,

    /// Extra argument for the reviewer program (repeatable)
    #[arg(long = "reviewer-arg", value_name = "ARG", requires = "reviewer")]
    reviewer_args: Vec<String>,

    /// Seconds to wait for the reviewer before falling back
    #[arg(long, value_name = "SECS", default_value_t = 300)]
    review_timeout: u64,

    /// Pair reviewer boxes with detected boxes by overlap instead of exact match
    #[arg(long, value_name = "IOU")]
    match_iou: Option<f32>,

    /// How regions are classified
    #[arg(long, value_enum, default_value_t = ClassifierKind::Ocr)]
    classifier: ClassifierKind,

    /// Directory with text-detection.rten and text-recognition.rten
    #[arg(long, value_name = "DIR")]
    model_dir: Option<PathBuf>,

    /// What to do when one region cannot be classified
    #[arg(long, value_name = "placeholder|abort", default_value = "placeholder")]
    on_classify_error: ClassificationPolicy,

    /// Regions smaller than this many pixels are recorded as empty text
    #[arg(long, value_name = "PX", default_value_t = 0)]
    min_block_area: u64,

    /// Save detector step images to directory (must be empty)
    #[arg(long, value_name = "DIR")]
    debug_out: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum ClassifierKind {
    /// Recognize text with ocrs; unreadable regions become images
    Ocr,
    /// Keep every region as an image
    Image,
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default)),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn build_verifier(args: &Cli) -> Box<dyn VerificationAdapter> {
    let policy = match args.match_iou {
        Some(min_iou) => MatchPolicy::Overlap { min_iou },
        None => MatchPolicy::Exact,
    };

    if let Some(path) = &args.corrections {
        return Box::new(ReconcilingVerifier::new(CorrectionsFile::new(path)).with_policy(policy));
    }
    if let Some(program) = &args.reviewer {
        let channel = ExternalCommand::new(program, Duration::from_secs(args.review_timeout))
            .args(args.reviewer_args.iter());
        return Box::new(ReconcilingVerifier::new(channel).with_policy(policy));
    }
    Box::new(ReconcilingVerifier::new(PassThrough).with_policy(policy))
}

fn build_classifier(args: &Cli) -> anyhow::Result<Box<dyn Classifier>> {
    match args.classifier {
        ClassifierKind::Image => Ok(Box::new(ImageClassifier)),
        ClassifierKind::Ocr => {
            let config = match &args.model_dir {
                Some(dir) => OcrConfig::from_dir(dir),
                None => OcrConfig::default(),
            };
            Ok(Box::new(OcrClassifier::from_config(&config)?))
        }
    }
}

fn main() -> anyhow::Result<()> {
    let args = Cli::parse();
    init_tracing(args.verbose);

    // Input problems are reported before any model is loaded.
    let image = acquire::load_image(&args.input)?;

    let mut detector = ContourDetector::new(DetectorConfig::default());
    if let Some(debug_dir) = &args.debug_out {
        detector = detector.with_debug(debug_dir)?;
    }

    let config = PipelineConfig {
        classification_policy: args.on_classify_error,
        min_block_area: args.min_block_area,
    };
    let orchestrator = Orchestrator::new(config, detector, build_verifier(&args), build_classifier(&args)?);

    let mut writer = match &args.output {
        Some(path) => DocumentWriter::to_path(path),
        None => DocumentWriter::listing(),
    };
    if let Some(format) = args.format {
        writer = writer.with_format(format);
    }

    let (outcome, written) = orchestrator.run_to(&image, &writer)?;

    if let Some(err) = &outcome.verification_failure {
        eprintln!("warning: verification failed, output is unverified: {err}");
    }
    for failure in &outcome.failures {
        eprintln!(
            "warning: region {} at {} left unrecognized: {}",
            failure.index, failure.bbox, failure.error
        );
    }
    let placeholders = outcome.placeholder_indices();
    if !placeholders.is_empty() {
        let list: Vec<String> = placeholders.iter().map(|i| i.to_string()).collect();
        eprintln!(
            "warning: blocks {} are empty-text placeholders, not recognized text",
            list.join(", ")
        );
    }

    match written {
        WriteOutcome::Listing(records) => {
            if records.is_empty() {
                println!("No blocks detected.");
            }
            for record in &records {
                println!("{record}");
            }
        }
        WriteOutcome::Written { path, blocks } => {
            println!("Wrote {} blocks to {}", blocks, path.display());
        }
    }

    Ok(())
}
