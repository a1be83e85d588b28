use std::ffi::OsString;
use std::io::{Read, Write};
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

use image::DynamicImage;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::error::VerificationError;
use crate::models::BoundingBox;

/// Transport to a human reviewer: boxes out, corrected boxes back.
pub trait VerificationChannel: Send + Sync {
    fn request(&self, image: &DynamicImage, boxes: &[BoundingBox]) -> Result<Vec<BoundingBox>, VerificationError>;

    fn name(&self) -> &str;
}

/// Returns the detector output unchanged.
pub struct PassThrough;

impl VerificationChannel for PassThrough {
    fn request(&self, _image: &DynamicImage, boxes: &[BoundingBox]) -> Result<Vec<BoundingBox>, VerificationError> {
        Ok(boxes.to_vec())
    }

    fn name(&self) -> &str {
        "pass-through"
    }
}

/// Reads reviewer corrections from a JSON array of boxes.
pub struct CorrectionsFile {
    path: PathBuf,
}

impl CorrectionsFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl VerificationChannel for CorrectionsFile {
    #[instrument(skip_all, fields(path = %self.path.display()))]
    fn request(&self, _image: &DynamicImage, _boxes: &[BoundingBox]) -> Result<Vec<BoundingBox>, VerificationError> {
        let raw = std::fs::read_to_string(&self.path).map_err(|source| VerificationError::Io {
            path: self.path.clone(),
            source,
        })?;
        let boxes: Vec<BoundingBox> = serde_json::from_str(&raw)?;
        debug!(boxes = boxes.len(), "Corrections loaded");
        Ok(boxes)
    }

    fn name(&self) -> &str {
        "corrections-file"
    }
}

/// Request sent to a reviewer program on stdin.
#[derive(Debug, Serialize, Deserialize)]
pub struct ReviewRequest {
    /// PNG copy of the page, valid while the reviewer runs.
    pub image_path: PathBuf,
    pub width: u32,
    pub height: u32,
    pub boxes: Vec<BoundingBox>,
}

/// Reply read from a reviewer program's stdout.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ReviewResponse {
    Ok { boxes: Vec<BoundingBox> },
    Rejected { reason: String },
}

/// Runs an external reviewer program and waits for its answer.
///
/// The program gets a [`ReviewRequest`] as JSON on stdin and must print a
/// [`ReviewResponse`] as JSON on stdout before `timeout` elapses.
pub struct ExternalCommand {
    program: OsString,
    args: Vec<OsString>,
    timeout: Duration,
    poll_interval: Duration,
}

impl ExternalCommand {
    pub fn new(program: impl Into<OsString>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            timeout,
            poll_interval: Duration::from_millis(20),
        }
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    fn write_page(image: &DynamicImage) -> Result<tempfile::TempPath, VerificationError> {
        let file = tempfile::Builder::new()
            .prefix("blockscan-review-")
            .suffix(".png")
            .tempfile()
            .map_err(|e| VerificationError::Command(format!("cannot create page file: {e}")))?;
        let path = file.into_temp_path();
        image
            .save_with_format(&path, image::ImageFormat::Png)
            .map_err(|e| VerificationError::Command(format!("cannot write page file: {e}")))?;
        Ok(path)
    }
}

impl VerificationChannel for ExternalCommand {
    #[instrument(skip_all, fields(program = ?self.program, timeout = ?self.timeout))]
    fn request(&self, image: &DynamicImage, boxes: &[BoundingBox]) -> Result<Vec<BoundingBox>, VerificationError> {
        let page = Self::write_page(image)?;
        let request = ReviewRequest {
            image_path: page.to_path_buf(),
            width: image.width(),
            height: image.height(),
            boxes: boxes.to_vec(),
        };
        let payload = serde_json::to_vec(&request)?;

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| VerificationError::Command(format!("failed to start reviewer: {e}")))?;
        let deadline = Instant::now() + self.timeout;

        // Both pipes are serviced on helper threads: a reviewer that is slow
        // to read its request or chatty on stdout must not hold us past the
        // deadline.
        if let Some(mut stdin) = child.stdin.take() {
            std::thread::spawn(move || {
                if let Err(e) = stdin.write_all(&payload) {
                    warn!(error = %e, "Reviewer closed stdin early");
                }
            });
        }
        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| VerificationError::Command("reviewer stdout unavailable".to_string()))?;
        let reader = std::thread::spawn(move || {
            let mut out = String::new();
            stdout.read_to_string(&mut out).map(|_| out)
        });

        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) if Instant::now() >= deadline => {
                    stop(&mut child);
                    return Err(VerificationError::Timeout(self.timeout));
                }
                Ok(None) => std::thread::sleep(self.poll_interval),
                Err(e) => {
                    stop(&mut child);
                    return Err(VerificationError::Command(format!("waiting for reviewer: {e}")));
                }
            }
        };

        let output = reader
            .join()
            .map_err(|_| VerificationError::Command("reviewer output reader panicked".to_string()))?
            .map_err(|e| VerificationError::Command(format!("reading reviewer output: {e}")))?;

        if !status.success() {
            return Err(VerificationError::Command(format!("reviewer exited with {status}")));
        }

        let response: ReviewResponse = serde_json::from_str(output.trim())?;
        match response {
            ReviewResponse::Ok { boxes } => {
                info!(boxes = boxes.len(), "Reviewer answered");
                Ok(boxes)
            }
            ReviewResponse::Rejected { reason } => Err(VerificationError::Rejected(reason)),
        }
    }

    fn name(&self) -> &str {
        "external-command"
    }
}

fn stop(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}
