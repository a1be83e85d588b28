pub mod json;
pub mod xml;

use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{info, instrument};

use crate::error::OutputError;
use crate::models::{BlockRecord, Document};

/// Serialization format of the output file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Xml,
    Json,
}

impl OutputFormat {
    /// `.json` selects JSON, anything else XML.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => OutputFormat::Json,
            _ => OutputFormat::Xml,
        }
    }

    pub fn encode(&self, records: &[BlockRecord]) -> Result<Vec<u8>, String> {
        match self {
            OutputFormat::Xml => xml::to_bytes(records).map_err(|e| e.to_string()),
            OutputFormat::Json => json::to_bytes(records).map_err(|e| e.to_string()),
        }
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "xml" => Ok(OutputFormat::Xml),
            "json" => Ok(OutputFormat::Json),
            other => Err(format!("unknown output format `{other}` (expected xml or json)")),
        }
    }
}

/// What [`DocumentWriter::write`] did with the document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    /// No destination configured: the records themselves.
    Listing(Vec<BlockRecord>),
    /// Records written to `path`.
    Written { path: PathBuf, blocks: usize },
}

/// Serializes a finished [`Document`] in region order.
#[derive(Debug, Clone, Default)]
pub struct DocumentWriter {
    destination: Option<PathBuf>,
    format: OutputFormat,
}

impl DocumentWriter {
    /// Writer that hands the records back instead of writing them.
    pub fn listing() -> Self {
        Self::default()
    }

    /// Writer for `path`, format chosen from its extension.
    pub fn to_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let format = OutputFormat::from_path(&path);
        Self {
            destination: Some(path),
            format,
        }
    }

    pub fn new(destination: Option<PathBuf>, format: OutputFormat) -> Self {
        Self { destination, format }
    }

    pub fn with_format(mut self, format: OutputFormat) -> Self {
        self.format = format;
        self
    }

    /// Write the document, or return it as a listing when there is no
    /// destination.
    ///
    /// The file is assembled next to the destination and moved into place
    /// only after it has been fully written and synced, so a failure never
    /// leaves a truncated document behind.
    #[instrument(skip_all, fields(blocks = document.len(), destination = ?self.destination))]
    pub fn write(&self, document: &Document) -> Result<WriteOutcome, OutputError> {
        let records = document.records().map_err(|e| OutputError::Document(Box::new(e)))?;

        let Some(path) = &self.destination else {
            return Ok(WriteOutcome::Listing(records));
        };

        let bytes = self.format.encode(&records).map_err(|reason| OutputError::Serialize {
            path: path.clone(),
            reason,
        })?;
        persist(path, &bytes)?;

        info!(path = %path.display(), blocks = records.len(), format = ?self.format, "Document written");
        Ok(WriteOutcome::Written {
            path: path.clone(),
            blocks: records.len(),
        })
    }
}

fn persist(path: &Path, bytes: &[u8]) -> Result<(), OutputError> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut tmp = NamedTempFile::new_in(dir).map_err(|source| OutputError::Create {
        path: path.to_path_buf(),
        source,
    })?;

    let write_err = |source| OutputError::Write {
        path: path.to_path_buf(),
        source,
    };
    tmp.write_all(bytes).map_err(write_err)?;
    tmp.flush().map_err(write_err)?;
    tmp.as_file().sync_all().map_err(write_err)?;

    tmp.persist(path).map_err(|e| OutputError::Persist {
        path: path.to_path_buf(),
        source: e.error,
    })?;
    Ok(())
}
