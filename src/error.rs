// src/error.rs

use std::path::PathBuf;
use thiserror::Error;

/// Every failure the baiting pipeline and its utilities can report.
#[derive(Debug, Error)]
pub enum BaitError {
    /// Malformed FASTA, FASTQ or tabular input.
    #[error("{path}: line {line}: {msg}")]
    Format {
        path: PathBuf,
        line: usize,
        msg: String,
    },

    /// Whitespace in a sequence id, or an id that cannot be tied to a name.
    #[error("identifier error: {0}")]
    Identifier(String),

    /// External aligner failed or produced rows we could not parse.
    #[error("alignment error: {0}")]
    Alignment(String),

    /// Taxonomy service returned nothing usable. Recovered by the caller.
    #[error("remote lookup failed: {0}")]
    RemoteLookup(String),

    /// Unrecognised prompt answer. Recovered by re-prompting.
    #[error("invalid response: {0}")]
    InteractiveInput(String),

    #[error("checkpoint {path}: {msg}")]
    Checkpoint { path: PathBuf, msg: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl BaitError {
    pub fn format<P: Into<PathBuf>>(path: P, line: usize, msg: impl Into<String>) -> Self {
        BaitError::Format {
            path: path.into(),
            line,
            msg: msg.into(),
        }
    }

    pub fn checkpoint<P: Into<PathBuf>>(path: P, msg: impl Into<String>) -> Self {
        BaitError::Checkpoint {
            path: path.into(),
            msg: msg.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, BaitError>;
