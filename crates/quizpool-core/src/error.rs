//! Error taxonomy for the question pipeline.
//!
//! None of these reach an end user as a hard failure: sourcing failures
//! degrade to empty batches, rejections drop a single candidate, and storage
//! errors are logged and skipped.

use std::fmt;

use thiserror::Error;

/// A request key could not be interpreted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyError {
    #[error("invalid grade '{0}' (expected 1-12)")]
    Grade(String),

    #[error("invalid difficulty '{0}' (expected easy, medium or hard)")]
    Difficulty(String),

    #[error("unknown subject '{0}'")]
    Subject(String),

    #[error("malformed key '{0}' (expected <grade>_<difficulty>_<subject>)")]
    Malformed(String),
}

/// A content source could not be reached or its payload could not be read.
#[derive(Debug, Error)]
pub enum SourceError {
    /// Nothing is published for this key.
    #[error("no content for key {0}")]
    NotFound(String),

    #[error("I/O error on {path}: {message}")]
    Io { path: String, message: String },

    #[error("HTTP {status} from {url}")]
    Http { status: u16, url: String },

    #[error("network error: {0}")]
    Network(String),

    #[error("failed to parse {origin}: {message}")]
    Parse { origin: String, message: String },
}

/// Why a candidate question was refused admission.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Rejection {
    /// The question's shape is broken.
    #[error("structurally invalid: {0}")]
    Structural(StructuralIssue),

    /// The shape is fine but the declared answer does not check out.
    #[error("oracle rejected declared answer (confidence {confidence:.2})")]
    Oracle { confidence: f64 },

    /// Equivalent content is already in the pool.
    #[error("duplicate content")]
    Duplicate,
}

/// The specific structural defect behind a [`Rejection::Structural`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StructuralIssue {
    EmptyContent,
    EmptyAnswer,
    TooFewOptions,
    EmptyOption,
    DuplicateOption,
    AnswerNotInOptions,
}

impl fmt::Display for StructuralIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            StructuralIssue::EmptyContent => "empty content",
            StructuralIssue::EmptyAnswer => "empty correct answer",
            StructuralIssue::TooFewOptions => "fewer than two options",
            StructuralIssue::EmptyOption => "blank option",
            StructuralIssue::DuplicateOption => "duplicate options",
            StructuralIssue::AnswerNotInOptions => "correct answer not among options",
        };
        f.write_str(text)
    }
}

/// Best-effort blob storage failed.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage payload is not valid JSON: {0}")]
    Serde(#[from] serde_json::Error),
}

impl Rejection {
    /// Short label for tallies and log fields.
    pub fn label(&self) -> &'static str {
        match self {
            Rejection::Structural(_) => "structural",
            Rejection::Oracle { .. } => "oracle",
            Rejection::Duplicate => "duplicate",
        }
    }
}
