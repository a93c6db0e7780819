use std::io;
use std::path::PathBuf;

use rigba_core::GeometryError;
use rigba_optim::OptimError;
use thiserror::Error;

/// Malformed text input. Line numbers are 1-based.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ParseError {
    #[error("line {line}: unexpected end of input, expected {expected}")]
    UnexpectedEof { line: usize, expected: &'static str },
    #[error("line {line}: {what} needs {expected} values, found {found}")]
    TokenCount {
        line: usize,
        what: &'static str,
        expected: String,
        found: usize,
    },
    #[error("line {line}: invalid number '{token}'")]
    InvalidNumber { line: usize, token: String },
    #[error("line {line}: invalid {field}: {message}")]
    InvalidHeader {
        line: usize,
        field: &'static str,
        message: String,
    },
    #[error("line {line}: {field} index {value} out of range (< {limit})")]
    IndexOutOfRange {
        line: usize,
        field: &'static str,
        value: usize,
        limit: usize,
    },
    #[error("line {line}: {source}")]
    Geometry { line: usize, source: GeometryError },
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("{}: {source}", .path.display())]
    Io { path: PathBuf, source: io::Error },
    #[error("{}: {source}", .path.display())]
    Parse { path: PathBuf, source: ParseError },
    #[error(transparent)]
    Syntax(#[from] ParseError),
    #[error(transparent)]
    Optim(#[from] OptimError),
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
}
