use std::path::PathBuf;
use thiserror::Error;

use crate::{DocId, TermId};

/// Errors raised while building or loading an index.
#[derive(Error, Debug)]
pub enum IndexError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("cannot create index file {path}: {source}")]
    Setup {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed row in {file}:{line}: {reason}")]
    Format {
        file: PathBuf,
        line: u64,
        reason: String,
    },

    #[error("posting in {file}:{line} references unknown term id {term_id}")]
    UnknownTerm {
        file: PathBuf,
        line: u64,
        term_id: TermId,
    },

    #[error("posting in {file}:{line} references unknown document id {doc_id}")]
    UnknownDocument {
        file: PathBuf,
        line: u64,
        doc_id: DocId,
    },

    #[error("manifest error: {0}")]
    Manifest(#[from] serde_json::Error),

    #[error("worker thread failed: {0}")]
    Worker(String),

    #[error("cannot start worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

pub type Result<T> = std::result::Result<T, IndexError>;

impl IndexError {
    /// True for faults that mean the index on disk is corrupt or mismatched.
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            IndexError::Format { .. } | IndexError::UnknownTerm { .. } | IndexError::UnknownDocument { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_term_names_location() {
        let err = IndexError::UnknownTerm { file: PathBuf::from("dml_intersection-1.sql"), line: 7, term_id: 42 };
        assert_eq!(err.to_string(), "posting in dml_intersection-1.sql:7 references unknown term id 42");
        assert!(err.is_corruption());
    }

    #[test]
    fn io_is_not_corruption() {
        let err = IndexError::from(std::io::Error::new(std::io::ErrorKind::NotFound, "gone"));
        assert!(!err.is_corruption());
    }
}
