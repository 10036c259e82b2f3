use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Index build configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    /// Directory receiving the index files
    pub output_dir: PathBuf,
    /// Document paths are stored relative to this directory when possible
    pub base_dir: PathBuf,
    /// Rows per batched statement before a terminator is written
    pub rows_per_statement: u64,
    /// Byte ceiling for one index file before rolling to the next number
    pub max_file_bytes: u64,
    /// Documents that may be under analysis at the same time
    pub admission_capacity: usize,
    /// Analysis worker threads, 0 picks the number of CPUs
    pub analysis_threads: usize,
    /// Upper bound on a single wait inside the pipeline loops
    pub poll_interval_ms: u64,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("./index"),
            base_dir: PathBuf::from("."),
            rows_per_statement: 10_000,
            max_file_bytes: 900 * 1024 * 1024,
            admission_capacity: 100,
            analysis_threads: 0,
            poll_interval_ms: 10,
        }
    }
}

impl BuildConfig {
    pub fn new<P: Into<PathBuf>>(output_dir: P) -> Self {
        Self { output_dir: output_dir.into(), ..Self::default() }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

/// Query-time configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Below this many candidates the term-dropping fallback kicks in
    pub candidate_threshold: usize,
    pub max_results: usize,
    /// Cap on term subsets visited by the fallback
    pub max_fallback_subsets: usize,
    pub snippet_sentences: usize,
    pub wrap_width: usize,
    /// Stored document paths are resolved against this directory
    pub doc_root: PathBuf,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            candidate_threshold: 50,
            max_results: 5,
            max_fallback_subsets: 256,
            snippet_sentences: 2,
            wrap_width: 100,
            doc_root: PathBuf::from("."),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_fills_defaults() {
        let cfg: BuildConfig = serde_json::from_str(r#"{"rows_per_statement": 10}"#).unwrap();
        assert_eq!(cfg.rows_per_statement, 10);
        assert_eq!(cfg.admission_capacity, 100);
        assert_eq!(cfg.max_file_bytes, 900 * 1024 * 1024);

        let search: SearchConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(search.candidate_threshold, 50);
        assert_eq!(search.max_results, 5);
    }
}
