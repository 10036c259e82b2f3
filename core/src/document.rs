use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use crate::analyzer::{AnalyzedTerm, Analyzer};
use crate::DocId;

/// Longest title kept verbatim; longer titles are cut and suffixed.
pub const MAX_TITLE_CHARS: usize = 120;
const TITLE_KEEP_CHARS: usize = 116;
const TITLE_LABEL: &str = "Title:";

/// A source file waiting to be analysed.
#[derive(Debug, Clone)]
pub struct SourceDocument {
    pub id: DocId,
    /// Location used to open the file
    pub file: PathBuf,
    /// Location written to the index
    pub path: String,
}

/// A source document after term extraction, ready to persist.
#[derive(Debug, Clone)]
pub struct AnalyzedDocument {
    pub id: DocId,
    pub title: String,
    pub path: String,
    pub terms: Vec<AnalyzedTerm>,
    /// False when the file could not be read to the end
    pub complete: bool,
}

impl SourceDocument {
    /// Wraps `file`, taking the document ID from the leading integer of its
    /// file name (`123.txt` -> 123). Returns `None` when the name has none.
    pub fn from_path(file: &Path, base_dir: &Path) -> Option<Self> {
        let id = doc_id_from_name(file)?;
        Some(Self { id, file: file.to_path_buf(), path: relative_path(file, base_dir) })
    }

    /// Reads the title line and the body text. I/O failures are logged and
    /// whatever was read up to that point is returned.
    pub fn read(&self) -> (String, String, bool) {
        let mut title = String::new();
        let mut text = String::new();
        let file = match File::open(&self.file) {
            Ok(f) => f,
            Err(e) => {
                tracing::error!(path = %self.file.display(), error = %e, "failed to open document");
                return (title, text, false);
            }
        };
        let mut reader = BufReader::new(file);
        let mut buf = Vec::new();
        let mut line_no = 0usize;
        let complete = loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf) {
                Ok(0) => break true,
                Ok(_) => {
                    let line = String::from_utf8_lossy(&buf);
                    let mut line = line.trim_end_matches(&['\n', '\r'][..]);
                    if line_no == 0 {
                        line = strip_title_label(line);
                        title = make_title(line);
                        tracing::trace!(doc_id = self.id, %title, "found title");
                    }
                    text.push_str(line);
                    text.push('\n');
                    line_no += 1;
                }
                Err(e) => {
                    tracing::error!(path = %self.file.display(), error = %e, "failed to read document fully");
                    break false;
                }
            }
        };
        (title, text, complete)
    }

    pub fn analyze(self, analyzer: &dyn Analyzer) -> AnalyzedDocument {
        tracing::debug!(doc_id = self.id, "analyzing document");
        let (title, text, complete) = self.read();
        let terms = analyzer.analyze(&text);
        tracing::debug!(doc_id = self.id, terms = terms.len(), "document analyzed");
        AnalyzedDocument { id: self.id, title, path: self.path, terms, complete }
    }
}

impl AnalyzedDocument {
    pub fn highest_term_frequency(&self) -> u32 {
        self.terms.iter().map(|t| t.frequency).max().unwrap_or(0)
    }

    /// Documents without a counted term produce no rows at all.
    pub fn has_terms(&self) -> bool {
        self.highest_term_frequency() > 0
    }
}

pub fn doc_id_from_name(file: &Path) -> Option<DocId> {
    let name = file.file_name()?.to_str()?;
    let stem = name.split('.').next()?;
    stem.parse().ok()
}

/// Title shown for a document: its first line without a `Title:` label,
/// cut to [`MAX_TITLE_CHARS`].
pub fn make_title(first_line: &str) -> String {
    let line = strip_title_label(first_line);
    if line.chars().count() > MAX_TITLE_CHARS {
        let mut cut: String = line.chars().take(TITLE_KEEP_CHARS).collect();
        cut.push_str(" ...");
        cut
    } else {
        line.to_string()
    }
}

fn strip_title_label(line: &str) -> &str {
    let line = line.trim();
    line.strip_prefix(TITLE_LABEL).map(str::trim_start).unwrap_or(line)
}

pub fn relative_path(file: &Path, base_dir: &Path) -> String {
    let rel = file
        .strip_prefix(base_dir)
        .ok()
        .map(Path::to_path_buf)
        .or_else(|| {
            let file = file.canonicalize().ok()?;
            let base = base_dir.canonicalize().ok()?;
            file.strip_prefix(&base).ok().map(Path::to_path_buf)
        })
        .unwrap_or_else(|| file.to_path_buf());
    rel.to_string_lossy().into_owned()
}
