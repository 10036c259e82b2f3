use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use crate::error::{IndexError, Result};
use crate::format::{is_data_line, DocumentRow, IntersectionRow, Row, TokenRow};
use crate::index::{Doc, InvertedIndex, Term};
use crate::persist::{discover, load_manifest, IndexPaths};
use crate::{DocId, TermId};

/// Loads an index directory into memory.
///
/// Documents and tokens are scanned in parallel; postings are read once both
/// are complete since they reference them by ID. A posting naming an unknown
/// term or document aborts the load.
pub fn load_index<P: AsRef<Path>>(dir: P) -> Result<InvertedIndex> {
    let started = Instant::now();
    let paths = IndexPaths::new(dir);
    tracing::info!(dir = %paths.root.display(), "loading index");
    let files = discover(&paths)?;
    if files.is_empty() {
        tracing::warn!(dir = %paths.root.display(), "no index files found");
    }
    tracing::debug!(
        documents = files.documents.len(),
        tokens = files.tokens.len(),
        intersections = files.intersections.len(),
        "index files discovered"
    );

    let (docs, terms) = thread::scope(|s| {
        let docs = s.spawn(|| load_documents(&files.documents));
        let terms = s.spawn(|| load_tokens(&files.tokens));
        (join_scan(docs.join(), "document"), join_scan(terms.join(), "token"))
    });
    let docs = docs?;
    let mut terms = terms?;
    tracing::debug!(documents = docs.len(), tokens = terms.len(), "documents and tokens loaded");

    let postings = load_intersections(&files.intersections, &docs, &mut terms)?;
    let index = InvertedIndex::from_parts(docs, terms.into_values());
    tracing::info!(
        tokens = index.num_terms(),
        documents = index.num_docs(),
        intersections = postings,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "index loading complete"
    );

    match load_manifest(&paths) {
        Ok(Some(m)) => {
            if m.documents != index.num_docs() as u64 || m.tokens != index.num_terms() as u64 || m.postings != postings {
                tracing::warn!(
                    manifest_documents = m.documents,
                    manifest_tokens = m.tokens,
                    manifest_postings = m.postings,
                    "loaded counts differ from manifest"
                );
            }
        }
        Ok(None) => {}
        Err(e) => tracing::warn!(error = %e, "ignoring unreadable manifest"),
    }
    Ok(index)
}

fn join_scan<T>(joined: thread::Result<Result<T>>, what: &str) -> Result<T> {
    joined.map_err(|_| IndexError::Worker(format!("{what} scan panicked")))?
}

/// Calls `on_row` with every data line of `file` and its 1-based number.
fn scan_file<F>(file: &Path, mut on_row: F) -> Result<u64>
where
    F: FnMut(&str, u64) -> Result<()>,
{
    tracing::debug!(file = %file.display(), "reading index file");
    let reader = BufReader::new(File::open(file)?);
    let mut rows = 0;
    for (i, line) in reader.lines().enumerate() {
        let line_no = i as u64 + 1;
        let line = line.map_err(|e| IndexError::Format {
            file: file.to_path_buf(),
            line: line_no,
            reason: format!("read failed: {e}"),
        })?;
        if is_data_line(&line) {
            on_row(&line, line_no)?;
            rows += 1;
        }
    }
    Ok(rows)
}

fn parse_row<R: Row>(file: &Path, line: &str, line_no: u64) -> Result<R> {
    R::parse(line).map_err(|reason| IndexError::Format { file: file.to_path_buf(), line: line_no, reason })
}

fn load_documents(files: &[PathBuf]) -> Result<HashMap<DocId, Doc>> {
    let mut docs = HashMap::new();
    for file in files {
        scan_file(file, |line, line_no| {
            let row: DocumentRow = parse_row(file, line, line_no)?;
            tracing::trace!(id = row.id, title = %row.title, path = %row.path, "loading document");
            docs.insert(
                row.id,
                Doc { id: row.id, title: row.title, path: row.path, highest_term_frequency: row.highest_term_frequency },
            );
            Ok(())
        })?;
    }
    Ok(docs)
}

fn load_tokens(files: &[PathBuf]) -> Result<HashMap<TermId, Term>> {
    let mut terms = HashMap::new();
    for file in files {
        scan_file(file, |line, line_no| {
            let row: TokenRow = parse_row(file, line, line_no)?;
            tracing::trace!(id = row.id, token = %row.text, hash = row.hash, "loading token");
            terms.insert(row.id, Term::new(row.id, row.text, row.hash));
            Ok(())
        })?;
    }
    Ok(terms)
}

fn load_intersections(files: &[PathBuf], docs: &HashMap<DocId, Doc>, terms: &mut HashMap<TermId, Term>) -> Result<u64> {
    let mut loaded = 0;
    for file in files {
        loaded += scan_file(file, |line, line_no| {
            let row: IntersectionRow = parse_row(file, line, line_no)?;
            let term = terms.get_mut(&row.term_id).ok_or_else(|| {
                tracing::error!(file = %file.display(), line = line_no, token_id = row.term_id, "posting for unknown token");
                IndexError::UnknownTerm { file: file.clone(), line: line_no, term_id: row.term_id }
            })?;
            if !docs.contains_key(&row.doc_id) {
                tracing::error!(file = %file.display(), line = line_no, doc_id = row.doc_id, "posting for unknown document");
                return Err(IndexError::UnknownDocument { file: file.clone(), line: line_no, doc_id: row.doc_id });
            }
            term.postings.insert(row.doc_id, row.frequency);
            Ok(())
        })?;
    }
    Ok(loaded)
}

/// An index load running on a background thread.
pub struct LoadHandle {
    finished: Arc<AtomicBool>,
    handle: JoinHandle<Result<InvertedIndex>>,
}

impl LoadHandle {
    /// True once loading has ended, successfully or not.
    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }

    /// Blocks until the load ends.
    pub fn wait(self) -> Result<InvertedIndex> {
        self.handle.join().map_err(|_| IndexError::Worker("loader thread panicked".into()))?
    }
}

/// Starts [`load_index`] on its own thread.
pub fn spawn_load<P: Into<PathBuf>>(dir: P) -> Result<LoadHandle> {
    let dir = dir.into();
    spawn_task(move || load_index(&dir))
}

/// Raises the finished flag when dropped, including during a panic unwind.
struct FinishOnDrop(Arc<AtomicBool>);

impl Drop for FinishOnDrop {
    fn drop(&mut self) {
        self.0.store(true, Ordering::Release);
    }
}

fn spawn_task<F>(task: F) -> Result<LoadHandle>
where
    F: FnOnce() -> Result<InvertedIndex> + Send + 'static,
{
    let finished = Arc::new(AtomicBool::new(false));
    let flag = finished.clone();
    let handle = thread::Builder::new().name("index-loader".into()).spawn(move || {
        let _finish = FinishOnDrop(flag);
        task()
    })?;
    Ok(LoadHandle { finished, handle })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::Table;
    use std::fs;
    use std::time::Duration;
    use tempfile::tempdir;

    fn write_table(dir: &Path, table: Table, number: u32, rows: &[&str]) {
        let mut text = String::from(table.header());
        for (i, row) in rows.iter().enumerate() {
            text.push('\n');
            text.push_str(row);
            text.push_str(if i + 1 == rows.len() { ";\n" } else { "," });
        }
        fs::write(dir.join(table.file_name(number)), text).unwrap();
    }

    fn tiny_index(dir: &Path) {
        write_table(dir, Table::Documents, 1, &[r#"(1,2,"First","corpus/1.txt")"#, r#"(2,1,"Second","corpus/2.txt")"#]);
        write_table(dir, Table::Tokens, 1, &[r#"(1,"alpha",11)"#]);
        write_table(dir, Table::Tokens, 2, &[r#"(2,"beta",11)"#]);
        write_table(dir, Table::Intersection, 1, &["(1,1,2)", "(2,1,1)", "(2,2,1)"]);
        fs::write(dir.join("ddl.sql"), Table::Documents.ddl()).unwrap();
    }

    #[test]
    fn loads_rows_into_buckets() {
        let dir = tempdir().unwrap();
        tiny_index(dir.path());
        let index = load_index(dir.path()).unwrap();
        assert_eq!(index.num_docs(), 2);
        assert_eq!(index.num_terms(), 2);
        assert_eq!(index.num_postings(), 3);

        let beta = index.term(11, "beta").unwrap();
        assert_eq!(beta.id, 2);
        assert_eq!(beta.doc_count(), 2);
        assert_eq!(index.term(11, "alpha").unwrap().frequency_in(1), 2);
        assert_eq!(index.doc(1).unwrap().title, "First");
        assert_eq!(index.doc(2).unwrap().highest_term_frequency, 1);
    }

    #[test]
    fn unknown_term_aborts_load() {
        let dir = tempdir().unwrap();
        tiny_index(dir.path());
        write_table(dir.path(), Table::Intersection, 2, &["(1,2,1)", "(9,2,1)"]);
        match load_index(dir.path()) {
            Err(IndexError::UnknownTerm { term_id, line, .. }) => {
                assert_eq!(term_id, 9);
                assert_eq!(line, 3);
            }
            other => panic!("expected unknown term, got {other:?}"),
        }
    }

    #[test]
    fn unknown_document_aborts_load() {
        let dir = tempdir().unwrap();
        tiny_index(dir.path());
        write_table(dir.path(), Table::Intersection, 2, &["(1,42,1)"]);
        let err = load_index(dir.path()).unwrap_err();
        assert!(matches!(err, IndexError::UnknownDocument { doc_id: 42, .. }));
    }

    #[test]
    fn malformed_row_is_a_format_fault() {
        let dir = tempdir().unwrap();
        tiny_index(dir.path());
        write_table(dir.path(), Table::Tokens, 3, &[r#"(3,"unterminated,5)"#]);
        let err = load_index(dir.path()).unwrap_err();
        assert!(err.is_corruption());
        assert!(err.to_string().contains("dml_tokens-3.sql:2"));
    }

    #[test]
    fn background_load_reports_completion() {
        let dir = tempdir().unwrap();
        tiny_index(dir.path());
        let handle = spawn_load(dir.path()).unwrap();
        for _ in 0..500 {
            if handle.is_finished() {
                break;
            }
            thread::sleep(Duration::from_millis(10));
        }
        assert!(handle.is_finished());
        assert_eq!(handle.wait().unwrap().num_docs(), 2);
    }

    #[test]
    fn panicking_load_still_finishes() {
        let handle = spawn_task(|| panic!("loader failed")).unwrap();
        for _ in 0..500 {
            if handle.is_finished() {
                break;
            }
            thread::sleep(Duration::from_millis(10));
        }
        assert!(handle.is_finished());
        assert!(matches!(handle.wait(), Err(IndexError::Worker(_))));
    }
}
