use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use crate::analyzer::AnalyzedTerm;
use crate::config::BuildConfig;
use crate::document::AnalyzedDocument;
use crate::error::{IndexError, Result};
use crate::format::{DocumentRow, IntersectionRow, Row, Table, TokenRow, ROW_SEPARATOR, STATEMENT_END};
use crate::persist::{now_rfc3339, write_ddl, IndexPaths, Manifest, MANIFEST_VERSION};
use crate::vocabulary::Vocabulary;
use crate::{DocId, TermId};

/// Appends rows of one table to `<stem>-<n>.sql`, batching them into
/// statements and rolling over to a new numbered file past a byte ceiling.
struct TableWriter {
    table: Table,
    paths: IndexPaths,
    number: u32,
    path: PathBuf,
    out: BufWriter<File>,
    bytes: u64,
    statement_open: bool,
    rows_in_statement: u64,
    rows: u64,
    statements: u64,
    files: Vec<String>,
}

impl TableWriter {
    fn create(paths: &IndexPaths, table: Table, number: u32) -> Result<Self> {
        let path = paths.table_file(table, number);
        let file = File::create(&path).map_err(|source| IndexError::Setup { path: path.clone(), source })?;
        tracing::debug!(path = %path.display(), "opened index file");
        Ok(Self {
            table,
            paths: IndexPaths::new(&paths.root),
            number,
            out: BufWriter::new(file),
            files: vec![table.file_name(number)],
            path,
            bytes: 0,
            statement_open: false,
            rows_in_statement: 0,
            rows: 0,
            statements: 0,
        })
    }

    fn write(&mut self, s: &str) -> Result<()> {
        self.out.write_all(s.as_bytes())?;
        self.bytes += s.len() as u64;
        Ok(())
    }

    fn write_row(&mut self, row: &str, last: bool, rows_per_statement: u64, max_file_bytes: u64) -> Result<()> {
        // Rolling over lazily keeps a trailing empty file from appearing.
        if self.bytes >= max_file_bytes {
            self.roll_over()?;
        }
        if self.statement_open {
            self.write(ROW_SEPARATOR)?;
        } else {
            self.write(self.table.header())?;
            self.statement_open = true;
            self.statements += 1;
        }
        self.write("\n")?;
        self.write(row)?;
        self.rows += 1;
        self.rows_in_statement += 1;

        if last || self.rows_in_statement >= rows_per_statement {
            self.end_statement()?;
        }
        Ok(())
    }

    fn end_statement(&mut self) -> Result<()> {
        if self.statement_open {
            self.write(STATEMENT_END)?;
            self.write("\n")?;
            self.statement_open = false;
            self.rows_in_statement = 0;
        }
        Ok(())
    }

    fn roll_over(&mut self) -> Result<()> {
        self.end_statement()?;
        let number = self.number + 1;
        let path = self.paths.table_file(self.table, number);
        let file = File::create(&path).map_err(|source| IndexError::Setup { path: path.clone(), source })?;
        self.out.flush()?;
        tracing::info!(from = %self.path.display(), to = %path.display(), bytes = self.bytes, "rolling over index file");
        self.out = BufWriter::new(file);
        self.path = path;
        self.number = number;
        self.bytes = 0;
        self.files.push(self.table.file_name(number));
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.end_statement()?;
        self.out.flush()?;
        Ok(())
    }

    fn summary(&self) -> TableSummary {
        TableSummary { rows: self.rows, statements: self.statements, files: self.files.clone() }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableSummary {
    pub rows: u64,
    pub statements: u64,
    pub files: Vec<String>,
}

/// What the writer produced once closed.
#[derive(Debug, Clone, Default)]
pub struct WriteSummary {
    pub documents: u64,
    pub tokens: u64,
    pub postings: u64,
    /// Rows that could not be written and were skipped
    pub failed_rows: u64,
    pub tables: BTreeMap<Table, TableSummary>,
}

impl WriteSummary {
    pub fn to_manifest(&self, config: &BuildConfig) -> Manifest {
        Manifest {
            version: MANIFEST_VERSION,
            created_at: now_rfc3339(),
            documents: self.documents,
            tokens: self.tokens,
            postings: self.postings,
            rows_per_statement: config.rows_per_statement,
            max_file_bytes: config.max_file_bytes,
            files: self.tables.iter().map(|(t, s)| (t.file_stem().to_string(), s.files.clone())).collect(),
        }
    }
}

/// Outcome of persisting one document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DocumentWrite {
    pub postings: u64,
    pub new_terms: u64,
    /// False for documents without terms, which get no document row
    pub document_row: bool,
}

/// Writes documents, tokens and postings as flat relation files.
///
/// Owns the build-time [`Vocabulary`], so exactly one writer may exist per
/// build and every call goes through `&mut self`.
pub struct IndexWriter {
    documents: TableWriter,
    tokens: TableWriter,
    intersections: TableWriter,
    vocabulary: Vocabulary,
    rows_per_statement: u64,
    max_file_bytes: u64,
    document_rows: u64,
    failed_rows: u64,
    closed: bool,
}

impl IndexWriter {
    /// Creates the output directory, the schema file and the first file of
    /// every table. Any failure here aborts the build.
    pub fn create(config: &BuildConfig) -> Result<Self> {
        let paths = IndexPaths::new(&config.output_dir);
        fs::create_dir_all(&paths.root).map_err(|source| IndexError::Setup { path: paths.root.clone(), source })?;
        write_ddl(&paths)?;
        tracing::info!(output = %paths.root.display(), "index writer ready");
        Ok(Self {
            documents: TableWriter::create(&paths, Table::Documents, 1)?,
            tokens: TableWriter::create(&paths, Table::Tokens, 1)?,
            intersections: TableWriter::create(&paths, Table::Intersection, 1)?,
            vocabulary: Vocabulary::new(),
            rows_per_statement: config.rows_per_statement.max(1),
            max_file_bytes: config.max_file_bytes.max(1),
            document_rows: 0,
            failed_rows: 0,
            closed: false,
        })
    }

    pub fn vocabulary(&self) -> &Vocabulary {
        &self.vocabulary
    }

    fn emit<R: Row>(&mut self, row: &R, last: bool) -> bool {
        let line = row.encode();
        let (rows_per_statement, max_file_bytes) = (self.rows_per_statement, self.max_file_bytes);
        let writer = match R::TABLE {
            Table::Documents => &mut self.documents,
            Table::Tokens => &mut self.tokens,
            Table::Intersection => &mut self.intersections,
        };
        match writer.write_row(&line, last, rows_per_statement, max_file_bytes) {
            Ok(()) => {
                tracing::trace!(table = ?R::TABLE, row = %line, "row written");
                true
            }
            Err(e) => {
                tracing::error!(table = ?R::TABLE, path = %writer.path.display(), error = %e, "failed to add row");
                self.failed_rows += 1;
                false
            }
        }
    }

    /// Records one term occurrence bag for `doc_id`: a token row the first
    /// time the text is seen, and always a posting row.
    pub fn write_term(&mut self, doc_id: DocId, term: &AnalyzedTerm, last: bool) -> (TermId, bool) {
        let (term_id, is_new) = self.vocabulary.assign(&term.text, term.hash);
        if is_new {
            self.emit(&TokenRow { id: term_id, text: term.text.clone(), hash: term.hash }, last);
        }
        self.emit(&IntersectionRow { term_id, doc_id, frequency: term.frequency }, last);
        (term_id, is_new)
    }

    /// Persists a fully analysed document: its postings first, then its
    /// document row when at least one term survived. `last_document` closes
    /// the open statements after the final rows.
    pub fn write_document(&mut self, doc: &AnalyzedDocument, last_document: bool) -> DocumentWrite {
        let mut result = DocumentWrite::default();
        let count = doc.terms.len();
        for (i, term) in doc.terms.iter().enumerate() {
            let (_, is_new) = self.write_term(doc.id, term, last_document && i + 1 == count);
            result.postings += 1;
            result.new_terms += u64::from(is_new);
        }

        let highest = doc.highest_term_frequency();
        if highest > 0 {
            let row = DocumentRow {
                id: doc.id,
                highest_term_frequency: highest,
                title: doc.title.clone(),
                path: doc.path.clone(),
            };
            if self.emit(&row, last_document) {
                self.document_rows += 1;
            }
            result.document_row = true;
        } else {
            tracing::debug!(doc_id = doc.id, "document has no terms, no row written");
        }
        result
    }

    fn close_all(&mut self) -> Result<()> {
        self.closed = true;
        self.documents.close()?;
        self.tokens.close()?;
        self.intersections.close()?;
        Ok(())
    }

    /// Terminates open statements and flushes every file.
    pub fn finish(mut self) -> Result<WriteSummary> {
        self.close_all()?;
        let mut tables = BTreeMap::new();
        for writer in [&self.documents, &self.tokens, &self.intersections] {
            tables.insert(writer.table, writer.summary());
        }
        let summary = WriteSummary {
            documents: self.document_rows,
            tokens: self.vocabulary.len() as u64,
            postings: self.intersections.rows,
            failed_rows: self.failed_rows,
            tables,
        };
        tracing::info!(
            documents = summary.documents,
            tokens = summary.tokens,
            postings = summary.postings,
            failed_rows = summary.failed_rows,
            "index files written"
        );
        Ok(summary)
    }
}

impl Drop for IndexWriter {
    fn drop(&mut self) {
        if !self.closed {
            if let Err(e) = self.close_all() {
                tracing::error!(error = %e, "failed to close index files");
            }
        }
    }
}
