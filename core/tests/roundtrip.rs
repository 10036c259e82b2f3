use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tempfile::tempdir;
use tfidx_core::analyzer::{AnalyzedTerm, Analyzer, StandardAnalyzer};
use tfidx_core::config::{BuildConfig, SearchConfig};
use tfidx_core::document::{AnalyzedDocument, SourceDocument};
use tfidx_core::format::Table;
use tfidx_core::ingest::IngestPipeline;
use tfidx_core::loader::load_index;
use tfidx_core::search::{QueryEngine, SearchOutcome};
use tfidx_core::writer::IndexWriter;

const CORPUS: &[(&str, &str)] = &[
    ("1.txt", "Title: Harbour lighthouse\nThe lighthouse keeper climbed the tower every evening. Ships passed the harbour safely.\n"),
    ("2.txt", "Orchard notes\nApple trees bloom in spring. The orchard keeper prunes branches in winter.\n"),
    ("3.txt", "Storm \"report\"\nA storm closed the harbour. The lighthouse beam guided \"stranded\" ships home.\n"),
    ("4.txt", "Of the\n"),
    ("5.txt", "Mountain railway\nThe railway climbs through tunnels. Engineers inspect the tracks weekly.\n"),
];

fn write_corpus(dir: &Path) -> Vec<PathBuf> {
    let docs = dir.join("docs");
    fs::create_dir_all(&docs).unwrap();
    CORPUS
        .iter()
        .map(|(name, text)| {
            let path = docs.join(name);
            fs::write(&path, text).unwrap();
            path
        })
        .collect()
}

fn build(root: &Path, files: Vec<PathBuf>) -> PathBuf {
    let output = root.join("index");
    let config = BuildConfig {
        base_dir: root.to_path_buf(),
        rows_per_statement: 3,
        admission_capacity: 2,
        analysis_threads: 2,
        ..BuildConfig::new(&output)
    };
    let writer = IndexWriter::create(&config).unwrap();
    let report = IngestPipeline::new(config, Arc::new(StandardAnalyzer::new())).run(files, writer).unwrap();
    assert_eq!(report.persisted, CORPUS.len() as u64);
    assert_eq!(report.skipped, 0);
    output
}

#[test]
fn build_then_load_reproduces_documents_and_postings() {
    let dir = tempdir().unwrap();
    let files = write_corpus(dir.path());
    let output = build(dir.path(), files.clone());
    let index = load_index(&output).unwrap();

    let analyzer = StandardAnalyzer::new();
    let mut with_terms = 0;
    for file in &files {
        let expected = SourceDocument::from_path(file, dir.path()).unwrap().analyze(&analyzer);
        match index.doc(expected.id) {
            Some(doc) => {
                with_terms += 1;
                assert_eq!(doc.title, expected.title);
                assert_eq!(doc.path, expected.path);
                assert_eq!(doc.highest_term_frequency, expected.highest_term_frequency());
                for term in &expected.terms {
                    let stored = index.term(term.hash, &term.text).expect("term loaded");
                    assert_eq!(stored.frequency_in(expected.id), term.frequency, "{}", term.text);
                }
            }
            None => assert!(!expected.has_terms(), "document {} missing", expected.id),
        }
    }
    assert_eq!(with_terms, 4);
    assert_eq!(index.doc(1).unwrap().title, "Harbour lighthouse");
    assert_eq!(index.doc(3).unwrap().title, "Storm \"report\"");
    assert_eq!(index.doc(3).unwrap().path, "docs/3.txt");
    assert!(index.doc(4).is_none());
}

#[test]
fn term_ids_are_unique_per_text() {
    let dir = tempdir().unwrap();
    let docs = dir.path().join("docs");
    fs::create_dir_all(&docs).unwrap();
    let files: Vec<PathBuf> = (1..=60)
        .map(|id| {
            let path = docs.join(format!("{id}.txt"));
            fs::write(&path, format!("Shared vocabulary\nharbour lighthouse keeper storm orchard {}\n", "railway ".repeat(id % 4))).unwrap();
            path
        })
        .collect();
    let output = build_sized(dir.path(), files);
    let index = load_index(&output).unwrap();

    let ids: HashSet<u32> = index.terms().map(|t| t.id).collect();
    let texts: HashSet<&str> = index.terms().map(|t| t.text.as_str()).collect();
    assert_eq!(ids.len(), index.num_terms());
    assert_eq!(texts.len(), index.num_terms());
    let keeper = &StandardAnalyzer::new().analyze("keeper")[0];
    assert_eq!(index.term(keeper.hash, &keeper.text).unwrap().doc_count(), 60);
}

fn build_sized(root: &Path, files: Vec<PathBuf>) -> PathBuf {
    let output = root.join("index");
    let config = BuildConfig {
        base_dir: root.to_path_buf(),
        admission_capacity: 8,
        analysis_threads: 4,
        ..BuildConfig::new(&output)
    };
    let writer = IndexWriter::create(&config).unwrap();
    IngestPipeline::new(config, Arc::new(StandardAnalyzer::new())).run(files, writer).unwrap();
    output
}

#[test]
fn statement_batches_survive_reload() {
    let dir = tempdir().unwrap();
    let config = BuildConfig { rows_per_statement: 10, ..BuildConfig::new(dir.path()) };
    let mut writer = IndexWriter::create(&config).unwrap();
    let terms: Vec<AnalyzedTerm> = (0..2000).map(|i| AnalyzedTerm::new(format!("term{i:04}"), 1)).collect();
    let doc = AnalyzedDocument {
        id: 1,
        title: "Numbers".into(),
        path: "1.txt".into(),
        terms,
        complete: true,
    };
    writer.write_document(&doc, true);
    let summary = writer.finish().unwrap();

    let postings = &summary.tables[&Table::Intersection];
    assert_eq!(postings.rows, 2000);
    assert_eq!(postings.statements, 200);
    assert_eq!(postings.files.len(), 1);
    let text = fs::read_to_string(dir.path().join(Table::Intersection.file_name(1))).unwrap();
    assert_eq!(text.matches(Table::Intersection.header()).count(), 200);
    assert_eq!(text.lines().filter(|l| l.ends_with(';')).count(), 200);

    let index = load_index(dir.path()).unwrap();
    assert_eq!(index.num_postings(), 2000);
    assert_eq!(index.num_terms(), 2000);
}

#[test]
fn queries_run_against_a_built_index() {
    let dir = tempdir().unwrap();
    let files = write_corpus(dir.path());
    let output = build(dir.path(), files);
    let index = Arc::new(load_index(&output).unwrap());
    let config = SearchConfig { doc_root: dir.path().to_path_buf(), ..SearchConfig::default() };
    let engine = QueryEngine::new(index, Arc::new(StandardAnalyzer::new()), config);

    let outcome = engine.search("lighthouse harbour");
    let hits = outcome.hits();
    let ids: HashSet<u32> = hits.iter().map(|h| h.doc_id).collect();
    assert!(ids.contains(&1) && ids.contains(&3));
    assert!(hits.len() <= 5);
    assert!(hits.windows(2).all(|p| p[0].score >= p[1].score));
    assert!(hits.iter().any(|h| h.snippet.contains("lighthouse")));

    assert!(matches!(engine.search("zeppelin"), SearchOutcome::NoMatch));
}
