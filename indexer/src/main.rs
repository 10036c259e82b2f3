use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tfidx_core::analyzer::{Analyzer, StandardAnalyzer};
use tfidx_core::config::{BuildConfig, SearchConfig};
use tfidx_core::ingest::{BuildReport, IngestPipeline};
use tfidx_core::loader::spawn_load;
use tfidx_core::persist::{save_manifest, IndexPaths};
use tfidx_core::search::{QueryEngine, SearchOutcome};
use tfidx_core::writer::IndexWriter;
use tracing_subscriber::{fmt, EnvFilter};
use walkdir::WalkDir;

use std::fs;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "indexer")]
#[command(about = "Build and query a TF-IDF inverted index stored as flat relation files", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the index from a directory of text files named `<id>.<ext>`
    Build {
        /// Directory walked recursively for source documents
        #[arg(long)]
        input: PathBuf,
        /// Output index directory
        #[arg(long)]
        output: PathBuf,
        /// JSON build configuration; flags below override it
        #[arg(long)]
        config: Option<PathBuf>,
        /// Document paths are stored relative to this directory
        #[arg(long)]
        base_dir: Option<PathBuf>,
        #[arg(long)]
        rows_per_statement: Option<u64>,
        /// Byte ceiling of one index file, in MiB
        #[arg(long)]
        max_file_mb: Option<u64>,
        /// Documents allowed under analysis at once
        #[arg(long)]
        admission_capacity: Option<usize>,
        /// Analysis threads, 0 for one per CPU
        #[arg(long)]
        threads: Option<usize>,
    },
    /// Answer a query, or start an interactive prompt when none is given
    Query {
        /// Index directory
        #[arg(long)]
        index: PathBuf,
        /// Directory stored document paths are resolved against
        #[arg(long, default_value = ".")]
        doc_root: PathBuf,
        query: Option<String>,
    },
}

fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Build { input, output, config, base_dir, rows_per_statement, max_file_mb, admission_capacity, threads } => {
            let mut cfg = match config {
                Some(path) => {
                    let text = fs::read_to_string(&path).with_context(|| format!("reading {}", path.display()))?;
                    serde_json::from_str::<BuildConfig>(&text).with_context(|| format!("parsing {}", path.display()))?
                }
                None => BuildConfig::default(),
            };
            cfg.output_dir = output;
            if let Some(v) = base_dir { cfg.base_dir = v; }
            if let Some(v) = rows_per_statement { cfg.rows_per_statement = v; }
            if let Some(v) = max_file_mb { cfg.max_file_bytes = v * 1024 * 1024; }
            if let Some(v) = admission_capacity { cfg.admission_capacity = v; }
            if let Some(v) = threads { cfg.analysis_threads = v; }
            build_index(&input, cfg)
        }
        Commands::Query { index, doc_root, query } => {
            let config = SearchConfig { doc_root, ..SearchConfig::default() };
            run_queries(&index, config, query)
        }
    }
}

fn source_files(input: &Path) -> Result<Vec<PathBuf>> {
    if !input.is_dir() {
        bail!("input {} is not a directory", input.display());
    }
    let mut files: Vec<PathBuf> = WalkDir::new(input)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .collect();
    files.sort();
    Ok(files)
}

fn build_index(input: &Path, config: BuildConfig) -> Result<()> {
    let files = source_files(input)?;
    tracing::info!(input = %input.display(), files = files.len(), "collected source files");

    let writer = IndexWriter::create(&config).context("creating index files")?;
    let pipeline = IngestPipeline::new(config.clone(), Arc::new(StandardAnalyzer::new()));
    let report = pipeline.run(files, writer)?;
    save_manifest(&IndexPaths::new(&config.output_dir), &report.write.to_manifest(&config))?;
    print_report(&report);
    Ok(())
}

fn print_report(report: &BuildReport) {
    println!("Documents indexed:      {}", report.persisted - report.empty);
    println!("Documents without terms: {}", report.empty);
    println!("Files skipped:          {}", report.skipped);
    println!("Terms before filtering: {}", report.analyzer.raw_tokens);
    println!("Terms after filtering:  {}", report.analyzer.kept_tokens);
    println!("Distinct terms:         {}", report.write.tokens);
    println!("Postings:               {}", report.write.postings);
    if report.write.failed_rows > 0 || report.failed > 0 {
        println!("Rows lost to errors:    {}", report.write.failed_rows);
        println!("Failed analyses:        {}", report.failed);
    }
    println!("Build took {:.2}s", report.elapsed.as_secs_f64());
}

fn run_queries(index_dir: &Path, config: SearchConfig, query: Option<String>) -> Result<()> {
    let handle = spawn_load(index_dir)?;
    print!("Loading index");
    io::stdout().flush()?;
    while !handle.is_finished() {
        thread::sleep(Duration::from_millis(500));
        print!(".");
        io::stdout().flush()?;
    }
    println!();
    let index = handle.wait().with_context(|| format!("loading index from {}", index_dir.display()))?;
    println!("Loaded {} documents and {} terms.", index.num_docs(), index.num_terms());

    let analyzer: Arc<dyn Analyzer> = Arc::new(StandardAnalyzer::new());
    let engine = QueryEngine::new(Arc::new(index), analyzer, config);

    if let Some(q) = query {
        answer(&engine, &q);
        return Ok(());
    }

    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();
    loop {
        print!("\nPlease enter a query (exit() to quit): ");
        io::stdout().flush()?;
        let Some(line) = lines.next() else { break };
        let line = line?;
        let q = line.trim();
        if q == "exit()" {
            break;
        }
        if q.is_empty() {
            continue;
        }
        answer(&engine, q);
    }
    println!("Exiting.");
    Ok(())
}

fn answer(engine: &QueryEngine, query: &str) {
    match engine.search(query) {
        SearchOutcome::NoMatch => println!("\nYour query '{query}' didn't match any of the documents.\n"),
        SearchOutcome::Hits(hits) => {
            println!();
            for (i, hit) in hits.iter().enumerate() {
                println!("{}", hit.render(i + 1, engine.config().wrap_width));
            }
        }
    }
}
