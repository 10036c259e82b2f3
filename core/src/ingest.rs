use parking_lot::{Condvar, Mutex};
use std::collections::{HashSet, VecDeque};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::analyzer::{Analyzer, AnalyzerStats};
use crate::config::BuildConfig;
use crate::document::{AnalyzedDocument, SourceDocument};
use crate::error::{IndexError, Result};
use crate::writer::{IndexWriter, WriteSummary};
use crate::DocId;

/// Result of offering a document to the [`AdmissionQueue`].
#[derive(Debug)]
pub enum Admission {
    Admitted,
    /// The queue is full or closed; the document is handed back
    Refused(SourceDocument),
}

impl Admission {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Admission::Admitted)
    }
}

/// An admitted document whose analysis may still be running.
struct Pending {
    id: DocId,
    done: Receiver<AnalyzedDocument>,
}

#[derive(Default)]
struct AdmissionState {
    pending: VecDeque<Pending>,
    closed: bool,
}

struct Shared {
    state: Mutex<AdmissionState>,
    changed: Condvar,
}

/// Counts kept by the persist loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PersistStats {
    pub persisted: u64,
    /// Persisted documents without surviving terms
    pub empty: u64,
    /// Analyses that died before reporting a result
    pub failed: u64,
}

/// Bounded set of documents under analysis.
///
/// Admission starts analysis on the worker pool right away; once `capacity`
/// documents are admitted and not yet persisted, further admissions are
/// refused. [`AdmissionQueue::persist_all`] drains finished analyses into the
/// writer until the queue is closed and empty.
pub struct AdmissionQueue {
    capacity: usize,
    analyzer: Arc<dyn Analyzer>,
    pool: rayon::ThreadPool,
    shared: Arc<Shared>,
    refused: AtomicU64,
}

impl AdmissionQueue {
    pub fn new(capacity: usize, analyzer: Arc<dyn Analyzer>, threads: usize) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("analyze-{i}"))
            .build()?;
        tracing::debug!(capacity, threads = pool.current_num_threads(), "admission queue ready");
        Ok(Self {
            capacity: capacity.max(1),
            analyzer,
            pool,
            shared: Arc::new(Shared { state: Mutex::new(AdmissionState::default()), changed: Condvar::new() }),
            refused: AtomicU64::new(0),
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Documents admitted and not yet persisted.
    pub fn in_flight(&self) -> usize {
        self.shared.state.lock().pending.len()
    }

    pub fn refused(&self) -> u64 {
        self.refused.load(Ordering::Relaxed)
    }

    /// Admits `doc` and starts analysing it, or hands it back when full.
    pub fn try_admit(&self, doc: SourceDocument) -> Admission {
        let mut state = self.shared.state.lock();
        if state.closed {
            tracing::error!(doc_id = doc.id, "admission after close");
            return Admission::Refused(doc);
        }
        if state.pending.len() >= self.capacity {
            self.refused.fetch_add(1, Ordering::Relaxed);
            tracing::trace!(doc_id = doc.id, in_flight = state.pending.len(), "admission refused");
            return Admission::Refused(doc);
        }

        let (tx, rx) = mpsc::sync_channel(1);
        state.pending.push_back(Pending { id: doc.id, done: rx });
        drop(state);

        let analyzer = self.analyzer.clone();
        let shared = self.shared.clone();
        self.pool.spawn(move || {
            let analyzed = doc.analyze(analyzer.as_ref());
            // The receiver only goes away if the persist loop is gone.
            let _ = tx.send(analyzed);
            shared.changed.notify_all();
        });
        Admission::Admitted
    }

    /// Blocks until a slot frees up or `timeout` passes.
    pub fn wait_for_slot(&self, timeout: Duration) {
        let mut state = self.shared.state.lock();
        if state.pending.len() >= self.capacity {
            self.shared.changed.wait_for(&mut state, timeout);
        }
    }

    /// No more documents will be admitted.
    pub fn close(&self) {
        self.shared.state.lock().closed = true;
        self.shared.changed.notify_all();
    }

    /// Persists finished analyses until the queue is closed and every
    /// admitted document has been written.
    ///
    /// Unfinished documents are put back at the end of the queue. After a
    /// full pass without progress the loop waits for a completion, bounded
    /// by `poll`.
    pub fn persist_all(&self, writer: &mut IndexWriter, poll: Duration) -> PersistStats {
        let mut stats = PersistStats::default();
        let mut misses = 0usize;
        loop {
            let next = {
                let mut state = self.shared.state.lock();
                loop {
                    if misses > 0 && misses >= state.pending.len() {
                        self.shared.changed.wait_for(&mut state, poll);
                        misses = 0;
                    }
                    if let Some(p) = state.pending.pop_front() {
                        break Some(p);
                    }
                    if state.closed {
                        break None;
                    }
                    self.shared.changed.wait_for(&mut state, poll);
                }
            };
            let Some(pending) = next else { break };

            match pending.done.try_recv() {
                Ok(doc) => {
                    let last = {
                        let state = self.shared.state.lock();
                        state.closed && state.pending.is_empty()
                    };
                    self.persist(writer, &doc, last, &mut stats);
                    self.shared.changed.notify_all();
                    misses = 0;
                }
                Err(TryRecvError::Empty) => {
                    self.shared.state.lock().pending.push_back(pending);
                    misses += 1;
                }
                Err(TryRecvError::Disconnected) => {
                    tracing::error!(doc_id = pending.id, "analysis ended without a result");
                    stats.failed += 1;
                    self.shared.changed.notify_all();
                    misses = 0;
                }
            }
        }
        tracing::debug!(persisted = stats.persisted, empty = stats.empty, "persist loop finished");
        stats
    }

    fn persist(&self, writer: &mut IndexWriter, doc: &AnalyzedDocument, last: bool, stats: &mut PersistStats) {
        if !doc.complete {
            tracing::warn!(doc_id = doc.id, path = %doc.path, "persisting partially read document");
        }
        let written = writer.write_document(doc, last);
        stats.persisted += 1;
        if !written.document_row {
            stats.empty += 1;
            tracing::debug!(doc_id = doc.id, path = %doc.path, "document has no terms");
        }
        tracing::debug!(
            doc_id = doc.id,
            postings = written.postings,
            new_terms = written.new_terms,
            last,
            "document persisted"
        );
    }
}

#[derive(Default)]
struct Inbox {
    queue: VecDeque<SourceDocument>,
    seen: HashSet<DocId>,
    closed: bool,
}

/// Front stage of the pipeline: accepts documents and feeds them to the
/// admission queue, re-queueing refused ones.
#[derive(Default)]
pub struct Intake {
    inbox: Mutex<Inbox>,
    arrived: Condvar,
}

impl Intake {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a document. Returns false when intake is closed or the ID was
    /// already submitted.
    pub fn submit(&self, doc: SourceDocument) -> bool {
        let mut inbox = self.inbox.lock();
        if inbox.closed {
            tracing::warn!(doc_id = doc.id, "document submitted after intake closed");
            return false;
        }
        if !inbox.seen.insert(doc.id) {
            tracing::warn!(doc_id = doc.id, file = %doc.file.display(), "duplicate document id, skipping");
            return false;
        }
        inbox.queue.push_back(doc);
        drop(inbox);
        self.arrived.notify_one();
        true
    }

    /// Stops accepting documents; queued ones are still delivered.
    pub fn close(&self) {
        self.inbox.lock().closed = true;
        self.arrived.notify_all();
    }

    /// Delivers queued documents until closed and drained, then closes
    /// `admission`.
    pub fn run(&self, admission: &AdmissionQueue, poll: Duration) {
        loop {
            let next = {
                let mut inbox = self.inbox.lock();
                loop {
                    if let Some(doc) = inbox.queue.pop_front() {
                        break Some(doc);
                    }
                    if inbox.closed {
                        break None;
                    }
                    self.arrived.wait_for(&mut inbox, poll);
                }
            };
            let Some(doc) = next else { break };
            if let Admission::Refused(doc) = admission.try_admit(doc) {
                self.inbox.lock().queue.push_back(doc);
                admission.wait_for_slot(poll);
            }
        }
        admission.close();
        tracing::debug!("intake drained");
    }
}

/// Summary of one index build.
#[derive(Debug, Clone, Default)]
pub struct BuildReport {
    pub submitted: u64,
    /// Files without a numeric ID or with a duplicate one
    pub skipped: u64,
    pub persisted: u64,
    pub empty: u64,
    pub failed: u64,
    pub refused_admissions: u64,
    pub analyzer: AnalyzerStats,
    pub write: WriteSummary,
    pub elapsed: Duration,
}

/// Runs intake, analysis and persistence for a set of source files.
pub struct IngestPipeline {
    config: BuildConfig,
    analyzer: Arc<dyn Analyzer>,
}

impl IngestPipeline {
    pub fn new(config: BuildConfig, analyzer: Arc<dyn Analyzer>) -> Self {
        Self { config, analyzer }
    }

    pub fn config(&self) -> &BuildConfig {
        &self.config
    }

    /// Builds the index from `files` and closes `writer`.
    pub fn run<I>(&self, files: I, mut writer: IndexWriter) -> Result<BuildReport>
    where
        I: IntoIterator<Item = PathBuf>,
    {
        let started = Instant::now();
        let poll = self.config.poll_interval();
        let admission =
            AdmissionQueue::new(self.config.admission_capacity, self.analyzer.clone(), self.config.analysis_threads)?;
        let intake = Intake::new();
        let mut report = BuildReport::default();
        tracing::info!(output = %self.config.output_dir.display(), "index build started");

        let stats = thread::scope(|s| {
            let intake_loop = thread::Builder::new().name("intake".into()).spawn_scoped(s, || intake.run(&admission, poll))?;
            let persist_loop = match thread::Builder::new()
                .name("persist".into())
                .spawn_scoped(s, || admission.persist_all(&mut writer, poll))
            {
                Ok(handle) => handle,
                Err(e) => {
                    intake.close();
                    return Err(e.into());
                }
            };

            for file in files {
                match SourceDocument::from_path(&file, &self.config.base_dir) {
                    Some(doc) => {
                        if intake.submit(doc) {
                            report.submitted += 1;
                        } else {
                            report.skipped += 1;
                        }
                    }
                    None => {
                        tracing::warn!(file = %file.display(), "file name has no numeric document id, skipping");
                        report.skipped += 1;
                    }
                }
            }
            intake.close();

            intake_loop.join().map_err(|_| IndexError::Worker("intake loop panicked".into()))?;
            persist_loop.join().map_err(|_| IndexError::Worker("persist loop panicked".into()))
        })?;

        report.persisted = stats.persisted;
        report.empty = stats.empty;
        report.failed = stats.failed;
        report.refused_admissions = admission.refused();
        report.analyzer = self.analyzer.stats();
        report.write = writer.finish()?;
        report.elapsed = started.elapsed();
        tracing::info!(
            submitted = report.submitted,
            persisted = report.persisted,
            empty = report.empty,
            skipped = report.skipped,
            tokens = report.write.tokens,
            postings = report.write.postings,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "index build complete"
        );
        Ok(report)
    }
}
