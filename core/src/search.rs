use rayon::prelude::*;
use serde::Serialize;
use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, HashSet, VecDeque};
use std::path::PathBuf;
use std::sync::Arc;

use crate::analyzer::Analyzer;
use crate::config::SearchConfig;
use crate::index::{Doc, InvertedIndex, Term};
use crate::snippet::{document_snippet, wrap_text, INDENT};
use crate::DocId;

/// One ranked document with its snippet.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub doc_id: DocId,
    pub title: String,
    /// Path as stored in the index
    pub path: String,
    /// `path` resolved against the document root
    pub location: PathBuf,
    pub score: f64,
    pub snippet: String,
}

impl SearchHit {
    /// Terminal presentation: numbered title, wrapped snippet, location.
    pub fn render(&self, position: usize, width: usize) -> String {
        format!(
            "{}) {}\n{}{}LOCATION: {}\n",
            position,
            self.title,
            wrap_text(&self.snippet, width, INDENT),
            INDENT,
            self.location.display()
        )
    }
}

#[derive(Debug, Clone)]
pub enum SearchOutcome {
    /// No query term is known or no document contains them
    NoMatch,
    /// Ranked hits, best first
    Hits(Vec<SearchHit>),
}

impl SearchOutcome {
    pub fn hits(&self) -> &[SearchHit] {
        match self {
            SearchOutcome::NoMatch => &[],
            SearchOutcome::Hits(hits) => hits,
        }
    }

    pub fn is_match(&self) -> bool {
        matches!(self, SearchOutcome::Hits(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Scored {
    score: f64,
    doc: DocId,
}

impl Eq for Scored {}

impl Ord for Scored {
    // Higher score wins, then the lower document ID.
    fn cmp(&self, other: &Self) -> Ordering {
        self.score.total_cmp(&other.score).then_with(|| other.doc.cmp(&self.doc))
    }
}

impl PartialOrd for Scored {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Answers free-text queries against a loaded [`InvertedIndex`].
///
/// The index is never mutated after loading, so one engine can serve
/// concurrent queries through a shared reference.
pub struct QueryEngine {
    index: Arc<InvertedIndex>,
    analyzer: Arc<dyn Analyzer>,
    config: SearchConfig,
}

impl QueryEngine {
    pub fn new(index: Arc<InvertedIndex>, analyzer: Arc<dyn Analyzer>, config: SearchConfig) -> Self {
        Self { index, analyzer, config }
    }

    pub fn index(&self) -> &InvertedIndex {
        &self.index
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    /// Normalizes the query and keeps the terms the index knows.
    pub fn resolve_terms(&self, query: &str) -> Vec<&Term> {
        self.analyzer
            .analyze(query)
            .into_iter()
            .filter_map(|t| {
                let found = self.index.term(t.hash, &t.text);
                if found.is_none() {
                    tracing::debug!(term = %t.text, "query term not in index");
                }
                found
            })
            .collect()
    }

    /// Documents containing every term of `terms[i]` for i in `subset`.
    fn intersect(terms: &[&Term], subset: &[usize]) -> HashSet<DocId> {
        let Some(&smallest) = subset.iter().min_by_key(|&&i| terms[i].doc_count()) else {
            return HashSet::new();
        };
        terms[smallest]
            .docs()
            .filter(|doc| subset.iter().all(|&i| terms[i].postings.contains_key(doc)))
            .collect()
    }

    /// Intersection of all resolved terms, widened when too sparse.
    ///
    /// Below the candidate threshold, subsets with one term dropped are
    /// intersected breadth-first and unioned in; a subset's own children are
    /// only visited while it too stays below the threshold. At most
    /// `max_fallback_subsets` subsets are explored.
    pub fn candidates(&self, terms: &[&Term]) -> HashSet<DocId> {
        let threshold = self.config.candidate_threshold;
        let all: Vec<usize> = (0..terms.len()).collect();
        let mut pool = Self::intersect(terms, &all);
        if pool.len() >= threshold || terms.len() < 2 {
            return pool;
        }
        tracing::debug!(found = pool.len(), threshold, "sparse intersection, dropping terms");

        let mut visited: HashSet<Vec<usize>> = HashSet::new();
        visited.insert(all.clone());
        let mut frontier = VecDeque::from([all]);
        let mut explored = 0;
        'expand: while let Some(subset) = frontier.pop_front() {
            if subset.len() < 2 {
                continue;
            }
            for skip in 0..subset.len() {
                if explored >= self.config.max_fallback_subsets {
                    tracing::warn!(explored, "term subset limit reached");
                    break 'expand;
                }
                let child: Vec<usize> =
                    subset.iter().enumerate().filter(|&(i, _)| i != skip).map(|(_, &t)| t).collect();
                if !visited.insert(child.clone()) {
                    continue;
                }
                explored += 1;
                let found = Self::intersect(terms, &child);
                let sparse = found.len() < threshold;
                pool.extend(found);
                if sparse {
                    frontier.push_back(child);
                }
            }
        }
        tracing::debug!(candidates = pool.len(), explored, "fallback complete");
        pool
    }

    /// Sum of `tf * idf` over the terms, tf relative to the document's most
    /// frequent term and idf = log2(documents / documents with the term).
    pub fn score(&self, doc: &Doc, terms: &[&Term]) -> f64 {
        if doc.highest_term_frequency == 0 {
            return 0.0;
        }
        let total = self.index.num_docs() as f64;
        terms
            .iter()
            .filter(|t| t.doc_count() > 0)
            .map(|t| {
                let tf = f64::from(t.frequency_in(doc.id)) / f64::from(doc.highest_term_frequency);
                let idf = (total / t.doc_count() as f64).log2();
                tf * idf
            })
            .sum()
    }

    /// Top `max_results` candidates by score, best first.
    pub fn rank(&self, candidates: &HashSet<DocId>, terms: &[&Term]) -> Vec<(DocId, f64)> {
        let limit = self.config.max_results;
        let mut heap = BinaryHeap::with_capacity(limit + 1);
        for &id in candidates {
            let Some(doc) = self.index.doc(id) else { continue };
            let score = self.score(doc, terms);
            tracing::trace!(doc_id = id, score, "ranked document");
            heap.push(Reverse(Scored { score, doc: id }));
            if heap.len() > limit {
                heap.pop();
            }
        }
        heap.into_sorted_vec().into_iter().map(|Reverse(s)| (s.doc, s.score)).collect()
    }

    pub fn search(&self, query: &str) -> SearchOutcome {
        let terms = self.resolve_terms(query);
        if terms.is_empty() {
            tracing::info!(%query, "no query term is indexed");
            return SearchOutcome::NoMatch;
        }
        let candidates = self.candidates(&terms);
        if candidates.is_empty() {
            tracing::info!(%query, "no document matches");
            return SearchOutcome::NoMatch;
        }
        let ranked = self.rank(&candidates, &terms);
        let query_terms: Vec<String> = terms.iter().map(|t| t.text.clone()).collect();
        let hits: Vec<SearchHit> = ranked
            .par_iter()
            .filter_map(|&(doc_id, score)| {
                let doc = self.index.doc(doc_id)?;
                let location = doc.resolve(&self.config.doc_root);
                let snippet =
                    document_snippet(&location, &query_terms, self.analyzer.as_ref(), self.config.snippet_sentences);
                Some(SearchHit {
                    doc_id,
                    title: doc.title.clone(),
                    path: doc.path.clone(),
                    location,
                    score,
                    snippet,
                })
            })
            .collect();
        tracing::info!(%query, candidates = candidates.len(), hits = hits.len(), "query answered");
        SearchOutcome::Hits(hits)
    }
}
