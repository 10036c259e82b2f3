use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::{DocId, TermHash, TermId};

/// A document as seen by the query engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Doc {
    pub id: DocId,
    pub title: String,
    /// Path as stored at build time, see [`Doc::resolve`]
    pub path: String,
    pub highest_term_frequency: u32,
}

impl Doc {
    pub fn resolve(&self, doc_root: &Path) -> PathBuf {
        doc_root.join(&self.path)
    }
}

/// A vocabulary entry with its postings.
#[derive(Debug, Clone)]
pub struct Term {
    pub id: TermId,
    pub text: String,
    pub hash: TermHash,
    /// Document -> occurrences of this term in it
    pub postings: HashMap<DocId, u32>,
}

impl Term {
    pub fn new(id: TermId, text: impl Into<String>, hash: TermHash) -> Self {
        Self { id, text: text.into(), hash, postings: HashMap::new() }
    }

    /// Frequency of the term in `doc`, 0 when absent.
    pub fn frequency_in(&self, doc: DocId) -> u32 {
        self.postings.get(&doc).copied().unwrap_or(0)
    }

    /// Number of documents containing the term.
    pub fn doc_count(&self) -> usize {
        self.postings.len()
    }

    pub fn docs(&self) -> impl Iterator<Item = DocId> + '_ {
        self.postings.keys().copied()
    }
}

/// Immutable query-time index: documents by ID and terms bucketed by hash.
#[derive(Debug, Default)]
pub struct InvertedIndex {
    docs: HashMap<DocId, Doc>,
    terms: HashMap<TermHash, Vec<Term>>,
    num_terms: usize,
    num_postings: usize,
}

impl InvertedIndex {
    pub fn new() -> Self { Self::default() }

    /// Assembles the query structure, moving each term into its hash bucket.
    pub fn from_parts<I: IntoIterator<Item = Term>>(docs: HashMap<DocId, Doc>, terms: I) -> Self {
        let mut index = Self { docs, ..Self::default() };
        for term in terms {
            index.num_terms += 1;
            index.num_postings += term.postings.len();
            index.terms.entry(term.hash).or_default().push(term);
        }
        index
    }

    pub fn doc(&self, id: DocId) -> Option<&Doc> {
        self.docs.get(&id)
    }

    pub fn term(&self, hash: TermHash, text: &str) -> Option<&Term> {
        self.terms.get(&hash)?.iter().find(|t| t.text == text)
    }

    pub fn docs(&self) -> impl Iterator<Item = &Doc> {
        self.docs.values()
    }

    pub fn terms(&self) -> impl Iterator<Item = &Term> {
        self.terms.values().flatten()
    }

    pub fn num_docs(&self) -> usize { self.docs.len() }
    pub fn num_terms(&self) -> usize { self.num_terms }
    pub fn num_postings(&self) -> usize { self.num_postings }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::term_hash;

    #[test]
    fn lookup_is_by_hash_then_text() {
        let mut a = Term::new(1, "alpha", 9);
        a.postings.insert(3, 2);
        let b = Term::new(2, "beta", 9);
        let c = Term::new(3, "gamma", term_hash("gamma"));
        let index = InvertedIndex::from_parts(HashMap::new(), vec![a, b, c]);

        assert_eq!(index.term(9, "alpha").unwrap().id, 1);
        assert_eq!(index.term(9, "beta").unwrap().id, 2);
        assert!(index.term(9, "gamma").is_none());
        assert_eq!(index.term(term_hash("gamma"), "gamma").unwrap().id, 3);
        assert_eq!(index.num_terms(), 3);
        assert_eq!(index.num_postings(), 1);
        assert_eq!(index.term(9, "alpha").unwrap().frequency_in(3), 2);
        assert_eq!(index.term(9, "alpha").unwrap().frequency_in(4), 0);
    }
}
