use lazy_static::lazy_static;
use regex::Regex;
use rust_stemmers::{Algorithm, Stemmer};
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use unicode_normalization::UnicodeNormalization;

use crate::hash::term_hash;
use crate::TermHash;

lazy_static! {
    static ref WORD: Regex = Regex::new(r"(?u)\p{L}[\p{L}\p{N}_'’-]*").expect("valid regex");
    static ref SENTENCE_END: Regex = Regex::new(r#"[.!?]+["')\]]*\s+|\n\s*\n"#).expect("valid regex");
    static ref STEMMER: Stemmer = Stemmer::create(Algorithm::English);
    static ref STOPWORDS: HashSet<&'static str> = {
        let words: &[&str] = &[
            "a","about","above","after","again","against","all","am","an","and","any","are","aren't","as","at",
            "be","because","been","before","being","below","between","both","but","by",
            "can","can't","cannot","could","couldn't",
            "did","didn't","do","does","doesn't","doing","don't","down","during",
            "each","few","for","from","further",
            "had","hadn't","has","hasn't","have","haven't","having","he","he'd","he'll","he's","her","here","here's","hers","herself","him","himself","his","how","how's",
            "i","i'd","i'll","i'm","i've","if","in","into","is","isn't","it","it's","its","itself",
            "let's","me","more","most","mustn't","my","myself",
            "no","nor","not","of","off","on","once","only","or","other","ought","our","ours","ourselves","out","over","own",
            "same","she","she'd","she'll","she's","should","shouldn't","so","some","such",
            "than","that","that's","the","their","theirs","them","themselves","then","there","there's","these","they","they'd","they'll","they're","they've","this","those","through","to","too",
            "under","until","up","very",
            "was","wasn't","we","we'd","we'll","we're","we've","were","weren't","what","what's","when","when's","where","where's","which","while","who","who's","whom","why","why's","with","won't","would","wouldn't",
            "you","you'd","you'll","you're","you've","your","yours","yourself","yourselves"
        ];
        words.iter().copied().collect()
    };
}

const MIN_TERM_CHARS: usize = 3;
const MAX_TERM_CHARS: usize = 45;

/// One normalized term and how often it occurred in the analysed scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalyzedTerm {
    pub text: String,
    pub hash: TermHash,
    pub frequency: u32,
}

impl AnalyzedTerm {
    pub fn new(text: impl Into<String>, frequency: u32) -> Self {
        let text = text.into();
        let hash = term_hash(&text);
        Self { text, hash, frequency }
    }
}

#[derive(Debug, Clone)]
pub struct AnalyzedSentence {
    pub text: String,
    pub terms: Vec<AnalyzedTerm>,
}

/// Token counts observed by an analyzer, before and after filtering.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AnalyzerStats {
    pub raw_tokens: u64,
    pub kept_tokens: u64,
}

/// Turns raw text into normalized terms.
///
/// Implementors only provide [`Analyzer::terms`]; the bag and sentence views
/// are derived from it so build time and query time normalize identically.
pub trait Analyzer: Send + Sync {
    /// Normalized term occurrences in text order.
    fn terms(&self, text: &str) -> Vec<String>;

    /// Distinct terms with their counts, ordered by text.
    fn analyze(&self, text: &str) -> Vec<AnalyzedTerm> {
        bag_of_terms(self.terms(text))
    }

    /// Sentences in document order with their own term bags.
    fn sentences(&self, text: &str) -> Vec<AnalyzedSentence> {
        split_sentences(text)
            .into_iter()
            .map(|s| AnalyzedSentence { terms: self.analyze(s), text: s.to_string() })
            .collect()
    }

    fn stats(&self) -> AnalyzerStats {
        AnalyzerStats::default()
    }
}

pub fn bag_of_terms<I: IntoIterator<Item = String>>(terms: I) -> Vec<AnalyzedTerm> {
    let mut counts: BTreeMap<String, u32> = BTreeMap::new();
    for term in terms {
        *counts.entry(term).or_insert(0) += 1;
    }
    counts.into_iter().map(|(text, frequency)| AnalyzedTerm::new(text, frequency)).collect()
}

/// Splits on sentence punctuation followed by whitespace, and on blank lines.
pub fn split_sentences(text: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = 0;
    for m in SENTENCE_END.find_iter(text) {
        let sentence = text[start..m.end()].trim();
        if !sentence.is_empty() {
            out.push(sentence);
        }
        start = m.end();
    }
    let rest = text[start..].trim();
    if !rest.is_empty() {
        out.push(rest);
    }
    out
}

/// NFKC + lowercase, stopword removal, English stemming, then drops forms
/// outside 3..=45 characters or containing anything other than letters,
/// apostrophes and hyphens.
#[derive(Default)]
pub struct StandardAnalyzer {
    raw: AtomicU64,
    kept: AtomicU64,
}

impl StandardAnalyzer {
    pub fn new() -> Self {
        Self::default()
    }
}

fn is_stopword(token: &str) -> bool {
    STOPWORDS.contains(token)
}

fn is_legal_form(term: &str) -> bool {
    let len = term.chars().count();
    (MIN_TERM_CHARS..=MAX_TERM_CHARS).contains(&len) && term.chars().all(|c| c.is_alphabetic() || c == '\'' || c == '-')
}

impl Analyzer for StandardAnalyzer {
    fn terms(&self, text: &str) -> Vec<String> {
        let normalized = text.nfkc().collect::<String>().to_lowercase().replace('’', "'");
        let mut raw = 0u64;
        let mut terms = Vec::new();
        for mat in WORD.find_iter(&normalized) {
            raw += 1;
            let token = mat.as_str().trim_end_matches(&['\'', '-'][..]);
            if is_stopword(token) {
                continue;
            }
            let stem = STEMMER.stem(token).to_string();
            if is_legal_form(&stem) {
                terms.push(stem);
            }
        }
        self.raw.fetch_add(raw, Ordering::Relaxed);
        self.kept.fetch_add(terms.len() as u64, Ordering::Relaxed);
        terms
    }

    fn stats(&self) -> AnalyzerStats {
        AnalyzerStats { raw_tokens: self.raw.load(Ordering::Relaxed), kept_tokens: self.kept.load(Ordering::Relaxed) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legal_forms_allow_apostrophes_and_hyphens() {
        assert!(is_legal_form("well-known"));
        assert!(is_legal_form("o'brien"));
        assert!(!is_legal_form("b2b"));
        assert!(!is_legal_form("ab"));
        assert!(!is_legal_form("snake_case"));
    }

    #[test]
    fn basic_analyze() {
        let terms = StandardAnalyzer::new().analyze("Running, runner's run!");
        let run = terms.iter().find(|t| t.text == "run").expect("run stem");
        assert!(run.frequency >= 2);
        assert_eq!(run.hash, term_hash("run"));
    }

    #[test]
    fn drops_short_and_numeric_forms() {
        let terms = StandardAnalyzer::new().terms("ox go 42 b2b x86 searching");
        assert_eq!(terms, vec!["search".to_string()]);
    }

    #[test]
    fn sentences_keep_order_and_punctuation() {
        let parts = split_sentences("First one. Second one!  Third?\n\nFourth without end");
        assert_eq!(parts, vec!["First one.", "Second one!", "Third?", "Fourth without end"]);
    }

    #[test]
    fn stats_accumulate() {
        let a = StandardAnalyzer::new();
        a.terms("the quick brown fox");
        let stats = a.stats();
        assert_eq!(stats.raw_tokens, 4);
        assert_eq!(stats.kept_tokens, 3);
    }
}
