use std::collections::HashMap;
use std::fs;
use std::path::Path;

use crate::analyzer::{AnalyzedSentence, Analyzer};

/// Shown when no sentence of a document matches the query.
pub const PLACEHOLDER: &str = "No matching passage found in this document.";
/// Prefix of every wrapped snippet line.
pub const INDENT: &str = "   \t";

#[derive(Debug, Clone, PartialEq)]
pub struct ScoredSentence {
    pub position: usize,
    pub text: String,
    pub score: f64,
}

/// Scores each sentence by cosine similarity against the query terms.
///
/// Sentence weights are `tf * isf` with tf relative to the sentence's most
/// frequent term and isf = sentences / sentences containing the term. Each
/// query term has weight 1.
pub fn score_sentences(sentences: &[AnalyzedSentence], query_terms: &[String]) -> Vec<ScoredSentence> {
    let total = sentences.len() as f64;
    let mut containing: HashMap<&str, u32> = HashMap::new();
    for sentence in sentences {
        for term in &sentence.terms {
            *containing.entry(term.text.as_str()).or_insert(0) += 1;
        }
    }

    sentences
        .iter()
        .enumerate()
        .map(|(position, sentence)| {
            let highest = sentence.terms.iter().map(|t| t.frequency).max().unwrap_or(0);
            let mut weights: HashMap<&str, f64> = sentence
                .terms
                .iter()
                .filter(|_| highest > 0)
                .map(|t| {
                    let tf = f64::from(t.frequency) / f64::from(highest);
                    let isf = total / f64::from(containing.get(t.text.as_str()).copied().unwrap_or(1));
                    (t.text.as_str(), tf * isf)
                })
                .collect();
            let score = cosine(&mut weights, query_terms);
            ScoredSentence { position, text: sentence.text.clone(), score }
        })
        .collect()
}

// Matched terms leave the sentence vector as they are counted so they only
// enter its norm once.
fn cosine(weights: &mut HashMap<&str, f64>, query_terms: &[String]) -> f64 {
    let mut numerator = 0.0;
    let mut query_norm = 0.0;
    let mut sentence_norm = 0.0;
    for term in query_terms {
        query_norm += 1.0;
        if let Some(w) = weights.remove(term.as_str()) {
            numerator += w;
            sentence_norm += w * w;
        }
    }
    if numerator == 0.0 {
        return 0.0;
    }
    sentence_norm += weights.values().map(|w| w * w).sum::<f64>();
    numerator / (f64::sqrt(query_norm) * f64::sqrt(sentence_norm))
}

/// Best `count` positive sentences, restored to document order and joined.
pub fn select(mut scored: Vec<ScoredSentence>, count: usize) -> String {
    scored.retain(|s| s.score > 0.0);
    if scored.is_empty() {
        return PLACEHOLDER.to_string();
    }
    scored.sort_by(|a, b| b.score.total_cmp(&a.score).then(a.position.cmp(&b.position)));
    scored.truncate(count.max(1));
    scored.sort_by_key(|s| s.position);
    scored.iter().map(|s| s.text.as_str()).collect::<Vec<_>>().join(" ")
}

pub fn snippet_text(body: &str, query_terms: &[String], analyzer: &dyn Analyzer, count: usize) -> String {
    let sentences = analyzer.sentences(body);
    select(score_sentences(&sentences, query_terms), count)
}

/// Snippet for the document stored at `path`. The first line holds the
/// title and is not part of the body.
pub fn document_snippet(path: &Path, query_terms: &[String], analyzer: &dyn Analyzer, count: usize) -> String {
    let bytes = match fs::read(path) {
        Ok(b) => b,
        Err(e) => {
            tracing::error!(path = %path.display(), error = %e, "failed to read document for snippet");
            return PLACEHOLDER.to_string();
        }
    };
    let text = String::from_utf8_lossy(&bytes);
    let body = text.split_once('\n').map(|(_, rest)| rest).unwrap_or("");
    tracing::trace!(path = %path.display(), "generating snippet");
    snippet_text(body, query_terms, analyzer, count)
}

/// Collapses whitespace and starts a new line once the current one has
/// reached `width` characters, so lines may overshoot to keep words whole.
/// Every line is prefixed with `indent` and terminated by a newline.
pub fn wrap_text(text: &str, width: usize, indent: &str) -> String {
    let mut out = String::new();
    let mut line_len = 0;
    for word in text.split_whitespace() {
        if line_len >= width {
            out.push('\n');
            line_len = 0;
        }
        if line_len == 0 {
            out.push_str(indent);
        } else {
            out.push(' ');
        }
        out.push_str(word);
        line_len += word.chars().count() + 1;
    }
    if !out.is_empty() {
        out.push('\n');
    }
    out
}
