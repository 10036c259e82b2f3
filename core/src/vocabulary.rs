use std::collections::HashMap;

use crate::{TermHash, TermId};

/// Build-time vocabulary: every distinct term text gets exactly one ID.
///
/// Terms are bucketed by hash; the hash only selects the bucket and the text
/// decides identity, so colliding terms still get separate IDs.
#[derive(Debug)]
pub struct Vocabulary {
    buckets: HashMap<TermHash, Vec<(String, TermId)>>,
    next_id: TermId,
}

impl Default for Vocabulary {
    fn default() -> Self {
        Self { buckets: HashMap::new(), next_id: 1 }
    }
}

impl Vocabulary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the ID for `text` and whether it was assigned just now.
    pub fn assign(&mut self, text: &str, hash: TermHash) -> (TermId, bool) {
        let bucket = self.buckets.entry(hash).or_default();
        if let Some((_, id)) = bucket.iter().find(|(t, _)| t == text) {
            return (*id, false);
        }
        let id = self.next_id;
        self.next_id += 1;
        bucket.push((text.to_string(), id));
        (id, true)
    }

    pub fn get(&self, text: &str, hash: TermHash) -> Option<TermId> {
        self.buckets.get(&hash)?.iter().find(|(t, _)| t == text).map(|(_, id)| *id)
    }

    pub fn len(&self) -> usize {
        (self.next_id - 1) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::term_hash;

    #[test]
    fn ids_are_sequential_and_stable() {
        let mut vocab = Vocabulary::new();
        assert_eq!(vocab.assign("alpha", term_hash("alpha")), (1, true));
        assert_eq!(vocab.assign("beta", term_hash("beta")), (2, true));
        assert_eq!(vocab.assign("alpha", term_hash("alpha")), (1, false));
        assert_eq!(vocab.len(), 2);
        assert_eq!(vocab.get("beta", term_hash("beta")), Some(2));
        assert_eq!(vocab.get("gamma", term_hash("gamma")), None);
    }

    #[test]
    fn colliding_hashes_keep_texts_apart() {
        let mut vocab = Vocabulary::new();
        assert_eq!(vocab.assign("one", 5), (1, true));
        assert_eq!(vocab.assign("two", 5), (2, true));
        assert_eq!(vocab.assign("one", 5), (1, false));
        assert_eq!(vocab.get("two", 5), Some(2));
    }
}
