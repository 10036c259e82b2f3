use crate::TermHash;

const SEED: i64 = 1_125_899_906_842_597;
const MODULUS: u64 = 2_147_483_647;

/// Polynomial hash over the UTF-16 code units of `text`.
///
/// Used as a bucket selector only; two terms are the same entry iff their
/// text is equal.
pub fn term_hash(text: &str) -> TermHash {
    let h = text
        .encode_utf16()
        .fold(SEED, |h, unit| h.wrapping_mul(31).wrapping_add(i64::from(unit)));
    h.unsigned_abs() % MODULUS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic_and_bounded() {
        for word in ["", "a", "search", "engine", "café", "naïve", "ünïcödé", &"x".repeat(500)] {
            let h = term_hash(word);
            assert_eq!(h, term_hash(word));
            assert!(h < MODULUS);
        }
    }

    #[test]
    fn empty_text_hashes_to_reduced_seed() {
        assert_eq!(term_hash(""), SEED as u64 % MODULUS);
    }

    #[test]
    fn single_char_matches_formula() {
        let expected = (SEED.wrapping_mul(31) + 'a' as i64).unsigned_abs() % MODULUS;
        assert_eq!(term_hash("a"), expected);
    }

    #[test]
    fn distinct_words_usually_differ() {
        assert_ne!(term_hash("index"), term_hash("indexes"));
        assert_ne!(term_hash("ab"), term_hash("ba"));
    }
}
