//! Text folding used to compare chat utterances against secret and banned words.

use std::ops::RangeInclusive;

use unicode_normalization::UnicodeNormalization;

/// Combining diacritical marks left over after canonical decomposition.
const COMBINING_MARKS: RangeInclusive<char> = '\u{0300}'..='\u{036f}';

/// Lowercase, strip accents, collapse whitespace and trim.
pub fn normalize(raw: &str) -> String {
    let folded: String = raw
        .to_lowercase()
        .nfd()
        .filter(|ch| !COMBINING_MARKS.contains(ch))
        .collect();
    folded.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Naive singular form of every token: a trailing `s` is dropped.
pub fn singularize(normalized: &str) -> String {
    normalized
        .split(' ')
        .map(|token| token.strip_suffix('s').unwrap_or(token))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Full comparison form: [`normalize`] then [`singularize`].
pub fn clean(raw: &str) -> String {
    singularize(&normalize(raw))
}

/// Whether `needle` appears in `haystack` as a run of whole tokens, after cleaning both.
pub fn contains_term(haystack: &str, needle: &str) -> bool {
    let needle = clean(needle);
    if needle.is_empty() {
        return false;
    }
    let haystack = clean(haystack);
    let tokens: Vec<&str> = haystack.split(' ').collect();
    let wanted: Vec<&str> = needle.split(' ').collect();
    tokens.windows(wanted.len()).any(|window| window == wanted.as_slice())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_folds_case_accents_and_spacing() {
        assert_eq!(normalize("  Canción   DEL  Año "), "cancion del ano");
        assert_eq!(normalize("\tÉCOLE\n"), "ecole");
    }

    #[test]
    fn accents_outside_latin_1_fold_too() {
        assert_eq!(clean("Čaj"), clean("caj"));
        assert_eq!(normalize("Śnieg"), "snieg");
        assert_eq!(normalize("Őrség ȘTEFAN"), "orseg stefan");
        assert!(contains_term("we drink čaj here", "caj"));
    }

    #[test]
    fn singularize_strips_trailing_s_per_token() {
        assert_eq!(singularize("cats and dogs"), "cat and dog");
        assert_eq!(clean("Penguins"), "penguin");
    }

    #[test]
    fn terms_match_whole_tokens_only() {
        assert!(contains_term("it lives near the SEA", "sea"));
        assert!(contains_term("you need strings to play", "string"));
        assert!(contains_term("a big Mountain range", "mountain"));
        assert!(!contains_term("take a seat", "sea"));
        assert!(!contains_term("anything", ""));
    }

    #[test]
    fn multi_word_terms_match_in_sequence() {
        assert!(contains_term("the North Pole is cold", "north pole"));
        assert!(!contains_term("pole to the north", "north pole"));
    }
}
