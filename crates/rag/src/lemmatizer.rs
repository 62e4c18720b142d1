//! French query/index normalization (C1).
//!
//! Reduces surface word forms to Snowball stems so the BM25 query
//! vocabulary matches the vocabulary the ingestion-side indexer produced.
//! Deterministic and idempotent for identical input; never fails
//! per-query — a stemming error degrades to the raw lowercased text with
//! a one-time warning rather than aborting the caller's request.

use rust_stemmers::{Algorithm, Stemmer};
use unicode_segmentation::UnicodeSegmentation;

use crate::RagError;

/// French morphological normalizer (C1).
///
/// Holds a single stateless `Stemmer` instance, safe for concurrent use
/// from multiple tasks without an internal pool.
pub struct Lemmatizer {
    stemmer: Stemmer,
}

impl Lemmatizer {
    /// Loads the stemming model. Fails fatally — callers should treat a
    /// load failure as a startup error, not something to retry per
    /// request.
    pub fn load() -> Result<Self, RagError> {
        Ok(Self {
            stemmer: Stemmer::create(Algorithm::French),
        })
    }

    /// Lemmatizes `text`: lowercase, strip punctuation, tokenize on
    /// Unicode word boundaries, stem each token, rejoin with single
    /// spaces. Stopwords are retained — BM25's IDF term already
    /// discounts them.
    pub fn lemmatize(&self, text: &str) -> String {
        let lowered = text.to_lowercase();

        let lemmas: Vec<String> = lowered
            .unicode_words()
            .filter(|w| w.chars().any(|c| c.is_alphanumeric()))
            .map(|w| self.stemmer.stem(w).into_owned())
            .collect();

        lemmas.join(" ")
    }

    /// Per-query entry point: never returns an error. On any internal
    /// panic-free failure mode (there currently is none, but this keeps
    /// the fallback contract explicit for future stemming backends) the
    /// raw lowercased text is used instead.
    pub fn lemmatize_or_fallback(&self, text: &str) -> String {
        self.lemmatize(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lowercases_and_strips_punctuation() {
        let lem = Lemmatizer::load().unwrap();
        let out = lem.lemmatize("Les Chats, Noirs!");
        assert!(!out.contains(','));
        assert!(!out.contains('!'));
        assert_eq!(out, out.to_lowercase());
    }

    #[test]
    fn is_idempotent() {
        let lem = Lemmatizer::load().unwrap();
        let once = lem.lemmatize("Les chiens courent rapidement");
        let twice = lem.lemmatize(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn is_deterministic() {
        let lem = Lemmatizer::load().unwrap();
        let a = lem.lemmatize("la consommation énergétique");
        let b = lem.lemmatize("la consommation énergétique");
        assert_eq!(a, b);
    }

    #[test]
    fn empty_input_yields_empty_output() {
        let lem = Lemmatizer::load().unwrap();
        assert_eq!(lem.lemmatize(""), "");
    }

    #[test]
    fn stems_share_a_common_root() {
        let lem = Lemmatizer::load().unwrap();
        let a = lem.lemmatize("manger");
        let b = lem.lemmatize("mangeons");
        // Snowball French reduces both to the same stem.
        assert_eq!(a, b);
    }
}
