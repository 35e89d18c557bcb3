//! Text analysis collaborator for tokenized fields.
//!
//! The engine does not implement tokenization itself; tokenized-text fields
//! consume an injected [`Tokenizer`]. [`SimpleTokenizer`] is the default
//! implementation: Unicode word segmentation (UAX #29), lowercasing, and
//! stop-word filtering.

use std::collections::HashSet;

use unicode_segmentation::UnicodeSegmentation;

/// Tokenizer collaborator consumed by tokenized-text fields.
///
/// Implementations turn a raw field value into the sequence of terms credited
/// to the document. Implementations must be shareable across threads, as one
/// tokenizer instance serves every index an engine owns.
pub trait Tokenizer: Send + Sync {
    /// Split the text into search terms.
    fn tokenize(&self, text: &str) -> Vec<String>;
}

/// Default English stop words list.
const DEFAULT_STOP_WORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "but", "by", "for", "if", "in", "into", "is", "it",
    "no", "not", "of", "on", "or", "such", "that", "the", "their", "then", "there", "these",
    "they", "this", "to", "was", "will", "with",
];

/// A tokenizer that splits text on Unicode word boundaries, lowercases each
/// word, and drops stop words.
#[derive(Debug, Clone)]
pub struct SimpleTokenizer {
    stop_words: HashSet<String>,
}

impl SimpleTokenizer {
    /// Create a tokenizer with the default English stop word list.
    pub fn new() -> Self {
        SimpleTokenizer {
            stop_words: DEFAULT_STOP_WORDS.iter().map(|w| w.to_string()).collect(),
        }
    }

    /// Create a tokenizer with a custom stop word list.
    pub fn with_stop_words<I, S>(stop_words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        SimpleTokenizer {
            stop_words: stop_words.into_iter().map(|w| w.into()).collect(),
        }
    }
}

impl Default for SimpleTokenizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Tokenizer for SimpleTokenizer {
    fn tokenize(&self, text: &str) -> Vec<String> {
        text.unicode_words()
            .map(|word| word.to_lowercase())
            .filter(|word| !self.stop_words.contains(word))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_lowercases_and_drops_punctuation() {
        let tokenizer = SimpleTokenizer::new();
        let terms = tokenizer.tokenize("Hello, World!");
        assert_eq!(terms, vec!["hello", "world"]);
    }

    #[test]
    fn test_tokenize_filters_stop_words() {
        let tokenizer = SimpleTokenizer::new();
        let terms = tokenizer.tokenize("the quick brown fox");
        assert_eq!(terms, vec!["quick", "brown", "fox"]);
    }

    #[test]
    fn test_tokenize_empty_input() {
        let tokenizer = SimpleTokenizer::new();
        assert!(tokenizer.tokenize("").is_empty());
        assert!(tokenizer.tokenize("   ").is_empty());
    }

    #[test]
    fn test_custom_stop_words() {
        let tokenizer = SimpleTokenizer::with_stop_words(["fox"]);
        let terms = tokenizer.tokenize("the quick fox");
        assert_eq!(terms, vec!["the", "quick"]);
    }
}
