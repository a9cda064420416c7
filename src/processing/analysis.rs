//! Sentence and token analytics plus the optional sentence-length reduction.

use super::types::AnalysisResult;
use unicode_segmentation::UnicodeSegmentation;

/// Coarse classification of a word-boundary segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// Contains at least one alphanumeric character.
    Word,
    /// Symbols and punctuation only.
    Punctuation,
    /// Spaces, tabs, and line breaks.
    Whitespace,
}

impl TokenKind {
    /// Classify a single segment.
    pub fn classify(segment: &str) -> Self {
        if segment.chars().all(char::is_whitespace) {
            Self::Whitespace
        } else if segment
            .chars()
            .any(|ch| ch.is_alphanumeric() || ch.is_whitespace())
        {
            Self::Word
        } else {
            Self::Punctuation
        }
    }
}

/// A borrowed slice of the analyzed text with its classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token<'a> {
    /// Segment text.
    pub text: &'a str,
    /// Segment classification.
    pub kind: TokenKind,
}

/// Sentence and token segmentation backend.
///
/// Implementations hold no per-request state and are shared across concurrent requests.
pub trait LinguisticAnalyzer: Send + Sync {
    /// Sentence spans of `text`, in order, excluding whitespace-only spans.
    fn sentences<'a>(&self, text: &'a str) -> Vec<&'a str>;

    /// Every token of `text`, whitespace and punctuation included, in order.
    fn tokens<'a>(&self, text: &'a str) -> Vec<Token<'a>>;
}

/// Analyzer based on Unicode (UAX #29) sentence and word boundaries.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnicodeAnalyzer;

impl LinguisticAnalyzer for UnicodeAnalyzer {
    fn sentences<'a>(&self, text: &'a str) -> Vec<&'a str> {
        text.split_sentence_bounds()
            .filter(|sentence| !sentence.trim().is_empty())
            .collect()
    }

    fn tokens<'a>(&self, text: &'a str) -> Vec<Token<'a>> {
        text.split_word_bounds()
            .map(|segment| Token {
                text: segment,
                kind: TokenKind::classify(segment),
            })
            .collect()
    }
}

/// Count sentences and word tokens of `text`, and build `reduced_text` when `reduce` is set.
///
/// Counts always describe the full text, reduced or not.
pub fn analyze(
    analyzer: &dyn LinguisticAnalyzer,
    text: &str,
    reduce: bool,
    min_chars: usize,
) -> AnalysisResult {
    let sentences = analyzer.sentences(text);
    let token_count = analyzer
        .tokens(text)
        .iter()
        .filter(|token| token.kind == TokenKind::Word)
        .count();

    let reduced_text = reduce.then(|| reduce_sentences(&sentences, min_chars));

    AnalysisResult {
        sentence_count: sentences.len(),
        token_count,
        reduced_text,
    }
}

/// Keep trimmed sentences longer than `min_chars` characters, joined by single spaces.
fn reduce_sentences(sentences: &[&str], min_chars: usize) -> String {
    sentences
        .iter()
        .map(|sentence| sentence.trim())
        .filter(|sentence| sentence.chars().count() > min_chars)
        .collect::<Vec<_>>()
        .join(" ")
}
