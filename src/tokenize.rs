//! Term tokenization shared by the lexical index and the reader.

use std::collections::HashSet;

/// A lowercased term with its byte span in the source text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub term: String,
    pub start: usize,
    pub end: usize,
}

pub trait Tokenizer: Send + Sync {
    fn tokenize(&self, text: &str) -> Vec<Token>;

    fn terms(&self, text: &str) -> Vec<String> {
        self.tokenize(text).into_iter().map(|t| t.term).collect()
    }
}

pub const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "but", "by", "for", "from", "has", "have", "he",
    "her", "his", "i", "if", "in", "into", "is", "it", "its", "me", "my", "no", "not", "of", "on",
    "or", "our", "she", "so", "such", "than", "that", "the", "their", "them", "then", "there",
    "these", "they", "this", "to", "was", "we", "were", "will", "with", "you", "your",
];

pub fn is_stopword(term: &str) -> bool {
    STOPWORDS.contains(&term)
}

/// Splits on non-alphanumeric characters and lowercases.
#[derive(Debug, Clone)]
pub struct SimpleTokenizer {
    stopwords: HashSet<&'static str>,
}

impl SimpleTokenizer {
    pub fn new() -> Self {
        Self {
            stopwords: HashSet::new(),
        }
    }

    /// Tokenizer that drops [`STOPWORDS`].
    pub fn without_stopwords() -> Self {
        Self {
            stopwords: STOPWORDS.iter().copied().collect(),
        }
    }
}

impl Default for SimpleTokenizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Tokenizer for SimpleTokenizer {
    fn tokenize(&self, text: &str) -> Vec<Token> {
        let mut tokens = Vec::new();
        let mut start: Option<usize> = None;
        let push = |s: usize, e: usize, tokens: &mut Vec<Token>| {
            let term = text[s..e].to_lowercase();
            if !self.stopwords.contains(term.as_str()) {
                tokens.push(Token {
                    term,
                    start: s,
                    end: e,
                });
            }
        };
        for (i, c) in text.char_indices() {
            if c.is_alphanumeric() {
                if start.is_none() {
                    start = Some(i);
                }
            } else if let Some(s) = start.take() {
                push(s, i, &mut tokens);
            }
        }
        if let Some(s) = start {
            push(s, text.len(), &mut tokens);
        }
        tokens
    }
}
