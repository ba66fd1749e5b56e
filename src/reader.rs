//! Extractive answer selection.
//!
//! [`SpanReader`] is a deterministic span scorer. Within each chunk it
//! finds tokens matching the question's content terms and proposes short
//! spans of unmatched content words near those matches, in the same
//! sentence. A span's confidence is
//!
//! ```text
//! coverage × 1/distance × length factor × direction factor × type factor
//! ```
//!
//! where `coverage` is the fraction of question terms found in the chunk.
//! Spans are verbatim slices of the chunk text.

use std::cmp::Ordering;

use async_trait::async_trait;

use crate::config::ReaderConfig;
use crate::error::Result;
use crate::models::{Answer, Chunk};
use crate::retriever::validate_query;
use crate::tokenize::{is_stopword, SimpleTokenizer, Token, Tokenizer};

/// Proposes answer spans for a question from a ranked set of chunks.
#[async_trait]
pub trait Reader: Send + Sync {
    fn model_id(&self) -> &str;

    /// Load the underlying model, if any.
    async fn init(&self) -> Result<()> {
        Ok(())
    }

    /// Answers pooled over `chunks`, sorted by confidence descending and
    /// truncated to `max_answers`. No chunks means no answers.
    async fn read(&self, query: &str, chunks: &[Chunk], max_answers: usize) -> Result<Vec<Answer>>;
}

const QUESTION_WORDS: &[&str] = &[
    "what", "which", "who", "whom", "whose", "when", "where", "why", "how", "does", "did", "do",
    "can", "could", "would", "should", "many", "much",
];

const LENGTH_FACTORS: [f64; 3] = [1.0, 0.9, 0.8];
const AFTER_MATCH_FACTOR: f64 = 0.9;
const NON_NUMERIC_FACTOR: f64 = 0.5;

pub struct SpanReader {
    tokenizer: SimpleTokenizer,
    max_span_tokens: usize,
    answers_per_chunk: usize,
}

impl SpanReader {
    pub fn new() -> Self {
        Self {
            tokenizer: SimpleTokenizer::new(),
            max_span_tokens: 3,
            answers_per_chunk: 1,
        }
    }

    pub fn from_config(config: &ReaderConfig) -> Self {
        Self {
            tokenizer: SimpleTokenizer::new(),
            max_span_tokens: config.max_span_tokens.clamp(1, LENGTH_FACTORS.len()),
            answers_per_chunk: config.answers_per_chunk.max(1),
        }
    }

    fn read_chunk(&self, question: &Question, chunk: &Chunk) -> Vec<Answer> {
        let tokens = self.tokenizer.tokenize(&chunk.text);
        let sentences = sentence_ids(&chunk.text, &tokens);
        let matched: Vec<bool> = tokens
            .iter()
            .map(|t| question.terms.iter().any(|q| terms_match(q, &t.term)))
            .collect();

        let found = question
            .terms
            .iter()
            .filter(|q| tokens.iter().any(|t| terms_match(q, &t.term)))
            .count();
        if found == 0 {
            return Vec::new();
        }
        let coverage = found as f64 / question.terms.len() as f64;

        let is_candidate = |i: usize| !matched[i] && !is_stopword(&tokens[i].term);
        let matches: Vec<usize> = (0..tokens.len()).filter(|&i| matched[i]).collect();

        let mut spans: Vec<(usize, usize, f64)> = Vec::new();
        for start in 0..tokens.len() {
            for len in 1..=self.max_span_tokens {
                let end = start + len - 1;
                if end >= tokens.len()
                    || !(start..=end).all(&is_candidate)
                    || sentences[start] != sentences[end]
                {
                    break;
                }
                let best = matches
                    .iter()
                    .filter(|&&m| sentences[m] == sentences[start])
                    .map(|&m| {
                        let (dist, after) = if m > end {
                            (m - end, false)
                        } else {
                            (start - m, true)
                        };
                        let direction = if after { AFTER_MATCH_FACTOR } else { 1.0 };
                        direction / dist as f64
                    })
                    .fold(0.0f64, f64::max);
                if best <= 0.0 {
                    continue;
                }
                let mut score = coverage * best * LENGTH_FACTORS[len - 1];
                let text = &chunk.text[tokens[start].start..tokens[end].end];
                if question.numeric && !text.chars().any(|c| c.is_ascii_digit()) {
                    score *= NON_NUMERIC_FACTOR;
                }
                spans.push((start, end, score));
            }
        }

        spans.sort_by(|a, b| {
            b.2.partial_cmp(&a.2)
                .unwrap_or(Ordering::Equal)
                .then(a.0.cmp(&b.0))
                .then(a.1.cmp(&b.1))
        });
        spans
            .into_iter()
            .take(self.answers_per_chunk)
            .map(|(start, end, score)| {
                let (s, e) = (tokens[start].start, tokens[end].end);
                Answer {
                    text: chunk.text[s..e].to_string(),
                    chunk_id: chunk.id,
                    start: s,
                    end: e,
                    confidence: round4(score.clamp(0.0, 1.0)),
                }
            })
            .collect()
    }
}

impl Default for SpanReader {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Reader for SpanReader {
    fn model_id(&self) -> &str {
        "span-proximity-v1"
    }

    async fn read(&self, query: &str, chunks: &[Chunk], max_answers: usize) -> Result<Vec<Answer>> {
        validate_query(query)?;
        let question = Question::parse(&self.tokenizer, query);
        if chunks.is_empty() || max_answers == 0 || question.terms.is_empty() {
            return Ok(Vec::new());
        }

        let mut answers = Vec::new();
        for chunk in chunks {
            answers.extend(self.read_chunk(&question, chunk));
            tokio::task::yield_now().await;
        }
        // Stable: equal confidences keep retrieval order.
        answers.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(Ordering::Equal)
        });
        answers.truncate(max_answers);
        Ok(answers)
    }
}

struct Question {
    terms: Vec<String>,
    numeric: bool,
}

impl Question {
    fn parse(tokenizer: &SimpleTokenizer, query: &str) -> Self {
        let all = tokenizer.terms(query);
        let numeric = all.iter().any(|t| t == "when")
            || all.windows(2).any(|w| {
                w[0] == "how" && matches!(w[1].as_str(), "many" | "much" | "long" | "old")
            });
        let mut terms: Vec<String> = all
            .iter()
            .filter(|t| !is_stopword(t) && !QUESTION_WORDS.contains(&t.as_str()))
            .cloned()
            .collect();
        if terms.is_empty() {
            terms = all.into_iter().filter(|t| !is_stopword(t)).collect();
        }
        terms.sort();
        terms.dedup();
        Self { terms, numeric }
    }
}

/// Exact match, or a shared 4-character prefix for words of 4+ characters.
fn terms_match(query_term: &str, token: &str) -> bool {
    if query_term == token {
        return true;
    }
    let mut q = query_term.chars();
    let mut t = token.chars();
    if query_term.chars().count() < 4 || token.chars().count() < 4 {
        return false;
    }
    (0..4).all(|_| q.next() == t.next())
}

/// Sentence index of every token; `.`, `!`, `?` and blank lines separate
/// sentences.
fn sentence_ids(text: &str, tokens: &[Token]) -> Vec<usize> {
    let mut ids = Vec::with_capacity(tokens.len());
    let mut current = 0usize;
    let mut prev_end = 0usize;
    for token in tokens {
        let gap = &text[prev_end..token.start];
        if !ids.is_empty() && (gap.contains(['.', '!', '?']) || gap.contains("\n\n")) {
            current += 1;
        }
        ids.push(current);
        prev_end = token.end;
    }
    ids
}

fn round4(x: f64) -> f64 {
    (x * 10_000.0).round() / 10_000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::{ChunkStrategy, Normalizer};
    use uuid::Uuid;

    fn chunk(text: &str) -> Chunk {
        Normalizer::new(ChunkStrategy::Paragraph { max_tokens: 1000 })
            .chunk_text(Uuid::new_v4(), text)
            .remove(0)
    }

    #[tokio::test]
    async fn finds_the_fox() {
        let c = chunk("The quick brown fox jumps over the lazy dog.");
        let answers = SpanReader::new().read("What animal jumps?", &[c.clone()], 3).await.unwrap();
        assert_eq!(answers.len(), 1);
        assert_eq!(answers[0].text, "fox");
        assert_eq!(answers[0].chunk_id, c.id);
        assert_eq!(&c.text[answers[0].start..answers[0].end], "fox");
        assert!((answers[0].confidence - 0.5).abs() < 1e-9);
    }

    #[tokio::test]
    async fn empty_chunks_give_empty_answers() {
        let answers = SpanReader::new().read("anything at all", &[], 3).await.unwrap();
        assert!(answers.is_empty());
    }

    #[tokio::test]
    async fn blank_query_is_invalid() {
        let c = chunk("some text");
        let err = SpanReader::new().read(" \t ", &[c], 3).await.unwrap_err();
        assert_eq!(err.kind(), "invalid_query");
    }

    #[tokio::test]
    async fn numeric_questions_prefer_digits() {
        let c = chunk("The bridge opened in 1932 after long delays.");
        let answers = SpanReader::new().read("When was the bridge opened?", &[c], 1).await.unwrap();
        assert!(answers[0].text.contains("1932"), "{:?}", answers);
    }

    #[tokio::test]
    async fn answers_stay_within_a_sentence() {
        let c = chunk("Paris is lovely. Capital cities attract tourists.");
        let answers = SpanReader::new().read("Which city is lovely?", &[c], 5).await.unwrap();
        assert_eq!(answers[0].text, "Paris");
    }

    #[tokio::test]
    async fn answers_are_pooled_and_sorted() {
        let strong = chunk("Rust compiles to native code.");
        let weak = chunk("Rust is mentioned here without the other term nearby at all anyway.");
        let reader = SpanReader::new();
        let answers = reader
            .read("What does Rust compile to?", &[weak.clone(), strong.clone()], 5)
            .await
            .unwrap();
        assert!(answers.len() >= 2);
        assert_eq!(answers[0].chunk_id, strong.id);
        assert!(answers.windows(2).all(|w| w[0].confidence >= w[1].confidence));
        let one = reader.read("What does Rust compile to?", &[weak, strong], 1).await.unwrap();
        assert_eq!(one.len(), 1);
    }

    #[tokio::test]
    async fn no_matching_terms_means_no_answers() {
        let c = chunk("Completely unrelated sentence.");
        let answers = SpanReader::new().read("Who wrote Hamlet?", &[c], 3).await.unwrap();
        assert!(answers.is_empty());
    }

    #[test]
    fn prefix_matching_needs_four_chars() {
        assert!(terms_match("jumps", "jumped"));
        assert!(!terms_match("cat", "cats"));
        assert!(terms_match("cat", "cat"));
    }
}
