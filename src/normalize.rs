//! Document normalization: extraction followed by chunking.
//!
//! Chunks tile the extracted text exactly. Chunk `i` ends where chunk
//! `i + 1` starts, the first starts at 0 and the last ends at the text's
//! length. Whitespace between units belongs to the preceding chunk, so every
//! chunk holds at least one non-whitespace character.
//!
//! Chunk ids are UUID v5 derived from the document id and the span, which
//! makes re-normalizing the same document reproducible.

use tracing::debug;
use uuid::Uuid;

use crate::config::{ChunkingConfig, StrategyName};
use crate::error::Result;
use crate::extract::{self, Extracted, Format};
use crate::models::{sha256_hex, Chunk, Document, DocumentId};

/// Approximate bytes-per-token ratio used to size paragraph chunks.
const CHARS_PER_TOKEN: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkStrategy {
    /// Accumulate `\n\n`-separated paragraphs up to `max_tokens * 4` bytes.
    Paragraph { max_tokens: usize },
    /// Fixed windows of `tokens` whitespace-delimited words.
    Window { tokens: usize },
}

#[derive(Debug, Clone)]
pub struct Normalizer {
    strategy: ChunkStrategy,
}

impl Normalizer {
    pub fn new(strategy: ChunkStrategy) -> Self {
        Self { strategy }
    }

    pub fn from_config(config: &ChunkingConfig) -> Self {
        let strategy = match config.strategy {
            StrategyName::Paragraph => ChunkStrategy::Paragraph {
                max_tokens: config.max_tokens,
            },
            StrategyName::Window => ChunkStrategy::Window {
                tokens: config.window_tokens,
            },
        };
        Self::new(strategy)
    }

    pub fn strategy(&self) -> ChunkStrategy {
        self.strategy
    }

    pub fn extract(&self, document: &Document) -> Result<Extracted> {
        let format = Format::detect(document.content_type.as_deref(), &document.source)?;
        extract::extract(&document.content, format)
    }

    /// Extract and chunk a document. Whitespace-only content yields no chunks.
    pub fn normalize(&self, document: &Document) -> Result<Vec<Chunk>> {
        let extracted = self.extract(document)?;
        let chunks = self.chunk_text(document.id, &extracted.text);
        debug!(
            source = %document.source,
            format = ?extracted.format,
            excluded = extracted.exclusions.len(),
            chunks = chunks.len(),
            "normalized document"
        );
        Ok(chunks)
    }

    pub fn chunk_text(&self, document_id: DocumentId, text: &str) -> Vec<Chunk> {
        let units = match self.strategy {
            ChunkStrategy::Paragraph { max_tokens } => {
                let max_chars = max_tokens.max(1) * CHARS_PER_TOKEN;
                group_by_size(paragraph_units(text, max_chars), max_chars)
            }
            ChunkStrategy::Window { tokens } => group_by_count(word_units(text), tokens.max(1)),
        };
        if units.is_empty() {
            return Vec::new();
        }

        let mut cuts: Vec<usize> = Vec::with_capacity(units.len() + 1);
        cuts.push(0);
        cuts.extend(units.iter().skip(1).map(|&(start, _)| start));
        cuts.push(text.len());

        cuts.windows(2)
            .enumerate()
            .map(|(index, w)| make_chunk(document_id, index, w[0], w[1], &text[w[0]..w[1]]))
            .collect()
    }
}

fn make_chunk(document_id: DocumentId, index: usize, start: usize, end: usize, text: &str) -> Chunk {
    let name = format!("{}:{}", start, end);
    Chunk {
        id: Uuid::new_v5(&document_id, name.as_bytes()),
        document_id,
        index,
        start,
        end,
        text: text.to_string(),
        hash: sha256_hex(text.as_bytes()),
        embedding: None,
    }
}

/// Trimmed paragraph spans; paragraphs larger than `max_chars` are
/// hard-split at the last whitespace before the limit.
fn paragraph_units(text: &str, max_chars: usize) -> Vec<(usize, usize)> {
    let mut units = Vec::new();
    let mut offset = 0;
    for para in text.split("\n\n") {
        if let Some((start, end)) = trim_span(text, offset, offset + para.len()) {
            if end - start > max_chars {
                split_oversized(text, start, end, max_chars, &mut units);
            } else {
                units.push((start, end));
            }
        }
        offset += para.len() + 2;
    }
    units
}

fn split_oversized(
    text: &str,
    mut start: usize,
    end: usize,
    max_chars: usize,
    out: &mut Vec<(usize, usize)>,
) {
    while start < end {
        if end - start <= max_chars {
            out.push((start, end));
            return;
        }
        let mut limit = start + max_chars;
        while !text.is_char_boundary(limit) {
            limit -= 1;
        }
        let window = &text[start..limit];
        let cut = match window.rfind(|c: char| c.is_whitespace()) {
            Some(pos) if pos > 0 => start + pos,
            _ if limit > start => limit,
            // A single character wider than the limit.
            _ => start + text[start..].chars().next().map_or(1, char::len_utf8),
        };
        if let Some(span) = trim_span(text, start, cut) {
            out.push(span);
        }
        start = match trim_span(text, cut, end) {
            Some((next, _)) => next,
            None => return,
        };
    }
}

fn trim_span(text: &str, start: usize, end: usize) -> Option<(usize, usize)> {
    let slice = &text[start..end];
    let lead = slice.len() - slice.trim_start().len();
    let trimmed = slice.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some((start + lead, start + lead + trimmed.len()))
    }
}

fn word_units(text: &str) -> Vec<(usize, usize)> {
    let mut units = Vec::new();
    let mut start: Option<usize> = None;
    for (i, c) in text.char_indices() {
        match (c.is_whitespace(), start) {
            (true, Some(s)) => {
                units.push((s, i));
                start = None;
            }
            (false, None) => start = Some(i),
            _ => {}
        }
    }
    if let Some(s) = start {
        units.push((s, text.len()));
    }
    units
}

/// Greedily merge consecutive units while the merged span fits `max_chars`.
fn group_by_size(units: Vec<(usize, usize)>, max_chars: usize) -> Vec<(usize, usize)> {
    let mut groups: Vec<(usize, usize)> = Vec::new();
    for (start, end) in units {
        match groups.last_mut() {
            Some(group) if end - group.0 <= max_chars => group.1 = end,
            _ => groups.push((start, end)),
        }
    }
    groups
}

fn group_by_count(units: Vec<(usize, usize)>, per_group: usize) -> Vec<(usize, usize)> {
    units
        .chunks(per_group)
        .filter_map(|c| Some((c.first()?.0, c.last()?.1)))
        .collect()
}
