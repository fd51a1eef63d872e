//! Text Chunking Module
//!
//! 구분자 우선순위(문단 > 줄 > 문장 > 단어 > 문자)에 따라 재귀적으로
//! 텍스트를 나누고, 이웃 청크끼리 겹치는 구간을 둡니다.
//!
//! 청크는 항상 원문의 연속된 바이트 범위이므로, 각 청크에서 이전 청크와의
//! 겹침을 제거하고 이어 붙이면 원문이 그대로 복원됩니다.

use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};

use super::document::{Chunk, Document};

/// 분할 구분자 (거친 것부터). 모두 소진되면 문자 단위로 자릅니다.
pub const SEPARATORS: [&str; 4] = ["\n\n", "\n", ". ", " "];

// ============================================================================
// Chunk Configuration
// ============================================================================

/// 청킹 설정 (문자 수 기준)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkConfig {
    /// 최대 청크 크기
    pub chunk_size: usize,
    /// 이웃 청크와 겹치는 최대 길이
    pub overlap: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            overlap: 100,
        }
    }
}

impl ChunkConfig {
    /// 검증 후 생성
    pub fn new(chunk_size: usize, overlap: usize) -> Result<Self> {
        let config = Self {
            chunk_size,
            overlap,
        };
        config.validate()?;
        Ok(config)
    }

    /// `chunk_size > 0`, `overlap < chunk_size`
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(RagError::Chunking("chunk_size must be positive".into()));
        }
        if self.overlap >= self.chunk_size {
            return Err(RagError::Chunking(format!(
                "overlap ({}) must be smaller than chunk_size ({})",
                self.overlap, self.chunk_size
            )));
        }
        Ok(())
    }
}

// ============================================================================
// Chunker Trait
// ============================================================================

/// 텍스트 청킹 전략 트레이트
pub trait Chunker: Send + Sync {
    /// 문서를 순서 있는 청크 목록으로 분할
    fn split(&self, document: &Document) -> Vec<Chunk>;

    /// 청커 이름
    fn name(&self) -> &'static str;
}

// ============================================================================
// RecursiveChunker
// ============================================================================

/// 재귀 구분자 청커
pub struct RecursiveChunker {
    config: ChunkConfig,
}

impl RecursiveChunker {
    /// 설정 검증 후 생성
    pub fn new(config: ChunkConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> ChunkConfig {
        self.config
    }

    /// 원문을 chunk_size 이하의 조각들로 분할 (조각을 이으면 원문)
    fn split_pieces(&self, text: &str) -> Vec<Range<usize>> {
        let mut pieces = Vec::new();
        if !text.is_empty() {
            self.split_recursive(text, 0..text.len(), 0, &mut pieces);
        }
        pieces
    }

    fn split_recursive(
        &self,
        text: &str,
        range: Range<usize>,
        level: usize,
        out: &mut Vec<Range<usize>>,
    ) {
        let segment = &text[range.clone()];
        if char_len(segment) <= self.config.chunk_size {
            out.push(range);
            return;
        }

        let Some(separator) = SEPARATORS.get(level) else {
            // 구분자 소진: 문자 단위
            self.split_chars(segment, range.start, out);
            return;
        };

        // 구분자는 앞 조각의 끝에 붙여 둡니다
        let mut pos = range.start;
        for part in segment.split_inclusive(*separator) {
            let part_range = pos..pos + part.len();
            pos += part.len();

            if char_len(part) <= self.config.chunk_size {
                out.push(part_range);
            } else {
                self.split_recursive(text, part_range, level + 1, out);
            }
        }
    }

    /// 겹침 자리를 남기도록 `chunk_size - overlap` 문자씩 자름
    fn split_chars(&self, segment: &str, offset: usize, out: &mut Vec<Range<usize>>) {
        let step = self.config.chunk_size - self.config.overlap;
        let mut start = 0;
        let mut count = 0;
        for (i, _) in segment.char_indices() {
            if count == step {
                out.push(offset + start..offset + i);
                start = i;
                count = 0;
            }
            count += 1;
        }
        out.push(offset + start..offset + segment.len());
    }

    /// 조각들을 chunk_size 이하로 묶고 겹침 시작점을 정함
    fn merge_pieces(&self, text: &str, pieces: &[Range<usize>]) -> Vec<Range<usize>> {
        let size = self.config.chunk_size;
        let lens: Vec<usize> = pieces.iter().map(|r| char_len(&text[r.clone()])).collect();

        let mut spans = Vec::new();
        let mut next = 0;
        let mut start = match pieces.first() {
            Some(first) => first.start,
            None => return spans,
        };

        while next < pieces.len() {
            let mut len = char_len(&text[start..pieces[next].start]);
            let mut end = pieces[next].start;

            while next < pieces.len() && len + lens[next] <= size {
                len += lens[next];
                end = pieces[next].end;
                next += 1;
            }
            spans.push(start..end);

            if next == pieces.len() {
                break;
            }

            // 다음 조각이 반드시 들어갈 만큼만 겹침 허용
            let max_overlap = self.config.overlap.min(size - lens[next]);
            start = overlap_start(text, start, end, max_overlap);
        }

        spans
    }
}

impl Chunker for RecursiveChunker {
    fn split(&self, document: &Document) -> Vec<Chunk> {
        let text = document.text();
        let pieces = self.split_pieces(text);
        let spans = self.merge_pieces(text, &pieces);

        let mut chunks: Vec<Chunk> = Vec::with_capacity(spans.len());
        for (sequence, span) in spans.iter().enumerate() {
            let overlap_prev = match sequence.checked_sub(1).and_then(|i| spans.get(i)) {
                Some(prev) => prev.end.saturating_sub(span.start),
                None => 0,
            };
            if let Some(prev) = chunks.last_mut() {
                prev.overlap_next = overlap_prev;
            }

            chunks.push(Chunk {
                document_id: document.id().to_string(),
                document_fingerprint: document.fingerprint().to_string(),
                sequence,
                text: text[span.clone()].to_string(),
                start: span.start,
                end: span.end,
                overlap_prev,
                overlap_next: 0,
                source: document.source().clone(),
            });
        }

        tracing::debug!(
            "Chunked {} into {} chunks (size={}, overlap={})",
            document.id(),
            chunks.len(),
            self.config.chunk_size,
            self.config.overlap
        );

        chunks
    }

    fn name(&self) -> &'static str {
        "RecursiveChunker"
    }
}

/// `split(document, chunk_size, overlap)`
pub fn split(document: &Document, chunk_size: usize, overlap: usize) -> Result<Vec<Chunk>> {
    let chunker = RecursiveChunker::new(ChunkConfig::new(chunk_size, overlap)?)?;
    Ok(chunker.split(document))
}

// ============================================================================
// Helper Functions
// ============================================================================

#[inline]
fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// `text[lo..hi]`의 끝에서 최대 `max_chars` 문자 안쪽의 겹침 시작 위치
///
/// 공백 바로 뒤(단어 경계)를 우선하고, 없으면 문자 경계를 사용합니다.
/// 반환값은 항상 `lo`보다 큽니다 (이전 청크 전체를 겹치지 않음).
fn overlap_start(text: &str, lo: usize, hi: usize, max_chars: usize) -> usize {
    if max_chars == 0 || lo >= hi {
        return hi;
    }

    let window = &text[lo..hi];
    let total = char_len(window);
    let skip = total.saturating_sub(max_chars).max(1);
    let earliest = match window.char_indices().nth(skip) {
        Some((i, _)) => i,
        None => return hi,
    };

    let after_whitespace = window[..earliest]
        .chars()
        .next_back()
        .map_or(false, char::is_whitespace);
    if after_whitespace {
        return lo + earliest;
    }

    match window[earliest..]
        .char_indices()
        .find(|(_, c)| c.is_whitespace())
    {
        Some((i, c)) => lo + earliest + i + c.len_utf8(),
        None => lo + earliest,
    }
}

// ============================================================================
// Tests
// ============================================================================
