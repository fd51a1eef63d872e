//! Embedding Index - 인메모리 정확 최근접 이웃 검색
//!
//! 청크와 벡터를 함께 보관하고 코사인 유사도로 전수 비교합니다.
//! 말뭉치가 작기 때문에 ANN 없이 정확 검색을 사용합니다.

use std::collections::HashSet;
use std::sync::{Arc, RwLock};

use crate::error::{RagError, Result};

use super::document::Chunk;

// ============================================================================
// Types
// ============================================================================

/// 검색 결과 한 건
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub chunk: Arc<Chunk>,
    /// 코사인 유사도 (-1.0 ~ 1.0)
    pub score: f32,
}

/// 유사도 내림차순 검색 결과 (동점은 수집 순서)
#[derive(Debug, Clone, Default)]
pub struct RetrievalResult {
    hits: Vec<ScoredChunk>,
}

impl RetrievalResult {
    pub fn new(hits: Vec<ScoredChunk>) -> Self {
        Self { hits }
    }

    pub fn len(&self) -> usize {
        self.hits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ScoredChunk> {
        self.hits.iter()
    }

    pub fn hits(&self) -> &[ScoredChunk] {
        &self.hits
    }

    pub fn scores(&self) -> Vec<f32> {
        self.hits.iter().map(|h| h.score).collect()
    }
}

impl<'a> IntoIterator for &'a RetrievalResult {
    type Item = &'a ScoredChunk;
    type IntoIter = std::slice::Iter<'a, ScoredChunk>;

    fn into_iter(self) -> Self::IntoIter {
        self.hits.iter()
    }
}

#[derive(Debug, Clone)]
struct IndexEntry {
    chunk: Arc<Chunk>,
    vector: Arc<[f32]>,
    norm: f32,
}

// ============================================================================
// EmbeddingIndex
// ============================================================================

/// 인메모리 벡터 인덱스
///
/// 복제 비용은 엔트리 수에 비례하는 `Arc` 복사뿐입니다.
#[derive(Debug, Clone)]
pub struct EmbeddingIndex {
    dimension: usize,
    model: String,
    entries: Vec<IndexEntry>,
    documents: HashSet<String>,
}

impl EmbeddingIndex {
    /// 빈 인덱스 생성
    ///
    /// # Arguments
    /// * `dimension` - 모든 벡터가 가져야 할 차원
    /// * `model` - 벡터를 만든 임베딩 모델 식별자
    pub fn new(dimension: usize, model: impl Into<String>) -> Self {
        Self {
            dimension,
            model: model.into(),
            entries: Vec::new(),
            documents: HashSet::new(),
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// 인덱싱된 청크 수
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 인덱싱된 문서 수 (본문 지문 기준)
    pub fn document_count(&self) -> usize {
        self.documents.len()
    }

    /// 같은 본문의 문서가 이미 들어 있는지
    pub fn contains_document(&self, fingerprint: &str) -> bool {
        self.documents.contains(fingerprint)
    }

    /// 배치 추가
    ///
    /// 모든 벡터를 먼저 검증하므로 실패 시 인덱스는 변경되지 않습니다.
    ///
    /// # Returns
    /// 추가된 엔트리 수
    pub fn add(&mut self, chunks: Vec<Chunk>, vectors: Vec<Vec<f32>>) -> Result<usize> {
        if chunks.len() != vectors.len() {
            return Err(RagError::InvalidBatch {
                chunks: chunks.len(),
                vectors: vectors.len(),
            });
        }
        if let Some(bad) = vectors.iter().find(|v| v.len() != self.dimension) {
            return Err(RagError::DimensionMismatch {
                expected: self.dimension,
                actual: bad.len(),
            });
        }

        let added = chunks.len();
        self.entries.reserve(added);
        for (chunk, vector) in chunks.into_iter().zip(vectors) {
            self.documents.insert(chunk.document_fingerprint.clone());
            self.entries.push(IndexEntry {
                norm: norm(&vector),
                chunk: Arc::new(chunk),
                vector: vector.into(),
            });
        }

        Ok(added)
    }

    /// 전체 교체 (기존 엔트리 모두 삭제)
    pub fn rebuild(&mut self, chunks: Vec<Chunk>, vectors: Vec<Vec<f32>>) -> Result<usize> {
        let mut fresh = Self::new(self.dimension, self.model.clone());
        let added = fresh.add(chunks, vectors)?;
        *self = fresh;
        Ok(added)
    }

    /// 최근접 이웃 검색
    ///
    /// `k`가 인덱스 크기보다 크면 인덱스 크기로 줄입니다.
    pub fn query(&self, vector: &[f32], k: usize) -> Result<RetrievalResult> {
        if self.entries.is_empty() {
            return Err(RagError::IndexEmpty);
        }
        if vector.len() != self.dimension {
            return Err(RagError::DimensionMismatch {
                expected: self.dimension,
                actual: vector.len(),
            });
        }

        let query_norm = norm(vector);
        let mut hits: Vec<ScoredChunk> = self
            .entries
            .iter()
            .map(|entry| ScoredChunk {
                chunk: Arc::clone(&entry.chunk),
                score: cosine(vector, query_norm, &entry.vector, entry.norm),
            })
            .collect();

        // 안정 정렬: 동점이면 수집 순서 유지
        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(k.min(self.entries.len()));

        Ok(RetrievalResult::new(hits))
    }
}

// ============================================================================
// IndexHandle
// ============================================================================

/// 공유 인덱스 핸들
///
/// 읽기는 현재 스냅샷(`Arc`)을 가져가고, 쓰기는 새 인덱스를 통째로 교체합니다.
/// 진행 중인 검색은 교체의 영향을 받지 않습니다.
#[derive(Debug)]
pub struct IndexHandle {
    current: RwLock<Arc<EmbeddingIndex>>,
}

impl IndexHandle {
    pub fn new(index: EmbeddingIndex) -> Self {
        Self {
            current: RwLock::new(Arc::new(index)),
        }
    }

    /// 현재 인덱스 스냅샷
    pub fn snapshot(&self) -> Arc<EmbeddingIndex> {
        let guard = self.current.read().unwrap_or_else(|e| e.into_inner());
        Arc::clone(&*guard)
    }

    /// 새 인덱스로 교체
    pub fn swap(&self, index: EmbeddingIndex) -> Arc<EmbeddingIndex> {
        let mut guard = self.current.write().unwrap_or_else(|e| e.into_inner());
        std::mem::replace(&mut *guard, Arc::new(index))
    }
}

// ============================================================================
// Utility Functions
// ============================================================================

fn norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

fn cosine(a: &[f32], norm_a: f32, b: &[f32], norm_b: f32) -> f32 {
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    dot / (norm_a * norm_b)
}

/// 코사인 유사도 계산
///
/// 두 벡터 간의 코사인 유사도를 계산합니다.
/// 길이가 다르거나 영벡터면 0.0입니다.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    cosine(a, norm(a), b, norm(b))
}

// ============================================================================
// Tests
// ============================================================================
