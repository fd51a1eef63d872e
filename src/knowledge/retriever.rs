//! Retriever - 질문 임베딩 + 인덱스 최근접 검색

use std::sync::Arc;

use crate::embedding::EmbeddingProvider;
use crate::error::{ProviderError, RagError, Result};
use crate::retry::RetryPolicy;

use super::index::{IndexHandle, RetrievalResult};

/// 질문 -> 상위 k 청크
pub struct Retriever {
    embedder: Arc<dyn EmbeddingProvider>,
    index: Arc<IndexHandle>,
    retry: RetryPolicy,
}

impl Retriever {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        index: Arc<IndexHandle>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            embedder,
            index,
            retry,
        }
    }

    /// 질문과 가장 유사한 청크 최대 k개
    ///
    /// 빈 인덱스면 임베딩 호출 없이 `IndexEmpty`를 반환합니다.
    pub async fn retrieve(&self, question: &str, k: usize) -> Result<RetrievalResult> {
        let question = question.trim();
        if question.is_empty() {
            return Err(RagError::Retrieval("question is empty".into()));
        }

        let index = self.index.snapshot();
        if index.is_empty() {
            return Err(RagError::IndexEmpty);
        }

        let embedder = &self.embedder;
        let vector = self
            .retry
            .run("query embedding", move || embedder.embed_query(question))
            .await
            .map_err(embedding_error)?;

        match index.query(&vector, k) {
            Ok(result) => {
                tracing::debug!(
                    "Retrieved {} chunks (top score: {:?})",
                    result.len(),
                    result.hits().first().map(|h| h.score)
                );
                Ok(result)
            }
            Err(e @ (RagError::IndexEmpty | RagError::DimensionMismatch { .. })) => Err(e),
            Err(e) => Err(RagError::Retrieval(e.to_string())),
        }
    }
}

pub(crate) fn embedding_error(e: ProviderError) -> RagError {
    RagError::Embedding(e.to_string())
}

// ============================================================================
// Tests
// ============================================================================
