//! Answer Pipeline - 수집과 질의를 묶는 오케스트레이터
//!
//! ## 수집
//! 소스별로 로드 -> 청킹 -> 배치 임베딩 후, 현재 인덱스의 복사본에 추가하고
//! 마지막에 한 번에 교체합니다. 한 소스의 실패는 보고서에 기록되고
//! 나머지 소스는 계속 진행됩니다.
//!
//! ## 질의
//! retrieve -> assemble -> generate -> parse 네 단계를 순서대로 실행합니다.

use std::collections::HashSet;
use std::sync::Arc;

use futures::{stream, StreamExt, TryStreamExt};
use tokio::sync::Mutex;

use crate::config::RagConfig;
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::generation::Generator;
use crate::loader::{DocumentSource, LoaderRegistry};

use super::chunker::{ChunkConfig, Chunker, RecursiveChunker};
use super::document::{Chunk, Document};
use super::index::{EmbeddingIndex, IndexHandle, RetrievalResult};
use super::prompt::PromptAssembler;
use super::retriever::{embedding_error, Retriever};
use super::stages::{
    Answer, AnswerParser, AssembleStage, GenerateStage, ParseStage, Query, RetrieveStage, Stage,
};

// ============================================================================
// Ingestion Report
// ============================================================================

/// 소스 하나의 수집 결과
#[derive(Debug)]
pub enum IngestOutcome {
    /// 새 청크가 추가됨
    Ingested {
        documents: usize,
        chunks: usize,
        /// 이미 인덱스에 있어 건너뛴 문서 수
        duplicates: usize,
    },
    /// 모든 문서가 이미 인덱스에 있음
    Duplicate,
    /// 이 소스만 실패 (다른 소스는 계속 진행)
    Failed(RagError),
}

#[derive(Debug)]
pub struct SourceReport {
    pub source: String,
    pub outcome: IngestOutcome,
}

/// 수집 보고서 (입력 순서)
#[derive(Debug, Default)]
pub struct IngestReport {
    pub sources: Vec<SourceReport>,
    /// 수집 후 인덱스 청크 수
    pub total_chunks: usize,
}

impl IngestReport {
    /// 이번 호출로 추가된 청크 수
    pub fn added_chunks(&self) -> usize {
        self.sources
            .iter()
            .map(|s| match s.outcome {
                IngestOutcome::Ingested { chunks, .. } => chunks,
                _ => 0,
            })
            .sum()
    }

    pub fn failures(&self) -> impl Iterator<Item = (&str, &RagError)> {
        self.sources.iter().filter_map(|s| match &s.outcome {
            IngestOutcome::Failed(e) => Some((s.source.as_str(), e)),
            _ => None,
        })
    }

    pub fn is_complete(&self) -> bool {
        self.failures().next().is_none()
    }
}

/// 인덱스 현황
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexStats {
    pub chunks: usize,
    pub documents: usize,
    pub dimension: usize,
    pub model: String,
}

// ============================================================================
// AnswerPipeline
// ============================================================================

/// 질의 단계 이름 (실행 순서)
pub const QUERY_STAGES: [&str; 4] = ["retrieve", "assemble", "generate", "parse"];

pub struct AnswerPipeline {
    config: RagConfig,
    embedder: Arc<dyn EmbeddingProvider>,
    index: Arc<IndexHandle>,
    loaders: LoaderRegistry,
    /// 수집은 한 번에 하나씩
    ingest_lock: Mutex<()>,
    retrieve: RetrieveStage,
    assemble: AssembleStage,
    generate: GenerateStage,
    parse: ParseStage,
}

impl AnswerPipeline {
    /// 새 파이프라인 (빈 인덱스)
    ///
    /// 설정의 임베딩 차원과 프로바이더 차원이 다르면 `DimensionMismatch`입니다.
    pub fn new(
        config: &RagConfig,
        embedder: Arc<dyn EmbeddingProvider>,
        generator: Option<Arc<dyn Generator>>,
    ) -> Result<Self> {
        config.validate()?;

        if embedder.dimension() != config.embedding.dimension {
            return Err(RagError::DimensionMismatch {
                expected: config.embedding.dimension,
                actual: embedder.dimension(),
            });
        }

        let index = Arc::new(IndexHandle::new(EmbeddingIndex::new(
            embedder.dimension(),
            embedder.name(),
        )));
        let retriever = Retriever::new(Arc::clone(&embedder), Arc::clone(&index), config.retry);

        Ok(Self {
            config: config.clone(),
            embedder,
            index,
            loaders: LoaderRegistry::with_defaults(),
            ingest_lock: Mutex::new(()),
            retrieve: RetrieveStage::new(retriever),
            assemble: AssembleStage::new(PromptAssembler::new(config.instruction.clone())),
            generate: GenerateStage::new(generator, config.retry),
            parse: ParseStage::new(AnswerParser),
        })
    }

    /// 생성기 없이 검색만 하는 파이프라인
    pub fn retrieval_only(
        config: &RagConfig,
        embedder: Arc<dyn EmbeddingProvider>,
    ) -> Result<Self> {
        Self::new(config, embedder, None)
    }

    /// 로더 레지스트리 교체
    pub fn with_loaders(mut self, loaders: LoaderRegistry) -> Self {
        self.loaders = loaders;
        self
    }

    pub fn config(&self) -> &RagConfig {
        &self.config
    }

    pub fn loaders(&self) -> &LoaderRegistry {
        &self.loaders
    }

    /// 현재 인덱스 스냅샷
    pub fn snapshot(&self) -> Arc<EmbeddingIndex> {
        self.index.snapshot()
    }

    pub fn index_stats(&self) -> IndexStats {
        let index = self.index.snapshot();
        IndexStats {
            chunks: index.len(),
            documents: index.document_count(),
            dimension: index.dimension(),
            model: index.model().to_string(),
        }
    }

    /// 질의 단계 이름 (실행 순서)
    pub fn stage_names(&self) -> [&'static str; 4] {
        [
            self.retrieve.name(),
            self.assemble.name(),
            self.generate.name(),
            self.parse.name(),
        ]
    }

    // ========================================================================
    // Ingestion
    // ========================================================================

    /// 소스 수집
    ///
    /// 청크 설정이 잘못되면 아무것도 하지 않고 `Chunking` 에러를 반환합니다.
    /// `DimensionMismatch`/`InvalidBatch`는 호출 전체를 중단하며
    /// 공개된 인덱스는 그대로 남습니다.
    pub async fn ingest(
        &self,
        sources: &[DocumentSource],
        chunk_config: ChunkConfig,
    ) -> Result<IngestReport> {
        let chunker = RecursiveChunker::new(chunk_config)?;

        let _guard = self.ingest_lock.lock().await;
        let mut index = (*self.index.snapshot()).clone();
        let mut report = IngestReport::default();

        for source in sources {
            let label = source.label();
            let outcome = match self.ingest_source(source, &chunker, &mut index).await {
                Ok(outcome) => outcome,
                Err(e @ (RagError::DimensionMismatch { .. } | RagError::InvalidBatch { .. })) => {
                    tracing::error!("Aborting ingestion at {}: {}", label, e);
                    return Err(e);
                }
                Err(e) => {
                    tracing::warn!("Skipping {}: {}", label, e);
                    IngestOutcome::Failed(e)
                }
            };
            report.sources.push(SourceReport {
                source: label,
                outcome,
            });
        }

        report.total_chunks = index.len();
        if report.added_chunks() > 0 {
            self.index.swap(index);
        }

        tracing::info!(
            "Ingested {} sources: {} new chunks, {} total",
            report.sources.len(),
            report.added_chunks(),
            report.total_chunks
        );
        Ok(report)
    }

    /// 소스 하나를 스테이징 인덱스에 추가 (전부 아니면 전무)
    async fn ingest_source(
        &self,
        source: &DocumentSource,
        chunker: &RecursiveChunker,
        index: &mut EmbeddingIndex,
    ) -> Result<IngestOutcome> {
        let documents = match source {
            DocumentSource::Path(path) => self.loaders.load(path).await?,
            DocumentSource::Inline(doc) => vec![doc.clone()],
        };

        let (chunks, fresh, duplicates) = plan_chunks(&documents, chunker, index);
        if fresh == 0 && duplicates > 0 {
            tracing::debug!("{}: already indexed", source.label());
            return Ok(IngestOutcome::Duplicate);
        }

        let vectors = self.embed_chunks(&chunks).await?;
        let added = index.add(chunks, vectors)?;

        Ok(IngestOutcome::Ingested {
            documents: fresh,
            chunks: added,
            duplicates,
        })
    }

    /// 청크 배치 임베딩 (동시 실행 수 제한, 순서 유지)
    async fn embed_chunks(&self, chunks: &[Chunk]) -> Result<Vec<Vec<f32>>> {
        if chunks.is_empty() {
            return Ok(Vec::new());
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();

        let batches: Vec<Vec<Vec<f32>>> = stream::iter(texts.chunks(self.config.embed_batch_size))
            .map(move |batch| async move {
                let vectors = self.embed_texts(batch).await?;
                if vectors.len() != batch.len() {
                    return Err(RagError::Embedding(format!(
                        "provider returned {} vectors for {} texts",
                        vectors.len(),
                        batch.len()
                    )));
                }
                tracing::debug!("Embedded batch of {} chunks", batch.len());
                Ok::<_, RagError>(vectors)
            })
            .buffered(self.config.embed_concurrency)
            .try_collect()
            .await?;

        Ok(batches.into_iter().flatten().collect())
    }

    /// 배치 하나 임베딩
    ///
    /// 재시도 단위는 프로바이더 요청 하나입니다. 배치 요청을 지원하지 않는
    /// 프로바이더는 텍스트마다 재시도하므로, 이미 성공한 텍스트를 다시 보내지 않습니다.
    async fn embed_texts(&self, batch: &[String]) -> Result<Vec<Vec<f32>>> {
        let embedder = &self.embedder;
        let retry = &self.config.retry;

        if embedder.supports_batch_requests() {
            return retry
                .run("chunk embedding", move || embedder.embed_batch(batch))
                .await
                .map_err(embedding_error);
        }

        let mut vectors = Vec::with_capacity(batch.len());
        for text in batch {
            let vector = retry
                .run("chunk embedding", move || embedder.embed(text))
                .await
                .map_err(embedding_error)?;
            vectors.push(vector);
        }
        Ok(vectors)
    }

    // ========================================================================
    // Query
    // ========================================================================

    /// 질문에 대한 근거 기반 답변
    ///
    /// 어느 단계든 실패하면 해당 에러로 중단하며 부분 답변은 없습니다.
    pub async fn answer(
        &self,
        question: &str,
        k: usize,
        max_context_chars: usize,
    ) -> Result<Answer> {
        if !self.generate.is_configured() {
            return Err(RagError::Config("no generator configured".into()));
        }

        let query = Query {
            question: question.to_string(),
            k,
            max_context_chars,
        };

        let retrieved = self.retrieve.transform(query).await?;
        let prompt = self.assemble.transform(retrieved).await?;
        let generated = self.generate.transform(prompt).await?;
        let answer = self.parse.transform(generated).await?;

        tracing::info!(
            "Answered with {} sources (truncated: {})",
            answer.sources.len(),
            answer.truncated
        );
        Ok(answer)
    }

    /// 설정의 `top_k`/`max_context_chars`로 답변
    pub async fn ask(&self, question: &str) -> Result<Answer> {
        self.answer(question, self.config.top_k, self.config.max_context_chars)
            .await
    }

    /// 생성 없이 검색 결과만
    pub async fn search(&self, question: &str, k: usize) -> Result<RetrievalResult> {
        let query = Query {
            question: question.to_string(),
            k,
            max_context_chars: self.config.max_context_chars,
        };
        Ok(self.retrieve.transform(query).await?.result)
    }
}

/// 중복 문서를 걸러내고 청크로 분할
///
/// (청크, 새 문서 수, 중복 문서 수)
fn plan_chunks(
    documents: &[Document],
    chunker: &RecursiveChunker,
    index: &EmbeddingIndex,
) -> (Vec<Chunk>, usize, usize) {
    let mut seen = HashSet::new();
    let mut chunks = Vec::new();
    let mut fresh = 0;
    let mut duplicates = 0;

    for doc in documents {
        if doc.text().trim().is_empty() {
            continue;
        }
        if index.contains_document(doc.fingerprint()) || !seen.insert(doc.fingerprint()) {
            duplicates += 1;
            continue;
        }
        let doc_chunks = chunker.split(doc);
        if doc_chunks.is_empty() {
            continue;
        }
        fresh += 1;
        chunks.extend(doc_chunks);
    }

    (chunks, fresh, duplicates)
}

// ============================================================================
// Tests
// ============================================================================
