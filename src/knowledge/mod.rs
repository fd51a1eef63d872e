//! Knowledge 모듈 - 근거 기반 RAG 파이프라인
//!
//! - Chunker: 구분자 재귀 분할 + 겹침
//! - Index: 인메모리 정확 코사인 검색, `Arc` 스냅샷 교체
//! - Retriever / Prompt / Stages: 질의 단계
//! - Pipeline: 수집과 질의 오케스트레이션

mod chunker;
mod document;
mod index;
mod pipeline;
mod prompt;
mod retriever;
mod stages;

// Re-exports
pub use chunker::{split, ChunkConfig, Chunker, RecursiveChunker, SEPARATORS};
pub use document::{fingerprint, Chunk, Document, SourceMetadata};
pub use index::{
    cosine_similarity, EmbeddingIndex, IndexHandle, RetrievalResult, ScoredChunk,
};
pub use pipeline::{
    AnswerPipeline, IndexStats, IngestOutcome, IngestReport, SourceReport, QUERY_STAGES,
};
pub use prompt::{
    PromptAssembler, PromptBuilder, PromptContext, SourceRef, CONTEXT_DELIMITER,
    GROUNDING_INSTRUCTION,
};
pub use retriever::Retriever;
pub use stages::{
    Answer, AnswerParser, AssembleStage, GenerateStage, Generated, ParseStage, Query,
    RetrieveStage, Retrieved, Stage,
};
