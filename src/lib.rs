//! evidence-rag - 근거 기반 질의응답 RAG 시스템
//!
//! 문서를 청크로 나눠 임베딩하고, 질문과 가장 가까운 청크만으로
//! 프롬프트를 조립해 LLM 답변을 생성합니다.

pub mod cli;
pub mod collector;
pub mod config;
pub mod embedding;
pub mod error;
pub mod generation;
pub mod knowledge;
pub mod loader;
pub mod retry;

// Re-exports
pub use config::{EmbeddingSettings, RagConfig};
pub use embedding::{
    create_embedder, EmbeddingBackend, EmbeddingProvider, GeminiEmbedding, HashingEmbedding,
};
pub use error::{ErrorKind, ProviderError, RagError, Result};
pub use generation::{GenerationSettings, Generator, GroqGenerator};
pub use knowledge::{
    Answer, AnswerPipeline, Chunk, ChunkConfig, Document, EmbeddingIndex, IngestOutcome,
    IngestReport, PromptAssembler, PromptContext, RetrievalResult, Retriever,
};
pub use loader::{DocumentLoader, DocumentSource, LoaderRegistry};
pub use retry::RetryPolicy;
