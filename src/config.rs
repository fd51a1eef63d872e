//! 설정 - 한 번 만들어 참조로 넘기는 RAG 설정 객체
//!
//! 우선순위: 기본값 < `RAG_*` 환경변수 < CLI 플래그

use serde::{Deserialize, Serialize};

use crate::embedding::{EmbeddingBackend, DEFAULT_DIMENSION};
use crate::error::{RagError, Result};
use crate::generation::GenerationSettings;
use crate::knowledge::{ChunkConfig, GROUNDING_INSTRUCTION};
use crate::retry::RetryPolicy;

/// 임베딩 설정
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    pub backend: EmbeddingBackend,
    pub dimension: usize,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            backend: EmbeddingBackend::Auto,
            dimension: DEFAULT_DIMENSION,
        }
    }
}

/// RAG 전체 설정
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RagConfig {
    pub chunk: ChunkConfig,
    /// 검색할 청크 수
    pub top_k: usize,
    /// 프롬프트 컨텍스트 최대 문자 수
    pub max_context_chars: usize,
    /// 임베딩 요청당 청크 수
    pub embed_batch_size: usize,
    /// 동시 임베딩 배치 수
    pub embed_concurrency: usize,
    pub retry: RetryPolicy,
    /// 근거 제한 지시문
    pub instruction: String,
    pub embedding: EmbeddingSettings,
    pub generation: GenerationSettings,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            chunk: ChunkConfig::default(),
            top_k: 2,
            max_context_chars: 4000,
            embed_batch_size: 16,
            embed_concurrency: 4,
            retry: RetryPolicy::default(),
            instruction: GROUNDING_INSTRUCTION.to_string(),
            embedding: EmbeddingSettings::default(),
            generation: GenerationSettings::default(),
        }
    }
}

impl RagConfig {
    /// 기본값 + `RAG_*` 환경변수
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.overlay(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// 키 조회 함수로 값을 덮어씀
    ///
    /// | 키 | 필드 |
    /// |----|------|
    /// | `RAG_CHUNK_SIZE` | chunk.chunk_size |
    /// | `RAG_CHUNK_OVERLAP` | chunk.overlap |
    /// | `RAG_TOP_K` | top_k |
    /// | `RAG_MAX_CONTEXT_CHARS` | max_context_chars |
    /// | `RAG_EMBED_BATCH_SIZE` | embed_batch_size |
    /// | `RAG_EMBED_CONCURRENCY` | embed_concurrency |
    /// | `RAG_MAX_RETRIES` | retry.max_retries |
    /// | `RAG_INSTRUCTION` | instruction |
    /// | `RAG_EMBEDDING_BACKEND` | embedding.backend |
    /// | `RAG_EMBEDDING_DIMENSION` | embedding.dimension |
    /// | `RAG_MODEL` | generation.model |
    /// | `RAG_TEMPERATURE` | generation.temperature |
    pub fn overlay<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = lookup("RAG_CHUNK_SIZE") {
            self.chunk.chunk_size = parse("RAG_CHUNK_SIZE", &v)?;
        }
        if let Some(v) = lookup("RAG_CHUNK_OVERLAP") {
            self.chunk.overlap = parse("RAG_CHUNK_OVERLAP", &v)?;
        }
        if let Some(v) = lookup("RAG_TOP_K") {
            self.top_k = parse("RAG_TOP_K", &v)?;
        }
        if let Some(v) = lookup("RAG_MAX_CONTEXT_CHARS") {
            self.max_context_chars = parse("RAG_MAX_CONTEXT_CHARS", &v)?;
        }
        if let Some(v) = lookup("RAG_EMBED_BATCH_SIZE") {
            self.embed_batch_size = parse("RAG_EMBED_BATCH_SIZE", &v)?;
        }
        if let Some(v) = lookup("RAG_EMBED_CONCURRENCY") {
            self.embed_concurrency = parse("RAG_EMBED_CONCURRENCY", &v)?;
        }
        if let Some(v) = lookup("RAG_MAX_RETRIES") {
            self.retry.max_retries = parse("RAG_MAX_RETRIES", &v)?;
        }
        if let Some(v) = lookup("RAG_INSTRUCTION") {
            self.instruction = v;
        }
        if let Some(v) = lookup("RAG_EMBEDDING_BACKEND") {
            self.embedding.backend = v
                .parse()
                .map_err(|e: anyhow::Error| RagError::Config(e.to_string()))?;
        }
        if let Some(v) = lookup("RAG_EMBEDDING_DIMENSION") {
            self.embedding.dimension = parse("RAG_EMBEDDING_DIMENSION", &v)?;
        }
        if let Some(v) = lookup("RAG_MODEL") {
            self.generation.model = v;
        }
        if let Some(v) = lookup("RAG_TEMPERATURE") {
            self.generation.temperature = parse("RAG_TEMPERATURE", &v)?;
        }

        Ok(())
    }

    /// 모든 설정 불변식 검사
    pub fn validate(&self) -> Result<()> {
        self.chunk.validate()?;

        if self.top_k == 0 {
            return Err(RagError::Config("top_k must be at least 1".into()));
        }
        if self.max_context_chars == 0 {
            return Err(RagError::Config("max_context_chars must be positive".into()));
        }
        if self.embed_batch_size == 0 || self.embed_concurrency == 0 {
            return Err(RagError::Config(
                "embed_batch_size and embed_concurrency must be positive".into(),
            ));
        }
        if self.instruction.trim().is_empty() {
            return Err(RagError::Config("instruction must not be empty".into()));
        }
        if self.embedding.dimension == 0 {
            return Err(RagError::Config("embedding dimension must be positive".into()));
        }
        if !(0.0..=2.0).contains(&self.generation.temperature) {
            return Err(RagError::Config(format!(
                "temperature {} out of range [0, 2]",
                self.generation.temperature
            )));
        }

        Ok(())
    }
}

fn parse<T>(key: &str, value: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| RagError::Config(format!("{}={}: {}", key, value, e)))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = RagConfig::default();
        assert_eq!(config.chunk.chunk_size, 1000);
        assert_eq!(config.chunk.overlap, 100);
        assert_eq!(config.top_k, 2);
        assert_eq!(config.max_context_chars, 4000);
        assert_eq!(config.generation.temperature, 0.5);
        assert_eq!(config.instruction, GROUNDING_INSTRUCTION);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_overlay() {
        let mut config = RagConfig::default();
        config
            .overlay(env(&[
                ("RAG_CHUNK_SIZE", "500"),
                ("RAG_CHUNK_OVERLAP", "50"),
                ("RAG_TOP_K", "4"),
                ("RAG_EMBEDDING_BACKEND", "hashing"),
                ("RAG_TEMPERATURE", "0.2"),
                ("RAG_MODEL", ""),
            ]))
            .expect("overlay");

        assert_eq!(config.chunk, ChunkConfig { chunk_size: 500, overlap: 50 });
        assert_eq!(config.top_k, 4);
        assert_eq!(config.embedding.backend, EmbeddingBackend::Hashing);
        assert_eq!(config.generation.temperature, 0.2);
        // 빈 값은 무시
        assert_eq!(config.generation.model, GenerationSettings::default().model);
    }

    #[test]
    fn test_overlay_invalid_number() {
        let mut config = RagConfig::default();
        let err = config.overlay(env(&[("RAG_TOP_K", "many")])).unwrap_err();
        assert!(matches!(err, RagError::Config(_)));
    }

    #[test]
    fn test_validate() {
        let config = RagConfig {
            chunk: ChunkConfig { chunk_size: 100, overlap: 100 },
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(RagError::Chunking(_))));

        let config = RagConfig {
            top_k: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(RagError::Config(_))));

        let config = RagConfig {
            instruction: " ".into(),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(RagError::Config(_))));
    }

    #[test]
    fn test_deserialize_partial() {
        let config: RagConfig =
            serde_json::from_str(r#"{"top_k": 5, "chunk": {"chunk_size": 300}}"#)
                .expect("json");
        assert_eq!(config.top_k, 5);
        assert_eq!(config.chunk.chunk_size, 300);
        assert_eq!(config.chunk.overlap, 100);
        assert_eq!(config.max_context_chars, 4000);
    }
}
