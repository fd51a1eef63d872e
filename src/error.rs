//! 에러 타입 - RAG 파이프라인 단계별 실패 분류
//!
//! 호출자가 재시도 / 재설정 / 중단 중 무엇을 할지 결정할 수 있도록
//! 실패 원인마다 별도의 variant를 둡니다.

use thiserror::Error;

/// 크레이트 공통 Result
pub type Result<T> = std::result::Result<T, RagError>;

// ============================================================================
// RagError
// ============================================================================

/// 파이프라인 에러
#[derive(Debug, Error)]
pub enum RagError {
    /// 소스 문서를 읽거나 파싱할 수 없음
    #[error("Failed to load document '{source_id}': {reason}")]
    DocumentLoad { source_id: String, reason: String },

    /// 잘못된 청킹 파라미터
    #[error("Invalid chunk parameters: {0}")]
    Chunking(String),

    /// 재시도 후에도 임베딩 실패
    #[error("Embedding failed: {0}")]
    Embedding(String),

    /// 빈 인덱스에 대한 검색
    #[error("Index is empty: ingest documents before querying")]
    IndexEmpty,

    /// 벡터 차원 불일치 (설정 오류, 치명적)
    #[error("Vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// 청크/벡터 배치 길이 불일치
    #[error("Invalid batch: {chunks} chunks but {vectors} vectors")]
    InvalidBatch { chunks: usize, vectors: usize },

    /// 그 밖의 검색 단계 실패
    #[error("Retrieval failed: {0}")]
    Retrieval(String),

    /// 프롬프트 필수 슬롯 누락
    #[error("Prompt slot '{0}' is missing or empty")]
    Prompt(&'static str),

    /// 생성 모델 실패 (rate limit 포함)
    #[error("Generation failed: {0}")]
    Generation(String),

    /// 생성 결과 파싱 실패
    #[error("Malformed generation output: {0}")]
    OutputParse(String),

    /// 설정값 오류
    #[error("Configuration error: {0}")]
    Config(String),
}

/// 에러 종류 (로깅/분기용)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    DocumentLoad,
    Chunking,
    Embedding,
    IndexEmpty,
    Configuration,
    Retrieval,
    Prompt,
    Generation,
    OutputParse,
}

impl RagError {
    /// 에러 종류
    pub fn kind(&self) -> ErrorKind {
        match self {
            RagError::DocumentLoad { .. } => ErrorKind::DocumentLoad,
            RagError::Chunking(_) => ErrorKind::Chunking,
            RagError::Embedding(_) => ErrorKind::Embedding,
            RagError::IndexEmpty => ErrorKind::IndexEmpty,
            RagError::DimensionMismatch { .. }
            | RagError::InvalidBatch { .. }
            | RagError::Config(_) => ErrorKind::Configuration,
            RagError::Retrieval(_) => ErrorKind::Retrieval,
            RagError::Prompt(_) => ErrorKind::Prompt,
            RagError::Generation(_) => ErrorKind::Generation,
            RagError::OutputParse(_) => ErrorKind::OutputParse,
        }
    }

    /// 나중에 같은 호출을 다시 시도할 의미가 있는지
    ///
    /// 외부 서비스 실패만 해당합니다. 내부 재시도는 이미 소진된 상태입니다.
    pub fn is_retryable(&self) -> bool {
        matches!(self, RagError::Embedding(_) | RagError::Generation(_))
    }

    pub(crate) fn document_load(source_id: impl Into<String>, reason: impl ToString) -> Self {
        RagError::DocumentLoad {
            source_id: source_id.into(),
            reason: reason.to_string(),
        }
    }
}

// ============================================================================
// ProviderError
// ============================================================================

/// 외부 capability (임베딩/생성) 호출 실패
///
/// 재시도 여부는 variant로 결정됩니다.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    /// 네트워크, 타임아웃, 429, 5xx
    #[error("transient failure: {0}")]
    Transient(String),

    /// 잘못된 입력 등 재시도해도 소용없는 실패
    #[error("request rejected: {0}")]
    Rejected(String),

    /// 응답 본문을 해석할 수 없음
    #[error("malformed response: {0}")]
    Malformed(String),
}

impl ProviderError {
    pub fn is_transient(&self) -> bool {
        matches!(self, ProviderError::Transient(_))
    }

    /// HTTP 상태 코드로 분류
    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        let message = format!("HTTP {}: {}", status, body);
        if status.as_u16() == 429 || status.is_server_error() {
            ProviderError::Transient(message)
        } else {
            ProviderError::Rejected(message)
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() || e.is_connect() || e.is_request() {
            ProviderError::Transient(e.to_string())
        } else if e.is_decode() {
            ProviderError::Malformed(e.to_string())
        } else {
            ProviderError::Transient(e.to_string())
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds_are_distinct() {
        assert_eq!(RagError::IndexEmpty.kind(), ErrorKind::IndexEmpty);
        assert_eq!(
            RagError::DimensionMismatch { expected: 3, actual: 4 }.kind(),
            ErrorKind::Configuration
        );
        assert_eq!(
            RagError::Chunking("bad".into()).kind(),
            ErrorKind::Chunking
        );
        assert_ne!(
            RagError::Generation("x".into()).kind(),
            RagError::OutputParse("x".into()).kind()
        );
    }

    #[test]
    fn test_retryable() {
        assert!(RagError::Embedding("timeout".into()).is_retryable());
        assert!(RagError::Generation("429".into()).is_retryable());
        assert!(!RagError::IndexEmpty.is_retryable());
        assert!(!RagError::Prompt("question").is_retryable());
    }

    #[test]
    fn test_status_classification() {
        let e = ProviderError::from_status(reqwest::StatusCode::TOO_MANY_REQUESTS, "slow down");
        assert!(e.is_transient());

        let e = ProviderError::from_status(reqwest::StatusCode::BAD_GATEWAY, "");
        assert!(e.is_transient());

        let e = ProviderError::from_status(reqwest::StatusCode::BAD_REQUEST, "bad input");
        assert!(!e.is_transient());
        assert!(e.to_string().contains("bad input"));
    }

    #[test]
    fn test_display_messages() {
        let e = RagError::document_load("java.pdf", "not found");
        assert!(e.to_string().contains("java.pdf"));
        assert!(e.to_string().contains("not found"));
    }
}
