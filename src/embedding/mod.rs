//! 임베딩 모듈 - 텍스트 벡터화 capability
//!
//! 텍스트를 고정 차원 벡터로 변환하는 프로바이더들입니다.
//! - `GeminiEmbedding`: Gemini API (HTTP, 클라이언트 측 rate limit)
//! - `HashingEmbedding`: 오프라인 어휘 해싱 (API 키 불필요, 결정적)
//!
//! 프로바이더는 한 번만 호출하고 실패를 분류해 돌려줍니다.
//! 재시도는 호출하는 쪽의 `RetryPolicy`가 담당합니다.
//!
//! ## 사용법
//! ```rust,ignore
//! let embedder = GeminiEmbedding::from_env()?;
//! let embedding = embedder.embed("Hello, world!").await?;
//! ```

mod hashing;

pub use hashing::HashingEmbedding;

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::error::ProviderError;

// ============================================================================
// EmbeddingProvider Trait
// ============================================================================

/// 임베딩 프로바이더 트레이트
///
/// 텍스트를 벡터로 변환하는 인터페이스입니다.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// 단일 텍스트 임베딩
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError>;

    /// 질의 임베딩 (기본 구현: 문서와 동일)
    ///
    /// 질의와 문서를 다르게 인코딩하는 모델은 이 메서드를 재정의합니다.
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        self.embed(text).await
    }

    /// 배치 임베딩 (기본 구현: 순차 호출)
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text).await?);
        }
        Ok(results)
    }

    /// `embed_batch`가 배치 전체를 한 번의 요청으로 보내는지 여부
    ///
    /// `false`면 호출하는 쪽은 텍스트마다 `embed`를 재시도 단위로 삼습니다.
    fn supports_batch_requests(&self) -> bool {
        false
    }

    /// 임베딩 차원 수
    fn dimension(&self) -> usize;

    /// 모델 식별자
    fn name(&self) -> &str;
}

// ============================================================================
// Google Gemini Embedding
// ============================================================================

/// Gemini 임베딩 API 엔드포인트 (gemini-embedding-001 - MRL 지원)
/// source: https://ai.google.dev/gemini-api/docs/embeddings
const GEMINI_EMBED_URL: &str =
    "https://generativelanguage.googleapis.com/v1beta/models/gemini-embedding-001:embedContent";
const GEMINI_BATCH_EMBED_URL: &str =
    "https://generativelanguage.googleapis.com/v1beta/models/gemini-embedding-001:batchEmbedContents";
const GEMINI_MODEL: &str = "models/gemini-embedding-001";

/// batchEmbedContents 한 요청당 최대 텍스트 수
const GEMINI_MAX_BATCH: usize = 100;

/// 기본 임베딩 차원
pub const DEFAULT_DIMENSION: usize = 768;

/// Rate Limiter 설정 (Gemini 무료 티어: 60 RPM)
const RATE_LIMIT_RPM: u32 = 60;
const RATE_LIMIT_WINDOW: Duration = Duration::from_secs(60);
/// 호출 간 최소 딜레이 (1000ms = 60 RPM 준수)
const MIN_DELAY_MS: u64 = 1000;

/// Google Gemini 임베딩 구현체
#[derive(Debug)]
pub struct GeminiEmbedding {
    api_key: String,
    client: reqwest::Client,
    dimension: usize,
    rate_limiter: Arc<Mutex<RateLimiter>>,
}

/// Rate Limiter with minimum delay between requests
#[derive(Debug)]
struct RateLimiter {
    requests: Vec<Instant>,
    max_requests: u32,
    window: Duration,
    min_delay: Duration,
    last_request: Option<Instant>,
}

impl RateLimiter {
    fn new(max_requests: u32, window: Duration, min_delay: Duration) -> Self {
        Self {
            requests: Vec::new(),
            max_requests,
            window,
            min_delay,
            last_request: None,
        }
    }

    /// 요청 가능할 때까지 대기 후 요청 기록
    async fn acquire(&mut self) {
        // 1. 최소 딜레이 (버스트 방지)
        if let Some(last) = self.last_request {
            let elapsed = last.elapsed();
            if elapsed < self.min_delay {
                let wait_time = self.min_delay - elapsed;
                tracing::debug!("Min delay: waiting {:?}", wait_time);
                tokio::time::sleep(wait_time).await;
            }
        }

        let now = Instant::now();

        // 2. 윈도우 밖의 오래된 요청 제거
        self.requests.retain(|&t| now.duration_since(t) < self.window);

        // 3. Rate limit 초과 시 대기
        if self.requests.len() >= self.max_requests as usize {
            if let Some(&oldest) = self.requests.first() {
                let wait_time = self.window.saturating_sub(now.duration_since(oldest));
                if !wait_time.is_zero() {
                    tracing::debug!("Rate limit reached, waiting {:?}", wait_time);
                    tokio::time::sleep(wait_time).await;
                }
                let now = Instant::now();
                self.requests.retain(|&t| now.duration_since(t) < self.window);
            }
        }

        // 4. 현재 요청 기록
        let now = Instant::now();
        self.requests.push(now);
        self.last_request = Some(now);
    }
}

impl GeminiEmbedding {
    /// 새 Gemini 임베딩 인스턴스 생성
    ///
    /// # Arguments
    /// * `api_key` - Google AI API 키
    pub fn new(api_key: String) -> Result<Self> {
        Self::with_dimension(api_key, DEFAULT_DIMENSION)
    }

    /// 차원을 지정하여 생성
    ///
    /// # Arguments
    /// * `api_key` - Google AI API 키
    /// * `dimension` - 임베딩 차원 (768, 1536, 3072 중 선택)
    pub fn with_dimension(api_key: String, dimension: usize) -> Result<Self> {
        if ![768, 1536, 3072].contains(&dimension) {
            anyhow::bail!(
                "Invalid dimension: {}. Must be 768, 1536, or 3072",
                dimension
            );
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        let rate_limiter = Arc::new(Mutex::new(RateLimiter::new(
            RATE_LIMIT_RPM,
            RATE_LIMIT_WINDOW,
            Duration::from_millis(MIN_DELAY_MS),
        )));

        Ok(Self {
            api_key,
            client,
            dimension,
            rate_limiter,
        })
    }

    /// 환경변수에서 API 키를 읽어 생성
    ///
    /// 우선순위: GEMINI_API_KEY > GOOGLE_AI_API_KEY
    pub fn from_env() -> Result<Self> {
        Self::from_env_with_dimension(DEFAULT_DIMENSION)
    }

    /// 환경변수에서 API 키를 읽어 차원 지정하여 생성
    pub fn from_env_with_dimension(dimension: usize) -> Result<Self> {
        let api_key = get_api_key()?;
        Self::with_dimension(api_key, dimension)
    }
}

/// 임베딩 용도 (Gemini taskType)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EmbedTask {
    Document,
    Query,
}

impl EmbedTask {
    fn as_str(self) -> &'static str {
        match self {
            EmbedTask::Document => "RETRIEVAL_DOCUMENT",
            EmbedTask::Query => "RETRIEVAL_QUERY",
        }
    }
}

/// Gemini API 요청 본문
/// source: https://ai.google.dev/gemini-api/docs/embeddings
#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'static str,
    content: EmbedContent<'a>,
    #[serde(rename = "taskType")]
    task_type: &'static str,
    #[serde(rename = "outputDimensionality")]
    output_dimensionality: usize,
}

impl<'a> EmbedRequest<'a> {
    fn new(text: &'a str, task: EmbedTask, dimension: usize) -> Self {
        Self {
            model: GEMINI_MODEL,
            content: EmbedContent {
                parts: vec![EmbedPart { text }],
            },
            task_type: task.as_str(),
            output_dimensionality: dimension,
        }
    }
}

/// batchEmbedContents 요청 본문
#[derive(Debug, Serialize)]
struct BatchEmbedRequest<'a> {
    requests: Vec<EmbedRequest<'a>>,
}

#[derive(Debug, Serialize)]
struct EmbedContent<'a> {
    parts: Vec<EmbedPart<'a>>,
}

#[derive(Debug, Serialize)]
struct EmbedPart<'a> {
    text: &'a str,
}

/// Gemini API 응답
#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embedding: EmbeddingValues,
}

/// batchEmbedContents 응답 (요청 순서 유지)
#[derive(Debug, Deserialize)]
struct BatchEmbedResponse {
    #[serde(default)]
    embeddings: Vec<EmbeddingValues>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingValues {
    values: Vec<f32>,
}

/// 벡터 차원 확인
fn check_dimension(values: Vec<f32>, dimension: usize) -> Result<Vec<f32>, ProviderError> {
    if values.len() != dimension {
        return Err(ProviderError::Malformed(format!(
            "expected {} values, got {}",
            dimension,
            values.len()
        )));
    }
    Ok(values)
}

/// batchEmbedContents 응답 파싱 (개수와 차원 확인)
fn parse_batch_response(
    body: &str,
    expected: usize,
    dimension: usize,
) -> Result<Vec<Vec<f32>>, ProviderError> {
    let parsed: BatchEmbedResponse = serde_json::from_str(body)
        .map_err(|e| ProviderError::Malformed(format!("batch embedding response: {}", e)))?;

    if parsed.embeddings.len() != expected {
        return Err(ProviderError::Malformed(format!(
            "requested {} embeddings, got {}",
            expected,
            parsed.embeddings.len()
        )));
    }

    parsed
        .embeddings
        .into_iter()
        .map(|e| check_dimension(e.values, dimension))
        .collect()
}

/// Gemini API 에러 응답
#[derive(Debug, Deserialize)]
struct GeminiError {
    error: GeminiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorDetail {
    message: String,
    #[serde(default)]
    status: String,
}

impl GeminiEmbedding {
    /// 요청 한 건 전송 (rate limit 적용, 실패 분류)
    async fn post<B: Serialize + Sync>(
        &self,
        url: &str,
        body: &B,
    ) -> Result<String, ProviderError> {
        {
            let mut limiter = self.rate_limiter.lock().await;
            limiter.acquire().await;
        }

        // API 키는 URL이 아닌 헤더로 전송
        let response = self
            .client
            .post(url)
            .header("x-goog-api-key", &self.api_key)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            if let Ok(error) = serde_json::from_str::<GeminiError>(&body) {
                let detail = format!("{} ({})", error.error.message, error.error.status);
                return Err(ProviderError::from_status(status, &detail));
            }
            return Err(ProviderError::from_status(status, &body));
        }

        Ok(body)
    }

    async fn embed_with_task(
        &self,
        text: &str,
        task: EmbedTask,
    ) -> Result<Vec<f32>, ProviderError> {
        if text.trim().is_empty() {
            return Err(ProviderError::Rejected("cannot embed empty text".into()));
        }

        let request = EmbedRequest::new(text, task, self.dimension);
        let body = self.post(GEMINI_EMBED_URL, &request).await?;

        let parsed: EmbedResponse = serde_json::from_str(&body)
            .map_err(|e| ProviderError::Malformed(format!("embedding response: {}", e)))?;

        check_dimension(parsed.embedding.values, self.dimension)
    }
}

#[async_trait]
impl EmbeddingProvider for GeminiEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        self.embed_with_task(text, EmbedTask::Document).await
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        self.embed_with_task(text, EmbedTask::Query).await
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        if texts.iter().any(|t| t.trim().is_empty()) {
            return Err(ProviderError::Rejected("cannot embed empty text".into()));
        }

        let mut results = Vec::with_capacity(texts.len());
        for group in texts.chunks(GEMINI_MAX_BATCH) {
            let request = BatchEmbedRequest {
                requests: group
                    .iter()
                    .map(|text| EmbedRequest::new(text, EmbedTask::Document, self.dimension))
                    .collect(),
            };
            let body = self.post(GEMINI_BATCH_EMBED_URL, &request).await?;
            results.extend(parse_batch_response(&body, group.len(), self.dimension)?);
            tracing::debug!("Embedded {}/{} texts", results.len(), texts.len());
        }
        Ok(results)
    }

    fn supports_batch_requests(&self) -> bool {
        true
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        "gemini-embedding-001"
    }
}

// ============================================================================
// API Key Management
// ============================================================================

/// API 키 로드 (환경변수에서)
///
/// 우선순위:
/// 1. `GEMINI_API_KEY` 환경변수
/// 2. `GOOGLE_AI_API_KEY` 환경변수
pub fn get_api_key() -> Result<String> {
    for var in ["GEMINI_API_KEY", "GOOGLE_AI_API_KEY"] {
        if let Ok(key) = std::env::var(var) {
            if !key.is_empty() {
                tracing::debug!("Using API key from {}", var);
                return Ok(key);
            }
        }
    }

    anyhow::bail!(
        "API key not found. Set GEMINI_API_KEY or GOOGLE_AI_API_KEY environment variable.\n\
         Get your API key at: https://aistudio.google.com/app/apikey"
    )
}

/// API 키 존재 여부 확인
pub fn has_api_key() -> bool {
    get_api_key().is_ok()
}

// ============================================================================
// Factory Function
// ============================================================================

/// 임베딩 백엔드 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingBackend {
    /// API 키가 있으면 Gemini, 없으면 해싱
    Auto,
    Gemini,
    Hashing,
}

impl std::str::FromStr for EmbeddingBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "gemini" => Ok(Self::Gemini),
            "hashing" | "hash" | "local" => Ok(Self::Hashing),
            other => anyhow::bail!("Unknown embedding backend: {}", other),
        }
    }
}

/// 설정에 맞는 임베딩 프로바이더 생성
pub fn create_embedder(
    backend: EmbeddingBackend,
    dimension: usize,
) -> Result<Arc<dyn EmbeddingProvider>> {
    let use_gemini = match backend {
        EmbeddingBackend::Gemini => true,
        EmbeddingBackend::Hashing => false,
        EmbeddingBackend::Auto => has_api_key(),
    };

    if use_gemini {
        let embedder = GeminiEmbedding::from_env_with_dimension(dimension)?;
        tracing::info!("Using Gemini API embedding (dimension: {})", dimension);
        Ok(Arc::new(embedder))
    } else {
        let embedder = HashingEmbedding::new(dimension)?;
        tracing::info!("Using local hashing embedding (dimension: {})", dimension);
        Ok(Arc::new(embedder))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_dimension() {
        let result = GeminiEmbedding::with_dimension("fake_key".to_string(), 999);
        assert!(result
            .err()
            .map(|e| e.to_string().contains("Invalid dimension"))
            .unwrap_or(false));
    }

    #[test]
    fn test_valid_dimensions() {
        for dim in [768, 1536, 3072] {
            let result = GeminiEmbedding::with_dimension("fake_key".to_string(), dim);
            assert!(result.is_ok());
        }
    }

    #[tokio::test]
    async fn test_gemini_rejects_empty_text() {
        let embedder = GeminiEmbedding::with_dimension("fake_key".to_string(), 768)
            .expect("valid dimension");
        let result = embedder.embed("   ").await;
        assert!(matches!(result, Err(ProviderError::Rejected(_))));
    }

    #[test]
    fn test_backend_from_str() {
        assert_eq!("auto".parse::<EmbeddingBackend>().ok(), Some(EmbeddingBackend::Auto));
        assert_eq!("Gemini".parse::<EmbeddingBackend>().ok(), Some(EmbeddingBackend::Gemini));
        assert_eq!("local".parse::<EmbeddingBackend>().ok(), Some(EmbeddingBackend::Hashing));
        assert!("onnx".parse::<EmbeddingBackend>().is_err());
    }

    #[test]
    fn test_create_hashing_embedder() {
        let embedder = create_embedder(EmbeddingBackend::Hashing, 256).expect("hashing");
        assert_eq!(embedder.dimension(), 256);
        assert_eq!(embedder.name(), "hashing-v1");
    }

    #[test]
    fn test_query_and_document_task_types() {
        let query = serde_json::to_value(EmbedRequest::new("질문", EmbedTask::Query, 768))
            .expect("serialize");
        assert_eq!(query["taskType"], "RETRIEVAL_QUERY");
        assert_eq!(query["outputDimensionality"], 768);
        assert_eq!(query["content"]["parts"][0]["text"], "질문");

        let doc = serde_json::to_value(EmbedRequest::new("본문", EmbedTask::Document, 768))
            .expect("serialize");
        assert_eq!(doc["taskType"], "RETRIEVAL_DOCUMENT");
    }

    #[test]
    fn test_batch_request_shape() {
        let texts = ["a".to_string(), "b".to_string()];
        let request = BatchEmbedRequest {
            requests: texts
                .iter()
                .map(|t| EmbedRequest::new(t, EmbedTask::Document, 768))
                .collect(),
        };
        let json = serde_json::to_value(&request).expect("serialize");
        assert_eq!(json["requests"].as_array().map(|r| r.len()), Some(2));
        assert_eq!(json["requests"][1]["model"], GEMINI_MODEL);
        assert_eq!(json["requests"][1]["content"]["parts"][0]["text"], "b");
    }

    #[test]
    fn test_parse_batch_response() {
        let body = r#"{"embeddings":[{"values":[0.1,0.2]},{"values":[0.3,0.4]}]}"#;
        let vectors = parse_batch_response(body, 2, 2).expect("parse");
        assert_eq!(vectors, vec![vec![0.1, 0.2], vec![0.3, 0.4]]);

        // 개수 불일치
        let short = r#"{"embeddings":[{"values":[0.1,0.2]}]}"#;
        assert!(matches!(
            parse_batch_response(short, 2, 2),
            Err(ProviderError::Malformed(_))
        ));

        // 차원 불일치
        assert!(matches!(
            parse_batch_response(body, 2, 3),
            Err(ProviderError::Malformed(_))
        ));
    }

    #[tokio::test]
    async fn test_gemini_batch_rejects_empty_text() {
        let embedder = GeminiEmbedding::with_dimension("fake_key".to_string(), 768)
            .expect("valid dimension");
        let texts = vec!["ok".to_string(), " ".to_string()];
        let result = embedder.embed_batch(&texts).await;
        assert!(matches!(result, Err(ProviderError::Rejected(_))));
        assert!(embedder.supports_batch_requests());
    }

    #[tokio::test]
    async fn test_rate_limiter_min_delay() {
        let mut limiter = RateLimiter::new(100, Duration::from_secs(60), Duration::from_millis(20));
        let start = Instant::now();
        limiter.acquire().await;
        limiter.acquire().await;
        assert!(start.elapsed() >= Duration::from_millis(20));
        assert_eq!(limiter.requests.len(), 2);
    }
}
