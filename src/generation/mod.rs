//! 생성 모듈 - LLM 응답 생성 capability
//!
//! 조립된 `PromptContext`를 받아 원시 텍스트를 돌려줍니다.
//! 기본 구현은 Groq (OpenAI 호환 chat completions) 입니다.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ProviderError;
use crate::knowledge::PromptContext;

// ============================================================================
// Generator Trait
// ============================================================================

/// 생성 capability 트레이트
#[async_trait]
pub trait Generator: Send + Sync {
    /// 프롬프트로 원시 텍스트 생성
    async fn generate(&self, prompt: &PromptContext) -> Result<String, ProviderError>;

    /// 모델 식별자
    fn name(&self) -> &str;
}

// ============================================================================
// Groq
// ============================================================================

/// Groq chat completions 엔드포인트
const GROQ_CHAT_URL: &str = "https://api.groq.com/openai/v1/chat/completions";

/// 기본 모델
pub const DEFAULT_MODEL: &str = "llama-3.3-70b-versatile";

/// 생성 설정
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationSettings {
    pub model: String,
    pub temperature: f32,
    /// 응답 최대 토큰 (None이면 서버 기본값)
    pub max_tokens: Option<u32>,
    /// 요청 타임아웃 (초)
    pub timeout_secs: u64,
    /// OpenAI 호환 엔드포인트 (테스트/프록시용)
    pub endpoint: String,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            temperature: 0.5,
            max_tokens: None,
            timeout_secs: 60,
            endpoint: GROQ_CHAT_URL.to_string(),
        }
    }
}

/// Groq 생성기
#[derive(Debug, Clone)]
pub struct GroqGenerator {
    api_key: String,
    settings: GenerationSettings,
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

impl GroqGenerator {
    pub fn new(api_key: String, settings: GenerationSettings) -> Result<Self> {
        if api_key.is_empty() {
            anyhow::bail!("Groq API key cannot be empty");
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            api_key,
            settings,
            client,
        })
    }

    /// `GROQ_API_KEY` 환경변수에서 생성
    pub fn from_env(settings: GenerationSettings) -> Result<Self> {
        let api_key = get_api_key()?;
        Self::new(api_key, settings)
    }
}

#[async_trait]
impl Generator for GroqGenerator {
    async fn generate(&self, prompt: &PromptContext) -> Result<String, ProviderError> {
        let user = prompt.user_message();
        let request = ChatRequest {
            model: &self.settings.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: prompt.instruction(),
                },
                ChatMessage {
                    role: "user",
                    content: &user,
                },
            ],
            temperature: self.settings.temperature,
            max_tokens: self.settings.max_tokens,
        };

        tracing::debug!(
            "Sending prompt to {} ({} context chars)",
            self.settings.model,
            prompt.context().chars().count()
        );

        let response = self
            .client
            .post(&self.settings.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(ProviderError::from_status(status, &body));
        }

        let parsed: ChatResponse = serde_json::from_str(&body)
            .map_err(|e| ProviderError::Malformed(format!("chat response: {}", e)))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| ProviderError::Malformed("response has no message content".into()))
    }

    fn name(&self) -> &str {
        &self.settings.model
    }
}

/// `GROQ_API_KEY` 로드
pub fn get_api_key() -> Result<String> {
    match std::env::var("GROQ_API_KEY") {
        Ok(key) if !key.is_empty() => Ok(key),
        _ => anyhow::bail!(
            "GROQ_API_KEY not set.\n\
             Set: export GROQ_API_KEY=your-api-key\n\
             Get your API key at: https://console.groq.com/keys"
        ),
    }
}

/// API 키 존재 여부 확인
pub fn has_api_key() -> bool {
    get_api_key().is_ok()
}

// ============================================================================
// Tests
// ============================================================================
