//! 질의 단계 (Stage)
//!
//! 질문 하나는 검색 -> 프롬프트 조립 -> 생성 -> 파싱 순서로 흐릅니다.
//! 각 단계는 `transform(input) -> output` 하나만 구현하고,
//! 조합은 `AnswerPipeline`이 명시적으로 합니다.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::{ProviderError, RagError, Result};
use crate::generation::Generator;
use crate::retry::RetryPolicy;

use super::index::RetrievalResult;
use super::prompt::{PromptAssembler, PromptContext, SourceRef};
use super::retriever::Retriever;

// ============================================================================
// Stage Trait
// ============================================================================

/// 파이프라인 한 단계
#[async_trait]
pub trait Stage: Send + Sync {
    type Input: Send;
    type Output: Send;

    /// 단계 이름 (로그용)
    fn name(&self) -> &'static str;

    async fn transform(&self, input: Self::Input) -> Result<Self::Output>;
}

// ============================================================================
// Stage Payloads
// ============================================================================

/// 질의
#[derive(Debug, Clone)]
pub struct Query {
    pub question: String,
    pub k: usize,
    pub max_context_chars: usize,
}

/// 검색 단계 출력
#[derive(Debug, Clone)]
pub struct Retrieved {
    pub query: Query,
    pub result: RetrievalResult,
}

/// 생성 단계 출력
#[derive(Debug, Clone)]
pub struct Generated {
    pub prompt: PromptContext,
    pub raw: String,
}

/// 최종 답변
#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    pub text: String,
    /// 컨텍스트가 하나 이상 포함된 프롬프트로 생성되었는지
    pub grounded: bool,
    /// 프롬프트에 들어간 청크 (순위순)
    pub sources: Vec<SourceRef>,
    /// 컨텍스트 예산 때문에 청크가 빠졌는지
    pub truncated: bool,
}

// ============================================================================
// Retrieve
// ============================================================================

pub struct RetrieveStage {
    retriever: Retriever,
}

impl RetrieveStage {
    pub fn new(retriever: Retriever) -> Self {
        Self { retriever }
    }
}

#[async_trait]
impl Stage for RetrieveStage {
    type Input = Query;
    type Output = Retrieved;

    fn name(&self) -> &'static str {
        "retrieve"
    }

    async fn transform(&self, query: Query) -> Result<Retrieved> {
        let result = self.retriever.retrieve(&query.question, query.k).await?;
        Ok(Retrieved { query, result })
    }
}

// ============================================================================
// Assemble
// ============================================================================

pub struct AssembleStage {
    assembler: PromptAssembler,
}

impl AssembleStage {
    pub fn new(assembler: PromptAssembler) -> Self {
        Self { assembler }
    }
}

#[async_trait]
impl Stage for AssembleStage {
    type Input = Retrieved;
    type Output = PromptContext;

    fn name(&self) -> &'static str {
        "assemble"
    }

    async fn transform(&self, input: Retrieved) -> Result<PromptContext> {
        let prompt = self.assembler.assemble(
            &input.query.question,
            &input.result,
            input.query.max_context_chars,
        )?;

        if prompt.is_truncated() {
            tracing::debug!(
                "Context trimmed to {} of {} chunks",
                prompt.sources().len(),
                input.result.len()
            );
        }
        Ok(prompt)
    }
}

// ============================================================================
// Generate
// ============================================================================

pub struct GenerateStage {
    generator: Option<Arc<dyn Generator>>,
    retry: RetryPolicy,
}

impl GenerateStage {
    pub fn new(generator: Option<Arc<dyn Generator>>, retry: RetryPolicy) -> Self {
        Self { generator, retry }
    }

    pub fn is_configured(&self) -> bool {
        self.generator.is_some()
    }
}

#[async_trait]
impl Stage for GenerateStage {
    type Input = PromptContext;
    type Output = Generated;

    fn name(&self) -> &'static str {
        "generate"
    }

    async fn transform(&self, prompt: PromptContext) -> Result<Generated> {
        let generator = self
            .generator
            .as_ref()
            .ok_or_else(|| RagError::Config("no generator configured".into()))?;

        let prompt_ref = &prompt;
        let raw = self
            .retry
            .run("generation", move || generator.generate(prompt_ref))
            .await
            .map_err(generation_error)?;

        Ok(Generated { prompt, raw })
    }
}

fn generation_error(e: ProviderError) -> RagError {
    match e {
        ProviderError::Malformed(reason) => RagError::OutputParse(reason),
        other => RagError::Generation(other.to_string()),
    }
}

// ============================================================================
// Parse
// ============================================================================

/// 원시 생성 텍스트 -> 답변 텍스트
#[derive(Debug, Clone, Copy, Default)]
pub struct AnswerParser;

impl AnswerParser {
    /// 공백 제거 후 모델이 되풀이한 "Resposta:" 접두어를 떼어냄
    pub fn parse(&self, raw: &str) -> Result<String> {
        let text = raw.trim();
        let text = text.strip_prefix("Resposta:").unwrap_or(text).trim();

        if text.is_empty() {
            return Err(RagError::OutputParse("generator returned an empty answer".into()));
        }
        Ok(text.to_string())
    }
}

pub struct ParseStage {
    parser: AnswerParser,
}

impl ParseStage {
    pub fn new(parser: AnswerParser) -> Self {
        Self { parser }
    }
}

#[async_trait]
impl Stage for ParseStage {
    type Input = Generated;
    type Output = Answer;

    fn name(&self) -> &'static str {
        "parse"
    }

    async fn transform(&self, input: Generated) -> Result<Answer> {
        let text = self.parser.parse(&input.raw)?;
        Ok(Answer {
            text,
            grounded: input.prompt.has_context(),
            sources: input.prompt.sources().to_vec(),
            truncated: input.prompt.is_truncated(),
        })
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    struct ScriptedGenerator {
        failures: u32,
        error: ProviderError,
        reply: &'static str,
        calls: AtomicU32,
    }

    #[async_trait]
    impl Generator for ScriptedGenerator {
        async fn generate(
            &self,
            _prompt: &PromptContext,
        ) -> std::result::Result<String, ProviderError> {
            if self.calls.fetch_add(1, Ordering::SeqCst) < self.failures {
                return Err(self.error.clone());
            }
            Ok(self.reply.to_string())
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }

    fn generator(failures: u32, error: ProviderError) -> Arc<ScriptedGenerator> {
        Arc::new(ScriptedGenerator {
            failures,
            error,
            reply: "Resposta: Não pode ser instanciada.",
            calls: AtomicU32::new(0),
        })
    }

    fn prompt() -> PromptContext {
        PromptAssembler::default()
            .assemble("O que é?", &RetrievalResult::default(), 100)
            .expect("prompt")
    }

    fn fast_retry() -> RetryPolicy {
        RetryPolicy {
            max_retries: 2,
            initial_backoff_ms: 1,
            max_backoff_ms: 1,
        }
    }

    #[test]
    fn test_parser() {
        let parser = AnswerParser;
        assert_eq!(parser.parse("  Resposta:  Sim.\n").expect("parse"), "Sim.");
        assert_eq!(parser.parse("Sim.").expect("parse"), "Sim.");
        assert!(matches!(parser.parse("  \n"), Err(RagError::OutputParse(_))));
        assert!(matches!(parser.parse("Resposta:"), Err(RagError::OutputParse(_))));
    }

    #[tokio::test]
    async fn test_generate_retries_transient() {
        let scripted = generator(2, ProviderError::Transient("429".into()));
        let stage = GenerateStage::new(Some(scripted.clone()), fast_retry());

        let generated = stage.transform(prompt()).await.expect("generate");
        assert_eq!(generated.raw, "Resposta: Não pode ser instanciada.");
        assert_eq!(scripted.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_generate_error_mapping() {
        let stage = GenerateStage::new(
            Some(generator(10, ProviderError::Transient("503".into()))),
            fast_retry(),
        );
        let err = stage.transform(prompt()).await.unwrap_err();
        assert!(matches!(err, RagError::Generation(_)));

        let stage = GenerateStage::new(
            Some(generator(1, ProviderError::Malformed("no content".into()))),
            fast_retry(),
        );
        let err = stage.transform(prompt()).await.unwrap_err();
        assert!(matches!(err, RagError::OutputParse(_)));
    }

    #[tokio::test]
    async fn test_missing_generator() {
        let stage = GenerateStage::new(None, fast_retry());
        assert!(!stage.is_configured());
        let err = stage.transform(prompt()).await.unwrap_err();
        assert!(matches!(err, RagError::Config(_)));
    }

    #[tokio::test]
    async fn test_parse_stage_carries_sources() {
        let generated = Generated {
            prompt: prompt(),
            raw: "Resposta: ok".into(),
        };
        let answer = ParseStage::new(AnswerParser)
            .transform(generated)
            .await
            .expect("answer");
        assert_eq!(answer.text, "ok");
        assert!(!answer.grounded);
        assert!(answer.sources.is_empty());
    }
}
