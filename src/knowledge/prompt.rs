//! Prompt Assembler - 근거 제한 프롬프트 조립
//!
//! 프롬프트는 항상 (1) 근거 제한 지시문, (2) 질문, (3) 컨텍스트 순서입니다.
//! 컨텍스트 예산을 넘으면 순위가 낮은 청크부터 버리며,
//! 지시문과 질문은 절대 잘리지 않습니다.

use serde::Serialize;

use crate::error::{RagError, Result};

use super::index::RetrievalResult;

/// 기본 근거 제한 지시문
pub const GROUNDING_INSTRUCTION: &str = "Responda usando exclusivamente o conteúdo fornecido";

/// 컨텍스트 청크 구분자
pub const CONTEXT_DELIMITER: &str = "\n\n---\n\n";

// ============================================================================
// Types
// ============================================================================

/// 프롬프트에 들어간 청크 참조
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceRef {
    pub document_id: String,
    pub sequence: usize,
    pub page: Option<usize>,
    pub score: f32,
}

/// 조립 완료된 프롬프트
#[derive(Debug, Clone)]
pub struct PromptContext {
    instruction: String,
    question: String,
    context: String,
    sources: Vec<SourceRef>,
    truncated: bool,
}

impl PromptContext {
    pub fn instruction(&self) -> &str {
        &self.instruction
    }

    pub fn question(&self) -> &str {
        &self.question
    }

    pub fn context(&self) -> &str {
        &self.context
    }

    /// 컨텍스트에 포함된 청크 (순위순)
    pub fn sources(&self) -> &[SourceRef] {
        &self.sources
    }

    /// 예산 때문에 청크가 빠지거나 잘렸는지
    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    pub fn has_context(&self) -> bool {
        !self.context.is_empty()
    }

    /// 사용자 메시지 (질문 + 컨텍스트)
    pub fn user_message(&self) -> String {
        format!(
            "{}\n\nContexto: \n{}\n\nResposta:",
            self.question, self.context
        )
    }

    /// 단일 문자열 (지시문 + 사용자 메시지)
    pub fn render(&self) -> String {
        format!("{}\n\n{}", self.instruction, self.user_message())
    }
}

// ============================================================================
// PromptBuilder
// ============================================================================

/// 슬롯 검증 프롬프트 빌더
///
/// 빠진 슬롯이 있으면 `build()`가 `RagError::Prompt`로 실패합니다.
#[derive(Debug, Default)]
pub struct PromptBuilder<'a> {
    instruction: Option<&'a str>,
    question: Option<&'a str>,
    retrieval: Option<&'a RetrievalResult>,
    max_context_chars: Option<usize>,
}

impl<'a> PromptBuilder<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn instruction(mut self, instruction: &'a str) -> Self {
        self.instruction = Some(instruction);
        self
    }

    pub fn question(mut self, question: &'a str) -> Self {
        self.question = Some(question);
        self
    }

    pub fn retrieval(mut self, retrieval: &'a RetrievalResult) -> Self {
        self.retrieval = Some(retrieval);
        self
    }

    pub fn max_context_chars(mut self, max_context_chars: usize) -> Self {
        self.max_context_chars = Some(max_context_chars);
        self
    }

    pub fn build(self) -> Result<PromptContext> {
        let instruction = self
            .instruction
            .filter(|s| !s.trim().is_empty())
            .ok_or(RagError::Prompt("instruction"))?;
        let question = self
            .question
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or(RagError::Prompt("question"))?;
        let retrieval = self.retrieval.ok_or(RagError::Prompt("context"))?;
        let budget = self
            .max_context_chars
            .ok_or(RagError::Prompt("max_context_chars"))?;

        let (context, sources, truncated) = fit_context(retrieval, budget);

        Ok(PromptContext {
            instruction: instruction.to_string(),
            question: question.to_string(),
            context,
            sources,
            truncated,
        })
    }
}

/// 순위순으로 예산 안에 들어가는 만큼 청크를 이어 붙임
fn fit_context(retrieval: &RetrievalResult, budget: usize) -> (String, Vec<SourceRef>, bool) {
    let delimiter_len = CONTEXT_DELIMITER.chars().count();
    let mut context = String::new();
    let mut used = 0;
    let mut sources = Vec::new();
    let mut truncated = false;

    for hit in retrieval {
        let text = hit.chunk.text.as_str();
        let separator = if sources.is_empty() { 0 } else { delimiter_len };
        let len = text.chars().count();

        let piece = if used + separator + len <= budget {
            text
        } else if sources.is_empty() && budget > 0 {
            // 최상위 청크 하나도 안 들어가면 문자 경계에서 자름
            truncated = true;
            take_chars(text, budget)
        } else {
            truncated = true;
            break;
        };

        if separator > 0 {
            context.push_str(CONTEXT_DELIMITER);
        }
        context.push_str(piece);
        used += separator + piece.chars().count();
        sources.push(SourceRef {
            document_id: hit.chunk.document_id.clone(),
            sequence: hit.chunk.sequence,
            page: hit.chunk.source.page,
            score: hit.score,
        });

        if truncated {
            break;
        }
    }

    (context, sources, truncated)
}

fn take_chars(text: &str, n: usize) -> &str {
    match text.char_indices().nth(n) {
        Some((i, _)) => &text[..i],
        None => text,
    }
}

// ============================================================================
// PromptAssembler
// ============================================================================

/// `assemble(question, retrieval_result, max_context_chars)`
#[derive(Debug, Clone)]
pub struct PromptAssembler {
    instruction: String,
}

impl Default for PromptAssembler {
    fn default() -> Self {
        Self::new(GROUNDING_INSTRUCTION)
    }
}

impl PromptAssembler {
    pub fn new(instruction: impl Into<String>) -> Self {
        Self {
            instruction: instruction.into(),
        }
    }

    pub fn instruction(&self) -> &str {
        &self.instruction
    }

    pub fn assemble(
        &self,
        question: &str,
        retrieval: &RetrievalResult,
        max_context_chars: usize,
    ) -> Result<PromptContext> {
        PromptBuilder::new()
            .instruction(&self.instruction)
            .question(question)
            .retrieval(retrieval)
            .max_context_chars(max_context_chars)
            .build()
    }
}

// ============================================================================
// Tests
// ============================================================================
