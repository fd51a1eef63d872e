//! 문서 / 청크 타입
//!
//! 수집 시점에 한 번 생성되고 이후 변경되지 않습니다.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

// ============================================================================
// Document
// ============================================================================

/// 문서 출처 메타데이터
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceMetadata {
    /// 원본 위치 (파일 경로 등)
    pub origin: String,
    /// PDF 페이지 번호 (1부터 시작)
    pub page: Option<usize>,
    /// 총 페이지 수 (PDF)
    pub total_pages: Option<usize>,
}

impl SourceMetadata {
    pub fn new(origin: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
            ..Default::default()
        }
    }
}

/// 수집된 문서
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    id: String,
    text: String,
    source: SourceMetadata,
    fingerprint: String,
}

impl Document {
    /// 새 문서 생성 (본문 SHA-256 지문 계산)
    pub fn new(id: impl Into<String>, text: impl Into<String>, source: SourceMetadata) -> Self {
        let text = text.into();
        let fingerprint = fingerprint(&text);
        Self {
            id: id.into(),
            text,
            source,
            fingerprint,
        }
    }

    /// 출처를 id로 사용하는 단순 문서
    pub fn from_text(id: impl Into<String>, text: impl Into<String>) -> Self {
        let id = id.into();
        let source = SourceMetadata::new(id.clone());
        Self::new(id, text, source)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn source(&self) -> &SourceMetadata {
        &self.source
    }

    /// 본문 SHA-256 (hex)
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }
}

/// 텍스트 SHA-256 hex
pub fn fingerprint(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

// ============================================================================
// Chunk
// ============================================================================

/// 검색 단위 청크
///
/// `start..end`는 부모 문서 본문의 바이트 범위입니다.
/// `overlap_prev`/`overlap_next`는 이웃 청크와 공유하는 바이트 수입니다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub document_id: String,
    pub document_fingerprint: String,
    /// 문서 내 순번 (0-based)
    pub sequence: usize,
    pub text: String,
    pub start: usize,
    pub end: usize,
    pub overlap_prev: usize,
    pub overlap_next: usize,
    pub source: SourceMetadata,
}

impl Chunk {
    /// 문자 수 (청크 크기 기준 단위)
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }

    /// 이전 청크와 겹치지 않는 부분
    ///
    /// `overlap_prev`가 텍스트 밖이거나 문자 경계가 아니면 빈 문자열입니다.
    pub fn fresh_text(&self) -> &str {
        self.text.get(self.overlap_prev..).unwrap_or("")
    }

    /// `doc#seq` 형태의 참조 문자열
    pub fn label(&self) -> String {
        match self.source.page {
            Some(page) => format!("{} p.{} #{}", self.document_id, page, self.sequence),
            None => format!("{} #{}", self.document_id, self.sequence),
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
    fn test_fingerprint_is_stable() {
        let a = Document::from_text("a", "same text");
        let b = Document::from_text("b", "same text");
        let c = Document::from_text("a", "other text");

        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_ne!(a.fingerprint(), c.fingerprint());
        assert_eq!(a.fingerprint().len(), 64);
    }

    #[test]
    fn test_from_text_uses_id_as_origin() {
        let doc = Document::from_text("notes.txt", "hello");
        assert_eq!(doc.source().origin, "notes.txt");
        assert!(doc.source().page.is_none());
    }

    #[test]
    fn test_chunk_label() {
        let chunk = Chunk {
            document_id: "java.pdf".into(),
            document_fingerprint: String::new(),
            sequence: 3,
            text: "abc".into(),
            start: 0,
            end: 3,
            overlap_prev: 1,
            overlap_next: 0,
            source: SourceMetadata {
                origin: "java.pdf".into(),
                page: Some(12),
                total_pages: Some(40),
            },
        };
        assert_eq!(chunk.label(), "java.pdf p.12 #3");
        assert_eq!(chunk.fresh_text(), "bc");
        assert_eq!(chunk.char_len(), 3);
    }

    #[test]
    fn test_fresh_text_with_inconsistent_overlap() {
        let mut chunk = Chunk {
            document_id: "doc".into(),
            document_fingerprint: String::new(),
            sequence: 1,
            text: "né".into(),
            start: 0,
            end: 3,
            overlap_prev: 9,
            overlap_next: 0,
            source: SourceMetadata::new("doc"),
        };
        // 텍스트 길이를 넘는 겹침
        assert_eq!(chunk.fresh_text(), "");

        // 'é' 중간 바이트
        chunk.overlap_prev = 2;
        assert_eq!(chunk.fresh_text(), "");

        chunk.overlap_prev = 1;
        assert_eq!(chunk.fresh_text(), "é");
    }
}
