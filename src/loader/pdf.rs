//! PDF 로더
//!
//! pdf-extract 크레이트로 텍스트를 추출하고 페이지별 문서로 나눕니다.

use std::path::Path;

use async_trait::async_trait;

use crate::error::{RagError, Result};
use crate::knowledge::{Document, SourceMetadata};

use super::DocumentLoader;

/// PDF 로더 (페이지 하나 = 문서 하나)
#[derive(Debug, Clone, Copy, Default)]
pub struct PdfLoader;

#[async_trait]
impl DocumentLoader for PdfLoader {
    fn name(&self) -> &'static str {
        "pdf"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["pdf"]
    }

    async fn load(&self, path: &Path) -> Result<Vec<Document>> {
        let origin = path.display().to_string();

        // PDF 추출은 CPU 바운드이므로 spawn_blocking 사용
        let owned = path.to_path_buf();
        let pages = tokio::task::spawn_blocking(move || extract_text_from_pdf(&owned))
            .await
            .map_err(|e| RagError::document_load(origin.clone(), e))??;

        Ok(pages_to_documents(&origin, pages))
    }
}

/// PDF에서 페이지별 텍스트 추출
///
/// (페이지 번호, 텍스트) 목록을 반환합니다. 페이지 번호는 1부터 시작합니다.
pub fn extract_text_from_pdf(path: &Path) -> Result<Vec<(usize, String)>> {
    let origin = path.display().to_string();
    let bytes = std::fs::read(path).map_err(|e| RagError::document_load(origin.clone(), e))?;

    let text = pdf_extract::extract_text_from_mem(&bytes)
        .map_err(|e| RagError::document_load(origin.clone(), e))?;

    if text.trim().is_empty() {
        return Err(RagError::document_load(
            origin,
            "no extractable text (scanned document?)",
        ));
    }

    Ok(split_pdf_pages(&text)
        .into_iter()
        .enumerate()
        .map(|(i, text)| (i + 1, text))
        .collect())
}

/// 페이지 목록 -> 문서 목록
fn pages_to_documents(origin: &str, pages: Vec<(usize, String)>) -> Vec<Document> {
    let total_pages = pages.len();
    pages
        .into_iter()
        .map(|(page, text)| {
            let source = SourceMetadata {
                origin: origin.to_string(),
                page: Some(page),
                total_pages: Some(total_pages),
            };
            Document::new(format!("{}#page={}", origin, page), text, source)
        })
        .collect()
}

/// PDF 텍스트를 페이지별로 분리
fn split_pdf_pages(text: &str) -> Vec<String> {
    // 폼피드 문자 (\x0c)로 페이지 분리 시도
    let pages: Vec<String> = text
        .split('\x0c')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();

    if pages.len() > 1 {
        return pages;
    }

    // 페이지 구분자 패턴 (예: "--- Page 1 ---")
    let page_pattern =
        regex::Regex::new(r"(?m)^[\s]*[-=]+[\s]*(?:Page[\s]*)?(\d+)[\s]*[-=]+[\s]*$");

    if let Ok(page_pattern) = page_pattern {
        let pages: Vec<String> = page_pattern
            .split(text)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        if pages.len() > 1 {
            return pages;
        }
    }

    // 분리 실패 - 전체를 하나의 페이지로
    vec![text.trim().to_string()]
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_pdf_pages_with_formfeed() {
        let text = "Page 1 content\x0cPage 2 content\x0c\x0cPage 3 content";
        let pages = split_pdf_pages(text);
        assert_eq!(pages, vec!["Page 1 content", "Page 2 content", "Page 3 content"]);
    }

    #[test]
    fn test_split_pdf_pages_with_markers() {
        let text = "intro\n--- Page 2 ---\nsecond\n--- Page 3 ---\nthird";
        let pages = split_pdf_pages(text);
        assert_eq!(pages, vec!["intro", "second", "third"]);
    }

    #[test]
    fn test_split_pdf_pages_no_separator() {
        let pages = split_pdf_pages("  Just some text without page breaks ");
        assert_eq!(pages, vec!["Just some text without page breaks"]);
    }

    #[test]
    fn test_pages_to_documents() {
        let docs = pages_to_documents(
            "java.pdf",
            vec![(1, "Classes".into()), (2, "Uma classe abstrata".into())],
        );
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[1].id(), "java.pdf#page=2");
        assert_eq!(docs[1].source().page, Some(2));
        assert_eq!(docs[1].source().total_pages, Some(2));
        assert_eq!(docs[1].source().origin, "java.pdf");
    }

    #[tokio::test]
    async fn test_not_a_pdf() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("fake.pdf");
        std::fs::write(&path, b"definitely not a pdf").expect("write");

        let err = PdfLoader.load(&path).await.unwrap_err();
        assert!(matches!(err, RagError::DocumentLoad { .. }));
    }
}
