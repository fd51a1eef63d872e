//! 문서 로더 모듈
//!
//! 파일 형식마다 `DocumentLoader` 구현체 하나를 두고,
//! `LoaderRegistry`가 확장자로 골라 씁니다.
//! - 텍스트 파일: 직접 읽기
//! - PDF 파일: pdf-extract로 페이지별 추출

pub mod pdf;
pub mod text;

pub use pdf::PdfLoader;
pub use text::TextLoader;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{RagError, Result};
use crate::knowledge::Document;

// ============================================================================
// DocumentLoader Trait
// ============================================================================

/// 형식별 문서 로더
#[async_trait]
pub trait DocumentLoader: Send + Sync {
    /// 로더 이름
    fn name(&self) -> &'static str;

    /// 처리하는 확장자 (소문자, 점 없이)
    fn extensions(&self) -> &'static [&'static str];

    /// 파일을 읽어 문서 목록으로 변환 (PDF는 페이지별)
    async fn load(&self, path: &Path) -> Result<Vec<Document>>;
}

// ============================================================================
// Document Source
// ============================================================================

/// 수집 입력
#[derive(Debug, Clone)]
pub enum DocumentSource {
    /// 로더 레지스트리로 읽을 파일
    Path(PathBuf),
    /// 이미 메모리에 있는 문서
    Inline(Document),
}

impl DocumentSource {
    /// 보고서용 이름
    pub fn label(&self) -> String {
        match self {
            DocumentSource::Path(path) => path.display().to_string(),
            DocumentSource::Inline(doc) => doc.id().to_string(),
        }
    }
}

impl From<PathBuf> for DocumentSource {
    fn from(path: PathBuf) -> Self {
        DocumentSource::Path(path)
    }
}

impl From<&Path> for DocumentSource {
    fn from(path: &Path) -> Self {
        DocumentSource::Path(path.to_path_buf())
    }
}

impl From<Document> for DocumentSource {
    fn from(doc: Document) -> Self {
        DocumentSource::Inline(doc)
    }
}

// ============================================================================
// LoaderRegistry
// ============================================================================

/// 확장자 -> 로더
#[derive(Clone, Default)]
pub struct LoaderRegistry {
    loaders: BTreeMap<String, Arc<dyn DocumentLoader>>,
}

impl LoaderRegistry {
    /// 빈 레지스트리
    pub fn new() -> Self {
        Self::default()
    }

    /// 텍스트 + PDF 로더 등록
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(TextLoader));
        registry.register(Arc::new(PdfLoader));
        registry
    }

    /// 로더 등록 (같은 확장자는 나중 것이 우선)
    pub fn register(&mut self, loader: Arc<dyn DocumentLoader>) {
        for ext in loader.extensions() {
            self.loaders.insert(ext.to_string(), Arc::clone(&loader));
        }
    }

    /// 경로에 맞는 로더
    pub fn loader_for(&self, path: &Path) -> Option<Arc<dyn DocumentLoader>> {
        let ext = path.extension()?.to_str()?.to_lowercase();
        self.loaders.get(&ext).cloned()
    }

    pub fn supports(&self, path: &Path) -> bool {
        self.loader_for(path).is_some()
    }

    /// 등록된 확장자 목록 (정렬)
    pub fn extensions(&self) -> Vec<&str> {
        self.loaders.keys().map(String::as_str).collect()
    }

    /// 파일 로드
    pub async fn load(&self, path: &Path) -> Result<Vec<Document>> {
        let loader = self.loader_for(path).ok_or_else(|| {
            RagError::document_load(path.display().to_string(), "unsupported file format")
        })?;

        tracing::debug!("Loading {} with {}", path.display(), loader.name());
        loader.load(path).await
    }
}

impl std::fmt::Debug for LoaderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoaderRegistry")
            .field("extensions", &self.extensions())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_registry_extensions() {
        let registry = LoaderRegistry::with_defaults();
        assert!(registry.supports(Path::new("notes.md")));
        assert!(registry.supports(Path::new("NOTES.TXT")));
        assert!(registry.supports(Path::new("java (1).pdf")));
        assert!(!registry.supports(Path::new("image.png")));
        assert!(!registry.supports(Path::new("no_extension")));
    }

    #[test]
    fn test_loader_selection() {
        let registry = LoaderRegistry::with_defaults();
        let loader = registry.loader_for(Path::new("book.pdf")).expect("pdf loader");
        assert_eq!(loader.name(), "pdf");
        let loader = registry.loader_for(Path::new("a.txt")).expect("text loader");
        assert_eq!(loader.name(), "text");
    }

    #[tokio::test]
    async fn test_unsupported_format_is_load_error() {
        let registry = LoaderRegistry::with_defaults();
        let err = registry.load(Path::new("photo.png")).await.unwrap_err();
        assert!(matches!(err, RagError::DocumentLoad { .. }));
    }

    #[test]
    fn test_source_labels() {
        let source = DocumentSource::from(PathBuf::from("docs/a.md"));
        assert_eq!(source.label(), "docs/a.md");
        let source = DocumentSource::from(Document::from_text("inline-1", "text"));
        assert_eq!(source.label(), "inline-1");
    }
}
