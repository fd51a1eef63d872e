//! 텍스트 파일 로더

use std::path::Path;

use async_trait::async_trait;

use crate::error::{RagError, Result};
use crate::knowledge::{Document, SourceMetadata};

use super::DocumentLoader;

/// 평문 / 마크다운 로더 (파일 하나 = 문서 하나)
#[derive(Debug, Clone, Copy, Default)]
pub struct TextLoader;

#[async_trait]
impl DocumentLoader for TextLoader {
    fn name(&self) -> &'static str {
        "text"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["txt", "text", "md", "markdown"]
    }

    async fn load(&self, path: &Path) -> Result<Vec<Document>> {
        let origin = path.display().to_string();
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| RagError::document_load(origin.clone(), e))?;

        Ok(vec![Document::new(
            origin.clone(),
            text,
            SourceMetadata::new(origin),
        )])
    }
}

// ============================================================================
// Tests
// ============================================================================
