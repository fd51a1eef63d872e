//! 파일 수집 모듈
//!
//! CLI에 넘어온 파일 및 폴더를 수집 대상 경로 목록으로 펼칩니다.
//! .gitignore 패턴을 존중하고, 로더 레지스트리가 지원하는 확장자만 수집합니다.

use std::path::{Path, PathBuf};

use anyhow::Result;
use ignore::WalkBuilder;

use crate::loader::{DocumentSource, LoaderRegistry};

// ============================================================================
// Collector Config
// ============================================================================

/// 파일 수집기 설정
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    /// .gitignore 패턴 존중 여부
    pub respect_gitignore: bool,
    /// 숨김 파일 포함 여부
    pub include_hidden: bool,
    /// 최대 파일 크기 (바이트, 0이면 제한 없음)
    pub max_file_size: u64,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            respect_gitignore: true,
            include_hidden: false,
            max_file_size: 50 * 1024 * 1024, // 50MB
        }
    }
}

// ============================================================================
// File Collector
// ============================================================================

/// 파일 수집기
pub struct FileCollector<'a> {
    config: CollectorConfig,
    registry: &'a LoaderRegistry,
}

impl<'a> FileCollector<'a> {
    pub fn new(config: CollectorConfig, registry: &'a LoaderRegistry) -> Self {
        Self { config, registry }
    }

    /// 여러 경로 수집 (입력 순서 유지)
    ///
    /// 명시적으로 지정된 파일은 필터 없이 그대로 넘깁니다.
    /// 읽을 수 없는 파일은 수집 보고서에서 실패로 기록됩니다.
    pub fn collect(&self, paths: &[PathBuf]) -> Result<Vec<DocumentSource>> {
        let mut sources = Vec::new();

        for path in paths {
            if path.is_dir() {
                sources.extend(
                    self.collect_directory(path)?
                        .into_iter()
                        .map(DocumentSource::Path),
                );
            } else {
                sources.push(DocumentSource::Path(path.clone()));
            }
        }

        Ok(sources)
    }

    /// 폴더 재귀 수집 (경로순 정렬)
    pub fn collect_directory(&self, path: &Path) -> Result<Vec<PathBuf>> {
        if !path.is_dir() {
            anyhow::bail!("Not a directory: {:?}", path);
        }

        let mut files = Vec::new();

        // ignore 크레이트로 .gitignore 지원
        let walker = WalkBuilder::new(path)
            .hidden(!self.config.include_hidden)
            .git_ignore(self.config.respect_gitignore)
            .git_global(self.config.respect_gitignore)
            .git_exclude(self.config.respect_gitignore)
            .build();

        for entry in walker {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    tracing::warn!("Failed to read entry: {}", e);
                    continue;
                }
            };

            // 파일만 처리
            if !entry.file_type().map(|ft| ft.is_file()).unwrap_or(false) {
                continue;
            }

            if self.should_include(entry.path()) {
                files.push(entry.into_path());
            }
        }

        files.sort();
        tracing::info!("Collected {} files from {:?}", files.len(), path);
        Ok(files)
    }

    /// 파일이 필터 조건을 만족하는지 확인
    fn should_include(&self, path: &Path) -> bool {
        if !self.registry.supports(path) {
            return false;
        }

        // 파일 크기 제한
        if self.config.max_file_size > 0 {
            let size = std::fs::metadata(path).map(|m| m.len()).unwrap_or(0);
            if size > self.config.max_file_size {
                tracing::debug!("Skipping large file: {:?} ({} bytes)", path, size);
                return false;
            }
        }

        true
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn tempdir() -> tempfile::TempDir {
        tempfile::Builder::new()
            .prefix("collector")
            .tempdir()
            .expect("tempdir")
    }

    fn labels(sources: &[DocumentSource]) -> Vec<String> {
        sources
            .iter()
            .map(|s| {
                Path::new(&s.label())
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default()
            })
            .collect()
    }

    #[test]
    fn test_collector_config_default() {
        let config = CollectorConfig::default();
        assert!(config.respect_gitignore);
        assert!(!config.include_hidden);
        assert_eq!(config.max_file_size, 50 * 1024 * 1024);
    }

    #[test]
    fn test_directory_keeps_supported_formats() {
        let dir = tempdir();
        std::fs::write(dir.path().join("b.md"), "# B").expect("write");
        std::fs::write(dir.path().join("a.txt"), "A").expect("write");
        std::fs::write(dir.path().join("image.png"), [0u8; 4]).expect("write");
        std::fs::write(dir.path().join(".hidden.txt"), "hidden").expect("write");
        std::fs::create_dir(dir.path().join("sub")).expect("mkdir");
        std::fs::write(dir.path().join("sub").join("c.txt"), "C").expect("write");

        let registry = LoaderRegistry::with_defaults();
        let collector = FileCollector::new(CollectorConfig::default(), &registry);
        let sources = collector
            .collect(&[dir.path().to_path_buf()])
            .expect("collect");

        assert_eq!(labels(&sources), vec!["a.txt", "b.md", "c.txt"]);
    }

    #[test]
    fn test_explicit_file_passes_through() {
        let registry = LoaderRegistry::with_defaults();
        let collector = FileCollector::new(CollectorConfig::default(), &registry);
        let sources = collector
            .collect(&[PathBuf::from("missing.txt")])
            .expect("collect");
        assert_eq!(sources.len(), 1);
        assert_eq!(sources[0].label(), "missing.txt");
    }

    #[test]
    fn test_max_file_size() {
        let dir = tempdir();
        std::fs::write(dir.path().join("small.txt"), "ok").expect("write");
        std::fs::write(dir.path().join("large.txt"), "x".repeat(100)).expect("write");

        let registry = LoaderRegistry::with_defaults();
        let config = CollectorConfig {
            max_file_size: 10,
            ..Default::default()
        };
        let collector = FileCollector::new(config, &registry);
        let files = collector.collect_directory(dir.path()).expect("collect");

        assert_eq!(files.len(), 1);
        assert!(files[0].ends_with("small.txt"));
    }
}
