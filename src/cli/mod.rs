//! CLI 모듈
//!
//! evidence-rag CLI 명령어 정의 및 구현

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};

use crate::collector::{CollectorConfig, FileCollector};
use crate::config::RagConfig;
use crate::embedding::{self, create_embedder};
use crate::generation::{self, Generator, GroqGenerator};
use crate::knowledge::{AnswerPipeline, Chunker, IngestOutcome, RecursiveChunker};
use crate::loader::LoaderRegistry;

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Parser)]
#[command(name = "evidence-rag")]
#[command(version, about = "문서 근거 기반 질의응답 RAG", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// 파일/폴더를 수집한 뒤 질문에 답변
    Ask {
        /// 질문
        #[arg(short, long)]
        question: String,

        /// 수집할 파일 또는 폴더
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        #[command(flatten)]
        overrides: ConfigArgs,
    },

    /// 수집 후 검색 결과만 출력 (생성 없음)
    Search {
        /// 검색 쿼리
        #[arg(short, long)]
        query: String,

        /// 수집할 파일 또는 폴더
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        #[command(flatten)]
        overrides: ConfigArgs,
    },

    /// 파일의 청크 분할 결과 미리보기
    Chunks {
        /// 대상 파일
        file: PathBuf,

        /// 출력할 청크 수 제한
        #[arg(short, long, default_value = "20")]
        limit: usize,

        #[command(flatten)]
        overrides: ConfigArgs,
    },

    /// 설정 및 API 키 상태 확인
    Status,
}

/// 환경변수 설정을 덮어쓰는 플래그
#[derive(Args, Debug, Default)]
pub struct ConfigArgs {
    /// 청크 최대 문자 수
    #[arg(long)]
    pub chunk_size: Option<usize>,

    /// 청크 겹침 문자 수
    #[arg(long)]
    pub overlap: Option<usize>,

    /// 검색할 청크 수
    #[arg(short = 'k', long)]
    pub top_k: Option<usize>,

    /// 컨텍스트 최대 문자 수
    #[arg(long)]
    pub max_context_chars: Option<usize>,

    /// 임베딩 백엔드 (auto, gemini, hashing)
    #[arg(long)]
    pub embedding: Option<String>,

    /// 생성 모델
    #[arg(long)]
    pub model: Option<String>,

    /// 생성 temperature
    #[arg(long)]
    pub temperature: Option<f32>,
}

impl ConfigArgs {
    /// 플래그 값을 설정에 반영 (지정된 것만)
    pub fn apply(&self, config: &mut RagConfig) -> Result<()> {
        if let Some(v) = self.chunk_size {
            config.chunk.chunk_size = v;
        }
        if let Some(v) = self.overlap {
            config.chunk.overlap = v;
        }
        if let Some(v) = self.top_k {
            config.top_k = v;
        }
        if let Some(v) = self.max_context_chars {
            config.max_context_chars = v;
        }
        if let Some(ref v) = self.embedding {
            config.embedding.backend = v.parse()?;
        }
        if let Some(ref v) = self.model {
            config.generation.model = v.clone();
        }
        if let Some(v) = self.temperature {
            config.generation.temperature = v;
        }
        Ok(())
    }
}

// ============================================================================
// CLI Runner
// ============================================================================

/// CLI 명령어 실행
pub async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Ask {
            question,
            paths,
            overrides,
        } => cmd_ask(&question, &paths, &load_config(&overrides)?).await,
        Commands::Search {
            query,
            paths,
            overrides,
        } => cmd_search(&query, &paths, &load_config(&overrides)?).await,
        Commands::Chunks {
            file,
            limit,
            overrides,
        } => cmd_chunks(&file, limit, &load_config(&overrides)?).await,
        Commands::Status => cmd_status(),
    }
}

/// 기본값 < 환경변수 < 플래그
fn load_config(overrides: &ConfigArgs) -> Result<RagConfig> {
    let mut config = RagConfig::from_env().context("환경변수 설정 오류")?;
    overrides.apply(&mut config)?;
    config.validate().context("설정 검증 실패")?;
    Ok(config)
}

fn build_pipeline(config: &RagConfig, with_generator: bool) -> Result<AnswerPipeline> {
    let embedder = create_embedder(config.embedding.backend, config.embedding.dimension)
        .context("임베딩 프로바이더 초기화 실패")?;

    let generator: Option<Arc<dyn Generator>> = if with_generator {
        let groq = GroqGenerator::from_env(config.generation.clone())
            .context("생성기 초기화 실패")?;
        Some(Arc::new(groq))
    } else {
        None
    };

    AnswerPipeline::new(config, embedder, generator).context("파이프라인 초기화 실패")
}

/// 경로 수집 + 인덱싱, 소스별 결과 출력
async fn ingest_paths(pipeline: &AnswerPipeline, paths: &[PathBuf]) -> Result<()> {
    let collector = FileCollector::new(CollectorConfig::default(), pipeline.loaders());
    let sources = collector.collect(paths)?;

    if sources.is_empty() {
        bail!(
            "수집할 파일이 없습니다 (지원 형식: {})",
            pipeline.loaders().extensions().join(", ")
        );
    }

    println!("[*] 수집 대상: {} 파일", sources.len());

    let report = pipeline
        .ingest(&sources, pipeline.config().chunk)
        .await
        .context("수집 실패")?;

    for (i, entry) in report.sources.iter().enumerate() {
        let status = match &entry.outcome {
            IngestOutcome::Ingested {
                documents,
                chunks,
                duplicates,
            } => {
                if *duplicates > 0 {
                    format!("완료 ({} 문서, {} 청크, 중복 {})", documents, chunks, duplicates)
                } else {
                    format!("완료 ({} 문서, {} 청크)", documents, chunks)
                }
            }
            IngestOutcome::Duplicate => "중복 (건너뜀)".to_string(),
            IngestOutcome::Failed(e) => format!("실패: {}", e),
        };
        println!("[{}/{}] {}... {}", i + 1, report.sources.len(), entry.source, status);
    }

    println!("[OK] 인덱스: {} 청크", report.total_chunks);
    println!();
    Ok(())
}

/// 질문 명령어 (ask)
async fn cmd_ask(question: &str, paths: &[PathBuf], config: &RagConfig) -> Result<()> {
    if !generation::has_api_key() {
        bail!(
            "Groq API 키가 설정되지 않았습니다.\n\
             설정: export GROQ_API_KEY=your-key"
        );
    }

    let pipeline = build_pipeline(config, true)?;
    ingest_paths(&pipeline, paths).await?;

    println!("[*] 질문: \"{}\"", question);
    let answer = pipeline.ask(question).await.context("답변 생성 실패")?;

    println!("\n{}\n", answer.text);

    let note = if answer.truncated { ", 일부 생략" } else { "" };
    println!("[*] 근거 ({} 청크{}):", answer.sources.len(), note);
    for (i, source) in answer.sources.iter().enumerate() {
        let page = source
            .page
            .map(|p| format!(" p.{}", p))
            .unwrap_or_default();
        println!(
            "  {}. [점수: {:.4}] {}{} #{}",
            i + 1,
            source.score,
            source.document_id,
            page,
            source.sequence
        );
    }

    Ok(())
}

/// 검색 명령어 (search)
async fn cmd_search(query: &str, paths: &[PathBuf], config: &RagConfig) -> Result<()> {
    let pipeline = build_pipeline(config, false)?;
    ingest_paths(&pipeline, paths).await?;

    println!("[*] 검색 중: \"{}\"", query);
    let results = pipeline
        .search(query, config.top_k)
        .await
        .context("검색 실패")?;

    if results.is_empty() {
        println!("\n[!] 검색 결과가 없습니다.");
        return Ok(());
    }

    println!("\n[OK] 검색 결과 ({} 건):\n", results.len());
    for (i, hit) in results.iter().enumerate() {
        println!("{}. [점수: {:.4}] {}", i + 1, hit.score, hit.chunk.label());
        println!("   내용: {}", truncate_text(&hit.chunk.text, 200));
        println!();
    }

    Ok(())
}

/// 청크 미리보기 명령어 (chunks)
async fn cmd_chunks(file: &Path, limit: usize, config: &RagConfig) -> Result<()> {
    let registry = LoaderRegistry::with_defaults();
    let documents = registry.load(file).await.context("문서 로드 실패")?;
    let chunker = RecursiveChunker::new(config.chunk)?;

    println!(
        "[*] {} ({} 문서, chunk_size {}, overlap {})",
        file.display(),
        documents.len(),
        config.chunk.chunk_size,
        config.chunk.overlap
    );

    let chunks: Vec<_> = documents.iter().flat_map(|doc| chunker.split(doc)).collect();
    let total_bytes: usize = documents.iter().map(|d| d.text().len()).sum();
    println!("    총 {} 청크, 본문 {}", chunks.len(), format_bytes(total_bytes));
    println!();

    for chunk in chunks.iter().take(limit) {
        println!(
            "  {} [{} chars, overlap {}B]",
            chunk.label(),
            chunk.char_len(),
            chunk.overlap_prev
        );
        println!("    {}", truncate_text(&chunk.text, 120));
    }

    if chunks.len() > limit {
        println!("  ... {} 청크 더 있음", chunks.len() - limit);
    }

    Ok(())
}

/// 상태 명령어 (status)
fn cmd_status() -> Result<()> {
    println!("evidence-rag v{}", env!("CARGO_PKG_VERSION"));
    println!();

    let config = RagConfig::from_env().context("환경변수 설정 오류")?;
    println!(
        "[*] 청크: {} chars (overlap {}), top_k {}, 컨텍스트 {} chars",
        config.chunk.chunk_size, config.chunk.overlap, config.top_k, config.max_context_chars
    );
    println!(
        "[*] 임베딩: {:?} ({} 차원), 생성: {} (temperature {})",
        config.embedding.backend,
        config.embedding.dimension,
        config.generation.model,
        config.generation.temperature
    );
    if let Err(e) = config.validate() {
        println!("[!] 설정 오류: {}", e);
    }

    // API 키 상태
    if embedding::has_api_key() {
        println!("[OK] Gemini API 키: 설정됨");
    } else {
        println!("[!] Gemini API 키: 미설정 (로컬 해싱 임베딩 사용)");
        println!("    설정: export GEMINI_API_KEY=your-key");
    }
    if generation::has_api_key() {
        println!("[OK] Groq API 키: 설정됨");
    } else {
        println!("[!] Groq API 키: 미설정 (ask 사용 불가)");
        println!("    설정: export GROQ_API_KEY=your-key");
    }

    let registry = LoaderRegistry::with_defaults();
    println!("[*] 지원 형식: {}", registry.extensions().join(", "));

    Ok(())
}

// ============================================================================
// Helper Functions
// ============================================================================

/// 텍스트 자르기 (UTF-8 안전)
fn truncate_text(text: &str, max_chars: usize) -> String {
    let cleaned = text.replace('\n', " ").replace('\r', "");
    let cleaned = cleaned.trim();

    if cleaned.chars().count() <= max_chars {
        cleaned.to_string()
    } else {
        let truncated: String = cleaned.chars().take(max_chars).collect();
        format!("{}...", truncated)
    }
}

/// 바이트 크기 포맷팅
fn format_bytes(bytes: usize) -> String {
    const KB: usize = 1024;
    const MB: usize = KB * 1024;

    if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

// ============================================================================
// Tests
// ============================================================================
