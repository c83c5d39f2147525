//! CLI 모듈
//!
//! autodidact CLI 명령어 정의 및 구현

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};

use crate::config::Config;
use crate::embedding::has_api_key;
use crate::orchestrator::{LearningDepth, Orchestrator};
use crate::scraper::WebScraper;
use crate::server::run_server;

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Parser)]
#[command(name = "autodidact")]
#[command(version, about = "자기 학습 지식 파이프라인", long_about = None)]
pub struct Cli {
    /// 데이터 디렉토리 (기본: KNOWLEDGE_PATH 또는 ~/.autodidact)
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(flatten)]
    Knowledge(KnowledgeCommand),

    /// URL 본문 추출
    Fetch {
        /// 추출할 URL
        url: String,
    },

    /// HTTP API 서버 실행
    Serve {
        /// 바인드 주소 (기본: BIND_ADDR 또는 0.0.0.0:$PORT)
        #[arg(short, long)]
        bind: Option<String>,
    },
}

/// 지식 베이스를 여는 명령어
#[derive(Subcommand)]
pub enum KnowledgeCommand {
    /// 토픽 학습 (소스가 없으면 웹 검색)
    Learn {
        /// 학습할 토픽
        topic: String,

        /// 소스 URL (여러 번 지정 가능)
        #[arg(short, long = "source")]
        sources: Vec<String>,

        /// 학습 깊이
        #[arg(short, long, value_enum, default_value_t = LearningDepth::Intermediate)]
        depth: LearningDepth,
    },

    /// 저장된 지식에서 관련 청크 검색
    Query {
        /// 검색 쿼리
        query: String,
    },

    /// 웹 검색
    Search {
        /// 검색어
        query: String,

        /// 결과 개수 제한
        #[arg(short, long)]
        limit: Option<usize>,

        /// 초점 용어 (여러 번 지정 가능)
        #[arg(short, long = "focus")]
        focus: Vec<String>,
    },

    /// 웹 리서치 (검색 + 본문 추출)
    Research {
        /// 리서치 쿼리
        query: String,

        /// 결과 개수 제한
        #[arg(short, long)]
        limit: Option<usize>,

        /// 본문 추출 생략
        #[arg(long)]
        no_content: bool,

        /// 초점 용어 (여러 번 지정 가능)
        #[arg(short, long = "focus")]
        focus: Vec<String>,
    },

    /// 저장된 토픽 목록
    Topics,

    /// 토픽 레코드 출력
    Show {
        /// 토픽 이름
        topic: String,

        /// JSON으로 출력
        #[arg(long)]
        json: bool,
    },

    /// 토픽 삭제 (JSON 레코드 + 벡터)
    Forget {
        /// 토픽 이름
        topic: String,
    },

    /// 최근 학습 기록
    History {
        /// 결과 개수 제한
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },

    /// 기본 지식 로드 (base/<topic>.json)
    Bootstrap,

    /// 상태 확인
    Status,
}

// ============================================================================
// CLI Runner
// ============================================================================

/// CLI 명령어 실행
pub async fn run(cli: Cli) -> Result<()> {
    let mut config = Config::from_env().context("설정 로드 실패")?;
    if let Some(dir) = cli.data_dir {
        config.data_dir = dir;
    }

    match cli.command {
        Commands::Fetch { url } => cmd_fetch(&url).await,
        Commands::Serve { bind } => {
            if let Some(bind) = bind {
                config.bind = bind;
            }
            let orchestrator = Arc::new(open(&config).await?);
            run_server(orchestrator, &config.bind).await
        }
        Commands::Knowledge(command) => {
            let orchestrator = open(&config).await?;
            let result = run_command(&orchestrator, command).await;
            orchestrator.close().await;
            result
        }
    }
}

/// 지식 베이스가 필요한 명령어 실행
async fn run_command(orchestrator: &Orchestrator, command: KnowledgeCommand) -> Result<()> {
    match command {
        KnowledgeCommand::Learn {
            topic,
            sources,
            depth,
        } => cmd_learn(orchestrator, &topic, &sources, depth).await,
        KnowledgeCommand::Query { query } => cmd_query(orchestrator, &query).await,
        KnowledgeCommand::Search {
            query,
            limit,
            focus,
        } => cmd_search(orchestrator, &query, limit, &focus).await,
        KnowledgeCommand::Research {
            query,
            limit,
            no_content,
            focus,
        } => cmd_research(orchestrator, &query, limit, !no_content, &focus).await,
        KnowledgeCommand::Topics => cmd_topics(orchestrator),
        KnowledgeCommand::Show { topic, json } => cmd_show(orchestrator, &topic, json),
        KnowledgeCommand::Forget { topic } => cmd_forget(orchestrator, &topic).await,
        KnowledgeCommand::History { limit } => cmd_history(orchestrator, limit),
        KnowledgeCommand::Bootstrap => cmd_bootstrap(orchestrator),
        KnowledgeCommand::Status => cmd_status(orchestrator).await,
    }
}

async fn open(config: &Config) -> Result<Orchestrator> {
    Orchestrator::open(config)
        .await
        .context("지식 베이스 초기화 실패")
}

// ============================================================================
// Command Implementations
// ============================================================================

/// 학습 명령어 (learn)
async fn cmd_learn(
    orchestrator: &Orchestrator,
    topic: &str,
    sources: &[String],
    depth: LearningDepth,
) -> Result<()> {
    if topic.trim().is_empty() {
        bail!("토픽을 입력해야 합니다");
    }

    if sources.is_empty() {
        println!("[*] 학습 중: \"{}\" ({}, 웹 검색)", topic, depth);
    } else {
        println!("[*] 학습 중: \"{}\" ({}, 소스 {}개)", topic, depth, sources.len());
    }

    let record = orchestrator.learn(topic, sources, depth).await;

    if record.chunks.is_empty() {
        println!("\n[!] 수집된 콘텐츠가 없습니다.");
        return Ok(());
    }

    println!(
        "\n[OK] {} 청크 저장 (소스 {}개)\n",
        record.chunks.len(),
        record.sources.len()
    );

    for source in &record.sources {
        println!("  - {}", source);
    }
    println!();

    for (i, point) in record.key_points.iter().take(5).enumerate() {
        println!("{}. {}", i + 1, truncate_text(point, 100));
    }

    Ok(())
}

/// 검색 명령어 (query)
async fn cmd_query(orchestrator: &Orchestrator, query: &str) -> Result<()> {
    println!("[*] 검색 중: \"{}\"", query);

    let results = orchestrator.find_relevant(query).await;

    if results.is_empty() {
        println!("\n[!] 검색 결과가 없습니다.");
        return Ok(());
    }

    println!("\n[OK] 검색 결과 ({} 건):\n", results.len());

    for (i, result) in results.iter().enumerate() {
        println!(
            "{}. [유사도: {:.4}] {}",
            i + 1,
            result.similarity,
            result.metadata.topic
        );
        println!("   소스: {}", result.metadata.source);
        println!("   내용: {}", truncate_text(&result.content, 200));
        println!();
    }

    Ok(())
}

/// 웹 검색 명령어 (search)
async fn cmd_search(
    orchestrator: &Orchestrator,
    query: &str,
    limit: Option<usize>,
    focus: &[String],
) -> Result<()> {
    let limit = limit.unwrap_or(orchestrator.config().max_results);
    let focus = (!focus.is_empty()).then_some(focus);

    let results = orchestrator.search(query, limit, focus).await;

    if results.is_empty() {
        println!("[!] 검색 결과가 없습니다.");
        return Ok(());
    }

    println!("[OK] 검색 결과 ({} 건):\n", results.len());

    for (i, result) in results.iter().enumerate() {
        println!(
            "{}. [{:.2}] {} ({})",
            i + 1,
            result.relevance_score,
            truncate_text(&result.title, 60),
            result.source
        );
        println!("   URL: {}", result.url);
        if !result.snippet.is_empty() {
            println!("   {}", truncate_text(&result.snippet, 160));
        }
        println!();
    }

    Ok(())
}

/// 리서치 명령어 (research)
async fn cmd_research(
    orchestrator: &Orchestrator,
    query: &str,
    limit: Option<usize>,
    include_content: bool,
    focus: &[String],
) -> Result<()> {
    let limit = limit.unwrap_or(orchestrator.config().max_results);
    let focus = (!focus.is_empty()).then_some(focus);

    println!("[*] 리서치 중: \"{}\"", query);

    let report = orchestrator
        .research(query, limit, include_content, focus)
        .await;

    if report.findings.is_empty() {
        println!("\n[!] 검색 결과가 없습니다.");
        return Ok(());
    }

    println!("\n[OK] 리서치 결과 ({} 건):\n", report.findings.len());

    for (i, finding) in report.findings.iter().enumerate() {
        println!("{}. {}", i + 1, truncate_text(&finding.result.title, 60));
        println!("   URL: {}", finding.result.url);
        if include_content {
            if finding.content.is_empty() {
                println!("   [!] 본문 없음");
            } else {
                println!(
                    "   본문 ({}): {}",
                    format_bytes(finding.content.len()),
                    truncate_text(&finding.content, 200)
                );
            }
        }
        println!();
    }

    Ok(())
}

/// 추출 명령어 (fetch)
async fn cmd_fetch(url: &str) -> Result<()> {
    let scraper = WebScraper::new();
    let result = scraper.scrape(url).await;
    scraper.close().await;

    let scraped = result.with_context(|| format!("{} 추출 실패", url))?;

    if let Some(ref title) = scraped.title {
        println!("[OK] {}", title);
    }
    println!("     {} | {}", scraped.url, format_bytes(scraped.content.len()));
    println!();
    println!("{}", scraped.content);

    Ok(())
}

/// 토픽 목록 명령어 (topics)
fn cmd_topics(orchestrator: &Orchestrator) -> Result<()> {
    let topics = orchestrator
        .store()
        .list_topics()
        .context("토픽 목록 조회 실패")?;

    if topics.is_empty() {
        println!("[!] 저장된 토픽이 없습니다.");
        return Ok(());
    }

    println!("[OK] 저장된 토픽 ({} 개):\n", topics.len());
    for topic in topics {
        println!("  {}", topic);
    }

    Ok(())
}

/// 토픽 출력 명령어 (show)
fn cmd_show(orchestrator: &Orchestrator, topic: &str, json: bool) -> Result<()> {
    let record = orchestrator
        .knowledge(topic)?
        .ok_or_else(|| anyhow::anyhow!("토픽 '{}'을 찾을 수 없습니다", topic))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&record)?);
        return Ok(());
    }

    println!("[OK] {}", record.topic);
    println!("     생성: {}", record.created_at.format("%Y-%m-%d %H:%M"));
    println!("     청크: {} | 핵심 포인트: {}", record.chunks.len(), record.key_points.len());
    println!();

    if !record.sources.is_empty() {
        println!("소스:");
        for source in &record.sources {
            println!("  - {}", source);
        }
        println!();
    }

    for (i, point) in record.key_points.iter().enumerate() {
        println!("{}. {}", i + 1, truncate_text(point, 120));
    }

    Ok(())
}

/// 토픽 삭제 명령어 (forget)
async fn cmd_forget(orchestrator: &Orchestrator, topic: &str) -> Result<()> {
    println!("[*] 삭제 중: \"{}\"", topic);

    let report = orchestrator
        .forget(topic)
        .await
        .with_context(|| format!("토픽 '{}' 삭제 실패", topic))?;

    if !report.record_removed && report.vectors_removed == 0 {
        println!("[!] 토픽 '{}'을 찾을 수 없습니다.", topic);
        return Ok(());
    }

    println!("[OK] 벡터 {}개 삭제", report.vectors_removed);
    if report.record_removed {
        println!("     레코드 삭제: {}", orchestrator.store().topic_dir(topic).display());
    }

    Ok(())
}

/// 학습 기록 명령어 (history)
fn cmd_history(orchestrator: &Orchestrator, limit: usize) -> Result<()> {
    let runs = orchestrator
        .history()
        .recent(limit)
        .context("학습 기록 조회 실패")?;

    if runs.is_empty() {
        println!("[!] 학습 기록이 없습니다.");
        return Ok(());
    }

    println!("[OK] 최근 학습 ({} 건):\n", runs.len());

    for run in runs {
        let elapsed = run.finished_at - run.started_at;
        println!(
            "  {} [{}] {}",
            run.started_at.format("%Y-%m-%d %H:%M"),
            run.depth,
            truncate_text(&run.topic, 40)
        );
        println!(
            "        소스 {}/{} | {} 청크 | {:.1}s",
            run.sources_used,
            run.sources_requested,
            run.chunk_count,
            elapsed.num_milliseconds() as f64 / 1000.0
        );
    }

    Ok(())
}

/// 기본 지식 로드 명령어 (bootstrap)
fn cmd_bootstrap(orchestrator: &Orchestrator) -> Result<()> {
    let base_dir = orchestrator.config().base_dir();
    println!("[*] 기본 지식 로드: {}", base_dir.display());

    let loaded = orchestrator.bootstrap();

    if loaded == 0 {
        println!("[!] 로드된 토픽이 없습니다.");
    } else {
        println!("[OK] {} 개 토픽 로드됨", loaded);
    }

    Ok(())
}

/// 상태 명령어 (status)
async fn cmd_status(orchestrator: &Orchestrator) -> Result<()> {
    let config = orchestrator.config();

    println!("autodidact v{}", env!("CARGO_PKG_VERSION"));
    println!();

    println!("[*] 데이터 디렉토리: {}", config.data_dir.display());
    println!(
        "[*] 임베딩: {:?} ({} 차원)",
        config.embedding, config.embedding_dimension
    );

    if has_api_key() {
        println!("[OK] Gemini API 키: 설정됨");
    } else {
        println!("[*] Gemini API 키: 미설정 (해싱 임베딩만 사용 가능)");
    }

    match orchestrator.stats().await {
        Ok(stats) => {
            println!("[OK] 토픽: {} 개", stats.topics);
            println!("[OK] 벡터 인덱스: {} 청크", stats.vectors);
            println!("[OK] 학습 기록: {} 건", stats.learning_runs);
        }
        Err(e) => {
            println!("[!] 통계 조회 실패: {}", e);
        }
    }

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
