//! 학습 오케스트레이터
//!
//! 검색 → 본문 추출 → 청킹/임베딩/벡터 저장 → JSON 저장 → 학습 기록.
//! 개별 소스나 청크의 실패는 로그만 남기고 다음으로 넘어갑니다.

use std::fmt;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::embedding::{create_embedder, EmbeddingProvider};
use crate::knowledge::{
    KnowledgeBase, KnowledgeRecord, KnowledgeStore, LanceVectorStore, LearningLog, LearningRun,
    RelevantKnowledge, VectorStore, WordChunker, BASE_TOPICS,
};
use crate::scraper::{ContentFetcher, WebScraper};
use crate::search::{SearchResult, WebSearch};

// ============================================================================
// Types
// ============================================================================

/// 학습 깊이
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum LearningDepth {
    Beginner,
    #[default]
    Intermediate,
    Advanced,
    Expert,
}

impl LearningDepth {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Beginner => "beginner",
            Self::Intermediate => "intermediate",
            Self::Advanced => "advanced",
            Self::Expert => "expert",
        }
    }
}

impl fmt::Display for LearningDepth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 리서치 결과 항목
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchFinding {
    #[serde(flatten)]
    pub result: SearchResult,
    /// 추출된 본문 (요청하지 않았거나 실패하면 빈 문자열)
    #[serde(default)]
    pub content: String,
}

/// 리서치 보고서
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchReport {
    pub query: String,
    pub findings: Vec<ResearchFinding>,
    pub generated_at: DateTime<Utc>,
}

/// 지식 통계
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeStats {
    pub topics: usize,
    pub vectors: usize,
    pub learning_runs: usize,
}

/// 토픽 삭제 결과
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForgetReport {
    pub topic: String,
    /// JSON 레코드가 있었는지
    pub record_removed: bool,
    pub vectors_removed: usize,
}

// ============================================================================
// Orchestrator
// ============================================================================

pub struct Orchestrator {
    config: Config,
    search: WebSearch,
    fetcher: Arc<dyn ContentFetcher>,
    store: KnowledgeStore,
    knowledge: KnowledgeBase,
    history: LearningLog,
}

impl Orchestrator {
    /// 설정에 따라 모든 저장소와 클라이언트를 연다
    pub async fn open(config: &Config) -> Result<Self> {
        std::fs::create_dir_all(&config.data_dir).context("Failed to create data directory")?;

        let embedder = create_embedder(config)?;

        let vector = LanceVectorStore::open(&config.vectors_path(), embedder.dimension())
            .await
            .context("Failed to open vector store")?;

        let history =
            LearningLog::open(&config.history_path()).context("Failed to open learning log")?;

        let search = WebSearch::new(config.search_delay)?;

        tracing::info!("Knowledge base ready at {}", config.data_dir.display());

        Ok(Self::with_components(
            config.clone(),
            search,
            Arc::new(WebScraper::new()),
            Arc::new(vector),
            embedder,
            history,
        ))
    }

    /// 구성 요소 직접 지정
    pub fn with_components(
        config: Config,
        search: WebSearch,
        fetcher: Arc<dyn ContentFetcher>,
        vector: Arc<dyn VectorStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        history: LearningLog,
    ) -> Self {
        let store = KnowledgeStore::with_dirs(config.topics_dir(), config.base_dir());
        let knowledge = KnowledgeBase::new(
            vector,
            embedder,
            Box::new(WordChunker::new(config.chunk_size)),
        );

        Self {
            config,
            search,
            fetcher,
            store,
            knowledge,
            history,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &KnowledgeStore {
        &self.store
    }

    pub fn history(&self) -> &LearningLog {
        &self.history
    }

    /// 토픽 학습
    ///
    /// # Arguments
    /// * `topic` - 토픽 이름
    /// * `sources` - 소스 URL (비어 있으면 웹 검색으로 찾음)
    /// * `depth` - 검색어에 붙는 학습 깊이
    ///
    /// 콘텐츠를 얻지 못해도 (빈) 레코드를 저장하고 반환합니다.
    pub async fn learn(
        &self,
        topic: &str,
        sources: &[String],
        depth: LearningDepth,
    ) -> KnowledgeRecord {
        let started_at = Utc::now();

        let sources: Vec<String> = if sources.is_empty() {
            let query = format!("{} programming {}", topic, depth);
            self.search
                .search(&query, self.config.learn_sources, None)
                .await
                .into_iter()
                .map(|r| r.url)
                .collect()
        } else {
            sources.to_vec()
        };

        tracing::info!("Learning {:?} from {} sources", topic, sources.len());

        let mut record = KnowledgeRecord::new(topic);
        let mut sources_used = 0;
        let mut chunk_count = 0;

        for source in &sources {
            let content = self.fetcher.extract_content(source).await;
            if content.trim().is_empty() {
                tracing::warn!("No content from {}, skipping", source);
                continue;
            }

            chunk_count += self.knowledge.ingest(&mut record, &content, source).await;
            sources_used += 1;
        }

        if let Err(e) = self.store.save(topic, &record, &sources) {
            tracing::warn!("Failed to save knowledge for {:?}: {}", topic, e);
        }

        let mut run = LearningRun::new(topic, depth.as_str(), started_at);
        run.sources_requested = sources.len();
        run.sources_used = sources_used;
        run.chunk_count = chunk_count;
        if let Err(e) = self.history.record(&run) {
            tracing::warn!("Failed to record learning run: {}", e);
        }

        tracing::info!(
            "Learned {:?}: {} chunks from {}/{} sources",
            topic,
            chunk_count,
            sources_used,
            sources.len()
        );
        record
    }

    /// 쿼리와 관련된 지식 검색 (실패 시 빈 목록)
    pub async fn find_relevant(&self, query: &str) -> Vec<RelevantKnowledge> {
        self.knowledge
            .find_relevant(query, self.config.relevant_limit)
            .await
    }

    /// 웹 리서치
    ///
    /// `include_content`가 true면 각 결과의 본문을 순서대로 추출합니다.
    pub async fn research(
        &self,
        query: &str,
        max_results: usize,
        include_content: bool,
        focus_on: Option<&[String]>,
    ) -> ResearchReport {
        let results = self.search.search(query, max_results, focus_on).await;

        let mut findings = Vec::with_capacity(results.len());
        for result in results {
            let content = if include_content {
                self.fetcher.extract_content(&result.url).await
            } else {
                String::new()
            };
            findings.push(ResearchFinding { result, content });
        }

        ResearchReport {
            query: query.to_string(),
            findings,
            generated_at: Utc::now(),
        }
    }

    /// 웹 검색만 수행
    pub async fn search(
        &self,
        query: &str,
        max_results: usize,
        focus_on: Option<&[String]>,
    ) -> Vec<SearchResult> {
        self.search.search(query, max_results, focus_on).await
    }

    /// 저장된 토픽 레코드
    pub fn knowledge(&self, topic: &str) -> Result<Option<KnowledgeRecord>> {
        Ok(self.store.load(topic)?)
    }

    /// 토픽 삭제 (JSON 레코드 + 벡터)
    pub async fn forget(&self, topic: &str) -> Result<ForgetReport> {
        let vectors_removed = self
            .knowledge
            .forget(topic)
            .await
            .context("Failed to delete topic vectors")?;
        let record_removed = self.store.remove(topic)?;

        tracing::info!(
            "Forgot {:?}: {} vectors, record removed: {}",
            topic,
            vectors_removed,
            record_removed
        );
        Ok(ForgetReport {
            topic: topic.to_string(),
            record_removed,
            vectors_removed,
        })
    }

    /// 지식 통계
    pub async fn stats(&self) -> Result<KnowledgeStats> {
        Ok(KnowledgeStats {
            topics: self.store.list_topics()?.len(),
            vectors: self.knowledge.vector_count().await?,
            learning_runs: self.history.count()?,
        })
    }

    /// 기본 지식 토픽 로드
    pub fn bootstrap(&self) -> usize {
        self.store.load_base(BASE_TOPICS)
    }

    /// 네트워크 자원 해제
    pub async fn close(&self) {
        self.fetcher.close().await;
    }
}

// ============================================================================
// Tests
// ============================================================================
