//! HTTP API 서버
//!
//! | Method | Path | 설명 |
//! |--------|------|------|
//! | `GET`  | `/` | 서비스 정보 |
//! | `GET`  | `/health` | 헬스 체크 |
//! | `POST` | `/learn` | 토픽 학습 |
//! | `POST` | `/knowledge/search` | 관련 지식 검색 |
//! | `GET`  | `/knowledge/{topic}` | 저장된 토픽 레코드 |
//! | `DELETE` | `/knowledge/{topic}` | 토픽 레코드와 벡터 삭제 |
//! | `POST` | `/research` | 웹 리서치 |
//! | `GET`  | `/stats` | 지식 통계 |
//!
//! 에러 응답: `{"error": {"code": "bad_request", "message": "..."}}`

use std::future::Future;
use std::sync::Arc;

use anyhow::Context;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};

use crate::knowledge::{KnowledgeRecord, RelevantKnowledge};
use crate::orchestrator::{
    ForgetReport, KnowledgeStats, LearningDepth, Orchestrator, ResearchReport,
};

/// research 요청 최대 결과 수
const MAX_RESEARCH_RESULTS: usize = 20;

type AppState = Arc<Orchestrator>;

// ============================================================================
// Server
// ============================================================================

/// 라우터 생성
pub fn router(orchestrator: Arc<Orchestrator>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(handle_root))
        .route("/health", get(handle_health))
        .route("/learn", post(handle_learn))
        .route("/knowledge/search", post(handle_knowledge_search))
        .route(
            "/knowledge/{topic}",
            get(handle_knowledge).delete(handle_forget),
        )
        .route("/research", post(handle_research))
        .route("/stats", get(handle_stats))
        .layer(cors)
        .with_state(orchestrator)
}

/// 서버 실행 (Ctrl-C로 종료, 종료 시 네트워크 자원 해제)
pub async fn run_server(orchestrator: Arc<Orchestrator>, bind: &str) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("Failed to bind {}", bind))?;

    println!("[OK] Listening on http://{}", bind);
    tracing::info!("HTTP server listening on {}", bind);

    serve_until(orchestrator, listener, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("Failed to listen for shutdown signal: {}", e);
        }
    })
    .await
}

/// `shutdown`이 끝날 때까지 서비스, 결과와 상관없이 `close()` 호출
async fn serve_until<F>(
    orchestrator: Arc<Orchestrator>,
    listener: tokio::net::TcpListener,
    shutdown: F,
) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let served = axum::serve(listener, router(orchestrator.clone()))
        .with_graceful_shutdown(shutdown)
        .await
        .context("HTTP server error");

    orchestrator.close().await;
    tracing::info!("HTTP server stopped");
    served
}

// ============================================================================
// Error Response
// ============================================================================

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request",
        message: message.into(),
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found",
        message: message.into(),
    }
}

fn internal(err: anyhow::Error) -> AppError {
    tracing::error!("Request failed: {:#}", err);
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal",
        message: err.to_string(),
    }
}

/// 앞뒤 공백 제거 후 문자 수 범위 검사
fn validate_length(field: &str, value: &str, min: usize, max: usize) -> Result<String, AppError> {
    let trimmed = value.trim();
    let len = trimmed.chars().count();
    if len < min || len > max {
        return Err(bad_request(format!(
            "{} must be between {} and {} characters",
            field, min, max
        )));
    }
    Ok(trimmed.to_string())
}

// ============================================================================
// GET / , GET /health
// ============================================================================

#[derive(Serialize)]
struct RootResponse {
    name: &'static str,
    status: &'static str,
    version: &'static str,
}

async fn handle_root() -> Json<RootResponse> {
    Json(RootResponse {
        name: env!("CARGO_PKG_NAME"),
        status: "active",
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
    })
}

// ============================================================================
// POST /learn
// ============================================================================

#[derive(Deserialize)]
struct LearnRequest {
    topic: String,
    #[serde(default)]
    sources: Vec<String>,
    #[serde(default)]
    depth: LearningDepth,
}

#[derive(Serialize)]
struct LearnResponse {
    topic: String,
    sources_used: Vec<String>,
    key_points: Vec<String>,
    chunk_count: usize,
    created_at: DateTime<Utc>,
}

impl From<KnowledgeRecord> for LearnResponse {
    fn from(record: KnowledgeRecord) -> Self {
        Self {
            topic: record.topic,
            sources_used: record.sources.into_iter().collect(),
            key_points: record.key_points,
            chunk_count: record.chunks.len(),
            created_at: record.created_at,
        }
    }
}

async fn handle_learn(
    State(orchestrator): State<AppState>,
    Json(req): Json<LearnRequest>,
) -> Result<Json<LearnResponse>, AppError> {
    let topic = validate_length("topic", &req.topic, 2, 200)?;

    let record = orchestrator.learn(&topic, &req.sources, req.depth).await;
    Ok(Json(record.into()))
}

// ============================================================================
// POST /knowledge/search , GET /knowledge/{topic}
// ============================================================================

#[derive(Deserialize)]
struct KnowledgeSearchRequest {
    query: String,
}

#[derive(Serialize)]
struct KnowledgeSearchResponse {
    query: String,
    results: Vec<RelevantKnowledge>,
}

async fn handle_knowledge_search(
    State(orchestrator): State<AppState>,
    Json(req): Json<KnowledgeSearchRequest>,
) -> Result<Json<KnowledgeSearchResponse>, AppError> {
    if req.query.trim().is_empty() {
        return Err(bad_request("query must not be empty"));
    }

    let results = orchestrator.find_relevant(&req.query).await;
    Ok(Json(KnowledgeSearchResponse {
        query: req.query,
        results,
    }))
}

async fn handle_knowledge(
    State(orchestrator): State<AppState>,
    Path(topic): Path<String>,
) -> Result<Json<KnowledgeRecord>, AppError> {
    match orchestrator.knowledge(&topic).map_err(internal)? {
        Some(record) => Ok(Json(record)),
        None => Err(not_found(format!("topic not found: {}", topic))),
    }
}

async fn handle_forget(
    State(orchestrator): State<AppState>,
    Path(topic): Path<String>,
) -> Result<Json<ForgetReport>, AppError> {
    let report = orchestrator.forget(&topic).await.map_err(internal)?;
    if !report.record_removed && report.vectors_removed == 0 {
        return Err(not_found(format!("topic not found: {}", topic)));
    }
    Ok(Json(report))
}

// ============================================================================
// POST /research
// ============================================================================

#[derive(Deserialize)]
struct ResearchRequest {
    query: String,
    #[serde(default)]
    max_results: Option<usize>,
    #[serde(default = "default_true")]
    include_content: bool,
    #[serde(default)]
    focus_on: Option<Vec<String>>,
}

fn default_true() -> bool {
    true
}

async fn handle_research(
    State(orchestrator): State<AppState>,
    Json(req): Json<ResearchRequest>,
) -> Result<Json<ResearchReport>, AppError> {
    let query = validate_length("query", &req.query, 3, 500)?;

    let max_results = req
        .max_results
        .unwrap_or(orchestrator.config().max_results);
    if !(1..=MAX_RESEARCH_RESULTS).contains(&max_results) {
        return Err(bad_request(format!(
            "max_results must be between 1 and {}",
            MAX_RESEARCH_RESULTS
        )));
    }

    let report = orchestrator
        .research(
            &query,
            max_results,
            req.include_content,
            req.focus_on.as_deref(),
        )
        .await;
    Ok(Json(report))
}

// ============================================================================
// GET /stats
// ============================================================================

async fn handle_stats(
    State(orchestrator): State<AppState>,
) -> Result<Json<KnowledgeStats>, AppError> {
    let stats = orchestrator.stats().await.map_err(internal)?;
    Ok(Json(stats))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::embedding::HashEmbedding;
    use crate::error::TransportError;
    use crate::knowledge::{LanceVectorStore, LearningLog};
    use crate::scraper::ContentFetcher;
    use crate::search::{SearchBackend, SearchResult, SiteDirectory, WebSearch};
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;
    use tempfile::TempDir;

    struct StaticFetcher;

    #[async_trait]
    impl ContentFetcher for StaticFetcher {
        async fn extract_content(&self, url: &str) -> String {
            if url.contains("bad.example") {
                String::new()
            } else {
                "closures capture variables from the enclosing scope".to_string()
            }
        }
    }

    struct EmptyBackend;

    #[async_trait]
    impl SearchBackend for EmptyBackend {
        async fn search(
            &self,
            _query: &str,
            _max_results: usize,
        ) -> Result<Vec<SearchResult>, TransportError> {
            Ok(vec![])
        }

        fn name(&self) -> &str {
            "empty"
        }
    }

    /// close 호출 여부를 기록하는 fetcher
    #[derive(Default)]
    struct ClosingFetcher {
        closed: AtomicBool,
    }

    #[async_trait]
    impl ContentFetcher for ClosingFetcher {
        async fn extract_content(&self, _url: &str) -> String {
            String::new()
        }

        async fn close(&self) {
            self.closed.store(true, Ordering::SeqCst);
        }
    }

    async fn build_orchestrator(dir: &TempDir, fetcher: Arc<dyn ContentFetcher>) -> Orchestrator {
        let config = Config {
            data_dir: dir.path().to_path_buf(),
            search_delay: Duration::ZERO,
            chunk_size: 3,
            embedding_dimension: 32,
            ..Default::default()
        };
        let vector = LanceVectorStore::open(&config.vectors_path(), 32)
            .await
            .unwrap();
        Orchestrator::with_components(
            config,
            WebSearch::with_backends(
                Box::new(EmptyBackend),
                Box::new(SiteDirectory::default()),
                Duration::ZERO,
            ),
            fetcher,
            Arc::new(vector),
            Arc::new(HashEmbedding::new(32)),
            LearningLog::open_in_memory().unwrap(),
        )
    }

    /// 임의 포트로 서버를 띄우고 base URL 반환
    async fn spawn_server(dir: &TempDir) -> String {
        let orchestrator = build_orchestrator(dir, Arc::new(StaticFetcher)).await;

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router(Arc::new(orchestrator)))
                .await
                .unwrap();
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_shutdown_closes_fetcher() {
        let dir = TempDir::new().unwrap();
        let fetcher = Arc::new(ClosingFetcher::default());
        let orchestrator = Arc::new(build_orchestrator(&dir, fetcher.clone()).await);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();

        serve_until(orchestrator, listener, async {}).await.unwrap();

        assert!(fetcher.closed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_health_and_root() {
        let dir = TempDir::new().unwrap();
        let base = spawn_server(&dir).await;

        let body: Value = reqwest::get(format!("{}/health", base))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["status"], "healthy");

        let body: Value = reqwest::get(&base).await.unwrap().json().await.unwrap();
        assert_eq!(body["name"], "autodidact");
    }

    #[tokio::test]
    async fn test_learn_then_search_and_show() {
        let dir = TempDir::new().unwrap();
        let base = spawn_server(&dir).await;
        let client = reqwest::Client::new();

        let resp = client
            .post(format!("{}/learn", base))
            .json(&json!({
                "topic": "JavaScript Closures",
                "sources": ["https://docs.example/closures", "https://bad.example/404"],
                "depth": "advanced"
            }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["sources_used"], json!(["https://docs.example/closures"]));
        assert_eq!(body["chunk_count"], 3);

        let body: Value = client
            .post(format!("{}/knowledge/search", base))
            .json(&json!({"query": "closures capture variables"}))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["results"][0]["content"], "closures capture variables");

        let resp = client
            .get(format!("{}/knowledge/JavaScript%20Closures", base))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["topic"], "JavaScript Closures");

        let body: Value = client
            .get(format!("{}/stats", base))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["topics"], 1);
        assert_eq!(body["vectors"], 3);
        assert_eq!(body["learning_runs"], 1);
    }

    #[tokio::test]
    async fn test_delete_topic() {
        let dir = TempDir::new().unwrap();
        let base = spawn_server(&dir).await;
        let client = reqwest::Client::new();

        client
            .post(format!("{}/learn", base))
            .json(&json!({
                "topic": "Rust Lifetimes",
                "sources": ["https://docs.example/lifetimes"]
            }))
            .send()
            .await
            .unwrap();

        let resp = client
            .delete(format!("{}/knowledge/Rust%20Lifetimes", base))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["record_removed"], true);
        assert_eq!(body["vectors_removed"], 3);

        let resp = client
            .get(format!("{}/knowledge/Rust%20Lifetimes", base))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 404);

        let resp = client
            .delete(format!("{}/knowledge/Rust%20Lifetimes", base))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 404);
    }

    #[tokio::test]
    async fn test_symbol_only_query_returns_no_results() {
        let dir = TempDir::new().unwrap();
        let base = spawn_server(&dir).await;
        let client = reqwest::Client::new();

        client
            .post(format!("{}/learn", base))
            .json(&json!({
                "topic": "Closures",
                "sources": ["https://docs.example/closures"]
            }))
            .send()
            .await
            .unwrap();

        let body: Value = client
            .post(format!("{}/knowledge/search", base))
            .json(&json!({"query": "???"}))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["results"], json!([]));
    }

    #[tokio::test]
    async fn test_unknown_topic_is_404() {
        let dir = TempDir::new().unwrap();
        let base = spawn_server(&dir).await;

        let resp = reqwest::get(format!("{}/knowledge/nothing", base))
            .await
            .unwrap();
        assert_eq!(resp.status(), 404);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["error"]["code"], "not_found");
    }

    #[tokio::test]
    async fn test_validation_errors() {
        let dir = TempDir::new().unwrap();
        let base = spawn_server(&dir).await;
        let client = reqwest::Client::new();

        let resp = client
            .post(format!("{}/learn", base))
            .json(&json!({"topic": "x"}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 400);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["error"]["code"], "bad_request");

        let resp = client
            .post(format!("{}/research", base))
            .json(&json!({"query": "rust traits", "max_results": 50}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 400);
    }

    #[tokio::test]
    async fn test_research_uses_fallback() {
        let dir = TempDir::new().unwrap();
        let base = spawn_server(&dir).await;

        let body: Value = reqwest::Client::new()
            .post(format!("{}/research", base))
            .json(&json!({
                "query": "python decorators",
                "max_results": 3,
                "include_content": false
            }))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();

        let findings = body["findings"].as_array().unwrap();
        assert_eq!(findings.len(), 3);
        assert_eq!(findings[0]["source"], "Python Documentation");
        assert_eq!(findings[0]["content"], "");
    }
}
