//! autodidact - 자기 학습 지식 파이프라인
//!
//! 웹 검색(폴백 체인) → 본문 추출 → 청킹 → 임베딩 → LanceDB 벡터 저장,
//! 토픽별 지식은 JSON 파일로 저장하고 코사인 유사도로 다시 찾습니다.

pub mod cli;
pub mod config;
pub mod embedding;
pub mod error;
pub mod knowledge;
pub mod orchestrator;
pub mod ratelimit;
pub mod scraper;
pub mod search;
pub mod server;

// Re-exports
pub use config::{Config, EmbeddingBackend};
pub use embedding::{
    create_embedder, get_api_key, has_api_key, EmbeddingProvider, GeminiEmbedding, HashEmbedding,
};
pub use error::{PersistenceError, TransportError};
pub use knowledge::{
    Chunker, KnowledgeBase, KnowledgeChunk, KnowledgeRecord, KnowledgeStore, LanceVectorStore,
    LearningLog, LearningRun, RelevantKnowledge, VectorMetadata, VectorStore, WordChunker,
};
pub use orchestrator::{
    ForgetReport, KnowledgeStats, LearningDepth, Orchestrator, ResearchFinding, ResearchReport,
};
pub use ratelimit::RateLimiter;
pub use scraper::{ContentFetcher, ScrapedContent, WebScraper};
pub use search::{SearchBackend, SearchResult, WebSearch};
