//! Knowledge 모듈 - 지식 저장과 검색
//!
//! - Chunker: 고정 단어 수 분할
//! - LanceDB: 청크 벡터 저장 + 코사인 검색
//! - Store: 토픽별 JSON 파일
//! - History: SQLite 학습 실행 기록
//! - Base: 청킹 → 임베딩 → 벡터 저장 조합

mod base;
mod chunker;
mod history;
mod lance;
mod store;
mod vector;

// Re-exports
pub use base::{key_point, KnowledgeBase, RelevantKnowledge, KEY_POINT_CHARS};
pub use chunker::{chunk_words, Chunker, WordChunker};
pub use history::{LearningLog, LearningRun};
pub use lance::LanceVectorStore;
pub use store::{
    sanitize_topic, KnowledgeChunk, KnowledgeRecord, KnowledgeStore, BASE_KNOWLEDGE_SOURCE,
    BASE_TOPICS,
};
pub use vector::{
    content_id, cosine_similarity, is_degenerate, VectorMatch, VectorMetadata, VectorRecord, VectorStore,
};
