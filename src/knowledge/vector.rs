//! Vector Store - 벡터 저장소 트레이트 및 유틸리티
//!
//! 청크 텍스트의 해시를 ID로 사용하므로 같은 텍스트를 다시 저장하면
//! 기존 레코드를 덮어씁니다 (upsert).

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

// ============================================================================
// Types
// ============================================================================

/// 벡터 메타데이터
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VectorMetadata {
    /// 토픽 이름
    pub topic: String,
    /// 원본 URL 또는 라벨
    pub source: String,
}

/// 벡터 레코드 (저장용)
#[derive(Debug, Clone)]
pub struct VectorRecord {
    /// 청크 텍스트의 콘텐츠 해시
    pub id: String,
    /// 임베딩 벡터
    pub vector: Vec<f32>,
    /// 청크 텍스트
    pub text: String,
    pub metadata: VectorMetadata,
}

impl VectorRecord {
    /// 텍스트 해시로 ID를 만들어 레코드 생성
    pub fn new(text: impl Into<String>, vector: Vec<f32>, metadata: VectorMetadata) -> Self {
        let text = text.into();
        Self {
            id: content_id(&text),
            vector,
            text,
            metadata,
        }
    }
}

/// 검색 결과
#[derive(Debug, Clone)]
pub struct VectorMatch {
    pub id: String,
    pub text: String,
    pub metadata: VectorMetadata,
    /// 유사도 (1 - 코사인 거리)
    pub similarity: f32,
}

// ============================================================================
// VectorStore Trait
// ============================================================================

/// VectorStore 트레이트 (async)
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// 레코드 배치 upsert (같은 id는 덮어쓰기)
    async fn upsert_batch(&self, records: &[VectorRecord]) -> Result<usize>;

    /// 코사인 유사도 기준 상위 k개 (유사도 내림차순)
    async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<VectorMatch>>;

    /// 토픽의 벡터 삭제
    async fn delete_topic(&self, topic: &str) -> Result<usize>;

    /// 벡터 개수 조회
    async fn count(&self) -> Result<usize>;

    /// 단일 레코드 upsert
    async fn upsert(
        &self,
        id: &str,
        vector: &[f32],
        text: &str,
        metadata: &VectorMetadata,
    ) -> Result<()> {
        let record = VectorRecord {
            id: id.to_string(),
            vector: vector.to_vec(),
            text: text.to_string(),
            metadata: metadata.clone(),
        };
        self.upsert_batch(std::slice::from_ref(&record)).await?;
        Ok(())
    }
}

// ============================================================================
// Utility Functions
// ============================================================================

/// 청크 텍스트의 안정적인 해시 (SHA-256 hex)
pub fn content_id(text: &str) -> String {
    format!("{:x}", Sha256::digest(text.as_bytes()))
}

/// 코사인 검색에 쓸 수 없는 벡터 (노름 0 또는 NaN/inf 포함)
pub fn is_degenerate(vector: &[f32]) -> bool {
    let norm_sq: f32 = vector.iter().map(|x| x * x).sum();
    !norm_sq.is_finite() || norm_sq == 0.0
}

/// 코사인 유사도 계산
///
/// 결과는 -1.0 ~ 1.0 범위입니다.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}

// ============================================================================
// Tests
// ============================================================================
