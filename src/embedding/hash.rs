//! 해싱 임베딩 - 로컬 결정적 벡터화
//!
//! 토큰을 SHA-256으로 해싱해 부호 있는 버킷에 누적한 뒤 L2 정규화합니다.
//! 같은 단어를 공유하는 텍스트끼리 코사인 유사도가 높아집니다.

use anyhow::Result;
use async_trait::async_trait;
use sha2::{Digest, Sha256};

use super::EmbeddingProvider;

/// 기본 차원 (all-MiniLM-L6-v2와 동일)
pub const DEFAULT_HASH_DIMENSION: usize = 384;

/// 로컬 해싱 임베딩
#[derive(Debug, Clone)]
pub struct HashEmbedding {
    dimension: usize,
}

impl HashEmbedding {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    /// 동기 임베딩 (순수 함수)
    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];

        for token in tokenize(text) {
            let digest = Sha256::digest(token.as_bytes());
            let mut index_bytes = [0u8; 8];
            index_bytes.copy_from_slice(&digest[..8]);
            let index = (u64::from_le_bytes(index_bytes) % self.dimension as u64) as usize;
            let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
            vector[index] += sign;
        }

        let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|x| *x /= norm);
        }
        vector
    }
}

impl Default for HashEmbedding {
    fn default() -> Self {
        Self::new(DEFAULT_HASH_DIMENSION)
    }
}

#[async_trait]
impl EmbeddingProvider for HashEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.embed_text(text))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        "hash-embedding"
    }
}

/// 소문자 영숫자 토큰 분리
fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::cosine_similarity;

    #[test]
    fn test_deterministic() {
        let embedder = HashEmbedding::new(128);
        let a = embedder.embed_text("Python decorators wrap functions");
        let b = embedder.embed_text("Python decorators wrap functions");
        assert_eq!(a, b);
        assert_eq!(a.len(), 128);
    }

    #[test]
    fn test_normalized() {
        let embedder = HashEmbedding::default();
        let v = embedder.embed_text("rust ownership and borrowing");
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_empty_is_zero_vector() {
        let embedder = HashEmbedding::new(16);
        let v = embedder.embed_text("  ...  ");
        assert_eq!(v, vec![0.0; 16]);
    }

    #[test]
    fn test_case_insensitive() {
        let embedder = HashEmbedding::new(64);
        assert_eq!(embedder.embed_text("Generators"), embedder.embed_text("generators"));
    }

    #[test]
    fn test_shared_words_are_closer() {
        let embedder = HashEmbedding::new(256);
        let query = embedder.embed_text("python generator yield");
        let related = embedder.embed_text("a python generator uses yield to produce values");
        let unrelated = embedder.embed_text("css grid layout columns");

        assert!(cosine_similarity(&query, &related) > cosine_similarity(&query, &unrelated));
    }

    #[tokio::test]
    async fn test_trait_embed_matches_sync() {
        let embedder = HashEmbedding::new(32);
        let v = embedder.embed("hello world").await.unwrap();
        assert_eq!(v, embedder.embed_text("hello world"));
    }
}
