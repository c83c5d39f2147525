//! Knowledge Base - 청킹 → 임베딩 → 벡터 저장 파이프라인
//!
//! 한 소스의 본문을 청크 단위로 벡터 저장소에 upsert하고
//! 지식 레코드에 청크와 핵심 포인트를 누적합니다.
//! 청크 하나의 실패는 그 청크만 건너뜁니다.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::embedding::EmbeddingProvider;

use super::chunker::Chunker;
use super::store::{KnowledgeChunk, KnowledgeRecord};
use super::vector::{content_id, is_degenerate, VectorMetadata, VectorStore};

/// 핵심 포인트 최대 길이 (문자 수)
pub const KEY_POINT_CHARS: usize = 100;

// ============================================================================
// Types
// ============================================================================

/// 관련 지식 조회 결과
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelevantKnowledge {
    pub content: String,
    pub metadata: VectorMetadata,
    pub similarity: f32,
}

// ============================================================================
// KnowledgeBase
// ============================================================================

pub struct KnowledgeBase {
    vector: Arc<dyn VectorStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    chunker: Box<dyn Chunker>,
}

impl KnowledgeBase {
    pub fn new(
        vector: Arc<dyn VectorStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        chunker: Box<dyn Chunker>,
    ) -> Self {
        Self {
            vector,
            embedder,
            chunker,
        }
    }

    /// 벡터 개수
    pub async fn vector_count(&self) -> anyhow::Result<usize> {
        self.vector.count().await
    }

    /// 토픽의 모든 벡터 삭제
    pub async fn forget(&self, topic: &str) -> anyhow::Result<usize> {
        self.vector.delete_topic(topic).await
    }

    /// 소스 본문 수집
    ///
    /// # Arguments
    /// * `record` - 청크/핵심 포인트/소스를 누적할 레코드
    /// * `content` - 추출된 본문
    /// * `source` - 원본 URL 또는 라벨
    ///
    /// # Returns
    /// 저장에 성공한 청크 수
    pub async fn ingest(&self, record: &mut KnowledgeRecord, content: &str, source: &str) -> usize {
        let chunks = self.chunker.chunk(content);
        if chunks.is_empty() {
            tracing::warn!("No chunks generated for {}", source);
            return 0;
        }

        let metadata = VectorMetadata {
            topic: record.topic.clone(),
            source: source.to_string(),
        };
        let mut stored = 0;

        for (i, chunk) in chunks.into_iter().enumerate() {
            let vector = match self.embedder.embed(&chunk).await {
                Ok(v) => v,
                Err(e) => {
                    tracing::warn!("Embedding failed for chunk {} of {}: {}", i, source, e);
                    continue;
                }
            };
            if is_degenerate(&vector) {
                tracing::warn!("Zero-norm embedding for chunk {} of {}, skipping", i, source);
                continue;
            }

            let id = content_id(&chunk);
            if let Err(e) = self.vector.upsert(&id, &vector, &chunk, &metadata).await {
                tracing::warn!("Vector upsert failed for chunk {} of {}: {}", i, source, e);
                continue;
            }

            record.key_points.push(key_point(&chunk));
            record.chunks.push(KnowledgeChunk {
                id,
                text: chunk,
                vector,
            });
            stored += 1;
        }

        record.sources.insert(source.to_string());
        tracing::debug!("Stored {} chunks from {}", stored, source);
        stored
    }

    /// 쿼리와 가장 유사한 지식 `k`개 (실패 시 빈 목록)
    pub async fn find_relevant(&self, query: &str, k: usize) -> Vec<RelevantKnowledge> {
        let vector = match self.embedder.embed(query).await {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!("Query embedding failed: {}", e);
                return vec![];
            }
        };
        if is_degenerate(&vector) {
            tracing::debug!("Query {:?} has no searchable terms", query);
            return vec![];
        }

        match self.vector.query(&vector, k).await {
            Ok(matches) => matches
                .into_iter()
                .map(|m| RelevantKnowledge {
                    content: m.text,
                    metadata: m.metadata,
                    similarity: m.similarity,
                })
                .collect(),
            Err(e) => {
                tracing::warn!("Vector query failed: {}", e);
                vec![]
            }
        }
    }
}

/// 청크 앞 100자 (잘렸으면 `...` 추가)
pub fn key_point(chunk: &str) -> String {
    let mut chars = chunk.chars();
    let head: String = chars.by_ref().take(KEY_POINT_CHARS).collect();
    if chars.next().is_some() {
        format!("{}...", head)
    } else {
        head
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashEmbedding;
    use crate::knowledge::chunker::WordChunker;
    use crate::knowledge::vector::{VectorMatch, VectorRecord};
    use anyhow::Result;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// 메모리 벡터 저장소 (선택적으로 특정 텍스트 upsert 실패)
    #[derive(Default)]
    struct MemoryStore {
        records: Mutex<Vec<VectorRecord>>,
        reject: Option<String>,
    }

    #[async_trait]
    impl VectorStore for MemoryStore {
        async fn upsert_batch(&self, records: &[VectorRecord]) -> Result<usize> {
            let mut stored = self.records.lock().unwrap();
            for record in records {
                if self.reject.as_deref() == Some(record.text.as_str()) {
                    anyhow::bail!("rejected");
                }
                stored.retain(|r| r.id != record.id);
                stored.push(record.clone());
            }
            Ok(records.len())
        }

        async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<VectorMatch>> {
            let stored = self.records.lock().unwrap();
            let mut matches: Vec<VectorMatch> = stored
                .iter()
                .map(|r| VectorMatch {
                    id: r.id.clone(),
                    text: r.text.clone(),
                    metadata: r.metadata.clone(),
                    similarity: crate::knowledge::cosine_similarity(vector, &r.vector),
                })
                .collect();
            matches.sort_by(|a, b| b.similarity.partial_cmp(&a.similarity).unwrap());
            matches.truncate(k);
            Ok(matches)
        }

        async fn delete_topic(&self, _topic: &str) -> Result<usize> {
            Ok(0)
        }

        async fn count(&self) -> Result<usize> {
            Ok(self.records.lock().unwrap().len())
        }
    }

    fn knowledge_base(store: MemoryStore, chunk_size: usize) -> KnowledgeBase {
        KnowledgeBase::new(
            Arc::new(store),
            Arc::new(HashEmbedding::new(64)),
            Box::new(WordChunker::new(chunk_size)),
        )
    }

    #[test]
    fn test_key_point_truncation() {
        assert_eq!(key_point("short"), "short");

        let exact = "a".repeat(100);
        assert_eq!(key_point(&exact), exact);

        let long = "b".repeat(150);
        let point = key_point(&long);
        assert_eq!(point, format!("{}...", "b".repeat(100)));
    }

    #[tokio::test]
    async fn test_ingest_accumulates_record() {
        let kb = knowledge_base(MemoryStore::default(), 3);
        let mut record = KnowledgeRecord::new("python");

        let stored = kb
            .ingest(&mut record, "one two three four five", "https://a.example")
            .await;

        assert_eq!(stored, 2);
        assert_eq!(record.chunks.len(), 2);
        assert_eq!(record.key_points, vec!["one two three", "four five"]);
        assert_eq!(record.chunks[0].id, content_id("one two three"));
        assert!(record.sources.contains("https://a.example"));
        assert_eq!(kb.vector_count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_failed_upsert_skips_only_that_chunk() {
        let store = MemoryStore {
            reject: Some("four five six".to_string()),
            ..Default::default()
        };
        let kb = knowledge_base(store, 3);
        let mut record = KnowledgeRecord::new("t");

        let stored = kb
            .ingest(&mut record, "one two three four five six seven", "src")
            .await;

        assert_eq!(stored, 2);
        assert_eq!(record.key_points, vec!["one two three", "seven"]);
    }

    #[tokio::test]
    async fn test_symbol_only_chunk_is_skipped() {
        let kb = knowledge_base(MemoryStore::default(), 3);
        let mut record = KnowledgeRecord::new("t");

        let stored = kb
            .ingest(&mut record, "alpha beta gamma --- *** |", "src")
            .await;

        assert_eq!(stored, 1);
        assert_eq!(record.key_points, vec!["alpha beta gamma"]);
        assert_eq!(kb.vector_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_symbol_only_query_is_empty() {
        let kb = knowledge_base(MemoryStore::default(), 3);
        let mut record = KnowledgeRecord::new("t");
        kb.ingest(&mut record, "alpha beta gamma", "src").await;

        assert!(kb.find_relevant("???", 5).await.is_empty());
        assert_eq!(kb.find_relevant("alpha beta gamma", 5).await.len(), 1);
    }

    #[tokio::test]
    async fn test_find_relevant_ranks_matching_chunk_first() {
        let kb = knowledge_base(MemoryStore::default(), 5);
        let mut record = KnowledgeRecord::new("mixed");
        kb.ingest(
            &mut record,
            "python decorators wrap functions neatly css grid lays out pages",
            "src",
        )
        .await;

        let results = kb.find_relevant("python decorators wrap functions", 1).await;
        assert_eq!(results.len(), 1);
        assert!(results[0].content.contains("decorators"));
        assert_eq!(results[0].metadata.topic, "mixed");
    }
}
