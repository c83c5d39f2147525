//! LanceDB Vector Store - 청크 임베딩 영속 저장소
//!
//! `id`(청크 텍스트 해시) 기준 merge insert로 upsert하고,
//! 코사인 거리로 검색합니다. 유사도 = 1 - 거리.
//! ref: https://lancedb.github.io/lancedb/

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use arrow_array::{
    Array, FixedSizeListArray, Float32Array, RecordBatch, RecordBatchIterator, StringArray,
};
use arrow_schema::{DataType, Field, Schema};
use async_trait::async_trait;
use lancedb::connection::Connection;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::DistanceType;
use tokio::sync::Mutex;

use super::vector::{VectorMatch, VectorMetadata, VectorRecord, VectorStore};

/// 벡터 테이블 이름
const TABLE_NAME: &str = "knowledge";

// ============================================================================
// LanceVectorStore
// ============================================================================

/// LanceDB 벡터 저장소 구현
///
/// 한 저장소의 모든 벡터는 같은 차원이어야 합니다.
pub struct LanceVectorStore {
    db: Connection,
    dimension: usize,
    /// 테이블 생성/merge 직렬화
    write_lock: Mutex<()>,
}

impl LanceVectorStore {
    /// LanceDB 저장소 열기
    ///
    /// # Arguments
    /// * `path` - .lance 디렉토리 경로
    /// * `dimension` - 벡터 차원
    pub async fn open(path: &Path, dimension: usize) -> Result<Self> {
        if dimension == 0 {
            anyhow::bail!("Vector dimension must be positive");
        }

        if let Some(parent) = path.parent() {
            if !parent.exists() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .context("Failed to create LanceDB directory")?;
            }
        }

        let path_str = path
            .to_str()
            .ok_or_else(|| anyhow::anyhow!("Invalid path encoding"))?;

        let db = lancedb::connect(path_str)
            .execute()
            .await
            .context("Failed to connect to LanceDB")?;

        let store = Self {
            db,
            dimension,
            write_lock: Mutex::new(()),
        };

        if let Some(existing) = store.stored_dimension().await? {
            if existing != dimension {
                anyhow::bail!(
                    "Vector store at {} uses dimension {}, but {} was requested. \
                     Use the original embedding settings or a new data directory.",
                    path.display(),
                    existing,
                    dimension
                );
            }
        }

        tracing::debug!("LanceDB opened at {} (dim={})", path.display(), dimension);
        Ok(store)
    }

    /// 기존 테이블의 벡터 차원 (테이블이 없으면 None)
    async fn stored_dimension(&self) -> Result<Option<usize>> {
        if !self.table_exists().await? {
            return Ok(None);
        }

        let schema = self
            .open_table()
            .await?
            .schema()
            .await
            .context("Failed to read table schema")?;

        match schema.field_with_name("vector").map(|f| f.data_type()) {
            Ok(DataType::FixedSizeList(_, size)) => Ok(Some(*size as usize)),
            _ => anyhow::bail!("Table {} has no fixed-size vector column", TABLE_NAME),
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// 벡터 테이블 스키마 생성
    fn create_schema(&self) -> Schema {
        Schema::new(vec![
            Field::new("id", DataType::Utf8, false),
            Field::new("text", DataType::Utf8, false),
            Field::new("topic", DataType::Utf8, false),
            Field::new("source", DataType::Utf8, false),
            Field::new(
                "vector",
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, true)),
                    self.dimension as i32,
                ),
                false,
            ),
        ])
    }

    /// 레코드들을 Arrow RecordBatch로 변환
    fn records_to_batch(&self, records: &[&VectorRecord]) -> Result<RecordBatch> {
        if records.is_empty() {
            anyhow::bail!("Cannot create batch from empty records");
        }

        if let Some(bad) = records.iter().find(|r| r.vector.len() != self.dimension) {
            anyhow::bail!(
                "Vector dimension mismatch for {}: expected {}, got {}",
                bad.id,
                self.dimension,
                bad.vector.len()
            );
        }

        let ids: Vec<&str> = records.iter().map(|r| r.id.as_str()).collect();
        let texts: Vec<&str> = records.iter().map(|r| r.text.as_str()).collect();
        let topics: Vec<&str> = records.iter().map(|r| r.metadata.topic.as_str()).collect();
        let sources: Vec<&str> = records.iter().map(|r| r.metadata.source.as_str()).collect();

        let flat: Vec<f32> = records
            .iter()
            .flat_map(|r| r.vector.iter().copied())
            .collect();

        let values = Float32Array::from(flat);
        let field = Arc::new(Field::new("item", DataType::Float32, true));
        let vectors = FixedSizeListArray::try_new(
            field,
            self.dimension as i32,
            Arc::new(values) as Arc<dyn Array>,
            None,
        )
        .context("Failed to create vector array")?;

        let batch = RecordBatch::try_new(
            Arc::new(self.create_schema()),
            vec![
                Arc::new(StringArray::from(ids)),
                Arc::new(StringArray::from(texts)),
                Arc::new(StringArray::from(topics)),
                Arc::new(StringArray::from(sources)),
                Arc::new(vectors),
            ],
        )
        .context("Failed to create RecordBatch")?;

        Ok(batch)
    }

    /// 테이블 존재 여부 확인
    async fn table_exists(&self) -> Result<bool> {
        let names = self
            .db
            .table_names()
            .execute()
            .await
            .context("Failed to list tables")?;
        Ok(names.iter().any(|n| n == TABLE_NAME))
    }

    async fn open_table(&self) -> Result<lancedb::table::Table> {
        self.db
            .open_table(TABLE_NAME)
            .execute()
            .await
            .context("Failed to open table")
    }
}

/// 배치 내 중복 id는 마지막 레코드만 유지 (입력 순서 보존)
fn dedupe_by_id(records: &[VectorRecord]) -> Vec<&VectorRecord> {
    let mut last: HashMap<&str, usize> = HashMap::new();
    for (i, record) in records.iter().enumerate() {
        last.insert(record.id.as_str(), i);
    }

    records
        .iter()
        .enumerate()
        .filter(|(i, r)| last.get(r.id.as_str()) == Some(i))
        .map(|(_, r)| r)
        .collect()
}

/// SQL 문자열 리터럴 이스케이프
fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

#[async_trait]
impl VectorStore for LanceVectorStore {
    async fn upsert_batch(&self, records: &[VectorRecord]) -> Result<usize> {
        if records.is_empty() {
            return Ok(0);
        }

        let unique = dedupe_by_id(records);
        let batch = self.records_to_batch(&unique)?;
        let schema = batch.schema();
        let batches = RecordBatchIterator::new(vec![Ok(batch)], schema);

        let _guard = self.write_lock.lock().await;

        if self.table_exists().await? {
            let table = self.open_table().await?;

            let mut merge = table.merge_insert(&["id"]);
            merge
                .when_matched_update_all(None)
                .when_not_matched_insert_all();
            merge
                .execute(Box::new(batches))
                .await
                .context("Failed to upsert vectors")?;
        } else {
            self.db
                .create_table(TABLE_NAME, batches)
                .execute()
                .await
                .context("Failed to create table")?;
        }

        Ok(unique.len())
    }

    async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<VectorMatch>> {
        if k == 0 || !self.table_exists().await? {
            return Ok(vec![]);
        }

        if vector.len() != self.dimension {
            anyhow::bail!(
                "Query dimension mismatch: expected {}, got {}",
                self.dimension,
                vector.len()
            );
        }

        let table = self.open_table().await?;

        let stream = table
            .vector_search(vector.to_vec())
            .context("Failed to create vector search")?
            .distance_type(DistanceType::Cosine)
            .limit(k)
            .execute()
            .await
            .context("Failed to execute vector search")?;

        use futures::TryStreamExt;
        let batches: Vec<RecordBatch> = stream.try_collect().await?;

        let mut matches = Vec::new();

        for batch in batches {
            let column = |name: &str| {
                batch
                    .column_by_name(name)
                    .and_then(|c| c.as_any().downcast_ref::<StringArray>())
                    .ok_or_else(|| anyhow::anyhow!("Missing {} column", name))
            };
            let ids = column("id")?;
            let texts = column("text")?;
            let topics = column("topic")?;
            let sources = column("source")?;

            // _distance 컬럼 (LanceDB가 자동 추가)
            let distances = batch
                .column_by_name("_distance")
                .and_then(|c| c.as_any().downcast_ref::<Float32Array>())
                .ok_or_else(|| anyhow::anyhow!("Missing _distance column"))?;

            for i in 0..batch.num_rows() {
                let similarity = 1.0 - distances.value(i);
                if !similarity.is_finite() {
                    continue;
                }
                matches.push(VectorMatch {
                    id: ids.value(i).to_string(),
                    text: texts.value(i).to_string(),
                    metadata: VectorMetadata {
                        topic: topics.value(i).to_string(),
                        source: sources.value(i).to_string(),
                    },
                    similarity,
                });
            }
        }

        matches.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        matches.truncate(k);

        Ok(matches)
    }

    async fn delete_topic(&self, topic: &str) -> Result<usize> {
        let _guard = self.write_lock.lock().await;

        if !self.table_exists().await? {
            return Ok(0);
        }

        let table = self.open_table().await?;
        let filter = format!("topic = {}", quote_literal(topic));

        let before = table
            .count_rows(Some(filter.clone()))
            .await
            .context("Failed to count rows for topic")?;

        table
            .delete(&filter)
            .await
            .context("Failed to delete vectors")?;

        Ok(before)
    }

    async fn count(&self) -> Result<usize> {
        if !self.table_exists().await? {
            return Ok(0);
        }

        let table = self.open_table().await?;
        let count = table.count_rows(None).await.context("Failed to count rows")?;
        Ok(count)
    }
}

// ============================================================================
// Tests
// ============================================================================
