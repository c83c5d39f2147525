//! Knowledge Store - 토픽별 JSON 파일 저장소
//!
//! 저장 위치:
//! - `<root>/topics/<topic>/knowledge.json` - 지식 레코드
//! - `<root>/topics/<topic>/sources.json` - `{"sources": [...]}`
//! - `<root>/base/<topic>.json` - 부트스트랩용 기본 지식
//!
//! 같은 토픽을 다시 저장하면 덮어씁니다 (last write wins).

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::PersistenceError;

/// 기본 지식 파일의 소스 라벨
pub const BASE_KNOWLEDGE_SOURCE: &str = "base_knowledge";

/// 부트스트랩 대상 토픽 목록
pub const BASE_TOPICS: &[&str] = &[
    "python_programming",
    "javascript_programming",
    "algorithms",
    "data_structures",
    "software_design_patterns",
    "api_design",
    "database_design",
    "web_development",
    "machine_learning_basics",
];

// ============================================================================
// Types
// ============================================================================

/// 저장된 청크
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeChunk {
    /// 텍스트 해시 (벡터 저장소 id와 동일)
    pub id: String,
    #[serde(alias = "content")]
    pub text: String,
    #[serde(default, alias = "embedding")]
    pub vector: Vec<f32>,
}

/// 토픽 지식 레코드
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeRecord {
    pub topic: String,
    #[serde(default)]
    pub chunks: Vec<KnowledgeChunk>,
    #[serde(default)]
    pub key_points: Vec<String>,
    #[serde(default)]
    pub examples: Vec<String>,
    #[serde(default)]
    pub sources: BTreeSet<String>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl KnowledgeRecord {
    /// 빈 레코드 생성
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            chunks: Vec::new(),
            key_points: Vec::new(),
            examples: Vec::new(),
            sources: BTreeSet::new(),
            created_at: Utc::now(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty() && self.key_points.is_empty() && self.examples.is_empty()
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct SourcesFile {
    sources: Vec<String>,
}

// ============================================================================
// KnowledgeStore
// ============================================================================

/// JSON 파일 기반 지식 저장소
#[derive(Debug, Clone)]
pub struct KnowledgeStore {
    topics_dir: PathBuf,
    base_dir: PathBuf,
}

impl KnowledgeStore {
    /// 데이터 루트 아래 `topics/`, `base/`를 사용
    pub fn new(root: &Path) -> Self {
        Self::with_dirs(root.join("topics"), root.join("base"))
    }

    pub fn with_dirs(topics_dir: PathBuf, base_dir: PathBuf) -> Self {
        Self {
            topics_dir,
            base_dir,
        }
    }

    pub fn topics_dir(&self) -> &Path {
        &self.topics_dir
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// 토픽 디렉토리 경로
    pub fn topic_dir(&self, topic: &str) -> PathBuf {
        self.topics_dir.join(sanitize_topic(topic))
    }

    /// 지식 레코드와 소스 목록 저장
    ///
    /// 반환값은 `knowledge.json` 경로입니다.
    pub fn save(
        &self,
        topic: &str,
        record: &KnowledgeRecord,
        sources: &[String],
    ) -> Result<PathBuf, PersistenceError> {
        let dir = self.topic_dir(topic);
        std::fs::create_dir_all(&dir).map_err(|e| PersistenceError::io(&dir, e))?;

        let knowledge_path = dir.join("knowledge.json");
        write_json(&knowledge_path, record)?;

        let sources_path = dir.join("sources.json");
        write_json(
            &sources_path,
            &SourcesFile {
                sources: sources.to_vec(),
            },
        )?;

        tracing::debug!(
            "Saved {} chunks for {:?} to {}",
            record.chunks.len(),
            topic,
            knowledge_path.display()
        );
        Ok(knowledge_path)
    }

    /// 토픽 레코드 로드 (없으면 None)
    pub fn load(&self, topic: &str) -> Result<Option<KnowledgeRecord>, PersistenceError> {
        let path = self.topic_dir(topic).join("knowledge.json");
        match read_json(&path) {
            Ok(record) => Ok(Some(record)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// 토픽 소스 목록 로드 (없으면 빈 목록)
    pub fn load_sources(&self, topic: &str) -> Result<Vec<String>, PersistenceError> {
        let path = self.topic_dir(topic).join("sources.json");
        match read_json::<SourcesFile>(&path) {
            Ok(file) => Ok(file.sources),
            Err(e) if e.is_not_found() => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }

    /// 토픽 디렉토리 삭제 (없었으면 false)
    pub fn remove(&self, topic: &str) -> Result<bool, PersistenceError> {
        let dir = self.topic_dir(topic);
        match std::fs::remove_dir_all(&dir) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(PersistenceError::io(&dir, e)),
        }
    }

    /// 저장된 토픽 디렉토리 이름 목록 (정렬됨)
    pub fn list_topics(&self) -> Result<Vec<String>, PersistenceError> {
        let entries = match std::fs::read_dir(&self.topics_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(PersistenceError::io(&self.topics_dir, e)),
        };

        let mut topics = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| PersistenceError::io(&self.topics_dir, e))?;
            let path = entry.path();
            if path.join("knowledge.json").is_file() {
                if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                    topics.push(name.to_string());
                }
            }
        }

        topics.sort();
        Ok(topics)
    }

    /// 기본 지식 로드
    ///
    /// `base/<topic>.json`이 있는 토픽만 소스 `base_knowledge`로 재저장합니다.
    /// 없는 파일은 건너뛰고, 실패는 토픽별로 로그만 남깁니다.
    /// 반환값은 저장에 성공한 토픽 수입니다.
    pub fn load_base(&self, topics: &[&str]) -> usize {
        let mut loaded = 0;

        for topic in topics {
            let path = self.base_dir.join(format!("{}.json", topic));
            if !path.is_file() {
                tracing::debug!("No base knowledge for {}", topic);
                continue;
            }

            let mut record: KnowledgeRecord = match read_json(&path) {
                Ok(record) => record,
                Err(e) => {
                    tracing::warn!("Failed to load base knowledge {}: {}", topic, e);
                    continue;
                }
            };
            record.sources.insert(BASE_KNOWLEDGE_SOURCE.to_string());

            match self.save(topic, &record, &[BASE_KNOWLEDGE_SOURCE.to_string()]) {
                Ok(_) => loaded += 1,
                Err(e) => tracing::warn!("Failed to save base knowledge {}: {}", topic, e),
            }
        }

        tracing::info!("Loaded {} base knowledge topics", loaded);
        loaded
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// 토픽 이름을 디렉토리 이름으로 변환
///
/// 소문자화, `[a-z0-9_-]` 이외 문자 연속은 `_` 하나로, 양끝 `_` 제거.
pub fn sanitize_topic(topic: &str) -> String {
    let mut out = String::with_capacity(topic.len());
    let mut pending_sep = false;

    for ch in topic.chars().flat_map(char::to_lowercase) {
        if ch.is_ascii_lowercase() || ch.is_ascii_digit() || ch == '_' || ch == '-' {
            if pending_sep {
                out.push('_');
                pending_sep = false;
            }
            out.push(ch);
        } else {
            pending_sep = true;
        }
    }

    let trimmed = out.trim_matches('_');
    if trimmed.is_empty() {
        "untitled".to_string()
    } else {
        trimmed.to_string()
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), PersistenceError> {
    let json = serde_json::to_string_pretty(value).map_err(|source| PersistenceError::Serialize {
        path: path.to_path_buf(),
        source,
    })?;
    std::fs::write(path, json).map_err(|e| PersistenceError::io(path, e))
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T, PersistenceError> {
    let data = std::fs::read_to_string(path).map_err(|e| PersistenceError::io(path, e))?;
    serde_json::from_str(&data).map_err(|source| PersistenceError::Deserialize {
        path: path.to_path_buf(),
        source,
    })
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_store() -> (TempDir, KnowledgeStore) {
        let temp_dir = TempDir::new().unwrap();
        let store = KnowledgeStore::new(temp_dir.path());
        (temp_dir, store)
    }

    fn sample_record(topic: &str) -> KnowledgeRecord {
        let mut record = KnowledgeRecord::new(topic);
        record.chunks.push(KnowledgeChunk {
            id: "abc".to_string(),
            text: "Generators produce values lazily".to_string(),
            vector: vec![0.5, -0.5],
        });
        record.key_points.push("Generators produce values lazily".to_string());
        record.sources.insert("https://docs.python.org".to_string());
        record
    }

    #[test]
    fn test_sanitize_topic() {
        assert_eq!(sanitize_topic("Python Generators"), "python_generators");
        assert_eq!(sanitize_topic("C++ / Rust!!"), "c_rust");
        assert_eq!(sanitize_topic("already_fine-1"), "already_fine-1");
        assert_eq!(sanitize_topic("  __x__  "), "x");
        assert_eq!(sanitize_topic("???"), "untitled");
        assert_eq!(sanitize_topic(""), "untitled");
    }

    #[test]
    fn test_save_and_load() {
        let (_dir, store) = create_test_store();
        let record = sample_record("Python Generators");
        let sources = vec!["https://docs.python.org".to_string()];

        let path = store.save("Python Generators", &record, &sources).unwrap();
        assert!(path.ends_with("topics/python_generators/knowledge.json"));

        let loaded = store.load("Python Generators").unwrap().unwrap();
        assert_eq!(loaded, record);
        assert_eq!(store.load_sources("Python Generators").unwrap(), sources);
    }

    #[test]
    fn test_sources_file_format() {
        let (_dir, store) = create_test_store();
        store
            .save("t", &KnowledgeRecord::new("t"), &["a".to_string(), "b".to_string()])
            .unwrap();

        let raw = std::fs::read_to_string(store.topic_dir("t").join("sources.json")).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value, serde_json::json!({"sources": ["a", "b"]}));
    }

    #[test]
    fn test_save_overwrites() {
        let (_dir, store) = create_test_store();
        store.save("t", &sample_record("t"), &[]).unwrap();
        store.save("t", &KnowledgeRecord::new("t"), &[]).unwrap();

        let loaded = store.load("t").unwrap().unwrap();
        assert!(loaded.chunks.is_empty());
    }

    #[test]
    fn test_load_missing() {
        let (_dir, store) = create_test_store();
        assert!(store.load("nothing").unwrap().is_none());
        assert!(store.load_sources("nothing").unwrap().is_empty());
        assert!(store.list_topics().unwrap().is_empty());
    }

    #[test]
    fn test_list_topics() {
        let (_dir, store) = create_test_store();
        store.save("Zeta", &KnowledgeRecord::new("Zeta"), &[]).unwrap();
        store.save("alpha", &KnowledgeRecord::new("alpha"), &[]).unwrap();

        assert_eq!(store.list_topics().unwrap(), vec!["alpha", "zeta"]);
    }

    #[test]
    fn test_remove_topic() {
        let (_dir, store) = create_test_store();
        store.save("Rust Traits", &sample_record("Rust Traits"), &[]).unwrap();

        assert!(store.remove("Rust Traits").unwrap());
        assert!(store.load("Rust Traits").unwrap().is_none());
        assert!(store.list_topics().unwrap().is_empty());
        assert!(!store.remove("Rust Traits").unwrap());
    }

    #[test]
    fn test_load_base() {
        let (_dir, store) = create_test_store();
        std::fs::create_dir_all(store.base_dir()).unwrap();
        std::fs::write(
            store.base_dir().join("algorithms.json"),
            r#"{"topic": "algorithms", "key_points": ["Big-O describes growth"]}"#,
        )
        .unwrap();
        std::fs::write(store.base_dir().join("api_design.json"), "not json").unwrap();

        let loaded = store.load_base(&["algorithms", "api_design", "data_structures"]);
        assert_eq!(loaded, 1);

        let record = store.load("algorithms").unwrap().unwrap();
        assert_eq!(record.key_points, vec!["Big-O describes growth"]);
        assert!(record.sources.contains(BASE_KNOWLEDGE_SOURCE));
        assert_eq!(
            store.load_sources("algorithms").unwrap(),
            vec![BASE_KNOWLEDGE_SOURCE]
        );
        assert!(store.load("data_structures").unwrap().is_none());
        assert!(store.load("api_design").unwrap().is_none());
    }

    #[test]
    fn test_chunk_field_aliases() {
        let json = r#"{"topic": "t", "chunks": [{"id": "1", "content": "text", "embedding": [1.0]}]}"#;
        let record: KnowledgeRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.chunks[0].text, "text");
        assert_eq!(record.chunks[0].vector, vec![1.0]);
    }
}
