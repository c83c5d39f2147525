//! 설정 모듈
//!
//! 기본값 → 환경변수 → CLI 플래그 순서로 덮어씁니다.
//! 런타임 중 재설정은 지원하지 않습니다.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, Context, Result};

/// 기본 검색 호출 간 딜레이 (ms)
pub const DEFAULT_SEARCH_DELAY_MS: u64 = 1000;
/// 기본 청크 크기 (단어 수)
pub const DEFAULT_CHUNK_SIZE: usize = 500;
/// 기본 검색 결과 수
pub const DEFAULT_MAX_RESULTS: usize = 5;
/// 기본 관련 지식 조회 수
pub const DEFAULT_RELEVANT_LIMIT: usize = 5;
/// 학습 시 검색으로 가져오는 최대 소스 수
pub const DEFAULT_LEARN_SOURCES: usize = 3;
/// 기본 서버 포트
pub const DEFAULT_PORT: u16 = 8000;

/// 데이터 디렉토리 경로 (~/.autodidact/)
pub fn get_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".autodidact")
}

/// 임베딩 프로바이더 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddingBackend {
    /// 로컬 해싱 임베딩 (네트워크 불필요)
    Hash,
    /// Gemini 임베딩 API
    Gemini,
}

impl FromStr for EmbeddingBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "hash" | "local" => Ok(Self::Hash),
            "gemini" => Ok(Self::Gemini),
            other => bail!("Unknown embedding provider: {other} (expected hash or gemini)"),
        }
    }
}

impl EmbeddingBackend {
    /// 프로바이더별 기본 차원
    pub fn default_dimension(self) -> usize {
        match self {
            Self::Hash => crate::embedding::DEFAULT_HASH_DIMENSION,
            Self::Gemini => crate::embedding::DEFAULT_DIMENSION,
        }
    }
}

/// 애플리케이션 설정
#[derive(Debug, Clone)]
pub struct Config {
    /// 지식/벡터/로그 저장 루트
    pub data_dir: PathBuf,
    /// 검색 호출 간 최소 딜레이
    pub search_delay: Duration,
    /// 청크 크기 (단어 수)
    pub chunk_size: usize,
    /// 검색 결과 기본 개수
    pub max_results: usize,
    /// find_relevant 결과 개수
    pub relevant_limit: usize,
    /// learn 시 검색에서 취할 소스 수
    pub learn_sources: usize,
    pub embedding: EmbeddingBackend,
    pub embedding_dimension: usize,
    /// HTTP 서버 바인드 주소
    pub bind: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: get_data_dir(),
            search_delay: Duration::from_millis(DEFAULT_SEARCH_DELAY_MS),
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_results: DEFAULT_MAX_RESULTS,
            relevant_limit: DEFAULT_RELEVANT_LIMIT,
            learn_sources: DEFAULT_LEARN_SOURCES,
            embedding: EmbeddingBackend::Hash,
            embedding_dimension: EmbeddingBackend::Hash.default_dimension(),
            bind: format!("0.0.0.0:{DEFAULT_PORT}"),
        }
    }
}

impl Config {
    /// 프로세스 환경변수에서 설정 로드
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// 임의의 조회 함수로 설정 로드 (빈 값은 미설정으로 취급)
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut config = Self::default();

        if let Some(path) = get("KNOWLEDGE_PATH") {
            config.data_dir = PathBuf::from(path);
        }
        if let Some(ms) = get("SEARCH_DELAY_MS") {
            config.search_delay = Duration::from_millis(parse_var("SEARCH_DELAY_MS", &ms)?);
        }
        if let Some(v) = get("CHUNK_SIZE") {
            config.chunk_size = parse_var("CHUNK_SIZE", &v)?;
        }
        if let Some(v) = get("MAX_RESULTS") {
            config.max_results = parse_var("MAX_RESULTS", &v)?;
        }
        if let Some(v) = get("RELEVANT_LIMIT") {
            config.relevant_limit = parse_var("RELEVANT_LIMIT", &v)?;
        }
        if let Some(v) = get("LEARN_SOURCES") {
            config.learn_sources = parse_var("LEARN_SOURCES", &v)?;
        }
        if let Some(v) = get("EMBEDDING_PROVIDER") {
            config.embedding = v.parse().context("Invalid EMBEDDING_PROVIDER")?;
        }
        config.embedding_dimension = match get("EMBEDDING_DIMENSION") {
            Some(v) => parse_var("EMBEDDING_DIMENSION", &v)?,
            None => config.embedding.default_dimension(),
        };
        if let Some(addr) = get("BIND_ADDR") {
            config.bind = addr;
        } else if let Some(port) = get("PORT") {
            let port: u16 = parse_var("PORT", &port)?;
            config.bind = format!("0.0.0.0:{port}");
        }

        config.validate()?;
        Ok(config)
    }

    /// 값 범위 검증
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            bail!("CHUNK_SIZE must be greater than 0");
        }
        if self.embedding_dimension == 0 {
            bail!("EMBEDDING_DIMENSION must be greater than 0");
        }
        Ok(())
    }

    /// 토픽별 지식 파일 루트
    pub fn topics_dir(&self) -> PathBuf {
        self.data_dir.join("topics")
    }

    /// 기본 지식 파일 디렉토리
    pub fn base_dir(&self) -> PathBuf {
        self.data_dir.join("base")
    }

    /// LanceDB 디렉토리
    pub fn vectors_path(&self) -> PathBuf {
        self.data_dir.join("vectors.lance")
    }

    /// 학습 기록 DB
    pub fn history_path(&self) -> PathBuf {
        self.data_dir.join("history.db")
    }
}

fn parse_var<T>(key: &str, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value
        .trim()
        .parse()
        .with_context(|| format!("Invalid value for {key}: {value:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.chunk_size, 500);
        assert_eq!(config.max_results, 5);
        assert_eq!(config.search_delay, Duration::from_millis(1000));
        assert_eq!(config.embedding, EmbeddingBackend::Hash);
        assert_eq!(config.embedding_dimension, 384);
        assert_eq!(config.bind, "0.0.0.0:8000");
    }

    #[test]
    fn test_env_overrides() {
        let config = Config::from_lookup(lookup(&[
            ("KNOWLEDGE_PATH", "/tmp/kb"),
            ("SEARCH_DELAY_MS", "250"),
            ("CHUNK_SIZE", "100"),
            ("EMBEDDING_PROVIDER", "gemini"),
            ("PORT", "9000"),
        ]))
        .unwrap();

        assert_eq!(config.data_dir, PathBuf::from("/tmp/kb"));
        assert_eq!(config.search_delay, Duration::from_millis(250));
        assert_eq!(config.chunk_size, 100);
        assert_eq!(config.embedding, EmbeddingBackend::Gemini);
        assert_eq!(config.embedding_dimension, 768);
        assert_eq!(config.bind, "0.0.0.0:9000");
        assert_eq!(config.vectors_path(), PathBuf::from("/tmp/kb/vectors.lance"));
    }

    #[test]
    fn test_bind_addr_wins_over_port() {
        let config =
            Config::from_lookup(lookup(&[("BIND_ADDR", "127.0.0.1:3000"), ("PORT", "9000")]))
                .unwrap();
        assert_eq!(config.bind, "127.0.0.1:3000");
    }

    #[test]
    fn test_invalid_values_are_errors() {
        assert!(Config::from_lookup(lookup(&[("CHUNK_SIZE", "lots")])).is_err());
        assert!(Config::from_lookup(lookup(&[("CHUNK_SIZE", "0")])).is_err());
        assert!(Config::from_lookup(lookup(&[("EMBEDDING_PROVIDER", "word2vec")])).is_err());
    }

    #[test]
    fn test_empty_values_are_ignored() {
        let config = Config::from_lookup(lookup(&[("CHUNK_SIZE", "  ")])).unwrap();
        assert_eq!(config.chunk_size, DEFAULT_CHUNK_SIZE);
    }
}
