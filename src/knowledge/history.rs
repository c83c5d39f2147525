//! Learning Log - rusqlite 기반 학습 실행 기록
//!
//! `learn` 호출 한 번마다 한 행을 남깁니다.
//! 저장 위치: <data_dir>/history.db

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OpenFlags};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// Types
// ============================================================================

/// 학습 실행 기록
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearningRun {
    pub id: String,
    pub topic: String,
    /// 학습 깊이 (소문자)
    pub depth: String,
    /// 요청된(또는 검색으로 찾은) 소스 수
    pub sources_requested: usize,
    /// 실제로 콘텐츠를 얻은 소스 수
    pub sources_used: usize,
    pub chunk_count: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl LearningRun {
    /// 새 실행 ID로 기록 생성 (종료 시각 = 현재)
    pub fn new(topic: &str, depth: &str, started_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            topic: topic.to_string(),
            depth: depth.to_string(),
            sources_requested: 0,
            sources_used: 0,
            chunk_count: 0,
            started_at,
            finished_at: Utc::now(),
        }
    }
}

// ============================================================================
// LearningLog
// ============================================================================

/// 학습 기록 저장소
pub struct LearningLog {
    conn: Arc<Mutex<Connection>>,
    db_path: PathBuf,
}

impl LearningLog {
    /// 기록 DB 열기 (없으면 생성)
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent).context("Failed to create history directory")?;
            }
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .context("Failed to open SQLite database")?;

        let log = Self {
            conn: Arc::new(Mutex::new(conn)),
            db_path: path.to_path_buf(),
        };

        log.initialize()?;
        Ok(log)
    }

    /// 메모리 DB (테스트용)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        let log = Self {
            conn: Arc::new(Mutex::new(conn)),
            db_path: PathBuf::from(":memory:"),
        };
        log.initialize()?;
        Ok(log)
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// 스키마 초기화
    fn initialize(&self) -> Result<()> {
        let conn = self.conn.lock().map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS learning_runs (
                id TEXT PRIMARY KEY,
                topic TEXT NOT NULL,
                depth TEXT NOT NULL,
                sources_requested INTEGER NOT NULL,
                sources_used INTEGER NOT NULL,
                chunk_count INTEGER NOT NULL,
                started_at TEXT NOT NULL,
                finished_at TEXT NOT NULL
            )",
            [],
        )
        .context("Failed to create learning_runs table")?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_learning_runs_started ON learning_runs(started_at)",
            [],
        )
        .context("Failed to create started_at index")?;

        tracing::debug!("Learning log initialized at {:?}", self.db_path);
        Ok(())
    }

    /// 실행 기록 추가
    pub fn record(&self, run: &LearningRun) -> Result<()> {
        let conn = self.conn.lock().map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;

        conn.execute(
            "INSERT INTO learning_runs
                (id, topic, depth, sources_requested, sources_used, chunk_count, started_at, finished_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                run.id,
                run.topic,
                run.depth,
                run.sources_requested as i64,
                run.sources_used as i64,
                run.chunk_count as i64,
                format_datetime(&run.started_at),
                format_datetime(&run.finished_at),
            ],
        )
        .context("Failed to insert learning run")?;

        Ok(())
    }

    /// 최근 실행 기록 (최신순)
    pub fn recent(&self, limit: usize) -> Result<Vec<LearningRun>> {
        let conn = self.conn.lock().map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;

        let mut stmt = conn.prepare(
            "SELECT id, topic, depth, sources_requested, sources_used, chunk_count, started_at, finished_at
             FROM learning_runs
             ORDER BY started_at DESC, rowid DESC
             LIMIT ?1",
        )?;

        let rows = stmt.query_map(params![limit as i64], |row| {
            Ok(LearningRun {
                id: row.get(0)?,
                topic: row.get(1)?,
                depth: row.get(2)?,
                sources_requested: row.get::<_, i64>(3)? as usize,
                sources_used: row.get::<_, i64>(4)? as usize,
                chunk_count: row.get::<_, i64>(5)? as usize,
                started_at: parse_datetime(row.get::<_, String>(6)?),
                finished_at: parse_datetime(row.get::<_, String>(7)?),
            })
        })?;

        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    /// 전체 실행 횟수
    pub fn count(&self) -> Result<usize> {
        let conn = self.conn.lock().map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM learning_runs", [], |row| row.get(0))
            .context("Failed to count learning runs")?;

        Ok(count as usize)
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// 정렬 가능한 고정 폭 RFC3339 (나노초, `Z`)
fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

/// RFC3339 문자열을 DateTime<Utc>로 파싱
fn parse_datetime(s: String) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tempfile::TempDir;

    fn run(topic: &str, started_at: DateTime<Utc>) -> LearningRun {
        let mut run = LearningRun::new(topic, "intermediate", started_at);
        run.sources_requested = 3;
        run.sources_used = 2;
        run.chunk_count = 7;
        run
    }

    #[test]
    fn test_record_and_recent() {
        let log = LearningLog::open_in_memory().unwrap();
        let now = Utc::now();

        log.record(&run("old", now - Duration::minutes(5))).unwrap();
        log.record(&run("new", now)).unwrap();

        let runs = log.recent(10).unwrap();
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].topic, "new");
        assert_eq!(runs[1].topic, "old");
        assert_eq!(runs[0].chunk_count, 7);
        assert_eq!(runs[0].depth, "intermediate");
        assert_eq!(log.count().unwrap(), 2);
    }

    #[test]
    fn test_recent_limit() {
        let log = LearningLog::open_in_memory().unwrap();
        for i in 0..5 {
            log.record(&run(&format!("t{}", i), Utc::now())).unwrap();
        }
        assert_eq!(log.recent(3).unwrap().len(), 3);
    }

    #[test]
    fn test_unique_ids() {
        let a = LearningRun::new("t", "beginner", Utc::now());
        let b = LearningRun::new("t", "beginner", Utc::now());
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_persists_across_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("history.db");

        let original = run("rust", Utc::now());
        {
            let log = LearningLog::open(&path).unwrap();
            log.record(&original).unwrap();
        }

        let log = LearningLog::open(&path).unwrap();
        let runs = log.recent(1).unwrap();
        assert_eq!(runs[0].id, original.id);
        assert_eq!(runs[0].started_at, original.started_at);
    }
}
