//! 웹 검색 모듈 - 폴백 체인을 가진 검색 프로바이더
//!
//! 1. 주 백엔드 (DuckDuckGo Instant Answer API) 호출 전 rate limiter 대기
//! 2. 전송 실패 / 200 이외 응답 / 결과 0건이면 폴백 백엔드 (사이트 디렉토리)
//! 3. `focus_on`이 있으면 수집 후 재채점, 0점 제거, 내림차순 정렬
//!
//! [`WebSearch::search`]는 에러를 올리지 않고 항상 목록을 반환합니다.

mod directory;
mod duckduckgo;

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::error::TransportError;
use crate::ratelimit::RateLimiter;

pub use directory::{Site, SiteDirectory, DEFAULT_SITES};
pub use duckduckgo::{DuckDuckGoBackend, DUCKDUCKGO_API_URL};

// ============================================================================
// Types
// ============================================================================

/// 검색 결과
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub title: String,
    pub url: String,
    pub snippet: String,
    /// 결과 출처 (API 이름 또는 사이트 이름)
    pub source: String,
    /// 관련도 (0.0 ~ 1.0)
    pub relevance_score: f32,
}

// ============================================================================
// SearchBackend Trait
// ============================================================================

/// 검색 백엔드 트레이트
#[async_trait]
pub trait SearchBackend: Send + Sync {
    /// 최대 `max_results`개의 결과 반환
    async fn search(
        &self,
        query: &str,
        max_results: usize,
    ) -> Result<Vec<SearchResult>, TransportError>;

    /// 백엔드 이름
    fn name(&self) -> &str;
}

// ============================================================================
// WebSearch
// ============================================================================

/// 주 백엔드 + 폴백 백엔드 조합
pub struct WebSearch {
    primary: Box<dyn SearchBackend>,
    fallback: Box<dyn SearchBackend>,
    rate_limiter: Mutex<RateLimiter>,
}

impl WebSearch {
    /// DuckDuckGo + 기본 사이트 디렉토리
    pub fn new(min_delay: Duration) -> anyhow::Result<Self> {
        Ok(Self::with_backends(
            Box::new(DuckDuckGoBackend::new()?),
            Box::new(SiteDirectory::default()),
            min_delay,
        ))
    }

    /// 백엔드 지정
    pub fn with_backends(
        primary: Box<dyn SearchBackend>,
        fallback: Box<dyn SearchBackend>,
        min_delay: Duration,
    ) -> Self {
        Self {
            primary,
            fallback,
            rate_limiter: Mutex::new(RateLimiter::new(min_delay)),
        }
    }

    /// 검색 실행
    ///
    /// # Arguments
    /// * `query` - 검색어
    /// * `max_results` - 최대 결과 수 (0이면 호출 없이 빈 목록)
    /// * `focus_on` - 재채점에 사용할 초점 용어
    pub async fn search(
        &self,
        query: &str,
        max_results: usize,
        focus_on: Option<&[String]>,
    ) -> Vec<SearchResult> {
        if max_results == 0 {
            return vec![];
        }

        {
            let mut limiter = self.rate_limiter.lock().await;
            limiter.acquire().await;
        }

        let results = match self.primary.search(query, max_results).await {
            Ok(mut results) if !results.is_empty() => {
                results.truncate(max_results);
                tracing::info!(
                    "{} returned {} results for {:?}",
                    self.primary.name(),
                    results.len(),
                    query
                );
                results
            }
            Ok(_) => {
                tracing::info!(
                    "{} returned no results for {:?}, using {}",
                    self.primary.name(),
                    query,
                    self.fallback.name()
                );
                self.fallback_results(query, max_results).await
            }
            Err(e) => {
                tracing::warn!(
                    "{} failed ({}), using {}",
                    self.primary.name(),
                    e,
                    self.fallback.name()
                );
                self.fallback_results(query, max_results).await
            }
        };

        match focus_on {
            Some(terms) if !terms.is_empty() => apply_focus(results, terms),
            _ => results,
        }
    }

    async fn fallback_results(&self, query: &str, max_results: usize) -> Vec<SearchResult> {
        match self.fallback.search(query, max_results).await {
            Ok(mut results) => {
                results.truncate(max_results);
                results
            }
            Err(e) => {
                tracing::warn!("{} failed: {}", self.fallback.name(), e);
                vec![]
            }
        }
    }
}

/// 초점 용어 기반 재채점
///
/// 점수 = (제목+스니펫에 포함된 용어 수) / 전체 용어 수. 대소문자 무시.
pub fn apply_focus(results: Vec<SearchResult>, focus_on: &[String]) -> Vec<SearchResult> {
    let terms: Vec<String> = focus_on.iter().map(|t| t.to_lowercase()).collect();
    if terms.is_empty() {
        return results;
    }

    let mut scored: Vec<SearchResult> = results
        .into_iter()
        .filter_map(|mut result| {
            let haystack = format!("{} {}", result.title, result.snippet).to_lowercase();
            let hits = terms.iter().filter(|t| haystack.contains(t.as_str())).count();
            if hits == 0 {
                return None;
            }
            result.relevance_score = hits as f32 / terms.len() as f32;
            Some(result)
        })
        .collect();

    scored.sort_by(|a, b| {
        b.relevance_score
            .partial_cmp(&a.relevance_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    scored
}

// ============================================================================
// Tests
// ============================================================================
