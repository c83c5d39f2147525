//! 사이트 디렉토리 - 네트워크 없는 폴백 검색 백엔드
//!
//! 잘 알려진 문서/커뮤니티 사이트 목록에서 검색 URL을 만들어
//! 결정적인 결과를 생성합니다. 순서대로 관련도가 0.1씩 감소합니다.

use async_trait::async_trait;

use super::{SearchBackend, SearchResult};
use crate::error::TransportError;

/// 폴백 대상 사이트
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Site {
    pub name: &'static str,
    /// 검색어가 이어 붙는 URL 접두사
    pub search_url: &'static str,
}

/// 기본 사이트 목록 (순서 = 우선순위)
pub const DEFAULT_SITES: &[Site] = &[
    Site {
        name: "Python Documentation",
        search_url: "https://docs.python.org/3/search.html?q=",
    },
    Site {
        name: "MDN Web Docs",
        search_url: "https://developer.mozilla.org/en-US/search?q=",
    },
    Site {
        name: "Stack Overflow",
        search_url: "https://stackoverflow.com/search?q=",
    },
    Site {
        name: "GitHub",
        search_url: "https://github.com/search?q=",
    },
    Site {
        name: "Real Python",
        search_url: "https://realpython.com/search?q=",
    },
    Site {
        name: "GeeksforGeeks",
        search_url: "https://www.geeksforgeeks.org/search/?gq=",
    },
    Site {
        name: "W3Schools",
        search_url: "https://www.w3schools.com/search/search_result.php?q=",
    },
    Site {
        name: "DEV Community",
        search_url: "https://dev.to/search?q=",
    },
];

/// 사이트 디렉토리 백엔드
#[derive(Debug, Clone)]
pub struct SiteDirectory {
    sites: Vec<Site>,
}

impl SiteDirectory {
    /// 결정적 결과 생성
    pub fn results(&self, query: &str, max_results: usize) -> Vec<SearchResult> {
        let encoded: String = url::form_urlencoded::byte_serialize(query.trim().as_bytes()).collect();

        self.sites
            .iter()
            .take(max_results)
            .enumerate()
            .map(|(rank, site)| SearchResult {
                title: format!("{} - {}", query.trim(), site.name),
                url: format!("{}{}", site.search_url, encoded),
                snippet: format!("{} results for \"{}\"", site.name, query.trim()),
                source: site.name.to_string(),
                relevance_score: (0.9 - 0.1 * rank as f32).max(0.1),
            })
            .collect()
    }
}

impl Default for SiteDirectory {
    fn default() -> Self {
        Self {
            sites: DEFAULT_SITES.to_vec(),
        }
    }
}

#[async_trait]
impl SearchBackend for SiteDirectory {
    async fn search(
        &self,
        query: &str,
        max_results: usize,
    ) -> Result<Vec<SearchResult>, TransportError> {
        Ok(self.results(query, max_results))
    }

    fn name(&self) -> &str {
        "site-directory"
    }
}
