//! DuckDuckGo Instant Answer API 백엔드
//!
//! API 키가 필요 없는 즉답 API입니다. 공식 결과(Results), 요약(Abstract),
//! 관련 주제(RelatedTopics, 중첩 그룹 평탄화) 순으로 결과를 만듭니다.
//! ref: https://duckduckgo.com/api

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use serde::Deserialize;

use super::{SearchBackend, SearchResult};
use crate::error::TransportError;

/// 기본 API 엔드포인트
pub const DUCKDUCKGO_API_URL: &str = "https://api.duckduckgo.com/";

/// DuckDuckGo 검색 백엔드
pub struct DuckDuckGoBackend {
    client: reqwest::Client,
    endpoint: String,
}

impl DuckDuckGoBackend {
    pub fn new() -> anyhow::Result<Self> {
        Self::with_endpoint(DUCKDUCKGO_API_URL)
    }

    /// 엔드포인트 지정 (프록시/테스트 서버)
    pub fn with_endpoint(endpoint: &str) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("autodidact/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(15))
            .build()
            .context("HTTP 클라이언트 생성 실패")?;

        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
        })
    }

    fn request_url(&self, query: &str) -> Result<url::Url, TransportError> {
        url::Url::parse_with_params(
            &self.endpoint,
            &[
                ("q", query),
                ("format", "json"),
                ("no_html", "1"),
                ("skip_disambig", "1"),
            ],
        )
        .map_err(|e| TransportError::Decode {
            url: self.endpoint.clone(),
            reason: e.to_string(),
        })
    }
}

// ============================================================================
// API Response
// ============================================================================

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct InstantAnswer {
    #[serde(rename = "Heading")]
    heading: String,
    #[serde(rename = "AbstractText")]
    abstract_text: String,
    #[serde(rename = "AbstractURL")]
    abstract_url: String,
    #[serde(rename = "AbstractSource")]
    abstract_source: String,
    #[serde(rename = "Results")]
    results: Vec<Topic>,
    #[serde(rename = "RelatedTopics")]
    related_topics: Vec<Topic>,
}

/// 단일 주제 또는 주제 그룹 (`Name` + `Topics`)
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Topic {
    #[serde(rename = "Text")]
    text: String,
    #[serde(rename = "FirstURL")]
    first_url: String,
    #[serde(rename = "Topics")]
    topics: Vec<Topic>,
}

impl Topic {
    fn flatten<'a>(&'a self, out: &mut Vec<&'a Topic>) {
        if self.topics.is_empty() {
            out.push(self);
        } else {
            for topic in &self.topics {
                topic.flatten(out);
            }
        }
    }
}

/// 응답 본문을 검색 결과로 변환
fn parse_instant_answer(body: &str, max_results: usize) -> serde_json::Result<Vec<SearchResult>> {
    let answer: InstantAnswer = serde_json::from_str(body)?;
    let mut results = Vec::new();

    let mut topics = Vec::new();
    for topic in &answer.results {
        topic.flatten(&mut topics);
    }

    for topic in topics.iter().filter(|t| !t.first_url.is_empty()) {
        results.push(topic_result(topic, "DuckDuckGo"));
    }

    if !answer.abstract_url.is_empty() && !answer.abstract_text.is_empty() {
        let source = if answer.abstract_source.is_empty() {
            "DuckDuckGo".to_string()
        } else {
            answer.abstract_source.clone()
        };
        results.push(SearchResult {
            title: answer.heading.clone(),
            url: answer.abstract_url.clone(),
            snippet: answer.abstract_text.clone(),
            source,
            relevance_score: 0.0,
        });
    }

    let mut related = Vec::new();
    for topic in &answer.related_topics {
        topic.flatten(&mut related);
    }
    for topic in related.iter().filter(|t| !t.first_url.is_empty()) {
        results.push(topic_result(topic, "DuckDuckGo"));
    }

    results.truncate(max_results);
    let count = results.len().max(1) as f32;
    for (rank, result) in results.iter_mut().enumerate() {
        result.relevance_score = 1.0 - rank as f32 / count;
    }

    Ok(results)
}

/// `Text`는 "제목 - 설명" 형태
fn topic_result(topic: &Topic, source: &str) -> SearchResult {
    let title = topic
        .text
        .split(" - ")
        .next()
        .unwrap_or(topic.text.as_str())
        .trim()
        .to_string();

    SearchResult {
        title,
        url: topic.first_url.clone(),
        snippet: topic.text.clone(),
        source: source.to_string(),
        relevance_score: 0.0,
    }
}

#[async_trait]
impl SearchBackend for DuckDuckGoBackend {
    async fn search(
        &self,
        query: &str,
        max_results: usize,
    ) -> Result<Vec<SearchResult>, TransportError> {
        let url = self.request_url(query)?;
        let url_str = url.to_string();
        tracing::debug!("DuckDuckGo request: {}", url_str);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|source| TransportError::Request {
                url: url_str.clone(),
                source,
            })?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(TransportError::Status {
                url: url_str,
                status: status.as_u16(),
            });
        }

        let body = response.text().await.map_err(|e| TransportError::Decode {
            url: url_str.clone(),
            reason: e.to_string(),
        })?;

        parse_instant_answer(&body, max_results).map_err(|e| TransportError::Decode {
            url: url_str,
            reason: e.to_string(),
        })
    }

    fn name(&self) -> &str {
        "duckduckgo"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "Heading": "Python (programming language)",
        "AbstractText": "Python is a high-level, general-purpose programming language.",
        "AbstractURL": "https://en.wikipedia.org/wiki/Python_(programming_language)",
        "AbstractSource": "Wikipedia",
        "Results": [
            {"Text": "Official site - Python", "FirstURL": "https://www.python.org/"}
        ],
        "RelatedTopics": [
            {"Text": "CPython - The reference implementation", "FirstURL": "https://duckduckgo.com/CPython"},
            {"Name": "See also", "Topics": [
                {"Text": "PyPy - A fast implementation", "FirstURL": "https://duckduckgo.com/PyPy"},
                {"Text": "no url here", "FirstURL": ""}
            ]}
        ]
    }"#;

    #[test]
    fn test_parse_order_and_flattening() {
        let results = parse_instant_answer(SAMPLE, 10).unwrap();
        let urls: Vec<&str> = results.iter().map(|r| r.url.as_str()).collect();

        assert_eq!(
            urls,
            vec![
                "https://www.python.org/",
                "https://en.wikipedia.org/wiki/Python_(programming_language)",
                "https://duckduckgo.com/CPython",
                "https://duckduckgo.com/PyPy",
            ]
        );
        assert_eq!(results[1].source, "Wikipedia");
        assert_eq!(results[2].title, "CPython");
    }

    #[test]
    fn test_parse_scores_decrease() {
        let results = parse_instant_answer(SAMPLE, 10).unwrap();
        assert!((results[0].relevance_score - 1.0).abs() < 1e-6);
        for pair in results.windows(2) {
            assert!(pair[0].relevance_score > pair[1].relevance_score);
        }
        assert!(results.iter().all(|r| r.relevance_score > 0.0));
    }

    #[test]
    fn test_parse_truncates() {
        let results = parse_instant_answer(SAMPLE, 2).unwrap();
        assert_eq!(results.len(), 2);
    }

    #[test]
    fn test_parse_empty_answer() {
        let results = parse_instant_answer(r#"{"Heading": "", "RelatedTopics": []}"#, 5).unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn test_parse_invalid_json() {
        assert!(parse_instant_answer("<html>rate limited</html>", 5).is_err());
    }

    #[test]
    fn test_request_url_encodes_query() {
        let backend = DuckDuckGoBackend::new().unwrap();
        let url = backend.request_url("python decorators").unwrap();
        assert!(url.as_str().starts_with(DUCKDUCKGO_API_URL));
        assert!(url.as_str().contains("q=python+decorators"));
        assert!(url.as_str().contains("format=json"));
    }
}
