//! 웹 스크래퍼 모듈 - URL 콘텐츠 추출
//!
//! HTML을 받아 script/style/nav/footer/header 서브트리를 제거하고
//! 남은 텍스트를 공백 하나로 이어 붙인 평문으로 만듭니다.
//!
//! `extract_content`는 실패해도 에러를 올리지 않습니다 (best-effort).
//! 빈 문자열은 "콘텐츠 없음"을 뜻하며 원인은 로그에만 남습니다.

use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use scraper::{ElementRef, Html, Node, Selector};
use tokio::sync::Mutex;

use crate::error::TransportError;

/// 텍스트 추출 시 통째로 제외하는 요소
const SKIPPED_ELEMENTS: &[&str] = &[
    "script", "style", "nav", "footer", "header", "noscript", "template",
];

const USER_AGENT: &str = concat!("autodidact/", env!("CARGO_PKG_VERSION"));

/// 스크랩된 콘텐츠
#[derive(Debug, Clone)]
pub struct ScrapedContent {
    /// 페이지 제목
    pub title: Option<String>,
    /// 본문 텍스트 (HTML 태그 제거됨)
    pub content: String,
    /// 원본 URL
    pub url: String,
}

// ============================================================================
// ContentFetcher Trait
// ============================================================================

/// URL → 평문 변환 인터페이스
#[async_trait]
pub trait ContentFetcher: Send + Sync {
    /// 콘텐츠 추출 (실패 시 빈 문자열)
    async fn extract_content(&self, url: &str) -> String;

    /// 보유한 연결 자원 해제
    async fn close(&self) {}
}

// ============================================================================
// WebScraper
// ============================================================================

/// 웹 스크래퍼
///
/// HTTP 클라이언트는 첫 요청 시 생성되어 이후 호출에서 재사용됩니다.
/// 종료 시 [`WebScraper::close`]로 명시적으로 해제합니다.
pub struct WebScraper {
    client: Mutex<Option<reqwest::Client>>,
    timeout: Duration,
}

impl WebScraper {
    /// 새 스크래퍼 생성 (클라이언트는 지연 생성)
    pub fn new() -> Self {
        Self::with_timeout(Duration::from_secs(30))
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            client: Mutex::new(None),
            timeout,
        }
    }

    /// 공유 클라이언트 획득 (없으면 생성)
    async fn client(&self) -> reqwest::Client {
        let mut guard = self.client.lock().await;
        if let Some(client) = guard.as_ref() {
            return client.clone();
        }

        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(self.timeout)
            .build()
            .unwrap_or_else(|e| {
                tracing::error!("HTTP client build failed, using defaults: {}", e);
                reqwest::Client::new()
            });
        tracing::debug!("HTTP client initialized");

        *guard = Some(client.clone());
        client
    }

    /// 클라이언트 초기화 여부
    pub async fn is_open(&self) -> bool {
        self.client.lock().await.is_some()
    }

    /// 공유 클라이언트 해제
    pub async fn close(&self) {
        if self.client.lock().await.take().is_some() {
            tracing::info!("Web scraper session closed");
        }
    }

    /// URL 요청 후 본문 반환 (200 이외는 에러)
    pub async fn fetch_html(&self, url: &str) -> Result<String, TransportError> {
        let client = self.client().await;

        let response = client
            .get(url)
            .send()
            .await
            .map_err(|source| TransportError::Request {
                url: url.to_string(),
                source,
            })?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(TransportError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        response.text().await.map_err(|e| TransportError::Decode {
            url: url.to_string(),
            reason: e.to_string(),
        })
    }

    /// URL에서 제목과 본문 추출
    pub async fn scrape(&self, url: &str) -> Result<ScrapedContent, TransportError> {
        tracing::info!("Scraping: {}", url);

        let html = self.fetch_html(url).await?;
        let document = Html::parse_document(&html);

        Ok(ScrapedContent {
            title: extract_title(&document),
            content: document_text(&document),
            url: url.to_string(),
        })
    }
}

impl Default for WebScraper {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ContentFetcher for WebScraper {
    async fn extract_content(&self, url: &str) -> String {
        match self.scrape(url).await {
            Ok(scraped) => scraped.content,
            Err(e) => {
                tracing::warn!("Failed to extract content: {}", e);
                String::new()
            }
        }
    }

    async fn close(&self) {
        WebScraper::close(self).await
    }
}

// ============================================================================
// HTML → Text
// ============================================================================

/// HTML 문자열을 평문으로 변환
pub fn html_to_text(html: &str) -> String {
    document_text(&Html::parse_document(html))
}

/// 제목 추출 (`<title>`, 없으면 첫 `<h1>`)
fn extract_title(document: &Html) -> Option<String> {
    for selector_str in ["title", "h1"] {
        if let Ok(selector) = Selector::parse(selector_str) {
            if let Some(element) = document.select(&selector).next() {
                let title = collapse_whitespace(&element.text().collect::<String>());
                if !title.is_empty() {
                    return Some(title);
                }
            }
        }
    }
    None
}

/// 문서 전체 텍스트 (제외 요소 서브트리 생략)
fn document_text(document: &Html) -> String {
    let mut parts = Vec::new();
    collect_text(document.root_element(), &mut parts);
    collapse_whitespace(&parts.concat())
}

fn collect_text<'a>(element: ElementRef<'a>, parts: &mut Vec<&'a str>) {
    if SKIPPED_ELEMENTS.contains(&element.value().name()) {
        return;
    }

    for child in element.children() {
        match child.value() {
            Node::Text(text) => parts.push(&**text),
            Node::Element(_) => {
                if let Some(child_element) = ElementRef::wrap(child) {
                    collect_text(child_element, parts);
                }
            }
            _ => {}
        }
    }
}

/// 공백 패턴 (프로세스당 한 번 컴파일)
fn whitespace_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\s+").ok()).as_ref()
}

/// 연속 공백/빈 줄을 공백 하나로
fn collapse_whitespace(text: &str) -> String {
    match whitespace_pattern() {
        Some(re) => re.replace_all(text, " ").trim().to_string(),
        None => text.split_whitespace().collect::<Vec<_>>().join(" "),
    }
}
