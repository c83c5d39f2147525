//! Rate Limiter - 외부 호출 간 최소 딜레이
//!
//! 프로세스 전역 타임스탬프 대신 호출자(검색 프로바이더, 임베딩 클라이언트)가
//! 직접 소유하는 객체입니다. 소유자는 `tokio::sync::Mutex`로 감싸서
//! 한 번에 하나의 호출만 `acquire`하도록 합니다.

use std::time::{Duration, Instant};

/// 최소 딜레이 + (선택) 윈도우당 최대 요청 수
#[derive(Debug)]
pub struct RateLimiter {
    min_delay: Duration,
    last_request: Option<Instant>,
    window: Option<(u32, Duration)>,
    requests: Vec<Instant>,
}

impl RateLimiter {
    /// 최소 딜레이만 적용하는 리미터
    pub fn new(min_delay: Duration) -> Self {
        Self {
            min_delay,
            last_request: None,
            window: None,
            requests: Vec::new(),
        }
    }

    /// 윈도우 제한 추가 (예: 60초에 60회)
    pub fn with_window(mut self, max_requests: u32, window: Duration) -> Self {
        self.window = Some((max_requests, window));
        self
    }

    /// 다음 호출까지 남은 대기 시간 (대기 불필요 시 None)
    pub fn remaining(&self) -> Option<Duration> {
        let last = self.last_request?;
        let elapsed = last.elapsed();
        (elapsed < self.min_delay).then(|| self.min_delay - elapsed)
    }

    /// 요청 가능할 때까지 대기 후 현재 요청 기록
    pub async fn acquire(&mut self) {
        // 1. 최소 딜레이 (버스트 방지)
        if let Some(wait_time) = self.remaining() {
            tracing::debug!("Min delay: waiting {:?}", wait_time);
            tokio::time::sleep(wait_time).await;
        }

        // 2. 윈도우 제한
        if let Some((max_requests, window)) = self.window {
            let now = Instant::now();
            self.requests.retain(|&t| now.duration_since(t) < window);

            if self.requests.len() >= max_requests as usize {
                if let Some(&oldest) = self.requests.first() {
                    let wait_time = window.saturating_sub(now.duration_since(oldest));
                    if !wait_time.is_zero() {
                        tracing::debug!("Rate limit reached, waiting {:?}", wait_time);
                        tokio::time::sleep(wait_time).await;
                    }
                    let now = Instant::now();
                    self.requests.retain(|&t| now.duration_since(t) < window);
                }
            }
        }

        // 3. 현재 요청 기록
        let now = Instant::now();
        if self.window.is_some() {
            self.requests.push(now);
        }
        self.last_request = Some(now);
    }
}
