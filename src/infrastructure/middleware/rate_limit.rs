// Fixed-window request limiter keyed by client address.

use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::Response,
};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::warn;

use crate::error::AppError;

/// Windows are pruned once the table grows past this many clients.
const PRUNE_THRESHOLD: usize = 10_000;

#[derive(Debug)]
pub struct RateLimiter {
    name: &'static str,
    max_requests: u32,
    window: Duration,
    windows: RwLock<HashMap<String, RateLimitWindow>>,
}

#[derive(Debug)]
struct RateLimitWindow {
    requests: u32,
    window_start: Instant,
}

impl RateLimiter {
    pub fn new(name: &'static str, max_requests: u32, window: Duration) -> Self {
        Self {
            name,
            max_requests,
            window,
            windows: RwLock::new(HashMap::new()),
        }
    }

    /// Counts the request and reports whether it is within the ceiling.
    pub async fn check_rate_limit(&self, identifier: &str) -> bool {
        let mut windows = self.windows.write().await;
        let now = Instant::now();

        if windows.len() > PRUNE_THRESHOLD {
            let window = self.window;
            windows.retain(|_, w| now.duration_since(w.window_start) < window);
        }

        let window = windows
            .entry(identifier.to_string())
            .or_insert(RateLimitWindow {
                requests: 0,
                window_start: now,
            });

        if now.duration_since(window.window_start) >= self.window {
            window.requests = 0;
            window.window_start = now;
        }

        if window.requests >= self.max_requests {
            false
        } else {
            window.requests += 1;
            true
        }
    }
}

/// First `X-Forwarded-For` hop, else the peer address.
pub fn client_key(request: &Request) -> String {
    let forwarded = request
        .headers()
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|hop| !hop.is_empty());

    if let Some(hop) = forwarded {
        return hop.to_string();
    }

    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

pub async fn rate_limit_middleware(
    State(limiter): State<Arc<RateLimiter>>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let key = client_key(&request);
    if !limiter.check_rate_limit(&key).await {
        warn!(limiter = limiter.name, client = %key, "Rate limit exceeded");
        return Err(AppError::TooManyRequests(
            "Too many requests, please try again later".to_string(),
        ));
    }
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    #[tokio::test]
    async fn ceiling_applies_per_client() {
        let limiter = RateLimiter::new("test", 2, Duration::from_secs(60));
        assert!(limiter.check_rate_limit("a").await);
        assert!(limiter.check_rate_limit("a").await);
        assert!(!limiter.check_rate_limit("a").await);
        assert!(limiter.check_rate_limit("b").await);
    }

    #[tokio::test]
    async fn window_resets() {
        let limiter = RateLimiter::new("test", 1, Duration::from_millis(20));
        assert!(limiter.check_rate_limit("a").await);
        assert!(!limiter.check_rate_limit("a").await);
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(limiter.check_rate_limit("a").await);
    }

    #[test]
    fn forwarded_header_wins() {
        let request = Request::builder()
            .header("x-forwarded-for", "203.0.113.9, 10.0.0.1")
            .body(Body::empty())
            .unwrap();
        assert_eq!(client_key(&request), "203.0.113.9");

        let request = Request::builder().body(Body::empty()).unwrap();
        assert_eq!(client_key(&request), "unknown");
    }
}
