//! ABOUTME: Fixed-window rate limiting middleware keyed by client IP
//! ABOUTME: Rejects excess requests with a 429 envelope and Retry-After header

use crate::{error::ApiError, middleware::client_ip::resolve_client_ip};
use actix_web::{
    body::EitherBody,
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    http::header::{HeaderName, HeaderValue},
    Error, ResponseError,
};
use dashmap::DashMap;
use futures_util::future::{ready, LocalBoxFuture, Ready};
use std::rc::Rc;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Rate limiting configuration
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Maximum requests per IP per window
    pub requests_per_window: u32,
    pub window_duration: Duration,
    /// Peers allowed to set X-Forwarded-For / X-Real-IP
    pub trusted_proxies: Vec<String>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_window: 60,
            window_duration: Duration::from_secs(60),
            trusted_proxies: vec!["127.0.0.1".to_string(), "::1".to_string()],
        }
    }
}

impl From<&vb_config::RateLimitConfig> for RateLimitConfig {
    fn from(config: &vb_config::RateLimitConfig) -> Self {
        Self {
            requests_per_window: config.requests_per_minute,
            window_duration: Duration::from_secs(config.window_seconds),
            trusted_proxies: config.trusted_proxies.clone(),
        }
    }
}

#[derive(Debug, Clone)]
struct WindowEntry {
    count: u32,
    window_start: Instant,
}

/// In-memory counters shared by every worker's middleware instance
#[derive(Debug, Clone)]
pub struct RateLimiter {
    entries: Arc<DashMap<String, WindowEntry>>,
    max_requests: u32,
    window_duration: Duration,
}

impl RateLimiter {
    pub fn new(max_requests: u32, window_duration: Duration) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            max_requests,
            window_duration,
        }
    }

    /// Count a request for `key`; returns (allowed, remaining, time until reset)
    pub fn check(&self, key: &str) -> (bool, u32, Duration) {
        let now = Instant::now();

        let mut entry = self
            .entries
            .entry(key.to_string())
            .or_insert(WindowEntry {
                count: 0,
                window_start: now,
            });

        if now.duration_since(entry.window_start) >= self.window_duration {
            entry.count = 0;
            entry.window_start = now;
        }

        if entry.count < self.max_requests {
            entry.count += 1;
            (true, self.max_requests - entry.count, Duration::ZERO)
        } else {
            let reset = self
                .window_duration
                .saturating_sub(now.duration_since(entry.window_start));
            (false, 0, reset)
        }
    }

    /// Drop entries whose window has passed
    pub fn prune(&self) {
        let now = Instant::now();
        self.entries
            .retain(|_, e| now.duration_since(e.window_start) < self.window_duration);
    }
}

/// Rate limiting middleware transform
pub struct RateLimit {
    config: RateLimitConfig,
    limiter: RateLimiter,
}

impl RateLimit {
    pub fn new(config: RateLimitConfig) -> Self {
        let limiter = RateLimiter::new(config.requests_per_window, config.window_duration);
        Self { config, limiter }
    }

    /// Share counters with other instances, e.g. across server workers
    pub fn with_limiter(config: RateLimitConfig, limiter: RateLimiter) -> Self {
        Self { config, limiter }
    }
}

impl<S, B> Transform<S, ServiceRequest> for RateLimit
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type InitError = ();
    type Transform = RateLimitMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(RateLimitMiddleware {
            service: Rc::new(service),
            config: self.config.clone(),
            limiter: self.limiter.clone(),
        }))
    }
}

pub struct RateLimitMiddleware<S> {
    service: Rc<S>,
    config: RateLimitConfig,
    limiter: RateLimiter,
}

impl<S, B> Service<ServiceRequest> for RateLimitMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = Rc::clone(&self.service);
        let limiter = self.limiter.clone();
        let trusted = self.config.trusted_proxies.clone();

        Box::pin(async move {
            let client_ip = resolve_client_ip(req.peer_addr(), req.headers(), &trusted);
            let (allowed, remaining, reset) = limiter.check(&client_ip);

            if allowed {
                debug!(ip = %client_ip, remaining, "Rate limit passed");
                let res = service.call(req).await?;
                return Ok(res.map_into_left_body());
            }

            // Round up so clients never retry inside the window
            let retry_after = reset.as_secs() + u64::from(reset.subsec_nanos() > 0);
            warn!(ip = %client_ip, retry_after, "Rate limit exceeded");

            let mut response = ApiError::rate_limited(retry_after).error_response();
            if let Ok(value) = HeaderValue::from_str(&retry_after.to_string()) {
                response
                    .headers_mut()
                    .insert(HeaderName::from_static("retry-after"), value);
            }
            response.headers_mut().insert(
                HeaderName::from_static("x-ratelimit-remaining"),
                HeaderValue::from_static("0"),
            );

            let (req, _) = req.into_parts();
            Ok(ServiceResponse::new(req, response).map_into_right_body())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{test as actix_test, web, App, HttpResponse};

    #[test]
    fn test_limiter_window() {
        let limiter = RateLimiter::new(2, Duration::from_secs(60));
        assert_eq!(limiter.check("a"), (true, 1, Duration::ZERO));
        assert!(limiter.check("a").0);
        let (allowed, remaining, reset) = limiter.check("a");
        assert!(!allowed);
        assert_eq!(remaining, 0);
        assert!(reset > Duration::ZERO);

        // Separate key, separate budget
        assert!(limiter.check("b").0);
    }

    #[test]
    fn test_limiter_resets_after_window() {
        let limiter = RateLimiter::new(1, Duration::from_millis(20));
        assert!(limiter.check("a").0);
        assert!(!limiter.check("a").0);
        std::thread::sleep(Duration::from_millis(30));
        assert!(limiter.check("a").0);

        std::thread::sleep(Duration::from_millis(30));
        limiter.prune();
        assert!(limiter.entries.is_empty());
    }

    #[actix_web::test]
    async fn test_middleware_returns_429_envelope() {
        let config = RateLimitConfig {
            requests_per_window: 1,
            window_duration: Duration::from_secs(60),
            trusted_proxies: Vec::new(),
        };
        let app = actix_test::init_service(
            App::new()
                .wrap(RateLimit::new(config))
                .route("/", web::get().to(|| async { HttpResponse::Ok().finish() })),
        )
        .await;

        let req = actix_test::TestRequest::get()
            .uri("/")
            .peer_addr("192.0.2.10:4000".parse().unwrap())
            .to_request();
        assert!(actix_test::call_service(&app, req).await.status().is_success());

        let req = actix_test::TestRequest::get()
            .uri("/")
            .peer_addr("192.0.2.10:4000".parse().unwrap())
            .to_request();
        let resp = actix_test::call_service(&app, req).await;
        assert_eq!(resp.status(), 429);
        assert!(resp.headers().contains_key("retry-after"));
        let body: serde_json::Value = actix_test::read_body_json(resp).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["error"]["code"], "rate_limited");
    }
}
