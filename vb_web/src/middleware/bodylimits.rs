//! ABOUTME: Body size limit middleware with per-path overrides
//! ABOUTME: Rejects oversized JSON requests with a 413 envelope before the body is read

use crate::error::ApiError;
use actix_web::{
    body::EitherBody,
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    Error, ResponseError,
};
use futures_util::future::{ready, LocalBoxFuture, Ready};
use std::rc::Rc;
use tracing::{debug, warn};

/// Body size limits configuration
#[derive(Debug, Clone)]
pub struct BodyLimitsConfig {
    /// Default JSON body size limit in bytes
    pub default_json_limit: usize,
    /// Path prefix overrides, longest prefix wins
    pub path_overrides: Vec<(String, usize)>,
}

impl Default for BodyLimitsConfig {
    fn default() -> Self {
        Self::new(256 * 1024)
    }
}

impl From<&vb_config::BodyLimitsConfig> for BodyLimitsConfig {
    fn from(config: &vb_config::BodyLimitsConfig) -> Self {
        Self::new(config.json_limit)
    }
}

impl BodyLimitsConfig {
    pub fn new(default_json_limit: usize) -> Self {
        Self {
            default_json_limit,
            path_overrides: Vec::new(),
        }
    }

    pub fn with_override(mut self, prefix: impl Into<String>, limit: usize) -> Self {
        self.path_overrides.push((prefix.into(), limit));
        self
    }

    pub fn limit_for_path(&self, path: &str) -> usize {
        self.path_overrides
            .iter()
            .filter(|(prefix, _)| path.starts_with(prefix.as_str()))
            .max_by_key(|(prefix, _)| prefix.len())
            .map(|(_, limit)| *limit)
            .unwrap_or(self.default_json_limit)
    }
}

/// Body size limit middleware transform
pub struct BodyLimits {
    config: BodyLimitsConfig,
}

impl BodyLimits {
    pub fn new(config: BodyLimitsConfig) -> Self {
        Self { config }
    }
}

impl<S, B> Transform<S, ServiceRequest> for BodyLimits
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type InitError = ();
    type Transform = BodyLimitsMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(BodyLimitsMiddleware {
            service: Rc::new(service),
            config: self.config.clone(),
        }))
    }
}

pub struct BodyLimitsMiddleware<S> {
    service: Rc<S>,
    config: BodyLimitsConfig,
}

impl<S, B> Service<ServiceRequest> for BodyLimitsMiddleware<S>
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
        let limit = self.config.limit_for_path(req.path());

        Box::pin(async move {
            let content_length = req
                .headers()
                .get("content-length")
                .and_then(|h| h.to_str().ok())
                .and_then(|s| s.parse::<usize>().ok());

            // Chunked bodies are bounded later by the JSON extractor limit
            if let Some(length) = content_length {
                debug!(path = %req.path(), length, limit, "Body size check");
                if length > limit {
                    warn!(path = %req.path(), length, limit, "Body size limit exceeded");
                    let response = ApiError::payload_too_large(limit)
                        .with_details(serde_json::json!({ "received_size": length }))
                        .error_response();
                    let (req, _) = req.into_parts();
                    return Ok(ServiceResponse::new(req, response).map_into_right_body());
                }
            }

            let res = service.call(req).await?;
            Ok(res.map_into_left_body())
        })
    }
}
