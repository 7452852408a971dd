//! ABOUTME: Middleware for per-IP rate limiting and JSON body size limits
//! ABOUTME: Also resolves the client address behind trusted proxies

pub mod bodylimits;
pub mod client_ip;
pub mod ratelimit;
