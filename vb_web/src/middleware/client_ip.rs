//! Client address resolution with trusted proxy validation.

use actix_web::{http::header::HeaderMap, HttpRequest};
use std::net::SocketAddr;
use tracing::{debug, warn};

/// Forwarding headers are honored only when the peer is a trusted proxy
pub fn resolve_client_ip(
    peer: Option<SocketAddr>,
    headers: &HeaderMap,
    trusted_proxies: &[String],
) -> String {
    let peer_ip = peer
        .map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string());

    let is_trusted_proxy = trusted_proxies.iter().any(|trusted| trusted == &peer_ip);

    if is_trusted_proxy {
        let forwarded = headers
            .get("x-forwarded-for")
            .and_then(|h| h.to_str().ok())
            .and_then(|s| s.split(',').next())
            .map(str::trim)
            .filter(|s| !s.is_empty());
        if let Some(ip) = forwarded {
            debug!("Using X-Forwarded-For IP: {} from trusted proxy: {}", ip, peer_ip);
            return ip.to_string();
        }

        let real_ip = headers
            .get("x-real-ip")
            .and_then(|h| h.to_str().ok())
            .map(str::trim)
            .filter(|s| !s.is_empty());
        if let Some(ip) = real_ip {
            debug!("Using X-Real-IP: {} from trusted proxy: {}", ip, peer_ip);
            return ip.to_string();
        }
    } else if headers.contains_key("x-forwarded-for") || headers.contains_key("x-real-ip") {
        warn!("Ignoring proxy headers from untrusted IP: {}", peer_ip);
    }

    peer_ip
}

/// Client address of a request as seen by handlers
pub fn client_ip(req: &HttpRequest, trusted_proxies: &[String]) -> String {
    resolve_client_ip(req.peer_addr(), req.headers(), trusted_proxies)
}
