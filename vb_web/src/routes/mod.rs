//! ABOUTME: Declarative route table for the /api/v1 surface
//! ABOUTME: Maps method and path to handlers in one place

pub mod audit;
pub mod firewall;
pub mod health;
pub mod scans;
pub mod tools;
pub mod webhooks;

use actix_web::web;

/// Routes mounted under `/api/v1`, in precedence order
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health::health))
        // Network and security tools
        .route("/tools/dns-lookup", web::post().to(tools::dns_lookup))
        .route("/tools/ping", web::post().to(tools::ping))
        .route("/tools/traceroute", web::post().to(tools::traceroute))
        .route("/tools/whois", web::post().to(tools::whois))
        .route("/tools/ssl-check", web::post().to(tools::ssl_check))
        .route("/tools/port-scan", web::post().to(tools::port_scan))
        .route("/tools/rbl-check", web::post().to(tools::rbl_check))
        .route("/tools/hash", web::post().to(tools::hash_analyze))
        // Stored firewall configurations
        .service(
            web::resource("/firewall/configs")
                .route(web::get().to(firewall::list_configs))
                .route(web::post().to(firewall::create_config)),
        )
        .service(
            web::resource("/firewall/configs/{id}")
                .route(web::get().to(firewall::get_config))
                .route(web::put().to(firewall::update_config))
                .route(web::delete().to(firewall::delete_config)),
        )
        // System scans
        .service(
            web::resource("/scans")
                .route(web::get().to(scans::list_scans))
                .route(web::post().to(scans::create_scan)),
        )
        .route("/scans/{id}", web::get().to(scans::get_scan))
        // Webhooks
        .service(
            web::resource("/webhooks")
                .route(web::get().to(webhooks::list_webhooks))
                .route(web::post().to(webhooks::create_webhook)),
        )
        .route("/webhooks/{id}", web::delete().to(webhooks::delete_webhook))
        .route(
            "/webhooks/{id}/receive",
            web::post().to(webhooks::receive_webhook),
        )
        // Audit trail
        .route("/audit-logs", web::get().to(audit::list_audit_logs));
}
