//! ABOUTME: Webhook signing, verification and outbound delivery
//! ABOUTME: HMAC-SHA256 signatures with a timestamp to bound replay

pub mod dispatcher;
pub mod signature;

pub use dispatcher::{DeliveryResult, WebhookDispatcher};
pub use signature::{sign, verify, SignatureError, SIGNATURE_HEADER};

pub const SCAN_COMPLETED_EVENT: &str = "scan.completed";
pub const SCAN_FAILED_EVENT: &str = "scan.failed";
