//! ABOUTME: Repository modules providing typed database operations
//! ABOUTME: Each repository handles the queries for one table

pub mod audit_logs;
pub mod firewall_configs;
pub mod system_scans;
pub mod webhooks;
