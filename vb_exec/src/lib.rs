//! ABOUTME: Safe command executor for allow-listed network binaries
//! ABOUTME: Enforces timeouts, output ceilings and process-group termination

pub mod allowlist;
pub mod escape;
pub mod executor;
pub mod validate;

pub use allowlist::{AllowedCommand, ALLOWED_COMMANDS};
pub use escape::{escape_arg, render_command_line};
pub use executor::{
    CommandExecutor, ExecOutput, ExecRequest, Executor, ExecutorSettings, MAX_TIMEOUT_SECS,
    MIN_TIMEOUT_SECS,
};
pub use validate::{
    resolve_safe_path, validate_domain, validate_hostname, validate_ip, validate_port,
    validate_target, Target,
};
