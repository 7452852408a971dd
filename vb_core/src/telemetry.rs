use std::backtrace::Backtrace;
use std::sync::Once;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Tracing target for security-relevant events
pub const SECURITY_TARGET: &str = "veribits::security";

/// Number of stack frames kept when logging a security event
const SECURITY_STACK_FRAMES: usize = 8;

static INIT: Once = Once::new();

/// Initialize tracing - safe to call multiple times
pub fn init_tracing(env: &str, service: &str) {
    INIT.call_once(|| {
        let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

        if env == "production" {
            tracing_subscriber::registry()
                .with(tracing_subscriber::fmt::layer().json())
                .with(env_filter)
                .init();
        } else {
            tracing_subscriber::registry()
                .with(tracing_subscriber::fmt::layer().pretty())
                .with(env_filter)
                .init();
        }

        tracing::info!(service = %service, env = %env, "Tracing initialized");
    });
}

/// Log a security event with a truncated call stack.
///
/// Emitted at WARN on [`SECURITY_TARGET`] so operators can route these
/// separately from regular request logs.
pub fn security_event(event: &str, detail: &str) {
    let stack = partial_stack(SECURITY_STACK_FRAMES);
    tracing::warn!(
        target: SECURITY_TARGET,
        event = %event,
        detail = %detail,
        stack = %stack,
        "Security event"
    );
}

/// First `frames` frames of the current backtrace, one per line
pub fn partial_stack(frames: usize) -> String {
    let rendered = Backtrace::force_capture().to_string();
    let mut out = Vec::new();
    let mut seen = 0;
    for line in rendered.lines() {
        let trimmed = line.trim_start();
        // Frame headers look like "3: some::function"
        let is_frame = trimmed
            .split_once(':')
            .map(|(n, _)| n.chars().all(|c| c.is_ascii_digit()) && !n.is_empty())
            .unwrap_or(false);
        if is_frame {
            seen += 1;
            if seen > frames {
                break;
            }
        }
        if seen > 0 {
            out.push(trimmed);
        }
    }
    out.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_tracing_idempotent() {
        init_tracing("test", "veribits-test");
        init_tracing("test", "veribits-test");
    }

    #[test]
    fn test_partial_stack_is_bounded() {
        let stack = partial_stack(2);
        let frame_count = stack
            .lines()
            .filter(|l| {
                l.split_once(':')
                    .map(|(n, _)| !n.is_empty() && n.chars().all(|c| c.is_ascii_digit()))
                    .unwrap_or(false)
            })
            .count();
        assert!(frame_count <= 2);
    }

    #[test]
    fn test_security_event_does_not_panic() {
        security_event("command_not_allowed", "rm -rf /");
    }
}
