use ::tracing::{debug, error, info, span, Level, Span};
use cairn_core::CAIRN_LOG_VAR;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize the tracing system
///
/// The filter is read from `CAIRN_LOG`, then `RUST_LOG`, and defaults to
/// `info`. Output goes to stderr in compact form so task stdout stays clean.
/// Fails, rather than panicking, if a global subscriber is already set.
pub fn init() -> Result<(), Box<dyn std::error::Error + Send + Sync + 'static>> {
    let filter = EnvFilter::try_from_env(CAIRN_LOG_VAR)
        .or_else(|_| EnvFilter::try_from_default_env())
        .or_else(|_| EnvFilter::try_new("info"))?;

    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(is_tty())
        .compact()
        .with_target(false)
        .with_thread_ids(false)
        .with_level(true);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init()?;

    Ok(())
}

fn is_tty() -> bool {
    std::io::IsTerminal::is_terminal(&std::io::stderr())
}

/// Span every kernel run executes inside
pub fn task_span(name: &str, checksum: &str) -> Span {
    span!(Level::INFO, "task", task = %name, checksum = %checksum)
}

/// Emit a structured event for task completion
pub fn task_completed(name: &str, duration_ms: u64, success: bool) {
    if success {
        info!(task = %name, duration_ms, "task_completed");
    } else {
        error!(task = %name, duration_ms, "task_failed");
    }
}

/// Emit a structured event for cache lookups
pub fn cache_event(name: &str, hit: bool, checksum: &str) {
    if hit {
        debug!(task = %name, checksum = %checksum, "cache_hit");
    } else {
        debug!(task = %name, checksum = %checksum, "cache_miss");
    }
}
