//! Logging and tracing utilities.
//!
//! The provider logs through the `tracing` ecosystem. All logs are written to
//! **stderr** to avoid interfering with the handshake protocol on stdout.
//!
//! Output of the `launchpad` binary is relayed into `tracing` at the level
//! the installer printed, and also buffered in a per-call [`LogSink`] so a
//! failed run can report what the installer said.
//!
//! # Environment Variables
//!
//! - `RUST_LOG`: Controls log levels (e.g., `info`, `debug`, `hemmer_provider_launchpad=debug`)
//!
//! ```bash
//! # Show installer output relayed at debug level
//! RUST_LOG=hemmer_provider_launchpad=debug ./hemmer-provider-launchpad
//! ```

use std::sync::{Arc, Mutex, PoisonError};
use tracing::Level;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize the default logging subscriber.
///
/// Writes to stderr, respects `RUST_LOG`, and defaults to `info`.
///
/// # Panics
///
/// Panics if a global subscriber has already been set.
pub fn init_logging() {
    init_logging_with_default("info");
}

/// Initialize logging with a custom default level used when `RUST_LOG` is not set.
///
/// # Panics
///
/// Panics if a global subscriber has already been set.
pub fn init_logging_with_default(default_level: &str) {
    tracing_subscriber::registry()
        .with(env_filter(default_level))
        .with(stderr_layer())
        .init();
}

/// Try to initialize logging, returning false if already initialized.
pub fn try_init_logging() -> bool {
    tracing_subscriber::registry()
        .with(env_filter("info"))
        .with(stderr_layer())
        .try_init()
        .is_ok()
}

fn env_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

fn stderr_layer<S>() -> impl tracing_subscriber::Layer<S>
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
}

/// Buffer of installer output captured during one lifecycle call.
///
/// Cheap to clone; clones share the same buffer.
#[derive(Debug, Clone, Default)]
pub struct LogSink {
    lines: Arc<Mutex<Vec<String>>>,
}

impl LogSink {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Relay one installer line into `tracing` and keep it in the buffer.
    pub fn record(&self, line: impl Into<String>) {
        let line = line.into();
        match installer_level(&line) {
            Level::ERROR => tracing::error!(target: "launchpad", "{}", line),
            Level::WARN => tracing::warn!(target: "launchpad", "{}", line),
            Level::INFO => tracing::info!(target: "launchpad", "{}", line),
            Level::DEBUG => tracing::debug!(target: "launchpad", "{}", line),
            _ => tracing::trace!(target: "launchpad", "{}", line),
        }
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(line);
    }

    /// Everything recorded so far, one line per entry.
    pub fn contents(&self) -> String {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .join("\n")
    }

    /// Whether nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_empty()
    }
}

/// Level of a line printed by the installer.
///
/// Understands both `level=warning msg=...` and `WARN[0003] ...` layouts.
/// In the logfmt layout only a `level=` field ahead of `msg=` counts.
/// Anything else is treated as info.
pub fn installer_level(line: &str) -> Level {
    let trimmed = line.trim_start();
    let fields = trimmed.find("msg=").map_or(trimmed, |idx| &trimmed[..idx]);
    let tag = match fields
        .split_whitespace()
        .find_map(|field| field.strip_prefix("level="))
    {
        Some(value) => value
            .trim_start_matches('"')
            .split(|c: char| !c.is_ascii_alphabetic())
            .next()
            .unwrap_or_default(),
        None => trimmed
            .split(|c: char| !c.is_ascii_alphabetic())
            .next()
            .unwrap_or_default(),
    };

    match tag.to_ascii_lowercase().as_str() {
        "panic" | "pani" | "fatal" | "fata" | "error" | "erro" => Level::ERROR,
        "warning" | "warn" => Level::WARN,
        "debug" | "debu" => Level::DEBUG,
        "trace" | "trac" => Level::TRACE,
        _ => Level::INFO,
    }
}
