//! Leveled logging capability handed to the discovery engine.
//!
//! The engine never reaches for a process-wide logger on its own: every
//! session, test and coordinator receives an `Arc<dyn LeveledLogger>`.
//! Production code passes [`TracingLogger`], which forwards to `tracing`
//! (and therefore to whatever subscriber `init_logging` installed). Tests
//! pass [`NullLogger`] or [`CapturingLogger`].

use std::fmt;
use std::sync::{Arc, Mutex};
use tracing::Level;

/// Logger with one method per level
pub trait LeveledLogger: Send + Sync {
    fn log(&self, level: Level, args: fmt::Arguments<'_>);

    fn trace(&self, args: fmt::Arguments<'_>) {
        self.log(Level::TRACE, args);
    }

    fn debug(&self, args: fmt::Arguments<'_>) {
        self.log(Level::DEBUG, args);
    }

    fn info(&self, args: fmt::Arguments<'_>) {
        self.log(Level::INFO, args);
    }

    fn warn(&self, args: fmt::Arguments<'_>) {
        self.log(Level::WARN, args);
    }
}

/// Forwards to `tracing` events under the `stun_nat_behavior` target
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogger;

impl LeveledLogger for TracingLogger {
    fn log(&self, level: Level, args: fmt::Arguments<'_>) {
        match level {
            Level::TRACE => tracing::trace!(target: "stun_nat_behavior", "{}", args),
            Level::DEBUG => tracing::debug!(target: "stun_nat_behavior", "{}", args),
            Level::INFO => tracing::info!(target: "stun_nat_behavior", "{}", args),
            Level::WARN => tracing::warn!(target: "stun_nat_behavior", "{}", args),
            _ => tracing::error!(target: "stun_nat_behavior", "{}", args),
        }
    }
}

/// Discards everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NullLogger;

impl LeveledLogger for NullLogger {
    fn log(&self, _level: Level, _args: fmt::Arguments<'_>) {}
}

/// Records every line, for assertions in tests
#[derive(Debug, Default)]
pub struct CapturingLogger {
    lines: Mutex<Vec<(Level, String)>>,
}

impl CapturingLogger {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// All lines logged so far
    pub fn lines(&self) -> Vec<(Level, String)> {
        self.lines.lock().map(|lines| lines.clone()).unwrap_or_default()
    }

    /// Lines logged at exactly `level`
    pub fn lines_at(&self, level: Level) -> Vec<String> {
        self.lines()
            .into_iter()
            .filter(|(l, _)| *l == level)
            .map(|(_, line)| line)
            .collect()
    }

    /// Whether any line contains `needle`
    pub fn contains(&self, needle: &str) -> bool {
        self.lines().iter().any(|(_, line)| line.contains(needle))
    }
}

impl LeveledLogger for CapturingLogger {
    fn log(&self, level: Level, args: fmt::Arguments<'_>) {
        if let Ok(mut lines) = self.lines.lock() {
            lines.push((level, args.to_string()));
        }
    }
}
