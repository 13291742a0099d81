//! stun-nat-behavior library (lib.rs)
//!
//! Discovers how the NAT in front of this host maps and filters UDP traffic,
//! using the RFC 5780 behavior tests against a STUN server that advertises
//! OTHER-ADDRESS.

#![warn(clippy::all)]

pub mod nat;

// Re-export main types
pub use nat::{
    discover,
    DiscoveryConfig,
    NatBehaviorCoordinator,
    NatBehaviorReport,
    NatType,
    LeveledLogger,
    TracingLogger,
};

pub use nat::stun::{
    AddressFamily,
    FilteringBehavior,
    MappingBehavior,
    SessionConfig,
};

// Re-export error types
pub use nat::error::{NatError, NatResult};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize logging system with custom configuration
///
/// # Arguments
/// * `level` - Log level (trace/debug/info/warn/error)
///
/// `RUST_LOG` takes precedence when set.
pub fn init_logging(level: &str) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(false)
                .with_file(false)
                .with_line_number(false)
                .with_ansi(true)
        )
        .with(filter)
        .init();
}

/// Map a `-v` count (0..=3) to a log level name
pub fn verbosity_level(verbose: u8) -> &'static str {
    match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_verbosity_level() {
        assert_eq!(verbosity_level(0), "warn");
        assert_eq!(verbosity_level(1), "info");
        assert_eq!(verbosity_level(2), "debug");
        assert_eq!(verbosity_level(3), "trace");
        assert_eq!(verbosity_level(9), "trace");
    }
}
