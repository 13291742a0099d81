use std::fmt;
use serde::Serialize;

pub mod error;
pub mod logger;
pub mod stun;
pub mod coordinator;

pub use self::coordinator::{discover, DiscoveryConfig, NatBehaviorCoordinator, NatBehaviorReport};
pub use self::error::{NatError, NatResult, StunError, UriError};
pub use self::logger::{LeveledLogger, NullLogger, TracingLogger};

/// Classic NAT type names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NatType {
    None,               // Public IP, no NAT
    FullCone,           // Endpoint-independent mapping and filtering
    RestrictedCone,     // Endpoint-independent mapping, address-dependent filtering
    PortRestricted,     // Endpoint-independent mapping, address and port dependent filtering
    Symmetric,          // Mapping varies per destination
    Unknown,            // At least one test was inconclusive
}

impl fmt::Display for NatType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::None => "no NAT",
            Self::FullCone => "full cone",
            Self::RestrictedCone => "restricted cone",
            Self::PortRestricted => "port restricted cone",
            Self::Symmetric => "symmetric",
            Self::Unknown => "unknown",
        };
        f.write_str(name)
    }
}
