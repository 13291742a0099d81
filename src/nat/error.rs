use std::io;
use std::time::Duration;
use thiserror::Error;

/// Error types for NAT behavior discovery
#[derive(Debug, Error)]
pub enum NatError {
    /// STUN protocol errors
    #[error("STUN error: {0}")]
    Stun(#[from] StunError),

    /// Network I/O errors
    #[error("Network I/O error: {0}")]
    Io(#[from] io::Error),

    /// No response arrived within the probe timeout
    #[error("Timed out waiting for response after {0:?}")]
    Timeout(Duration),

    /// The session's receive loop stopped, no reply can arrive anymore
    #[error("Error reading from response message channel")]
    ChannelClosed,

    /// The server lacks RFC 5780 support (no OTHER-ADDRESS, no XOR-MAPPED-ADDRESS,
    /// or an error response to CHANGE-REQUEST)
    #[error("NAT discovery feature not supported by this server: {0}")]
    DiscoveryUnsupported(String),

    /// Host name could not be resolved
    #[error("Failed to resolve {0}")]
    DnsResolution(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Malformed STUN URI
    #[error("Invalid STUN URI: {0}")]
    Uri(#[from] UriError),
}

impl NatError {
    /// Whether this error only means "no response in time"
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}

/// STUN codec errors
#[derive(Debug, Error)]
pub enum StunError {
    /// Invalid magic cookie
    #[error("Invalid magic cookie: expected 0x2112A442, got 0x{0:08X}")]
    InvalidMagicCookie(u32),

    /// Message parsing error
    #[error("Failed to parse STUN message: {0}")]
    ParseError(String),

    /// Attribute parsing error
    #[error("Failed to parse attribute 0x{attr_type:04X}: {reason}")]
    AttributeParseError { attr_type: u16, reason: String },

    /// Missing required attribute
    #[error("Missing required attribute: {0}")]
    MissingAttribute(String),

    /// Invalid address family
    #[error("Invalid address family: {0}")]
    InvalidAddressFamily(u8),

    /// Unknown message type
    #[error("Unknown message type: 0x{0:04X}")]
    UnknownMessageType(u16),

    /// STUN error response
    #[error("STUN error response: {code} - {reason}")]
    ErrorResponse { code: u16, reason: String },
}

/// RFC 7064 URI parsing errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum UriError {
    /// Scheme other than `stun` or `stuns`
    #[error("unknown uri scheme {0:?}")]
    UnknownScheme(String),

    /// Nothing after the scheme, or a hierarchical `//` form
    #[error("invalid uri format: expected opaque")]
    ExpectedOpaque,

    /// No `scheme:` prefix at all
    #[error("missing uri scheme")]
    MissingScheme,

    /// Port is present but not a valid u16
    #[error("invalid port {0:?}")]
    InvalidPort(String),

    /// Empty or malformed host
    #[error("invalid host {0:?}")]
    InvalidHost(String),
}

/// Result type for NAT operations
pub type NatResult<T> = Result<T, NatError>;
