// src/nat/stun/mod.rs
//! Minimal STUN stack for RFC 5780 NAT behavior discovery
//!
//! ## Contents
//! - Binding request/response codec (RFC 8489 message format)
//! - CHANGE-REQUEST, OTHER-ADDRESS and RESPONSE-ORIGIN (RFC 5780)
//! - UDP transport session with one outstanding probe at a time
//! - Mapping and filtering behavior tests
//! - `stun:` / `stuns:` URIs (RFC 7064)
//!
//! No authentication, no FINGERPRINT, no TCP or TLS transport.

pub mod protocol;
pub mod utils;
pub mod response;
pub mod session;
pub mod discovery;
pub mod uri;
pub mod test_server;

// Re-export core types for easy access
pub use protocol::{
    Message, MessageType, MessageClass, TransactionId, ChangeRequest,
    Attribute, AttributeType, AttributeValue,
    MAGIC_COOKIE, HEADER_SIZE,
};

pub use utils::{MessageBuilder, normalized_addr, same_addr};

pub use response::ParsedResponse;

pub use session::{
    AddressFamily, Connector, RoundTripOutcome, SessionConfig, SessionStats,
    StunSession, Transport, UdpConnector, resolve_server,
    DEFAULT_RECV_BUFFER_SIZE, DEFAULT_STUN_PORT, DEFAULT_TIMEOUT,
};

pub use discovery::{
    FilteringBehavior, MappingBehavior, classify, filtering_test, mapping_test,
};

pub use uri::Uri;

pub use test_server::UdpTestServer;
