use std::net::SocketAddr;
use super::protocol::*;

/// Builder for constructing STUN messages
pub struct MessageBuilder {
    message: Message,
}

impl MessageBuilder {
    /// Create new binding response answering `transaction_id`
    pub fn binding_response(transaction_id: TransactionId) -> Self {
        let message = Message::new(MessageType::BindingResponse, transaction_id);
        Self { message }
    }

    /// Create new binding error response answering `transaction_id`
    pub fn binding_error(transaction_id: TransactionId, code: u16, reason: &str) -> Self {
        let mut message = Message::new(MessageType::BindingError, transaction_id);
        message.add_attribute(Attribute::error_code(code, reason));
        Self { message }
    }

    /// Add software attribute
    pub fn with_software(mut self, software: impl Into<String>) -> Self {
        self.message.add_attribute(Attribute::software(software));
        self
    }

    /// Add XOR-MAPPED-ADDRESS attribute
    pub fn with_xor_mapped_address(mut self, addr: SocketAddr) -> Self {
        self.message.add_attribute(Attribute::xor_mapped_address(addr));
        self
    }

    /// Add MAPPED-ADDRESS attribute
    pub fn with_mapped_address(mut self, addr: SocketAddr) -> Self {
        self.message.add_attribute(Attribute::mapped_address(addr));
        self
    }

    /// Add OTHER-ADDRESS attribute
    pub fn with_other_address(mut self, addr: SocketAddr) -> Self {
        self.message.add_attribute(Attribute::other_address(addr));
        self
    }

    /// Add RESPONSE-ORIGIN attribute
    pub fn with_response_origin(mut self, addr: SocketAddr) -> Self {
        self.message.add_attribute(Attribute::response_origin(addr));
        self
    }

    /// Build the message
    pub fn build(self) -> Message {
        self.message
    }
}

/// Textual `IP:port` form used when comparing mapped addresses.
///
/// IPv4-mapped IPv6 addresses are folded to plain IPv4 first so that
/// `[::ffff:192.0.2.1]:80` and `192.0.2.1:80` compare equal.
pub fn normalized_addr(addr: &SocketAddr) -> String {
    SocketAddr::new(addr.ip().to_canonical(), addr.port()).to_string()
}

/// Compare two addresses through their normalized textual form
pub fn same_addr(a: &SocketAddr, b: &SocketAddr) -> bool {
    normalized_addr(a) == normalized_addr(b)
}
