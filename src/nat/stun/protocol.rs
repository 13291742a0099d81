use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use rand::RngCore;
use crate::nat::error::{StunError, NatResult};

/// STUN magic cookie as defined in RFC 8489
pub const MAGIC_COOKIE: u32 = 0x2112A442;

/// STUN header size (20 bytes)
pub const HEADER_SIZE: usize = 20;

/// Size of an attribute header (type + length)
const ATTRIBUTE_HEADER_SIZE: usize = 4;

const FAMILY_IPV4: u8 = 0x01;
const FAMILY_IPV6: u8 = 0x02;

/// STUN message types for the Binding method (RFC 8489 Section 3)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum MessageType {
    BindingRequest = 0x0001,
    BindingIndication = 0x0011,
    BindingResponse = 0x0101,
    BindingError = 0x0111,
}

impl MessageType {
    /// Get message class (request, indication, response, error)
    pub fn class(&self) -> MessageClass {
        match (*self as u16) & 0x0110 {
            0x0000 => MessageClass::Request,
            0x0010 => MessageClass::Indication,
            0x0100 => MessageClass::SuccessResponse,
            _ => MessageClass::ErrorResponse,
        }
    }

    /// Get message method
    pub fn method(&self) -> u16 {
        let value = *self as u16;
        (value & 0x000F) | ((value & 0x00E0) >> 1) | ((value & 0x3E00) >> 2)
    }

    /// Map a raw header value to a known type
    pub fn from_raw(raw: u16) -> Option<Self> {
        match raw {
            0x0001 => Some(Self::BindingRequest),
            0x0011 => Some(Self::BindingIndication),
            0x0101 => Some(Self::BindingResponse),
            0x0111 => Some(Self::BindingError),
            _ => None,
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BindingRequest => write!(f, "Binding request"),
            Self::BindingIndication => write!(f, "Binding indication"),
            Self::BindingResponse => write!(f, "Binding success response"),
            Self::BindingError => write!(f, "Binding error response"),
        }
    }
}

/// STUN message class
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageClass {
    Request,
    Indication,
    SuccessResponse,
    ErrorResponse,
}

/// STUN attribute types used by NAT behavior discovery (RFC 8489 Section 14, RFC 5780 Section 7)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttributeType {
    MappedAddress,
    ChangeRequest,
    ErrorCode,
    UnknownAttributes,
    XorMappedAddress,
    Padding,
    ResponsePort,
    Software,
    Fingerprint,
    ResponseOrigin,
    OtherAddress,
    /// Anything this codec does not interpret
    Other(u16),
}

impl AttributeType {
    /// Wire value
    pub fn code(&self) -> u16 {
        match self {
            Self::MappedAddress => 0x0001,
            Self::ChangeRequest => 0x0003,
            Self::ErrorCode => 0x0009,
            Self::UnknownAttributes => 0x000A,
            Self::XorMappedAddress => 0x0020,
            Self::Padding => 0x0026,
            Self::ResponsePort => 0x0027,
            Self::Software => 0x8022,
            Self::Fingerprint => 0x8028,
            Self::ResponseOrigin => 0x802B,
            Self::OtherAddress => 0x802C,
            Self::Other(code) => *code,
        }
    }

    pub fn from_code(code: u16) -> Self {
        match code {
            0x0001 => Self::MappedAddress,
            0x0003 => Self::ChangeRequest,
            0x0009 => Self::ErrorCode,
            0x000A => Self::UnknownAttributes,
            0x0020 => Self::XorMappedAddress,
            0x0026 => Self::Padding,
            0x0027 => Self::ResponsePort,
            0x8022 => Self::Software,
            0x8028 => Self::Fingerprint,
            0x802B => Self::ResponseOrigin,
            0x802C => Self::OtherAddress,
            other => Self::Other(other),
        }
    }

    /// Check if attribute is comprehension-required
    pub fn is_comprehension_required(&self) -> bool {
        self.code() < 0x8000
    }
}

impl fmt::Display for AttributeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MappedAddress => write!(f, "MAPPED-ADDRESS"),
            Self::ChangeRequest => write!(f, "CHANGE-REQUEST"),
            Self::ErrorCode => write!(f, "ERROR-CODE"),
            Self::UnknownAttributes => write!(f, "UNKNOWN-ATTRIBUTES"),
            Self::XorMappedAddress => write!(f, "XOR-MAPPED-ADDRESS"),
            Self::Padding => write!(f, "PADDING"),
            Self::ResponsePort => write!(f, "RESPONSE-PORT"),
            Self::Software => write!(f, "SOFTWARE"),
            Self::Fingerprint => write!(f, "FINGERPRINT"),
            Self::ResponseOrigin => write!(f, "RESPONSE-ORIGIN"),
            Self::OtherAddress => write!(f, "OTHER-ADDRESS"),
            Self::Other(code) => write!(f, "0x{:04x}", code),
        }
    }
}

/// STUN transaction ID (96 bits)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransactionId([u8; 12]);

impl TransactionId {
    /// Generate new random transaction ID with cryptographically secure RNG
    pub fn new() -> Self {
        let mut id = [0u8; 12];
        rand::rngs::OsRng.fill_bytes(&mut id);
        Self(id)
    }

    /// Create from bytes
    pub fn from_bytes(bytes: [u8; 12]) -> Self {
        Self(bytes)
    }

    /// Get as bytes
    pub fn as_bytes(&self) -> &[u8; 12] {
        &self.0
    }
}

impl Default for TransactionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

/// CHANGE-REQUEST flags (RFC 5780 Section 7.2)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChangeRequest {
    pub change_ip: bool,
    pub change_port: bool,
}

impl ChangeRequest {
    pub const CHANGE_IP: u32 = 0x0000_0004;
    pub const CHANGE_PORT: u32 = 0x0000_0002;

    /// Ask the server to answer from its alternate IP and alternate port
    pub fn ip_and_port() -> Self {
        Self { change_ip: true, change_port: true }
    }

    /// Ask the server to answer from the same IP but its alternate port
    pub fn port_only() -> Self {
        Self { change_ip: false, change_port: true }
    }

    pub fn to_bits(self) -> u32 {
        let mut bits = 0;
        if self.change_ip {
            bits |= Self::CHANGE_IP;
        }
        if self.change_port {
            bits |= Self::CHANGE_PORT;
        }
        bits
    }

    pub fn from_bits(bits: u32) -> Self {
        Self {
            change_ip: bits & Self::CHANGE_IP != 0,
            change_port: bits & Self::CHANGE_PORT != 0,
        }
    }
}

/// STUN message
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub message_type: MessageType,
    pub transaction_id: TransactionId,
    pub attributes: Vec<Attribute>,
}

impl Message {
    /// Create new STUN message
    pub fn new(message_type: MessageType, transaction_id: TransactionId) -> Self {
        Self {
            message_type,
            transaction_id,
            attributes: Vec::new(),
        }
    }

    /// Plain Binding request with a fresh transaction id
    pub fn binding_request() -> Self {
        Self::new(MessageType::BindingRequest, TransactionId::new())
    }

    /// Replace the transaction id with a freshly generated one
    pub fn new_transaction_id(&mut self) -> TransactionId {
        self.transaction_id = TransactionId::new();
        self.transaction_id
    }

    /// Add attribute to message
    pub fn add_attribute(&mut self, attribute: Attribute) {
        self.attributes.push(attribute);
    }

    /// Get attribute by type
    pub fn get_attribute(&self, attr_type: AttributeType) -> Option<&Attribute> {
        self.attributes.iter().find(|a| a.attr_type == attr_type)
    }

    /// CHANGE-REQUEST carried by this message, if any
    pub fn change_request(&self) -> Option<ChangeRequest> {
        self.attributes.iter().find_map(|attr| match attr.value {
            AttributeValue::ChangeRequest(change) => Some(change),
            _ => None,
        })
    }

    /// ERROR-CODE carried by this message, if any
    pub fn error_code(&self) -> Option<(u16, &str)> {
        self.attributes.iter().find_map(|attr| match &attr.value {
            AttributeValue::ErrorCode { code, reason } => Some((*code, reason.as_str())),
            _ => None,
        })
    }

    /// Encoded size of the attribute section
    fn body_len(&self) -> usize {
        self.attributes
            .iter()
            .map(|attr| ATTRIBUTE_HEADER_SIZE + padded(attr.value_len()))
            .sum()
    }

    /// Encode message to bytes
    pub fn encode(&self) -> NatResult<Bytes> {
        let body_len = self.body_len();
        if body_len > u16::MAX as usize {
            return Err(StunError::ParseError(format!("Message body too large: {} bytes", body_len)).into());
        }

        let mut buf = BytesMut::with_capacity(HEADER_SIZE + body_len);
        buf.put_u16(self.message_type as u16);
        buf.put_u16(body_len as u16);
        buf.put_u32(MAGIC_COOKIE);
        buf.put_slice(self.transaction_id.as_bytes());

        for attr in &self.attributes {
            attr.encode(&mut buf, &self.transaction_id)?;
        }

        Ok(buf.freeze())
    }

    /// Decode message from bytes
    pub fn decode(mut buf: BytesMut) -> NatResult<Self> {
        if buf.len() < HEADER_SIZE {
            return Err(StunError::ParseError("Message too short".to_string()).into());
        }

        let msg_type_raw = buf.get_u16();
        let msg_len = buf.get_u16() as usize;
        let magic = buf.get_u32();

        if msg_type_raw & 0xC000 != 0 {
            return Err(StunError::ParseError(
                format!("Leading bits of message type must be zero: 0x{:04X}", msg_type_raw)
            ).into());
        }

        if magic != MAGIC_COOKIE {
            return Err(StunError::InvalidMagicCookie(magic).into());
        }

        let message_type = MessageType::from_raw(msg_type_raw)
            .ok_or(StunError::UnknownMessageType(msg_type_raw))?;

        let mut tid_bytes = [0u8; 12];
        buf.copy_to_slice(&mut tid_bytes);
        let transaction_id = TransactionId::from_bytes(tid_bytes);

        if buf.remaining() != msg_len {
            return Err(StunError::ParseError(
                format!("Invalid message length: expected {}, got {}", msg_len, buf.remaining())
            ).into());
        }

        let mut attributes = Vec::new();
        while buf.has_remaining() {
            if buf.remaining() < ATTRIBUTE_HEADER_SIZE {
                return Err(StunError::ParseError("Incomplete attribute header".to_string()).into());
            }

            let attr_type_raw = buf.get_u16();
            let attr_len = buf.get_u16() as usize;

            if buf.remaining() < attr_len {
                return Err(StunError::ParseError("Incomplete attribute value".to_string()).into());
            }

            let value = buf.split_to(attr_len);
            attributes.push(Attribute::decode(attr_type_raw, value, &transaction_id));

            // Skip padding to 4-byte boundary
            let padding = padded(attr_len) - attr_len;
            buf.advance(padding.min(buf.remaining()));
        }

        Ok(Self {
            message_type,
            transaction_id,
            attributes,
        })
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} l={} attrs={} id={}",
            self.message_type,
            self.body_len(),
            self.attributes.len(),
            self.transaction_id
        )
    }
}

/// STUN attribute
#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    pub attr_type: AttributeType,
    pub value: AttributeValue,
}

/// STUN attribute values
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    MappedAddress(SocketAddr),
    XorMappedAddress(SocketAddr),
    OtherAddress(SocketAddr),
    ResponseOrigin(SocketAddr),
    Software(String),
    ChangeRequest(ChangeRequest),
    ErrorCode { code: u16, reason: String },
    /// Opaque value of an attribute this codec does not interpret
    Raw(Vec<u8>),
}

impl Attribute {
    /// Create new attribute
    pub fn new(attr_type: AttributeType, value: AttributeValue) -> Self {
        Self { attr_type, value }
    }

    pub fn mapped_address(addr: SocketAddr) -> Self {
        Self::new(AttributeType::MappedAddress, AttributeValue::MappedAddress(addr))
    }

    pub fn xor_mapped_address(addr: SocketAddr) -> Self {
        Self::new(AttributeType::XorMappedAddress, AttributeValue::XorMappedAddress(addr))
    }

    pub fn other_address(addr: SocketAddr) -> Self {
        Self::new(AttributeType::OtherAddress, AttributeValue::OtherAddress(addr))
    }

    pub fn response_origin(addr: SocketAddr) -> Self {
        Self::new(AttributeType::ResponseOrigin, AttributeValue::ResponseOrigin(addr))
    }

    pub fn software(name: impl Into<String>) -> Self {
        Self::new(AttributeType::Software, AttributeValue::Software(name.into()))
    }

    pub fn change_request(change: ChangeRequest) -> Self {
        Self::new(AttributeType::ChangeRequest, AttributeValue::ChangeRequest(change))
    }

    pub fn error_code(code: u16, reason: impl Into<String>) -> Self {
        Self::new(
            AttributeType::ErrorCode,
            AttributeValue::ErrorCode { code, reason: reason.into() },
        )
    }

    /// Length of the encoded value, without header or padding
    pub fn value_len(&self) -> usize {
        match &self.value {
            AttributeValue::MappedAddress(addr)
            | AttributeValue::XorMappedAddress(addr)
            | AttributeValue::OtherAddress(addr)
            | AttributeValue::ResponseOrigin(addr) => match addr {
                SocketAddr::V4(_) => 8,
                SocketAddr::V6(_) => 20,
            },
            AttributeValue::Software(software) => software.len(),
            AttributeValue::ChangeRequest(_) => 4,
            AttributeValue::ErrorCode { reason, .. } => 4 + reason.len(),
            AttributeValue::Raw(data) => data.len(),
        }
    }

    /// Encode attribute
    pub fn encode(&self, buf: &mut BytesMut, tid: &TransactionId) -> NatResult<()> {
        let value_len = self.value_len();
        if value_len > u16::MAX as usize {
            return Err(StunError::AttributeParseError {
                attr_type: self.attr_type.code(),
                reason: format!("value too long: {} bytes", value_len),
            }.into());
        }

        buf.put_u16(self.attr_type.code());
        buf.put_u16(value_len as u16);

        match &self.value {
            AttributeValue::XorMappedAddress(addr) => encode_address(buf, addr, Some(tid)),
            // RFC 5780 addresses use the plain MAPPED-ADDRESS format
            AttributeValue::MappedAddress(addr)
            | AttributeValue::OtherAddress(addr)
            | AttributeValue::ResponseOrigin(addr) => encode_address(buf, addr, None),
            AttributeValue::Software(software) => buf.put_slice(software.as_bytes()),
            AttributeValue::ChangeRequest(change) => buf.put_u32(change.to_bits()),
            AttributeValue::ErrorCode { code, reason } => {
                buf.put_u16(0); // Reserved
                buf.put_u8((code / 100) as u8);
                buf.put_u8((code % 100) as u8);
                buf.put_slice(reason.as_bytes());
            }
            AttributeValue::Raw(data) => buf.put_slice(data),
        }

        buf.put_bytes(0, padded(value_len) - value_len);
        Ok(())
    }

    /// Decode attribute value.
    ///
    /// A known attribute whose value does not parse is kept as `Raw`, so one
    /// malformed attribute never costs the rest of the message.
    pub fn decode(attr_type_raw: u16, value: BytesMut, tid: &TransactionId) -> Self {
        let attr_type = AttributeType::from_code(attr_type_raw);
        let raw = value.to_vec();

        let value = decode_value(attr_type, value, tid)
            .unwrap_or(AttributeValue::Raw(raw));

        Self { attr_type, value }
    }
}

fn decode_value(
    attr_type: AttributeType,
    mut value: BytesMut,
    tid: &TransactionId,
) -> NatResult<AttributeValue> {
    let decoded = match attr_type {
        AttributeType::MappedAddress => AttributeValue::MappedAddress(decode_address(&mut value, None)?),
        AttributeType::XorMappedAddress => AttributeValue::XorMappedAddress(decode_address(&mut value, Some(tid))?),
        AttributeType::OtherAddress => AttributeValue::OtherAddress(decode_address(&mut value, None)?),
        AttributeType::ResponseOrigin => AttributeValue::ResponseOrigin(decode_address(&mut value, None)?),
        AttributeType::Software => AttributeValue::Software(String::from_utf8_lossy(&value).into_owned()),
        AttributeType::ChangeRequest => {
            if value.remaining() != 4 {
                return Err(StunError::AttributeParseError {
                    attr_type: attr_type.code(),
                    reason: format!("CHANGE-REQUEST must be 4 bytes, got {}", value.remaining()),
                }.into());
            }
            AttributeValue::ChangeRequest(ChangeRequest::from_bits(value.get_u32()))
        }
        AttributeType::ErrorCode => {
            if value.remaining() < 4 {
                return Err(StunError::AttributeParseError {
                    attr_type: attr_type.code(),
                    reason: "ERROR-CODE too short".to_string(),
                }.into());
            }
            value.advance(2); // Skip reserved
            let class = (value.get_u8() & 0x07) as u16;
            let number = value.get_u8() as u16;
            let reason = String::from_utf8_lossy(&value).into_owned();
            AttributeValue::ErrorCode { code: class * 100 + number, reason }
        }
        _ => AttributeValue::Raw(value.to_vec()),
    };

    Ok(decoded)
}

fn padded(len: usize) -> usize {
    (len + 3) & !3
}

/// Encode an address, XOR-ed with the magic cookie (and transaction id for IPv6) when `xor` carries one
fn encode_address(buf: &mut BytesMut, addr: &SocketAddr, xor: Option<&TransactionId>) {
    let magic_bytes = MAGIC_COOKIE.to_be_bytes();
    let port_mask = if xor.is_some() { (MAGIC_COOKIE >> 16) as u16 } else { 0 };

    buf.put_u8(0); // Reserved
    match addr {
        SocketAddr::V4(addr_v4) => {
            buf.put_u8(FAMILY_IPV4);
            buf.put_u16(addr_v4.port() ^ port_mask);

            let ip_bytes = addr_v4.ip().octets();
            for (i, byte) in ip_bytes.iter().enumerate() {
                buf.put_u8(if xor.is_some() { byte ^ magic_bytes[i] } else { *byte });
            }
        }
        SocketAddr::V6(addr_v6) => {
            buf.put_u8(FAMILY_IPV6);
            buf.put_u16(addr_v6.port() ^ port_mask);

            let mut ip_bytes = addr_v6.ip().octets();
            if let Some(tid) = xor {
                xor_ipv6(&mut ip_bytes, tid);
            }
            buf.put_slice(&ip_bytes);
        }
    }
}

/// Decode an address written by [`encode_address`]
fn decode_address(buf: &mut BytesMut, xor: Option<&TransactionId>) -> NatResult<SocketAddr> {
    if buf.remaining() < 8 {
        return Err(StunError::ParseError("Address too short".to_string()).into());
    }

    buf.advance(1); // Skip reserved
    let family = buf.get_u8();
    let port_mask = if xor.is_some() { (MAGIC_COOKIE >> 16) as u16 } else { 0 };
    let port = buf.get_u16() ^ port_mask;

    match family {
        FAMILY_IPV4 => {
            let mut ip_bytes = [0u8; 4];
            buf.copy_to_slice(&mut ip_bytes);

            if xor.is_some() {
                let magic_bytes = MAGIC_COOKIE.to_be_bytes();
                for (byte, mask) in ip_bytes.iter_mut().zip(magic_bytes) {
                    *byte ^= mask;
                }
            }

            Ok(SocketAddr::new(IpAddr::V4(Ipv4Addr::from(ip_bytes)), port))
        }
        FAMILY_IPV6 => {
            if buf.remaining() < 16 {
                return Err(StunError::ParseError("IPv6 address too short".to_string()).into());
            }

            let mut ip_bytes = [0u8; 16];
            buf.copy_to_slice(&mut ip_bytes);
            if let Some(tid) = xor {
                xor_ipv6(&mut ip_bytes, tid);
            }

            Ok(SocketAddr::new(IpAddr::V6(Ipv6Addr::from(ip_bytes)), port))
        }
        _ => Err(StunError::InvalidAddressFamily(family).into()),
    }
}

/// XOR the first 4 bytes with the magic cookie, the remaining 12 with the transaction id
fn xor_ipv6(ip_bytes: &mut [u8; 16], tid: &TransactionId) {
    let magic_bytes = MAGIC_COOKIE.to_be_bytes();
    let mask = magic_bytes.iter().chain(tid.as_bytes().iter());
    for (byte, mask) in ip_bytes.iter_mut().zip(mask) {
        *byte ^= mask;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(bytes: &[u8]) -> NatResult<Message> {
        Message::decode(BytesMut::from(bytes))
    }

    #[test]
    fn test_message_encode_decode() {
        let tid = TransactionId::new();
        let mut msg = Message::new(MessageType::BindingResponse, tid);

        msg.add_attribute(Attribute::xor_mapped_address("192.0.2.10:40000".parse().unwrap()));
        msg.add_attribute(Attribute::mapped_address("192.0.2.10:40000".parse().unwrap()));
        msg.add_attribute(Attribute::other_address("203.0.113.1:5000".parse().unwrap()));
        msg.add_attribute(Attribute::response_origin("198.51.100.7:3478".parse().unwrap()));
        msg.add_attribute(Attribute::xor_mapped_address("[2001:db8::1]:3479".parse().unwrap()));
        msg.add_attribute(Attribute::software("nat probe 1.0"));
        msg.add_attribute(Attribute::change_request(ChangeRequest::port_only()));
        msg.add_attribute(Attribute::error_code(420, "Unknown Attribute"));

        let encoded = msg.encode().unwrap();
        assert_eq!(encoded.len() % 4, 0);

        let decoded = decode(&encoded).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn test_header_layout() {
        let tid = TransactionId::from_bytes([7; 12]);
        let mut msg = Message::new(MessageType::BindingRequest, tid);
        msg.add_attribute(Attribute::change_request(ChangeRequest::ip_and_port()));

        let encoded = msg.encode().unwrap();
        assert_eq!(&encoded[0..2], &[0x00, 0x01]);
        assert_eq!(&encoded[2..4], &[0x00, 0x08]);
        assert_eq!(&encoded[4..8], &MAGIC_COOKIE.to_be_bytes());
        assert_eq!(&encoded[8..20], &[7; 12]);
        // CHANGE-REQUEST 0x0003, length 4, value 0x00000006
        assert_eq!(&encoded[20..], &[0x00, 0x03, 0x00, 0x04, 0x00, 0x00, 0x00, 0x06]);
    }

    #[test]
    fn test_change_request_bits() {
        assert_eq!(ChangeRequest::ip_and_port().to_bits(), 0x06);
        assert_eq!(ChangeRequest::port_only().to_bits(), 0x02);
        assert_eq!(ChangeRequest { change_ip: true, change_port: false }.to_bits(), 0x04);
        assert_eq!(ChangeRequest::from_bits(0x06), ChangeRequest::ip_and_port());
        assert_eq!(ChangeRequest::from_bits(0x00), ChangeRequest::default());
    }

    #[test]
    fn test_xor_address_encoding() {
        let tid = TransactionId::new();
        for addr in ["192.168.1.1:12345", "[fe80::1:2]:443"] {
            let addr = addr.parse::<SocketAddr>().unwrap();

            let mut buf = BytesMut::new();
            encode_address(&mut buf, &addr, Some(&tid));
            assert_eq!(decode_address(&mut buf, Some(&tid)).unwrap(), addr);
        }
    }

    #[test]
    fn test_xor_mapped_address_wire_value() {
        // RFC 5769 Section 2.2 sample response, XOR-MAPPED-ADDRESS 192.0.2.1:32853
        let tid = TransactionId::from_bytes([
            0xb7, 0xe7, 0xa7, 0x01, 0xbc, 0x34, 0xd6, 0x86, 0xfa, 0x87, 0xdf, 0xae,
        ]);
        let value = BytesMut::from(&[0x00, 0x01, 0xa1, 0x47, 0xe1, 0x12, 0xa6, 0x43][..]);
        let attr = Attribute::decode(0x0020, value, &tid);
        assert_eq!(attr, Attribute::xor_mapped_address("192.0.2.1:32853".parse().unwrap()));
    }

    #[test]
    fn test_unknown_attributes_are_opaque() {
        let tid = TransactionId::new();
        let mut msg = Message::new(MessageType::BindingResponse, tid);
        msg.add_attribute(Attribute::new(AttributeType::Other(0x8050), AttributeValue::Raw(vec![1, 2, 3])));
        msg.add_attribute(Attribute::new(AttributeType::Other(0x0042), AttributeValue::Raw(vec![9; 8])));

        let decoded = decode(&msg.encode().unwrap()).unwrap();
        assert_eq!(decoded.attributes[0].attr_type, AttributeType::Other(0x8050));
        assert_eq!(decoded.attributes[0].value, AttributeValue::Raw(vec![1, 2, 3]));
        assert_eq!(decoded.attributes[1].value_len(), 8);
        assert!(decoded.attributes[1].attr_type.is_comprehension_required());
    }

    #[test]
    fn test_malformed_known_attributes_kept_raw() {
        let tid = TransactionId::new();

        // Unknown address family
        let other = BytesMut::from(&[0x00, 0x03, 0x13, 0x88, 203, 0, 113, 1][..]);
        assert_eq!(
            Attribute::decode(0x802C, other, &tid).value,
            AttributeValue::Raw(vec![0x00, 0x03, 0x13, 0x88, 203, 0, 113, 1])
        );

        // Truncated address
        let xor = BytesMut::from(&[0x00, 0x01, 0xa1][..]);
        let attr = Attribute::decode(0x0020, xor, &tid);
        assert_eq!(attr.attr_type, AttributeType::XorMappedAddress);
        assert_eq!(attr.value, AttributeValue::Raw(vec![0x00, 0x01, 0xa1]));

        let change = BytesMut::from(&[0x00, 0x06][..]);
        assert!(matches!(Attribute::decode(0x0003, change, &tid).value, AttributeValue::Raw(_)));
    }

    #[test]
    fn test_software_decoded_lossily() {
        let tid = TransactionId::new();
        let attr = Attribute::decode(0x8022, BytesMut::from(&[0xff, 0xfe, 0x41][..]), &tid);
        assert_eq!(attr.value, AttributeValue::Software("\u{FFFD}\u{FFFD}A".to_string()));
    }

    #[test]
    fn test_message_survives_malformed_attribute() {
        let tid = TransactionId::new();
        let mut msg = Message::new(MessageType::BindingResponse, tid);
        msg.add_attribute(Attribute::new(AttributeType::OtherAddress, AttributeValue::Raw(vec![0x00, 0x03, 0x00, 0x50])));
        msg.add_attribute(Attribute::xor_mapped_address("192.0.2.1:4000".parse().unwrap()));

        let decoded = decode(&msg.encode().unwrap()).unwrap();
        assert_eq!(decoded.attributes.len(), 2);
        assert_eq!(decoded.attributes[0].value, AttributeValue::Raw(vec![0x00, 0x03, 0x00, 0x50]));
        assert_eq!(decoded.attributes[1], Attribute::xor_mapped_address("192.0.2.1:4000".parse().unwrap()));
    }

    #[test]
    fn test_decode_rejects_malformed() {
        assert!(decode(&[0u8; 10]).is_err());

        let msg = Message::binding_request().encode().unwrap();

        let mut bad_cookie = msg.to_vec();
        bad_cookie[4] ^= 0xFF;
        assert!(decode(&bad_cookie).is_err());

        let mut bad_length = msg.to_vec();
        bad_length[3] = 4;
        assert!(decode(&bad_length).is_err());

        let mut bad_type = msg.to_vec();
        bad_type[1] = 0x03;
        assert!(decode(&bad_type).is_err());
    }

    #[test]
    fn test_new_transaction_id_changes() {
        let mut msg = Message::binding_request();
        let first = msg.transaction_id;
        let second = msg.new_transaction_id();
        assert_ne!(first, second);
        assert_eq!(msg.transaction_id, second);
    }

    #[test]
    fn test_message_display() {
        let tid = TransactionId::from_bytes([0xab; 12]);
        let mut msg = Message::new(MessageType::BindingResponse, tid);
        msg.add_attribute(Attribute::software("x"));
        assert_eq!(
            msg.to_string(),
            "Binding success response l=8 attrs=1 id=abababababababababababab"
        );
        assert_eq!(MessageType::BindingError.class(), MessageClass::ErrorResponse);
        assert_eq!(MessageType::BindingResponse.method(), 0x0001);
    }
}
