use std::net::SocketAddr;
use crate::nat::logger::LeveledLogger;
use super::protocol::*;

/// Attributes of a reply that matter for NAT behavior classification.
///
/// Every field is optional: a server leaving an attribute out is a valid
/// answer, not a parse failure.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedResponse {
    pub mapped_addr: Option<SocketAddr>,
    pub xor_mapped_addr: Option<SocketAddr>,
    pub other_addr: Option<SocketAddr>,
    pub response_origin: Option<SocketAddr>,
    pub software: Option<String>,
}

impl ParsedResponse {
    /// Pick the known attributes out of `msg`, logging everything at debug
    pub fn from_message(msg: &Message, logger: &dyn LeveledLogger) -> Self {
        let mut parsed = Self::default();

        for attr in &msg.attributes {
            match &attr.value {
                AttributeValue::MappedAddress(addr) if parsed.mapped_addr.is_none() => {
                    parsed.mapped_addr = Some(*addr);
                }
                AttributeValue::XorMappedAddress(addr) if parsed.xor_mapped_addr.is_none() => {
                    parsed.xor_mapped_addr = Some(*addr);
                }
                AttributeValue::OtherAddress(addr) if parsed.other_addr.is_none() => {
                    parsed.other_addr = Some(*addr);
                }
                AttributeValue::ResponseOrigin(addr) if parsed.response_origin.is_none() => {
                    parsed.response_origin = Some(*addr);
                }
                AttributeValue::Software(software) if parsed.software.is_none() => {
                    parsed.software = Some(software.clone());
                }
                _ => {}
            }
        }

        logger.debug(format_args!("{}", msg));
        logger.debug(format_args!("\tMAPPED-ADDRESS:     {}", display(&parsed.mapped_addr)));
        logger.debug(format_args!("\tXOR-MAPPED-ADDRESS: {}", display(&parsed.xor_mapped_addr)));
        logger.debug(format_args!("\tRESPONSE-ORIGIN:    {}", display(&parsed.response_origin)));
        logger.debug(format_args!("\tOTHER-ADDRESS:      {}", display(&parsed.other_addr)));
        logger.debug(format_args!("\tSOFTWARE: {}", display(&parsed.software)));

        for attr in &msg.attributes {
            if !is_interpreted(attr.attr_type) || matches!(attr.value, AttributeValue::Raw(_)) {
                logger.debug(format_args!("\t{} (l={})", attr.attr_type, attr.value_len()));
            }
        }

        parsed
    }

    /// Whether the reply carries what RFC 5780 Test I needs
    pub fn supports_discovery(&self) -> bool {
        self.xor_mapped_addr.is_some() && self.other_addr.is_some()
    }
}

fn is_interpreted(attr_type: AttributeType) -> bool {
    matches!(
        attr_type,
        AttributeType::MappedAddress
            | AttributeType::XorMappedAddress
            | AttributeType::OtherAddress
            | AttributeType::ResponseOrigin
            | AttributeType::Software
    )
}

fn display<T: std::fmt::Display>(value: &Option<T>) -> String {
    value
        .as_ref()
        .map(ToString::to_string)
        .unwrap_or_else(|| "<nil>".to_string())
}
