//! RFC 5780 NAT behavior discovery.
//!
//! - Section 4.3: Determining NAT Mapping Behavior
//! - Section 4.4: Determining NAT Filtering Behavior
//!
//! Both tests run strictly one probe at a time on a single [`Transport`]:
//! every step depends on the secondary server address revealed by Test I.

use std::fmt;
use std::net::SocketAddr;
use serde::Serialize;

use crate::nat::error::{NatError, NatResult, StunError};
use crate::nat::logger::LeveledLogger;
use crate::nat::NatType;
use super::protocol::*;
use super::response::ParsedResponse;
use super::session::{RoundTripOutcome, Transport};
use super::utils::same_addr;

/// NAT mapping behavior (RFC 5780 Section 4.3)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MappingBehavior {
    /// The mapped address is our own local address
    NoNat,

    /// Same mapping for all destinations
    EndpointIndependent,

    /// Different mapping per destination IP
    AddressDependent,

    /// Different mapping per destination IP:port
    AddressAndPortDependent,
}

impl fmt::Display for MappingBehavior {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoNat => write!(f, "endpoint independent (no NAT)"),
            Self::EndpointIndependent => write!(f, "endpoint independent"),
            Self::AddressDependent => write!(f, "address dependent"),
            Self::AddressAndPortDependent => write!(f, "address and port dependent"),
        }
    }
}

/// NAT filtering behavior (RFC 5780 Section 4.4)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FilteringBehavior {
    /// Allow packets from any source
    EndpointIndependent,

    /// Allow only from IPs we've sent to
    AddressDependent,

    /// Allow only from IP:port pairs we've sent to
    AddressAndPortDependent,
}

impl fmt::Display for FilteringBehavior {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EndpointIndependent => write!(f, "endpoint independent"),
            Self::AddressDependent => write!(f, "address dependent"),
            Self::AddressAndPortDependent => write!(f, "address and port dependent"),
        }
    }
}

/// Classic NAT naming, once both behaviors are known
pub fn classify(mapping: MappingBehavior, filtering: FilteringBehavior) -> NatType {
    match (mapping, filtering) {
        (MappingBehavior::NoNat, _) => NatType::None,
        (MappingBehavior::EndpointIndependent, FilteringBehavior::EndpointIndependent) => {
            NatType::FullCone
        }
        (MappingBehavior::EndpointIndependent, FilteringBehavior::AddressDependent) => {
            NatType::RestrictedCone
        }
        (MappingBehavior::EndpointIndependent, FilteringBehavior::AddressAndPortDependent) => {
            NatType::PortRestricted
        }
        (MappingBehavior::AddressDependent, _) |
        (MappingBehavior::AddressAndPortDependent, _) => {
            NatType::Symmetric
        }
    }
}

/// RFC 5780 Section 4.3: Determining NAT Mapping Behavior
pub async fn mapping_test<T: Transport>(
    conn: &mut T,
    logger: &dyn LeveledLogger,
) -> NatResult<MappingBehavior> {
    // Test I: Regular binding request
    logger.info(format_args!("Mapping Test I: Regular binding request"));
    let mut request = Message::binding_request();
    let server_addr = conn.server_addr();

    let resp1 = expect_reply(conn, &mut request, server_addr, logger).await?;
    let xor_addr1 = learn_other_address(conn, &resp1, logger)?;
    logger.info(format_args!("Received XOR-MAPPED-ADDRESS: {}", xor_addr1));

    // A public address maps to itself
    if same_addr(&xor_addr1, &conn.local_addr()) {
        let behavior = MappingBehavior::NoNat;
        logger.warn(format_args!("=> NAT mapping behavior: {}", behavior));
        return Ok(behavior);
    }

    // Test II: Send binding request to the other address but primary port
    logger.info(format_args!("Mapping Test II: Send binding request to the other address but primary port"));
    let other_addr = required_other_addr(conn)?;
    let other_ip_primary_port = SocketAddr::new(other_addr.ip(), server_addr.port());

    let resp2 = expect_reply(conn, &mut request, other_ip_primary_port, logger).await?;
    let xor_addr2 = required_xor_mapped(&resp2)?;
    logger.info(format_args!("Received XOR-MAPPED-ADDRESS: {}", xor_addr2));

    if same_addr(&xor_addr2, &xor_addr1) {
        let behavior = MappingBehavior::EndpointIndependent;
        logger.warn(format_args!("=> NAT mapping behavior: {}", behavior));
        return Ok(behavior);
    }

    // Test III: Send binding request to the other address and port
    logger.info(format_args!("Mapping Test III: Send binding request to the other address and port"));
    let resp3 = expect_reply(conn, &mut request, other_addr, logger).await?;
    let xor_addr3 = required_xor_mapped(&resp3)?;
    logger.info(format_args!("Received XOR-MAPPED-ADDRESS: {}", xor_addr3));

    let behavior = if same_addr(&xor_addr3, &xor_addr2) {
        MappingBehavior::AddressDependent
    } else {
        MappingBehavior::AddressAndPortDependent
    };
    logger.warn(format_args!("=> NAT mapping behavior: {}", behavior));
    Ok(behavior)
}

/// RFC 5780 Section 4.4: Determining NAT Filtering Behavior
pub async fn filtering_test<T: Transport>(
    conn: &mut T,
    logger: &dyn LeveledLogger,
) -> NatResult<FilteringBehavior> {
    let server_addr = conn.server_addr();

    // Test I: Regular binding request
    logger.info(format_args!("Filtering Test I: Regular binding request"));
    let mut request = Message::binding_request();
    let resp1 = expect_reply(conn, &mut request, server_addr, logger).await?;
    learn_other_address(conn, &resp1, logger)?;

    // Test II: Request to change both IP and port
    logger.info(format_args!("Filtering Test II: Request to change both IP and port"));
    let mut request = Message::binding_request();
    request.add_attribute(Attribute::change_request(ChangeRequest::ip_and_port()));

    match conn.round_trip(&mut request, server_addr).await? {
        RoundTripOutcome::Reply(reply) => {
            reject_change_refusal(&reply)?;
            ParsedResponse::from_message(&reply, logger);
            let behavior = FilteringBehavior::EndpointIndependent;
            logger.warn(format_args!("=> NAT filtering behavior: {}", behavior));
            return Ok(behavior);
        }
        RoundTripOutcome::Timeout => {}
    }

    // Test III: Request to change port only
    logger.info(format_args!("Filtering Test III: Request to change port only"));
    let mut request = Message::binding_request();
    request.add_attribute(Attribute::change_request(ChangeRequest::port_only()));

    // A timeout here is itself the answer
    let behavior = match conn.round_trip(&mut request, server_addr).await? {
        RoundTripOutcome::Reply(reply) => {
            reject_change_refusal(&reply)?;
            ParsedResponse::from_message(&reply, logger);
            FilteringBehavior::AddressDependent
        }
        RoundTripOutcome::Timeout => FilteringBehavior::AddressAndPortDependent,
    };
    logger.warn(format_args!("=> NAT filtering behavior: {}", behavior));
    Ok(behavior)
}

/// One round trip where silence is not an acceptable answer
async fn expect_reply<T: Transport>(
    conn: &mut T,
    request: &mut Message,
    destination: SocketAddr,
    logger: &dyn LeveledLogger,
) -> NatResult<ParsedResponse> {
    match conn.round_trip(request, destination).await? {
        RoundTripOutcome::Reply(reply) => {
            reject_error_response(&reply)?;
            Ok(ParsedResponse::from_message(&reply, logger))
        }
        RoundTripOutcome::Timeout => Err(NatError::Timeout(conn.timeout())),
    }
}

/// Test I bookkeeping shared by both tests: require XOR-MAPPED-ADDRESS and
/// OTHER-ADDRESS, store the latter on the transport.
fn learn_other_address<T: Transport>(
    conn: &mut T,
    resp: &ParsedResponse,
    logger: &dyn LeveledLogger,
) -> NatResult<SocketAddr> {
    if !resp.supports_discovery() {
        logger.warn(format_args!("Error: NAT discovery feature not supported by this server"));
        let missing = if resp.xor_mapped_addr.is_none() { "XOR-MAPPED-ADDRESS" } else { "OTHER-ADDRESS" };
        return Err(NatError::DiscoveryUnsupported(format!("no {} in response", missing)));
    }

    match (resp.xor_mapped_addr, resp.other_addr) {
        (Some(xor_addr), Some(other_addr)) => {
            conn.set_other_addr(other_addr);
            Ok(xor_addr)
        }
        _ => Err(NatError::DiscoveryUnsupported("incomplete response".to_string())),
    }
}

fn required_other_addr<T: Transport>(conn: &T) -> NatResult<SocketAddr> {
    conn.other_addr()
        .ok_or_else(|| NatError::DiscoveryUnsupported("OTHER-ADDRESS not learned".to_string()))
}

fn required_xor_mapped(resp: &ParsedResponse) -> NatResult<SocketAddr> {
    resp.xor_mapped_addr
        .ok_or_else(|| StunError::MissingAttribute("XOR-MAPPED-ADDRESS".to_string()).into())
}

/// A Binding error response means the server refused the probe
fn reject_error_response(reply: &Message) -> NatResult<()> {
    if reply.message_type.class() != MessageClass::ErrorResponse {
        return Ok(());
    }

    let (code, reason) = reply.error_code().unwrap_or((0, "no ERROR-CODE"));
    Err(StunError::ErrorResponse { code, reason: reason.to_string() }.into())
}

/// Refusing CHANGE-REQUEST is how a server without a second address answers
fn reject_change_refusal(reply: &Message) -> NatResult<()> {
    reject_error_response(reply).map_err(|e| match e {
        NatError::Stun(StunError::ErrorResponse { code, reason }) => {
            NatError::DiscoveryUnsupported(format!("server rejected CHANGE-REQUEST: {} {}", code, reason))
        }
        other => other,
    })
}
