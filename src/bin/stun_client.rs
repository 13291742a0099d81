use std::sync::Arc;
use anyhow::{bail, Result};
use clap::Parser;
use stun_nat_behavior::nat::stun::{
    resolve_server, Message, ParsedResponse, RoundTripOutcome, StunSession, Transport,
};
use stun_nat_behavior::{init_logging, verbosity_level, AddressFamily, SessionConfig, TracingLogger};

#[derive(Parser, Debug)]
#[command(author, version, about = "Send one STUN Binding request and print the mapped address", long_about = None)]
struct Args {
    /// STUN server address (host:port, ip:port or stun: URI)
    #[arg(default_value = "stun.l.google.com:19302")]
    server: String,

    /// Use IPv6 instead of IPv4
    #[arg(long)]
    ipv6: bool,

    /// Verbosity: 0 warn, 1 info, 2 debug, 3 trace
    #[arg(long, default_value_t = 0)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(verbosity_level(args.verbose));

    let config = SessionConfig {
        family: if args.ipv6 { AddressFamily::V6 } else { AddressFamily::V4 },
        ..SessionConfig::default()
    };
    let logger = Arc::new(TracingLogger);

    let server = resolve_server(&args.server, config.family).await?;
    let mut session = StunSession::open(server, config, logger.clone()).await?;

    let mut request = Message::binding_request();
    let reply = match session.round_trip(&mut request, server).await? {
        RoundTripOutcome::Reply(reply) => reply,
        RoundTripOutcome::Timeout => bail!("no response from {}", server),
    };
    session.close();

    match ParsedResponse::from_message(&reply, logger.as_ref()).xor_mapped_addr {
        Some(addr) => println!("your IP is {} port {}", addr.ip(), addr.port()),
        None => bail!("{} returned no XOR-MAPPED-ADDRESS", server),
    }

    Ok(())
}
