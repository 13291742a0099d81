use std::sync::Arc;
use std::time::Duration;
use anyhow::Result;
use clap::Parser;
use stun_nat_behavior::nat::coordinator::DEFAULT_SERVER;
use stun_nat_behavior::{
    discover, init_logging, verbosity_level, AddressFamily, DiscoveryConfig, SessionConfig,
    TracingLogger,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "RFC 5780 NAT mapping and filtering behavior discovery", long_about = None)]
struct Args {
    /// STUN server address (host:port, ip:port or stun: URI)
    #[arg(long, default_value = DEFAULT_SERVER)]
    server: String,

    /// Seconds to wait for each STUN response
    #[arg(long, default_value_t = 3, value_parser = clap::value_parser!(u64).range(1..))]
    timeout: u64,

    /// Verbosity: 0 warn, 1 info, 2 debug, 3 trace
    #[arg(long, default_value_t = 1)]
    verbose: u8,

    /// Use IPv6 instead of IPv4
    #[arg(long)]
    ipv6: bool,

    /// Print the final report as JSON
    #[arg(long)]
    json: bool,
}

impl Args {
    fn discovery_config(&self) -> DiscoveryConfig {
        DiscoveryConfig {
            server: self.server.clone(),
            session: SessionConfig {
                timeout: Duration::from_secs(self.timeout),
                family: if self.ipv6 { AddressFamily::V6 } else { AddressFamily::V4 },
                ..SessionConfig::default()
            },
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(verbosity_level(args.verbose));

    let report = discover(&args.discovery_config(), Arc::new(TracingLogger)).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        let show = |value: Option<String>| value.unwrap_or_else(|| "inconclusive".to_string());
        println!("Server:            {}", report.server);
        println!("Mapping behavior:  {}", show(report.mapping.map(|m| m.to_string())));
        println!("Filtering behavior: {}", show(report.filtering.map(|f| f.to_string())));
        println!("NAT type:          {}", report.nat_type());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let args = Args::try_parse_from(["stun-nat-behavior"]).unwrap();
        let config = args.discovery_config();

        assert_eq!(config.server, DEFAULT_SERVER);
        assert_eq!(config.session.timeout, Duration::from_secs(3));
        assert_eq!(config.session.family, AddressFamily::V4);
    }

    #[test]
    fn test_zero_timeout_rejected() {
        assert!(Args::try_parse_from(["stun-nat-behavior", "--timeout", "0"]).is_err());

        let args = Args::try_parse_from(["stun-nat-behavior", "--timeout", "1", "--ipv6"]).unwrap();
        assert_eq!(args.discovery_config().session.timeout, Duration::from_secs(1));
        assert_eq!(args.discovery_config().session.family, AddressFamily::V6);
    }
}
