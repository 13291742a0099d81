use std::net::SocketAddr;
use std::sync::Arc;
use serde::Serialize;

use super::error::NatResult;
use super::logger::LeveledLogger;
use super::stun::discovery::{classify, filtering_test, mapping_test, FilteringBehavior, MappingBehavior};
use super::stun::session::{resolve_server, Connector, SessionConfig, Transport, UdpConnector};
use super::NatType;

/// Default server, one that answers with OTHER-ADDRESS
pub const DEFAULT_SERVER: &str = "stun.voip.blackberry.com:3478";

/// Top level discovery settings
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    /// `host:port`, `ip:port` or `stun:` URI
    pub server: String,
    pub session: SessionConfig,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            server: DEFAULT_SERVER.to_string(),
            session: SessionConfig::default(),
        }
    }
}

/// Outcome of both behavior tests. `None` means inconclusive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NatBehaviorReport {
    pub server: SocketAddr,
    pub mapping: Option<MappingBehavior>,
    pub filtering: Option<FilteringBehavior>,
}

impl NatBehaviorReport {
    /// Classic NAT name, `Unknown` unless both behaviors were determined
    pub fn nat_type(&self) -> NatType {
        match (self.mapping, self.filtering) {
            (Some(mapping), Some(filtering)) => classify(mapping, filtering),
            _ => NatType::Unknown,
        }
    }
}

/// Runs the mapping test, then the filtering test, each on its own session
pub struct NatBehaviorCoordinator<C: Connector> {
    connector: C,
    logger: Arc<dyn LeveledLogger>,
}

impl NatBehaviorCoordinator<UdpConnector> {
    /// Coordinator over real UDP sessions
    pub fn udp(config: SessionConfig, logger: Arc<dyn LeveledLogger>) -> Self {
        Self::new(UdpConnector::new(config, logger.clone()), logger)
    }
}

impl<C: Connector> NatBehaviorCoordinator<C> {
    pub fn new(connector: C, logger: Arc<dyn LeveledLogger>) -> Self {
        Self { connector, logger }
    }

    /// Run both tests against `server`. Failures are logged and reported as
    /// `None`; one family failing never stops the other.
    pub async fn run(&self, server: SocketAddr) -> NatBehaviorReport {
        let mapping = match self.run_mapping(server).await {
            Ok(behavior) => Some(behavior),
            Err(e) => {
                self.logger.warn(format_args!("NAT mapping behavior: inconclusive"));
                self.logger.info(format_args!("mapping test failed: {}", e));
                None
            }
        };

        let filtering = match self.run_filtering(server).await {
            Ok(behavior) => Some(behavior),
            Err(e) => {
                self.logger.warn(format_args!("NAT filtering behavior: inconclusive"));
                self.logger.info(format_args!("filtering test failed: {}", e));
                None
            }
        };

        NatBehaviorReport { server, mapping, filtering }
    }

    async fn run_mapping(&self, server: SocketAddr) -> NatResult<MappingBehavior> {
        let mut conn = self.connector.connect(server).await?;
        let result = mapping_test(&mut conn, self.logger.as_ref()).await;
        conn.close();
        result
    }

    async fn run_filtering(&self, server: SocketAddr) -> NatResult<FilteringBehavior> {
        let mut conn = self.connector.connect(server).await?;
        let result = filtering_test(&mut conn, self.logger.as_ref()).await;
        conn.close();
        result
    }
}

/// Resolve `config.server`, then run both tests over UDP.
///
/// Only resolution is fatal; test failures end up as `None` in the report.
pub async fn discover(
    config: &DiscoveryConfig,
    logger: Arc<dyn LeveledLogger>,
) -> NatResult<NatBehaviorReport> {
    let server = resolve_server(&config.server, config.session.family).await?;
    let coordinator = NatBehaviorCoordinator::udp(config.session.clone(), logger);
    Ok(coordinator.run(server).await)
}
