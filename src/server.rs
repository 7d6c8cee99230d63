use std::collections::HashMap;
use std::net::{Ipv6Addr, SocketAddr, SocketAddrV6};
use std::sync::Arc;
use std::time::{Duration, Instant};

use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::codec::OptionRegistry;
use crate::config::Config;
use crate::engine::{Dhcp6Engine, RequestContext};
use crate::error::{Error, Result};
use crate::lease::{LeaseManager, LinearPool};

pub const DHCP6_SERVER_PORT: u16 = 547;
pub const DHCP6_CLIENT_PORT: u16 = 546;

/// All_DHCP_Relay_Agents_and_Servers (RFC 3315 §5.1).
pub const ALL_DHCP_RELAY_AGENTS_AND_SERVERS: Ipv6Addr = Ipv6Addr::new(0xff02, 0, 0, 0, 0, 0, 1, 2);

const RATE_LIMIT_WINDOW_SECS: u64 = 1;
const RATE_LIMIT_MAX_REQUESTS: usize = 10;
const RATE_LIMIT_CLEANUP_THRESHOLD: usize = 1000;
const RECV_BUFFER_SIZE: usize = 1500;

/// Builds the engine described by `config`.
pub fn build_engine(config: &Config) -> Result<Dhcp6Engine<LinearPool>> {
    config.validate()?;

    let registry = Arc::new(OptionRegistry::new());
    let pool = LinearPool::new(config.pool_start, config.pool_end)?;
    let leases = LeaseManager::new(pool, config.lifetimes()?, Arc::clone(&registry))
        .with_information(&config.dns_servers, &config.domain_search_list)?;

    Ok(Dhcp6Engine::new(config.duid()?, leases, registry)
        .with_server_unicast(config.server_unicast)
        .with_preference(config.preference)
        .with_commit_on_solicit(config.commit_on_solicit))
}

/// Per-source request counter over a sliding one-second window.
#[derive(Debug, Default)]
pub struct RateLimiter {
    entries: Mutex<HashMap<Ipv6Addr, Vec<Instant>>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a request from `source` and returns true if it exceeds the limit.
    pub async fn is_rate_limited(&self, source: Ipv6Addr) -> bool {
        let mut entries = self.entries.lock().await;
        let now = Instant::now();
        let window = Duration::from_secs(RATE_LIMIT_WINDOW_SECS);

        if entries.len() > RATE_LIMIT_CLEANUP_THRESHOLD {
            entries.retain(|_, timestamps| {
                timestamps.retain(|t| now.duration_since(*t) < window);
                !timestamps.is_empty()
            });
        }

        let timestamps = entries.entry(source).or_default();
        timestamps.retain(|t| now.duration_since(*t) < window);

        if timestamps.len() >= RATE_LIMIT_MAX_REQUESTS {
            return true;
        }

        timestamps.push(now);
        false
    }

    #[cfg(test)]
    async fn tracked_sources(&self) -> usize {
        self.entries.lock().await.len()
    }
}

pub struct Dhcp6Server {
    config: Arc<Config>,
    engine: Arc<Dhcp6Engine<LinearPool>>,
    socket: Arc<UdpSocket>,
    rate_limiter: Arc<RateLimiter>,
}

impl Dhcp6Server {
    pub async fn new(config: Config) -> Result<Self> {
        let engine = Arc::new(build_engine(&config)?);
        let config = Arc::new(config);
        let socket = Arc::new(Self::create_socket(&config)?);

        info!(
            "DHCPv6 server starting on [{}]:{} as {}",
            config.bind_address,
            DHCP6_SERVER_PORT,
            engine.server_duid()
        );
        info!(
            "Address pool: {} - {} ({} addresses)",
            config.pool_start,
            config.pool_end,
            config.pool_size()
        );

        Ok(Self {
            config,
            engine,
            socket,
            rate_limiter: Arc::new(RateLimiter::new()),
        })
    }

    fn create_socket(config: &Config) -> Result<UdpSocket> {
        let socket = Socket::new(Domain::IPV6, Type::DGRAM, Some(Protocol::UDP))
            .map_err(|error| Error::Socket(format!("Failed to create socket: {}", error)))?;

        socket
            .set_only_v6(true)
            .map_err(|error| Error::Socket(format!("Failed to set IPV6_V6ONLY: {}", error)))?;

        socket
            .set_reuse_address(true)
            .map_err(|error| Error::Socket(format!("Failed to set SO_REUSEADDR: {}", error)))?;

        socket
            .set_nonblocking(true)
            .map_err(|error| Error::Socket(format!("Failed to set non-blocking: {}", error)))?;

        let bind_addr = SocketAddrV6::new(config.bind_address, DHCP6_SERVER_PORT, 0, 0);
        socket.bind(&bind_addr.into()).map_err(|error| {
            Error::Socket(format!("Failed to bind to {}: {}", bind_addr, error))
        })?;

        let interface_index = config.interface_index.unwrap_or(0);
        if let Err(error) =
            socket.join_multicast_v6(&ALL_DHCP_RELAY_AGENTS_AND_SERVERS, interface_index)
        {
            warn!(
                "Failed to join {} on interface {}: {}",
                ALL_DHCP_RELAY_AGENTS_AND_SERVERS, interface_index, error
            );
        }

        let std_socket: std::net::UdpSocket = socket.into();
        let tokio_socket = UdpSocket::from_std(std_socket).map_err(|error| {
            Error::Socket(format!("Failed to convert to tokio socket: {}", error))
        })?;

        Ok(tokio_socket)
    }

    pub async fn run(&self) -> Result<()> {
        let mut buffer = [0u8; RECV_BUFFER_SIZE];

        info!("DHCPv6 server ready and listening");

        loop {
            match self.socket.recv_from(&mut buffer).await {
                Ok((size, source)) => {
                    let data = buffer[..size].to_vec();
                    let engine = Arc::clone(&self.engine);
                    let socket = Arc::clone(&self.socket);
                    let rate_limiter = Arc::clone(&self.rate_limiter);

                    tokio::spawn(async move {
                        let handler = DatagramHandler {
                            engine,
                            socket,
                            rate_limiter,
                        };
                        if let Err(error) = handler.handle_datagram(&data, source).await {
                            warn!("Error handling datagram from {}: {}", source, error);
                        }
                    });
                }
                Err(error) => {
                    error!("Error receiving datagram: {}", error);
                }
            }
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn engine(&self) -> &Dhcp6Engine<LinearPool> {
        &self.engine
    }
}

struct DatagramHandler {
    engine: Arc<Dhcp6Engine<LinearPool>>,
    socket: Arc<UdpSocket>,
    rate_limiter: Arc<RateLimiter>,
}

impl DatagramHandler {
    async fn handle_datagram(&self, data: &[u8], source: SocketAddr) -> Result<()> {
        let SocketAddr::V6(source_v6) = source else {
            warn!("Ignoring datagram from non-IPv6 source {}", source);
            return Ok(());
        };
        let client_address = *source_v6.ip();

        if self.rate_limiter.is_rate_limited(client_address).await {
            warn!("Rate limited: {}", source);
            return Ok(());
        }

        let ctx = RequestContext::new(client_address);
        match self.engine.handle_datagram(ctx, data).await? {
            Some(reply) => {
                self.socket.send_to(&reply, source).await?;
                debug!("Sent {} byte reply to {}", reply.len(), source);
            }
            None => debug!("No reply for datagram from {}", source),
        }
        Ok(())
    }
}
