//! DNS resolution against an explicit nameserver

use crate::error::ProbeError;
use async_trait::async_trait;
use hickory_resolver::config::{NameServerConfigGroup, ResolverConfig, ResolverOpts};
use hickory_resolver::error::ResolveErrorKind;
use hickory_resolver::TokioAsyncResolver;
use std::net::IpAddr;
use std::time::Duration;
use tokio::time::Instant;

/// One successful resolution
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub ip: IpAddr,
    pub elapsed_ms: f64,
}

/// Trait for resolving a hostname through a specific resolver
#[async_trait]
pub trait Resolver: Send + Sync {
    /// Resolve `hostname` by asking `server` directly, bypassing any cache
    async fn resolve(
        &self,
        hostname: &str,
        server: IpAddr,
        timeout: Duration,
    ) -> Result<Resolution, ProbeError>;

    /// Nameserver the host is currently configured to use, if known
    fn system_resolver(&self) -> Option<IpAddr> {
        None
    }
}

/// `Resolver` built on hickory, one uncached client per query
#[derive(Debug, Clone, Default)]
pub struct HickoryResolver {
    system: Option<IpAddr>,
}

impl HickoryResolver {
    /// Create a resolver, reading the system nameserver from the host
    /// configuration (`/etc/resolv.conf` or the platform equivalent)
    pub fn from_system() -> Self {
        let system = match hickory_resolver::system_conf::read_system_conf() {
            Ok((config, _)) => config.name_servers().first().map(|ns| ns.socket_addr.ip()),
            Err(e) => {
                tracing::warn!(error = %e, "Could not read system resolver configuration");
                None
            }
        };
        Self { system }
    }

    /// Create a resolver with a known system nameserver
    pub fn with_system(system: Option<IpAddr>) -> Self {
        Self { system }
    }
}

#[async_trait]
impl Resolver for HickoryResolver {
    async fn resolve(
        &self,
        hostname: &str,
        server: IpAddr,
        timeout: Duration,
    ) -> Result<Resolution, ProbeError> {
        let nameservers = NameServerConfigGroup::from_ips_clear(&[server], 53, true);
        let config = ResolverConfig::from_parts(None, vec![], nameservers);

        let mut opts = ResolverOpts::default();
        opts.timeout = timeout;
        opts.attempts = 1;
        opts.cache_size = 0;
        opts.use_hosts_file = false;

        let resolver = TokioAsyncResolver::tokio(config, opts);

        let start = Instant::now();
        let lookup = resolver.lookup_ip(hostname).await.map_err(|e| match e.kind() {
            ResolveErrorKind::Timeout => ProbeError::Timeout(timeout),
            _ => ProbeError::Unavailable(format!("{} via {}: {}", hostname, server, e)),
        })?;
        let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;

        let ip = lookup.iter().next().ok_or_else(|| {
            ProbeError::Parse(format!("{} via {} returned no addresses", hostname, server))
        })?;

        Ok(Resolution { ip, elapsed_ms })
    }

    fn system_resolver(&self) -> Option<IpAddr> {
        self.system
    }
}
