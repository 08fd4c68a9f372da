//! DNS resolver benchmark

use crate::config::{DnsConfig, NamedResolver};
use crate::error::StatsError;
use crate::models::DnsResolverResult;
use crate::resolver::Resolver;
use crate::stats;
use futures::future::join_all;
use std::cmp::Ordering;
use std::sync::Arc;
use tracing::{debug, warn};

/// Name given to the host's configured resolver when it is not one of the
/// named resolvers
pub const SYSTEM_RESOLVER_NAME: &str = "system";

/// Resolves one hostname against every configured resolver plus the
/// system resolver. Resolvers are benchmarked concurrently; the repeats
/// against a single resolver run back to back.
#[derive(Clone)]
pub struct DnsProbe {
    config: DnsConfig,
    resolver: Arc<dyn Resolver>,
}

impl DnsProbe {
    pub fn new(config: DnsConfig, resolver: Arc<dyn Resolver>) -> Self {
        Self { config, resolver }
    }

    /// Named resolvers plus the system resolver, flagged with `is_system`
    fn targets(&self) -> Vec<(NamedResolver, bool)> {
        let system = self.resolver.system_resolver();
        let mut targets: Vec<(NamedResolver, bool)> = self
            .config
            .resolvers
            .iter()
            .map(|r| (r.clone(), Some(r.ip) == system))
            .collect();

        if let Some(ip) = system {
            if !targets.iter().any(|(_, is_system)| *is_system) {
                targets.push((NamedResolver::new(SYSTEM_RESOLVER_NAME, ip), true));
            }
        }
        targets
    }

    /// Benchmark all resolvers. Resolvers failing every attempt stay in the
    /// list as unreachable. Results are sorted by ascending median with
    /// unreachable resolvers last.
    pub async fn run(&self) -> Result<Vec<DnsResolverResult>, StatsError> {
        let runs = self
            .targets()
            .into_iter()
            .map(|(target, is_system)| self.bench_resolver(target, is_system));

        let mut results = join_all(runs)
            .await
            .into_iter()
            .collect::<Result<Vec<_>, _>>()?;

        if results.iter().all(|r| !r.reachable) {
            warn!(hostname = %self.config.hostname, "No DNS resolver answered");
        }

        sort_results(&mut results);
        Ok(results)
    }

    async fn bench_resolver(
        &self,
        target: NamedResolver,
        is_system: bool,
    ) -> Result<DnsResolverResult, StatsError> {
        let attempts = self.config.repeats;
        let mut times = Vec::with_capacity(attempts as usize);

        for _ in 0..attempts {
            match self
                .resolver
                .resolve(&self.config.hostname, target.ip, self.config.timeout())
                .await
            {
                Ok(resolution) => times.push(resolution.elapsed_ms),
                Err(e) => {
                    debug!(resolver = %target.name, ip = %target.ip, error = %e, "DNS attempt failed");
                }
            }
        }

        let (median_ms, p95_ms) = if times.is_empty() {
            (None, None)
        } else {
            (
                Some(stats::median(&times)?),
                Some(stats::percentile(&times, 95.0)?),
            )
        };

        let success_rate = if attempts == 0 {
            0.0
        } else {
            times.len() as f64 / attempts as f64 * 100.0
        };

        debug!(
            resolver = %target.name,
            ip = %target.ip,
            median_ms = ?median_ms,
            success_rate,
            "Resolver benchmarked"
        );

        Ok(DnsResolverResult {
            resolver_name: target.name,
            resolver_ip: target.ip,
            median_ms,
            p95_ms,
            success_rate,
            attempts,
            reachable: median_ms.is_some(),
            is_system,
        })
    }
}

/// Ascending median among reachable resolvers, unreachable last. The sort
/// is stable, so ties keep configuration order.
pub fn sort_results(results: &mut [DnsResolverResult]) {
    results.sort_by(|a, b| match (a.median_ms, b.median_ms) {
        (Some(x), Some(y)) => x.total_cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProbeError;
    use crate::resolver::Resolution;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::net::IpAddr;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Resolver answering from a fixed latency table; unknown servers time
    /// out
    struct TableResolver {
        latencies: HashMap<IpAddr, Vec<f64>>,
        system: Option<IpAddr>,
        calls: Mutex<HashMap<IpAddr, usize>>,
    }

    impl TableResolver {
        fn new(entries: Vec<(&str, Vec<f64>)>, system: Option<&str>) -> Self {
            Self {
                latencies: entries
                    .into_iter()
                    .map(|(ip, ms)| (ip.parse().unwrap(), ms))
                    .collect(),
                system: system.map(|s| s.parse().unwrap()),
                calls: Mutex::new(HashMap::new()),
            }
        }
    }

    #[async_trait]
    impl Resolver for TableResolver {
        async fn resolve(
            &self,
            _hostname: &str,
            server: IpAddr,
            timeout: Duration,
        ) -> Result<Resolution, ProbeError> {
            let n = {
                let mut calls = self.calls.lock().unwrap();
                let n = calls.entry(server).or_insert(0);
                *n += 1;
                *n - 1
            };
            match self.latencies.get(&server) {
                Some(ms) => Ok(Resolution {
                    ip: "93.184.216.34".parse().unwrap(),
                    elapsed_ms: ms[n % ms.len()],
                }),
                None => Err(ProbeError::Timeout(timeout)),
            }
        }

        fn system_resolver(&self) -> Option<IpAddr> {
            self.system
        }
    }

    fn config(resolvers: &[(&str, &str)]) -> DnsConfig {
        DnsConfig {
            repeats: 3,
            resolvers: resolvers
                .iter()
                .map(|(name, ip)| NamedResolver::new(name, ip.parse().unwrap()))
                .collect(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_sorted_with_unreachable_last() {
        let resolver = TableResolver::new(
            vec![("1.1.1.1", vec![12.0, 14.0, 13.0]), ("8.8.8.8", vec![8.0, 9.0, 30.0])],
            None,
        );
        let probe = DnsProbe::new(
            config(&[("quad9", "9.9.9.9"), ("cloudflare", "1.1.1.1"), ("google", "8.8.8.8")]),
            Arc::new(resolver),
        );

        let results = probe.run().await.unwrap();
        let names: Vec<&str> = results.iter().map(|r| r.resolver_name.as_str()).collect();
        assert_eq!(names, vec!["google", "cloudflare", "quad9"]);

        assert_eq!(results[0].median_ms, Some(9.0));
        assert_eq!(results[1].median_ms, Some(13.0));
        assert_eq!(results[0].success_rate, 100.0);

        let quad9 = &results[2];
        assert!(!quad9.reachable);
        assert_eq!(quad9.median_ms, None);
        assert_eq!(quad9.success_rate, 0.0);
        assert_eq!(quad9.attempts, 3);
    }

    #[tokio::test]
    async fn test_system_resolver_appended() {
        let resolver = TableResolver::new(
            vec![("1.1.1.1", vec![12.0]), ("192.168.1.1", vec![40.0])],
            Some("192.168.1.1"),
        );
        let probe = DnsProbe::new(config(&[("cloudflare", "1.1.1.1")]), Arc::new(resolver));

        let results = probe.run().await.unwrap();
        assert_eq!(results.len(), 2);
        let system = results.iter().find(|r| r.is_system).unwrap();
        assert_eq!(system.resolver_name, SYSTEM_RESOLVER_NAME);
        assert_eq!(system.median_ms, Some(40.0));
    }

    #[tokio::test]
    async fn test_system_resolver_matches_named() {
        let resolver = TableResolver::new(vec![("8.8.8.8", vec![20.0])], Some("8.8.8.8"));
        let probe = DnsProbe::new(config(&[("google", "8.8.8.8")]), Arc::new(resolver));

        let results = probe.run().await.unwrap();
        assert_eq!(results.len(), 1);
        assert!(results[0].is_system);
        assert_eq!(results[0].resolver_name, "google");
    }

    #[tokio::test]
    async fn test_partial_success_rate() {
        struct Flaky;

        #[async_trait]
        impl Resolver for Flaky {
            async fn resolve(
                &self,
                _hostname: &str,
                _server: IpAddr,
                timeout: Duration,
            ) -> Result<Resolution, ProbeError> {
                static CALLS: std::sync::atomic::AtomicUsize = std::sync::atomic::AtomicUsize::new(0);
                if CALLS.fetch_add(1, std::sync::atomic::Ordering::SeqCst) % 2 == 0 {
                    Ok(Resolution {
                        ip: "93.184.216.34".parse().unwrap(),
                        elapsed_ms: 25.0,
                    })
                } else {
                    Err(ProbeError::Timeout(timeout))
                }
            }
        }

        let mut cfg = config(&[("cloudflare", "1.1.1.1")]);
        cfg.repeats = 4;
        let results = DnsProbe::new(cfg, Arc::new(Flaky)).run().await.unwrap();

        assert!(results[0].reachable);
        assert_eq!(results[0].success_rate, 50.0);
        assert_eq!(results[0].median_ms, Some(25.0));
    }

    #[test]
    fn test_sort_is_stable_for_ties() {
        let entry = |name: &str, median: Option<f64>| DnsResolverResult {
            resolver_name: name.to_string(),
            resolver_ip: "1.1.1.1".parse().unwrap(),
            median_ms: median,
            p95_ms: median,
            success_rate: 0.0,
            attempts: 1,
            reachable: median.is_some(),
            is_system: false,
        };
        let mut results = vec![
            entry("a", None),
            entry("b", Some(10.0)),
            entry("c", None),
            entry("d", Some(10.0)),
            entry("e", Some(5.0)),
        ];

        sort_results(&mut results);
        let names: Vec<&str> = results.iter().map(|r| r.resolver_name.as_str()).collect();
        assert_eq!(names, vec!["e", "b", "d", "a", "c"]);
    }
}
