//! HTTP Client Pool.
//!
//! A single process-wide `reqwest::Client`, shared between the primary
//! forward path and the Mirror Writer, with connection pooling and a cached
//! DNS resolver refreshed in the background. Generalizes
//! `barbacane-wasm`'s `HttpClient` wrapper (same `ClientBuilder` knobs);
//! mTLS and circuit-breaker support are dropped — this proxy always trusts
//! its two configured upstreams and has no plugin-supplied TLS material.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use reqwest::dns::{Addrs, Name, Resolve, Resolving};
use reqwest::Client;
use thiserror::Error;

const DNS_REFRESH_INTERVAL: Duration = Duration::from_secs(300);

/// Configuration for the shared HTTP client.
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Maximum idle connections per host.
    pub pool_max_idle_per_host: usize,
    /// Idle connection timeout.
    pub pool_idle_timeout: Duration,
    /// Connection timeout.
    pub connect_timeout: Duration,
    /// Default request timeout.
    pub request_timeout: Duration,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            pool_max_idle_per_host: 10,
            pool_idle_timeout: Duration::from_secs(90),
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(60),
        }
    }
}

/// Errors building the shared client.
#[derive(Debug, Error)]
pub enum HttpClientError {
    #[error("failed to build HTTP client: {0}")]
    Build(#[source] reqwest::Error),
}

/// Process-wide outbound HTTP client plus its DNS cache.
///
/// Constructed once in `main` and shared (via `Arc`) by the dispatcher's
/// primary-forward path and the mirror writer.
pub struct HttpClientPool {
    client: Client,
    dns_cache: Arc<DnsCache>,
}

impl HttpClientPool {
    /// Build the shared client and spawn its DNS-cache refresh task.
    pub fn new(config: HttpClientConfig) -> Result<Arc<Self>, HttpClientError> {
        let dns_cache = Arc::new(DnsCache::new());

        let client = Client::builder()
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .pool_idle_timeout(config.pool_idle_timeout)
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .dns_resolver(dns_cache.clone())
            .build()
            .map_err(HttpClientError::Build)?;

        tokio::spawn(dns_cache.clone().refresh_loop());

        Ok(Arc::new(Self { client, dns_cache }))
    }

    /// The shared client. `reqwest::Client` is cheaply `Clone`; callers may
    /// clone it freely without losing the connection pool.
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Number of distinct hostnames currently cached (test/diagnostic hook).
    pub fn cached_host_count(&self) -> usize {
        self.dns_cache.entries.read().len()
    }
}

/// A cached DNS resolver implementing `reqwest::dns::Resolve`.
///
/// Entries are resolved on first use and refreshed every
/// [`DNS_REFRESH_INTERVAL`] by a background task; names that fail to
/// re-resolve are evicted (negative-entry clearing) rather than served
/// stale forever.
struct DnsCache {
    entries: Arc<RwLock<HashMap<String, Vec<SocketAddr>>>>,
}

impl DnsCache {
    fn new() -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    async fn refresh_loop(self: Arc<Self>) {
        let mut interval = tokio::time::interval(DNS_REFRESH_INTERVAL);
        interval.tick().await; // first tick fires immediately; skip it
        loop {
            interval.tick().await;
            let names: Vec<String> = self.entries.read().keys().cloned().collect();
            for name in names {
                match resolve_name(&name).await {
                    Ok(addrs) => {
                        self.entries.write().insert(name, addrs);
                    }
                    Err(_) => {
                        self.entries.write().remove(&name);
                    }
                }
            }
        }
    }
}

impl Resolve for DnsCache {
    fn resolve(&self, name: Name) -> Resolving {
        let cached = self.entries.read().get(name.as_str()).cloned();
        if let Some(addrs) = cached {
            return Box::pin(async move { Ok(Box::new(addrs.into_iter()) as Addrs) });
        }

        let entries = self.entries.clone();
        let host = name.as_str().to_string();
        Box::pin(async move {
            let addrs = resolve_name(&host)
                .await
                .map_err(|e| -> Box<dyn std::error::Error + Send + Sync> { Box::new(e) })?;
            entries.write().insert(host, addrs.clone());
            Ok(Box::new(addrs.into_iter()) as Addrs)
        })
    }
}

async fn resolve_name(host: &str) -> std::io::Result<Vec<SocketAddr>> {
    let addrs: Vec<SocketAddr> = tokio::net::lookup_host((host, 0u16)).await?.collect();
    if addrs.is_empty() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("no addresses for {host}"),
        ));
    }
    Ok(addrs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = HttpClientConfig::default();
        assert_eq!(config.pool_max_idle_per_host, 10);
        assert_eq!(config.request_timeout, Duration::from_secs(60));
    }

    #[tokio::test]
    async fn test_pool_builds() {
        let pool = HttpClientPool::new(HttpClientConfig::default()).unwrap();
        assert_eq!(pool.cached_host_count(), 0);
    }
}
