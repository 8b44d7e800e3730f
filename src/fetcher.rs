//! HTTP fetcher for downloading blacklists and country lists.

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, error, info};

use crate::config::CountrySource;
use crate::error::{BlackholeError, Result};
use crate::lists::{normalize, AddressSet, ListMode};
use crate::policy::IpVersion;

/// Per-source timeout
pub const FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Maximum concurrent HTTP requests
pub const MAX_CONCURRENT_FETCHES: usize = 8;

/// User agent sent to list servers
pub const USER_AGENT: &str = concat!(
    "Mozilla/5.0 (compatible; nft-blackhole/",
    env!("CARGO_PKG_VERSION"),
    ")"
);

/// Retrieval of the text behind a source location
#[async_trait]
pub trait SourceClient: Send + Sync {
    /// Fetch the body of `location` as text
    async fn fetch_text(&self, location: &str) -> Result<String>;
}

/// reqwest-backed client (rustls, certificate validation on)
pub struct HttpSourceClient {
    client: Client,
}

impl HttpSourceClient {
    /// Create a new client with the default timeout
    pub fn new() -> Result<Self> {
        Self::with_timeout(FETCH_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| BlackholeError::config(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl SourceClient for HttpSourceClient {
    async fn fetch_text(&self, location: &str) -> Result<String> {
        let fail = |reason: String| BlackholeError::Fetch {
            location: location.to_string(),
            reason,
        };

        let response = self
            .client
            .get(location)
            .send()
            .await
            .map_err(|e| fail(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(fail(format!("HTTP {}", status)));
        }

        let body = response.bytes().await.map_err(|e| fail(e.to_string()))?;
        String::from_utf8(body.to_vec()).map_err(|_| fail("body is not valid UTF-8".to_string()))
    }
}

/// Concurrent, failure-isolated retrieval of many sources
pub struct Fetcher {
    client: Box<dyn SourceClient>,
    timeout: Duration,
}

impl Fetcher {
    /// Create a fetcher backed by HTTP
    pub fn new() -> Result<Self> {
        Ok(Self::with_client(HttpSourceClient::new()?))
    }

    /// Create a fetcher over any source client
    pub fn with_client(client: impl SourceClient + 'static) -> Self {
        Self {
            client: Box::new(client),
            timeout: FETCH_TIMEOUT,
        }
    }

    /// Override the per-source timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Fetch one source, bounded by the per-source timeout
    async fn fetch_one(&self, location: &str) -> Result<String> {
        match tokio::time::timeout(self.timeout, self.client.fetch_text(location)).await {
            Ok(result) => result,
            Err(_) => Err(BlackholeError::Fetch {
                location: location.to_string(),
                reason: format!("timed out after {}s", self.timeout.as_secs_f32()),
            }),
        }
    }

    /// Fetch all sources with at most [`MAX_CONCURRENT_FETCHES`] in flight.
    ///
    /// Results come back in completion order. A failed source is logged and
    /// reported in its slot; it never stops the others.
    pub async fn fetch_all(&self, sources: &[String]) -> Vec<(String, Result<String>)> {
        stream::iter(sources.iter().map(|location| async move {
            debug!("Fetching {}", location);
            let result = self.fetch_one(location).await;
            if let Err(ref e) = result {
                error!("{}", e);
            }
            (location.clone(), result)
        }))
        .buffer_unordered(MAX_CONCURRENT_FETCHES)
        .collect()
        .await
    }

    /// Fetch sources and merge them into one set; failed sources add nothing
    pub async fn collect(&self, sources: &[String], mode: ListMode, version: IpVersion) -> AddressSet {
        let mut set = AddressSet::new(version);
        if sources.is_empty() {
            return set;
        }

        let results = self.fetch_all(sources).await;
        let failed = results.iter().filter(|(_, r)| r.is_err()).count();

        for (_, result) in &results {
            if let Ok(body) = result {
                set.extend_lenient(normalize(body, mode));
            }
        }

        info!(
            "Fetched {} of {} {} sources - {} entries",
            results.len() - failed,
            results.len(),
            version,
            set.len()
        );
        set
    }

    /// Fetch the blacklist sources of one IP version
    pub async fn fetch_blacklist(&self, sources: &[String], version: IpVersion) -> AddressSet {
        self.collect(sources, ListMode::Filtered, version).await
    }

    /// Fetch the country lists of one IP version
    pub async fn fetch_countries<'a, I>(
        &self,
        provider: CountrySource,
        countries: I,
        version: IpVersion,
    ) -> AddressSet
    where
        I: IntoIterator<Item = &'a String>,
    {
        let urls: Vec<String> = countries
            .into_iter()
            .map(|country| country_url(provider, country, version))
            .collect();
        self.collect(&urls, ListMode::Raw, version).await
    }
}

/// URL of a country's CIDR list at the given provider
pub fn country_url(provider: CountrySource, country: &str, version: IpVersion) -> String {
    let country = country.to_ascii_lowercase();
    match (provider, version) {
        (CountrySource::Herrbischoff, _) => format!(
            "https://raw.githubusercontent.com/herrbischoff/country-ip-blocks/master/ip{}/{}.cidr",
            version, country
        ),
        (CountrySource::Ipdeny, IpVersion::V4) => format!(
            "http://ipdeny.com/ipblocks/data/aggregated/{}-aggregated.zone",
            country
        ),
        (CountrySource::Ipdeny, IpVersion::V6) => format!(
            "http://ipdeny.com/ipv6/ipaddresses/aggregated/{}-aggregated.zone",
            country
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Serves canned bodies; unknown locations fail
    struct StaticClient {
        bodies: HashMap<String, String>,
        delay: Option<Duration>,
        in_flight: Arc<AtomicUsize>,
        peak: Arc<AtomicUsize>,
    }

    impl StaticClient {
        fn new(bodies: &[(&str, &str)]) -> Self {
            Self {
                bodies: bodies
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
                delay: None,
                in_flight: Arc::new(AtomicUsize::new(0)),
                peak: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    #[async_trait]
    impl SourceClient for StaticClient {
        async fn fetch_text(&self, location: &str) -> Result<String> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            self.bodies
                .get(location)
                .cloned()
                .ok_or_else(|| BlackholeError::Fetch {
                    location: location.to_string(),
                    reason: "connection refused".to_string(),
                })
        }
    }

    fn urls(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_fetch_all_isolates_failures() {
        let fetcher = Fetcher::with_client(StaticClient::new(&[("https://a/list", "1.2.3.4\n")]));
        let results = fetcher
            .fetch_all(&urls(&["https://a/list", "https://dead/list"]))
            .await;

        assert_eq!(results.len(), 2);
        let ok: Vec<_> = results.iter().filter(|(_, r)| r.is_ok()).collect();
        let failed: Vec<_> = results.iter().filter(|(_, r)| r.is_err()).collect();
        assert_eq!(ok.len(), 1);
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].0, "https://dead/list");
    }

    #[tokio::test]
    async fn test_collect_is_union_of_successful_sources() {
        let fetcher = Fetcher::with_client(StaticClient::new(&[
            ("https://a/list", "# feed a\n1.2.3.4\n10.0.0.0/8\n"),
            ("https://b/list", "10.0.0.0/8\n\n5.6.7.0/24\n"),
        ]));
        let set = fetcher
            .fetch_blacklist(
                &urls(&["https://a/list", "https://dead/list", "https://b/list"]),
                IpVersion::V4,
            )
            .await;

        let rendered: Vec<String> = set.iter().map(|e| e.to_string()).collect();
        assert_eq!(rendered, vec!["1.2.3.4", "5.6.7.0/24", "10.0.0.0/8"]);
    }

    #[tokio::test]
    async fn test_collect_all_failed_is_empty() {
        let fetcher = Fetcher::with_client(StaticClient::new(&[]));
        let set = fetcher
            .fetch_blacklist(&urls(&["https://x/1", "https://x/2"]), IpVersion::V4)
            .await;
        assert!(set.is_empty());
    }

    #[tokio::test]
    async fn test_timeout_counts_as_failure() {
        let mut client = StaticClient::new(&[("https://slow/list", "1.2.3.4\n")]);
        client.delay = Some(Duration::from_secs(5));
        let fetcher = Fetcher::with_client(client).with_timeout(Duration::from_millis(50));

        let results = fetcher.fetch_all(&urls(&["https://slow/list"])).await;
        let err = results[0].1.as_ref().unwrap_err();
        assert!(err.to_string().contains("timed out"));
        assert!(!err.is_fatal());
    }

    #[tokio::test]
    async fn test_concurrency_reaches_bound() {
        let bodies: Vec<(String, String)> = (0..20)
            .map(|i| (format!("https://s/{}", i), format!("10.0.{}.0/24\n", i)))
            .collect();
        let refs: Vec<(&str, &str)> = bodies.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();
        let mut client = StaticClient::new(&refs);
        client.delay = Some(Duration::from_millis(20));
        let peak = client.peak.clone();

        let fetcher = Fetcher::with_client(client);
        let sources: Vec<String> = bodies.iter().map(|(k, _)| k.clone()).collect();
        let set = fetcher.fetch_blacklist(&sources, IpVersion::V4).await;

        assert_eq!(set.len(), 20);
        // fetches overlap, up to the bound and never past it
        assert_eq!(peak.load(Ordering::SeqCst), MAX_CONCURRENT_FETCHES);
    }

    #[tokio::test]
    async fn test_fetch_countries_uses_raw_mode() {
        let url = country_url(CountrySource::Herrbischoff, "no", IpVersion::V4);
        let fetcher = Fetcher::with_client(StaticClient::new(&[(url.as_str(), "1.0.0.0/24\n2.0.0.0/24\n")]));
        let countries = vec!["no".to_string()];
        let set = fetcher
            .fetch_countries(CountrySource::Herrbischoff, &countries, IpVersion::V4)
            .await;
        assert_eq!(set.len(), 2);
    }

    #[tokio::test]
    async fn test_no_sources_no_fetch() {
        let fetcher = Fetcher::with_client(StaticClient::new(&[]));
        let set = fetcher.fetch_blacklist(&[], IpVersion::V6).await;
        assert!(set.is_empty());
        assert_eq!(set.version(), IpVersion::V6);
    }

    #[test]
    fn test_country_urls() {
        assert_eq!(
            country_url(CountrySource::Herrbischoff, "CN", IpVersion::V4),
            "https://raw.githubusercontent.com/herrbischoff/country-ip-blocks/master/ipv4/cn.cidr"
        );
        assert_eq!(
            country_url(CountrySource::Herrbischoff, "no", IpVersion::V6),
            "https://raw.githubusercontent.com/herrbischoff/country-ip-blocks/master/ipv6/no.cidr"
        );
        assert_eq!(
            country_url(CountrySource::Ipdeny, "de", IpVersion::V4),
            "http://ipdeny.com/ipblocks/data/aggregated/de-aggregated.zone"
        );
        assert_eq!(
            country_url(CountrySource::Ipdeny, "de", IpVersion::V6),
            "http://ipdeny.com/ipv6/ipaddresses/aggregated/de-aggregated.zone"
        );
    }

    #[test]
    fn test_user_agent_identifies_tool() {
        assert!(USER_AGENT.contains("nft-blackhole/"));
    }
}
