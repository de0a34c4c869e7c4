//! Up/down market discovery against the Gamma metadata endpoint.
//!
//! Market identifiers are deterministic: for an asset, a timeframe and a
//! window start epoch, the slug is `{asset}-updown-{tf}-{epoch}` where
//! `epoch = floor(now_s / period) * period`. Each discovery round queries
//! the current and the previous window for every tracked asset/timeframe
//! pair, keeps only markets whose outcomes are exactly `["Up","Down"]`, and
//! drops windows that have already ended.

use crate::models::{GammaMarket, Timeframe, UpDownMarket};
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use nonzero_ext::nonzero;
use reqwest::Client;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// Default Gamma API base URL.
pub const GAMMA_API_URL: &str = "https://gamma-api.polymarket.com";

/// Errors from the discovery client.
#[derive(Error, Debug)]
pub enum DiscoveryError {
    /// HTTP transport failure.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Endpoint answered with a non-success status.
    #[error("gamma api error {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, truncated.
        body: String,
    },
}

/// Client for the market-metadata endpoint.
pub struct DiscoveryClient {
    http: Client,
    base_url: String,
    rate_limiter: Arc<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>,
}

impl DiscoveryClient {
    /// Creates a client rate-limited to 30 requests per minute.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_rate_limit(base_url, nonzero!(30u32))
    }

    /// Creates a client with a custom per-minute rate limit.
    #[must_use]
    pub fn with_rate_limit(base_url: impl Into<String>, per_minute: NonZeroU32) -> Self {
        Self {
            http: Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_default(),
            base_url: base_url.into(),
            rate_limiter: Arc::new(RateLimiter::direct(Quota::per_minute(per_minute))),
        }
    }

    /// Window start epoch (seconds) containing `now_s`.
    #[must_use]
    pub const fn window_epoch(now_s: i64, timeframe: Timeframe) -> i64 {
        let period = timeframe.period_s();
        (now_s / period) * period
    }

    /// Deterministic slug for an asset, timeframe and window epoch.
    #[must_use]
    pub fn build_slug(asset: &str, timeframe: Timeframe, window_epoch: i64) -> String {
        format!(
            "{}-updown-{}-{}",
            asset.to_lowercase(),
            timeframe.slug_segment(),
            window_epoch
        )
    }

    /// Fetches one market by slug.
    ///
    /// The endpoint's shape varies between an array of market objects and a
    /// single object; both are accepted. Returns `Ok(None)` when the slug
    /// does not resolve to a well-formed Up/Down market.
    ///
    /// # Errors
    /// Returns an error on transport failure or a non-success status.
    pub async fn fetch_market(
        &self,
        slug: &str,
        asset: &str,
        timeframe: Timeframe,
        window_epoch: i64,
    ) -> Result<Option<UpDownMarket>, DiscoveryError> {
        self.rate_limiter.until_ready().await;

        let url = format!("{}/markets?slug={}", self.base_url, slug);
        debug!(%url, "Fetching market metadata");

        let response = self.http.get(&url).header("Accept", "application/json").send().await?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(DiscoveryError::Status {
                status,
                body: body.chars().take(200).collect(),
            });
        }

        let value: serde_json::Value = response.json().await?;
        let market = match &value {
            serde_json::Value::Array(items) => items
                .iter()
                .filter_map(|v| serde_json::from_value::<GammaMarket>(v.clone()).ok())
                .next(),
            _ => serde_json::from_value::<GammaMarket>(value.clone()).ok(),
        };

        let Some(market) = market else {
            return Ok(None);
        };
        let Some((up_token_id, down_token_id)) = market.up_down_tokens() else {
            debug!(%slug, "Market outcomes are not exactly [Up, Down], skipping");
            return Ok(None);
        };

        let start_ts_ms = window_epoch * 1000;
        Ok(Some(UpDownMarket {
            asset: asset.to_lowercase(),
            timeframe,
            slug: slug.to_string(),
            start_ts_ms,
            end_ts_ms: start_ts_ms + timeframe.window_ms(),
            up_token_id,
            down_token_id,
            start_price: None,
        }))
    }

    /// Runs one discovery round for the given assets.
    ///
    /// For each asset and timeframe the current and the previous window are
    /// queried; markets whose `end_ts` is already in the past are dropped.
    /// Individual fetch failures are logged and skipped so one bad slug
    /// never aborts the round.
    pub async fn discover(&self, assets: &[String], now_ms: i64) -> Vec<UpDownMarket> {
        let now_s = now_ms / 1000;
        let mut markets = Vec::new();

        for asset in assets {
            for timeframe in Timeframe::all() {
                let current = Self::window_epoch(now_s, timeframe);
                for epoch in [current, current - timeframe.period_s()] {
                    let slug = Self::build_slug(asset, timeframe, epoch);
                    match self.fetch_market(&slug, asset, timeframe, epoch).await {
                        Ok(Some(market)) => {
                            if market.end_ts_ms < now_ms {
                                debug!(slug = %market.slug, "Window already ended, dropping");
                            } else {
                                markets.push(market);
                            }
                        }
                        Ok(None) => {}
                        Err(e) => {
                            warn!(%slug, error = %e, "Discovery fetch failed");
                        }
                    }
                }
            }
        }

        markets
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_window_epoch_alignment() {
        assert_eq!(DiscoveryClient::window_epoch(1_700_000_123, Timeframe::M5), 1_700_000_100);
        assert_eq!(DiscoveryClient::window_epoch(1_700_000_100, Timeframe::M5), 1_700_000_100);
        assert_eq!(DiscoveryClient::window_epoch(1_700_000_123, Timeframe::M15), 1_699_999_500);
    }

    #[test]
    fn test_build_slug() {
        assert_eq!(
            DiscoveryClient::build_slug("BTC", Timeframe::M5, 1_700_000_100),
            "btc-updown-5m-1700000100"
        );
        assert_eq!(
            DiscoveryClient::build_slug("eth", Timeframe::M15, 1_699_999_500),
            "eth-updown-15m-1699999500"
        );
    }

    fn gamma_body(slug: &str) -> serde_json::Value {
        serde_json::json!({
            "slug": slug,
            "outcomes": "[\"Up\", \"Down\"]",
            "clobTokenIds": "[\"tok-up\", \"tok-down\"]",
            "outcomePrices": "[\"0.3\", \"0.7\"]"
        })
    }

    #[tokio::test]
    async fn test_fetch_market_array_response() {
        let server = MockServer::start().await;
        let slug = "btc-updown-5m-1700000100";
        Mock::given(method("GET"))
            .and(path("/markets"))
            .and(query_param("slug", slug))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([gamma_body(slug)])))
            .mount(&server)
            .await;

        let client = DiscoveryClient::new(server.uri());
        let market = client
            .fetch_market(slug, "btc", Timeframe::M5, 1_700_000_100)
            .await
            .unwrap()
            .expect("market");

        assert_eq!(market.slug, slug);
        assert_eq!(market.up_token_id, "tok-up");
        assert_eq!(market.down_token_id, "tok-down");
        assert_eq!(market.start_ts_ms, 1_700_000_100_000);
        assert_eq!(market.end_ts_ms, 1_700_000_400_000);
        assert!(market.start_price.is_none());
    }

    #[tokio::test]
    async fn test_fetch_market_object_response() {
        let server = MockServer::start().await;
        let slug = "eth-updown-15m-1699999500";
        Mock::given(method("GET"))
            .and(path("/markets"))
            .respond_with(ResponseTemplate::new(200).set_body_json(gamma_body(slug)))
            .mount(&server)
            .await;

        let client = DiscoveryClient::new(server.uri());
        let market = client
            .fetch_market(slug, "eth", Timeframe::M15, 1_699_999_500)
            .await
            .unwrap()
            .expect("market");

        assert_eq!(market.timeframe, Timeframe::M15);
        assert_eq!(market.end_ts_ms - market.start_ts_ms, 900_000);
    }

    #[tokio::test]
    async fn test_fetch_market_rejects_yes_no() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/markets"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([{
                "slug": "x",
                "outcomes": "[\"Yes\", \"No\"]",
                "clobTokenIds": "[\"a\", \"b\"]"
            }])))
            .mount(&server)
            .await;

        let client = DiscoveryClient::new(server.uri());
        let market = client.fetch_market("x", "btc", Timeframe::M5, 0).await.unwrap();
        assert!(market.is_none());
    }

    #[tokio::test]
    async fn test_fetch_market_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/markets"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let client = DiscoveryClient::new(server.uri());
        let err = client.fetch_market("x", "btc", Timeframe::M5, 0).await.unwrap_err();
        assert!(matches!(err, DiscoveryError::Status { status: 500, .. }));
    }

    #[tokio::test]
    async fn test_discover_drops_ended_windows() {
        let server = MockServer::start().await;
        // The current 5m window (epoch 1700000100) ends at 1700000400000,
        // still ahead of now; the previous window has already ended and must
        // be dropped.
        let now_ms: i64 = 1_700_000_360_000;
        let now_s = now_ms / 1000;
        let current = DiscoveryClient::window_epoch(now_s, Timeframe::M5);
        let previous = current - 300;

        for epoch in [current, previous] {
            let slug = DiscoveryClient::build_slug("btc", Timeframe::M5, epoch);
            Mock::given(method("GET"))
                .and(path("/markets"))
                .and(query_param("slug", slug.as_str()))
                .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([gamma_body(&slug)])))
                .mount(&server)
                .await;
        }
        // 15m slugs and anything else: empty array.
        Mock::given(method("GET"))
            .and(path("/markets"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
            .mount(&server)
            .await;

        let client = DiscoveryClient::new(server.uri());
        let markets = client.discover(&["btc".to_string()], now_ms).await;

        assert_eq!(markets.len(), 1);
        assert_eq!(markets[0].slug, DiscoveryClient::build_slug("btc", Timeframe::M5, current));
    }
}
