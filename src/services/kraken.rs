use crate::constants::{api_base, HTTP_TIMEOUT};
use crate::error::{AppError, Result};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use tracing::{debug, warn};

/// Envelope shared by every Kraken public endpoint:
/// `{ "error": [...], "result": {...} }`
#[derive(Debug, Deserialize)]
struct KrakenResponse<T> {
    #[serde(default)]
    error: Vec<String>,
    result: Option<T>,
}

impl<T> KrakenResponse<T> {
    fn into_result(self) -> Result<T> {
        if !self.error.is_empty() {
            return Err(AppError::Network(format!(
                "Kraken API error: {}",
                self.error.join(", ")
            )));
        }
        self.result
            .ok_or_else(|| AppError::Parse("Kraken response missing 'result' field".to_string()))
    }
}

/// `/public/Time` payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerTime {
    pub unixtime: Option<i64>,
    pub rfc1123: Option<String>,
}

/// One `/public/AssetPairs` entry; only the fields the pipeline reads
#[derive(Debug, Clone, Deserialize)]
struct AssetPairInfo {
    base: Option<String>,
    quote: Option<String>,
}

/// One `/public/Ticker` entry. Kraken encodes numbers as string arrays:
/// `c` = [price, lot volume], `v`/`h`/`l` = [today, last 24h].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TickerInfo {
    pub c: Option<Vec<String>>,
    pub v: Option<Vec<String>>,
    pub h: Option<Vec<String>>,
    pub l: Option<Vec<String>>,
}

impl TickerInfo {
    pub fn price(&self) -> Option<f64> {
        self.c.as_ref()?.first()?.parse().ok()
    }

    pub fn volume_24h(&self) -> Option<f64> {
        self.v.as_ref()?.get(1)?.parse().ok()
    }

    pub fn high_24h(&self) -> Option<f64> {
        self.h.as_ref()?.get(1)?.parse().ok()
    }

    pub fn low_24h(&self) -> Option<f64> {
        self.l.as_ref()?.get(1)?.parse().ok()
    }
}

/// Pair metadata joined with its 24h ticker volume, decoded once at the
/// fetch boundary. The raw volume string is kept as-is; the ranking stage
/// owns the decimal parse and its skip policy.
#[derive(Debug, Clone, Serialize)]
pub struct PairListing {
    pub name: String,
    pub base: Option<String>,
    pub quote: Option<String>,
    pub volume_24h: Option<String>,
}

/// Raw `/public/OHLC` entry:
/// [time, open, high, low, close, vwap, volume, count]
#[derive(Debug, Clone, Deserialize)]
struct RawCandle(i64, String, String, String, String, String, String, i64);

#[derive(Debug, Deserialize)]
struct OhlcResult {
    #[allow(dead_code)]
    last: Option<i64>,
    #[serde(flatten)]
    pairs: HashMap<String, Vec<RawCandle>>,
}

/// A decoded 5-minute OHLC candle
#[derive(Debug, Clone, PartialEq)]
pub struct Candle {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl TryFrom<RawCandle> for Candle {
    type Error = AppError;

    fn try_from(raw: RawCandle) -> Result<Candle> {
        let timestamp = Utc
            .timestamp_opt(raw.0, 0)
            .single()
            .ok_or_else(|| AppError::Parse(format!("invalid candle timestamp: {}", raw.0)))?;
        let parse = |field: &str, value: &str| -> Result<f64> {
            value
                .parse()
                .map_err(|_| AppError::Parse(format!("invalid candle {}: {:?}", field, value)))
        };
        Ok(Candle {
            timestamp,
            open: parse("open", &raw.1)?,
            high: parse("high", &raw.2)?,
            low: parse("low", &raw.3)?,
            close: parse("close", &raw.4)?,
            volume: parse("volume", &raw.6)?,
        })
    }
}

/// Upstream market-data source behind the snapshot pipeline.
///
/// A trait seam so the pipeline and persistence logic are testable
/// without the network.
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    /// Upstream server time/status heartbeat
    async fn server_status(&self) -> Result<ServerTime>;

    /// All tradable pairs joined with their 24h ticker volume
    async fn trading_pairs(&self) -> Result<HashMap<String, PairListing>>;

    /// Live ticker detail for one pair, keyed by pair name
    async fn pair_ticker(&self, pair: &str) -> Result<HashMap<String, TickerInfo>>;

    /// Historical candle series for one pair, anchored at `since`
    async fn ohlc(&self, pair: &str, interval_minutes: u32, since: i64) -> Result<Vec<Candle>>;
}

/// Kraken public REST client with a fixed 10-second per-call timeout
pub struct KrakenClient {
    http: reqwest::Client,
    base_url: String,
}

impl KrakenClient {
    pub fn new() -> Result<Self> {
        Self::with_base_url(api_base())
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Result<Self> {
        let base_url = base_url.into();
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(AppError::Config(format!(
                "Invalid API base URL, must start with http:// or https://: '{}'",
                base_url
            )));
        }

        let http = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| AppError::Network(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn get<T: DeserializeOwned>(&self, path_and_query: &str) -> Result<T> {
        let url = format!("{}{}", self.base_url, path_and_query);
        debug!(%url, "Fetching from Kraken");

        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| AppError::Network(format!("Request to {} failed: {}", url, e)))?;

        if !response.status().is_success() {
            return Err(AppError::Network(format!(
                "Kraken returned status {} for {}",
                response.status(),
                url
            )));
        }

        let envelope: KrakenResponse<T> = response
            .json()
            .await
            .map_err(|e| AppError::Parse(format!("Failed to decode {} response: {}", url, e)))?;
        envelope.into_result()
    }
}

/// Join asset-pair metadata with ticker volumes, decoding each entry
/// independently. A malformed entry never aborts the listing: its typed
/// fields come back as `None` (or the entry is dropped) and the ranking
/// stage skips it.
fn merge_listings(
    pairs: HashMap<String, Value>,
    mut tickers: HashMap<String, Value>,
) -> HashMap<String, PairListing> {
    let mut listings = HashMap::with_capacity(pairs.len());
    for (name, value) in pairs {
        let info: AssetPairInfo = match serde_json::from_value(value) {
            Ok(info) => info,
            Err(e) => {
                debug!(pair = %name, error = %e, "Dropping pair with malformed metadata");
                continue;
            }
        };

        let volume_24h = tickers
            .remove(&name)
            .and_then(|v| match serde_json::from_value::<TickerInfo>(v) {
                Ok(ticker) => ticker.v.and_then(|v| v.get(1).cloned()),
                Err(e) => {
                    debug!(pair = %name, error = %e, "Dropping malformed ticker entry");
                    None
                }
            });

        listings.insert(
            name.clone(),
            PairListing {
                name,
                base: info.base,
                quote: info.quote,
                volume_24h,
            },
        );
    }
    listings
}

#[async_trait]
impl MarketDataSource for KrakenClient {
    async fn server_status(&self) -> Result<ServerTime> {
        self.get("/public/Time").await
    }

    async fn trading_pairs(&self) -> Result<HashMap<String, PairListing>> {
        let pairs: HashMap<String, Value> = self.get("/public/AssetPairs").await?;
        let tickers: HashMap<String, Value> = self.get("/public/Ticker").await?;
        Ok(merge_listings(pairs, tickers))
    }

    async fn pair_ticker(&self, pair: &str) -> Result<HashMap<String, TickerInfo>> {
        self.get(&format!("/public/Ticker?pair={}", pair)).await
    }

    async fn ohlc(&self, pair: &str, interval_minutes: u32, since: i64) -> Result<Vec<Candle>> {
        let mut result: OhlcResult = self
            .get(&format!(
                "/public/OHLC?pair={}&interval={}&since={}",
                pair, interval_minutes, since
            ))
            .await?;

        let Some(raw_candles) = result.pairs.remove(pair) else {
            debug!(%pair, "OHLC response contains no series for pair");
            return Ok(Vec::new());
        };

        let mut candles = Vec::with_capacity(raw_candles.len());
        for raw in raw_candles {
            match Candle::try_from(raw) {
                Ok(candle) => candles.push(candle),
                Err(e) => warn!(%pair, error = %e, "Skipping unparseable candle"),
            }
        }
        Ok(candles)
    }
}
