//! Open-Meteo forecast client used as a presentation-time enrichment.
//!
//! Requests go through a one hour response cache, persisted in SQLite so
//! that separate invocations share it, and up to five retries with doubling
//! backoff. Only current variables 0 (temperature) and 1
//! (humidity) have named accessors; the remaining indices are exposed raw
//! through [`Forecast::current_value`].

use std::collections::HashMap;
use std::path::Path;
use std::thread;
use std::time::Duration;

use chrono::{NaiveDate, Utc};
use log::{debug, warn};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Result, StationError};
use crate::http::{BlockingHttp, FetchError, HttpGet};

pub const FORECAST_URL: &str = "https://api.open-meteo.com/v1/forecast";
pub const CACHE_TTL: Duration = Duration::from_secs(3600);
pub const MAX_RETRIES: u32 = 5;
pub const BACKOFF_FACTOR: Duration = Duration::from_millis(200);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForecastRequest {
    pub latitude: f64,
    pub longitude: f64,
    pub current: Vec<String>,
    pub daily: Vec<String>,
    pub timezone: String,
    pub past_days: u32,
}

impl Default for ForecastRequest {
    fn default() -> Self {
        let names = |list: &[&str]| -> Vec<String> { list.iter().map(|s| s.to_string()).collect() };
        Self {
            latitude: 47.1149,
            longitude: 8.3901,
            current: names(&[
                "temperature_2m",
                "relative_humidity_2m",
                "rain",
                "surface_pressure",
                "wind_speed_10m",
                "wind_direction_10m",
            ]),
            daily: names(&[
                "temperature_2m_max",
                "temperature_2m_min",
                "daylight_duration",
                "uv_index_max",
            ]),
            timezone: "auto".to_string(),
            past_days: 5,
        }
    }
}

impl ForecastRequest {
    pub fn url(&self, base: &str) -> Result<String> {
        let params = [
            ("latitude", self.latitude.to_string()),
            ("longitude", self.longitude.to_string()),
            ("current", self.current.join(",")),
            ("daily", self.daily.join(",")),
            ("timezone", self.timezone.clone()),
            ("past_days", self.past_days.to_string()),
        ];
        reqwest::Url::parse_with_params(base, &params)
            .map(String::from)
            .map_err(|e| StationError::Config(format!("forecast url: {}", e)))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyForecast {
    pub date: NaiveDate,
    pub temperature_2m_max: Option<f64>,
    pub temperature_2m_min: Option<f64>,
    pub daylight_duration: Option<f64>,
    pub uv_index_max: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct RawResponse {
    #[serde(default)]
    current: HashMap<String, Value>,
    #[serde(default)]
    daily: HashMap<String, Vec<Value>>,
}

/// Parsed forecast, indexed like the request that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct Forecast {
    current: Vec<Option<f64>>,
    daily: Vec<DailyForecast>,
}

impl Forecast {
    pub fn from_json(request: &ForecastRequest, body: &str) -> Result<Self> {
        let raw: RawResponse = serde_json::from_str(body)
            .map_err(|e| StationError::RemoteSource(format!("forecast: bad response: {}", e)))?;

        let current = request
            .current
            .iter()
            .map(|name| raw.current.get(name).and_then(Value::as_f64))
            .collect();

        let column = |name: &str, row: usize| -> Option<f64> {
            raw.daily.get(name)?.get(row)?.as_f64()
        };
        let mut daily = Vec::new();
        for (row, time) in raw.daily.get("time").into_iter().flatten().enumerate() {
            let text = time.as_str().unwrap_or_default();
            let date = NaiveDate::parse_from_str(text, "%Y-%m-%d").map_err(|_| {
                StationError::RemoteSource(format!("forecast: bad daily date {:?}", text))
            })?;
            daily.push(DailyForecast {
                date,
                temperature_2m_max: column("temperature_2m_max", row),
                temperature_2m_min: column("temperature_2m_min", row),
                daylight_duration: column("daylight_duration", row),
                uv_index_max: column("uv_index_max", row),
            });
        }

        Ok(Self { current, daily })
    }

    /// Current variable at `index` of the request's `current` list.
    pub fn current_value(&self, index: usize) -> Option<f64> {
        self.current.get(index).copied().flatten()
    }

    pub fn temperature(&self) -> Option<f64> {
        self.current_value(0)
    }

    pub fn humidity(&self) -> Option<f64> {
        self.current_value(1)
    }

    pub fn daily_forecast(&self) -> &[DailyForecast] {
        &self.daily
    }
}

/// Response bodies keyed by URL, valid for `ttl` across processes.
pub struct ResponseCache {
    ttl: Duration,
    conn: Connection,
}

impl ResponseCache {
    pub fn open(path: &Path, ttl: Duration) -> Result<Self> {
        let conn = Connection::open(path)
            .map_err(|e| StationError::Storage(format!("{}: {}", path.display(), e)))?;
        Self::init(conn, ttl)
    }

    pub fn in_memory(ttl: Duration) -> Result<Self> {
        Self::init(Connection::open_in_memory()?, ttl)
    }

    fn init(conn: Connection, ttl: Duration) -> Result<Self> {
        conn.execute_batch(include_str!("schemas/forecast_cache.sql"))?;
        Ok(Self { ttl, conn })
    }

    fn ttl_millis(&self) -> i64 {
        i64::try_from(self.ttl.as_millis()).unwrap_or(i64::MAX)
    }

    fn get_at(&self, url: &str, now: i64) -> Result<Option<String>> {
        let cutoff = now.saturating_sub(self.ttl_millis());
        Ok(self
            .conn
            .query_row(
                "SELECT body FROM forecast_cache WHERE url = ?1 AND fetched_at > ?2",
                params![url, cutoff],
                |row| row.get(0),
            )
            .optional()?)
    }

    /// Stores `body` and drops every entry that has outlived the TTL.
    fn insert_at(&mut self, url: &str, body: &str, now: i64) -> Result<()> {
        let cutoff = now.saturating_sub(self.ttl_millis());
        let tx = self.conn.transaction()?;
        let pruned = tx.execute(
            "DELETE FROM forecast_cache WHERE fetched_at <= ?1",
            params![cutoff],
        )?;
        tx.execute(
            "INSERT OR REPLACE INTO forecast_cache (url, fetched_at, body) VALUES (?1, ?2, ?3)",
            params![url, now, body],
        )?;
        tx.commit()?;
        if pruned > 0 {
            debug!("pruned {} stale forecast responses", pruned);
        }
        Ok(())
    }

    fn get(&self, url: &str) -> Option<String> {
        match self.get_at(url, Utc::now().timestamp_millis()) {
            Ok(body) => body,
            Err(e) => {
                warn!("forecast cache unreadable, fetching: {}", e);
                None
            }
        }
    }

    fn insert(&mut self, url: &str, body: &str) {
        if let Err(e) = self.insert_at(url, body, Utc::now().timestamp_millis()) {
            warn!("failed to cache forecast response: {}", e);
        }
    }
}

pub struct OpenMeteo<H: HttpGet = BlockingHttp> {
    http: H,
    base_url: String,
    request: ForecastRequest,
    cache: ResponseCache,
    retries: u32,
    backoff: Duration,
    forecast: Forecast,
}

impl OpenMeteo {
    /// Builds the client over the cache file at `cache_path` and fetches the
    /// first forecast.
    pub fn connect(request: ForecastRequest, cache_path: &Path) -> Result<Self> {
        let http = BlockingHttp::new(Duration::from_secs(30))
            .map_err(|e| StationError::RemoteSource(e.to_string()))?;
        let cache = ResponseCache::open(cache_path, CACHE_TTL)?;
        Self::with_http(http, FORECAST_URL, request, cache, BACKOFF_FACTOR)
    }
}

impl<H: HttpGet> OpenMeteo<H> {
    pub fn with_http(
        http: H,
        base_url: &str,
        request: ForecastRequest,
        cache: ResponseCache,
        backoff: Duration,
    ) -> Result<Self> {
        let mut client = Self {
            http,
            base_url: base_url.to_string(),
            request,
            cache,
            retries: MAX_RETRIES,
            backoff,
            forecast: Forecast {
                current: Vec::new(),
                daily: Vec::new(),
            },
        };
        client.refresh()?;
        Ok(client)
    }

    fn fetch(&mut self, url: &str) -> Result<String> {
        if let Some(body) = self.cache.get(url) {
            return Ok(body);
        }
        let mut attempt = 0;
        let body = loop {
            match self.http.get(url) {
                Ok(body) => break body,
                Err(FetchError {
                    message,
                    retryable: true,
                }) if attempt < self.retries => {
                    let delay = self.backoff * 2u32.pow(attempt);
                    warn!("forecast request failed ({}), retrying in {:?}", message, delay);
                    thread::sleep(delay);
                    attempt += 1;
                }
                Err(e) => {
                    return Err(StationError::RemoteSource(format!("forecast: {}", e)))
                }
            }
        };
        self.cache.insert(url, &body);
        Ok(body)
    }

    /// Refetches the forecast; served from cache within the TTL.
    pub fn refresh(&mut self) -> Result<()> {
        let url = self.request.url(&self.base_url)?;
        let body = self.fetch(&url)?;
        self.forecast = Forecast::from_json(&self.request, &body)?;
        Ok(())
    }

    pub fn forecast(&self) -> &Forecast {
        &self.forecast
    }

    pub fn temperature(&self) -> Option<f64> {
        self.forecast.temperature()
    }

    pub fn humidity(&self) -> Option<f64> {
        self.forecast.humidity()
    }

    pub fn daily_forecast(&self) -> &[DailyForecast] {
        self.forecast.daily_forecast()
    }
}
