use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use mathstake_sandbox::{Capability, HostFunctions, SandboxError};
use mathstake_types::{Clock, MAX_RANGE_COUNT, MAX_RANGE_WIDTH};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::Mutex;

const STOCK_BASES: &[(&str, f64)] = &[
    ("AAPL", 175.0),
    ("GOOGL", 140.0),
    ("MSFT", 380.0),
    ("AMZN", 150.0),
    ("TSLA", 250.0),
    ("META", 350.0),
    ("NVDA", 480.0),
];
const DEFAULT_STOCK_BASE: f64 = 100.0;
const STOCK_SWING: f64 = 0.05;

const CRYPTO_BASES: &[(&str, f64)] = &[
    ("BTC", 43000.0),
    ("ETH", 2300.0),
    ("SOL", 100.0),
    ("ADA", 0.5),
    ("DOT", 7.0),
    ("DOGE", 0.08),
];
const DEFAULT_CRYPTO_BASE: f64 = 1.0;
const CRYPTO_SWING: f64 = 0.10;

/// Base temperatures in °F.
const WEATHER_BASES: &[(&str, f64)] = &[
    ("NEW YORK", 55.0),
    ("LONDON", 50.0),
    ("TOKYO", 60.0),
    ("SYDNEY", 70.0),
    ("PARIS", 52.0),
];
const DEFAULT_WEATHER_BASE: f64 = 65.0;
const WEATHER_SWING_F: f64 = 10.0;

fn lookup(table: &[(&str, f64)], key: &str, default: f64) -> f64 {
    table
        .iter()
        .find(|(name, _)| *name == key)
        .map(|(_, base)| *base)
        .unwrap_or(default)
}

/// Rounds to a fixed number of decimals.
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    let scaled = value * factor;
    if !scaled.is_finite() {
        return value;
    }
    scaled.round() / factor
}

/// Deterministic value in [-1, 1] for an entity on a calendar date.
pub fn daily_variation(date: NaiveDate, entity: &str) -> f64 {
    let key = format!("{}|{}", date.format("%Y-%m-%d"), entity.trim().to_uppercase());
    let hash = blake3::hash(key.as_bytes());
    let mut head = [0u8; 8];
    head.copy_from_slice(&hash.as_bytes()[..8]);
    let unit = u64::from_le_bytes(head) as f64 / u64::MAX as f64;
    unit * 2.0 - 1.0
}

/// Simulated market and weather feed plus a seeded random source.
///
/// Quotes depend only on the entity and the clock's calendar date, so two
/// evaluations on the same day see the same value.
pub struct MarketDataSource {
    clock: Arc<dyn Clock>,
    rng: Mutex<StdRng>,
}

impl MarketDataSource {
    /// `seed = None` draws from OS entropy.
    pub fn new(clock: Arc<dyn Clock>, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            clock,
            rng: Mutex::new(rng),
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn stock_price(&self, symbol: &str) -> f64 {
        let key = symbol.trim().to_uppercase();
        let base = lookup(STOCK_BASES, &key, DEFAULT_STOCK_BASE);
        let variation = daily_variation(self.now().date_naive(), &key);
        round_to(base * (1.0 + STOCK_SWING * variation), 2)
    }

    pub fn crypto_price(&self, symbol: &str) -> f64 {
        let key = symbol.trim().to_uppercase();
        let base = lookup(CRYPTO_BASES, &key, DEFAULT_CRYPTO_BASE);
        let variation = daily_variation(self.now().date_naive(), &key);
        round_to(base * (1.0 + CRYPTO_SWING * variation), 6)
    }

    pub fn temperature_f(&self, city: &str) -> f64 {
        let key = city.trim().to_uppercase();
        let base = lookup(WEATHER_BASES, &key, DEFAULT_WEATHER_BASE);
        let variation = daily_variation(self.now().date_naive(), &key);
        round_to(base + WEATHER_SWING_F * variation, 2)
    }

    pub fn fetch_stock(&self, symbol: &str) -> Value {
        json!({
            "symbol": symbol.trim().to_uppercase(),
            "price": self.stock_price(symbol),
            "timestamp": self.now().to_rfc3339(),
        })
    }

    pub fn fetch_crypto(&self, symbol: &str) -> Value {
        json!({
            "symbol": symbol.trim().to_uppercase(),
            "price": self.crypto_price(symbol),
            "timestamp": self.now().to_rfc3339(),
        })
    }

    pub fn fetch_weather(&self, city: &str) -> Value {
        json!({
            "city": city.trim(),
            "temperature": self.temperature_f(city),
            "unit": "F",
            "timestamp": self.now().to_rfc3339(),
        })
    }

    /// `count` uniform samples from `[min, max]`, rounded to 2 decimals.
    pub async fn sample_uniform(&self, min: f64, max: f64, count: u32) -> Result<Vec<f64>, String> {
        if count == 0 || count > MAX_RANGE_COUNT {
            return Err(format!("count must be in [1, {}], got {}", MAX_RANGE_COUNT, count));
        }
        if !min.is_finite() || !max.is_finite() || min > max || max - min > MAX_RANGE_WIDTH {
            return Err(format!("invalid range [{}, {}]", min, max));
        }

        let mut rng = self.rng.lock().await;
        Ok((0..count)
            .map(|_| {
                let sample = if min == max { min } else { rng.gen_range(min..=max) };
                round_to(sample, 2)
            })
            .collect())
    }

    pub async fn fetch_random(&self, min: f64, max: f64, count: u32) -> Result<Value, String> {
        let values = self.sample_uniform(min, max, count).await?;
        Ok(json!({
            "values": values,
            "min": min,
            "max": max,
            "timestamp": self.now().to_rfc3339(),
        }))
    }
}

fn string_arg(args: &[Value], capability: Capability) -> mathstake_sandbox::Result<String> {
    args.first()
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
        .map(str::to_string)
        .ok_or_else(|| SandboxError::HostCall(format!("{} expects a non-empty string argument", capability)))
}

fn number_arg(args: &[Value], index: usize, default: f64) -> mathstake_sandbox::Result<f64> {
    match args.get(index) {
        None | Some(Value::Null) => Ok(default),
        Some(v) => v
            .as_f64()
            .ok_or_else(|| SandboxError::HostCall(format!("argument {} must be a number", index))),
    }
}

#[async_trait]
impl HostFunctions for MarketDataSource {
    async fn call(&self, capability: Capability, args: &[Value]) -> mathstake_sandbox::Result<Value> {
        match capability {
            Capability::FetchStock => Ok(self.fetch_stock(&string_arg(args, capability)?)),
            Capability::FetchCrypto => Ok(self.fetch_crypto(&string_arg(args, capability)?)),
            Capability::FetchWeather => Ok(self.fetch_weather(&string_arg(args, capability)?)),
            Capability::FetchRandom => {
                let min = number_arg(args, 0, 0.0)?;
                let max = number_arg(args, 1, 1.0)?;
                let count = number_arg(args, 2, 1.0)?;
                if count.fract() != 0.0 || count < 0.0 {
                    return Err(SandboxError::HostCall(format!(
                        "count must be a whole number, got {}",
                        count
                    )));
                }
                self.fetch_random(min, max, count as u32)
                    .await
                    .map_err(SandboxError::HostCall)
            }
        }
    }
}
