//! Fee-rate source: Esplora-style `/fee-estimates` over HTTP, with a
//! short-lived cache and a hardcoded fallback when the endpoint is
//! unreachable or malformed.

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::error::{Error, Result};

/// Fallback fee rate (sat/vbyte) when no usable estimate is available.
/// Liquid's minimum relay rate.
pub const FALLBACK_FEE_RATE: f64 = 0.1;

/// Fallback confirmation target paired with the fallback rate.
pub const FALLBACK_TARGET: u32 = 2;

/// How long fetched estimates stay fresh.
const CACHE_TTL: Duration = Duration::from_secs(60);

/// A fee rate with the confirmation target it was estimated for.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeeQuote {
    pub rate_sat_vb: f64,
    pub target_blocks: u32,
}

impl FeeQuote {
    pub fn fallback() -> Self {
        Self {
            rate_sat_vb: FALLBACK_FEE_RATE,
            target_blocks: FALLBACK_TARGET,
        }
    }
}

/// External fee-estimate source: confirmation target → sat/vbyte.
pub trait FeeSource: Send + Sync {
    fn fee_estimates(&self) -> Result<BTreeMap<u32, f64>>;
}

/// Esplora `/fee-estimates` endpoint.
pub struct EsploraFeeSource {
    base_url: String,
    client: reqwest::blocking::Client,
}

impl EsploraFeeSource {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: reqwest::blocking::Client::new(),
        }
    }
}

impl FeeSource for EsploraFeeSource {
    fn fee_estimates(&self) -> Result<BTreeMap<u32, f64>> {
        let url = format!("{}/fee-estimates", self.base_url);
        let body = self
            .client
            .get(&url)
            .timeout(Duration::from_secs(10))
            .send()
            .map_err(|e| Error::Query(format!("fee estimates: {e}")))?
            .text()
            .map_err(|e| Error::Query(format!("fee estimates read: {e}")))?;
        parse_fee_estimates(&body)
    }
}

/// Decode an Esplora `/fee-estimates` body: a JSON object mapping
/// confirmation targets to sat/vbyte rates, all finite and positive.
fn parse_fee_estimates(body: &str) -> Result<BTreeMap<u32, f64>> {
    let raw: BTreeMap<String, f64> = serde_json::from_str(body)
        .map_err(|e| Error::Query(format!("fee estimates decode: {e}")))?;

    let mut estimates = BTreeMap::new();
    for (target, rate) in raw {
        let target: u32 = target
            .parse()
            .map_err(|_| Error::Query(format!("bad confirmation target: {target}")))?;
        if !rate.is_finite() || rate <= 0.0 {
            return Err(Error::Query(format!("bad fee rate for target {target}")));
        }
        estimates.insert(target, rate);
    }
    Ok(estimates)
}

/// Maps a 0–1 priority to a concrete fee quote, caching estimates briefly.
pub struct FeeEstimator {
    source: Box<dyn FeeSource>,
    cache: Mutex<Option<(Instant, BTreeMap<u32, f64>)>>,
}

impl FeeEstimator {
    pub fn new(source: Box<dyn FeeSource>) -> Self {
        Self {
            source,
            cache: Mutex::new(None),
        }
    }

    /// Quote a fee rate for a priority in `[0, 1]`; 1 is fastest and
    /// maps to the lowest available confirmation target. A failed or
    /// malformed fetch yields the hardcoded fallback, never an error.
    pub fn quote(&self, priority: f64) -> FeeQuote {
        let estimates = match self.estimates() {
            Ok(e) if !e.is_empty() => e,
            Ok(_) => {
                log::warn!("fee source returned no estimates, using fallback");
                return FeeQuote::fallback();
            }
            Err(e) => {
                log::warn!("fee estimate fetch failed ({e}), using fallback");
                return FeeQuote::fallback();
            }
        };

        let priority = priority.clamp(0.0, 1.0);
        let targets: Vec<u32> = estimates.keys().copied().collect();
        // Invert: priority 1 = fastest = lowest target.
        let idx = ((1.0 - priority) * (targets.len() - 1) as f64).round() as usize;
        let target_blocks = targets[idx];
        FeeQuote {
            rate_sat_vb: estimates[&target_blocks],
            target_blocks,
        }
    }

    fn estimates(&self) -> Result<BTreeMap<u32, f64>> {
        let mut cache = self.cache.lock().unwrap_or_else(|p| p.into_inner());
        if let Some((fetched, estimates)) = cache.as_ref()
            && fetched.elapsed() < CACHE_TTL
        {
            return Ok(estimates.clone());
        }
        let estimates = self.source.fee_estimates()?;
        *cache = Some((Instant::now(), estimates.clone()));
        Ok(estimates)
    }
}
