//! Payment URIs: `scheme:address?amount=<decimal>&assetid=<hex>`.
//!
//! Amounts travel as 8-decimal strings and convert exactly to integer
//! satoshi. The amount parameter is omitted when zero; the assetid
//! parameter is omitted only when it equals the network policy asset
//! and the amount is also omitted.

use std::str::FromStr;

use lwk_wollet::elements::{Address, AssetId};

use crate::error::{Error, Result};
use crate::network::Network;

const SATS_PER_UNIT: u64 = 100_000_000;

/// A parsed payment request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentRequest {
    pub address: Address,
    /// Requested amount in satoshi; zero when the URI carries no amount.
    pub amount: u64,
    pub asset: AssetId,
}

/// Render an integer satoshi amount as a trimmed decimal string.
fn format_amount(sats: u64) -> String {
    let whole = sats / SATS_PER_UNIT;
    let frac = sats % SATS_PER_UNIT;
    if frac == 0 {
        return whole.to_string();
    }
    let s = format!("{whole}.{frac:08}");
    s.trim_end_matches('0').to_string()
}

/// Parse a decimal amount string into integer satoshi, exactly.
fn parse_amount(s: &str) -> Result<u64> {
    let bad = || Error::PaymentUri(format!("invalid amount: {s}"));
    let (whole, frac) = match s.split_once('.') {
        Some((w, f)) => (w, f),
        None => (s, ""),
    };
    if whole.is_empty() && frac.is_empty() {
        return Err(bad());
    }
    if frac.len() > 8 {
        return Err(Error::PaymentUri(format!(
            "amount has more than 8 decimal places: {s}"
        )));
    }
    let whole: u64 = if whole.is_empty() {
        0
    } else {
        whole.parse().map_err(|_| bad())?
    };
    let padded = format!("{frac:0<8}");
    let frac: u64 = padded.parse().map_err(|_| bad())?;
    whole
        .checked_mul(SATS_PER_UNIT)
        .and_then(|w| w.checked_add(frac))
        .ok_or(Error::AmountOverflow)
}

/// Build a payment URI for the given request.
pub fn encode_payment_uri(
    network: Network,
    address: &Address,
    amount: u64,
    asset: AssetId,
) -> String {
    let scheme = network.payment_scheme();
    let mut uri = format!("{scheme}:{address}");
    let mut sep = '?';
    if amount > 0 {
        uri.push(sep);
        uri.push_str(&format!("amount={}", format_amount(amount)));
        sep = '&';
    }
    if asset != network.policy_asset() || amount > 0 {
        uri.push(sep);
        uri.push_str(&format!("assetid={asset}"));
    }
    uri
}

/// Parse a payment URI. Missing amount means zero; missing assetid means
/// the network policy asset.
pub fn parse_payment_uri(network: Network, uri: &str) -> Result<PaymentRequest> {
    let scheme = network.payment_scheme();
    let rest = uri
        .strip_prefix(scheme)
        .and_then(|r| r.strip_prefix(':'))
        .ok_or_else(|| Error::PaymentUri(format!("expected scheme {scheme}:")))?;

    let (addr_str, query) = match rest.split_once('?') {
        Some((a, q)) => (a, Some(q)),
        None => (rest, None),
    };

    let address = Address::from_str(addr_str)
        .map_err(|e| Error::PaymentUri(format!("bad address: {e}")))?;
    if Network::from_address(&address)? != network {
        return Err(Error::PaymentUri(format!(
            "address {addr_str} does not belong to {}",
            network.as_str()
        )));
    }

    let mut amount = 0u64;
    let mut asset = network.policy_asset();
    if let Some(query) = query {
        for pair in query.split('&').filter(|p| !p.is_empty()) {
            let (key, value) = pair
                .split_once('=')
                .ok_or_else(|| Error::PaymentUri(format!("bad query parameter: {pair}")))?;
            match key {
                "amount" => amount = parse_amount(value)?,
                "assetid" => {
                    asset = AssetId::from_str(value)
                        .map_err(|e| Error::PaymentUri(format!("bad assetid: {e}")))?;
                }
                _ => {} // unknown parameters are ignored
            }
        }
    }

    Ok(PaymentRequest {
        address,
        amount,
        asset,
    })
}
