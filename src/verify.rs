//! Value-conservation checks run before a signature is requested.
//! Every violation is fatal to the whole build.

use std::collections::HashMap;

use lwk_wollet::elements::AssetId;

use crate::builder::{OutputKind, TransactionProposal};
use crate::error::{Error, Result};

/// Hardcoded absolute ceiling on the total fee, independent of the
/// rate that produced it. Guards against fee-estimation blow-ups.
pub const FEE_GUARD: u64 = 100_000;

/// Verify the proposal conserves value per asset and that the fee is
/// sane: `total_out + fees == total_in` exactly for every asset,
/// `fees <= total_out`, and `fees <= FEE_GUARD`.
pub fn verify_conservation(proposal: &TransactionProposal) -> Result<()> {
    let mut total_in: HashMap<AssetId, u64> = HashMap::new();
    let mut total_out: HashMap<AssetId, u64> = HashMap::new();
    let mut fees: HashMap<AssetId, u64> = HashMap::new();

    for utxo in &proposal.inputs {
        add(&mut total_in, utxo.secrets.asset, utxo.secrets.value)?;
    }
    for output in &proposal.outputs {
        let bucket = if output.kind == OutputKind::Fee {
            &mut fees
        } else {
            &mut total_out
        };
        add(bucket, output.asset, output.amount)?;
    }

    let mut assets: Vec<AssetId> = total_in
        .keys()
        .chain(total_out.keys())
        .chain(fees.keys())
        .copied()
        .collect();
    assets.sort();
    assets.dedup();

    for asset in assets {
        let asset_in = total_in.get(&asset).copied().unwrap_or(0);
        let asset_out = total_out.get(&asset).copied().unwrap_or(0);
        let asset_fees = fees.get(&asset).copied().unwrap_or(0);
        let spent = asset_out
            .checked_add(asset_fees)
            .ok_or(Error::AmountOverflow)?;
        if spent != asset_in {
            return Err(Error::ConservationViolation {
                asset,
                total_in: asset_in,
                total_out: asset_out,
                fees: asset_fees,
            });
        }
    }

    let fees_total: u64 = fees.values().sum();
    let out_total: u64 = total_out.values().sum();
    if fees_total > out_total {
        return Err(Error::FeeTooHigh {
            fees: fees_total,
            bound: out_total,
        });
    }
    if fees_total > FEE_GUARD {
        return Err(Error::FeeTooHigh {
            fees: fees_total,
            bound: FEE_GUARD,
        });
    }
    Ok(())
}

fn add(bucket: &mut HashMap<AssetId, u64>, asset: AssetId, value: u64) -> Result<()> {
    let slot = bucket.entry(asset).or_default();
    *slot = slot.checked_add(value).ok_or(Error::AmountOverflow)?;
    Ok(())
}
