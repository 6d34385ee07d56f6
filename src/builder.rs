//! Coin selection and transaction building.
//!
//! Two-asset model: the payment asset is whatever is being sent, the
//! fee asset is always the network policy asset; when they coincide the
//! fee is drawn from the same input pool. Selection is first-fit
//! accumulation in indexer order per asset bucket — deterministic for
//! an identical ordered UTXO list and request.
//!
//! Sizing is a two-pass cycle: pass one builds a skeleton with the
//! caller's size guess and no fee output to discover the input set,
//! pass two re-selects with the estimator's virtual size and appends
//! the explicit fee output. Size depends only on input/output counts,
//! which stabilize once the bucket sizes are known, so no further
//! iteration is performed.

use lwk_wollet::elements::{Address, AssetId, Script, secp256k1_zkp};

use crate::account::AddressContext;
use crate::error::{Error, Result};
use crate::resolver::Utxo;
use crate::vsize::estimate_virtual_size;

/// Role of an output within a proposal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputKind {
    Destination,
    Change,
    Fee,
}

/// A constructed output, pre-blinding.
#[derive(Debug, Clone)]
pub struct ProposedOutput {
    pub kind: OutputKind,
    pub asset: AssetId,
    pub amount: u64,
    pub script_pubkey: Script,
    /// Blinding key for the output; `None` keeps it explicit. The fee
    /// output is always explicit and has no script.
    pub blinding_pubkey: Option<secp256k1_zkp::PublicKey>,
}

impl ProposedOutput {
    pub fn is_confidential(&self) -> bool {
        self.blinding_pubkey.is_some()
    }

    fn destination(address: &Address, asset: AssetId, amount: u64) -> Self {
        Self {
            kind: OutputKind::Destination,
            asset,
            amount,
            script_pubkey: address.script_pubkey(),
            blinding_pubkey: address.blinding_pubkey,
        }
    }

    fn change(ctx: &AddressContext, asset: AssetId, amount: u64) -> Self {
        Self {
            kind: OutputKind::Change,
            asset,
            amount,
            script_pubkey: ctx.script_pubkey().clone(),
            blinding_pubkey: Some(ctx.blinding_public_key()),
        }
    }

    fn fee(asset: AssetId, amount: u64) -> Self {
        Self {
            kind: OutputKind::Fee,
            asset,
            amount,
            script_pubkey: Script::new(),
            blinding_pubkey: None,
        }
    }
}

/// The unsigned, pre-blinding transaction: selected inputs plus the
/// destination, per-bucket change and explicit fee outputs, in that
/// order.
#[derive(Debug, Clone)]
pub struct TransactionProposal {
    pub inputs: Vec<Utxo>,
    pub outputs: Vec<ProposedOutput>,
}

impl TransactionProposal {
    /// Sum of fee-tagged output values.
    pub fn fee_amount(&self) -> u64 {
        self.outputs
            .iter()
            .filter(|o| o.kind == OutputKind::Fee)
            .map(|o| o.amount)
            .sum()
    }
}

/// A payment to construct.
#[derive(Debug, Clone)]
pub struct PrepareRequest {
    /// Amount to send, in integer minor units.
    pub amount: u64,
    pub asset: AssetId,
    pub to_address: Address,
    pub fee_rate_sat_vb: f64,
    /// Average-size guess used by the first sizing pass.
    pub size_estimate: usize,
}

/// Build a transaction proposal for the request over the given
/// candidate UTXOs (in indexer order).
pub fn prepare(
    ctx: &AddressContext,
    utxos: &[Utxo],
    request: &PrepareRequest,
) -> Result<TransactionProposal> {
    if request.amount == 0 {
        return Err(Error::Query("payment amount must be positive".into()));
    }
    if !request.fee_rate_sat_vb.is_finite() || request.fee_rate_sat_vb <= 0.0 {
        return Err(Error::Query(format!(
            "invalid fee rate: {}",
            request.fee_rate_sat_vb
        )));
    }

    let fee_asset = ctx.network().policy_asset();

    // Pass 1: skeleton from the caller's size guess, no fee output.
    let fee_guess = fee_for(request.fee_rate_sat_vb, request.size_estimate);
    let skeleton = build_once(ctx, utxos, request, fee_asset, fee_guess, false)?;

    // Pass 2: re-select with the estimated virtual size and append the
    // explicit fee output.
    let vsize = estimate_virtual_size(&skeleton, true);
    let fee = fee_for(request.fee_rate_sat_vb, vsize);
    let proposal = build_once(ctx, utxos, request, fee_asset, fee, true)?;

    log::debug!(
        "prepared proposal: {} inputs, {} outputs, vsize {}, fee {}",
        proposal.inputs.len(),
        proposal.outputs.len(),
        vsize,
        fee
    );
    Ok(proposal)
}

fn fee_for(rate_sat_vb: f64, vsize: usize) -> u64 {
    (rate_sat_vb * vsize as f64).ceil() as u64
}

fn build_once(
    ctx: &AddressContext,
    utxos: &[Utxo],
    request: &PrepareRequest,
    fee_asset: AssetId,
    fee: u64,
    include_fee_output: bool,
) -> Result<TransactionProposal> {
    let mut inputs = Vec::new();
    let mut outputs = vec![ProposedOutput::destination(
        &request.to_address,
        request.asset,
        request.amount,
    )];

    if request.asset == fee_asset {
        let target = request
            .amount
            .checked_add(fee)
            .ok_or(Error::AmountOverflow)?;
        let (selected, collected) = select(utxos, request.asset, target)?;
        inputs.extend(selected);
        if let Some(change) = change_amount(fee_asset, collected, target)? {
            outputs.push(ProposedOutput::change(ctx, fee_asset, change));
        }
    } else {
        let (payment_inputs, payment_collected) = select(utxos, request.asset, request.amount)?;
        let (fee_inputs, fee_collected) = select(utxos, fee_asset, fee)?;
        inputs.extend(payment_inputs);
        inputs.extend(fee_inputs);
        if let Some(change) = change_amount(request.asset, payment_collected, request.amount)? {
            outputs.push(ProposedOutput::change(ctx, request.asset, change));
        }
        if let Some(change) = change_amount(fee_asset, fee_collected, fee)? {
            outputs.push(ProposedOutput::change(ctx, fee_asset, change));
        }
    }

    if include_fee_output {
        outputs.push(ProposedOutput::fee(fee_asset, fee));
    }

    Ok(TransactionProposal { inputs, outputs })
}

/// First-fit accumulation over the candidates of one asset bucket, in
/// the given order, stopping as soon as the running sum meets the
/// target. A zero-valued candidate signals data corruption and aborts.
fn select(utxos: &[Utxo], asset: AssetId, target: u64) -> Result<(Vec<Utxo>, u64)> {
    let mut selected = Vec::new();
    let mut collected: u64 = 0;
    for utxo in utxos.iter().filter(|u| u.asset() == asset) {
        if collected >= target {
            break;
        }
        if utxo.value() == 0 {
            return Err(Error::InvalidUtxo {
                outpoint: utxo.outpoint,
                reason: "zero value".into(),
            });
        }
        collected = collected
            .checked_add(utxo.value())
            .ok_or(Error::AmountOverflow)?;
        selected.push(utxo.clone());
    }
    if collected < target {
        return Err(Error::InsufficientFunds {
            asset,
            required: target,
            available: collected,
        });
    }
    Ok((selected, collected))
}

/// Change is collected minus required; underflow must not occur after
/// selection and is surfaced as an invariant failure. `None` when no
/// change output is due.
fn change_amount(asset: AssetId, collected: u64, required: u64) -> Result<Option<u64>> {
    let change = collected
        .checked_sub(required)
        .ok_or(Error::InvalidChangeAmount {
            asset,
            collected,
            required,
        })?;
    Ok((change > 0).then_some(change))
}
