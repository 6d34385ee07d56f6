//! Blinding orchestration: proposal → PSET v2 → commitments and proofs.
//!
//! Every output that needs blinding is anchored to a wallet-owned
//! input via its blinder index. When such an anchor exists the PSET is
//! blinded in one shot with the last-output balancing step
//! ([`BlindingOrder::Last`]); the non-last ordering is reserved for
//! multi-party flows where another participant owns the anchor input
//! and is unreachable in the current single-signer flow.

use std::collections::HashMap;

use lwk_wollet::elements::pset::PartiallySignedTransaction;
use lwk_wollet::elements::{Sequence, secp256k1_zkp};
use rand::thread_rng;

use crate::account::AddressContext;
use crate::builder::TransactionProposal;
use crate::error::{Error, Result};

/// Sequencing mode for output blinding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlindingOrder {
    /// All blinder indices anchor to wallet-owned inputs; blind in one
    /// shot with the last output balancing the blinding factors.
    Last,
    /// Some anchor input is not the wallet's. Reserved for multi-party
    /// flows; unreachable in a single-signer wallet.
    NonLast,
}

/// Decide the blinding order for a proposal.
pub fn blinding_order(ctx: &AddressContext, proposal: &TransactionProposal) -> BlindingOrder {
    let anchored = proposal
        .inputs
        .iter()
        .any(|u| ctx.owns(&u.txout.script_pubkey));
    if anchored {
        BlindingOrder::Last
    } else {
        BlindingOrder::NonLast
    }
}

/// Convert a proposal to an unblinded PSET v2, preserving input and
/// output order so the signer can address both by index.
pub fn proposal_to_pset(
    ctx: &AddressContext,
    proposal: &TransactionProposal,
) -> PartiallySignedTransaction {
    let mut pset = PartiallySignedTransaction::new_v2();

    // Anchor blinder indices to the first wallet-owned input.
    let anchor = proposal
        .inputs
        .iter()
        .position(|u| ctx.owns(&u.txout.script_pubkey))
        .unwrap_or(0) as u32;

    for utxo in &proposal.inputs {
        let input = lwk_wollet::elements::pset::Input {
            previous_txid: utxo.outpoint.txid,
            previous_output_index: utxo.outpoint.vout,
            witness_utxo: Some(utxo.txout.clone()),
            sequence: Some(Sequence::ENABLE_LOCKTIME_NO_RBF),
            ..Default::default()
        };
        pset.add_input(input);
    }

    for output in &proposal.outputs {
        let blinding_key = output
            .blinding_pubkey
            .map(|pk| lwk_wollet::elements::bitcoin::PublicKey {
                inner: pk,
                compressed: true,
            });
        let blinder_index = blinding_key.is_some().then_some(anchor);
        let pset_output = lwk_wollet::elements::pset::Output {
            amount: Some(output.amount),
            asset: Some(output.asset),
            script_pubkey: output.script_pubkey.clone(),
            blinding_key,
            blinder_index,
            ..Default::default()
        };
        pset.add_output(pset_output);
    }

    pset
}

/// Blind every output that carries a blinding key and attach the
/// resulting commitments and proofs. Proposals with nothing to blind
/// pass through unchanged.
pub fn blind_proposal(
    ctx: &AddressContext,
    proposal: &TransactionProposal,
) -> Result<PartiallySignedTransaction> {
    let mut pset = proposal_to_pset(ctx, proposal);

    if !proposal.outputs.iter().any(|o| o.is_confidential()) {
        return Ok(pset);
    }

    match blinding_order(ctx, proposal) {
        BlindingOrder::Last => {
            let mut input_secrets = HashMap::new();
            for (index, utxo) in proposal.inputs.iter().enumerate() {
                input_secrets.insert(index, utxo.secrets);
            }
            let secp = secp256k1_zkp::Secp256k1::new();
            let mut rng = thread_rng();
            pset.blind_last(&mut rng, &secp, &input_secrets)
                .map_err(|e| Error::BlindingFailed(format!("{e:?}")))?;
            Ok(pset)
        }
        BlindingOrder::NonLast => Err(Error::BlindingFailed(
            "non-last blinding requires a multi-party flow".into(),
        )),
    }
}
