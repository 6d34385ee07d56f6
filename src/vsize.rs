//! Virtual-size estimation for unsigned proposals.
//!
//! Pure and deterministic so the two-pass build can call it repeatedly.
//! Witness sizes are chosen by the spent script type; confidential
//! outputs reserve space for the commitment triple plus range and
//! surjection proof placeholders.

use crate::builder::TransactionProposal;

/// version (4) + segwit flag (1) + locktime (4) + input/output counts.
const TX_OVERHEAD_SIZE: usize = 11;

/// prevout (36) + sequence (4) + empty script_sig (1).
const INPUT_BASE_SIZE: usize = 41;

/// Key-path spend witness: item count, 72-byte signature, 33-byte pubkey.
const WITNESS_KEY_PATH_SIZE: usize = 108;

/// Script-path spend witness: signature, leaf script, control block bound.
const WITNESS_SCRIPT_PATH_SIZE: usize = 245;

/// Explicit output: asset (33) + value (9) + nonce (1), script extra.
const OUTPUT_EXPLICIT_BASE_SIZE: usize = 43;

/// Confidential output: asset, value and nonce commitments (33 each).
const OUTPUT_CONFIDENTIAL_BASE_SIZE: usize = 99;

/// Rangeproof placeholder (64-bit value, standard exponent) + length prefix.
const RANGEPROOF_SIZE: usize = 4174 + 3;

/// Surjection proof placeholder + length prefix.
const SURJECTION_PROOF_SIZE: usize = 131 + 2;

/// Empty proof length prefixes carried by every non-confidential output.
const OUTPUT_WITNESS_EMPTY_SIZE: usize = 2;

/// The reserved unblinded fee output: explicit fields, empty script.
const FEE_OUTPUT_SIZE: usize = OUTPUT_EXPLICIT_BASE_SIZE + 1;

/// Estimate the virtual size of an unsigned proposal.
///
/// `reserve_fee_output` accounts for the unblinded fee output the
/// final rebuild appends; pass `false` when the proposal already
/// carries one.
pub fn estimate_virtual_size(proposal: &TransactionProposal, reserve_fee_output: bool) -> usize {
    let mut base = TX_OVERHEAD_SIZE;
    let mut witness = 0;

    for input in &proposal.inputs {
        base += INPUT_BASE_SIZE;
        witness += if input.txout.script_pubkey.is_v0_p2wpkh() {
            WITNESS_KEY_PATH_SIZE
        } else {
            WITNESS_SCRIPT_PATH_SIZE
        };
    }

    for output in &proposal.outputs {
        let script = 1 + output.script_pubkey.len();
        if output.is_confidential() {
            base += OUTPUT_CONFIDENTIAL_BASE_SIZE + script;
            witness += RANGEPROOF_SIZE + SURJECTION_PROOF_SIZE;
        } else {
            base += OUTPUT_EXPLICIT_BASE_SIZE + script;
            witness += OUTPUT_WITNESS_EMPTY_SIZE;
        }
    }

    if reserve_fee_output {
        base += FEE_OUTPUT_SIZE;
        witness += OUTPUT_WITNESS_EMPTY_SIZE;
    }

    let total = base + witness;
    (3 * base + total + 3) / 4
}
