//! Signing round-trip, finalization and broadcast.
//!
//! The blinded PSET crosses the signer boundary as a base64 blob; a
//! `None` answer is the signer refusing to sign and aborts the flow
//! before anything touches the chain.

use lwk_wollet::elements::Txid;
use lwk_wollet::elements::pset::PartiallySignedTransaction;

use crate::chain::ChainSource;
use crate::error::{Error, Result};
use crate::signer::SignerCapability;

/// Finalize key-path inputs by promoting the partial signature into the
/// final script witness (`[signature, pubkey]`). Inputs that already
/// carry a final witness are left alone; an unsigned input is fatal.
pub fn finalize_key_spends(pset: &mut PartiallySignedTransaction) -> Result<()> {
    for input in pset.inputs_mut() {
        if input.final_script_witness.is_some() {
            continue;
        }
        let (public_key, signature) = input
            .partial_sigs
            .iter()
            .next()
            .map(|(pk, sig)| (*pk, sig.clone()))
            .ok_or(Error::SigningFailed)?;
        input.final_script_witness = Some(vec![signature, public_key.to_bytes()]);
        input.partial_sigs.clear();
    }
    Ok(())
}

/// Run a blinded PSET through the signer, finalize it and broadcast the
/// extracted transaction.
pub fn sign_and_broadcast(
    signer: &dyn SignerCapability,
    chain: &dyn ChainSource,
    pset: PartiallySignedTransaction,
) -> Result<Txid> {
    let signed_b64 = signer
        .sign_pset(&pset.to_string())?
        .ok_or(Error::SigningFailed)?;
    let mut signed: PartiallySignedTransaction = signed_b64
        .parse()
        .map_err(|e| Error::Pset(format!("signed decode: {e}")))?;

    finalize_key_spends(&mut signed)?;
    let tx = signed
        .extract_tx()
        .map_err(|e| Error::Pset(format!("extract: {e}")))?;

    let txid = chain.broadcast(&tx)?;
    log::info!("broadcast transaction {txid}");
    Ok(txid)
}
