//! Output and input resolution: turning raw chain outputs into
//! plaintext (asset, value) records, exactly once each.
//!
//! An output with an empty script is the chain's fee output — recorded
//! as such, never owned, never an error. An output is confidential iff
//! all three proof fields (range proof, surjection proof, nonce) are
//! present; otherwise its asset and value are read explicitly.
//! Unblinding failures are recovered locally: the output is marked
//! failed with the reason retained and is excluded from every
//! aggregate, without aborting the surrounding batch.
//!
//! Resolution results are memoized per outpoint and origin transactions
//! are cached per txid, so the unblinding work happens at most once per
//! output — including when the same output is later seen as an input.
//! The fan-out over unresolved outputs runs on the rayon pool, which
//! bounds concurrency to the pool size.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use lwk_wollet::elements::{
    AssetId, OutPoint, Transaction, TxOut, TxOutSecrets, Txid, secp256k1_zkp,
};
use rayon::prelude::*;

use crate::account::AddressContext;
use crate::chain::ChainSource;
use crate::error::{Error, Result};

/// Crypto capability for recovering output secrets.
pub trait Unblinder: Send + Sync {
    fn unblind(&self, txout: &TxOut, blinding_key: secp256k1_zkp::SecretKey)
    -> Result<TxOutSecrets>;
}

/// Production unblinder backed by secp256k1-zkp rangeproof rewinding.
pub struct SecpUnblinder;

impl Unblinder for SecpUnblinder {
    fn unblind(
        &self,
        txout: &TxOut,
        blinding_key: secp256k1_zkp::SecretKey,
    ) -> Result<TxOutSecrets> {
        let secp = secp256k1_zkp::Secp256k1::new();
        txout
            .unblind(&secp, blinding_key)
            .map_err(|e| Error::Unblind(e.to_string()))
    }
}

/// Plaintext data recovered for a single output.
#[derive(Debug, Clone)]
pub enum ResolvedOutput {
    /// Explicit or successfully unblinded asset, value and blinding factors.
    Plain(TxOutSecrets),
    /// The chain's explicit fee output (empty script), always unowned.
    Fee { asset: AssetId, value: u64 },
    /// Resolution failed; the reason is retained for debugging and the
    /// output is excluded from all aggregates.
    Failed { reason: String },
}

impl ResolvedOutput {
    pub fn secrets(&self) -> Option<&TxOutSecrets> {
        match self {
            ResolvedOutput::Plain(secrets) => Some(secrets),
            _ => None,
        }
    }

    pub fn is_fee(&self) -> bool {
        matches!(self, ResolvedOutput::Fee { .. })
    }
}

/// A spendable wallet output with its recovered secrets.
#[derive(Debug, Clone)]
pub struct Utxo {
    pub outpoint: OutPoint,
    pub txout: TxOut,
    pub secrets: TxOutSecrets,
}

impl Utxo {
    pub fn asset(&self) -> AssetId {
        self.secrets.asset
    }

    pub fn value(&self) -> u64 {
        self.secrets.value
    }
}

/// An output is confidential iff all three proof fields are present.
pub(crate) fn is_confidential(txout: &TxOut) -> bool {
    txout.witness.rangeproof.is_some()
        && txout.witness.surjection_proof.is_some()
        && !txout.nonce.is_null()
}

/// Resolves chain outputs to plaintext records, with per-outpoint
/// memoization and a per-txid origin transaction cache.
pub struct OutputResolver {
    chain: Arc<dyn ChainSource>,
    unblinder: Arc<dyn Unblinder>,
    ctx: AddressContext,
    tx_cache: Mutex<HashMap<Txid, Arc<Transaction>>>,
    resolved: Mutex<HashMap<OutPoint, ResolvedOutput>>,
}

impl OutputResolver {
    pub fn new(
        chain: Arc<dyn ChainSource>,
        unblinder: Arc<dyn Unblinder>,
        ctx: AddressContext,
    ) -> Self {
        Self {
            chain,
            unblinder,
            ctx,
            tx_cache: Mutex::new(HashMap::new()),
            resolved: Mutex::new(HashMap::new()),
        }
    }

    pub fn context(&self) -> &AddressContext {
        &self.ctx
    }

    /// Resolve a single output, memoized per outpoint. Idempotent:
    /// duplicate attempts overwrite the slot with the same result.
    pub fn resolve_txout(&self, outpoint: OutPoint, txout: &TxOut) -> ResolvedOutput {
        if let Some(hit) = self.cache_get(&outpoint) {
            return hit;
        }
        let resolved = self.resolve_uncached(outpoint, txout);
        self.cache_put(outpoint, resolved.clone());
        resolved
    }

    /// Resolve an input by resolving the referenced output of its
    /// origin transaction, through the same caches.
    pub fn resolve_input(&self, prevout: OutPoint) -> Result<ResolvedOutput> {
        if let Some(hit) = self.cache_get(&prevout) {
            return Ok(hit);
        }
        let tx = self.origin_transaction(&prevout.txid)?;
        let txout = tx
            .output
            .get(prevout.vout as usize)
            .ok_or_else(|| Error::Query(format!("vout out of range for {prevout}")))?;
        Ok(self.resolve_txout(prevout, txout))
    }

    /// Wallet-owned spendable outputs, in indexer order.
    ///
    /// Unknown origin transactions are batch-fetched first; resolution
    /// then fans out over the rayon pool. Outputs whose resolution
    /// fails are logged and skipped, never an error.
    pub fn utxos(&self) -> Result<Vec<Utxo>> {
        let refs = self.chain.list_unspent(self.ctx.script_pubkey())?;
        let txids: Vec<Txid> = refs.iter().map(|r| r.txid).collect();
        self.ensure_transactions(&txids)?;

        let mut entries = Vec::with_capacity(refs.len());
        for r in &refs {
            let tx = self.origin_transaction(&r.txid)?;
            match tx.output.get(r.vout as usize) {
                Some(txout) => entries.push((OutPoint::new(r.txid, r.vout), txout.clone())),
                None => log::warn!("listunspent vout {} out of range for {}", r.vout, r.txid),
            }
        }

        let resolved: Vec<(OutPoint, TxOut, ResolvedOutput)> = entries
            .into_par_iter()
            .map(|(outpoint, txout)| {
                let resolved = self.resolve_txout(outpoint, &txout);
                (outpoint, txout, resolved)
            })
            .collect();

        let mut utxos = Vec::new();
        for (outpoint, txout, resolved) in resolved {
            if !self.ctx.owns(&txout.script_pubkey) {
                continue;
            }
            match resolved {
                ResolvedOutput::Plain(secrets) => utxos.push(Utxo {
                    outpoint,
                    txout,
                    secrets,
                }),
                ResolvedOutput::Fee { .. } => {}
                ResolvedOutput::Failed { reason } => {
                    log::warn!("skipping unresolvable output {outpoint}: {reason}");
                }
            }
        }
        Ok(utxos)
    }

    /// Per-asset balance over owned, resolvable outputs.
    pub fn balance(&self) -> Result<HashMap<AssetId, u64>> {
        let mut balance: HashMap<AssetId, u64> = HashMap::new();
        for utxo in self.utxos()? {
            let slot = balance.entry(utxo.asset()).or_default();
            *slot = slot.checked_add(utxo.value()).ok_or(Error::AmountOverflow)?;
        }
        Ok(balance)
    }

    fn resolve_uncached(&self, outpoint: OutPoint, txout: &TxOut) -> ResolvedOutput {
        if txout.script_pubkey.is_empty() {
            // Fee outputs are explicit by consensus.
            return match (txout.asset.explicit(), txout.value.explicit()) {
                (Some(asset), Some(value)) => ResolvedOutput::Fee { asset, value },
                _ => ResolvedOutput::Failed {
                    reason: "fee output with non-explicit fields".into(),
                },
            };
        }
        if is_confidential(txout) {
            return match self
                .unblinder
                .unblind(txout, self.ctx.blinding_private_key())
            {
                Ok(secrets) => ResolvedOutput::Plain(secrets),
                Err(e) => {
                    log::warn!("unblind failed for {outpoint}: {e}");
                    ResolvedOutput::Failed {
                        reason: e.to_string(),
                    }
                }
            };
        }
        match (txout.asset.explicit(), txout.value.explicit()) {
            (Some(asset), Some(value)) => ResolvedOutput::Plain(TxOutSecrets {
                asset,
                asset_bf: lwk_wollet::elements::confidential::AssetBlindingFactor::zero(),
                value,
                value_bf: lwk_wollet::elements::confidential::ValueBlindingFactor::zero(),
            }),
            _ => ResolvedOutput::Failed {
                reason: "explicit decode failed: missing asset or value".into(),
            },
        }
    }

    fn origin_transaction(&self, txid: &Txid) -> Result<Arc<Transaction>> {
        if let Some(tx) = self.lock_txs().get(txid) {
            return Ok(tx.clone());
        }
        let tx = Arc::new(self.chain.fetch_transaction(txid)?);
        self.lock_txs().insert(*txid, tx.clone());
        Ok(tx)
    }

    fn ensure_transactions(&self, txids: &[Txid]) -> Result<()> {
        let missing: Vec<Txid> = {
            let cache = self.lock_txs();
            let mut seen = HashSet::new();
            txids
                .iter()
                .filter(|t| !cache.contains_key(*t) && seen.insert(**t))
                .copied()
                .collect()
        };
        if missing.is_empty() {
            return Ok(());
        }
        let txs = self.chain.fetch_transactions(&missing)?;
        let mut cache = self.lock_txs();
        for tx in txs {
            cache.insert(tx.txid(), Arc::new(tx));
        }
        Ok(())
    }

    fn cache_get(&self, outpoint: &OutPoint) -> Option<ResolvedOutput> {
        self.resolved
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .get(outpoint)
            .cloned()
    }

    fn cache_put(&self, outpoint: OutPoint, resolved: ResolvedOutput) {
        self.resolved
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .insert(outpoint, resolved);
    }

    fn lock_txs(&self) -> std::sync::MutexGuard<'_, HashMap<Txid, Arc<Transaction>>> {
        self.tx_cache.lock().unwrap_or_else(|p| p.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::Network;
    use crate::signer::{SignerCapability, SoftwareSigner};
    use crate::testutil::{MockChain, explicit_txout, test_transaction};
    use lwk_wollet::elements::Script;
    use lwk_wollet::elements::confidential::{Nonce, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};

    const TEST_MNEMONIC: &str =
        "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

    fn test_ctx() -> AddressContext {
        let signer = SoftwareSigner::new(TEST_MNEMONIC, Network::LiquidRegtest).unwrap();
        AddressContext::from_signer(&signer).unwrap()
    }

    struct CountingUnblinder {
        calls: AtomicUsize,
        fail: bool,
    }

    impl CountingUnblinder {
        fn new(fail: bool) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                fail,
            })
        }
    }

    impl Unblinder for CountingUnblinder {
        fn unblind(
            &self,
            txout: &TxOut,
            key: secp256k1_zkp::SecretKey,
        ) -> Result<TxOutSecrets> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(Error::Unblind("tampered range proof".into()));
            }
            SecpUnblinder.unblind(txout, key)
        }
    }

    /// Blind a real confidential output to the given address.
    fn confidential_txout(
        address: &lwk_wollet::elements::Address,
        asset: AssetId,
        value: u64,
    ) -> TxOut {
        let secp = secp256k1_zkp::Secp256k1::new();
        let mut rng = rand::thread_rng();
        let spent = [lwk_wollet::elements::SurjectionInput::Known {
            asset,
            asset_bf: lwk_wollet::elements::confidential::AssetBlindingFactor::zero(),
        }];
        let (txout, _, _, _) = TxOut::new_not_last_confidential(
            &mut rng,
            &secp,
            value,
            address.clone(),
            asset,
            &spent,
        )
        .unwrap();
        txout
    }

    #[test]
    fn empty_script_is_fee_output() {
        let ctx = test_ctx();
        let resolver = OutputResolver::new(
            Arc::new(MockChain::default()),
            Arc::new(SecpUnblinder),
            ctx.clone(),
        );
        let asset = ctx.network().policy_asset();
        let fee = explicit_txout(asset, 400, &Script::new());
        let tx = test_transaction(vec![fee.clone()]);
        let outpoint = OutPoint::new(tx.txid(), 0);

        let resolved = resolver.resolve_txout(outpoint, &fee);
        assert!(resolved.is_fee());
        assert!(resolved.secrets().is_none());
    }

    #[test]
    fn explicit_output_resolves_without_unblinding() {
        let ctx = test_ctx();
        let unblinder = CountingUnblinder::new(false);
        let resolver = OutputResolver::new(
            Arc::new(MockChain::default()),
            unblinder.clone(),
            ctx.clone(),
        );
        let asset = ctx.network().policy_asset();
        let txout = explicit_txout(asset, 1000, ctx.script_pubkey());
        let tx = test_transaction(vec![txout.clone()]);

        let resolved = resolver.resolve_txout(OutPoint::new(tx.txid(), 0), &txout);
        let secrets = resolved.secrets().unwrap();
        assert_eq!(secrets.asset, asset);
        assert_eq!(secrets.value, 1000);
        assert_eq!(unblinder.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn confidential_output_unblinds_once() {
        let ctx = test_ctx();
        let unblinder = CountingUnblinder::new(false);
        let resolver = OutputResolver::new(
            Arc::new(MockChain::default()),
            unblinder.clone(),
            ctx.clone(),
        );
        let asset = ctx.network().policy_asset();
        let txout = confidential_txout(ctx.address(), asset, 5000);
        let tx = test_transaction(vec![txout.clone()]);
        let outpoint = OutPoint::new(tx.txid(), 0);

        let first = resolver.resolve_txout(outpoint, &txout);
        let second = resolver.resolve_txout(outpoint, &txout);
        assert_eq!(first.secrets().unwrap().value, 5000);
        assert_eq!(first.secrets().unwrap(), second.secrets().unwrap());
        assert_eq!(unblinder.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn failed_unblind_is_recovered_locally() {
        let ctx = test_ctx();
        let unblinder = CountingUnblinder::new(true);
        let asset = ctx.network().policy_asset();

        let good = explicit_txout(asset, 700, ctx.script_pubkey());
        let bad = confidential_txout(ctx.address(), asset, 5000);
        let tx = test_transaction(vec![good, bad]);

        let chain = MockChain::default();
        chain.add_transaction(tx.clone());
        chain.add_unspent(tx.txid(), 0);
        chain.add_unspent(tx.txid(), 1);

        let resolver = OutputResolver::new(Arc::new(chain), unblinder, ctx);

        // The failed output is excluded, the batch still succeeds.
        let utxos = resolver.utxos().unwrap();
        assert_eq!(utxos.len(), 1);
        assert_eq!(utxos[0].value(), 700);

        let balance = resolver.balance().unwrap();
        assert_eq!(balance[&asset], 700);
    }

    #[test]
    fn input_resolution_reuses_output_cache() {
        let ctx = test_ctx();
        let unblinder = CountingUnblinder::new(false);
        let asset = ctx.network().policy_asset();
        let txout = confidential_txout(ctx.address(), asset, 2500);
        let tx = test_transaction(vec![txout]);
        let txid = tx.txid();

        let chain = MockChain::default();
        chain.add_transaction(tx);
        chain.add_unspent(txid, 0);

        let resolver = OutputResolver::new(Arc::new(chain), unblinder.clone(), ctx);
        let utxos = resolver.utxos().unwrap();
        assert_eq!(utxos.len(), 1);

        // Resolving the same outpoint as an input must not unblind again.
        let as_input = resolver.resolve_input(OutPoint::new(txid, 0)).unwrap();
        assert_eq!(as_input.secrets().unwrap().value, 2500);
        assert_eq!(unblinder.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn foreign_script_is_not_owned() {
        let ctx = test_ctx();
        let asset = ctx.network().policy_asset();
        let foreign = explicit_txout(asset, 900, &Script::from(vec![0x51]));
        let tx = test_transaction(vec![foreign]);

        let chain = MockChain::default();
        chain.add_transaction(tx.clone());
        chain.add_unspent(tx.txid(), 0);

        let resolver =
            OutputResolver::new(Arc::new(chain), Arc::new(SecpUnblinder), ctx);
        assert!(resolver.utxos().unwrap().is_empty());
    }

    #[test]
    fn classification_requires_all_proof_fields() {
        let ctx = test_ctx();
        let asset = ctx.network().policy_asset();
        let mut txout = confidential_txout(ctx.address(), asset, 100);
        assert!(is_confidential(&txout));
        txout.witness.rangeproof = None;
        assert!(!is_confidential(&txout));

        let explicit = explicit_txout(asset, 100, ctx.script_pubkey());
        assert!(matches!(explicit.nonce, Nonce::Null));
        assert!(matches!(explicit.value, Value::Explicit(100)));
        assert!(!is_confidential(&explicit));
    }
}
