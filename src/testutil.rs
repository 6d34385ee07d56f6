//! In-memory fakes shared by unit tests.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use lwk_wollet::elements::confidential::{Asset, Nonce, Value};
use lwk_wollet::elements::hashes::Hash as _;
use lwk_wollet::elements::{
    AssetId, AssetIssuance, LockTime, OutPoint, Script, Sequence, Transaction, TxIn, TxInWitness,
    TxOut, TxOutWitness, Txid,
};

use crate::chain::{ChainSource, UtxoRef};
use crate::error::{Error, Result};

/// Build an explicit (non-confidential) output.
pub fn explicit_txout(asset: AssetId, value: u64, script_pubkey: &Script) -> TxOut {
    TxOut {
        asset: Asset::Explicit(asset),
        value: Value::Explicit(value),
        nonce: Nonce::Null,
        script_pubkey: script_pubkey.clone(),
        witness: TxOutWitness::default(),
    }
}

static NEXT_PREVOUT: AtomicU64 = AtomicU64::new(1);

/// Build a transaction with the given outputs and a unique synthetic
/// input, so every call yields a distinct txid.
pub fn test_transaction(outputs: Vec<TxOut>) -> Transaction {
    let n = NEXT_PREVOUT.fetch_add(1, Ordering::SeqCst);
    let mut bytes = [0u8; 32];
    bytes[..8].copy_from_slice(&n.to_le_bytes());
    let prev_txid = Txid::from_slice(&bytes).expect("32 bytes");
    Transaction {
        version: 2,
        lock_time: LockTime::ZERO,
        input: vec![TxIn {
            previous_output: OutPoint::new(prev_txid, 0),
            is_pegin: false,
            script_sig: Script::new(),
            sequence: Sequence::MAX,
            asset_issuance: AssetIssuance::default(),
            witness: TxInWitness::default(),
        }],
        output: outputs,
    }
}

/// In-memory chain source.
#[derive(Default)]
pub struct MockChain {
    txs: Mutex<HashMap<Txid, Transaction>>,
    unspent: Mutex<Vec<UtxoRef>>,
    pub broadcasts: Mutex<Vec<Transaction>>,
}

impl MockChain {
    pub fn add_transaction(&self, tx: Transaction) {
        self.txs.lock().unwrap().insert(tx.txid(), tx);
    }

    pub fn add_unspent(&self, txid: Txid, vout: u32) {
        self.unspent.lock().unwrap().push(UtxoRef { txid, vout });
    }
}

impl ChainSource for MockChain {
    fn list_unspent(&self, _script_pubkey: &Script) -> Result<Vec<UtxoRef>> {
        Ok(self.unspent.lock().unwrap().clone())
    }

    fn fetch_transactions(&self, txids: &[Txid]) -> Result<Vec<Transaction>> {
        let txs = self.txs.lock().unwrap();
        txids
            .iter()
            .map(|t| {
                txs.get(t)
                    .cloned()
                    .ok_or_else(|| Error::Query(format!("transaction {t} not found")))
            })
            .collect()
    }

    fn broadcast(&self, tx: &Transaction) -> Result<Txid> {
        self.broadcasts.lock().unwrap().push(tx.clone());
        Ok(tx.txid())
    }
}
