use lwk_wollet::elements::{Script, Transaction, Txid};

use crate::error::{Error, Result};

/// Reference to an unspent output as reported by the indexer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UtxoRef {
    pub txid: Txid,
    pub vout: u32,
}

/// Chain-indexer capability (Electrum-style RPC).
///
/// `list_unspent` must preserve the indexer's reported order — coin
/// selection iterates candidates in exactly this order.
pub trait ChainSource: Send + Sync {
    /// List unspent outputs paying to a script pubkey, in indexer order.
    fn list_unspent(&self, script_pubkey: &Script) -> Result<Vec<UtxoRef>>;

    /// Fetch full transactions by txid, preserving request order.
    fn fetch_transactions(&self, txids: &[Txid]) -> Result<Vec<Transaction>>;

    /// Fetch a single transaction by txid.
    fn fetch_transaction(&self, txid: &Txid) -> Result<Transaction> {
        self.fetch_transactions(std::slice::from_ref(txid))?
            .into_iter()
            .next()
            .ok_or_else(|| Error::Query(format!("transaction {txid} not found")))
    }

    /// Broadcast a signed transaction and return its txid.
    fn broadcast(&self, tx: &Transaction) -> Result<Txid>;
}

/// Electrum-based chain source for Liquid.
pub struct ElectrumChain {
    electrum_url: String,
}

impl ElectrumChain {
    pub fn new(electrum_url: &str) -> Self {
        Self {
            electrum_url: electrum_url.to_string(),
        }
    }

    pub fn electrum_url(&self) -> &str {
        &self.electrum_url
    }

    fn lwk_client(&self) -> Result<lwk_wollet::ElectrumClient> {
        let url: lwk_wollet::ElectrumUrl = self
            .electrum_url
            .parse()
            .map_err(|e| Error::Electrum(format!("{:?}", e)))?;
        lwk_wollet::ElectrumClient::new(&url).map_err(|e| Error::Electrum(e.to_string()))
    }
}

impl ChainSource for ElectrumChain {
    fn list_unspent(&self, script_pubkey: &Script) -> Result<Vec<UtxoRef>> {
        use electrum_client::ElectrumApi;
        use sha2::{Digest, Sha256};

        let client = electrum_client::Client::new(&self.electrum_url)
            .map_err(|e| Error::Electrum(e.to_string()))?;

        // Electrum script hash = SHA256(scriptPubKey) with reversed byte order.
        let mut hash = Sha256::digest(script_pubkey.as_bytes()).to_vec();
        hash.reverse();
        let script_hash_hex = hex::encode(&hash);

        let resp = client
            .raw_call(
                "blockchain.scripthash.listunspent",
                [electrum_client::Param::String(script_hash_hex)],
            )
            .map_err(|e| Error::Electrum(e.to_string()))?;

        let entries = resp
            .as_array()
            .ok_or_else(|| Error::Electrum("expected array response".into()))?;

        let mut results = Vec::with_capacity(entries.len());
        for entry in entries {
            let tx_hash_hex = entry["tx_hash"]
                .as_str()
                .ok_or_else(|| Error::Electrum("missing tx_hash".into()))?;
            let vout = entry["tx_pos"]
                .as_u64()
                .ok_or_else(|| Error::Electrum("missing tx_pos".into()))? as u32;
            let txid: Txid = tx_hash_hex
                .parse()
                .map_err(|e| Error::Electrum(format!("bad tx_hash: {e}")))?;
            results.push(UtxoRef { txid, vout });
        }
        log::debug!(
            "listunspent: {} outputs for {}",
            results.len(),
            hex::encode(script_pubkey.as_bytes())
        );
        Ok(results)
    }

    fn fetch_transactions(&self, txids: &[Txid]) -> Result<Vec<Transaction>> {
        use lwk_wollet::blocking::BlockchainBackend;

        if txids.is_empty() {
            return Ok(Vec::new());
        }
        self.lwk_client()?
            .get_transactions(txids)
            .map_err(|e| Error::Electrum(e.to_string()))
    }

    fn broadcast(&self, tx: &Transaction) -> Result<Txid> {
        use lwk_wollet::blocking::BlockchainBackend;

        self.lwk_client()?
            .broadcast(tx)
            .map_err(|e| Error::BroadcastFailed(e.to_string()))
    }
}
