//! Signer capability: the external key custodian.
//!
//! The engine never touches key material directly. Everything it needs
//! is behind [`SignerCapability`], injected at construction. The
//! transaction proposal crosses this boundary as a single base64 PSET
//! blob and must round-trip losslessly through signing.

use lwk_common::Signer as _;
use lwk_signer::SwSigner;
use lwk_wollet::elements::bitcoin::bip32::DerivationPath;
use lwk_wollet::elements::pset::PartiallySignedTransaction;
use lwk_wollet::elements::{Address, secp256k1_zkp};

use crate::error::{Error, Result};
use crate::events::AccountEvent;
use crate::network::Network;

/// The address material a signer hands out for the active account.
#[derive(Debug, Clone)]
pub struct SignerAddress {
    /// Confidential address (carries the blinding public key).
    pub address: Address,
    /// Signing public key behind the output script.
    pub public_key: lwk_wollet::elements::bitcoin::PublicKey,
    /// Blinding private key for the output script, needed to unblind.
    pub blinding_private_key: secp256k1_zkp::SecretKey,
}

/// External signer capability.
///
/// `sign_pset` takes and returns base64 PSET blobs; `Ok(None)` means the
/// signer refused to sign (user rejection or missing payload).
pub trait SignerCapability: Send + Sync {
    fn is_enabled(&self) -> bool;

    fn enable(&self) -> Result<()>;

    fn get_address(&self) -> Result<SignerAddress>;

    fn sign_pset(&self, pset_b64: &str) -> Result<Option<String>>;

    /// Optional account-change notifications as a typed channel.
    ///
    /// The application drains this and calls
    /// [`crate::engine::WalletEngine::refresh_context`] for each event.
    /// Signers without account switching keep the default `None`.
    fn subscribe(&self) -> Option<tokio::sync::mpsc::UnboundedReceiver<AccountEvent>> {
        None
    }
}

/// Software signer over a BIP39 mnemonic, for tests and headless use.
///
/// Serves a single wpkh key at `0/0` of the signer xpub with a slip77
/// blinding key on its output script.
pub struct SoftwareSigner {
    signer: SwSigner,
    network: Network,
}

impl SoftwareSigner {
    pub fn new(mnemonic: &str, network: Network) -> Result<Self> {
        let signer = SwSigner::new(mnemonic, network.is_mainnet())
            .map_err(|e| Error::Signer(e.to_string()))?;
        Ok(Self { signer, network })
    }
}

impl SignerCapability for SoftwareSigner {
    fn is_enabled(&self) -> bool {
        true
    }

    fn enable(&self) -> Result<()> {
        Ok(())
    }

    fn get_address(&self) -> Result<SignerAddress> {
        let secp_btc = lwk_wollet::elements::bitcoin::secp256k1::Secp256k1::new();
        let path: DerivationPath = "0/0"
            .parse()
            .map_err(|e| Error::Signer(format!("derivation path: {e}")))?;
        let derived = self
            .signer
            .xpub()
            .derive_pub(&secp_btc, &path)
            .map_err(|e| Error::Signer(format!("derive: {e}")))?;
        let public_key = lwk_wollet::elements::bitcoin::PublicKey {
            inner: derived.public_key,
            compressed: true,
        };

        // slip77 blinding key is a function of the unconfidential script.
        let script_pubkey =
            Address::p2wpkh(&public_key, None, self.network.address_params()).script_pubkey();
        let slip77 = self
            .signer
            .slip77_master_blinding_key()
            .map_err(|e| Error::Signer(format!("slip77: {e}")))?;
        let slip77_sk = slip77.blinding_private_key(&script_pubkey);
        let blinding_private_key =
            secp256k1_zkp::SecretKey::from_slice(&slip77_sk.secret_bytes())
                .map_err(|e| Error::Signer(format!("blinding key: {e}")))?;

        let secp_zkp = secp256k1_zkp::Secp256k1::new();
        let blinding_pubkey =
            secp256k1_zkp::PublicKey::from_secret_key(&secp_zkp, &blinding_private_key);
        let address = Address::p2wpkh(
            &public_key,
            Some(blinding_pubkey),
            self.network.address_params(),
        );

        Ok(SignerAddress {
            address,
            public_key,
            blinding_private_key,
        })
    }

    fn sign_pset(&self, pset_b64: &str) -> Result<Option<String>> {
        let mut pset: PartiallySignedTransaction = pset_b64
            .parse()
            .map_err(|e| Error::Pset(format!("decode: {e}")))?;

        // Attach the key origin for every input we can spend, so the
        // signer recognizes them as its own.
        let ours = self.get_address()?;
        let script_pubkey = ours.address.script_pubkey();
        let fingerprint = self.signer.fingerprint();
        let path: DerivationPath = "0/0"
            .parse()
            .map_err(|e| Error::Signer(format!("derivation path: {e}")))?;
        for input in pset.inputs_mut() {
            if let Some(utxo) = input.witness_utxo.as_ref()
                && utxo.script_pubkey == script_pubkey
            {
                input
                    .bip32_derivation
                    .insert(ours.public_key, (fingerprint, path.clone()));
            }
        }

        let added = self
            .signer
            .sign(&mut pset)
            .map_err(|e| Error::Signer(format!("{e:?}")))?;
        if added == 0 {
            log::warn!("signer added no signatures");
            return Ok(None);
        }
        Ok(Some(pset.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_MNEMONIC: &str =
        "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

    #[test]
    fn software_signer_address_is_confidential() {
        let signer = SoftwareSigner::new(TEST_MNEMONIC, Network::LiquidRegtest).unwrap();
        let addr = signer.get_address().unwrap();
        assert!(addr.address.blinding_pubkey.is_some());
        assert_eq!(
            addr.address.script_pubkey(),
            Address::p2wpkh(&addr.public_key, None, Network::LiquidRegtest.address_params())
                .script_pubkey()
        );
    }

    #[test]
    fn software_signer_is_always_enabled() {
        let signer = SoftwareSigner::new(TEST_MNEMONIC, Network::LiquidRegtest).unwrap();
        assert!(signer.is_enabled());
        assert!(signer.enable().is_ok());
    }
}
