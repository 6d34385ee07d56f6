//! Address & network context: the session-immutable facts every other
//! component depends on. Rebuilt from the signer on account change.

use lwk_wollet::elements::{Address, Script, secp256k1_zkp};

use crate::error::{Error, Result};
use crate::network::Network;
use crate::signer::SignerCapability;

/// The wallet's own addressing material, derived once per session from
/// the signer capability.
#[derive(Debug, Clone)]
pub struct AddressContext {
    network: Network,
    address: Address,
    script_pubkey: Script,
    blinding_public_key: secp256k1_zkp::PublicKey,
    blinding_private_key: secp256k1_zkp::SecretKey,
}

impl AddressContext {
    /// Derive the context from the signer capability.
    ///
    /// Fails with [`Error::SignerUnavailable`] when the capability is
    /// disabled — fatal to every downstream operation.
    pub fn from_signer(signer: &dyn SignerCapability) -> Result<Self> {
        if !signer.is_enabled() {
            return Err(Error::SignerUnavailable);
        }
        let signer_address = signer.get_address()?;
        let network = Network::from_address(&signer_address.address)?;

        let blinding_public_key = signer_address.address.blinding_pubkey.ok_or_else(|| {
            Error::Address(format!(
                "signer returned unconfidential address {}",
                signer_address.address
            ))
        })?;

        Ok(Self {
            network,
            script_pubkey: signer_address.address.script_pubkey(),
            address: signer_address.address,
            blinding_public_key,
            blinding_private_key: signer_address.blinding_private_key,
        })
    }

    /// Ownership test: an output or input belongs to the wallet iff its
    /// script equals this context's output script.
    pub fn owns(&self, script_pubkey: &Script) -> bool {
        *script_pubkey == self.script_pubkey
    }

    pub fn network(&self) -> Network {
        self.network
    }

    /// Confidential address of the wallet.
    pub fn address(&self) -> &Address {
        &self.address
    }

    pub fn script_pubkey(&self) -> &Script {
        &self.script_pubkey
    }

    pub fn blinding_public_key(&self) -> secp256k1_zkp::PublicKey {
        self.blinding_public_key
    }

    pub fn blinding_private_key(&self) -> secp256k1_zkp::SecretKey {
        self.blinding_private_key
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signer::SoftwareSigner;

    const TEST_MNEMONIC: &str =
        "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

    struct DisabledSigner;

    impl SignerCapability for DisabledSigner {
        fn is_enabled(&self) -> bool {
            false
        }
        fn enable(&self) -> Result<()> {
            Ok(())
        }
        fn get_address(&self) -> Result<crate::signer::SignerAddress> {
            unreachable!("context must not query a disabled signer")
        }
        fn sign_pset(&self, _pset_b64: &str) -> Result<Option<String>> {
            Ok(None)
        }
    }

    #[test]
    fn disabled_signer_is_fatal() {
        let err = AddressContext::from_signer(&DisabledSigner).unwrap_err();
        assert!(matches!(err, Error::SignerUnavailable));
    }

    #[test]
    fn context_matches_signer_address() {
        let signer = SoftwareSigner::new(TEST_MNEMONIC, Network::LiquidRegtest).unwrap();
        let ctx = AddressContext::from_signer(&signer).unwrap();
        assert_eq!(ctx.network(), Network::LiquidRegtest);
        assert!(ctx.owns(&ctx.address().script_pubkey()));
        assert!(!ctx.owns(&Script::new()));
    }
}
