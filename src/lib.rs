pub use lwk_wollet::elements;

pub mod account;
pub mod blind;
pub mod broadcast;
pub mod builder;
pub mod chain;
pub mod engine;
pub mod error;
pub mod events;
pub mod fees;
pub mod network;
pub mod resolver;
pub mod signer;
pub mod uri;
pub mod verify;
pub mod vsize;

#[cfg(test)]
mod testutil;

// Core types
pub use account::AddressContext;
pub use builder::{OutputKind, PrepareRequest, ProposedOutput, TransactionProposal};
pub use engine::{DEFAULT_SIZE_ESTIMATE, WalletEngine};
pub use error::{Error, Result};
pub use events::{AccountEvent, WalletEvent};
pub use network::Network;
pub use resolver::{OutputResolver, ResolvedOutput, SecpUnblinder, Unblinder, Utxo};

// Capabilities
pub use chain::{ChainSource, ElectrumChain, UtxoRef};
pub use fees::{EsploraFeeSource, FeeEstimator, FeeQuote, FeeSource};
pub use signer::{SignerAddress, SignerCapability, SoftwareSigner};

// Blinding and verification
pub use blind::{BlindingOrder, blind_proposal, blinding_order, proposal_to_pset};
pub use broadcast::sign_and_broadcast;
pub use uri::{PaymentRequest, encode_payment_uri, parse_payment_uri};
pub use verify::{FEE_GUARD, verify_conservation};
pub use vsize::estimate_virtual_size;

// Re-export LWK for app-layer use
pub use lwk_wollet;
