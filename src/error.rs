use lwk_wollet::elements::{AssetId, OutPoint};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("signer capability unavailable or disabled")]
    SignerUnavailable,

    #[error("malformed UTXO {outpoint}: {reason}")]
    InvalidUtxo { outpoint: OutPoint, reason: String },

    #[error("insufficient funds for asset {asset}: need {required}, have {available}")]
    InsufficientFunds {
        asset: AssetId,
        required: u64,
        available: u64,
    },

    #[error("invalid change for asset {asset}: collected {collected} below required {required}")]
    InvalidChangeAmount {
        asset: AssetId,
        collected: u64,
        required: u64,
    },

    #[error("blinding failed: {0}")]
    BlindingFailed(String),

    #[error("cannot unblind output: {0}")]
    Unblind(String),

    #[error(
        "conservation violated for asset {asset}: inputs {total_in}, outputs {total_out}, fees {fees}"
    )]
    ConservationViolation {
        asset: AssetId,
        total_in: u64,
        total_out: u64,
        fees: u64,
    },

    #[error("fee {fees} exceeds bound {bound}")]
    FeeTooHigh { fees: u64, bound: u64 },

    #[error("signer returned no signed transaction")]
    SigningFailed,

    #[error("broadcast failed: {0}")]
    BroadcastFailed(String),

    #[error("signer error: {0}")]
    Signer(String),

    #[error("electrum error: {0}")]
    Electrum(String),

    #[error("query error: {0}")]
    Query(String),

    #[error("invalid address: {0}")]
    Address(String),

    #[error("PSET error: {0}")]
    Pset(String),

    #[error("payment URI error: {0}")]
    PaymentUri(String),

    #[error("amount arithmetic overflow")]
    AmountOverflow,
}

pub type Result<T> = std::result::Result<T, Error>;
