//! The wallet engine: the one object applications hold.
//!
//! Wires the signer, chain and fee capabilities to the resolver,
//! builder, blinder and broadcaster, and owns the two pieces of
//! session state: the resolution caches (via the resolver) and the
//! set of outpoints reserved by prepared-but-unsent proposals.
//!
//! A prepared proposal reserves its inputs so concurrent prepares
//! cannot double-select them; `broadcast` and `cancel` both release
//! the reservation. Rebuilding the context on an account change drops
//! every cache and reservation, since none of them survive a key
//! change.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use lwk_wollet::elements::{Address, AssetId, OutPoint, Txid};

use crate::account::AddressContext;
use crate::blind::blind_proposal;
use crate::broadcast::sign_and_broadcast;
use crate::builder::{self, PrepareRequest, TransactionProposal};
use crate::chain::ChainSource;
use crate::error::{Error, Result};
use crate::events::{EventSink, WalletEvent, channel};
use crate::fees::{FeeEstimator, FeeSource};
use crate::network::Network;
use crate::resolver::{OutputResolver, SecpUnblinder, Unblinder, Utxo};
use crate::signer::SignerCapability;
use crate::uri::{PaymentRequest, encode_payment_uri, parse_payment_uri};
use crate::verify::verify_conservation;

/// Size guess for the first fee-sizing pass, tuned to a typical
/// one-input two-output confidential payment.
pub const DEFAULT_SIZE_ESTIMATE: usize = 300;

pub struct WalletEngine {
    signer: Arc<dyn SignerCapability>,
    chain: Arc<dyn ChainSource>,
    unblinder: Arc<dyn Unblinder>,
    fees: FeeEstimator,
    resolver: OutputResolver,
    reserved: Mutex<HashSet<OutPoint>>,
    events: EventSink,
}

impl WalletEngine {
    /// Build an engine over the given capabilities. Returns the engine
    /// and the receiving half of its event channel.
    pub fn new(
        signer: Arc<dyn SignerCapability>,
        chain: Arc<dyn ChainSource>,
        fee_source: Box<dyn FeeSource>,
    ) -> Result<(Self, tokio::sync::mpsc::UnboundedReceiver<WalletEvent>)> {
        let ctx = AddressContext::from_signer(signer.as_ref())?;
        let unblinder: Arc<dyn Unblinder> = Arc::new(SecpUnblinder);
        let resolver = OutputResolver::new(chain.clone(), unblinder.clone(), ctx);
        let (events, receiver) = channel();
        Ok((
            Self {
                signer,
                chain,
                unblinder,
                fees: FeeEstimator::new(fee_source),
                resolver,
                reserved: Mutex::new(HashSet::new()),
                events,
            },
            receiver,
        ))
    }

    pub fn network(&self) -> Network {
        self.resolver.context().network()
    }

    /// The wallet's confidential receive address.
    pub fn address(&self) -> &Address {
        self.resolver.context().address()
    }

    /// Wallet-owned spendable outputs, in indexer order.
    pub fn utxos(&self) -> Result<Vec<Utxo>> {
        self.resolver.utxos()
    }

    /// Per-asset balance over owned, resolvable outputs.
    pub fn balance(&self) -> Result<HashMap<AssetId, u64>> {
        self.resolver.balance()
    }

    /// Build a transaction proposal paying `amount` of `asset` to
    /// `to_address`, at a fee rate quoted for `priority` in `[0, 1]`.
    ///
    /// The proposal's inputs are reserved until `broadcast` or
    /// `cancel`; outpoints reserved by earlier proposals are never
    /// candidates for selection.
    pub fn prepare(
        &self,
        amount: u64,
        asset: AssetId,
        to_address: &str,
        priority: f64,
        size_estimate: usize,
    ) -> Result<TransactionProposal> {
        let address: Address = to_address
            .parse()
            .map_err(|e| Error::Address(format!("{e}")))?;
        if Network::from_address(&address)? != self.network() {
            return Err(Error::Address(format!(
                "address {address} does not belong to {}",
                self.network().as_str()
            )));
        }

        let quote = self.fees.quote(priority);
        let utxos = self.resolver.utxos()?;

        // Hold the reservation lock across selection so two prepares
        // cannot pick the same outpoint.
        let mut reserved = self.lock_reserved();
        let candidates: Vec<Utxo> = utxos
            .into_iter()
            .filter(|u| !reserved.contains(&u.outpoint))
            .collect();

        let proposal = builder::prepare(
            self.resolver.context(),
            &candidates,
            &PrepareRequest {
                amount,
                asset,
                to_address: address,
                fee_rate_sat_vb: quote.rate_sat_vb,
                size_estimate,
            },
        )?;
        verify_conservation(&proposal)?;

        for input in &proposal.inputs {
            reserved.insert(input.outpoint);
        }
        log::info!(
            "prepared proposal: {} inputs, fee {} at {} sat/vb (target {})",
            proposal.inputs.len(),
            proposal.fee_amount(),
            quote.rate_sat_vb,
            quote.target_blocks
        );
        Ok(proposal)
    }

    /// Re-verify, blind, sign and broadcast a prepared proposal.
    ///
    /// The input reservation is released whether or not the broadcast
    /// goes through; on success a [`WalletEvent::Broadcast`] is
    /// emitted.
    pub fn broadcast(&self, proposal: &TransactionProposal) -> Result<Txid> {
        let result = self.blind_sign_broadcast(proposal);
        self.release(proposal);
        if let Ok(txid) = &result {
            self.events.emit(WalletEvent::Broadcast { txid: *txid });
        }
        result
    }

    /// Drop a prepared proposal, releasing its input reservation.
    pub fn cancel(&self, proposal: &TransactionProposal) {
        self.release(proposal);
        log::debug!("cancelled proposal with {} inputs", proposal.inputs.len());
    }

    /// Rebuild the address context after a signer account change,
    /// dropping the resolution caches and every reservation.
    pub fn refresh_context(&mut self) -> Result<()> {
        let ctx = AddressContext::from_signer(self.signer.as_ref())?;
        self.resolver = OutputResolver::new(self.chain.clone(), self.unblinder.clone(), ctx);
        self.lock_reserved().clear();
        self.events.emit(WalletEvent::AccountChanged);
        Ok(())
    }

    /// Payment URI requesting `amount` of `asset` to the wallet address.
    pub fn payment_uri(&self, amount: u64, asset: AssetId) -> String {
        encode_payment_uri(self.network(), self.address(), amount, asset)
    }

    /// Parse a payment URI against the wallet's network.
    pub fn parse_payment_uri(&self, uri: &str) -> Result<PaymentRequest> {
        parse_payment_uri(self.network(), uri)
    }

    fn blind_sign_broadcast(&self, proposal: &TransactionProposal) -> Result<Txid> {
        // Conservation is checked on the plaintext proposal, before any
        // commitment hides a value.
        verify_conservation(proposal)?;
        let pset = blind_proposal(self.resolver.context(), proposal)?;
        sign_and_broadcast(self.signer.as_ref(), self.chain.as_ref(), pset)
    }

    fn release(&self, proposal: &TransactionProposal) {
        let mut reserved = self.lock_reserved();
        for input in &proposal.inputs {
            reserved.remove(&input.outpoint);
        }
    }

    fn lock_reserved(&self) -> MutexGuard<'_, HashSet<OutPoint>> {
        self.reserved.lock().unwrap_or_else(|p| p.into_inner())
    }
}
