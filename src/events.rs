//! Typed wallet event channel.
//!
//! Subscriptions are message passing, not registered callbacks: the
//! engine pushes [`WalletEvent`]s into a `tokio::sync::mpsc` channel
//! whose receiver is handed out at construction. Dropping the receiver
//! releases the subscription.

use lwk_wollet::elements::Txid;

/// Notification from the signer that the active account changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccountEvent;

/// Events emitted by the wallet engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalletEvent {
    /// The signer switched accounts; the address context was rebuilt
    /// and the resolution cache dropped.
    AccountChanged,
    /// A transaction was accepted by the chain-broadcast capability.
    Broadcast { txid: Txid },
}

/// Sending half of the wallet event channel. Send failures mean the
/// subscriber went away and are ignored.
#[derive(Clone)]
pub struct EventSink {
    tx: tokio::sync::mpsc::UnboundedSender<WalletEvent>,
}

impl EventSink {
    pub fn emit(&self, event: WalletEvent) {
        let _ = self.tx.send(event);
    }
}

/// Create a wallet event channel.
pub fn channel() -> (EventSink, tokio::sync::mpsc::UnboundedReceiver<WalletEvent>) {
    let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
    (EventSink { tx }, rx)
}
