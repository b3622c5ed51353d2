//! Collaborators the core consumes but does not implement
//!
//! Wallet connection, contract reads and event log access live behind these
//! traits. A browser wallet, a JSON-RPC client or the in-memory doubles in
//! [`crate::test_utils`] can sit behind them.

use async_trait::async_trait;
use futures::stream::BoxStream;
use starknet_core::types::{Felt, FunctionCall};

use crate::bundle::TransactionBundle;
use crate::events::{EventFilter, RawEvent};
use crate::network::{ChainAddress, ChainId, TransactionId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalletStatus {
    Disconnected,
    /// Mid-handshake; not a hard failure
    Connecting,
    Connected,
}

/// Snapshot of the wallet connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WalletState {
    pub status: WalletStatus,
    pub address: Option<ChainAddress>,
    pub chain_id: Option<ChainId>,
}

impl WalletState {
    pub fn disconnected() -> Self {
        Self {
            status: WalletStatus::Disconnected,
            address: None,
            chain_id: None,
        }
    }

    pub fn connecting() -> Self {
        Self {
            status: WalletStatus::Connecting,
            address: None,
            chain_id: None,
        }
    }

    pub fn connected(address: ChainAddress, chain_id: ChainId) -> Self {
        Self {
            status: WalletStatus::Connected,
            address: Some(address),
            chain_id: Some(chain_id),
        }
    }

    /// The account address, only while connected
    pub fn connected_address(&self) -> Option<ChainAddress> {
        match self.status {
            WalletStatus::Connected => self.address,
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WalletError {
    #[error("No account is connected")]
    NotConnected,

    /// Signing or broadcast failed; the message comes from the wallet or node
    #[error("{0}")]
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProviderError {
    #[error("{0}")]
    Rpc(String),

    #[error("Event subscription closed")]
    SubscriptionClosed,
}

/// Signs and broadcasts call bundles on behalf of the connected account
#[async_trait]
pub trait WalletConnector: Send + Sync {
    fn state(&self) -> WalletState;

    /// Broadcasts every call of `bundle` as one transaction
    async fn sign_and_broadcast(
        &self,
        bundle: &TransactionBundle,
    ) -> Result<TransactionId, WalletError>;
}

/// Read-only contract calls
#[async_trait]
pub trait ChainReader: Send + Sync {
    async fn call(&self, request: &FunctionCall) -> Result<Vec<Felt>, ProviderError>;
}

/// Event log access by block range, plus live delivery of new events
#[async_trait]
pub trait EventLogSource: Send + Sync {
    /// Matching events from `filter.from_block` onward, in chain order
    async fn query(&self, filter: &EventFilter) -> Result<Vec<RawEvent>, ProviderError>;

    /// Events announced after the call; may repeat an event near a reorg
    fn subscribe(&self, filter: &EventFilter) -> BoxStream<'static, Result<RawEvent, ProviderError>>;
}
