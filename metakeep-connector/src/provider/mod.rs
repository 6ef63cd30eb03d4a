//! EIP-1193 provider seam.
//!
//! A wallet SDK yields an object implementing [`Eip1193Provider`]: a
//! `request(method, params)` entry point plus `on` / `removeListener` for
//! the four standard events. [`Web3Provider`] wraps it with timeouts, error
//! classification and a [`JsonRpcSigner`].

mod web3;

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use web3::{JsonRpcSigner, Web3Provider};
pub(crate) use web3::parse_address;

use crate::listeners::{Listener, ListenerId};
use crate::rpc::RpcError;

/// The events an EIP-1193 provider emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ProviderEventKind {
    /// The provider can serve requests for a chain.
    Connect,
    /// The exposed accounts changed.
    AccountsChanged,
    /// The active chain changed.
    ChainChanged,
    /// The provider lost its connection.
    Disconnect,
}

impl ProviderEventKind {
    /// Wire name of the event.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Connect => "connect",
            Self::AccountsChanged => "accountsChanged",
            Self::ChainChanged => "chainChanged",
            Self::Disconnect => "disconnect",
        }
    }
}

impl fmt::Display for ProviderEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payload of the provider `connect` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectInfo {
    /// Chain id as a hex quantity.
    #[serde(rename = "chainId")]
    pub chain_id: String,
}

impl ConnectInfo {
    /// Build from a numeric chain id.
    #[must_use]
    pub fn from_chain_id(chain_id: u64) -> Self {
        Self {
            chain_id: crate::rpc::chain_id_to_hex(chain_id),
        }
    }
}

/// An event emitted by a provider.
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderEvent {
    /// See [`ProviderEventKind::Connect`].
    Connect(ConnectInfo),
    /// Raw account strings as reported by the provider.
    AccountsChanged(Vec<String>),
    /// Raw chain id (hex string, decimal string or number).
    ChainChanged(Value),
    /// The disconnect reason.
    Disconnect(RpcError),
}

impl ProviderEvent {
    /// The kind this event is dispatched under.
    #[must_use]
    pub const fn kind(&self) -> ProviderEventKind {
        match self {
            Self::Connect(_) => ProviderEventKind::Connect,
            Self::AccountsChanged(_) => ProviderEventKind::AccountsChanged,
            Self::ChainChanged(_) => ProviderEventKind::ChainChanged,
            Self::Disconnect(_) => ProviderEventKind::Disconnect,
        }
    }
}

/// Listener type for provider events.
pub type ProviderListener = Listener<ProviderEvent>;

/// The native provider object a wallet SDK exposes.
#[async_trait]
pub trait Eip1193Provider: Send + Sync + fmt::Debug {
    /// Submit a JSON-RPC request.
    async fn request(&self, method: &str, params: Value) -> Result<Value, RpcError>;

    /// Register a listener for `kind`.
    fn on(&self, kind: ProviderEventKind, listener: ProviderListener) -> ListenerId;

    /// Remove a listener. Returns `false` if it was not registered.
    fn remove_listener(&self, kind: ProviderEventKind, id: ListenerId) -> bool;

    /// Event kinds that currently have at least one listener.
    fn listener_kinds(&self) -> Vec<ProviderEventKind>;
}
