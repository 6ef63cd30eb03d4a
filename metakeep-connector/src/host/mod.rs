//! The connection host's connector contract.
//!
//! A wallet-connection host drives heterogeneous wallets through the
//! [`Connector`] trait and hands each connector a [`HostContext`]: the
//! configured chains, persistent [`Storage`], and the shared [`Emitter`].
//!
//! # Architecture
//!
//! ```text
//! Host ──calls──▶ Connector (setup / connect / switch_chain / ...)
//!   ▲                  │
//!   │                  ├── HostContext.storage   (persisted flags)
//!   └──── Emitter ◀────┘   (connect / change / disconnect)
//! ```

mod emitter;
mod storage;

use std::sync::Arc;

use alloy::primitives::Address;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use emitter::{ConnectorEvent, Emitter, EventName};
pub use storage::{MemoryStorage, SharedStorage, Storage, StorageError, StorageResult};

use crate::error::Result;
use crate::provider::{ConnectInfo, Web3Provider};
use crate::rpc::RpcError;

/// A chain the host is configured for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chain {
    /// Numeric chain id.
    pub id: u64,
    /// Human-readable name.
    pub name: String,
    /// Default JSON-RPC endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rpc_url: Option<String>,
}

impl Chain {
    /// Create a chain description.
    #[must_use]
    pub fn new(id: u64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            rpc_url: None,
        }
    }

    /// Set the default RPC endpoint.
    #[must_use]
    pub fn with_rpc_url(mut self, url: impl Into<String>) -> Self {
        self.rpc_url = Some(url.into());
        self
    }

    /// Polygon Amoy testnet (chain ID: 80002).
    #[must_use]
    pub fn polygon_amoy() -> Self {
        Self::new(80_002, "Polygon Amoy")
            .with_rpc_url("https://polygon-amoy-bor-rpc.publicnode.com")
    }

    /// Polygon `PoS` mainnet (chain ID: 137).
    #[must_use]
    pub fn polygon() -> Self {
        Self::new(137, "Polygon").with_rpc_url("https://polygon-bor-rpc.publicnode.com")
    }
}

/// Services the host hands to every connector it creates.
#[derive(Clone)]
pub struct HostContext {
    /// Chains the host supports; switching is limited to these.
    pub chains: Vec<Chain>,
    /// Persistent key/value storage.
    pub storage: SharedStorage,
    /// Shared event emitter.
    pub emitter: Emitter,
    /// Session-scoped storage for cached address/chain values, if the host has one.
    pub session: Option<SharedStorage>,
}

impl std::fmt::Debug for HostContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostContext")
            .field("chains", &self.chains)
            .field("emitter", &self.emitter)
            .field("session", &self.session.is_some())
            .finish_non_exhaustive()
    }
}

impl HostContext {
    /// Create a context with a fresh emitter and no session storage.
    #[must_use]
    pub fn new(chains: Vec<Chain>, storage: SharedStorage) -> Self {
        Self {
            chains,
            storage,
            emitter: Emitter::new(),
            session: None,
        }
    }

    /// Use an existing emitter.
    #[must_use]
    pub fn with_emitter(mut self, emitter: Emitter) -> Self {
        self.emitter = emitter;
        self
    }

    /// Provide session storage for cached connection values.
    #[must_use]
    pub fn with_session(mut self, session: SharedStorage) -> Self {
        self.session = Some(session);
        self
    }

    /// Look up a configured chain by id.
    #[must_use]
    pub fn chain(&self, id: u64) -> Option<&Chain> {
        self.chains.iter().find(|c| c.id == id)
    }
}

/// Arguments to [`Connector::connect`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConnectArgs {
    /// Chain to end up on, if the caller cares.
    pub chain_id: Option<u64>,
    /// The host is restoring a previous session.
    pub is_reconnecting: bool,
}

impl ConnectArgs {
    /// Request a specific chain.
    #[must_use]
    pub const fn chain(chain_id: u64) -> Self {
        Self {
            chain_id: Some(chain_id),
            is_reconnecting: false,
        }
    }

    /// Mark this connect as a reconnection.
    #[must_use]
    pub const fn reconnecting(mut self) -> Self {
        self.is_reconnecting = true;
        self
    }
}

/// The outcome of a successful [`Connector::connect`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Connection {
    /// Connected accounts, primary first.
    pub accounts: Vec<Address>,
    /// Active chain id.
    #[serde(rename = "chainId")]
    pub chain_id: u64,
}

/// The lifecycle contract every connector implements.
///
/// The `on_*` handlers are invoked by the connector's own event relay when
/// the underlying provider reports a change; hosts may also call them.
#[async_trait]
pub trait Connector: Send + Sync + std::fmt::Debug {
    /// Stable connector id.
    fn id(&self) -> &str;

    /// Display name.
    fn name(&self) -> &str;

    /// Connector type tag.
    fn kind(&self) -> &str;

    /// Prepare the connector. Never fails; problems are logged.
    async fn setup(&self);

    /// Connect and return the accounts and active chain.
    async fn connect(&self, args: ConnectArgs) -> Result<Connection>;

    /// Disconnect and remember that the user did so.
    async fn disconnect(&self) -> Result<()>;

    /// Current accounts.
    async fn get_accounts(&self) -> Result<Vec<Address>>;

    /// Current chain id.
    async fn get_chain_id(&self) -> Result<u64>;

    /// The connector's provider, created on first use.
    async fn get_provider(&self) -> Result<Arc<Web3Provider>>;

    /// Whether a session can be restored without prompting. Never fails.
    async fn is_authorized(&self) -> bool;

    /// Switch to one of the host's configured chains.
    async fn switch_chain(&self, chain_id: u64) -> Result<Chain>;

    /// Provider reported new accounts.
    async fn on_accounts_changed(&self, accounts: Vec<String>) -> Result<()>;

    /// Provider reported a new chain.
    async fn on_chain_changed(&self, chain: Value) -> Result<()>;

    /// Provider reported that it connected.
    async fn on_connect(&self, info: ConnectInfo) -> Result<()>;

    /// Provider reported that it disconnected.
    async fn on_disconnect(&self, error: Option<RpcError>) -> Result<()>;
}

/// A shared, type-erased connector.
pub type SharedConnector = Arc<dyn Connector>;
