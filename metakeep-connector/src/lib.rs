#![cfg_attr(docsrs, feature(doc_cfg))]
//! MetaKeep custodial-wallet connector for multi-chain wallet-connection hosts.
//!
//! A host (wallet modal, dapp shell, CLI) manages a list of chains, a
//! persistent key/value store and an event emitter, and drives every wallet
//! through the [`Connector`](host::Connector) contract. [`MetaKeepConnector`]
//! is that contract for MetaKeep: it builds the MetaKeep SDK on demand, wraps
//! its EIP-1193 provider and translates provider events into host events.
//!
//! # Quick start
//!
//! ```rust,ignore
//! use metakeep_connector::prelude::*;
//!
//! let sdk = LocalKeySdk::builder().private_key(key).build()?;
//! let host = HostContext::new(vec![Chain::polygon_amoy()], MemoryStorage::shared());
//! let connector = MetaKeepConnector::new(
//!     MetaKeepParameters::new().app_id("my-app-id"),
//!     host,
//!     Arc::new(sdk),
//! );
//!
//! connector.setup().await;
//! if connector.is_authorized().await {
//!     let connection = connector.connect(ConnectArgs::default().reconnecting()).await?;
//! }
//! ```
//!
//! # Modules
//!
//! - [`connector`]: the adapter and its parameters
//! - [`host`]: what the host provides (chains, storage, emitter) and the connector contract
//! - [`provider`]: the EIP-1193 seam and the `Web3Provider` wrapper
//! - [`sdk`]: the SDK seam and a local-key implementation
//! - [`listeners`]: keyed listener registry shared by providers and the emitter
//! - [`rpc`]: JSON-RPC error payloads and chain id helpers

pub mod connector;
pub mod error;
pub mod host;
pub mod listeners;
pub mod prelude;
pub mod provider;
pub mod rpc;
pub mod sdk;

pub use connector::{ListenerPhase, MetaKeepConnector, MetaKeepParameters};
pub use error::{ConnectorError, Result};
