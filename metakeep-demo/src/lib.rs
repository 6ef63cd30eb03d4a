//! Terminal demo for the MetaKeep connector.
//!
//! Wires a [`MetaKeepConnector`](metakeep_connector::MetaKeepConnector) and an
//! [`InjectedConnector`] into a [`WalletModal`] backed by [`FileStorage`],
//! using settings loaded by [`DemoConfig`].

pub mod config;
pub mod injected;
pub mod modal;
pub mod storage;

pub use config::DemoConfig;
pub use injected::{INJECTED_ID, InjectedConnector};
pub use modal::{ConnectorStatus, WalletModal};
pub use storage::FileStorage;
