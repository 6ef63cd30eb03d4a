//! Common imports for hosts embedding the connector.

pub use std::sync::Arc;

pub use crate::connector::{
    CONNECTOR_ID, DISCONNECTED_KEY, ListenerPhase, MetaKeepConnector, MetaKeepParameters,
};
pub use crate::error::{ConnectorError, Result};
pub use crate::host::{
    Chain, ConnectArgs, Connection, Connector, ConnectorEvent, Emitter, EventName, HostContext,
    MemoryStorage, SharedStorage, Storage,
};
pub use crate::provider::{ConnectInfo, Eip1193Provider, Web3Provider};
pub use crate::rpc::RpcError;
pub use crate::sdk::{Environment, LocalKeySdk, SdkFactory, User};
