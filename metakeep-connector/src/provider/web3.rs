//! Standard JSON-RPC wrapper around a native EIP-1193 provider.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::{Address, hex};
use serde_json::{Value, json};
use tracing::trace;

use super::{Eip1193Provider, ProviderEventKind, ProviderListener};
use crate::error::{ConnectorError, Result, with_timeout};
use crate::listeners::ListenerId;
use crate::rpc::normalize_chain_id;

/// Wrapper exposing `send`, `get_signer` and listener management over a
/// native provider.
///
/// Every `send` is bounded by the configured timeout and rejected requests
/// are classified into [`ConnectorError`] kinds.
pub struct Web3Provider {
    inner: Arc<dyn Eip1193Provider>,
    timeout: Option<Duration>,
}

impl fmt::Debug for Web3Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Web3Provider")
            .field("inner", &self.inner)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl Web3Provider {
    /// Wrap a native provider.
    #[must_use]
    pub fn new(inner: Arc<dyn Eip1193Provider>, timeout: Option<Duration>) -> Self {
        Self { inner, timeout }
    }

    /// Send a JSON-RPC request.
    pub async fn send(&self, method: &str, params: Value) -> Result<Value> {
        trace!(method, "provider request");
        with_timeout(method, self.timeout, async {
            self.inner
                .request(method, params)
                .await
                .map_err(ConnectorError::from)
        })
        .await
    }

    /// Get a signer bound to this provider.
    #[must_use]
    pub const fn get_signer(&self) -> JsonRpcSigner<'_> {
        JsonRpcSigner { provider: self }
    }

    /// Register a listener on the native provider.
    pub fn on(&self, kind: ProviderEventKind, listener: ProviderListener) -> ListenerId {
        self.inner.on(kind, listener)
    }

    /// Remove a listener from the native provider.
    pub fn remove_listener(&self, kind: ProviderEventKind, id: ListenerId) -> bool {
        self.inner.remove_listener(kind, id)
    }

    /// Event kinds currently observed on the native provider.
    #[must_use]
    pub fn listener_kinds(&self) -> Vec<ProviderEventKind> {
        self.inner.listener_kinds()
    }
}

/// Signer view over a [`Web3Provider`].
#[derive(Debug, Clone, Copy)]
pub struct JsonRpcSigner<'a> {
    provider: &'a Web3Provider,
}

impl JsonRpcSigner<'_> {
    /// Accounts the wallet already exposes (`eth_accounts`). Never prompts.
    pub async fn accounts(&self) -> Result<Vec<Address>> {
        let value = self.provider.send("eth_accounts", json!([])).await?;
        parse_accounts(&value)
    }

    /// Ask the wallet for its address (`eth_requestAccounts`).
    ///
    /// This is where a wallet may prompt the user; a refusal surfaces as
    /// [`ConnectorError::UserRejected`].
    pub async fn request_address(&self) -> Result<Address> {
        let value = self.provider.send("eth_requestAccounts", json!([])).await?;
        parse_accounts(&value)?
            .into_iter()
            .next()
            .ok_or_else(|| ConnectorError::invalid_response("wallet returned no accounts"))
    }

    /// Active chain id (`eth_chainId`).
    pub async fn chain_id(&self) -> Result<u64> {
        let value = self.provider.send("eth_chainId", json!([])).await?;
        normalize_chain_id(&value)
            .ok_or_else(|| ConnectorError::invalid_response(format!("invalid chain id: {value}")))
    }

    /// Sign a message with EIP-191 `personal_sign`, returning the hex signature.
    pub async fn sign_message(&self, message: &[u8]) -> Result<String> {
        let address = self.request_address().await?;
        let params = json!([format!("0x{}", hex::encode(message)), address.to_checksum(None)]);
        match self.provider.send("personal_sign", params).await? {
            Value::String(signature) => Ok(signature),
            other => Err(ConnectorError::invalid_response(format!(
                "invalid signature: {other}"
            ))),
        }
    }
}

/// Parse a JSON array of account strings into addresses.
pub(crate) fn parse_accounts(value: &Value) -> Result<Vec<Address>> {
    let items = value.as_array().ok_or_else(|| {
        ConnectorError::invalid_response(format!("expected accounts, got {value}"))
    })?;
    items
        .iter()
        .map(|item| {
            item.as_str()
                .ok_or_else(|| ConnectorError::invalid_response(format!("invalid account: {item}")))
                .and_then(parse_address)
        })
        .collect()
}

/// Parse a single account string.
pub(crate) fn parse_address(raw: &str) -> Result<Address> {
    raw.parse::<Address>()
        .map_err(|e| ConnectorError::invalid_response(format!("invalid address '{raw}': {e}")))
}
