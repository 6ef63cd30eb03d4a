//! Local-key SDK backend.
//!
//! [`LocalKeySdk`] stands in for the custodial backend: the key is derived
//! locally with [`kobe`] / [`kobe_eth`] (or given directly) and signs through
//! [`alloy`]'s `PrivateKeySigner`. Wallet methods are answered in-process and
//! every other JSON-RPC method is forwarded to the RPC node of the active
//! chain. Requests are approved without prompting.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use alloy::network::Ethereum;
use alloy::primitives::{Address, hex};
use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use alloy::signers::Signer;
use alloy::signers::local::PrivateKeySigner;
use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::{debug, info};

use super::{CustodialSdk, SdkFactory, SdkOptions};
use crate::error::ConnectorError;
use crate::listeners::{ListenerId, ListenerRegistry};
use crate::provider::{Eip1193Provider, ProviderEvent, ProviderEventKind, ProviderListener};
use crate::rpc::{RpcError, chain_id_to_hex, codes, normalize_chain_id};

/// Builder for constructing a [`LocalKeySdk`].
///
/// Created by [`LocalKeySdk::builder`]. Either a mnemonic or a private key
/// must be set.
///
/// # Examples
///
/// ```rust,ignore
/// // From HD mnemonic
/// let sdk = LocalKeySdk::builder()
///     .mnemonic("abandon abandon ...")
///     .index(0)
///     .build()?;
///
/// // From private key
/// let sdk = LocalKeySdk::builder()
///     .private_key("0xabc...")
///     .build()?;
/// ```
#[derive(Debug, Default)]
pub struct LocalKeySdkBuilder {
    /// BIP39 mnemonic phrase.
    mnemonic: Option<String>,
    /// BIP39 passphrase (optional "25th word").
    passphrase: Option<String>,
    /// HD derivation index (default 0).
    index: u32,
    /// Raw private key hex string.
    private_key: Option<String>,
}

impl LocalKeySdkBuilder {
    /// Set the BIP39 mnemonic phrase for HD key derivation.
    #[must_use]
    pub fn mnemonic(mut self, mnemonic: impl Into<String>) -> Self {
        self.mnemonic = Some(mnemonic.into());
        self
    }

    /// Set the BIP39 passphrase (optional "25th word").
    #[must_use]
    pub fn passphrase(mut self, passphrase: impl Into<String>) -> Self {
        self.passphrase = Some(passphrase.into());
        self
    }

    /// Set the HD derivation index (default 0).
    #[must_use]
    pub const fn index(mut self, index: u32) -> Self {
        self.index = index;
        self
    }

    /// Set the private key directly (hex string, with or without 0x prefix).
    #[must_use]
    pub fn private_key(mut self, key: impl Into<String>) -> Self {
        self.private_key = Some(key.into());
        self
    }

    /// Build the [`LocalKeySdk`].
    pub fn build(self) -> crate::Result<LocalKeySdk> {
        let signer = if let Some(ref mnemonic) = self.mnemonic {
            self.signer_from_mnemonic(mnemonic)?
        } else if let Some(ref key) = self.private_key {
            Self::signer_from_private_key(key)?
        } else {
            return Err(ConnectorError::config(
                "either mnemonic or private_key is required",
            ));
        };

        info!(address = %signer.address(), "local key SDK ready");
        Ok(LocalKeySdk { signer })
    }

    /// Derive a signer from a BIP39 mnemonic using kobe.
    fn signer_from_mnemonic(&self, mnemonic: &str) -> crate::Result<PrivateKeySigner> {
        let wallet = kobe::Wallet::from_mnemonic(mnemonic, self.passphrase.as_deref())
            .map_err(|e| ConnectorError::config(format!("invalid mnemonic: {e}")))?;

        let deriver = kobe_eth::Deriver::new(&wallet);
        let derived = deriver
            .derive(self.index)
            .map_err(|e| ConnectorError::config(format!("key derivation failed: {e}")))?;

        let key_hex = &*derived.private_key_hex;
        key_hex
            .parse::<PrivateKeySigner>()
            .map_err(|e| ConnectorError::config(format!("signer creation failed: {e}")))
    }

    /// Create a signer from a raw private key hex string.
    fn signer_from_private_key(key: &str) -> crate::Result<PrivateKeySigner> {
        let key = key.strip_prefix("0x").unwrap_or(key);
        key.parse::<PrivateKeySigner>()
            .map_err(|e| ConnectorError::config(format!("invalid private key: {e}")))
    }
}

/// SDK factory backed by a locally held key.
#[derive(Clone)]
pub struct LocalKeySdk {
    signer: PrivateKeySigner,
}

impl fmt::Debug for LocalKeySdk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalKeySdk")
            .field("address", &self.signer.address())
            .finish_non_exhaustive()
    }
}

impl LocalKeySdk {
    /// Create a builder for constructing a [`LocalKeySdk`].
    #[must_use]
    pub fn builder() -> LocalKeySdkBuilder {
        LocalKeySdkBuilder::default()
    }

    /// The address the key controls.
    #[must_use]
    pub fn address(&self) -> Address {
        self.signer.address()
    }
}

impl SdkFactory for LocalKeySdk {
    fn create(&self, options: SdkOptions) -> Result<Arc<dyn CustodialSdk>, RpcError> {
        if !options.rpc_node_urls.contains_key(&options.chain_id) {
            return Err(RpcError::invalid_params(format!(
                "no RPC node configured for chain {}",
                options.chain_id
            )));
        }
        debug!(
            app_id = %options.app_id,
            environment = %options.environment,
            chain_id = options.chain_id,
            "creating local key SDK session"
        );

        let provider = LocalKeyProvider {
            address: self.signer.address(),
            signer: self.signer.clone(),
            chain_id: AtomicU64::new(options.chain_id),
            rpc_node_urls: options.rpc_node_urls,
            listeners: ListenerRegistry::new(),
            nodes: Mutex::new(HashMap::new()),
        };
        Ok(Arc::new(LocalKeySession {
            provider: Arc::new(provider),
        }))
    }
}

#[derive(Debug)]
struct LocalKeySession {
    provider: Arc<LocalKeyProvider>,
}

#[async_trait]
impl CustodialSdk for LocalKeySession {
    async fn ethereum(&self) -> Result<Arc<dyn Eip1193Provider>, RpcError> {
        Ok(Arc::clone(&self.provider) as Arc<dyn Eip1193Provider>)
    }
}

struct LocalKeyProvider {
    signer: PrivateKeySigner,
    address: Address,
    chain_id: AtomicU64,
    rpc_node_urls: BTreeMap<u64, String>,
    listeners: ListenerRegistry<ProviderEventKind, ProviderEvent>,
    nodes: Mutex<HashMap<u64, DynProvider<Ethereum>>>,
}

impl fmt::Debug for LocalKeyProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalKeyProvider")
            .field("address", &self.address)
            .field("chain_id", &self.chain_id.load(Ordering::SeqCst))
            .field("listeners", &self.listeners)
            .finish_non_exhaustive()
    }
}

impl LocalKeyProvider {
    fn emit(&self, event: &ProviderEvent) {
        self.listeners.dispatch(event.kind(), event);
    }

    fn accounts(&self) -> Value {
        json!([self.address.to_checksum(None)])
    }

    fn switch_chain(&self, params: &Value) -> Result<Value, RpcError> {
        let requested = params
            .get(0)
            .and_then(|p| p.get("chainId"))
            .and_then(normalize_chain_id)
            .ok_or_else(|| RpcError::invalid_params("expected [{ chainId }]"))?;
        if !self.rpc_node_urls.contains_key(&requested) {
            return Err(RpcError::unrecognized_chain(requested));
        }

        self.chain_id.store(requested, Ordering::SeqCst);
        debug!(chain_id = requested, "local key provider switched chain");
        self.emit(&ProviderEvent::ChainChanged(Value::String(chain_id_to_hex(
            requested,
        ))));
        Ok(Value::Null)
    }

    async fn personal_sign(&self, params: &Value) -> Result<Value, RpcError> {
        let data = params
            .get(0)
            .and_then(Value::as_str)
            .ok_or_else(|| RpcError::invalid_params("expected [data, address]"))?;
        if let Some(from) = params.get(1).and_then(Value::as_str) {
            let from: Address = from
                .parse()
                .map_err(|e| RpcError::invalid_params(format!("invalid address: {e}")))?;
            if from != self.address {
                return Err(RpcError::new(
                    codes::UNAUTHORIZED,
                    format!("account {from} is not managed by this wallet"),
                ));
            }
        }

        let message = match data.strip_prefix("0x") {
            Some(encoded) => hex::decode(encoded)
                .map_err(|e| RpcError::invalid_params(format!("invalid hex data: {e}")))?,
            None => data.as_bytes().to_vec(),
        };
        let signature = self
            .signer
            .sign_message(&message)
            .await
            .map_err(|e| RpcError::internal(format!("message signing failed: {e}")))?;
        Ok(Value::String(format!("0x{}", hex::encode(signature.as_bytes()))))
    }

    async fn node(&self, chain_id: u64) -> Result<DynProvider<Ethereum>, RpcError> {
        let cached = self
            .nodes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&chain_id)
            .cloned();
        if let Some(node) = cached {
            return Ok(node);
        }

        let url = self.rpc_node_urls.get(&chain_id).ok_or_else(|| {
            RpcError::new(
                codes::CHAIN_DISCONNECTED,
                format!("no RPC node for chain {chain_id}"),
            )
        })?;
        let node = ProviderBuilder::new()
            .connect(url)
            .await
            .map_err(|e| {
                RpcError::resource_unavailable(format!("failed to connect to '{url}': {e}"))
            })?
            .erased();

        self.nodes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(chain_id, node.clone());
        Ok(node)
    }

    async fn forward(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        let node = self.node(self.chain_id.load(Ordering::SeqCst)).await?;
        node.raw_request::<Value, Value>(method.to_owned().into(), params)
            .await
            .map_err(|e| match e.as_error_resp() {
                Some(payload) => RpcError::new(payload.code, payload.message.to_string()),
                None => RpcError::resource_unavailable(format!("'{method}' failed: {e}")),
            })
    }
}

#[async_trait]
impl Eip1193Provider for LocalKeyProvider {
    async fn request(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        match method {
            "eth_accounts" | "eth_requestAccounts" => Ok(self.accounts()),
            "eth_chainId" => Ok(Value::String(chain_id_to_hex(
                self.chain_id.load(Ordering::SeqCst),
            ))),
            "net_version" => Ok(Value::String(
                self.chain_id.load(Ordering::SeqCst).to_string(),
            )),
            "wallet_switchEthereumChain" => self.switch_chain(&params),
            "personal_sign" => self.personal_sign(&params).await,
            _ => self.forward(method, params).await,
        }
    }

    fn on(&self, kind: ProviderEventKind, listener: ProviderListener) -> ListenerId {
        self.listeners.add(kind, listener)
    }

    fn remove_listener(&self, kind: ProviderEventKind, id: ListenerId) -> bool {
        self.listeners.remove(kind, id)
    }

    fn listener_kinds(&self) -> Vec<ProviderEventKind> {
        self.listeners.keys()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sdk::Environment;
    use std::sync::atomic::AtomicUsize;

    // Anvil / Hardhat development account #0.
    const DEV_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
    const DEV_ADDRESS: &str = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266";

    fn options() -> SdkOptions {
        SdkOptions {
            environment: Environment::Development,
            app_id: "test-app".into(),
            user: None,
            chain_id: 80_002,
            rpc_node_urls: BTreeMap::from([
                (80_002, "http://127.0.0.1:1".to_owned()),
                (137, "http://127.0.0.1:1".to_owned()),
            ]),
        }
    }

    async fn provider() -> Arc<dyn Eip1193Provider> {
        let sdk = LocalKeySdk::builder().private_key(DEV_KEY).build().unwrap();
        sdk.create(options()).unwrap().ethereum().await.unwrap()
    }

    #[test]
    fn test_builder_requires_key_material() {
        let err = LocalKeySdk::builder().build().unwrap_err();
        assert!(matches!(err, ConnectorError::Config(_)));
    }

    #[test]
    fn test_builder_from_private_key() {
        let sdk = LocalKeySdk::builder().private_key(DEV_KEY).build().unwrap();
        assert_eq!(sdk.address().to_checksum(None), DEV_ADDRESS);
    }

    #[test]
    fn test_mnemonic_derivation_honours_passphrase_and_index() {
        let phrase = "test test test test test test test test test test test junk";
        let plain = LocalKeySdk::builder().mnemonic(phrase).build().unwrap();
        let again = LocalKeySdk::builder().mnemonic(phrase).build().unwrap();
        let salted = LocalKeySdk::builder()
            .mnemonic(phrase)
            .passphrase("salt")
            .build()
            .unwrap();
        let second = LocalKeySdk::builder().mnemonic(phrase).index(1).build().unwrap();

        assert_eq!(plain.address(), again.address());
        assert_ne!(plain.address(), salted.address());
        assert_ne!(plain.address(), second.address());
    }

    #[test]
    fn test_create_requires_rpc_for_start_chain() {
        let sdk = LocalKeySdk::builder().private_key(DEV_KEY).build().unwrap();
        let mut opts = options();
        opts.chain_id = 1;
        assert!(sdk.create(opts).is_err());
    }

    #[tokio::test]
    async fn test_accounts_and_chain() {
        let provider = provider().await;
        let accounts = provider.request("eth_requestAccounts", json!([])).await.unwrap();
        assert_eq!(accounts, json!([DEV_ADDRESS]));
        let chain = provider.request("eth_chainId", json!([])).await.unwrap();
        assert_eq!(chain, json!("0x13882"));
    }

    #[tokio::test]
    async fn test_switch_chain_emits_chain_changed() {
        let provider = provider().await;
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        provider.on(
            ProviderEventKind::ChainChanged,
            Arc::new(move |event: &ProviderEvent| {
                assert_eq!(*event, ProviderEvent::ChainChanged(json!("0x89")));
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );

        provider
            .request("wallet_switchEthereumChain", json!([{ "chainId": "0x89" }]))
            .await
            .unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(
            provider.request("eth_chainId", json!([])).await.unwrap(),
            json!("0x89")
        );
    }

    #[tokio::test]
    async fn test_switch_to_unknown_chain_is_unrecognized() {
        let provider = provider().await;
        let err = provider
            .request("wallet_switchEthereumChain", json!([{ "chainId": "0x1" }]))
            .await
            .unwrap_err();
        assert_eq!(err.code, codes::UNRECOGNIZED_CHAIN);
    }

    #[tokio::test]
    async fn test_personal_sign_produces_65_byte_signature() {
        let provider = provider().await;
        let signature = provider
            .request("personal_sign", json!(["0x68656c6c6f", DEV_ADDRESS]))
            .await
            .unwrap();
        let signature = signature.as_str().unwrap();
        assert_eq!(signature.len(), 2 + 65 * 2);
    }

    #[tokio::test]
    async fn test_personal_sign_rejects_foreign_account() {
        let provider = provider().await;
        let err = provider
            .request(
                "personal_sign",
                json!(["0x00", "0x0000000000000000000000000000000000000001"]),
            )
            .await
            .unwrap_err();
        assert_eq!(err.code, codes::UNAUTHORIZED);
    }
}
