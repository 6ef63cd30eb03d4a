//! A plain injected-wallet connector offered next to MetaKeep.
//!
//! It talks straight to an EIP-1193 provider, the way a browser extension
//! wallet is used, with no SDK in between. The demo backs it with a local
//! key session so both connectors can run side by side offline.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use alloy::primitives::Address;
use async_trait::async_trait;
use metakeep_connector::error::{ConnectorError, Result, best_effort};
use metakeep_connector::host::{
    Chain, ConnectArgs, Connection, Connector, ConnectorEvent, HostContext,
};
use metakeep_connector::provider::{
    ConnectInfo, Eip1193Provider, ProviderEvent, ProviderEventKind, Web3Provider,
};
use metakeep_connector::rpc::{RpcError, chain_id_to_hex, is_truthy, normalize_chain_id};
use metakeep_connector::sdk::{Environment, LocalKeySdk, SdkFactory, SdkOptions};
use serde_json::{Value, json};
use tracing::{debug, info, warn};

/// Connector id.
pub const INJECTED_ID: &str = "injected";

/// Display name.
pub const INJECTED_NAME: &str = "Injected";

/// Storage key of the explicit-disconnect flag.
pub const INJECTED_DISCONNECTED_KEY: &str = "injected.disconnected";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Open a wallet session on the host's chains backed by `sdk`'s key.
///
/// The session starts on the first chain; every chain with an RPC URL can
/// be switched to.
pub async fn local_wallet(sdk: &LocalKeySdk, chains: &[Chain]) -> Result<Arc<dyn Eip1193Provider>> {
    let first = chains
        .first()
        .ok_or_else(|| ConnectorError::config("the host has no chains"))?;
    let rpc_node_urls: BTreeMap<u64, String> = chains
        .iter()
        .filter_map(|chain| chain.rpc_url.clone().map(|url| (chain.id, url)))
        .collect();
    let options = SdkOptions {
        environment: Environment::Production,
        app_id: INJECTED_ID.to_owned(),
        user: None,
        chain_id: first.id,
        rpc_node_urls,
    };
    Ok(sdk.create(options)?.ethereum().await?)
}

/// Connector over an injected EIP-1193 provider.
#[derive(Clone)]
pub struct InjectedConnector {
    inner: Arc<Inner>,
}

struct Inner {
    host: HostContext,
    provider: Arc<Web3Provider>,
    listening: AtomicBool,
}

impl fmt::Debug for InjectedConnector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InjectedConnector")
            .field("provider", &self.inner.provider)
            .field("listening", &self.inner.listening.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

impl InjectedConnector {
    /// Wrap an injected provider.
    #[must_use]
    pub fn new(host: HostContext, provider: Arc<dyn Eip1193Provider>) -> Self {
        Self {
            inner: Arc::new(Inner {
                host,
                provider: Arc::new(Web3Provider::new(provider, Some(REQUEST_TIMEOUT))),
                listening: AtomicBool::new(false),
            }),
        }
    }

    fn listen(&self) {
        if self.inner.listening.swap(true, Ordering::SeqCst) {
            return;
        }
        let kinds = [
            ProviderEventKind::Connect,
            ProviderEventKind::AccountsChanged,
            ProviderEventKind::ChainChanged,
            ProviderEventKind::Disconnect,
        ];
        for kind in kinds {
            let weak: Weak<Inner> = Arc::downgrade(&self.inner);
            self.inner.provider.on(
                kind,
                Arc::new(move |event: &ProviderEvent| {
                    let Some(inner) = weak.upgrade() else {
                        return;
                    };
                    let connector = Self { inner };
                    let event = event.clone();
                    tokio::spawn(async move {
                        if let Err(error) = connector.dispatch(event).await {
                            warn!(event = %kind, %error, "injected event handler failed");
                        }
                    });
                }),
            );
        }
    }

    async fn dispatch(&self, event: ProviderEvent) -> Result<()> {
        match event {
            ProviderEvent::Connect(info) => self.on_connect(info).await,
            ProviderEvent::AccountsChanged(accounts) => self.on_accounts_changed(accounts).await,
            ProviderEvent::ChainChanged(chain) => self.on_chain_changed(chain).await,
            ProviderEvent::Disconnect(error) => self.on_disconnect(Some(error)).await,
        }
    }

    async fn request_switch(&self, chain_id: u64) -> Result<()> {
        self.inner
            .provider
            .send(
                "wallet_switchEthereumChain",
                json!([{ "chainId": chain_id_to_hex(chain_id) }]),
            )
            .await
            .map(drop)
    }
}

#[async_trait]
impl Connector for InjectedConnector {
    fn id(&self) -> &str {
        INJECTED_ID
    }

    fn name(&self) -> &str {
        INJECTED_NAME
    }

    fn kind(&self) -> &str {
        INJECTED_ID
    }

    async fn setup(&self) {
        self.listen();
    }

    async fn connect(&self, args: ConnectArgs) -> Result<Connection> {
        self.listen();
        let signer = self.inner.provider.get_signer();

        let mut accounts = if args.is_reconnecting {
            best_effort("injected accounts", signer.accounts()).await
        } else {
            Vec::new()
        };
        if accounts.is_empty() {
            accounts.push(signer.request_address().await?);
        }

        let mut chain_id = signer.chain_id().await?;
        if let Some(requested) = args.chain_id
            && requested != chain_id
        {
            match self.switch_chain(requested).await {
                Ok(chain) => chain_id = chain.id,
                Err(error) if error.is_user_rejected() => return Err(error),
                Err(error) => warn!(requested, %error, "injected wallet stays on its chain"),
            }
        }

        self.inner
            .host
            .storage
            .remove_item(INJECTED_DISCONNECTED_KEY)
            .await?;
        info!(account = ?accounts.first(), chain_id, "injected wallet connected");
        Ok(Connection { accounts, chain_id })
    }

    async fn disconnect(&self) -> Result<()> {
        self.inner
            .host
            .storage
            .set_item(INJECTED_DISCONNECTED_KEY, Value::Bool(true))
            .await?;
        info!("injected wallet disconnected by user");
        Ok(())
    }

    async fn get_accounts(&self) -> Result<Vec<Address>> {
        self.inner.provider.get_signer().accounts().await
    }

    async fn get_chain_id(&self) -> Result<u64> {
        self.inner.provider.get_signer().chain_id().await
    }

    async fn get_provider(&self) -> Result<Arc<Web3Provider>> {
        Ok(Arc::clone(&self.inner.provider))
    }

    async fn is_authorized(&self) -> bool {
        match self.inner.host.storage.get_item(INJECTED_DISCONNECTED_KEY).await {
            Ok(Some(flag)) if is_truthy(&flag) => false,
            Ok(_) => !best_effort("injected authorization", self.get_accounts())
                .await
                .is_empty(),
            Err(error) => {
                debug!(%error, "could not read injected disconnect flag");
                false
            }
        }
    }

    async fn switch_chain(&self, chain_id: u64) -> Result<Chain> {
        let chain = self
            .inner
            .host
            .chain(chain_id)
            .cloned()
            .ok_or(ConnectorError::ChainNotConfigured { chain_id })?;
        self.request_switch(chain_id)
            .await
            .map_err(|error| ConnectorError::switch_chain(chain_id, error))?;
        info!(chain_id, chain = %chain.name, "injected wallet switched chain");
        Ok(chain)
    }

    async fn on_accounts_changed(&self, accounts: Vec<String>) -> Result<()> {
        if accounts.is_empty() {
            return self.on_disconnect(None).await;
        }
        let accounts = accounts
            .iter()
            .map(|raw| {
                raw.parse::<Address>().map_err(|e| {
                    ConnectorError::invalid_response(format!("bad account {raw}: {e}"))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        self.inner.host.emitter.emit(&ConnectorEvent::Change {
            accounts: Some(accounts),
            chain_id: None,
        });
        Ok(())
    }

    async fn on_chain_changed(&self, chain: Value) -> Result<()> {
        let chain_id = normalize_chain_id(&chain)
            .ok_or_else(|| ConnectorError::invalid_response(format!("invalid chain id: {chain}")))?;
        self.inner.host.emitter.emit(&ConnectorEvent::Change {
            accounts: None,
            chain_id: Some(chain_id),
        });
        Ok(())
    }

    async fn on_connect(&self, info: ConnectInfo) -> Result<()> {
        let accounts = self.get_accounts().await?;
        if accounts.is_empty() {
            return Ok(());
        }
        let chain_id = normalize_chain_id(&Value::String(info.chain_id.clone())).ok_or_else(|| {
            ConnectorError::invalid_response(format!("invalid chain id: {}", info.chain_id))
        })?;
        self.inner
            .host
            .emitter
            .emit(&ConnectorEvent::Connect { accounts, chain_id });
        Ok(())
    }

    async fn on_disconnect(&self, error: Option<RpcError>) -> Result<()> {
        debug!(reason = ?error, "injected provider disconnected");
        self.inner.host.emitter.emit(&ConnectorEvent::Disconnect);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use metakeep_connector::prelude::{EventName, MemoryStorage};

    use super::*;

    const DEV_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
    const DEV_ADDRESS: &str = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266";

    async fn injected() -> (InjectedConnector, HostContext) {
        let host = HostContext::new(
            vec![Chain::polygon_amoy(), Chain::polygon()],
            MemoryStorage::shared(),
        );
        let sdk = LocalKeySdk::builder().private_key(DEV_KEY).build().unwrap();
        let wallet = local_wallet(&sdk, &host.chains).await.unwrap();
        (InjectedConnector::new(host.clone(), wallet), host)
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    #[tokio::test]
    async fn test_local_wallet_needs_a_chain() {
        let sdk = LocalKeySdk::builder().private_key(DEV_KEY).build().unwrap();
        let err = local_wallet(&sdk, &[]).await.unwrap_err();
        assert!(matches!(err, ConnectorError::Config(_)));
    }

    #[tokio::test]
    async fn test_connect_disconnect_authorization() {
        let (connector, host) = injected().await;

        let connection = connector.connect(ConnectArgs::default()).await.unwrap();
        assert_eq!(connection.accounts[0].to_string(), DEV_ADDRESS);
        assert_eq!(connection.chain_id, 80_002);
        assert!(connector.is_authorized().await);

        connector.disconnect().await.unwrap();
        assert!(!connector.is_authorized().await);
        assert_eq!(
            host.storage.get_item(INJECTED_DISCONNECTED_KEY).await.unwrap(),
            Some(Value::Bool(true))
        );

        connector.connect(ConnectArgs::default().reconnecting()).await.unwrap();
        assert!(connector.is_authorized().await);
    }

    #[tokio::test]
    async fn test_switch_chain_relays_change() {
        let (connector, host) = injected().await;
        connector.setup().await;
        let changes = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&changes);
        host.emitter.on(EventName::Change, move |event| {
            sink.lock().unwrap().push(event.clone());
        });

        let chain = connector.switch_chain(137).await.unwrap();
        settle().await;

        assert_eq!(chain.id, 137);
        assert_eq!(connector.get_chain_id().await.unwrap(), 137);
        assert_eq!(
            *changes.lock().unwrap(),
            vec![ConnectorEvent::Change {
                accounts: None,
                chain_id: Some(137)
            }]
        );
    }

    #[tokio::test]
    async fn test_switch_to_unconfigured_chain_fails() {
        let (connector, _host) = injected().await;
        let err = connector.switch_chain(1).await.unwrap_err();
        assert!(matches!(err, ConnectorError::ChainNotConfigured { chain_id: 1 }));
    }

    #[tokio::test]
    async fn test_connect_on_requested_chain() {
        let (connector, _host) = injected().await;
        let connection = connector.connect(ConnectArgs::chain(137)).await.unwrap();
        assert_eq!(connection.chain_id, 137);
    }

    #[tokio::test]
    async fn test_empty_accounts_change_disconnects() {
        let (connector, host) = injected().await;
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        host.emitter.on(EventName::Disconnect, move |event| {
            sink.lock().unwrap().push(event.name());
        });

        connector.on_accounts_changed(Vec::new()).await.unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![EventName::Disconnect]);
    }
}
