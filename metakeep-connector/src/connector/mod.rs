//! The MetaKeep connector adapter.
//!
//! [`MetaKeepConnector`] implements the host [`Connector`] contract on top of
//! the provider a MetaKeep SDK yields.
//!
//! # Architecture
//!
//! ```text
//! MetaKeepConnector (Arc<Inner>)
//!   ├── provider   OnceCell<Arc<Web3Provider>>   one creation, shared by all callers
//!   ├── bindings   Mutex<Option<Bindings>>       pre-connect {connect} | post-connect
//!   │                                            {accountsChanged, chainChanged, disconnect}
//!   └── relay task provider listener → mpsc → on_* handler → host Emitter
//! ```
//!
//! Provider listeners only forward events into a channel. A single relay
//! task per connector drains it and awaits the matching `on_*` handler, so
//! handlers never run concurrently with each other.
//!
//! # Examples
//!
//! ```rust,ignore
//! let host = HostContext::new(vec![Chain::polygon_amoy()], MemoryStorage::shared());
//! let connector = MetaKeepConnector::new(
//!     MetaKeepParameters::new().app_id("my-app-id"),
//!     host,
//!     Arc::new(sdk_factory),
//! );
//!
//! connector.setup().await;
//! let connection = connector.connect(ConnectArgs::chain(80_002)).await?;
//! ```

mod bindings;
mod params;

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use alloy::primitives::Address;
use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::sync::OnceCell;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::oneshot;
use tokio::task::AbortHandle;
use tracing::{debug, info, warn};

pub use bindings::ListenerPhase;
pub use params::{DEFAULT_CHAIN_ID, DEFAULT_REQUEST_TIMEOUT, DEFAULT_RPC_URL, MetaKeepParameters};

use bindings::Bindings;
use crate::error::{ConnectorError, Result, best_effort, with_timeout};
use crate::host::{
    Chain, ConnectArgs, Connection, Connector, ConnectorEvent, Emitter, EventName, HostContext,
};
use crate::provider::{ConnectInfo, ProviderEvent, Web3Provider, parse_address};
use crate::rpc::{RpcError, chain_id_to_hex, codes, is_truthy, normalize_chain_id, parse_chain_id};
use crate::sdk::SdkFactory;

/// Connector id, name and type tag.
pub const CONNECTOR_ID: &str = "metaKeep";

/// Display name.
pub const CONNECTOR_NAME: &str = "MetaKeep";

/// Storage key of the "user disconnected" flag.
pub const DISCONNECTED_KEY: &str = "metaKeep.disconnected";

/// Session storage key of the cached primary address.
pub const SESSION_ADDRESS_KEY: &str = "metaKeep.address";

/// Session storage key of the cached chain id.
pub const SESSION_CHAIN_KEY: &str = "metaKeep.chainId";

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Connector for MetaKeep custodial wallets.
///
/// Cheap to clone; clones share the provider, listener bindings and relay.
#[derive(Clone)]
pub struct MetaKeepConnector {
    inner: Arc<Inner>,
}

struct Inner {
    params: MetaKeepParameters,
    host: HostContext,
    factory: Arc<dyn SdkFactory>,
    provider: OnceCell<Arc<Web3Provider>>,
    bindings: Mutex<Option<Bindings>>,
    events_tx: UnboundedSender<ProviderEvent>,
    events_rx: Mutex<Option<UnboundedReceiver<ProviderEvent>>>,
    relay: Mutex<Option<AbortHandle>>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        let relay = self
            .relay
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(relay) = relay {
            relay.abort();
        }
    }
}

impl fmt::Debug for MetaKeepConnector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetaKeepConnector")
            .field("id", &CONNECTOR_ID)
            .field("chain_id", &self.inner.params.chain_id())
            .field("provider", &self.inner.provider.initialized())
            .field("phase", &self.listener_phase())
            .finish_non_exhaustive()
    }
}

impl MetaKeepConnector {
    /// Create a connector. Nothing is validated or contacted until first use.
    #[must_use]
    pub fn new(
        params: MetaKeepParameters,
        host: HostContext,
        factory: Arc<dyn SdkFactory>,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            inner: Arc::new(Inner {
                params,
                host,
                factory,
                provider: OnceCell::new(),
                bindings: Mutex::new(None),
                events_tx,
                events_rx: Mutex::new(Some(events_rx)),
                relay: Mutex::new(None),
            }),
        }
    }

    /// The connector's parameters.
    #[must_use]
    pub fn params(&self) -> &MetaKeepParameters {
        &self.inner.params
    }

    /// The host emitter this connector reports to.
    #[must_use]
    pub fn emitter(&self) -> &Emitter {
        &self.inner.host.emitter
    }

    /// The listener set attached to the provider, or `None` before the
    /// provider exists.
    #[must_use]
    pub fn listener_phase(&self) -> Option<ListenerPhase> {
        lock(&self.inner.bindings).as_ref().map(Bindings::phase)
    }

    fn rebind(&self, provider: &Web3Provider, target: ListenerPhase) {
        let mut slot = lock(&self.inner.bindings);
        bindings::transition(&mut slot, provider, target, &self.inner.events_tx);
    }

    fn start_relay(&self) {
        let Some(mut events) = lock(&self.inner.events_rx).take() else {
            return;
        };
        let weak = Arc::downgrade(&self.inner);
        let handle = tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                let connector = Self { inner };
                let kind = event.kind();
                if let Err(error) = connector.dispatch(event).await {
                    warn!(event = %kind, %error, "provider event handler failed");
                }
            }
        });
        *lock(&self.inner.relay) = Some(handle.abort_handle());
    }

    async fn dispatch(&self, event: ProviderEvent) -> Result<()> {
        match event {
            ProviderEvent::Connect(info) => self.on_connect(info).await,
            ProviderEvent::AccountsChanged(accounts) => self.on_accounts_changed(accounts).await,
            ProviderEvent::ChainChanged(chain) => self.on_chain_changed(chain).await,
            ProviderEvent::Disconnect(error) => self.on_disconnect(Some(error)).await,
        }
    }

    /// The single provider construction path.
    async fn create_provider(&self) -> Result<Arc<Web3Provider>> {
        let options = self.inner.params.sdk_options()?;
        let timeout = self.inner.params.timeout();
        debug!(
            environment = %options.environment,
            chain_id = options.chain_id,
            "creating MetaKeep SDK"
        );

        let sdk = self.inner.factory.create(options)?;
        let ethereum = with_timeout("ethereum", timeout, async {
            sdk.ethereum().await.map_err(ConnectorError::from)
        })
        .await?;
        let provider = Arc::new(Web3Provider::new(ethereum, timeout));

        self.start_relay();
        self.rebind(&provider, ListenerPhase::PreConnect);
        info!(connector = CONNECTOR_ID, "provider ready");
        Ok(provider)
    }

    async fn remember_session(&self, connection: &Connection) {
        let Some(session) = &self.inner.host.session else {
            return;
        };
        let address = connection.accounts.first().map(|a| a.to_checksum(None));
        let writes = async {
            if let Some(address) = address {
                session
                    .set_item(SESSION_ADDRESS_KEY, Value::String(address))
                    .await?;
            }
            session
                .set_item(SESSION_CHAIN_KEY, json!(connection.chain_id))
                .await
        };
        if let Err(error) = writes.await {
            warn!(%error, "failed to cache session values");
        }
    }

    async fn clear_session(&self) {
        let Some(session) = &self.inner.host.session else {
            return;
        };
        for key in [SESSION_ADDRESS_KEY, SESSION_CHAIN_KEY] {
            if let Err(error) = session.remove_item(key).await {
                warn!(key, %error, "failed to clear cached session value");
            }
        }
    }
}

#[async_trait]
impl Connector for MetaKeepConnector {
    fn id(&self) -> &str {
        CONNECTOR_ID
    }

    fn name(&self) -> &str {
        CONNECTOR_NAME
    }

    fn kind(&self) -> &str {
        CONNECTOR_ID
    }

    async fn setup(&self) {
        if let Err(error) = self.get_provider().await {
            warn!(%error, "setup could not create the provider");
        }
    }

    async fn connect(&self, args: ConnectArgs) -> Result<Connection> {
        let provider = self.get_provider().await?;
        let signer = provider.get_signer();

        let mut accounts = if args.is_reconnecting {
            best_effort("reconnect accounts", signer.accounts()).await
        } else {
            Vec::new()
        };
        if accounts.is_empty() {
            accounts.push(signer.request_address().await?);
        }

        self.rebind(&provider, ListenerPhase::PostConnect);

        let mut chain_id = signer.chain_id().await?;
        if let Some(requested) = args.chain_id
            && requested != chain_id
        {
            match self.switch_chain(requested).await {
                Ok(chain) => chain_id = chain.id,
                Err(error) if error.is_user_rejected() => return Err(error),
                Err(error) => {
                    warn!(requested, current = chain_id, %error, "staying on current chain");
                }
            }
        }

        self.inner.host.storage.remove_item(DISCONNECTED_KEY).await?;

        let connection = Connection { accounts, chain_id };
        self.remember_session(&connection).await;
        info!(
            account = ?connection.accounts.first(),
            chain_id,
            reconnecting = args.is_reconnecting,
            "connected"
        );
        Ok(connection)
    }

    async fn disconnect(&self) -> Result<()> {
        let provider = self.get_provider().await?;
        self.rebind(&provider, ListenerPhase::PreConnect);
        self.inner
            .host
            .storage
            .set_item(DISCONNECTED_KEY, Value::Bool(true))
            .await?;
        self.clear_session().await;
        info!(connector = CONNECTOR_ID, "disconnected by user");
        Ok(())
    }

    async fn get_accounts(&self) -> Result<Vec<Address>> {
        let provider = self.get_provider().await?;
        provider.get_signer().accounts().await
    }

    async fn get_chain_id(&self) -> Result<u64> {
        let provider = self.get_provider().await?;
        provider.get_signer().chain_id().await
    }

    async fn get_provider(&self) -> Result<Arc<Web3Provider>> {
        self.inner
            .provider
            .get_or_try_init(|| self.create_provider())
            .await
            .map(Arc::clone)
    }

    async fn is_authorized(&self) -> bool {
        match self.inner.host.storage.get_item(DISCONNECTED_KEY).await {
            Ok(Some(flag)) if is_truthy(&flag) => return false,
            Ok(_) => {}
            Err(error) => {
                debug!(%error, "could not read disconnect flag");
                return false;
            }
        }
        !best_effort("authorization check", self.get_accounts())
            .await
            .is_empty()
    }

    async fn switch_chain(&self, chain_id: u64) -> Result<Chain> {
        let chain = self
            .inner
            .host
            .chain(chain_id)
            .cloned()
            .ok_or(ConnectorError::ChainNotConfigured { chain_id })?;
        let provider = self.get_provider().await?;
        let emitter = &self.inner.host.emitter;

        let (confirmed_tx, confirmed_rx) = oneshot::channel::<()>();
        let confirmed_tx = Mutex::new(Some(confirmed_tx));
        let waiter = emitter.on(EventName::Change, move |event| {
            if let ConnectorEvent::Change {
                chain_id: Some(current),
                ..
            } = event
                && *current == chain_id
                && let Some(tx) = lock(&confirmed_tx).take()
            {
                let _ = tx.send(());
            }
        });

        let request = provider.send(
            "wallet_switchEthereumChain",
            json!([{ "chainId": chain_id_to_hex(chain_id) }]),
        );
        let confirmation = with_timeout("chainChanged", self.inner.params.timeout(), async {
            confirmed_rx
                .await
                .map_err(|_| ConnectorError::invalid_response("chain change confirmation dropped"))
        });
        let outcome = tokio::try_join!(request, confirmation);
        emitter.off(EventName::Change, waiter);

        match outcome {
            Ok(_) => {
                info!(chain_id, chain = %chain.name, "switched chain");
                Ok(chain)
            }
            Err(error) => Err(ConnectorError::switch_chain(chain_id, error)),
        }
    }

    async fn on_accounts_changed(&self, accounts: Vec<String>) -> Result<()> {
        if accounts.is_empty() {
            return self.on_disconnect(None).await;
        }

        if self.inner.host.emitter.listener_count(EventName::Connect) > 0 {
            let chain_id = self.get_chain_id().await?;
            self.on_connect(ConnectInfo::from_chain_id(chain_id)).await?;
            self.inner.host.storage.remove_item(DISCONNECTED_KEY).await?;
            return Ok(());
        }

        let accounts = accounts
            .iter()
            .map(|raw| parse_address(raw))
            .collect::<Result<Vec<_>>>()?;
        debug!(accounts = accounts.len(), "accounts changed");
        self.inner.host.emitter.emit(&ConnectorEvent::Change {
            accounts: Some(accounts),
            chain_id: None,
        });
        Ok(())
    }

    async fn on_chain_changed(&self, chain: Value) -> Result<()> {
        let chain_id = normalize_chain_id(&chain)
            .ok_or_else(|| ConnectorError::invalid_response(format!("invalid chain id: {chain}")))?;
        debug!(chain_id, "chain changed");
        self.inner.host.emitter.emit(&ConnectorEvent::Change {
            accounts: None,
            chain_id: Some(chain_id),
        });
        Ok(())
    }

    async fn on_connect(&self, info: ConnectInfo) -> Result<()> {
        let accounts = self.get_accounts().await?;
        if accounts.is_empty() {
            debug!("provider connected without accounts");
            return Ok(());
        }
        let chain_id = parse_chain_id(&info.chain_id).ok_or_else(|| {
            ConnectorError::invalid_response(format!("invalid chain id: {}", info.chain_id))
        })?;

        self.inner
            .host
            .emitter
            .emit(&ConnectorEvent::Connect { accounts, chain_id });

        let provider = self.get_provider().await?;
        self.rebind(&provider, ListenerPhase::PostConnect);
        Ok(())
    }

    async fn on_disconnect(&self, error: Option<RpcError>) -> Result<()> {
        if let Some(reason) = &error
            && reason.code == codes::TRY_AGAIN_LATER
            && self.inner.provider.initialized()
            && !best_effort("transient disconnect check", self.get_accounts())
                .await
                .is_empty()
        {
            debug!(%reason, "ignoring transient disconnect");
            return Ok(());
        }

        self.clear_session().await;
        self.inner.host.emitter.emit(&ConnectorEvent::Disconnect);
        if let Some(provider) = self.inner.provider.get() {
            self.rebind(provider, ListenerPhase::PreConnect);
        }
        info!(reason = ?error, "provider disconnected");
        Ok(())
    }
}
