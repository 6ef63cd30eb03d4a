//! A terminal stand-in for the wallet-connection modal.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use anyhow::{Result, anyhow};
use metakeep_connector::error::best_effort;
use metakeep_connector::host::{
    ConnectArgs, Connection, ConnectorEvent, EventName, HostContext, SharedConnector,
};
use metakeep_connector::listeners::ListenerId;
use tracing::{debug, info};

type Sink = Arc<dyn Fn(&ConnectorEvent) + Send + Sync>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn notify(sinks: &Mutex<Vec<Sink>>, event: &ConnectorEvent) {
    let sinks = lock(sinks).clone();
    for sink in sinks {
        sink(event);
    }
}

/// What the modal knows about one registered connector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectorStatus {
    /// Connector id.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Whether a silent reconnect would succeed.
    pub authorized: bool,
    /// Exposed accounts, checksummed.
    pub accounts: Vec<String>,
    /// Active chain, when the wallet reports one.
    pub chain_id: Option<u64>,
}

impl fmt::Display for ConnectorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.id)?;
        if !self.authorized {
            return f.write_str(": not connected");
        }
        write!(f, ": {}", self.accounts.join(", "))?;
        if let Some(chain_id) = self.chain_id {
            write!(f, " on chain {chain_id}")?;
        }
        Ok(())
    }
}

/// Holds the modal's project id, the shared host services and the connectors
/// offered to the user.
///
/// While nothing is connected the modal keeps a one-shot `connect` listener
/// on the host emitter, which tells connectors the host is waiting for a
/// connection. It is dropped once a connection is made and put back on
/// disconnect, so account changes on a live connection arrive as `change`.
pub struct WalletModal {
    project_id: String,
    host: HostContext,
    connectors: Vec<SharedConnector>,
    sinks: Arc<Mutex<Vec<Sink>>>,
    connect_watch: Mutex<Option<ListenerId>>,
}

impl fmt::Debug for WalletModal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WalletModal")
            .field("project_id", &self.project_id)
            .field(
                "connectors",
                &self.connectors.iter().map(|c| c.id()).collect::<Vec<_>>(),
            )
            .field("waiting", &lock(&self.connect_watch).is_some())
            .finish_non_exhaustive()
    }
}

impl WalletModal {
    /// Create a modal with no connectors.
    #[must_use]
    pub fn new(project_id: impl Into<String>, host: HostContext) -> Self {
        Self {
            project_id: project_id.into(),
            host,
            connectors: Vec::new(),
            sinks: Arc::new(Mutex::new(Vec::new())),
            connect_watch: Mutex::new(None),
        }
    }

    /// The modal project id.
    #[must_use]
    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    /// Offer a connector to the user.
    pub fn register(&mut self, connector: SharedConnector) {
        debug!(id = connector.id(), "registered connector");
        self.connectors.push(connector);
    }

    /// Registered connectors, in registration order.
    #[must_use]
    pub fn connectors(&self) -> &[SharedConnector] {
        &self.connectors
    }

    /// Look up a connector by id.
    pub fn connector(&self, id: &str) -> Result<&SharedConnector> {
        self.connectors
            .iter()
            .find(|c| c.id() == id)
            .ok_or_else(|| anyhow!("unknown connector '{id}'"))
    }

    /// Run every connector's setup and start waiting for a connection.
    pub async fn setup(&self) {
        for connector in &self.connectors {
            connector.setup().await;
        }
        self.watch_connect();
    }

    /// Forward every host event to `listener`.
    ///
    /// `change` and `disconnect` are subscribed on the emitter directly;
    /// `connect` is delivered by the modal itself.
    pub fn on_events<F>(&self, listener: F) -> Vec<(EventName, ListenerId)>
    where
        F: Fn(&ConnectorEvent) + Clone + Send + Sync + 'static,
    {
        lock(&self.sinks).push(Arc::new(listener.clone()));
        [EventName::Change, EventName::Disconnect]
            .into_iter()
            .map(|name| (name, self.host.emitter.on(name, listener.clone())))
            .collect()
    }

    fn watch_connect(&self) {
        let mut slot = lock(&self.connect_watch);
        if let Some(stale) = slot.take() {
            self.host.emitter.off(EventName::Connect, stale);
        }
        let sinks = Arc::clone(&self.sinks);
        let id = self
            .host
            .emitter
            .once(EventName::Connect, move |event| notify(&sinks, event));
        *slot = Some(id);
    }

    fn unwatch_connect(&self) {
        if let Some(id) = lock(&self.connect_watch).take() {
            self.host.emitter.off(EventName::Connect, id);
        }
    }

    /// Current status of every connector.
    pub async fn status(&self) -> Vec<ConnectorStatus> {
        let mut statuses = Vec::with_capacity(self.connectors.len());
        for connector in &self.connectors {
            let authorized = connector.is_authorized().await;
            let (accounts, chain_id) = if authorized {
                let accounts = best_effort("status accounts", connector.get_accounts()).await;
                let chain_id = connector.get_chain_id().await.ok();
                (accounts.iter().map(ToString::to_string).collect(), chain_id)
            } else {
                (Vec::new(), None)
            };
            statuses.push(ConnectorStatus {
                id: connector.id().to_owned(),
                name: connector.name().to_owned(),
                authorized,
                accounts,
                chain_id,
            });
        }
        statuses
    }

    /// Connect through the connector with `id`.
    pub async fn connect(&self, id: &str, args: ConnectArgs) -> Result<Connection> {
        let connector = self.connector(id)?;
        self.unwatch_connect();
        match connector.connect(args).await {
            Ok(connection) => {
                notify(
                    &self.sinks,
                    &ConnectorEvent::Connect {
                        accounts: connection.accounts.clone(),
                        chain_id: connection.chain_id,
                    },
                );
                Ok(connection)
            }
            Err(error) => {
                self.watch_connect();
                Err(error.into())
            }
        }
    }

    /// Silently reconnect the connector with `id` if it is still authorized.
    pub async fn restore(&self, id: &str) -> Result<Option<Connection>> {
        let connector = self.connector(id)?;
        if !connector.is_authorized().await {
            return Ok(None);
        }
        match connector.connect(ConnectArgs::default().reconnecting()).await {
            Ok(connection) => {
                self.unwatch_connect();
                info!(id, "restored previous session");
                Ok(Some(connection))
            }
            Err(error) => {
                debug!(id, %error, "reconnect failed");
                Ok(None)
            }
        }
    }

    /// Disconnect the connector with `id`, tell listeners and wait for the
    /// next connection.
    pub async fn disconnect(&self, id: &str) -> Result<()> {
        self.connector(id)?.disconnect().await?;
        self.host.emitter.emit(&ConnectorEvent::Disconnect);
        self.watch_connect();
        Ok(())
    }
}
