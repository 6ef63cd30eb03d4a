//! The host's shared connector event emitter.
//!
//! Connectors report state to the host through three canonical events:
//! `connect`, `change` and `disconnect`. Downstream consumers (UI, the
//! orchestration layer) subscribe with [`Emitter::on`] or [`Emitter::once`].

use std::fmt;
use std::sync::Arc;

use alloy::primitives::Address;
use serde::Serialize;
use tracing::trace;

use crate::listeners::{ListenerId, ListenerRegistry};

/// Canonical host event names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum EventName {
    /// A connector established a connection.
    Connect,
    /// Accounts or chain changed on a live connection.
    Change,
    /// The connection ended.
    Disconnect,
}

impl EventName {
    /// Wire name of the event.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Connect => "connect",
            Self::Change => "change",
            Self::Disconnect => "disconnect",
        }
    }
}

impl fmt::Display for EventName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payload of a host event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ConnectorEvent {
    /// Connected with the given accounts on the given chain.
    Connect {
        /// Checksummed accounts, primary first.
        accounts: Vec<Address>,
        /// Active chain id.
        #[serde(rename = "chainId")]
        chain_id: u64,
    },
    /// Accounts and/or chain changed.
    Change {
        /// New accounts, if they changed.
        #[serde(skip_serializing_if = "Option::is_none")]
        accounts: Option<Vec<Address>>,
        /// New chain id, if it changed.
        #[serde(rename = "chainId", skip_serializing_if = "Option::is_none")]
        chain_id: Option<u64>,
    },
    /// The connection ended.
    Disconnect,
}

impl ConnectorEvent {
    /// The name this event is dispatched under.
    #[must_use]
    pub const fn name(&self) -> EventName {
        match self {
            Self::Connect { .. } => EventName::Connect,
            Self::Change { .. } => EventName::Change,
            Self::Disconnect => EventName::Disconnect,
        }
    }
}

/// Cloneable handle to the host's event emitter.
#[derive(Clone, Default)]
pub struct Emitter {
    registry: Arc<ListenerRegistry<EventName, ConnectorEvent>>,
}

impl fmt::Debug for Emitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Emitter")
            .field("connect", &self.listener_count(EventName::Connect))
            .field("change", &self.listener_count(EventName::Change))
            .field("disconnect", &self.listener_count(EventName::Disconnect))
            .finish()
    }
}

impl Emitter {
    /// Create an emitter with no listeners.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to `name`.
    pub fn on<F>(&self, name: EventName, listener: F) -> ListenerId
    where
        F: Fn(&ConnectorEvent) + Send + Sync + 'static,
    {
        self.registry.add(name, Arc::new(listener))
    }

    /// Subscribe to the next `name` event only.
    pub fn once<F>(&self, name: EventName, listener: F) -> ListenerId
    where
        F: Fn(&ConnectorEvent) + Send + Sync + 'static,
    {
        self.registry.add_once(name, Arc::new(listener))
    }

    /// Unsubscribe a listener. Returns `false` if it was not registered.
    pub fn off(&self, name: EventName, id: ListenerId) -> bool {
        self.registry.remove(name, id)
    }

    /// Number of listeners subscribed to `name`.
    #[must_use]
    pub fn listener_count(&self, name: EventName) -> usize {
        self.registry.count(name)
    }

    /// Notify every listener of `event`'s name.
    pub fn emit(&self, event: &ConnectorEvent) {
        let name = event.name();
        let delivered = self.registry.dispatch(name, event);
        trace!(event = %name, delivered, "emitted connector event");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_emit_routes_by_name() {
        let emitter = Emitter::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let sink = Arc::clone(&seen);
        emitter.on(EventName::Change, move |event| {
            sink.lock().unwrap().push(event.clone());
        });

        emitter.emit(&ConnectorEvent::Disconnect);
        emitter.emit(&ConnectorEvent::Change {
            accounts: None,
            chain_id: Some(137),
        });

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(
            seen[0],
            ConnectorEvent::Change {
                accounts: None,
                chain_id: Some(137)
            }
        );
    }

    #[test]
    fn test_listener_count_and_off() {
        let emitter = Emitter::new();
        let id = emitter.on(EventName::Connect, |_| {});
        emitter.once(EventName::Connect, |_| {});
        assert_eq!(emitter.listener_count(EventName::Connect), 2);

        emitter.emit(&ConnectorEvent::Connect {
            accounts: vec![Address::ZERO],
            chain_id: 1,
        });
        assert_eq!(emitter.listener_count(EventName::Connect), 1);

        assert!(emitter.off(EventName::Connect, id));
        assert_eq!(emitter.listener_count(EventName::Connect), 0);
    }

    #[test]
    fn test_event_serialization_uses_wire_names() {
        let event = ConnectorEvent::Change {
            accounts: None,
            chain_id: Some(80_002),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "change");
        assert_eq!(json["chainId"], 80_002);
        assert!(json.get("accounts").is_none());
    }
}
