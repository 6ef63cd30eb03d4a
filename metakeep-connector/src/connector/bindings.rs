//! Provider listener sets.
//!
//! While a provider exists exactly one of two listener sets is attached to
//! it. [`transition`] is the only way to move between them: it detaches the
//! old set and attaches the new one while the caller holds the bindings lock.

use std::fmt;
use std::sync::Arc;

use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, trace};

use crate::listeners::ListenerId;
use crate::provider::{ProviderEvent, ProviderEventKind, Web3Provider};

/// Which listener set is attached to the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListenerPhase {
    /// Waiting for the provider to connect: `{connect}`.
    PreConnect,
    /// Connected: `{accountsChanged, chainChanged, disconnect}`.
    PostConnect,
}

impl ListenerPhase {
    /// The provider events observed in this phase.
    #[must_use]
    pub const fn events(self) -> &'static [ProviderEventKind] {
        match self {
            Self::PreConnect => &[ProviderEventKind::Connect],
            Self::PostConnect => &[
                ProviderEventKind::AccountsChanged,
                ProviderEventKind::ChainChanged,
                ProviderEventKind::Disconnect,
            ],
        }
    }
}

impl fmt::Display for ListenerPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PreConnect => f.write_str("pre-connect"),
            Self::PostConnect => f.write_str("post-connect"),
        }
    }
}

/// The listener set currently attached to the provider.
#[derive(Debug)]
pub(crate) struct Bindings {
    phase: ListenerPhase,
    attached: Vec<(ProviderEventKind, ListenerId)>,
}

impl Bindings {
    pub(crate) const fn phase(&self) -> ListenerPhase {
        self.phase
    }

    fn attach(
        provider: &Web3Provider,
        phase: ListenerPhase,
        sink: &UnboundedSender<ProviderEvent>,
    ) -> Self {
        let attached = phase
            .events()
            .iter()
            .map(|&kind| {
                let sink = sink.clone();
                let id = provider.on(
                    kind,
                    Arc::new(move |event: &ProviderEvent| {
                        if sink.send(event.clone()).is_err() {
                            trace!(event = %kind, "event relay closed, dropping provider event");
                        }
                    }),
                );
                (kind, id)
            })
            .collect();
        Self { phase, attached }
    }

    fn detach(self, provider: &Web3Provider) {
        for (kind, id) in self.attached {
            provider.remove_listener(kind, id);
        }
    }
}

/// Move `slot` to `target`, attaching the target set if nothing is bound yet.
///
/// Returns `false` when `target` was already attached.
pub(crate) fn transition(
    slot: &mut Option<Bindings>,
    provider: &Web3Provider,
    target: ListenerPhase,
    sink: &UnboundedSender<ProviderEvent>,
) -> bool {
    if slot.as_ref().is_some_and(|b| b.phase == target) {
        return false;
    }
    let from = slot.as_ref().map(Bindings::phase);
    if let Some(current) = slot.take() {
        current.detach(provider);
    }
    *slot = Some(Bindings::attach(provider, target, sink));
    debug!(from = ?from, to = %target, "provider listeners rebound");
    true
}
