//! Error types for the MetaKeep connector.
//!
//! [`ConnectorError`] separates the failure kinds a wallet UI reacts to
//! differently:
//! - configuration problems caught before the SDK is touched
//! - user rejections ("user cancelled" UI)
//! - transient unavailability and timeouts (safe to retry)
//! - chain switching failures
//!
//! Anything else a provider reports is carried verbatim in
//! [`ConnectorError::Provider`].

use std::future::Future;
use std::time::Duration;

use tracing::debug;

use crate::host::StorageError;
use crate::rpc::{RpcError, codes};

/// Result type alias for connector operations.
pub type Result<T> = std::result::Result<T, ConnectorError>;

/// The main error type for connector operations.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ConnectorError {
    /// The connector is misconfigured (e.g. no application id).
    #[error("Configuration error: {0}")]
    Config(String),

    /// The user declined a connection, signing or chain-switch prompt.
    #[error("User rejected the request: {0}")]
    UserRejected(RpcError),

    /// The wallet backend is temporarily unreachable.
    #[error("Requested resource not available: {0}")]
    ResourceUnavailable(RpcError),

    /// The requested chain is not part of the host's chain list.
    #[error("Chain {chain_id} is not configured")]
    ChainNotConfigured {
        /// The requested chain id.
        chain_id: u64,
    },

    /// Switching to a configured chain failed for a reason other than rejection.
    #[error("Failed to switch to chain {chain_id}: {source}")]
    SwitchChain {
        /// The requested chain id.
        chain_id: u64,
        /// Underlying failure.
        source: Box<ConnectorError>,
    },

    /// Unclassified provider error, passed through unchanged.
    #[error("Provider error: {0}")]
    Provider(RpcError),

    /// A provider call did not complete in time.
    #[error("'{method}' timed out after {after:?}")]
    Timeout {
        /// The JSON-RPC method or SDK call that timed out.
        method: String,
        /// The configured limit.
        after: Duration,
    },

    /// The provider answered with a payload the connector cannot interpret.
    #[error("Invalid provider response: {0}")]
    InvalidResponse(String),

    /// Host storage failure.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

impl ConnectorError {
    /// Create a configuration error with a message.
    #[must_use]
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an invalid response error with a message.
    #[must_use]
    pub fn invalid_response(msg: impl Into<String>) -> Self {
        Self::InvalidResponse(msg.into())
    }

    /// Wrap a failure that happened while switching to `chain_id`.
    ///
    /// User rejections are not wrapped so callers can still recognize them.
    #[must_use]
    pub fn switch_chain(chain_id: u64, source: Self) -> Self {
        match source {
            Self::UserRejected(_) | Self::SwitchChain { .. } => source,
            other => Self::SwitchChain {
                chain_id,
                source: Box::new(other),
            },
        }
    }

    /// Returns `true` if the user declined the request.
    #[must_use]
    pub const fn is_user_rejected(&self) -> bool {
        matches!(self, Self::UserRejected(_))
    }

    /// Returns `true` if this is a transient error that may succeed on retry.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::ResourceUnavailable(_) | Self::Timeout { .. })
    }
}

impl From<RpcError> for ConnectorError {
    fn from(err: RpcError) -> Self {
        match err.code {
            codes::USER_REJECTED_REQUEST => Self::UserRejected(err),
            codes::RESOURCE_UNAVAILABLE => Self::ResourceUnavailable(err),
            _ => Self::Provider(err),
        }
    }
}

/// Await `fut` and fall back to `T::default()` on any error.
///
/// Used where a failure only means "nothing known yet", such as reusing
/// accounts while reconnecting or probing authorization.
pub async fn best_effort<T, F>(what: &str, fut: F) -> T
where
    T: Default,
    F: Future<Output = Result<T>>,
{
    match fut.await {
        Ok(value) => value,
        Err(error) => {
            debug!(what, %error, "best-effort call failed, using default");
            T::default()
        }
    }
}

/// Bound `fut` by `limit`, mapping expiry to [`ConnectorError::Timeout`].
pub(crate) async fn with_timeout<T, F>(method: &str, limit: Option<Duration>, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match limit {
        Some(after) => tokio::time::timeout(after, fut)
            .await
            .map_err(|_| ConnectorError::Timeout {
                method: method.to_owned(),
                after,
            })?,
        None => fut.await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rpc_error_classification() {
        let err: ConnectorError = RpcError::user_rejected("denied").into();
        assert!(err.is_user_rejected());

        let err: ConnectorError = RpcError::resource_unavailable("busy").into();
        assert!(matches!(err, ConnectorError::ResourceUnavailable(_)));
        assert!(err.is_retryable());

        let raw = RpcError::new(-32000, "execution reverted");
        let err: ConnectorError = raw.clone().into();
        assert!(matches!(err, ConnectorError::Provider(ref inner) if *inner == raw));
    }

    #[test]
    fn test_switch_chain_keeps_user_rejection() {
        let err = ConnectorError::switch_chain(137, RpcError::user_rejected("no").into());
        assert!(err.is_user_rejected());

        let err = ConnectorError::switch_chain(137, RpcError::internal("boom").into());
        assert!(matches!(err, ConnectorError::SwitchChain { chain_id: 137, .. }));
    }

    #[tokio::test]
    async fn test_best_effort_defaults_on_error() {
        let accounts: Vec<u8> =
            best_effort("accounts", async { Err(ConnectorError::config("missing")) }).await;
        assert!(accounts.is_empty());

        let value = best_effort("value", async { Ok(7_u32) }).await;
        assert_eq!(value, 7);
    }

    #[tokio::test]
    async fn test_with_timeout_expires() {
        let result: Result<()> = with_timeout(
            "eth_requestAccounts",
            Some(Duration::from_millis(10)),
            std::future::pending(),
        )
        .await;
        assert!(matches!(result, Err(ConnectorError::Timeout { .. })));
        assert!(result.unwrap_err().is_retryable());
    }
}
