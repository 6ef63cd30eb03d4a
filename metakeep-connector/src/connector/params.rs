//! Connector configuration.

use std::collections::BTreeMap;
use std::time::Duration;

use url::Url;

use crate::error::{ConnectorError, Result};
use crate::sdk::{Environment, SdkOptions, User};

/// Default target chain: Polygon Amoy.
pub const DEFAULT_CHAIN_ID: u64 = 80_002;

/// Default RPC endpoint for [`DEFAULT_CHAIN_ID`].
pub const DEFAULT_RPC_URL: &str = "https://polygon-amoy-bor-rpc.publicnode.com";

/// Default bound on a single provider call.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Parameters a [`MetaKeepConnector`](super::MetaKeepConnector) is created with.
///
/// The application id is checked when the provider is first created, not
/// here, so a connector can be registered before its configuration is
/// complete.
///
/// # Examples
///
/// ```rust,ignore
/// let params = MetaKeepParameters::new()
///     .app_id("my-app-id")
///     .user(User::email("user@example.com"))
///     .network(80_002, "https://polygon-amoy-bor-rpc.publicnode.com");
/// ```
#[derive(Debug, Clone)]
pub struct MetaKeepParameters {
    /// Application id issued by MetaKeep.
    app_id: Option<String>,
    /// End user the wallet belongs to.
    user: Option<User>,
    /// SDK backend environment.
    environment: Environment,
    /// Chain the SDK provider starts on.
    chain_id: u64,
    /// RPC endpoint for `chain_id`.
    rpc_url: String,
    /// Extra RPC endpoints the wallet may switch to.
    extra_rpc_urls: BTreeMap<u64, String>,
    /// Bound on each provider call; `None` waits indefinitely.
    request_timeout: Option<Duration>,
}

impl Default for MetaKeepParameters {
    fn default() -> Self {
        Self {
            app_id: None,
            user: None,
            environment: Environment::default(),
            chain_id: DEFAULT_CHAIN_ID,
            rpc_url: DEFAULT_RPC_URL.to_owned(),
            extra_rpc_urls: BTreeMap::new(),
            request_timeout: Some(DEFAULT_REQUEST_TIMEOUT),
        }
    }
}

impl MetaKeepParameters {
    /// Parameters with default network and no application id.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the application id.
    #[must_use]
    pub fn app_id(mut self, app_id: impl Into<String>) -> Self {
        self.app_id = Some(app_id.into());
        self
    }

    /// Set the end user.
    #[must_use]
    pub fn user(mut self, user: User) -> Self {
        self.user = Some(user);
        self
    }

    /// Set the SDK environment.
    #[must_use]
    pub const fn environment(mut self, environment: Environment) -> Self {
        self.environment = environment;
        self
    }

    /// Set the chain the SDK starts on and its RPC endpoint.
    #[must_use]
    pub fn network(mut self, chain_id: u64, rpc_url: impl Into<String>) -> Self {
        self.chain_id = chain_id;
        self.rpc_url = rpc_url.into();
        self
    }

    /// Add an RPC endpoint for another chain the wallet may switch to.
    #[must_use]
    pub fn rpc_url_for(mut self, chain_id: u64, rpc_url: impl Into<String>) -> Self {
        self.extra_rpc_urls.insert(chain_id, rpc_url.into());
        self
    }

    /// Set the bound on each provider call (`None` disables it).
    #[must_use]
    pub const fn request_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// The configured chain id.
    #[must_use]
    pub const fn chain_id(&self) -> u64 {
        self.chain_id
    }

    /// The configured request timeout.
    #[must_use]
    pub const fn timeout(&self) -> Option<Duration> {
        self.request_timeout
    }

    /// Validate and produce the SDK construction options.
    pub fn sdk_options(&self) -> Result<SdkOptions> {
        let app_id = self
            .app_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| ConnectorError::config("MetaKeep appId is required"))?;

        let mut rpc_node_urls = self.extra_rpc_urls.clone();
        rpc_node_urls.insert(self.chain_id, self.rpc_url.clone());
        for (chain_id, url) in &rpc_node_urls {
            Url::parse(url).map_err(|e| {
                ConnectorError::config(format!("invalid RPC URL for chain {chain_id}: {e}"))
            })?;
        }

        Ok(SdkOptions {
            environment: self.environment,
            app_id: app_id.to_owned(),
            user: self.user.clone(),
            chain_id: self.chain_id,
            rpc_node_urls,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_target_amoy() {
        let params = MetaKeepParameters::new();
        assert_eq!(params.chain_id(), 80_002);
        assert_eq!(params.timeout(), Some(Duration::from_secs(120)));
    }

    #[test]
    fn test_missing_or_blank_app_id_is_config_error() {
        let err = MetaKeepParameters::new().sdk_options().unwrap_err();
        assert!(matches!(err, ConnectorError::Config(_)));

        let err = MetaKeepParameters::new().app_id("  ").sdk_options().unwrap_err();
        assert!(matches!(err, ConnectorError::Config(_)));
    }

    #[test]
    fn test_sdk_options_include_every_rpc_url() {
        let options = MetaKeepParameters::new()
            .app_id("app")
            .user(User::email("user@example.com"))
            .rpc_url_for(137, "https://polygon-bor-rpc.publicnode.com")
            .sdk_options()
            .unwrap();
        assert_eq!(options.app_id, "app");
        assert_eq!(options.chain_id, 80_002);
        assert_eq!(options.rpc_node_urls.len(), 2);
        assert_eq!(options.rpc_node_urls[&80_002], DEFAULT_RPC_URL);
    }

    #[test]
    fn test_sdk_options_carry_environment_and_user() {
        let options = MetaKeepParameters::new()
            .app_id("app")
            .environment(Environment::Development)
            .user(User::phone("+15550100"))
            .sdk_options()
            .unwrap();
        assert_eq!(options.environment, Environment::Development);
        assert_eq!(options.user, Some(User::phone("+15550100")));
    }

    #[test]
    fn test_invalid_rpc_url_is_config_error() {
        let err = MetaKeepParameters::new()
            .app_id("app")
            .network(1, "not a url")
            .sdk_options()
            .unwrap_err();
        assert!(matches!(err, ConnectorError::Config(_)));
    }
}
