//! Custodial wallet SDK seam.
//!
//! The connector never talks to the key-management backend directly. It
//! builds the SDK from [`SdkOptions`] through an [`SdkFactory`], then asks the
//! SDK for its native EIP-1193 provider.
//!
//! ```text
//! SdkFactory::create(SdkOptions)   → Arc<dyn CustodialSdk>
//!   └── CustodialSdk::ethereum()   → Arc<dyn Eip1193Provider>  (async)
//!         └── Web3Provider::new()  → cached by the connector
//! ```
//!
//! [`LocalKeySdk`] implements the seam with a locally held key, for
//! development and demos.

mod local;

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use local::{LocalKeySdk, LocalKeySdkBuilder};

use crate::provider::Eip1193Provider;
use crate::rpc::RpcError;

/// SDK deployment environment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// Development backend.
    #[serde(rename = "dev")]
    Development,
    /// Production backend.
    #[default]
    Production,
}

impl Environment {
    /// Wire name of the environment.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Development => "dev",
            Self::Production => "production",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "dev" | "development" => Ok(Self::Development),
            "prod" | "production" => Ok(Self::Production),
            other => Err(format!("unknown environment '{other}' (expected dev or production)")),
        }
    }
}

/// The end user the custodial wallet belongs to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Contact email.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Contact phone number.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

impl User {
    /// A user identified by email.
    #[must_use]
    pub fn email(email: impl Into<String>) -> Self {
        Self {
            email: Some(email.into()),
            phone: None,
        }
    }

    /// A user identified by phone number.
    #[must_use]
    pub fn phone(phone: impl Into<String>) -> Self {
        Self {
            email: None,
            phone: Some(phone.into()),
        }
    }
}

/// Options the SDK is constructed with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SdkOptions {
    /// Backend environment.
    pub environment: Environment,
    /// Application id issued by the wallet provider.
    pub app_id: String,
    /// End user, if known up front.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<User>,
    /// Chain the provider starts on.
    pub chain_id: u64,
    /// RPC endpoints keyed by chain id.
    pub rpc_node_urls: BTreeMap<u64, String>,
}

/// A constructed SDK instance.
#[async_trait]
pub trait CustodialSdk: Send + Sync + fmt::Debug {
    /// Resolve the SDK's native Ethereum provider.
    async fn ethereum(&self) -> Result<Arc<dyn Eip1193Provider>, RpcError>;
}

/// Constructs SDK instances.
pub trait SdkFactory: Send + Sync + fmt::Debug {
    /// Construct an SDK client.
    fn create(&self, options: SdkOptions) -> Result<Arc<dyn CustodialSdk>, RpcError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sdk_options_wire_shape() {
        let options = SdkOptions {
            environment: Environment::Development,
            app_id: "app".into(),
            user: Some(User::email("a@b.c")),
            chain_id: 80_002,
            rpc_node_urls: BTreeMap::from([(80_002, "https://rpc".to_owned())]),
        };
        let json = serde_json::to_value(&options).unwrap();
        assert_eq!(json["environment"], "dev");
        assert_eq!(json["appId"], "app");
        assert_eq!(json["chainId"], 80_002);
        assert_eq!(json["rpcNodeUrls"]["80002"], "https://rpc");
        assert_eq!(json["user"]["email"], "a@b.c");
    }

    #[test]
    fn test_environment_from_str() {
        assert_eq!("dev".parse::<Environment>(), Ok(Environment::Development));
        assert_eq!(" Production ".parse::<Environment>(), Ok(Environment::Production));
        assert!("staging".parse::<Environment>().is_err());
    }
}
