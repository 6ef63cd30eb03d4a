//! JSON-RPC error payloads and value helpers shared by providers and the connector.
//!
//! [`RpcError`] is the error shape an EIP-1193 provider rejects requests
//! with. The [`codes`] module lists the codes the connector distinguishes.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Well-known EIP-1193 and JSON-RPC error codes.
pub mod codes {
    /// The user rejected the request.
    pub const USER_REJECTED_REQUEST: i64 = 4001;
    /// The requested account or method has not been authorized by the user.
    pub const UNAUTHORIZED: i64 = 4100;
    /// The provider does not support the requested method.
    pub const UNSUPPORTED_METHOD: i64 = 4200;
    /// The provider is disconnected from all chains.
    pub const DISCONNECTED: i64 = 4900;
    /// The provider is not connected to the requested chain.
    pub const CHAIN_DISCONNECTED: i64 = 4901;
    /// The requested chain has not been added to the wallet.
    pub const UNRECOGNIZED_CHAIN: i64 = 4902;
    /// Transient close code ("try again later") some providers report on disconnect.
    pub const TRY_AGAIN_LATER: i64 = 1013;
    /// The requested resource is temporarily unavailable.
    pub const RESOURCE_UNAVAILABLE: i64 = -32002;
    /// The method does not exist.
    pub const METHOD_NOT_FOUND: i64 = -32601;
    /// Invalid method parameters.
    pub const INVALID_PARAMS: i64 = -32602;
    /// Internal JSON-RPC error.
    pub const INTERNAL_ERROR: i64 = -32603;
}

/// An error returned by an EIP-1193 provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub struct RpcError {
    /// Numeric error code.
    pub code: i64,
    /// Human-readable message.
    pub message: String,
    /// Optional provider-specific payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcError {
    /// Create an error with the given code and message.
    #[must_use]
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    /// Attach a data payload.
    #[must_use]
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Create a user-rejection error (4001).
    #[must_use]
    pub fn user_rejected(message: impl Into<String>) -> Self {
        Self::new(codes::USER_REJECTED_REQUEST, message)
    }

    /// Create a resource-unavailable error (-32002).
    #[must_use]
    pub fn resource_unavailable(message: impl Into<String>) -> Self {
        Self::new(codes::RESOURCE_UNAVAILABLE, message)
    }

    /// Create an unrecognized-chain error (4902).
    #[must_use]
    pub fn unrecognized_chain(chain_id: u64) -> Self {
        let chain_id = chain_id_to_hex(chain_id);
        Self::new(
            codes::UNRECOGNIZED_CHAIN,
            format!("Unrecognized chain ID {chain_id}"),
        )
        .with_data(serde_json::json!({ "chainId": chain_id }))
    }

    /// Create an invalid-params error (-32602).
    #[must_use]
    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(codes::INVALID_PARAMS, message)
    }

    /// Create an internal error (-32603).
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(codes::INTERNAL_ERROR, message)
    }

    /// Returns `true` if the user declined the request.
    #[must_use]
    pub const fn is_user_rejection(&self) -> bool {
        self.code == codes::USER_REJECTED_REQUEST
    }
}

impl fmt::Display for RpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (code: {})", self.message, self.code)
    }
}

impl std::error::Error for RpcError {}

/// Format a chain id as a `0x`-prefixed quantity.
#[must_use]
pub fn chain_id_to_hex(chain_id: u64) -> String {
    format!("{chain_id:#x}")
}

/// Parse a chain id given as a hex quantity (`"0x13882"`) or decimal string.
#[must_use]
pub fn parse_chain_id(raw: &str) -> Option<u64> {
    let raw = raw.trim();
    if let Some(hex) = raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
        u64::from_str_radix(hex, 16).ok()
    } else {
        raw.parse().ok()
    }
}

/// Normalize a chain id reported by a provider into a number.
///
/// Accepts hex strings, decimal strings and JSON numbers.
#[must_use]
pub fn normalize_chain_id(value: &Value) -> Option<u64> {
    match value {
        Value::String(s) => parse_chain_id(s),
        Value::Number(n) => n.as_u64(),
        _ => None,
    }
}

/// JavaScript-style truthiness of a stored JSON value.
#[must_use]
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}
