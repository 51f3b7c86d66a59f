use std::path::PathBuf;

use alloy::transports::{RpcError as AlloyRpcError, TransportErrorKind};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::chain::ChainClient;

/// Serializable copy of alloy's transport error variants.
#[derive(Debug, Error, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RpcErrorKind {
    #[error("server returned an error response: {}", .0.as_display())]
    ErrorResp(RpcErrorResponse),

    #[error("server returned a null response when a non-null response was expected")]
    NullResp,

    #[error("unsupported feature: {message}")]
    UnsupportedFeature { message: String },

    #[error("local usage error: {message}")]
    InternalError { message: String },

    #[error("serialization error: {message}")]
    SerError { message: String },

    #[error("deserialization error: {message}, text: {text}")]
    DeserError { message: String, text: String },

    #[error("HTTP error {status}")]
    TransportHttpError { status: u16, body: String },

    #[error("Other transport error: {message}")]
    OtherTransportError { message: String },
}

/// JSON-RPC error object returned by the endpoint.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct RpcErrorResponse {
    pub code: i64,
    pub message: String,
    pub data: Option<String>,
}

impl RpcErrorResponse {
    pub fn as_display(&self) -> String {
        format!(
            "code {}: {}{}",
            self.code,
            self.message,
            self.data
                .as_ref()
                .map(|data| format!(", data: {data}"))
                .unwrap_or_default()
        )
    }
}

#[derive(Error, Debug, Serialize, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE", tag = "type")]
pub enum ChainError {
    #[error("RPC error on chain {chain_id} at {rpc_url}: {message}")]
    RpcError {
        chain_id: u64,
        rpc_url: String,
        message: String,
        kind: RpcErrorKind,
    },

    #[error("Bad RPC configuration: {message}")]
    RpcConfigError { message: String },

    #[error("Keystore error at {path:?}: {message}")]
    KeystoreError { path: PathBuf, message: String },

    #[error("Validation error: {message}")]
    ValidationError { message: String },

    #[error("Internal error: {message}")]
    InternalError { message: String },
}

impl ChainError {
    /// True when the endpoint answered with a JSON-RPC error payload, as opposed
    /// to a transport failure where the request may never have arrived.
    pub fn is_error_response(&self) -> bool {
        matches!(
            self,
            ChainError::RpcError {
                kind: RpcErrorKind::ErrorResp(_),
                ..
            }
        )
    }

    pub fn keystore(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        ChainError::KeystoreError {
            path: path.into(),
            message: message.into(),
        }
    }
}

pub trait AlloyRpcErrorToChainError {
    fn to_chain_error(&self, chain: &impl ChainClient) -> ChainError;
}

fn to_rpc_error_kind(err: &AlloyRpcError<TransportErrorKind>) -> RpcErrorKind {
    match err {
        AlloyRpcError::ErrorResp(err) => RpcErrorKind::ErrorResp(RpcErrorResponse {
            code: err.code,
            message: err.message.to_string(),
            data: err.data.as_ref().map(|data| data.to_string()),
        }),
        AlloyRpcError::NullResp => RpcErrorKind::NullResp,
        AlloyRpcError::UnsupportedFeature(feature) => RpcErrorKind::UnsupportedFeature {
            message: feature.to_string(),
        },
        AlloyRpcError::LocalUsageError(err) => RpcErrorKind::InternalError {
            message: err.to_string(),
        },
        AlloyRpcError::SerError(err) => RpcErrorKind::SerError {
            message: err.to_string(),
        },
        AlloyRpcError::DeserError { err, text } => RpcErrorKind::DeserError {
            message: err.to_string(),
            text: text.to_string(),
        },
        AlloyRpcError::Transport(err) => match err {
            TransportErrorKind::HttpError(err) => RpcErrorKind::TransportHttpError {
                status: err.status,
                body: err.body.to_string(),
            },
            _ => RpcErrorKind::OtherTransportError {
                message: err.to_string(),
            },
        },
    }
}

impl AlloyRpcErrorToChainError for AlloyRpcError<TransportErrorKind> {
    fn to_chain_error(&self, chain: &impl ChainClient) -> ChainError {
        ChainError::RpcError {
            chain_id: chain.chain_id(),
            rpc_url: chain.rpc_url().to_string(),
            message: self.to_string(),
            kind: to_rpc_error_kind(self),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_response_is_detected() {
        let error = ChainError::RpcError {
            chain_id: 1,
            rpc_url: "http://localhost:8545/".to_string(),
            message: "nonce too low".to_string(),
            kind: RpcErrorKind::ErrorResp(RpcErrorResponse {
                code: -32000,
                message: "nonce too low".to_string(),
                data: None,
            }),
        };
        assert!(error.is_error_response());

        let transport = ChainError::RpcError {
            chain_id: 1,
            rpc_url: "http://localhost:8545/".to_string(),
            message: "connection refused".to_string(),
            kind: RpcErrorKind::OtherTransportError {
                message: "connection refused".to_string(),
            },
        };
        assert!(!transport.is_error_response());
    }

    #[test]
    fn rpc_error_response_display_includes_data() {
        let response = RpcErrorResponse {
            code: 3,
            message: "execution reverted".to_string(),
            data: Some("0x08c379a0".to_string()),
        };
        assert_eq!(
            response.as_display(),
            "code 3: execution reverted, data: 0x08c379a0"
        );
    }
}
