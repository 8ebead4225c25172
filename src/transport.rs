//! Dispatch seam between the orchestrator and whatever executes a call.

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::{contract::Invocation, error::ContractError};

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("server responded with status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("failed to decode response body: {0}")]
    Decode(String),
}

/// Executes a prepared invocation and yields its raw output.
///
/// `argv.url`, `argv.method` and `argv.input` are populated before this is
/// called.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn request(&self, argv: &Invocation) -> Result<Value, ContractError>;
}

