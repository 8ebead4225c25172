use thiserror::Error;

use crate::{
    config::LoadError, contract::ManifestError, infra::error::InfraError, routing::RouteError,
    schema::SchemaError, transport::TransportError,
};

/// Why an invocation was rejected.
#[derive(Debug, Error)]
pub enum ContractError {
    #[error("invalid input for `{route}`: {source}")]
    Validation {
        route: String,
        #[source]
        source: SchemaError,
    },
    #[error("response of `{route}` failed validation: {source}")]
    OutputValidation {
        route: String,
        #[source]
        source: SchemaError,
    },
    #[error("mock data not found: {response}")]
    MissingMock { response: String },
    #[error("mock replay of `{response}` was rejected: {reason}")]
    MockRejected { response: String, reason: String },
    #[error("mock replay of `{response}` was dropped before it settled")]
    MockFlowAbandoned { response: String },
    #[error("no route or schema named `{name}`")]
    UnresolvedRoute { name: String },
    #[error("no action named `{name}`")]
    UnknownAction { name: String },
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error(transparent)]
    Route(#[from] RouteError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("invalid action payload: {0}")]
    Payload(#[from] serde_json::Error),
}

impl ContractError {
    /// HTTP-style status describing the failure.
    pub fn status(&self) -> u16 {
        match self {
            ContractError::Validation { .. }
            | ContractError::Schema(_)
            | ContractError::Payload(_)
            | ContractError::Route(RouteError::MissingParam { .. }) => 400,
            ContractError::UnresolvedRoute { .. } | ContractError::UnknownAction { .. } => 404,
            ContractError::Transport(TransportError::Status { status, .. }) => *status,
            ContractError::OutputValidation { .. } | ContractError::Transport(_) => 502,
            ContractError::MissingMock { .. }
            | ContractError::MockRejected { .. }
            | ContractError::MockFlowAbandoned { .. }
            | ContractError::Route(_) => 500,
        }
    }
}

/// Top-level error for the command-line front end.
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] LoadError),
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error(transparent)]
    Manifest(#[from] ManifestError),
    #[error(transparent)]
    Contract(#[from] ContractError),
    #[error("invalid input: {0}")]
    InvalidInput(String),
}
