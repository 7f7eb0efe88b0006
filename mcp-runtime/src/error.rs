use std::time::Duration;

use thiserror::Error;

/// Forward proxy settings are incomplete or unusable. Surfaced per call.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("missing proxy configuration: {}", .missing.join(", "))]
    MissingProxy { missing: Vec<&'static str> },
    #[error("invalid proxy configuration: {0}")]
    InvalidProxy(String),
}

#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    #[error("upstream request timed out after {0:?}")]
    Timeout(Duration),
    #[error("upstream returned status {status}")]
    Status { status: u16, body: String },
    #[error("upstream request failed: {0}")]
    Network(String),
    #[error("upstream body is not valid JSON: {0}")]
    MalformedBody(String),
    #[error("upstream body carried no data")]
    EmptyBody,
}

impl UpstreamError {
    pub fn kind(&self) -> &'static str {
        match self {
            UpstreamError::Configuration(_) => "configuration",
            UpstreamError::Timeout(_) => "timeout",
            UpstreamError::Status { .. } => "status",
            UpstreamError::Network(_) => "network",
            UpstreamError::MalformedBody(_) => "malformed_body",
            UpstreamError::EmptyBody => "empty_body",
        }
    }
}

/// Protocol-level mistakes by the caller, distinct from a failed retrieval.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error("Unknown tool: {0}")]
    UnknownTool(String),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("outbound stream closed")]
    OutboundClosed,
}
