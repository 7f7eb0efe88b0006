//! MCP runtime for the gems market-data tools.
//!
//! The pieces compose leaves-first: [`upstream::UpstreamClient`] performs the
//! single proxied GET, [`dispatch::Dispatcher`] turns an invocation into a
//! [`dispatch::ReplyEnvelope`], and [`session::McpSession`] speaks JSON-RPC
//! over a pair of channels so any transport can host it.

pub mod dispatch;
pub mod error;
pub mod observability;
pub mod protocol;
pub mod session;
pub mod upstream;

pub use dispatch::{Dispatcher, ReplyEnvelope};
pub use error::{ConfigurationError, DispatchError, TransportError, UpstreamError};
pub use observability::{NoopSink, ObservabilitySink, TracingSink};
pub use session::{McpSession, SessionPhase};
pub use upstream::{ProxySettings, Upstream, UpstreamClient, UpstreamConfig};
