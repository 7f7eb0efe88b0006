use std::sync::Arc;

use gems_core::{NormalizedRequest, ProjectedRecord, ToolDescriptor, ToolRegistry, project_collection};
use serde_json::{Map, Value};
use url::Url;

use crate::error::DispatchError;
use crate::observability::ObservabilitySink;
use crate::upstream::Upstream;

/// Result of one tool call, ready to be written to the caller.
///
/// Successful calls carry projected records and render as a JSON array;
/// failed retrievals carry a single plain sentence instead.
#[derive(Debug, Clone, PartialEq)]
pub enum ReplyEnvelope {
    Records {
        records: Vec<ProjectedRecord>,
        text: String,
    },
    Failure(String),
}

impl ReplyEnvelope {
    /// Encodes the records up front so rendering the reply cannot fail later.
    pub fn records(records: Vec<ProjectedRecord>) -> Result<Self, serde_json::Error> {
        let text = serde_json::to_string(&records)?;
        Ok(ReplyEnvelope::Records { records, text })
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, ReplyEnvelope::Failure(_))
    }

    pub fn record_count(&self) -> usize {
        match self {
            ReplyEnvelope::Records { records, .. } => records.len(),
            ReplyEnvelope::Failure(_) => 0,
        }
    }

    pub fn text(&self) -> &str {
        match self {
            ReplyEnvelope::Records { text, .. } => text,
            ReplyEnvelope::Failure(message) => message,
        }
    }
}

/// Routes invocations by name through normalize, fetch and project.
pub struct Dispatcher<U> {
    registry: Arc<ToolRegistry>,
    upstream: U,
    base_url: Url,
    sink: Arc<dyn ObservabilitySink>,
}

impl<U: Upstream> Dispatcher<U> {
    pub fn new(
        registry: Arc<ToolRegistry>,
        upstream: U,
        base_url: Url,
        sink: Arc<dyn ObservabilitySink>,
    ) -> Self {
        Self {
            registry,
            upstream,
            base_url,
            sink,
        }
    }

    pub fn list_tools(&self) -> &[ToolDescriptor] {
        self.registry.list()
    }

    pub async fn call_tool(
        &self,
        name: &str,
        arguments: Option<&Map<String, Value>>,
    ) -> Result<ReplyEnvelope, DispatchError> {
        self.sink.tool_invoked(name, arguments);
        let tool = self
            .registry
            .get(name)
            .ok_or_else(|| DispatchError::UnknownTool(name.to_string()))?;

        let request = NormalizedRequest::from_invocation(tool, arguments);
        self.sink.request_normalized(tool.name, &request);

        let url = tool.upstream_url(&self.base_url, &request);
        let reply = match self.upstream.fetch(url).await {
            Ok(body) => match ReplyEnvelope::records(project_collection(&body, &tool.projection)) {
                Ok(reply) => reply,
                Err(err) => {
                    tracing::error!(
                        event = "reply_encoding_failed",
                        tool = tool.name,
                        error = %err,
                        "Projected records could not be encoded"
                    );
                    ReplyEnvelope::Failure(tool.failure_message.to_string())
                }
            },
            Err(_) => ReplyEnvelope::Failure(tool.failure_message.to_string()),
        };
        self.sink.reply_built(tool.name, &reply);
        Ok(reply)
    }
}
