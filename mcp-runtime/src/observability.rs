use std::collections::BTreeMap;

use gems_core::NormalizedRequest;
use serde_json::{Map, Value};

use crate::dispatch::ReplyEnvelope;
use crate::error::UpstreamError;

/// Outbound request as it left the process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestRecord {
    pub url: String,
    pub headers: Vec<(String, String)>,
    /// `host:port` of the forward proxy. Credentials are never recorded.
    pub proxy: String,
}

/// Whatever the upstream answered, successful or not.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseRecord {
    pub url: String,
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub body: String,
}

/// Side channel for request/response auditing. Implementations must not
/// influence the outcome of a call.
pub trait ObservabilitySink: Send + Sync {
    fn tool_invoked(&self, tool: &str, arguments: Option<&Map<String, Value>>);
    fn request_normalized(&self, tool: &str, request: &NormalizedRequest);
    fn upstream_request(&self, record: &RequestRecord);
    fn upstream_response(&self, record: &ResponseRecord);
    fn upstream_failure(&self, url: &str, error: &UpstreamError);
    fn reply_built(&self, tool: &str, reply: &ReplyEnvelope);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl ObservabilitySink for NoopSink {
    fn tool_invoked(&self, _tool: &str, _arguments: Option<&Map<String, Value>>) {}
    fn request_normalized(&self, _tool: &str, _request: &NormalizedRequest) {}
    fn upstream_request(&self, _record: &RequestRecord) {}
    fn upstream_response(&self, _record: &ResponseRecord) {}
    fn upstream_failure(&self, _url: &str, _error: &UpstreamError) {}
    fn reply_built(&self, _tool: &str, _reply: &ReplyEnvelope) {}
}

/// Emits every exchange as structured `tracing` events.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl ObservabilitySink for TracingSink {
    fn tool_invoked(&self, tool: &str, arguments: Option<&Map<String, Value>>) {
        let arguments = arguments
            .map(|args| Value::Object(args.clone()).to_string())
            .unwrap_or_else(|| "None".to_string());
        tracing::info!(
            event = "mcp_tool_call",
            tool = %tool,
            arguments = %arguments,
            "Tool call received"
        );
    }

    fn request_normalized(&self, tool: &str, request: &NormalizedRequest) {
        tracing::info!(
            event = "mcp_tool_request_normalized",
            tool = %tool,
            request = %request.to_value(),
            "Processed request data"
        );
    }

    fn upstream_request(&self, record: &RequestRecord) {
        tracing::info!(
            event = "upstream_request",
            url = %record.url,
            headers = ?record.headers,
            proxy = %record.proxy,
            "Upstream request sent"
        );
    }

    fn upstream_response(&self, record: &ResponseRecord) {
        tracing::info!(
            event = "upstream_response",
            url = %record.url,
            status = record.status,
            headers = ?record.headers,
            body = %record.body,
            "Upstream response received"
        );
    }

    fn upstream_failure(&self, url: &str, error: &UpstreamError) {
        match error {
            UpstreamError::Status { status, body } => tracing::error!(
                event = "upstream_error",
                url = %url,
                kind = error.kind(),
                status = *status,
                body = %body,
                error = %error,
                "Upstream request failed"
            ),
            _ => tracing::error!(
                event = "upstream_error",
                url = %url,
                kind = error.kind(),
                error = %error,
                "Upstream request failed"
            ),
        }
    }

    fn reply_built(&self, tool: &str, reply: &ReplyEnvelope) {
        tracing::info!(
            event = "mcp_tool_reply",
            tool = %tool,
            failure = reply.is_failure(),
            records = reply.record_count(),
            payload = %reply.text(),
            "Tool reply built"
        );
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Mutex;

    use super::*;

    /// Keeps a flat log of sink calls for assertions.
    #[derive(Debug, Default)]
    pub struct RecordingSink {
        pub entries: Mutex<Vec<String>>,
        pub requests: Mutex<Vec<RequestRecord>>,
        pub responses: Mutex<Vec<ResponseRecord>>,
    }

    impl RecordingSink {
        pub fn entries(&self) -> Vec<String> {
            self.entries.lock().unwrap_or_else(|e| e.into_inner()).clone()
        }

        fn push(&self, entry: String) {
            self.entries
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .push(entry);
        }
    }

    impl ObservabilitySink for RecordingSink {
        fn tool_invoked(&self, tool: &str, _arguments: Option<&Map<String, Value>>) {
            self.push(format!("tool_invoked:{tool}"));
        }

        fn request_normalized(&self, tool: &str, _request: &NormalizedRequest) {
            self.push(format!("request_normalized:{tool}"));
        }

        fn upstream_request(&self, record: &RequestRecord) {
            self.push("upstream_request".to_string());
            self.requests
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .push(record.clone());
        }

        fn upstream_response(&self, record: &ResponseRecord) {
            self.push(format!("upstream_response:{}", record.status));
            self.responses
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .push(record.clone());
        }

        fn upstream_failure(&self, _url: &str, error: &UpstreamError) {
            self.push(format!("upstream_failure:{}", error.kind()));
        }

        fn reply_built(&self, tool: &str, reply: &ReplyEnvelope) {
            let kind = if reply.is_failure() { "failure" } else { "records" };
            self.push(format!("reply_built:{tool}:{kind}"));
        }
    }
}
