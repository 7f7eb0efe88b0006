use std::sync::Arc;

use serde_json::{Value, json};
use tokio::sync::mpsc;

use crate::dispatch::Dispatcher;
use crate::error::{DispatchError, TransportError};
use crate::protocol::{
    RpcError, error_response, initialize_payload, negotiate_protocol_version, success_response,
    tool_call_payload, tools_list_payload,
};
use crate::upstream::Upstream;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// Waiting for `initialize`; only `initialize` and `ping` are answered.
    Handshaking,
    Active,
    Closed,
}

impl SessionPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionPhase::Handshaking => "handshaking",
            SessionPhase::Active => "active",
            SessionPhase::Closed => "closed",
        }
    }
}

/// One caller's conversation with the tool server.
///
/// Messages are handled strictly one at a time, so a caller never has more
/// than one tool call in flight per session.
pub struct McpSession<U> {
    id: String,
    dispatcher: Arc<Dispatcher<U>>,
    phase: SessionPhase,
}

impl<U: Upstream> McpSession<U> {
    pub fn new(id: impl Into<String>, dispatcher: Arc<Dispatcher<U>>) -> Self {
        Self {
            id: id.into(),
            dispatcher,
            phase: SessionPhase::Handshaking,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    /// Runs until the inbound channel closes (`Ok`) or the outbound side goes
    /// away (`Err`). A tool call already in flight always runs to completion;
    /// its reply is dropped if nobody is listening any more.
    pub async fn run(
        mut self,
        mut inbound: mpsc::Receiver<Value>,
        outbound: mpsc::Sender<Value>,
    ) -> Result<(), TransportError> {
        tracing::info!(event = "mcp_session_open", session_id = %self.id, "MCP session opened");

        let result = 'session: loop {
            let incoming = tokio::select! {
                message = inbound.recv() => message,
                _ = outbound.closed() => break 'session Err(TransportError::OutboundClosed),
            };
            let Some(incoming) = incoming else {
                break 'session Ok(());
            };

            for response in self.handle_incoming_message(incoming).await {
                if outbound.send(response).await.is_err() {
                    break 'session Err(TransportError::OutboundClosed);
                }
            }
        };

        self.phase = SessionPhase::Closed;
        match &result {
            Ok(()) => tracing::info!(
                event = "mcp_session_closed",
                session_id = %self.id,
                reason = "inbound_closed",
                "MCP session closed"
            ),
            Err(err) => tracing::info!(
                event = "mcp_session_closed",
                session_id = %self.id,
                reason = %err,
                "MCP session closed"
            ),
        }
        result
    }

    pub async fn handle_incoming_message(&mut self, incoming: Value) -> Vec<Value> {
        let mut responses = Vec::new();

        if let Some(batch) = incoming.as_array() {
            if batch.is_empty() {
                responses.push(error_response(
                    Value::Null,
                    RpcError::invalid_request("Batch request must not be empty"),
                ));
                return responses;
            }
            for item in batch {
                if let Some(response) = self.handle_single_message(item.clone()).await {
                    responses.push(response);
                }
            }
            return responses;
        }

        if let Some(response) = self.handle_single_message(incoming).await {
            responses.push(response);
        }
        responses
    }

    async fn handle_single_message(&mut self, incoming: Value) -> Option<Value> {
        let Some(obj) = incoming.as_object() else {
            return Some(error_response(
                Value::Null,
                RpcError::invalid_request("Request must be a JSON object"),
            ));
        };

        if obj.get("jsonrpc").and_then(Value::as_str) != Some("2.0") {
            let id = obj.get("id").cloned().unwrap_or(Value::Null);
            return Some(error_response(
                id,
                RpcError::invalid_request("jsonrpc must be '2.0'"),
            ));
        }

        let Some(method) = obj.get("method").and_then(Value::as_str) else {
            // A client response; this server never issues requests of its own.
            return None;
        };

        let params = obj.get("params").cloned().unwrap_or(Value::Null);
        if let Some(id) = obj.get("id").cloned() {
            let result = self.handle_request(method, params).await;
            Some(match result {
                Ok(payload) => success_response(id, payload),
                Err(err) => error_response(id, err),
            })
        } else {
            self.handle_notification(method);
            None
        }
    }

    fn handle_notification(&self, method: &str) {
        tracing::debug!(
            event = "mcp_notification",
            session_id = %self.id,
            method = %method,
            phase = self.phase.as_str(),
            "MCP notification received"
        );
    }

    async fn handle_request(&mut self, method: &str, params: Value) -> Result<Value, RpcError> {
        if self.phase == SessionPhase::Handshaking && !matches!(method, "initialize" | "ping") {
            return Err(RpcError::invalid_request(
                "Session not initialized: send 'initialize' first",
            ));
        }
        match method {
            "initialize" => Ok(self.initialize(&params)),
            "ping" => Ok(json!({})),
            "tools/list" => Ok(tools_list_payload(self.dispatcher.list_tools())),
            "tools/call" => self.handle_tools_call(params).await,
            _ => Err(RpcError::method_not_found(method)),
        }
    }

    fn initialize(&mut self, params: &Value) -> Value {
        let requested = params.get("protocolVersion").and_then(Value::as_str);
        let version = negotiate_protocol_version(requested);
        self.phase = SessionPhase::Active;
        let client = params.get("clientInfo").cloned().unwrap_or(Value::Null);
        tracing::info!(
            event = "mcp_session_initialized",
            session_id = %self.id,
            requested_version = ?requested,
            protocol_version = %version,
            client = %client,
            "MCP session initialized"
        );
        initialize_payload(version)
    }

    async fn handle_tools_call(&self, params: Value) -> Result<Value, RpcError> {
        let params = params
            .as_object()
            .ok_or_else(|| RpcError::invalid_params("tools/call params must be an object"))?;

        let name = params
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| RpcError::invalid_params("tools/call requires string field 'name'"))?;

        let args = match params.get("arguments") {
            Some(Value::Object(map)) => Some(map),
            Some(Value::Null) | None => None,
            Some(_) => {
                return Err(RpcError::invalid_params(
                    "tools/call field 'arguments' must be an object",
                ));
            }
        };

        match self.dispatcher.call_tool(name, args).await {
            Ok(reply) => Ok(tool_call_payload(&reply)),
            Err(err @ DispatchError::UnknownTool(_)) => {
                tracing::warn!(
                    event = "mcp_unknown_tool",
                    session_id = %self.id,
                    tool = %name,
                    "Unknown tool requested"
                );
                Err(RpcError::invalid_params(err.to_string()).with_data(json!({ "tool": name })))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    use gems_core::{SMART_MONEY_TOOL, TOP_SCORE_TOOL, ToolRegistry};
    use serde_json::{Value, json};
    use tokio::sync::{Notify, mpsc};
    use url::Url;

    use super::*;
    use crate::dispatch::testing::FakeUpstream;
    use crate::error::UpstreamError;
    use crate::observability::NoopSink;

    fn dispatcher<U: Upstream>(upstream: U) -> Arc<Dispatcher<U>> {
        Arc::new(Dispatcher::new(
            Arc::new(ToolRegistry::builtin()),
            upstream,
            Url::parse("https://portal.boltrade.ai").expect("base url"),
            Arc::new(NoopSink),
        ))
    }

    fn request(id: i64, method: &str, params: Value) -> Value {
        json!({"jsonrpc": "2.0", "id": id, "method": method, "params": params})
    }

    fn initialize() -> Value {
        request(
            0,
            "initialize",
            json!({
                "protocolVersion": "2024-11-05",
                "capabilities": {},
                "clientInfo": {"name": "test-client", "version": "1.0"}
            }),
        )
    }

    async fn active_session(upstream: FakeUpstream) -> McpSession<FakeUpstream> {
        let mut session = McpSession::new("test", dispatcher(upstream));
        let responses = session.handle_incoming_message(initialize()).await;
        assert_eq!(responses.len(), 1);
        assert_eq!(session.phase(), SessionPhase::Active);
        session
    }

    #[tokio::test]
    async fn requests_before_initialize_are_rejected() {
        let mut session = McpSession::new("test", dispatcher(FakeUpstream::default()));

        let responses = session
            .handle_incoming_message(request(1, "tools/list", json!({})))
            .await;
        assert_eq!(responses[0]["error"]["code"], json!(-32600));
        assert_eq!(session.phase(), SessionPhase::Handshaking);

        let responses = session.handle_incoming_message(request(2, "ping", json!({}))).await;
        assert_eq!(responses[0]["result"], json!({}));
    }

    #[tokio::test]
    async fn handshake_reports_identity_and_capabilities() {
        let mut session = McpSession::new("test", dispatcher(FakeUpstream::default()));
        let responses = session.handle_incoming_message(initialize()).await;
        let result = &responses[0]["result"];
        assert_eq!(result["serverInfo"]["name"], json!("boltrader"));
        assert_eq!(result["protocolVersion"], json!("2024-11-05"));
        assert_eq!(result["capabilities"]["tools"]["listChanged"], json!(true));
    }

    #[tokio::test]
    async fn initialize_without_client_info_activates_session() {
        let mut session = McpSession::new("anonymous", dispatcher(FakeUpstream::default()));
        let responses = session
            .handle_incoming_message(request(0, "initialize", json!({"protocolVersion": "2025-03-26"})))
            .await;
        assert_eq!(responses[0]["result"]["protocolVersion"], json!("2025-03-26"));
        assert_eq!(session.phase(), SessionPhase::Active);
    }

    #[tokio::test]
    async fn notifications_produce_no_reply() {
        let mut session = active_session(FakeUpstream::default()).await;
        let responses = session
            .handle_incoming_message(json!({"jsonrpc": "2.0", "method": "notifications/initialized"}))
            .await;
        assert!(responses.is_empty());
    }

    #[tokio::test]
    async fn tools_list_advertises_catalog() {
        let mut session = active_session(FakeUpstream::default()).await;
        let responses = session
            .handle_incoming_message(request(1, "tools/list", json!({})))
            .await;
        let names: Vec<&str> = responses[0]["result"]["tools"]
            .as_array()
            .expect("tools array")
            .iter()
            .filter_map(|tool| tool["name"].as_str())
            .collect();
        assert_eq!(names, vec![TOP_SCORE_TOOL, SMART_MONEY_TOOL]);
    }

    #[tokio::test]
    async fn tool_call_returns_projected_array() {
        let mut session = active_session(FakeUpstream::with(vec![Ok(json!({
            "users": [{"token_address": "ABC", "symbol": "X", "usd_price": 1.2}]
        }))]))
        .await;

        let responses = session
            .handle_incoming_message(request(
                3,
                "tools/call",
                json!({"name": TOP_SCORE_TOOL, "arguments": {"start": 0, "limit": 500}}),
            ))
            .await;
        let result = &responses[0]["result"];
        assert_eq!(result["isError"], json!(false));
        let text = result["content"][0]["text"].as_str().expect("text");
        let records: Value = serde_json::from_str(text).expect("json array");
        assert_eq!(records[0]["CA address"], json!("ABC"));
        assert_eq!(records[0]["token_age"], Value::Null);
    }

    #[tokio::test]
    async fn tool_call_failure_is_plain_text() {
        let mut session = active_session(FakeUpstream::with(vec![Err(UpstreamError::Status {
            status: 502,
            body: String::new(),
        })]))
        .await;

        let responses = session
            .handle_incoming_message(request(4, "tools/call", json!({"name": SMART_MONEY_TOOL})))
            .await;
        let result = &responses[0]["result"];
        assert_eq!(result["isError"], json!(true));
        assert_eq!(
            result["content"][0]["text"],
            json!("Failed to retrieve smart money data")
        );
    }

    #[tokio::test]
    async fn unknown_tool_is_a_protocol_error() {
        let mut session = active_session(FakeUpstream::default()).await;
        let responses = session
            .handle_incoming_message(request(5, "tools/call", json!({"name": "get-eth-gems"})))
            .await;
        assert!(responses[0].get("result").is_none());
        assert_eq!(responses[0]["error"]["code"], json!(-32602));
        assert_eq!(responses[0]["error"]["message"], json!("Unknown tool: get-eth-gems"));
    }

    #[tokio::test]
    async fn malformed_tool_call_params_are_rejected() {
        let mut session = active_session(FakeUpstream::default()).await;
        let responses = session
            .handle_incoming_message(request(
                6,
                "tools/call",
                json!({"name": TOP_SCORE_TOOL, "arguments": [1, 2]}),
            ))
            .await;
        assert_eq!(responses[0]["error"]["code"], json!(-32602));

        let responses = session
            .handle_incoming_message(request(7, "tools/call", json!({"arguments": {}})))
            .await;
        assert_eq!(responses[0]["error"]["code"], json!(-32602));
    }

    #[tokio::test]
    async fn unknown_method_and_bad_envelopes() {
        let mut session = active_session(FakeUpstream::default()).await;

        let responses = session
            .handle_incoming_message(request(8, "prompts/list", json!({})))
            .await;
        assert_eq!(responses[0]["error"]["code"], json!(-32601));

        let responses = session.handle_incoming_message(json!("hello")).await;
        assert_eq!(responses[0]["error"]["code"], json!(-32600));

        let responses = session
            .handle_incoming_message(json!({"jsonrpc": "1.0", "id": 9, "method": "ping"}))
            .await;
        assert_eq!(responses[0]["id"], json!(9));
        assert_eq!(responses[0]["error"]["code"], json!(-32600));

        let responses = session.handle_incoming_message(json!([])).await;
        assert_eq!(responses[0]["error"]["code"], json!(-32600));
    }

    #[tokio::test]
    async fn batch_answers_requests_and_skips_notifications() {
        let mut session = active_session(FakeUpstream::default()).await;
        let responses = session
            .handle_incoming_message(json!([
                request(10, "ping", json!({})),
                {"jsonrpc": "2.0", "method": "notifications/cancelled"},
                request(11, "tools/list", json!({}))
            ]))
            .await;
        assert_eq!(responses.len(), 2);
        assert_eq!(responses[0]["id"], json!(10));
        assert_eq!(responses[1]["id"], json!(11));
    }

    #[tokio::test]
    async fn run_replies_in_order_and_ends_when_inbound_closes() {
        let session = McpSession::new("run", dispatcher(FakeUpstream::default()));
        let (in_tx, in_rx) = mpsc::channel(8);
        let (out_tx, mut out_rx) = mpsc::channel(8);
        let task = tokio::spawn(session.run(in_rx, out_tx));

        in_tx.send(initialize()).await.expect("send initialize");
        in_tx
            .send(request(1, "ping", json!({})))
            .await
            .expect("send ping");
        drop(in_tx);

        let first = out_rx.recv().await.expect("initialize reply");
        let second = out_rx.recv().await.expect("ping reply");
        assert_eq!(first["id"], json!(0));
        assert_eq!(second["id"], json!(1));
        assert_eq!(task.await.expect("join"), Ok(()));
    }

    #[tokio::test]
    async fn run_ends_when_outbound_is_dropped() {
        let session = McpSession::new("gone", dispatcher(FakeUpstream::default()));
        let (_in_tx, in_rx) = mpsc::channel::<Value>(8);
        let (out_tx, out_rx) = mpsc::channel(8);
        let task = tokio::spawn(session.run(in_rx, out_tx));

        drop(out_rx);
        let result = tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .expect("session should notice the disconnect")
            .expect("join");
        assert_eq!(result, Err(TransportError::OutboundClosed));
    }

    struct SlowUpstream {
        finished: Arc<AtomicBool>,
    }

    impl Upstream for SlowUpstream {
        async fn fetch(&self, _url: Url) -> Result<Value, UpstreamError> {
            tokio::time::sleep(Duration::from_millis(200)).await;
            self.finished.store(true, Ordering::SeqCst);
            Ok(json!({"users": []}))
        }
    }

    #[tokio::test]
    async fn in_flight_call_finishes_after_disconnect() {
        let finished = Arc::new(AtomicBool::new(false));
        let session = McpSession::new(
            "inflight",
            dispatcher(SlowUpstream {
                finished: finished.clone(),
            }),
        );
        let (in_tx, in_rx) = mpsc::channel(8);
        let (out_tx, mut out_rx) = mpsc::channel(8);
        let task = tokio::spawn(session.run(in_rx, out_tx));

        in_tx.send(initialize()).await.expect("send initialize");
        out_rx.recv().await.expect("initialize reply");
        in_tx
            .send(request(1, "tools/call", json!({"name": TOP_SCORE_TOOL})))
            .await
            .expect("send call");
        tokio::time::sleep(Duration::from_millis(50)).await;
        drop(out_rx);

        let result = task.await.expect("join");
        assert_eq!(result, Err(TransportError::OutboundClosed));
        assert!(finished.load(Ordering::SeqCst));
    }

    struct ParkedUpstream {
        entered: Arc<Notify>,
        release: Arc<Notify>,
    }

    impl Upstream for ParkedUpstream {
        async fn fetch(&self, _url: Url) -> Result<Value, UpstreamError> {
            self.entered.notify_one();
            self.release.notified().await;
            Ok(json!({"users": []}))
        }
    }

    #[tokio::test]
    async fn pending_call_does_not_block_other_sessions() {
        let entered = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        let shared = dispatcher(ParkedUpstream {
            entered: entered.clone(),
            release: release.clone(),
        });

        let (a_in, a_in_rx) = mpsc::channel(8);
        let (a_out_tx, mut a_out) = mpsc::channel(8);
        tokio::spawn(McpSession::new("session-a", shared.clone()).run(a_in_rx, a_out_tx));
        let (b_in, b_in_rx) = mpsc::channel(8);
        let (b_out_tx, mut b_out) = mpsc::channel(8);
        tokio::spawn(McpSession::new("session-b", shared).run(b_in_rx, b_out_tx));

        a_in.send(initialize()).await.expect("send initialize");
        a_out.recv().await.expect("initialize reply");
        a_in
            .send(request(1, "tools/call", json!({"name": TOP_SCORE_TOOL})))
            .await
            .expect("send call");
        tokio::time::timeout(Duration::from_secs(5), entered.notified())
            .await
            .expect("call reached upstream");

        b_in.send(initialize()).await.expect("send initialize");
        b_out.recv().await.expect("initialize reply");
        b_in
            .send(request(2, "tools/list", json!({})))
            .await
            .expect("send list");
        let listed = tokio::time::timeout(Duration::from_secs(5), b_out.recv())
            .await
            .expect("other session answers while the call is pending")
            .expect("tools/list reply");
        assert_eq!(listed["id"], 2);
        assert!(a_out.try_recv().is_err());

        release.notify_one();
        let called = tokio::time::timeout(Duration::from_secs(5), a_out.recv())
            .await
            .expect("call completes once released")
            .expect("tools/call reply");
        assert_eq!(called["id"], 1);
        assert_eq!(called["result"]["isError"], false);
    }
}
