use std::sync::Arc;

use gems_mcp_runtime::{Dispatcher, UpstreamClient};

use crate::sessions::SessionRegistry;

#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<Dispatcher<UpstreamClient>>,
    pub sessions: SessionRegistry,
    pub upstream_configured: bool,
}

impl AppState {
    pub fn new(dispatcher: Dispatcher<UpstreamClient>, upstream_configured: bool) -> Self {
        Self {
            dispatcher: Arc::new(dispatcher),
            sessions: SessionRegistry::default(),
            upstream_configured,
        }
    }
}
