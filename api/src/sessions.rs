use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde_json::Value;
use tokio::sync::mpsc;
use uuid::Uuid;

const INBOUND_CAPACITY: usize = 32;

/// Live SSE sessions, keyed by the id handed out in the `endpoint` event.
///
/// Only the inbound sender is stored here; everything else a session owns
/// lives in its own task.
#[derive(Clone, Default)]
pub struct SessionRegistry {
    inner: Arc<Mutex<HashMap<Uuid, mpsc::Sender<Value>>>>,
}

impl SessionRegistry {
    pub fn open(&self) -> (Uuid, mpsc::Receiver<Value>, SessionGuard) {
        let id = Uuid::new_v4();
        let (tx, rx) = mpsc::channel(INBOUND_CAPACITY);
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id, tx);
        let guard = SessionGuard {
            id,
            registry: self.clone(),
        };
        (id, rx, guard)
    }

    pub fn sender(&self, id: &Uuid) -> Option<mpsc::Sender<Value>> {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(id)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    fn remove(&self, id: &Uuid) {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(id);
    }
}

/// Unregisters its session when dropped, however the session ended.
pub struct SessionGuard {
    id: Uuid,
    registry: SessionRegistry,
}

impl SessionGuard {
    pub fn id(&self) -> Uuid {
        self.id
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.registry.remove(&self.id);
    }
}
