//! Completion router
//!
//! Maps active stage executions to their actor's event channel. Holds no
//! scheduling state; a stage's readiness lives in its actor.

use std::collections::HashMap;
use std::sync::Mutex;

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use uuid::Uuid;

use super::stage::StageEvent;

#[derive(Default)]
pub struct CompletionRouter {
    routes: Mutex<HashMap<Uuid, UnboundedSender<StageEvent>>>,
}

impl CompletionRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens the event channel of a stage that is about to start
    pub fn register(&self, stage_execution_id: Uuid) -> UnboundedReceiver<StageEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.routes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(stage_execution_id, tx);
        rx
    }

    pub fn deregister(&self, stage_execution_id: Uuid) {
        self.routes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&stage_execution_id);
    }

    /// Delivers an event to a stage's actor
    ///
    /// Returns false when the stage is not active anymore.
    pub fn publish(&self, stage_execution_id: Uuid, event: StageEvent) -> bool {
        let routes = self.routes.lock().unwrap_or_else(|e| e.into_inner());
        match routes.get(&stage_execution_id) {
            Some(tx) => tx.send(event).is_ok(),
            None => false,
        }
    }

    pub fn active_stages(&self) -> usize {
        self.routes.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}
