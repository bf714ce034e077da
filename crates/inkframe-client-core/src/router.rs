//! Inbound realtime message decoding and dispatch.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::store::PromptStore;

pub const MESSAGE_TYPE_PROMPT_UPDATE: &str = "prompt_update";

/// JSON frame shape on the realtime channel. Only recognized `type` values
/// mutate state; everything else still reaches the generic listeners.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

/// Callback invoked for every dispatched message.
pub type MessageListener = Arc<dyn Fn(&InboundMessage) + Send + Sync>;

/// Returned by [`MessageRouter::register`]; pass to
/// [`MessageRouter::unregister`] to remove the listener again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenerHandle(u64);

/// Dispatches inbound realtime messages to the state mutations they imply,
/// then to generic listeners in registration order.
pub struct MessageRouter {
    prompts: Arc<PromptStore>,
    listeners: Mutex<Vec<(u64, MessageListener)>>,
    next_listener_id: AtomicU64,
}

impl MessageRouter {
    pub fn new(prompts: Arc<PromptStore>) -> Self {
        Self {
            prompts,
            listeners: Mutex::new(Vec::new()),
            next_listener_id: AtomicU64::new(1),
        }
    }

    pub fn register(&self, listener: MessageListener) -> ListenerHandle {
        let id = self.next_listener_id.fetch_add(1, Ordering::SeqCst);
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, listener));
        ListenerHandle(id)
    }

    pub fn unregister(&self, handle: ListenerHandle) {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|(id, _)| *id != handle.0);
    }

    /// Decode one raw frame and dispatch it. Malformed frames are logged and
    /// dropped without disturbing the connection.
    pub fn dispatch_raw(&self, text: &str) {
        match serde_json::from_str::<InboundMessage>(text) {
            Ok(message) => self.dispatch(&message),
            Err(error) => warn!("dropping malformed realtime frame: {error}"),
        }
    }

    /// Apply the state mutation a recognized message implies, then deliver
    /// the message to every registered listener in registration order.
    pub fn dispatch(&self, message: &InboundMessage) {
        if message.kind == MESSAGE_TYPE_PROMPT_UPDATE {
            if let Some(prompt) = &message.prompt {
                // remote-origin overwrite: the server already recorded the
                // history entry, so this bypasses save semantics
                self.prompts.set_prompt(prompt.clone());
            }
        }

        // snapshot so a listener can register/unregister from its callback
        let listeners: Vec<MessageListener> = self
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        for listener in listeners {
            listener(message);
        }
    }
}
