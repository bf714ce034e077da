//! Shared session state, mutated only through named operations.
//!
//! Each field has exactly one owner-operation that writes it; everything else
//! reads snapshots. Per-domain `error` fields hold the last failure message
//! and clear on the next successful operation in that domain.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use inkframe_api_client::{ApiClient, ImageInfo, PromptHistoryItem};
use tracing::{debug, warn};

use crate::tracker::JobTracker;

pub const MAX_PROMPT_LEN: usize = 1000;

/// Result of a user-triggered operation, surfaced to the presentation layer
/// instead of an error type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionOutcome {
    pub success: bool,
    pub message: String,
}

impl ActionOutcome {
    #[must_use]
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

/// Boolean connection flag flipped by the transport on open/close.
#[derive(Debug, Default)]
pub struct ConnectionFlag {
    connected: AtomicBool,
}

impl ConnectionFlag {
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Default)]
struct PromptState {
    prompt: String,
    history: Vec<PromptHistoryItem>,
    error: Option<String>,
    loading: bool,
}

/// Current prompt text plus bounded, newest-first history.
pub struct PromptStore {
    api: Arc<ApiClient>,
    history_limit: usize,
    state: RwLock<PromptState>,
}

impl PromptStore {
    pub fn new(api: Arc<ApiClient>, history_limit: usize) -> Self {
        Self {
            api,
            history_limit,
            state: RwLock::new(PromptState::default()),
        }
    }

    pub fn prompt(&self) -> String {
        self.read().prompt.clone()
    }

    pub fn history(&self) -> Vec<PromptHistoryItem> {
        self.read().history.clone()
    }

    pub fn last_error(&self) -> Option<String> {
        self.read().error.clone()
    }

    pub fn is_loading(&self) -> bool {
        self.read().loading
    }

    /// Overwrite the current prompt text without touching history. Used by
    /// local edits and by remote-origin `prompt_update` notifications, whose
    /// history entry was already recorded server-side.
    pub fn set_prompt(&self, value: impl Into<String>) {
        self.write().prompt = value.into();
    }

    /// Fetch the server's current prompt into the store.
    pub async fn load_current(&self) {
        {
            let mut state = self.write();
            state.loading = true;
            state.error = None;
        }
        let result = self.api.current_prompt().await;
        let mut state = self.write();
        state.loading = false;
        match result {
            Ok(prompt) => state.prompt = prompt,
            Err(error) => state.error = Some(error.to_string()),
        }
    }

    /// Reload prompt history, newest first, bounded to `limit` entries.
    /// Failures are logged and leave the cached history in place.
    pub async fn load_history(&self, limit: Option<usize>) {
        let limit = limit.unwrap_or(self.history_limit);
        match self.api.prompt_history(limit).await {
            Ok(mut entries) => {
                entries.truncate(limit);
                self.write().history = entries;
            }
            Err(error) => warn!("prompt history load failed: {error}"),
        }
    }

    /// Persist the current prompt text, then reload history so the new entry
    /// shows up. Validation mirrors the server's rules so obviously bad
    /// prompts never leave the client.
    pub async fn save(&self) -> ActionOutcome {
        let prompt = self.prompt().trim().to_string();
        if prompt.is_empty() {
            return ActionOutcome::failure("Prompt cannot be empty");
        }
        if prompt.len() > MAX_PROMPT_LEN {
            return ActionOutcome::failure("Prompt too long (max 1000 characters)");
        }

        {
            let mut state = self.write();
            state.loading = true;
            state.error = None;
        }
        let result = self.api.save_prompt(&prompt).await;
        match result {
            Ok(response) => {
                self.write().loading = false;
                self.load_history(None).await;
                ActionOutcome::ok(response.message)
            }
            Err(error) => {
                let message = error.to_string();
                let mut state = self.write();
                state.loading = false;
                state.error = Some(message.clone());
                ActionOutcome::failure(message)
            }
        }
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, PromptState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, PromptState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[derive(Debug, Default)]
struct ImageState {
    images: Vec<ImageInfo>,
    selected: Option<ImageInfo>,
    error: Option<String>,
    loading: bool,
}

/// Generated-image gallery state plus the send-to-device operation.
pub struct ImageStore {
    api: Arc<ApiClient>,
    tracker: Arc<JobTracker>,
    gallery_limit: usize,
    state: RwLock<ImageState>,
    displaying: AtomicBool,
}

impl ImageStore {
    pub fn new(api: Arc<ApiClient>, tracker: Arc<JobTracker>, gallery_limit: usize) -> Self {
        Self {
            api,
            tracker,
            gallery_limit,
            state: RwLock::new(ImageState::default()),
            displaying: AtomicBool::new(false),
        }
    }

    pub fn images(&self) -> Vec<ImageInfo> {
        self.read().images.clone()
    }

    pub fn selected(&self) -> Option<ImageInfo> {
        self.read().selected.clone()
    }

    pub fn last_error(&self) -> Option<String> {
        self.read().error.clone()
    }

    pub fn is_loading(&self) -> bool {
        self.read().loading
    }

    /// True while a send-to-device request is outstanding.
    pub fn is_displaying(&self) -> bool {
        self.displaying.load(Ordering::SeqCst)
    }

    /// Open an image in the detail view.
    pub fn select(&self, image: ImageInfo) {
        self.write().selected = Some(image);
    }

    /// Close the detail view.
    pub fn clear_selection(&self) {
        self.write().selected = None;
    }

    /// Fetch the gallery listing into the store.
    pub async fn load_images(&self, limit: Option<usize>) {
        let limit = limit.unwrap_or(self.gallery_limit);
        {
            let mut state = self.write();
            state.loading = true;
            state.error = None;
        }
        let result = self.api.images(limit).await;
        let mut state = self.write();
        state.loading = false;
        match result {
            Ok(images) => state.images = images,
            Err(error) => state.error = Some(error.to_string()),
        }
    }

    /// Push an already-generated image to the e-ink panel. Refuses without a
    /// network call while a job is running, keeping at most one tracked job.
    /// On success the tracker starts polling the display job to completion.
    pub async fn display_on_epaper(&self, filename: &str) -> ActionOutcome {
        if self.tracker.is_running() {
            debug!("display request refused, a job is already running");
            return ActionOutcome::failure("Generation already in progress");
        }

        self.displaying.store(true, Ordering::SeqCst);
        self.write().error = None;

        let result = self.api.display_image(filename).await;
        self.displaying.store(false, Ordering::SeqCst);
        match result {
            Ok(response) => {
                self.tracker.start_polling(None);
                ActionOutcome::ok(response.message)
            }
            Err(error) => {
                let message = error.to_string();
                self.write().error = Some(message.clone());
                ActionOutcome::failure(message)
            }
        }
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, ImageState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, ImageState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_flag_tracks_most_recent_event() {
        let flag = ConnectionFlag::default();
        assert!(!flag.is_connected());
        flag.set_connected(true);
        assert!(flag.is_connected());
        flag.set_connected(false);
        assert!(!flag.is_connected());
    }

    #[test]
    fn action_outcome_constructors() {
        let ok = ActionOutcome::ok("saved");
        assert!(ok.success);
        assert_eq!(ok.message, "saved");

        let failure = ActionOutcome::failure("nope");
        assert!(!failure.success);
        assert_eq!(failure.message, "nope");
    }

    fn offline_api() -> Arc<ApiClient> {
        // never contacted by these tests; the port is reserved and unroutable
        match ApiClient::from_base_url("http://127.0.0.1:9") {
            Ok(client) => Arc::new(client),
            Err(_) => unreachable!("static base URL is valid"),
        }
    }

    #[test]
    fn set_prompt_does_not_touch_history() {
        let store = PromptStore::new(offline_api(), 3);
        store.set_prompt("sunset over hills");
        assert_eq!(store.prompt(), "sunset over hills");
        assert!(store.history().is_empty());
    }

    #[tokio::test]
    async fn save_rejects_empty_prompt_locally() {
        let store = PromptStore::new(offline_api(), 3);
        store.set_prompt("   ");
        let outcome = store.save().await;
        assert!(!outcome.success);
        assert_eq!(outcome.message, "Prompt cannot be empty");
        assert!(store.last_error().is_none());
    }

    #[tokio::test]
    async fn save_rejects_overlong_prompt_locally() {
        let store = PromptStore::new(offline_api(), 3);
        store.set_prompt("x".repeat(MAX_PROMPT_LEN + 1));
        let outcome = store.save().await;
        assert!(!outcome.success);
        assert_eq!(outcome.message, "Prompt too long (max 1000 characters)");
    }

    #[test]
    fn select_and_clear_selection() {
        let api = offline_api();
        let tracker = Arc::new(JobTracker::with_default_interval(
            Arc::clone(&api) as Arc<dyn crate::tracker::StatusSource>
        ));
        let store = ImageStore::new(api, tracker, 50);

        let image = ImageInfo {
            filename: "a.png".to_string(),
            path: "images/a.png".to_string(),
            url: "/api/v1/images/a.png".to_string(),
            created_at: "2026-07-01T19:00:00".to_string(),
            size_bytes: 1024,
        };
        store.select(image.clone());
        assert_eq!(store.selected(), Some(image));
        store.clear_selection();
        assert!(store.selected().is_none());
    }
}
