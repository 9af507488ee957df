//! Per-chat session state and cooperative cancellation.
//!
//! The [`SessionStore`] maps a chat id to its current [`SessionHandle`]. A
//! handle is a shared `searching` flag: the delivery loop polls it at every
//! checkpoint, `/stop` clears it. Cancellation is advisory, so an HTTP call
//! already in flight still runs to completion.
//!
//! Starting a new search replaces the chat's handle. A stale loop that ends
//! later only clears its own handle and never touches the newer one.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

/// Telegram chat identifier.
pub type ChatId = i64;

/// Cancellation flag shared between a delivery run and the store.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    searching: Arc<AtomicBool>,
}

impl SessionHandle {
    fn new() -> Self {
        Self {
            searching: Arc::new(AtomicBool::new(true)),
        }
    }

    /// True until the run is stopped or completes.
    pub fn is_searching(&self) -> bool {
        self.searching.load(Ordering::SeqCst)
    }

    /// Clear the flag; the run stops at its next checkpoint.
    pub fn stop(&self) {
        self.searching.store(false, Ordering::SeqCst);
    }

    fn same_run(&self, other: &SessionHandle) -> bool {
        Arc::ptr_eq(&self.searching, &other.searching)
    }
}

/// Process-resident state of every chat the bot has seen.
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: Mutex<HashMap<ChatId, SessionHandle>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<ChatId, SessionHandle>> {
        // The map holds no invariants a panicking holder could break.
        self.sessions.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Start a search for `chat`, or `None` if one is already running.
    pub fn begin(&self, chat: ChatId) -> Option<SessionHandle> {
        let mut sessions = self.lock();
        if sessions.get(&chat).is_some_and(SessionHandle::is_searching) {
            return None;
        }
        let handle = SessionHandle::new();
        sessions.insert(chat, handle.clone());
        Some(handle)
    }

    /// Request cancellation. Returns whether a search was running.
    pub fn stop(&self, chat: ChatId) -> bool {
        match self.lock().get(&chat) {
            Some(handle) if handle.is_searching() => {
                handle.stop();
                true
            }
            _ => false,
        }
    }

    /// Mark `handle`'s run as finished. A newer run for the chat is left alone.
    pub fn finish(&self, chat: ChatId, handle: &SessionHandle) {
        handle.stop();
        let mut sessions = self.lock();
        if sessions.get(&chat).is_some_and(|current| current.same_run(handle)) {
            sessions.remove(&chat);
        }
    }

    pub fn is_searching(&self, chat: ChatId) -> bool {
        self.lock().get(&chat).is_some_and(SessionHandle::is_searching)
    }

    /// Number of chats with a search in progress.
    pub fn active(&self) -> usize {
        self.lock().values().filter(|h| h.is_searching()).count()
    }
}
