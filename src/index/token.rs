//! Reader tokens
//!
//! A query pins slice memory by holding a [`Token`] for its whole matching
//! loop. While any token from the current epoch is outstanding, deferred
//! recycle actions queue up instead of running; the release that drops the
//! outstanding count to zero drains the queue. Acquisition is wait-free
//! with respect to other readers (a single atomic increment).

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

type RecycleAction = Box<dyn FnOnce() + Send>;

struct TokenState {
    outstanding: AtomicUsize,
    pending: Mutex<Vec<RecycleAction>>,
}

pub struct TokenManager {
    state: Arc<TokenState>,
}

impl TokenManager {
    pub fn new() -> Self {
        Self {
            state: Arc::new(TokenState {
                outstanding: AtomicUsize::new(0),
                pending: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Acquire a reader token for the current epoch.
    pub fn request_token(&self) -> Token {
        self.state.outstanding.fetch_add(1, Ordering::AcqRel);
        Token {
            state: Arc::clone(&self.state),
        }
    }

    pub fn outstanding(&self) -> usize {
        self.state.outstanding.load(Ordering::Acquire)
    }

    /// Run `action` once no reader can still observe the resource it
    /// recycles: immediately if no token is outstanding, otherwise when
    /// the last token of the epoch is released.
    pub fn defer_recycle(&self, action: RecycleAction) {
        let mut pending = self.state.pending.lock().expect("token lock poisoned");
        if self.state.outstanding.load(Ordering::Acquire) == 0 {
            drop(pending);
            action();
        } else {
            pending.push(action);
        }
    }
}

impl Default for TokenManager {
    fn default() -> Self {
        Self::new()
    }
}

pub struct Token {
    state: Arc<TokenState>,
}

impl Drop for Token {
    fn drop(&mut self) {
        if self.state.outstanding.fetch_sub(1, Ordering::AcqRel) == 1 {
            // Last token out drains the recycle queue. Holding the lock
            // across the re-check keeps a concurrent defer_recycle from
            // racing the drain.
            let mut pending = self.state.pending.lock().expect("token lock poisoned");
            if self.state.outstanding.load(Ordering::Acquire) == 0 {
                for action in pending.drain(..) {
                    action();
                }
            }
        }
    }
}
