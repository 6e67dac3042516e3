// cancel.rs — Session-keyed cancellation registry.
//
// One CancellationToken per session id, created on demand. The registry is
// an explicitly constructed, injected component with a clear lifecycle:
// create it at startup, hand clones to whoever needs to cancel, clear keys
// when sessions end. There is no process-wide ambient map.

use std::collections::HashMap;
use std::sync::Mutex;

use tokio_util::sync::CancellationToken;

/// Registry of cancellation tokens keyed by session identifier.
#[derive(Default)]
pub struct CancelRegistry {
    tokens: Mutex<HashMap<String, CancellationToken>>,
}

impl CancelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The token for a session, created if missing. Clones share state,
    /// so cancelling any clone cancels them all.
    pub fn token_for(&self, session_id: &str) -> CancellationToken {
        self.tokens
            .lock()
            .expect("cancel registry poisoned")
            .entry(session_id.to_string())
            .or_default()
            .clone()
    }

    /// Request cancellation for a session. Returns false if the session
    /// has no token (nothing was running under that key).
    pub fn cancel(&self, session_id: &str) -> bool {
        let tokens = self.tokens.lock().expect("cancel registry poisoned");
        match tokens.get(session_id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Whether a session has a pending cancellation request.
    pub fn is_cancelled(&self, session_id: &str) -> bool {
        self.tokens
            .lock()
            .expect("cancel registry poisoned")
            .get(session_id)
            .is_some_and(|t| t.is_cancelled())
    }

    /// Drop a session's token — call when the session ends so a stale
    /// cancellation can't leak into the session id's next user.
    pub fn clear(&self, session_id: &str) {
        self.tokens
            .lock()
            .expect("cancel registry poisoned")
            .remove(session_id);
    }
}
