//! Registry of users currently being processed
//!
//! One [`ActiveUserRegistry`] is built at process start and shared by
//! `Arc` with every orchestrator run, so a manual trigger racing a daemon
//! cycle still sees a single claim set. [`ActiveUserRegistry::claim`] hands
//! out a [`ClaimGuard`] that releases the user when dropped, whether the
//! pipeline returned normally, failed, or panicked.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

/// Process-wide set of in-flight user identities
#[derive(Debug, Default)]
pub struct ActiveUserRegistry {
    active: Mutex<HashSet<String>>,
}

impl ActiveUserRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Convenience for the common shared form
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    fn lock(&self) -> MutexGuard<'_, HashSet<String>> {
        self.active.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Atomically claim `id`. Returns `false` if it was already claimed.
    pub fn mark_active(&self, id: &str) -> bool {
        let claimed = self.lock().insert(id.to_string());
        if claimed {
            tracing::trace!(user = id, "User claimed");
        }
        claimed
    }

    /// Release `id`. Releasing an unclaimed id is a no-op.
    pub fn mark_done(&self, id: &str) {
        if self.lock().remove(id) {
            tracing::trace!(user = id, "User released");
        }
    }

    pub fn is_active(&self, id: &str) -> bool {
        self.lock().contains(id)
    }

    pub fn count(&self) -> usize {
        self.lock().len()
    }

    /// Snapshot of the currently claimed identities, sorted
    pub fn active_users(&self) -> Vec<String> {
        let mut users: Vec<_> = self.lock().iter().cloned().collect();
        users.sort();
        users
    }

    /// Claim `id` for the lifetime of the returned guard
    pub fn claim(self: &Arc<Self>, id: &str) -> Option<ClaimGuard> {
        self.mark_active(id).then(|| ClaimGuard {
            registry: Arc::clone(self),
            user: id.to_string(),
        })
    }
}

/// Scoped claim on a user; dropping it calls [`ActiveUserRegistry::mark_done`]
#[derive(Debug)]
pub struct ClaimGuard {
    registry: Arc<ActiveUserRegistry>,
    user: String,
}

impl ClaimGuard {
    pub fn user(&self) -> &str {
        &self.user
    }
}

impl Drop for ClaimGuard {
    fn drop(&mut self) {
        self.registry.mark_done(&self.user);
    }
}
