//! Path-subtree lock table.
//!
//! An operation declares the paths it touches as [`LockKey`]s and holds a
//! [`SubtreeGuard`] for its whole duration. Two keys conflict when they are
//! in the same scope, one path contains the other, and at least one key is
//! exclusive. Operations on disjoint subtrees run in parallel.
//!
//! A set of keys is registered all at once, so there is no lock-ordering
//! deadlock between operations that need several paths.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use fsmgr_core::domain::CanonicalPath;
use tokio::sync::Notify;
use tracing::trace;

/// Which tree a lock key lives in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockScope {
    /// The managed root, keyed by canonical path
    Managed,
    /// The recycle area, keyed by path relative to the recycle root
    Recycle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockMode {
    Shared,
    Exclusive,
}

/// One locked subtree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockKey {
    pub scope: LockScope,
    pub path: CanonicalPath,
    pub mode: LockMode,
}

impl LockKey {
    pub fn shared(scope: LockScope, path: CanonicalPath) -> Self {
        Self {
            scope,
            path,
            mode: LockMode::Shared,
        }
    }

    pub fn exclusive(scope: LockScope, path: CanonicalPath) -> Self {
        Self {
            scope,
            path,
            mode: LockMode::Exclusive,
        }
    }

    /// True if the two keys may not be held at the same time
    pub fn conflicts(&self, other: &LockKey) -> bool {
        self.scope == other.scope
            && (self.mode == LockMode::Exclusive || other.mode == LockMode::Exclusive)
            && self.path.overlaps(&other.path)
    }
}

#[derive(Debug)]
struct Held {
    ticket: u64,
    keys: Vec<LockKey>,
}

/// Table of currently held subtree locks
#[derive(Debug, Default)]
pub struct SubtreeLocks {
    held: Mutex<Vec<Held>>,
    released: Notify,
    next_ticket: AtomicU64,
}

impl SubtreeLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait until none of `keys` conflicts with a held key, then hold them.
    pub async fn acquire(self: &Arc<Self>, keys: Vec<LockKey>) -> SubtreeGuard {
        loop {
            // Register interest before checking so a release between the
            // check and the await is not missed.
            let notified = self.released.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(ticket) = self.try_register(&keys) {
                return SubtreeGuard {
                    locks: Arc::clone(self),
                    ticket,
                };
            }
            trace!(?keys, "waiting for conflicting lock");
            notified.await;
        }
    }

    /// Number of lock sets currently held
    pub fn held_count(&self) -> usize {
        self.state().len()
    }

    fn try_register(&self, keys: &[LockKey]) -> Option<u64> {
        let mut held = self.state();
        let blocked = held
            .iter()
            .flat_map(|h| h.keys.iter())
            .any(|existing| keys.iter().any(|wanted| wanted.conflicts(existing)));
        if blocked {
            return None;
        }

        let ticket = self.next_ticket.fetch_add(1, Ordering::Relaxed);
        held.push(Held {
            ticket,
            keys: keys.to_vec(),
        });
        Some(ticket)
    }

    fn release(&self, ticket: u64) {
        self.state().retain(|h| h.ticket != ticket);
        self.released.notify_waiters();
    }

    fn state(&self) -> MutexGuard<'_, Vec<Held>> {
        // A panic while holding this mutex cannot leave the Vec half-updated.
        self.held.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Held lock set; released on drop
#[derive(Debug)]
pub struct SubtreeGuard {
    locks: Arc<SubtreeLocks>,
    ticket: u64,
}

impl Drop for SubtreeGuard {
    fn drop(&mut self) {
        self.locks.release(self.ticket);
    }
}
