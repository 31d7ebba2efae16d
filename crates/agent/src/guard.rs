//! Bounded leases over shared backend resources.
//!
//! Database sessions and outbound generation calls are the two operations
//! that can suspend while holding scarce capacity. Each is bounded by a
//! semaphore with a configured ceiling; when the ceiling is reached,
//! `acquire` waits up to the configured timeout and then fails with
//! [`ResourceExhausted`]. Leases release on drop, so every exit path -
//! early return, panic, caller cancellation - gives the permit back.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::timeout;

use closetmind_core::config::PoolLimits;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LeaseKind {
    DbSession,
    Generation,
}

impl LeaseKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DbSession => "db_session",
            Self::Generation => "generation",
        }
    }
}

/// The guard's only failure mode: the ceiling stayed saturated for the whole
/// wait window. Surfaced to callers as a retryable service-busy condition;
/// never retried here.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("{pool} pool exhausted waiting for a {kind} lease after {timeout_ms}ms", kind = .kind.as_str())]
pub struct ResourceExhausted {
    pub pool: &'static str,
    pub kind: LeaseKind,
    pub timeout_ms: u64,
}

/// One bounded pool of database-session and generation-call leases. The
/// interactive request path and background work each get their own guard so
/// a saturated background pool cannot starve interactive requests.
pub struct ResourceGuard {
    name: &'static str,
    db_sessions: Arc<Semaphore>,
    generation_slots: Arc<Semaphore>,
    acquire_timeout: Duration,
}

impl ResourceGuard {
    pub fn new(name: &'static str, limits: PoolLimits, acquire_timeout: Duration) -> Self {
        Self {
            name,
            db_sessions: Arc::new(Semaphore::new(limits.db_sessions)),
            generation_slots: Arc::new(Semaphore::new(limits.generation_slots)),
            acquire_timeout,
        }
    }

    pub async fn acquire(&self, kind: LeaseKind) -> Result<ResourceLease, ResourceExhausted> {
        let semaphore = match kind {
            LeaseKind::DbSession => Arc::clone(&self.db_sessions),
            LeaseKind::Generation => Arc::clone(&self.generation_slots),
        };

        let exhausted = ResourceExhausted {
            pool: self.name,
            kind,
            timeout_ms: self.acquire_timeout.as_millis() as u64,
        };

        match timeout(self.acquire_timeout, semaphore.acquire_owned()).await {
            Ok(Ok(permit)) => Ok(ResourceLease { _permit: permit }),
            // The semaphores are never closed while the guard is alive.
            Ok(Err(_)) => Err(exhausted),
            Err(_) => Err(exhausted),
        }
    }

    /// Currently free leases of a kind. Observability and tests only.
    pub fn available(&self, kind: LeaseKind) -> usize {
        match kind {
            LeaseKind::DbSession => self.db_sessions.available_permits(),
            LeaseKind::Generation => self.generation_slots.available_permits(),
        }
    }
}

/// Scoped hold on one unit of pool capacity. Released exactly once, when
/// dropped.
#[derive(Debug)]
pub struct ResourceLease {
    _permit: OwnedSemaphorePermit,
}
