use parking_lot::Mutex;
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::{timeout_at, Instant};

use crate::error::{ApiError, ApiResult};
use crate::model::is_same_or_descendant_path;

/// Lock context used when a request does not name one.
pub const ROOT_LOCK_CONTEXT: &str = "root";

/// Owner description recorded with a held lock.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LockContext {
    pub user: String,
    pub description: String,
    pub parent: String,
}

impl LockContext {
    pub fn new(user: &str, description: &str, parent: &str) -> Self {
        Self {
            user: user.to_string(),
            description: description.to_string(),
            parent: parent.to_string(),
        }
    }
}

impl fmt::Display for LockContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "'{}' by {} (in {})", self.description, self.user, self.parent)
    }
}

/// A branch of a repository.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LockTarget {
    pub repository: String,
    pub path: String,
}

impl LockTarget {
    pub fn new(repository: &str, path: &str) -> Self {
        Self {
            repository: repository.to_string(),
            path: path.to_string(),
        }
    }

    /// Locking a branch also covers every branch below it.
    pub fn conflicts_with(&self, other: &LockTarget) -> bool {
        self.repository == other.repository
            && (is_same_or_descendant_path(&self.path, &other.path)
                || is_same_or_descendant_path(&other.path, &self.path))
    }
}

impl fmt::Display for LockTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.repository, self.path)
    }
}

#[derive(Debug, Clone)]
struct HeldLock {
    id: u64,
    target: LockTarget,
    context: LockContext,
}

/// Hierarchical branch locks shared by every writer of the server.
pub struct LockManager {
    held: Mutex<Vec<HeldLock>>,
    next_id: AtomicU64,
    released: Notify,
    timeout: Duration,
}

impl LockManager {
    pub fn new(timeout: Duration) -> Self {
        Self {
            held: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
            released: Notify::new(),
            timeout,
        }
    }

    /// Waits until no conflicting lock is held, up to the configured timeout.
    pub async fn acquire(self: &Arc<Self>, target: LockTarget, context: LockContext) -> ApiResult<LockGuard> {
        let deadline = Instant::now() + self.timeout;
        loop {
            // registered before the check so a release in between is not missed
            let released = self.released.notified();

            let holder = match self.try_acquire(&target, &context) {
                Ok(id) => {
                    log::info!("Acquired lock on {} for {}", target, context);
                    return Ok(LockGuard {
                        manager: Arc::clone(self),
                        id,
                    });
                }
                Err(holder) => holder,
            };

            if timeout_at(deadline, released).await.is_err() {
                log::warn!("Timed out waiting for lock on {} held {}", target, holder);
                return Err(ApiError::Locked(format!(
                    "Branch {} is locked by {}.",
                    target, holder
                )));
            }
        }
    }

    fn try_acquire(&self, target: &LockTarget, context: &LockContext) -> Result<u64, LockContext> {
        let mut held = self.held.lock();
        if let Some(conflict) = held.iter().find(|lock| lock.target.conflicts_with(target)) {
            return Err(conflict.context.clone());
        }
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        held.push(HeldLock {
            id,
            target: target.clone(),
            context: context.clone(),
        });
        Ok(id)
    }

    fn release(&self, id: u64) {
        let mut held = self.held.lock();
        if let Some(index) = held.iter().position(|lock| lock.id == id) {
            let lock = held.remove(index);
            log::debug!("Released lock on {}", lock.target);
        }
        drop(held);
        self.released.notify_waiters();
    }

    pub fn held_locks(&self) -> Vec<(LockTarget, LockContext)> {
        self.held
            .lock()
            .iter()
            .map(|lock| (lock.target.clone(), lock.context.clone()))
            .collect()
    }
}

/// Releases its lock when dropped.
pub struct LockGuard {
    manager: Arc<LockManager>,
    id: u64,
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        self.manager.release(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context(description: &str) -> LockContext {
        LockContext::new("tester", description, ROOT_LOCK_CONTEXT)
    }

    #[test]
    fn hierarchical_conflicts() {
        let main = LockTarget::new("snomed", "MAIN");
        assert!(main.conflicts_with(&LockTarget::new("snomed", "MAIN/a")));
        assert!(LockTarget::new("snomed", "MAIN/a").conflicts_with(&main));
        assert!(!LockTarget::new("snomed", "MAIN/a").conflicts_with(&LockTarget::new("snomed", "MAIN/ab")));
        assert!(!main.conflicts_with(&LockTarget::new("resources", "MAIN")));
    }

    #[tokio::test]
    async fn waits_for_release() {
        let manager = Arc::new(LockManager::new(Duration::from_secs(5)));
        let guard = manager
            .acquire(LockTarget::new("resources", "MAIN"), context("first"))
            .await
            .unwrap();

        let waiter = {
            let manager = Arc::clone(&manager);
            tokio::spawn(async move {
                manager
                    .acquire(LockTarget::new("resources", "MAIN"), context("second"))
                    .await
                    .map(|_| ())
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(manager.held_locks().len(), 1);
        drop(guard);
        assert!(waiter.await.unwrap().is_ok());
        assert!(manager.held_locks().is_empty());
    }

    #[tokio::test]
    async fn times_out_naming_holder() {
        let manager = Arc::new(LockManager::new(Duration::from_millis(20)));
        let _guard = manager
            .acquire(LockTarget::new("resources", "MAIN"), context("import"))
            .await
            .unwrap();

        let error = manager
            .acquire(LockTarget::new("resources", "MAIN/child"), context("update"))
            .await
            .err()
            .unwrap();
        match error {
            ApiError::Locked(message) => assert!(message.contains("'import'")),
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
