//! # Offline Action Queue
//!
//! Persists favorite toggles made without connectivity and replays them
//! against the remote store once the device is back online.
//!
//! ## State Machine
//!
//! - **Idle**: no drain running; the log may or may not hold entries
//! - **Draining**: one pass is replaying a snapshot of the log
//!
//! A pass replays the log in append order. Each entry is resolved by the
//! caller to the recipe's *current* local membership, so repeated toggles of
//! one recipe collapse into a single write. The pass is all-or-nothing: the
//! snapshot is removed from the log only when every write succeeded, and
//! entries appended while the pass runs are left for the next one.

use std::collections::HashSet;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::AppResult;
use crate::storage::{read_json, write_json, KeyValueStore, OFFLINE_ACTIONS_KEY};

/// Kind of a queued action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionKind {
    #[serde(rename = "toggleFavorite")]
    ToggleFavorite,
}

/// One persisted log entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FavoriteAction {
    #[serde(rename = "type")]
    pub kind: ActionKind,
    pub recipe_id: String,
    pub timestamp: DateTime<Utc>,
}

impl FavoriteAction {
    /// A favorite toggle stamped with the current time
    pub fn toggle_favorite(recipe_id: &str) -> Self {
        Self::toggle_favorite_at(recipe_id, Utc::now())
    }

    pub fn toggle_favorite_at(recipe_id: &str, timestamp: DateTime<Utc>) -> Self {
        Self {
            kind: ActionKind::ToggleFavorite,
            recipe_id: recipe_id.to_string(),
            timestamp,
        }
    }
}

/// Whether a drain is currently running
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueState {
    Idle,
    Draining,
}

/// Result of a drain request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainOutcome {
    /// Another drain was in flight; nothing was done
    AlreadyDraining,
    /// The log was empty
    Empty,
    /// Every entry of the snapshot was applied and removed from the log
    Completed {
        /// Log entries consumed
        entries: usize,
        /// Remote writes issued (one per distinct recipe)
        applied: usize,
    },
}

/// Clears the draining flag when a pass ends, however it ends
struct DrainGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> DrainGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| DrainGuard { flag })
    }
}

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// Persistent, append-only log of offline favorite toggles
pub struct OfflineActionQueue {
    store: Arc<dyn KeyValueStore>,
    draining: AtomicBool,
    // Serializes read-modify-write cycles on the stored log
    log_lock: Mutex<()>,
}

impl OfflineActionQueue {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            draining: AtomicBool::new(false),
            log_lock: Mutex::new(()),
        }
    }

    pub fn state(&self) -> QueueState {
        if self.draining.load(Ordering::Acquire) {
            QueueState::Draining
        } else {
            QueueState::Idle
        }
    }

    /// Current log contents in append order
    pub async fn pending(&self) -> AppResult<Vec<FavoriteAction>> {
        Ok(read_json(self.store.as_ref(), OFFLINE_ACTIONS_KEY)
            .await?
            .unwrap_or_default())
    }

    pub async fn len(&self) -> AppResult<usize> {
        Ok(self.pending().await?.len())
    }

    pub async fn is_empty(&self) -> AppResult<bool> {
        Ok(self.pending().await?.is_empty())
    }

    /// Append an action to the persisted log
    pub async fn enqueue(&self, action: FavoriteAction) -> AppResult<()> {
        let _lock = self.log_lock.lock().await;

        let mut actions = self.pending().await?;
        debug!(
            recipe_id = %action.recipe_id,
            position = actions.len(),
            "Queueing offline action"
        );
        actions.push(action);
        write_json(self.store.as_ref(), OFFLINE_ACTIONS_KEY, &actions).await
    }

    /// Drop every queued action
    pub async fn clear(&self) -> AppResult<()> {
        let _lock = self.log_lock.lock().await;
        self.store.remove(OFFLINE_ACTIONS_KEY).await
    }

    /// Replay the log through `apply`
    ///
    /// `apply` receives each entry in append order, once per distinct recipe,
    /// and must write that recipe's current membership to the remote store.
    /// The first error abandons the pass and leaves the log untouched.
    pub async fn drain<F, Fut>(&self, mut apply: F) -> AppResult<DrainOutcome>
    where
        F: FnMut(&FavoriteAction) -> Fut,
        Fut: Future<Output = AppResult<()>>,
    {
        let Some(_guard) = DrainGuard::acquire(&self.draining) else {
            info!("Drain already in progress, ignoring request");
            return Ok(DrainOutcome::AlreadyDraining);
        };

        let snapshot = self.pending().await?;
        if snapshot.is_empty() {
            debug!("No offline actions to drain");
            return Ok(DrainOutcome::Empty);
        }

        info!(entries = snapshot.len(), "Draining offline actions");

        let mut seen = HashSet::new();
        for (index, action) in snapshot.iter().enumerate() {
            if !seen.insert(action.recipe_id.as_str()) {
                debug!(recipe_id = %action.recipe_id, index, "Recipe already synced in this pass");
                continue;
            }

            if let Err(e) = apply(action).await {
                warn!(
                    recipe_id = %action.recipe_id,
                    index,
                    error = %e,
                    "Drain abandoned, offline actions kept for the next pass"
                );
                return Err(e);
            }
        }

        self.remove_snapshot(&snapshot).await?;

        let outcome = DrainOutcome::Completed {
            entries: snapshot.len(),
            applied: seen.len(),
        };
        info!(entries = snapshot.len(), applied = seen.len(), "Offline actions drained");
        Ok(outcome)
    }

    /// Remove the drained snapshot from the front of the log
    ///
    /// Anything appended since stays queued. If the log no longer starts with
    /// the snapshot it was cleared mid-drain, and whatever it now holds was
    /// never part of this pass, so it is kept as is.
    async fn remove_snapshot(&self, snapshot: &[FavoriteAction]) -> AppResult<()> {
        let _lock = self.log_lock.lock().await;

        let mut actions = self.pending().await?;
        if !actions.starts_with(snapshot) {
            info!(
                drained = snapshot.len(),
                queued = actions.len(),
                "Log changed during drain, keeping current entries"
            );
            return Ok(());
        }

        let remaining = actions.split_off(snapshot.len());
        if remaining.is_empty() {
            self.store.remove(OFFLINE_ACTIONS_KEY).await
        } else {
            debug!(remaining = remaining.len(), "Keeping actions queued during drain");
            write_json(self.store.as_ref(), OFFLINE_ACTIONS_KEY, &remaining).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use crate::storage::MemoryKeyValueStore;
    use chrono::TimeZone;
    use std::sync::Mutex as StdMutex;

    fn queue() -> (OfflineActionQueue, Arc<MemoryKeyValueStore>) {
        let store = Arc::new(MemoryKeyValueStore::new());
        (OfflineActionQueue::new(store.clone()), store)
    }

    #[test]
    fn test_action_wire_format() {
        let timestamp = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap();
        let action = FavoriteAction::toggle_favorite_at("52772", timestamp);

        let json = serde_json::to_value(&action).unwrap();
        assert_eq!(json["type"], "toggleFavorite");
        assert_eq!(json["recipeId"], "52772");
        assert_eq!(json["timestamp"], "2024-03-01T12:30:00Z");

        let parsed: FavoriteAction = serde_json::from_str(
            r#"{"type":"toggleFavorite","recipeId":"1","timestamp":"2024-03-01T12:30:00.000Z"}"#,
        )
        .unwrap();
        assert_eq!(parsed.recipe_id, "1");
        assert_eq!(parsed.timestamp, timestamp);
    }

    #[tokio::test]
    async fn test_enqueue_appends_in_order() {
        let (queue, _store) = queue();

        queue.enqueue(FavoriteAction::toggle_favorite("a")).await.unwrap();
        queue.enqueue(FavoriteAction::toggle_favorite("b")).await.unwrap();
        queue.enqueue(FavoriteAction::toggle_favorite("a")).await.unwrap();

        let ids: Vec<String> = queue
            .pending()
            .await
            .unwrap()
            .into_iter()
            .map(|a| a.recipe_id)
            .collect();
        assert_eq!(ids, vec!["a", "b", "a"]);
        assert_eq!(queue.len().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_drain_empty_log() {
        let (queue, _store) = queue();
        let outcome = queue.drain(|_| async { Ok(()) }).await.unwrap();
        assert_eq!(outcome, DrainOutcome::Empty);
        assert_eq!(queue.state(), QueueState::Idle);
    }

    #[tokio::test]
    async fn test_drain_collapses_repeated_recipes() {
        let (queue, store) = queue();
        for id in ["a", "a", "b", "a"] {
            queue.enqueue(FavoriteAction::toggle_favorite(id)).await.unwrap();
        }

        let calls = StdMutex::new(Vec::new());
        let outcome = queue
            .drain(|action| {
                calls.lock().unwrap().push(action.recipe_id.clone());
                async { Ok(()) }
            })
            .await
            .unwrap();

        assert_eq!(
            outcome,
            DrainOutcome::Completed {
                entries: 4,
                applied: 2
            }
        );
        assert_eq!(*calls.lock().unwrap(), vec!["a", "b"]);
        assert_eq!(store.get(OFFLINE_ACTIONS_KEY).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_failed_drain_keeps_every_entry() {
        let (queue, _store) = queue();
        for id in ["1", "2", "3", "4", "5"] {
            queue.enqueue(FavoriteAction::toggle_favorite(id)).await.unwrap();
        }

        let result = queue
            .drain(|action| {
                let fail = action.recipe_id == "3";
                async move {
                    if fail {
                        Err(AppError::RemoteSync("connection reset".to_string()))
                    } else {
                        Ok(())
                    }
                }
            })
            .await;

        assert!(matches!(result, Err(AppError::RemoteSync(_))));
        assert_eq!(queue.len().await.unwrap(), 5);
        assert_eq!(queue.state(), QueueState::Idle);
    }

    #[tokio::test]
    async fn test_concurrent_drain_is_refused() {
        let (queue, _store) = queue();
        queue.enqueue(FavoriteAction::toggle_favorite("a")).await.unwrap();

        let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();
        let release_rx = StdMutex::new(Some(release_rx));

        let first = queue.drain(|_| {
            let rx = release_rx.lock().unwrap().take();
            async move {
                if let Some(rx) = rx {
                    let _ = rx.await;
                }
                Ok(())
            }
        });

        let second = async {
            // Runs while the first drain is parked on the channel
            tokio::task::yield_now().await;
            assert_eq!(queue.state(), QueueState::Draining);
            let outcome = queue.drain(|_| async { Ok(()) }).await.unwrap();
            let _ = release_tx.send(());
            outcome
        };

        let (first, second) = tokio::join!(first, second);
        assert_eq!(second, DrainOutcome::AlreadyDraining);
        assert!(matches!(first.unwrap(), DrainOutcome::Completed { entries: 1, .. }));
        assert_eq!(queue.state(), QueueState::Idle);
    }

    #[tokio::test]
    async fn test_entries_enqueued_during_drain_survive() {
        let (queue, _store) = queue();
        queue.enqueue(FavoriteAction::toggle_favorite("a")).await.unwrap();

        let queue_ref = &queue;
        let outcome = queue
            .drain(|_| async move {
                queue_ref
                    .enqueue(FavoriteAction::toggle_favorite("late"))
                    .await
            })
            .await
            .unwrap();

        assert!(matches!(outcome, DrainOutcome::Completed { entries: 1, applied: 1 }));
        let remaining = queue.pending().await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].recipe_id, "late");
    }

    #[tokio::test]
    async fn test_clear_during_drain_keeps_new_entries() {
        let (queue, _store) = queue();
        queue.enqueue(FavoriteAction::toggle_favorite("a")).await.unwrap();
        queue.enqueue(FavoriteAction::toggle_favorite("b")).await.unwrap();

        let queue_ref = &queue;
        let first_call = StdMutex::new(true);
        let outcome = queue
            .drain(|_| {
                let reset = std::mem::replace(&mut *first_call.lock().unwrap(), false);
                async move {
                    if reset {
                        queue_ref.clear().await?;
                        queue_ref
                            .enqueue(FavoriteAction::toggle_favorite("new"))
                            .await?;
                    }
                    Ok(())
                }
            })
            .await
            .unwrap();

        assert!(matches!(outcome, DrainOutcome::Completed { entries: 2, applied: 2 }));
        let remaining: Vec<String> = queue
            .pending()
            .await
            .unwrap()
            .into_iter()
            .map(|a| a.recipe_id)
            .collect();
        assert_eq!(remaining, vec!["new"]);
    }

    #[tokio::test]
    async fn test_clear() {
        let (queue, _store) = queue();
        queue.enqueue(FavoriteAction::toggle_favorite("a")).await.unwrap();
        queue.clear().await.unwrap();
        assert!(queue.is_empty().await.unwrap());
    }
}
