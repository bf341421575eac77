use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use kitchen_chef::app_state::{AppState, SyncOutcome, UserSession};
use kitchen_chef::error::{AppError, AppResult};
use kitchen_chef::offline_queue::{DrainOutcome, QueueState};
use kitchen_chef::remote::{MemoryFavoriteStore, RemoteFavoriteStore};
use kitchen_chef::settings::PushNotificationSettings;
use kitchen_chef::storage::{
    KeyValueStore, MemoryKeyValueStore, SqliteKeyValueStore, FAVORITES_KEY, OFFLINE_ACTIONS_KEY,
};
use tempfile::tempdir;
use tokio::sync::Notify;

/// Remote store that can be told to reject writes for some recipes
#[derive(Default)]
struct FlakyRemote {
    inner: MemoryFavoriteStore,
    failing: Mutex<HashSet<String>>,
    writes: Mutex<HashMap<String, usize>>,
}

impl FlakyRemote {
    fn fail_on(&self, recipe_id: &str) {
        self.failing.lock().unwrap().insert(recipe_id.to_string());
    }

    fn heal(&self) {
        self.failing.lock().unwrap().clear();
    }

    fn reset_writes(&self) {
        self.writes.lock().unwrap().clear();
    }

    fn writes_for(&self, recipe_id: &str) -> usize {
        self.writes.lock().unwrap().get(recipe_id).copied().unwrap_or(0)
    }

    fn total_writes(&self) -> usize {
        self.writes.lock().unwrap().values().sum()
    }

    fn check(&self, recipe_id: &str) -> AppResult<()> {
        if self.failing.lock().unwrap().contains(recipe_id) {
            return Err(AppError::RemoteSync(format!("write rejected for {recipe_id}")));
        }
        *self
            .writes
            .lock()
            .unwrap()
            .entry(recipe_id.to_string())
            .or_default() += 1;
        Ok(())
    }
}

#[async_trait]
impl RemoteFavoriteStore for FlakyRemote {
    async fn upsert(&self, user_id: &str, recipe_id: &str) -> AppResult<()> {
        self.check(recipe_id)?;
        self.inner.upsert(user_id, recipe_id).await
    }

    async fn delete(&self, user_id: &str, recipe_id: &str) -> AppResult<()> {
        self.check(recipe_id)?;
        self.inner.delete(user_id, recipe_id).await
    }

    async fn list(&self, user_id: &str) -> AppResult<Vec<String>> {
        self.inner.list(user_id).await
    }

    async fn upsert_settings(
        &self,
        user_id: &str,
        settings: &PushNotificationSettings,
    ) -> AppResult<()> {
        self.inner.upsert_settings(user_id, settings).await
    }
}

/// Remote store whose first write parks until released
#[derive(Default)]
struct GatedRemote {
    inner: MemoryFavoriteStore,
    entered: Notify,
    release: Notify,
    gated: Mutex<bool>,
}

impl GatedRemote {
    async fn gate(&self) {
        let first = !std::mem::replace(&mut *self.gated.lock().unwrap(), true);
        if first {
            self.entered.notify_one();
            self.release.notified().await;
        }
    }
}

#[async_trait]
impl RemoteFavoriteStore for GatedRemote {
    async fn upsert(&self, user_id: &str, recipe_id: &str) -> AppResult<()> {
        self.gate().await;
        self.inner.upsert(user_id, recipe_id).await
    }

    async fn delete(&self, user_id: &str, recipe_id: &str) -> AppResult<()> {
        self.gate().await;
        self.inner.delete(user_id, recipe_id).await
    }

    async fn list(&self, user_id: &str) -> AppResult<Vec<String>> {
        self.inner.list(user_id).await
    }

    async fn upsert_settings(
        &self,
        user_id: &str,
        settings: &PushNotificationSettings,
    ) -> AppResult<()> {
        self.inner.upsert_settings(user_id, settings).await
    }
}

/// Key-value store whose writes always fail
#[derive(Default)]
struct ReadOnlyStore {
    inner: MemoryKeyValueStore,
}

#[async_trait]
impl KeyValueStore for ReadOnlyStore {
    async fn get(&self, key: &str) -> AppResult<Option<String>> {
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, _value: &str) -> AppResult<()> {
        Err(AppError::Persistence(format!("disk full while writing {key}")))
    }

    async fn remove(&self, key: &str) -> AppResult<()> {
        self.inner.remove(key).await
    }
}

async fn offline_state(
    store: Arc<dyn KeyValueStore>,
    remote: Arc<dyn RemoteFavoriteStore>,
) -> Result<AppState> {
    let state = AppState::load(store, remote).await?;
    state.set_user(Some(UserSession::new("user-1")));
    state.set_connectivity(false).await?;
    Ok(state)
}

#[tokio::test]
async fn test_remote_matches_last_local_state() -> Result<()> {
    let store = Arc::new(MemoryKeyValueStore::new());
    let remote = Arc::new(MemoryFavoriteStore::new());
    let state = offline_state(store, remote.clone()).await?;

    // a: on, off, on -> on; b: on, off -> off; c: on -> on
    for id in ["a", "b", "a", "c", "b", "a"] {
        state.toggle_favorite(id).await?;
    }
    assert!(remote.list("user-1").await?.is_empty());

    let outcome = state.set_connectivity(true).await?;
    assert_eq!(
        outcome,
        Some(SyncOutcome::Drained(DrainOutcome::Completed {
            entries: 6,
            applied: 3
        }))
    );

    assert_eq!(
        remote.list("user-1").await?,
        vec!["a".to_string(), "c".to_string()]
    );
    assert!(state.queue().is_empty().await?);
    Ok(())
}

#[tokio::test]
async fn test_failed_drain_keeps_log_and_retry_applies_everything() -> Result<()> {
    let store = Arc::new(MemoryKeyValueStore::new());
    let remote = Arc::new(FlakyRemote::default());
    let state = offline_state(store, remote.clone()).await?;

    for id in ["1", "2", "3", "4", "5"] {
        state.toggle_favorite(id).await?;
    }

    remote.fail_on("3");
    let err = state.set_connectivity(true).await.unwrap_err();
    assert!(matches!(err, AppError::RemoteSync(_)));
    assert!(!err.is_user_facing());

    assert_eq!(state.queue().len().await?, 5);
    assert_eq!(state.queue().state(), QueueState::Idle);
    assert_eq!(remote.writes_for("4"), 0);

    remote.heal();
    remote.reset_writes();

    let outcome = state.sync_offline_actions().await?;
    assert_eq!(
        outcome,
        SyncOutcome::Drained(DrainOutcome::Completed {
            entries: 5,
            applied: 5
        })
    );
    assert_eq!(remote.total_writes(), 5);
    for id in ["1", "2", "3", "4", "5"] {
        assert_eq!(remote.writes_for(id), 1);
    }
    assert_eq!(remote.list("user-1").await?.len(), 5);
    assert!(state.queue().is_empty().await?);
    Ok(())
}

#[tokio::test]
async fn test_queue_survives_restart() -> Result<()> {
    let dir = tempdir()?;
    let db_path = dir.path().join("kitchen_chef.db");
    let db_path = db_path.to_str().expect("temp path is utf-8");
    let remote = Arc::new(MemoryFavoriteStore::new());

    {
        let store = Arc::new(SqliteKeyValueStore::open(db_path).await?);
        let state = offline_state(store, remote.clone()).await?;
        state.toggle_favorite("52772").await?;
        state.toggle_favorite("52959").await?;
    }

    // Relaunch: fresh state over the same file
    let store = Arc::new(SqliteKeyValueStore::open(db_path).await?);
    let state = AppState::load(store.clone(), remote.clone()).await?;
    assert!(state.is_favorite("52772"));
    assert_eq!(state.queue().len().await?, 2);

    state.set_user(Some(UserSession::new("user-1")));
    state.set_connectivity(true).await?;

    assert_eq!(
        remote.list("user-1").await?,
        vec!["52772".to_string(), "52959".to_string()]
    );
    assert_eq!(store.get(OFFLINE_ACTIONS_KEY).await?, None);
    Ok(())
}

#[tokio::test]
async fn test_persistence_failure_leaves_state_unchanged() -> Result<()> {
    let store = Arc::new(ReadOnlyStore::default());
    let remote = Arc::new(MemoryFavoriteStore::new());
    let state = AppState::load(store.clone(), remote.clone()).await?;
    state.set_user(Some(UserSession::new("user-1")));
    state.set_connectivity(true).await?;

    let err = state.toggle_favorite("52772").await.unwrap_err();
    assert!(matches!(err, AppError::Persistence(_)));
    assert!(!state.is_favorite("52772"));
    assert!(remote.list("user-1").await?.is_empty());
    assert_eq!(store.get(FAVORITES_KEY).await?, None);

    state.set_connectivity(false).await?;
    let err = state.toggle_favorite("52772").await.unwrap_err();
    assert!(matches!(err, AppError::Persistence(_)));
    assert!(!state.is_favorite("52772"));
    assert!(state.queue().is_empty().await?);
    Ok(())
}

#[tokio::test]
async fn test_online_remote_failure_keeps_local_change() -> Result<()> {
    let store = Arc::new(MemoryKeyValueStore::new());
    let remote = Arc::new(FlakyRemote::default());
    let state = AppState::load(store, remote.clone()).await?;
    state.set_user(Some(UserSession::new("user-1")));
    state.set_connectivity(true).await?;

    remote.fail_on("52772");
    assert!(state.toggle_favorite("52772").await?);
    assert!(state.is_favorite("52772"));
    assert!(remote.list("user-1").await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_malformed_log_is_treated_as_empty() -> Result<()> {
    let store = Arc::new(MemoryKeyValueStore::new());
    store.set(OFFLINE_ACTIONS_KEY, "{not json").await?;
    store.set(FAVORITES_KEY, "42").await?;

    let state = AppState::load(store, Arc::new(MemoryFavoriteStore::new())).await?;
    assert!(state.favorites().is_empty());
    assert!(state.queue().is_empty().await?);
    Ok(())
}

#[tokio::test]
async fn test_concurrent_toggles_keep_both_changes() -> Result<()> {
    let dir = tempdir()?;
    let db_path = dir.path().join("kitchen_chef.db");
    let db_path = db_path.to_str().expect("temp path is utf-8");

    let store = Arc::new(SqliteKeyValueStore::open(db_path).await?);
    let remote = Arc::new(MemoryFavoriteStore::new());
    let state = offline_state(store.clone(), remote.clone()).await?;

    let (a, b) = tokio::join!(state.toggle_favorite("a"), state.toggle_favorite("b"));
    assert!(a?);
    assert!(b?);

    assert!(state.is_favorite("a"));
    assert!(state.is_favorite("b"));
    assert_eq!(state.queue().len().await?, 2);

    // The persisted set holds both as well
    let reloaded = AppState::load(store, remote.clone()).await?;
    assert_eq!(reloaded.favorites().len(), 2);

    state.set_connectivity(true).await?;
    assert_eq!(
        remote.list("user-1").await?,
        vec!["a".to_string(), "b".to_string()]
    );
    Ok(())
}

#[tokio::test]
async fn test_sign_out_during_drain_keeps_new_session_actions() -> Result<()> {
    let store = Arc::new(MemoryKeyValueStore::new());
    let remote = Arc::new(GatedRemote::default());
    let state = offline_state(store, remote.clone()).await?;

    state.toggle_favorite("a").await?;
    state.toggle_favorite("b").await?;

    let drain = state.sync_offline_actions();
    let switch_user = async {
        remote.entered.notified().await;
        state.sign_out().await?;
        state.set_user(Some(UserSession::new("user-2")));
        state.toggle_favorite("c").await?;
        remote.release.notify_one();
        Ok::<_, AppError>(())
    };

    let (drained, switched) = tokio::join!(drain, switch_user);
    switched?;
    assert!(matches!(drained, Err(AppError::RemoteSync(_))));

    // The previous user's favorites were not replayed as deletions
    assert_eq!(remote.list("user-1").await?, vec!["a".to_string()]);

    let pending: Vec<String> = state
        .queue()
        .pending()
        .await?
        .into_iter()
        .map(|action| action.recipe_id)
        .collect();
    assert_eq!(pending, vec!["c"]);

    state.sync_offline_actions().await?;
    assert_eq!(remote.list("user-2").await?, vec!["c".to_string()]);
    assert!(state.queue().is_empty().await?);
    Ok(())
}
