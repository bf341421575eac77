//! # Application State
//!
//! Single owner of the favorite set, the signed-in user, connectivity, push
//! settings and the offline action queue. Its methods are the only mutation
//! surface; every change is persisted before it becomes visible in memory.

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::connectivity::ConnectivityMonitor;
use crate::error::{AppError, AppResult};
use crate::favorites::FavoriteSet;
use crate::offline_queue::{ActionKind, DrainOutcome, FavoriteAction, OfflineActionQueue};
use crate::remote::{apply_membership, RemoteFavoriteStore};
use crate::settings::{PushNotificationSettings, SettingsPatch};
use crate::storage::{
    read_json, write_json, KeyValueStore, FAVORITES_KEY, PUSH_SETTINGS_KEY,
};

/// Authenticated user as handed over by the auth provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserSession {
    pub id: String,
    pub email: Option<String>,
}

impl UserSession {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            email: None,
        }
    }
}

/// Result of asking for offline actions to be synced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Nobody is signed in; the log is kept for later
    NotSignedIn,
    Drained(DrainOutcome),
}

fn read_lock<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write_lock<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

pub struct AppState {
    store: Arc<dyn KeyValueStore>,
    remote: Arc<dyn RemoteFavoriteStore>,
    queue: OfflineActionQueue,
    connectivity: ConnectivityMonitor,
    favorites: RwLock<FavoriteSet>,
    settings: RwLock<PushNotificationSettings>,
    user: RwLock<Option<UserSession>>,
    // Held across the read-persist-commit cycle of every local mutation
    mutation_lock: Mutex<()>,
}

impl AppState {
    /// Restore persisted favorites and settings
    ///
    /// Missing or malformed values fall back to defaults.
    pub async fn load(
        store: Arc<dyn KeyValueStore>,
        remote: Arc<dyn RemoteFavoriteStore>,
    ) -> AppResult<Self> {
        let favorites: FavoriteSet = read_json(store.as_ref(), FAVORITES_KEY)
            .await?
            .unwrap_or_default();
        let settings: PushNotificationSettings = read_json(store.as_ref(), PUSH_SETTINGS_KEY)
            .await?
            .unwrap_or_default();

        info!(favorites = favorites.len(), "Application state loaded");

        Ok(Self {
            queue: OfflineActionQueue::new(Arc::clone(&store)),
            store,
            remote,
            connectivity: ConnectivityMonitor::new(),
            favorites: RwLock::new(favorites),
            settings: RwLock::new(settings),
            user: RwLock::new(None),
            mutation_lock: Mutex::new(()),
        })
    }

    pub fn user(&self) -> Option<UserSession> {
        read_lock(&self.user).clone()
    }

    pub fn set_user(&self, session: Option<UserSession>) {
        debug!(signed_in = session.is_some(), "Session changed");
        *write_lock(&self.user) = session;
    }

    pub fn is_offline(&self) -> bool {
        self.connectivity.is_offline()
    }

    pub fn favorites(&self) -> FavoriteSet {
        read_lock(&self.favorites).clone()
    }

    pub fn is_favorite(&self, recipe_id: &str) -> bool {
        read_lock(&self.favorites).contains(recipe_id)
    }

    pub fn push_settings(&self) -> PushNotificationSettings {
        *read_lock(&self.settings)
    }

    pub fn queue(&self) -> &OfflineActionQueue {
        &self.queue
    }

    /// Flip a recipe's favorite membership, returning the new membership
    ///
    /// Offline, the toggle is queued for the next drain. Online and signed
    /// in, the new membership is written to the remote store right away;
    /// remote failures are logged and do not undo the local change.
    pub async fn toggle_favorite(&self, recipe_id: &str) -> AppResult<bool> {
        let _mutation = self.mutation_lock.lock().await;

        let (next, favorited) = read_lock(&self.favorites).toggled(recipe_id);
        let offline = self.is_offline();

        if offline {
            if let Err(e) = self
                .queue
                .enqueue(FavoriteAction::toggle_favorite(recipe_id))
                .await
            {
                error!(recipe_id = %recipe_id, error = %e, "Failed to queue offline toggle");
                return Err(e);
            }
        }

        if let Err(e) = write_json(self.store.as_ref(), FAVORITES_KEY, &next).await {
            error!(recipe_id = %recipe_id, error = %e, "Failed to persist favorites");
            return Err(e);
        }
        *write_lock(&self.favorites) = next;

        info!(recipe_id = %recipe_id, favorited, offline, "Favorite toggled");

        if !offline {
            if let Some(user) = self.user() {
                if let Err(e) =
                    apply_membership(self.remote.as_ref(), &user.id, recipe_id, favorited).await
                {
                    warn!(recipe_id = %recipe_id, error = %e, "Failed to sync favorite with server");
                }
            }
        }

        Ok(favorited)
    }

    /// Feed a connectivity signal; drains the queue when coming online
    pub async fn set_connectivity(&self, online: bool) -> AppResult<Option<SyncOutcome>> {
        if self.connectivity.observe(online) {
            info!("Connectivity restored, syncing offline actions");
            return self.sync_offline_actions().await.map(Some);
        }
        Ok(None)
    }

    /// Replay queued actions using each recipe's current membership
    ///
    /// A session change while the pass runs abandons it, so a sign-out never
    /// replays the cleared favorite set against the previous user.
    pub async fn sync_offline_actions(&self) -> AppResult<SyncOutcome> {
        let Some(user) = self.user() else {
            debug!("Not signed in, offline actions stay queued");
            return Ok(SyncOutcome::NotSignedIn);
        };

        let outcome = self
            .queue
            .drain(|action| {
                let session_changed = self.user().as_ref() != Some(&user);
                let favorited = match action.kind {
                    ActionKind::ToggleFavorite => self.is_favorite(&action.recipe_id),
                };
                let remote = Arc::clone(&self.remote);
                let user_id = user.id.clone();
                let recipe_id = action.recipe_id.clone();
                async move {
                    if session_changed {
                        return Err(AppError::RemoteSync(
                            "session changed during sync".to_string(),
                        ));
                    }
                    apply_membership(remote.as_ref(), &user_id, &recipe_id, favorited).await
                }
            })
            .await?;

        Ok(SyncOutcome::Drained(outcome))
    }

    /// Merge and persist push settings; mirrored remotely when online
    pub async fn update_push_settings(
        &self,
        patch: SettingsPatch,
    ) -> AppResult<PushNotificationSettings> {
        let Some(user) = self.user() else {
            return Err(AppError::Auth(
                "sign in to change notification settings".to_string(),
            ));
        };

        let _mutation = self.mutation_lock.lock().await;
        let merged = self.push_settings().merged(patch);
        write_json(self.store.as_ref(), PUSH_SETTINGS_KEY, &merged).await?;
        *write_lock(&self.settings) = merged;

        if !self.is_offline() {
            if let Err(e) = self.remote.upsert_settings(&user.id, &merged).await {
                warn!(error = %e, "Failed to sync push settings with server");
            }
        }

        Ok(merged)
    }

    /// Forget the session and every locally persisted value
    pub async fn sign_out(&self) -> AppResult<()> {
        let _mutation = self.mutation_lock.lock().await;

        self.queue.clear().await?;
        self.store.remove(FAVORITES_KEY).await?;
        self.store.remove(PUSH_SETTINGS_KEY).await?;

        *write_lock(&self.favorites) = FavoriteSet::new();
        *write_lock(&self.settings) = PushNotificationSettings::default();
        self.set_user(None);

        info!("Signed out and cleared local state");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::MemoryFavoriteStore;
    use crate::storage::{MemoryKeyValueStore, OFFLINE_ACTIONS_KEY};

    async fn setup() -> (AppState, Arc<MemoryKeyValueStore>, Arc<MemoryFavoriteStore>) {
        let store = Arc::new(MemoryKeyValueStore::new());
        let remote = Arc::new(MemoryFavoriteStore::new());
        let state = AppState::load(store.clone(), remote.clone()).await.unwrap();
        state.set_user(Some(UserSession::new("u1")));
        (state, store, remote)
    }

    #[tokio::test]
    async fn test_online_toggle_writes_through() {
        let (state, store, remote) = setup().await;
        state.set_connectivity(true).await.unwrap();

        assert!(state.toggle_favorite("52772").await.unwrap());
        assert!(state.is_favorite("52772"));
        assert_eq!(remote.list("u1").await.unwrap(), vec!["52772".to_string()]);
        assert_eq!(
            store.get(FAVORITES_KEY).await.unwrap(),
            Some(r#"["52772"]"#.to_string())
        );
        assert!(state.queue().is_empty().await.unwrap());

        assert!(!state.toggle_favorite("52772").await.unwrap());
        assert!(remote.list("u1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_offline_toggle_is_queued_then_drained() {
        let (state, _store, remote) = setup().await;
        state.set_connectivity(false).await.unwrap();

        state.toggle_favorite("1").await.unwrap();
        state.toggle_favorite("2").await.unwrap();
        state.toggle_favorite("1").await.unwrap();
        state.toggle_favorite("1").await.unwrap();

        assert_eq!(state.queue().len().await.unwrap(), 4);
        assert!(remote.list("u1").await.unwrap().is_empty());

        let outcome = state.set_connectivity(true).await.unwrap();
        assert_eq!(
            outcome,
            Some(SyncOutcome::Drained(DrainOutcome::Completed {
                entries: 4,
                applied: 2
            }))
        );
        assert_eq!(
            remote.list("u1").await.unwrap(),
            vec!["1".to_string(), "2".to_string()]
        );
        assert!(state.queue().is_empty().await.unwrap());
    }

    #[tokio::test]
    async fn test_staying_online_does_not_drain() {
        let (state, _store, _remote) = setup().await;
        assert!(state.set_connectivity(true).await.unwrap().is_some());
        assert_eq!(state.set_connectivity(true).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_drain_waits_for_sign_in() {
        let (state, _store, remote) = setup().await;
        state.set_user(None);
        state.set_connectivity(false).await.unwrap();
        state.toggle_favorite("1").await.unwrap();

        let outcome = state.set_connectivity(true).await.unwrap();
        assert_eq!(outcome, Some(SyncOutcome::NotSignedIn));
        assert_eq!(state.queue().len().await.unwrap(), 1);

        state.set_user(Some(UserSession::new("u1")));
        state.sync_offline_actions().await.unwrap();
        assert_eq!(remote.list("u1").await.unwrap(), vec!["1".to_string()]);
    }

    #[tokio::test]
    async fn test_state_reloads_from_store() {
        let (state, store, remote) = setup().await;
        state.toggle_favorite("7").await.unwrap();

        let reloaded = AppState::load(store, remote).await.unwrap();
        assert!(reloaded.is_favorite("7"));
    }

    #[tokio::test]
    async fn test_push_settings_require_user() {
        let (state, _store, remote) = setup().await;
        state.set_connectivity(true).await.unwrap();

        let patch = SettingsPatch {
            new_recipes: Some(false),
            ..Default::default()
        };
        let merged = state.update_push_settings(patch).await.unwrap();
        assert!(!merged.new_recipes);
        assert_eq!(remote.settings_for("u1").await, Some(merged));

        state.set_user(None);
        let err = state.update_push_settings(patch).await.unwrap_err();
        assert!(matches!(err, AppError::Auth(_)));
        assert!(err.is_user_facing());
    }

    #[tokio::test]
    async fn test_sign_out_clears_local_state() {
        let (state, store, _remote) = setup().await;
        state.set_connectivity(false).await.unwrap();
        state.toggle_favorite("1").await.unwrap();

        state.sign_out().await.unwrap();

        assert!(state.favorites().is_empty());
        assert!(state.user().is_none());
        assert_eq!(store.get(FAVORITES_KEY).await.unwrap(), None);
        assert_eq!(store.get(OFFLINE_ACTIONS_KEY).await.unwrap(), None);
    }
}
