use crate::api::logging::emit_profile_lookup_error;
use crate::store::{Collection, ListQuery, RecordStore};
use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::future::Future;
use tokio::sync::watch;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthState {
    pub is_loading: bool,
    pub user: Option<User>,
}

impl AuthState {
    pub fn loading() -> Self {
        Self {
            is_loading: true,
            user: None,
        }
    }

    pub fn signed_out() -> Self {
        Self {
            is_loading: false,
            user: None,
        }
    }

    pub fn signed_in(user: User) -> Self {
        Self {
            is_loading: false,
            user: Some(user),
        }
    }
}

/// Hosted identity service. Subscribers see every auth state change,
/// starting with the current one.
pub trait AuthProvider: Send + Sync {
    fn subscribe(&self) -> watch::Receiver<AuthState>;

    fn login(&self) -> impl Future<Output = Result<User>> + Send;

    fn logout(&self) -> impl Future<Output = Result<()>> + Send;

    /// The signed-in user, or an error when nobody is signed in.
    fn current_user(&self) -> impl Future<Output = Result<User>> + Send;
}

/// Provider that signs in a fixed account without any network round trip.
pub struct MemoryAuthProvider {
    account: User,
    state: watch::Sender<AuthState>,
}

impl MemoryAuthProvider {
    /// Starts in the loading state until [`MemoryAuthProvider::restore`] or
    /// a login resolves it.
    pub fn new(account: User) -> Self {
        let (state, _) = watch::channel(AuthState::loading());
        Self { account, state }
    }

    pub fn signed_in(account: User) -> Self {
        let provider = Self::new(account.clone());
        provider.state.send_replace(AuthState::signed_in(account));
        provider
    }

    /// Resolves the initial loading state as signed out.
    pub fn restore(&self) {
        self.state.send_if_modified(|state| {
            if state.is_loading {
                *state = AuthState::signed_out();
                true
            } else {
                false
            }
        });
    }

    pub fn state(&self) -> AuthState {
        self.state.borrow().clone()
    }
}

impl AuthProvider for MemoryAuthProvider {
    fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.state.subscribe()
    }

    async fn login(&self) -> Result<User> {
        self.state
            .send_replace(AuthState::signed_in(self.account.clone()));
        Ok(self.account.clone())
    }

    async fn logout(&self) -> Result<()> {
        self.state.send_replace(AuthState::signed_out());
        Ok(())
    }

    async fn current_user(&self) -> Result<User> {
        self.state
            .borrow()
            .user
            .clone()
            .ok_or_else(|| anyhow!("no user is signed in"))
    }
}

/// Top-level screen selected from the auth state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppRoute {
    Loading,
    Login,
    Onboarding,
    Home,
}

/// Picks the screen for `state`. Signed-in users without a stored profile go
/// through onboarding; a failed profile lookup is treated the same way.
pub async fn resolve_route<S: RecordStore>(state: &AuthState, store: &S) -> AppRoute {
    if state.is_loading {
        return AppRoute::Loading;
    }
    let Some(user) = &state.user else {
        return AppRoute::Login;
    };

    let query = ListQuery::new().where_eq("userId", user.id.as_str()).limit(1);
    match store.list(Collection::UserProfiles, &query).await {
        Ok(profiles) if !profiles.is_empty() => AppRoute::Home,
        Ok(_) => AppRoute::Onboarding,
        Err(error) => {
            emit_profile_lookup_error(&user.id, &error);
            AppRoute::Onboarding
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryRecordStore;
    use serde_json::{json, Value};

    fn user() -> User {
        User {
            id: "user_1".to_string(),
            email: "sam@example.com".to_string(),
            display_name: None,
        }
    }

    struct FailingStore;

    impl RecordStore for FailingStore {
        async fn create(&self, collection: Collection, _record: Value) -> Result<Value> {
            Err(anyhow!("{collection} is offline"))
        }

        async fn list(&self, collection: Collection, _query: &ListQuery) -> Result<Vec<Value>> {
            Err(anyhow!("{collection} is offline"))
        }
    }

    #[tokio::test]
    async fn test_route_follows_auth_and_profile_state() {
        let store = MemoryRecordStore::new();

        assert_eq!(
            resolve_route(&AuthState::loading(), &store).await,
            AppRoute::Loading
        );
        assert_eq!(
            resolve_route(&AuthState::signed_out(), &store).await,
            AppRoute::Login
        );

        let signed_in = AuthState::signed_in(user());
        assert_eq!(resolve_route(&signed_in, &store).await, AppRoute::Onboarding);

        store
            .create(Collection::UserProfiles, json!({"userId": "user_1"}))
            .await
            .expect("create profile");
        assert_eq!(resolve_route(&signed_in, &store).await, AppRoute::Home);
    }

    #[tokio::test]
    async fn test_profile_lookup_failure_routes_to_onboarding() {
        let _guard = crate::test_support::ENV_LOCK.lock().await;
        let dir = tempfile::tempdir().expect("tempdir");
        let log_path = dir.path().join("auth.log");
        std::env::set_var("CALLAGENT_LOG_PATH", &log_path);

        let route = resolve_route(&AuthState::signed_in(user()), &FailingStore).await;

        std::env::remove_var("CALLAGENT_LOG_PATH");
        assert_eq!(route, AppRoute::Onboarding);
        let logged = std::fs::read_to_string(&log_path).expect("log written");
        assert!(logged.contains("profile_lookup_failed user_id=user_1"));
    }

    #[tokio::test]
    async fn test_memory_provider_publishes_state_changes() {
        let provider = MemoryAuthProvider::new(user());
        let mut rx = provider.subscribe();
        assert!(rx.borrow_and_update().is_loading);
        assert!(provider.current_user().await.is_err());

        provider.restore();
        assert!(rx.has_changed().expect("sender alive"));
        assert_eq!(*rx.borrow_and_update(), AuthState::signed_out());

        let signed_in = provider.login().await.expect("login");
        assert_eq!(signed_in.id, "user_1");
        assert_eq!(rx.borrow_and_update().user.as_ref(), Some(&user()));
        assert_eq!(provider.current_user().await.expect("user").email, "sam@example.com");

        provider.logout().await.expect("logout");
        assert_eq!(provider.state(), AuthState::signed_out());
    }
}
