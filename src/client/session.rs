use crate::client::error::ClientError;
use crate::client::manager::AuthManager;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::watch;

/// Reactive projection of the auth state for UI layers. Holds no authority
/// of its own; everything is derived from the token store.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SessionState {
    pub is_authenticated: bool,
    pub user: Option<Value>,
    pub is_loading: bool,
}

/// Subscribes to the store's "auth changed" signal and republishes a
/// derived [`SessionState`], while exposing the imperative auth actions.
/// Loading is `true` from the start of any imperative action until it
/// settles; action errors are returned per call, never persisted here.
#[derive(Debug)]
pub struct SessionBinding {
    manager: AuthManager,
    state: Arc<watch::Sender<SessionState>>,
    resync_shutdown: watch::Sender<bool>,
}

impl SessionBinding {
    #[must_use]
    pub fn new(manager: AuthManager) -> Self {
        let initial = Self::derive_state(&manager, false);
        let (state, _) = watch::channel(initial);
        let state = Arc::new(state);

        let (resync_shutdown, mut shutdown_rx) = watch::channel(false);
        let mut store_rx = manager.store().subscribe();
        let task_manager = manager.clone();
        let task_state = Arc::clone(&state);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    changed = store_rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        // The signal carries no value; re-read the store.
                        task_state.send_modify(|current| {
                            let fresh = Self::derive_state(&task_manager, current.is_loading);
                            *current = fresh;
                        });
                    }
                    _ = shutdown_rx.changed() => break,
                }
            }
        });

        Self { manager, state, resync_shutdown }
    }

    fn derive_state(manager: &AuthManager, is_loading: bool) -> SessionState {
        let store = manager.store();
        SessionState { is_authenticated: store.is_authenticated(), user: store.user(), is_loading }
    }

    /// Current state snapshot plus a stream of updates.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    #[must_use]
    pub fn manager(&self) -> &AuthManager {
        &self.manager
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<Value, ClientError> {
        self.with_loading(self.manager.login(email, password)).await
    }

    pub async fn register(&self, user_data: Value) -> Result<Value, ClientError> {
        self.with_loading(self.manager.register(user_data)).await
    }

    pub async fn refresh(&self) -> Result<(), ClientError> {
        self.with_loading(self.manager.refresh()).await
    }

    pub async fn logout(&self) -> Result<(), ClientError> {
        self.with_loading(self.manager.logout()).await
    }

    async fn with_loading<T>(
        &self,
        action: impl Future<Output = Result<T, ClientError>>,
    ) -> Result<T, ClientError> {
        self.set_loading(true);
        let result = action.await;
        self.set_loading(false);
        result
    }

    fn set_loading(&self, is_loading: bool) {
        self.state.send_modify(|current| {
            let fresh = Self::derive_state(&self.manager, is_loading);
            *current = fresh;
        });
    }
}

impl Drop for SessionBinding {
    fn drop(&mut self) {
        let _ = self.resync_shutdown.send(true);
    }
}
