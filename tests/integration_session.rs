//! The reactive session binding: state is derived from the token store, so
//! subscribers see authentication flips no matter which code path caused them.

use std::time::Duration;

use keygate::client::{SessionBinding, SessionState};
use tokio::sync::watch;

mod common;

async fn wait_for_state(
    rx: &mut watch::Receiver<SessionState>,
    predicate: impl Fn(&SessionState) -> bool,
) -> SessionState {
    tokio::time::timeout(Duration::from_secs(5), rx.wait_for(|s| predicate(s)))
        .await
        .expect("state change within timeout")
        .expect("state channel open")
        .clone()
}

#[tokio::test]
async fn test_login_and_logout_drive_state() {
    let app = common::TestApp::spawn().await;
    app.register_user("binding@example.com").await;

    let binding = SessionBinding::new(app.manager());
    let mut rx = binding.subscribe();
    let initial = rx.borrow().clone();
    assert!(!initial.is_authenticated);
    assert!(initial.user.is_none());
    assert!(!initial.is_loading);

    binding.login("binding@example.com", "password12345").await.unwrap();
    let state = wait_for_state(&mut rx, |s| s.is_authenticated && !s.is_loading).await;
    let user = state.user.expect("cached profile");
    assert_eq!(user["email"], "binding@example.com");

    binding.logout().await.unwrap();
    let state = wait_for_state(&mut rx, |s| !s.is_authenticated && !s.is_loading).await;
    assert!(state.user.is_none());
}

#[tokio::test]
async fn test_failed_login_leaves_state_unauthenticated() {
    let app = common::TestApp::spawn().await;
    app.register_user("binding-fail@example.com").await;

    let binding = SessionBinding::new(app.manager());
    let mut rx = binding.subscribe();

    let err = binding.login("binding-fail@example.com", "wrong-password").await;
    assert!(err.is_err(), "login error is returned, not stored");

    let state = wait_for_state(&mut rx, |s| !s.is_loading).await;
    assert!(!state.is_authenticated);
    assert!(state.user.is_none());
}

#[tokio::test]
async fn test_external_store_changes_are_picked_up() {
    let app = common::TestApp::spawn().await;
    app.register_user("binding-ext@example.com").await;

    let binding = SessionBinding::new(app.manager());
    let mut rx = binding.subscribe();

    // A change made straight through the manager, bypassing the binding's
    // own actions, still reaches subscribers via the store signal.
    binding.manager().login("binding-ext@example.com", "password12345").await.unwrap();
    let state = wait_for_state(&mut rx, |s| s.is_authenticated).await;
    assert!(state.user.is_some());

    binding.manager().store().clear().unwrap();
    let state = wait_for_state(&mut rx, |s| !s.is_authenticated).await;
    assert!(state.user.is_none());
}
