//! Periodic expiry checking: proactive refresh inside the five-minute
//! threshold, and silent local teardown once the token is fully expired.

use std::time::Duration;

mod common;

#[tokio::test]
async fn test_healthy_token_is_left_alone() {
    let app = common::TestApp::spawn().await;
    app.register_user("healthy@example.com").await;

    let clock = common::ManualClock::new(1_000_000);
    let manager = app.manager_with_clock(clock.clone(), Duration::from_secs(60));
    manager.login("healthy@example.com", "password12345").await.unwrap();

    manager.check_token_expiry().await.unwrap();
    assert_eq!(app.hits.count("/api/auth/refresh"), 0);
    assert!(manager.store().is_authenticated());
}

#[tokio::test]
async fn test_token_inside_threshold_is_refreshed() {
    let app = common::TestApp::spawn().await;
    app.register_user("soon@example.com").await;

    let clock = common::ManualClock::new(1_000_000);
    let manager = app.manager_with_clock(clock.clone(), Duration::from_secs(60));
    manager.login("soon@example.com", "password12345").await.unwrap();

    // Tokens live 3600s; jump to four minutes before expiry, inside the
    // five-minute refresh threshold.
    clock.advance(3600 * 1000 - 240_000);
    manager.check_token_expiry().await.unwrap();

    assert_eq!(app.hits.count("/api/auth/refresh"), 1);
    assert!(manager.store().is_authenticated());

    // The refreshed pair gets a fresh lifetime, so the next check is quiet.
    manager.check_token_expiry().await.unwrap();
    assert_eq!(app.hits.count("/api/auth/refresh"), 1);
}

#[tokio::test]
async fn test_fully_expired_token_clears_session_without_network() {
    let app = common::TestApp::spawn().await;
    app.register_user("expired@example.com").await;

    let clock = common::ManualClock::new(1_000_000);
    let manager = app.manager_with_clock(clock.clone(), Duration::from_secs(60));
    manager.login("expired@example.com", "password12345").await.unwrap();
    let logins = app.hits.count("/api/login");

    clock.advance(3600 * 1000 + 1);
    manager.check_token_expiry().await.unwrap();

    assert!(manager.store().read().unwrap().is_none(), "session torn down");
    assert_eq!(app.hits.count("/api/auth/refresh"), 0, "no refresh attempt");
    assert_eq!(app.hits.count("/api/logout"), 0, "no server logout call");
    assert_eq!(app.hits.count("/api/login"), logins);
}

#[tokio::test]
async fn test_started_timer_performs_the_refresh() {
    let app = common::TestApp::spawn().await;
    app.register_user("timer@example.com").await;

    let clock = common::ManualClock::new(1_000_000);
    let manager = app.manager_with_clock(clock.clone(), Duration::from_millis(50));
    manager.login("timer@example.com", "password12345").await.unwrap();
    clock.advance(3600 * 1000 - 240_000);

    manager.start();
    tokio::time::sleep(Duration::from_millis(400)).await;
    manager.stop();

    // The first tick inside the threshold refreshes; the new pair's lifetime
    // keeps every later tick quiet.
    assert_eq!(app.hits.count("/api/auth/refresh"), 1);
    assert!(manager.store().is_authenticated());
}

#[tokio::test]
async fn test_stopped_timer_stays_quiet() {
    let app = common::TestApp::spawn().await;
    app.register_user("stopped@example.com").await;

    let clock = common::ManualClock::new(1_000_000);
    let manager = app.manager_with_clock(clock.clone(), Duration::from_millis(50));
    manager.login("stopped@example.com", "password12345").await.unwrap();
    clock.advance(3600 * 1000 - 240_000);

    manager.start();
    manager.stop();
    tokio::time::sleep(Duration::from_millis(400)).await;

    assert_eq!(app.hits.count("/api/auth/refresh"), 0);
}
