//! The watchdog firing inside a fully assembled console.

use std::time::Duration;

use reqwest::StatusCode;
use serde_json::json;

mod common;

use common::{client, start_console, test_config};

async fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..100 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    false
}

#[tokio::test]
async fn test_uninitialized_console_is_terminated() {
    let mut config = test_config();
    config.admin.init_timeout_secs = 1;
    let console = start_console(config).await;

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert!(wait_for(|| console.terminations() == 1).await);
    assert!(!console.watchdog.is_armed());

    console.shutdown.trigger();
}

#[tokio::test]
async fn test_initialized_console_survives_deadline() {
    let mut config = test_config();
    config.admin.init_timeout_secs = 1;
    let console = start_console(config).await;

    let res = client()
        .post(console.url("/api/users/admin/init"))
        .json(&json!({ "username": "admin", "password": "a-very-long-password" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(console.terminations(), 0);

    console.shutdown.trigger();
}

#[tokio::test]
async fn test_disabled_watchdog_never_arms() {
    let mut config = test_config();
    config.admin.init_timeout_secs = 1;
    config.admin.watchdog_enabled = false;
    let console = start_console(config).await;

    assert!(!console.watchdog.is_armed());
    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert_eq!(console.terminations(), 0);

    console.shutdown.trigger();
}

#[tokio::test]
async fn test_shutdown_before_deadline_does_not_terminate() {
    let mut config = test_config();
    config.admin.init_timeout_secs = 1;
    let console = start_console(config).await;

    assert!(console.watchdog.is_armed());
    console.shutdown.trigger();
    assert!(wait_for(|| !console.watchdog.is_armed()).await);

    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert_eq!(console.terminations(), 0);
}
