//! End-to-end scenarios against a real engine
//!
//! These tests drive a live browser and are ignored by default. Run them
//! with `cargo test -- --ignored` on a host with Chrome/Chromium installed
//! (or a WebDriver endpoint listening for the fallback backend).

use ghostdrive::browser::create_backend;
use ghostdrive::config::DriveConfig;
use ghostdrive::{ContentKind, PageContent, WaitFor};

fn test_config() -> DriveConfig {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("ghostdrive=debug")
        .try_init();
    DriveConfig::builder()
        .humanize(false)
        .rng_seed(7)
        .timeout_ms(20000)
        .build()
}

#[tokio::test]
#[ignore = "requires a local browser engine"]
async fn navigate_prepends_scheme_and_tracks_history() {
    let mut session = create_backend(test_config());
    assert!(session.initialize().await, "no usable backend on this host");

    // fresh session: scheme auto-prepended, nothing pushed to history
    assert!(session.navigate("example.com").await.unwrap());
    let url = session.current_url().await.unwrap();
    assert!(url.starts_with("https://example.com"), "got {url}");
    assert!(session.session().history.is_empty());

    // second navigation grows history from the non-null prior URL
    assert!(session.navigate("example.org").await.unwrap());
    assert_eq!(session.session().history.len(), 1);

    session.close().await.unwrap();
}

#[tokio::test]
#[ignore = "requires a local browser engine"]
async fn click_with_no_matching_element_reports_failure() {
    let mut session = create_backend(test_config());
    assert!(session.initialize().await, "no usable backend on this host");
    assert!(session.navigate("example.com").await.unwrap());
    let before = session.current_url().await.unwrap();

    // a descriptor no strategy can satisfy: no structural match, no text,
    // no attribute, and no positional hint
    let clicked = session.click("Frobnicate the quux widget").await.unwrap();
    assert!(!clicked);
    assert_eq!(session.current_url().await.unwrap(), before);

    session.close().await.unwrap();
}

#[tokio::test]
#[ignore = "requires a local browser engine"]
async fn extract_and_wait_round_trip() {
    let mut session = create_backend(test_config());
    assert!(session.initialize().await, "no usable backend on this host");
    assert!(session.navigate("example.com").await.unwrap());
    assert!(session.wait(WaitFor::NetworkIdle).await.unwrap());

    let title = session.title().await.unwrap();
    assert!(title.to_lowercase().contains("example"));

    match session.extract_content(ContentKind::Text).await.unwrap() {
        PageContent::Text(text) => assert!(text.contains("illustrative examples")),
        other => panic!("expected text content, got {other:?}"),
    }

    let value = session
        .evaluate("1 + arguments[0]", vec![serde_json::json!(41)])
        .await
        .unwrap();
    assert_eq!(value, serde_json::json!(42));

    session.close().await.unwrap();
}
