//! Backend contract and factory tests
//!
//! These cover configuration, selection, and session bookkeeping through
//! the public API. Full browser integration tests live in
//! `live_browser.rs` and require a real engine install.

use ghostdrive::browser::factory::create_backend_with_report;
use ghostdrive::config::{BrowserChoice, DriveConfig, DriverEngine, Viewport};
use ghostdrive::detect::{EngineId, EnvironmentDetector};
use ghostdrive::session::{normalize_url, SessionState};
use ghostdrive::WaitFor;

#[test]
fn test_config_external_names_round_trip() {
    let config = DriveConfig::builder()
        .browser(BrowserChoice::ProtocolSecondary)
        .viewport(1024, 768)
        .timeout_ms(12000)
        .build();
    let json = serde_json::to_value(&config).unwrap();
    assert_eq!(json["browserType"], "protocol-secondary");
    assert_eq!(json["useLowLevelProtocol"], true);
    assert_eq!(json["viewport"]["width"], 1024);
    assert_eq!(json["timeoutMs"], 12000);

    let back: DriveConfig = serde_json::from_value(json).unwrap();
    assert_eq!(back.browser, BrowserChoice::ProtocolSecondary);
    assert_eq!(back.viewport, Viewport { width: 1024, height: 768 });
}

#[test]
fn test_factory_covers_every_choice() {
    let cases = [
        (BrowserChoice::ProtocolPrimary, true, "cdp-chrome"),
        (BrowserChoice::ProtocolPrimary, false, "webdriver-chromium"),
        (BrowserChoice::ProtocolSecondary, true, "hybrid-edge"),
        (BrowserChoice::ProtocolSecondary, false, "webdriver-chromium"),
        (BrowserChoice::DriverDefault, true, "webdriver-chromium"),
    ];
    for (choice, low_level, expected) in cases {
        let config = DriveConfig::builder()
            .browser(choice)
            .use_low_level_protocol(low_level)
            .build();
        let backend = create_backend_with_report(config, None);
        assert_eq!(backend.name(), expected, "{choice:?}/{low_level}");
        assert!(
            !backend.session().initialized,
            "factory must return an uninitialized backend"
        );
    }
}

#[test]
fn test_factory_auto_fallback_without_engines() {
    let report = EnvironmentDetector::detect_with(|_| false);
    assert_eq!(report.engines(), &[EngineId::Driver]);
    let backend = create_backend_with_report(DriveConfig::default(), Some(report));
    assert_eq!(backend.name(), "webdriver-chromium");
}

#[test]
fn test_factory_driver_engine_selection() {
    let config = DriveConfig::builder()
        .browser(BrowserChoice::DriverDefault)
        .driver_engine(DriverEngine::Webkit)
        .build();
    let backend = create_backend_with_report(config, None);
    assert_eq!(backend.name(), "webdriver-webkit");
}

#[test]
fn test_wait_condition_parsing() {
    assert_eq!(WaitFor::parse("750"), WaitFor::Millis(750));
    assert_eq!(WaitFor::parse("load"), WaitFor::Load);
    assert_eq!(WaitFor::parse("network-idle"), WaitFor::NetworkIdle);
    assert_eq!(WaitFor::parse("navigation"), WaitFor::Navigation);
    assert_eq!(
        WaitFor::parse("Checkout button"),
        WaitFor::Visible("Checkout button".to_string())
    );
}

#[test]
fn test_operations_before_initialize_are_typed_errors() {
    tokio_test::block_on(async {
        let config = DriveConfig::builder()
            .browser(BrowserChoice::DriverDefault)
            .build();
        let mut backend = create_backend_with_report(config, None);
        let err = backend.navigate("example.com").await.unwrap_err();
        assert!(matches!(err, ghostdrive::Error::NotInitialized));
        let err = backend.click("Sign In").await.unwrap_err();
        assert!(matches!(err, ghostdrive::Error::NotInitialized));
    });
}

#[test]
fn test_session_history_rules() {
    let mut state = SessionState::default();
    // the first navigation pushes nothing
    state.record_navigation(normalize_url("example.com"));
    assert_eq!(state.current_url.as_deref(), Some("https://example.com"));
    assert!(state.history.is_empty());
    // later navigations grow history from the non-null prior URL
    state.record_navigation(normalize_url("https://example.org/a"));
    state.record_navigation(normalize_url("example.net"));
    assert_eq!(
        state.history,
        vec!["https://example.com", "https://example.org/a"]
    );
}
