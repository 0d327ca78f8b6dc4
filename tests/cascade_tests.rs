//! Element resolution cascade tests
//!
//! The cascade is exercised with mock strategy attempts so ordering,
//! short-circuiting and failure collection are verified without a
//! browser.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use ghostdrive::cascade::{exhausted, run_cascade, Strategy, TargetDescriptor};
use ghostdrive::Error;

fn counting_attempt(
    calls: Arc<AtomicUsize>,
    succeed_on: Option<Strategy>,
) -> impl FnMut(Strategy) -> futures::future::BoxFuture<'static, Result<bool, String>> {
    move |strategy| {
        let calls = calls.clone();
        Box::pin(async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(Some(strategy) == succeed_on)
        })
    }
}

#[tokio::test]
async fn test_strategy_k_plus_one_never_runs_after_k_succeeds() {
    for (idx, &winner) in Strategy::CLICK_ORDER.iter().enumerate() {
        let calls = Arc::new(AtomicUsize::new(0));
        let outcome = run_cascade(
            Strategy::CLICK_ORDER,
            counting_attempt(calls.clone(), Some(winner)),
        )
        .await
        .unwrap();
        assert_eq!(outcome.strategy, winner);
        assert_eq!(
            calls.load(Ordering::SeqCst),
            idx + 1,
            "strategies after {winner:?} must not be attempted"
        );
    }
}

#[tokio::test]
async fn test_exhaustion_attempts_every_strategy_once() {
    let calls = Arc::new(AtomicUsize::new(0));
    let failures = run_cascade(Strategy::CLICK_ORDER, counting_attempt(calls.clone(), None))
        .await
        .unwrap_err();
    assert_eq!(calls.load(Ordering::SeqCst), Strategy::CLICK_ORDER.len());
    assert_eq!(failures.len(), Strategy::CLICK_ORDER.len());

    let err = exhausted("Sign In", &failures);
    assert!(matches!(err, Error::ElementNotFound { .. }));
    let msg = err.to_string();
    for strategy in Strategy::CLICK_ORDER {
        assert!(msg.contains(strategy.as_str()), "missing {strategy:?} in {msg}");
    }
}

#[tokio::test]
async fn test_attempt_errors_do_not_stop_the_cascade() {
    let outcome = run_cascade(Strategy::CLICK_ORDER, |strategy| {
        Box::pin(async move {
            match strategy {
                Strategy::Css => Err("invalid selector".to_string()),
                Strategy::ExactText => Err("click intercepted".to_string()),
                Strategy::RoleName => Ok(true),
                _ => Ok(false),
            }
        })
    })
    .await
    .unwrap();
    assert_eq!(outcome.strategy, Strategy::RoleName);
    assert!(outcome.verified);
}

#[tokio::test]
async fn test_coordinate_resolution_is_flagged_unverified() {
    let outcome = run_cascade(Strategy::CLICK_ORDER, |strategy| {
        Box::pin(async move { Ok(strategy == Strategy::Coordinate) })
    })
    .await
    .unwrap();
    assert!(!outcome.verified);
}

#[test]
fn test_descriptor_classification() {
    // structural queries go to the engine's selector machinery
    assert!(TargetDescriptor::new("#signin-button").looks_structural());
    assert!(TargetDescriptor::new("nav .menu > a").looks_structural());
    assert!(TargetDescriptor::new("//button[@id='go']").looks_structural());
    // free text goes to the text strategies
    assert!(!TargetDescriptor::new("Sign In").looks_structural());
    assert!(!TargetDescriptor::new("search the site").looks_structural());
}

#[test]
fn test_descriptor_coordinate_hints_respect_viewport() {
    let desc = TargetDescriptor::new("My Account");
    let (x, y) = desc.known_position((1920, 1080)).unwrap();
    assert!(x > 1700.0 && x < 1920.0);
    assert!(y < 120.0);
    assert!(TargetDescriptor::new("a plain paragraph")
        .known_position((1920, 1080))
        .is_none());
}
