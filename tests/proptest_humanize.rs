//! Property-based tests for the human interaction simulator

use ghostdrive::humanize::{Humanizer, TypeStep};
use proptest::prelude::*;

fn committed(plan: &[TypeStep]) -> String {
    let mut buf = String::new();
    for step in plan {
        match step {
            TypeStep::Char(c) => buf.push(*c),
            TypeStep::Backspace => {
                buf.pop();
            }
        }
    }
    buf
}

proptest! {
    /// For all valid (start, end) pairs the path has n + 2 points and the
    /// exact requested endpoints
    #[test]
    fn mouse_path_endpoints_and_length(
        sx in -200.0..2200.0f64,
        sy in -200.0..1400.0f64,
        ex in -200.0..2200.0f64,
        ey in -200.0..1400.0f64,
        points in 0usize..60,
        seed in any::<u64>(),
    ) {
        let humanizer = Humanizer::with_seed(seed, true);
        let path = humanizer.mouse_path((sx, sy), (ex, ey), points);
        prop_assert_eq!(path.len(), points + 2);
        prop_assert_eq!(path[0], (sx, sy));
        prop_assert_eq!(path[path.len() - 1], (ex, ey));
    }

    /// Same seed, same path: the curve is deterministic given its control
    /// points
    #[test]
    fn mouse_path_is_seed_deterministic(seed in any::<u64>()) {
        let a = Humanizer::with_seed(seed, true).mouse_path((0.0, 0.0), (640.0, 360.0), 15);
        let b = Humanizer::with_seed(seed, true).mouse_path((0.0, 0.0), (640.0, 360.0), 15);
        prop_assert_eq!(a, b);
    }

    /// The committed value equals the requested text exactly, on both the
    /// clean branch and the forced-mistake branch
    #[test]
    fn typing_plan_commits_exact_text(text in "[ -~]{0,40}", seed in any::<u64>()) {
        let humanizer = Humanizer::with_seed(seed, true);
        let clean = humanizer.typing_plan_with_rate(&text, 0.0);
        prop_assert_eq!(committed(&clean), text.clone());
        let noisy = humanizer.typing_plan_with_rate(&text, 1.0);
        prop_assert_eq!(committed(&noisy), text);
    }

    /// The user-agent pool never yields an empty string
    #[test]
    fn user_agent_is_never_empty(seed in any::<u64>()) {
        let humanizer = Humanizer::with_seed(seed, true);
        prop_assert!(!humanizer.user_agent().is_empty());
    }
}
