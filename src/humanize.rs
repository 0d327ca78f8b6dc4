//! Human interaction simulation
//!
//! Randomized delays, mouse motion and typing noise that statistically
//! resemble human input. All randomness flows through one injected,
//! seedable source so timing and path tests are deterministic.

use std::time::Duration;

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::time::sleep;

/// Upper bound on the jitter added to plain waits, in milliseconds
pub const WAIT_JITTER_MS: u64 = 250;

/// Fraction of eligible characters that get a simulated mistype
const MISTAKE_RATE: f64 = 0.06;

/// Fixed, versioned user-agent pool. Must never be empty.
const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/125.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:127.0) Gecko/20100101 Firefox/127.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.5 Safari/605.1.15",
];

/// QWERTY neighbor rows used to pick plausible mistyped characters
const KEY_ROWS: &[&str] = &["qwertyuiop", "asdfghjkl", "zxcvbnm"];

/// One step of a typing plan
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeStep {
    /// Press the character key
    Char(char),
    /// Press backspace, erasing the previous character
    Backspace,
}

/// Produces human-like delays, motion and typing behavior
pub struct Humanizer {
    rng: Mutex<StdRng>,
    enabled: bool,
    pause_stride: u64,
}

impl Humanizer {
    /// New simulator seeded from OS entropy
    pub fn new(enabled: bool) -> Self {
        Self::from_rng(StdRng::from_os_rng(), enabled)
    }

    /// New simulator with a fixed seed, for deterministic tests
    pub fn with_seed(seed: u64, enabled: bool) -> Self {
        Self::from_rng(StdRng::seed_from_u64(seed), enabled)
    }

    fn from_rng(mut rng: StdRng, enabled: bool) -> Self {
        let pause_stride = rng.random_range(6..=12);
        Self {
            rng: Mutex::new(rng),
            enabled,
            pause_stride,
        }
    }

    /// Whether humanized timing/motion is active for this session
    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Suspend for a uniformly sampled duration in `[min, max)` milliseconds.
    /// Always resumes the caller; never blocks indefinitely.
    pub async fn delay(&self, min: u64, max: u64) {
        let ms = if max > min {
            self.rng.lock().random_range(min..max)
        } else {
            min
        };
        sleep(Duration::from_millis(ms)).await;
    }

    /// Plain wait: exact `ms` when humanization is off, `ms` plus bounded
    /// jitter when it is on
    pub async fn wait_with_jitter(&self, ms: u64) {
        if self.enabled {
            self.delay(ms, ms + WAIT_JITTER_MS).await;
        } else {
            sleep(Duration::from_millis(ms)).await;
        }
    }

    /// Ordered mouse path from `start` to `end` with `points` interior
    /// points on a cubic Bézier curve. The first element is exactly
    /// `start` and the last exactly `end`; control points sit on the
    /// straight-line thirds, offset by bounded jitter.
    pub fn mouse_path(
        &self,
        start: (f64, f64),
        end: (f64, f64),
        points: usize,
    ) -> Vec<(f64, f64)> {
        let (dx, dy) = (end.0 - start.0, end.1 - start.1);
        let bound = (dx.hypot(dy) * 0.2).clamp(2.0, 40.0);
        let (c1, c2) = {
            let mut rng = self.rng.lock();
            let mut jitter = |base: (f64, f64)| {
                (
                    base.0 + rng.random_range(-bound..bound),
                    base.1 + rng.random_range(-bound..bound),
                )
            };
            (
                jitter((start.0 + dx / 3.0, start.1 + dy / 3.0)),
                jitter((start.0 + 2.0 * dx / 3.0, start.1 + 2.0 * dy / 3.0)),
            )
        };

        let mut path = Vec::with_capacity(points + 2);
        path.push(start);
        for i in 1..=points {
            let t = i as f64 / (points + 1) as f64;
            path.push(cubic_bezier(start, c1, c2, end, t));
        }
        path.push(end);
        path
    }

    /// One user agent from the fixed pool
    pub fn user_agent(&self) -> &'static str {
        let idx = self.rng.lock().random_range(0..USER_AGENTS.len());
        USER_AGENTS[idx]
    }

    /// Keystroke sequence for `text`, with occasional mistype-then-correct
    /// noise. The net result of applying the plan always equals `text`.
    pub fn typing_plan(&self, text: &str) -> Vec<TypeStep> {
        self.typing_plan_with_rate(text, MISTAKE_RATE)
    }

    /// Typing plan with an explicit mistake rate; `1.0` forces the mistake
    /// branch on every eligible character, `0.0` forces the clean branch
    pub fn typing_plan_with_rate(&self, text: &str, rate: f64) -> Vec<TypeStep> {
        let mut rng = self.rng.lock();
        let mut plan = Vec::with_capacity(text.chars().count());
        for ch in text.chars() {
            if ch.is_ascii_alphabetic() && rate > 0.0 && rng.random_bool(rate.min(1.0)) {
                plan.push(TypeStep::Char(neighbor_key(ch, &mut rng)));
                plan.push(TypeStep::Backspace);
            }
            plan.push(TypeStep::Char(ch));
        }
        plan
    }

    /// Whether the periodic long pause is due at this action count
    pub fn pause_due(&self, action_count: u64) -> bool {
        self.enabled && action_count > 0 && action_count % self.pause_stride == 0
    }

    /// The longer idle pause inserted every few actions
    pub async fn long_pause(&self) {
        self.delay(1200, 3200).await;
    }

    /// Short pre-interaction hesitation
    pub async fn hesitate(&self) {
        self.delay(120, 450).await;
    }

    /// Inter-keystroke gap
    pub async fn keystroke_gap(&self) {
        self.delay(30, 150).await;
    }
}

fn cubic_bezier(
    p0: (f64, f64),
    p1: (f64, f64),
    p2: (f64, f64),
    p3: (f64, f64),
    t: f64,
) -> (f64, f64) {
    let u = 1.0 - t;
    let (a, b, c, d) = (u * u * u, 3.0 * u * u * t, 3.0 * u * t * t, t * t * t);
    (
        a * p0.0 + b * p1.0 + c * p2.0 + d * p3.0,
        a * p0.1 + b * p1.1 + c * p2.1 + d * p3.1,
    )
}

/// A plausible adjacent key on the same QWERTY row
fn neighbor_key(ch: char, rng: &mut StdRng) -> char {
    let lower = ch.to_ascii_lowercase();
    for row in KEY_ROWS {
        if let Some(pos) = row.find(lower) {
            let candidates: Vec<char> = [pos.checked_sub(1), Some(pos + 1)]
                .into_iter()
                .flatten()
                .filter_map(|i| row.chars().nth(i))
                .collect();
            let picked = candidates[rng.random_range(0..candidates.len())];
            return if ch.is_ascii_uppercase() {
                picked.to_ascii_uppercase()
            } else {
                picked
            };
        }
    }
    ch
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    /// Apply a typing plan to an empty buffer
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

    #[test]
    fn test_mouse_path_endpoints_and_length() {
        let h = Humanizer::with_seed(7, true);
        let start = (10.0, 20.0);
        let end = (300.0, 480.0);
        let path = h.mouse_path(start, end, 12);
        assert_eq!(path.len(), 14);
        assert_eq!(path[0], start);
        assert_eq!(path[13], end);
    }

    #[test]
    fn test_mouse_path_zero_interior_points() {
        let h = Humanizer::with_seed(7, true);
        let path = h.mouse_path((0.0, 0.0), (5.0, 5.0), 0);
        assert_eq!(path, vec![(0.0, 0.0), (5.0, 5.0)]);
    }

    #[test]
    fn test_mouse_path_deterministic_with_seed() {
        let a = Humanizer::with_seed(99, true).mouse_path((0.0, 0.0), (100.0, 50.0), 8);
        let b = Humanizer::with_seed(99, true).mouse_path((0.0, 0.0), (100.0, 50.0), 8);
        assert_eq!(a, b);
    }

    #[test]
    fn test_mouse_path_interior_stays_near_segment() {
        // control jitter is bounded, so no interior point can stray further
        // than the jitter bound from the straight line
        let h = Humanizer::with_seed(3, true);
        let path = h.mouse_path((0.0, 100.0), (400.0, 100.0), 20);
        for (_, y) in &path {
            assert!((y - 100.0).abs() <= 40.0, "point strayed to y={y}");
        }
    }

    #[test]
    fn test_user_agent_never_empty() {
        let h = Humanizer::with_seed(1, true);
        for _ in 0..50 {
            assert!(!h.user_agent().is_empty());
        }
    }

    #[test]
    fn test_typing_plan_clean_branch_fidelity() {
        let h = Humanizer::with_seed(5, true);
        let plan = h.typing_plan_with_rate("Hello, world 42!", 0.0);
        assert_eq!(committed(&plan), "Hello, world 42!");
        assert!(!plan.contains(&TypeStep::Backspace));
    }

    #[test]
    fn test_typing_plan_mistake_branch_fidelity() {
        let h = Humanizer::with_seed(5, true);
        let plan = h.typing_plan_with_rate("Hello, world", 1.0);
        assert_eq!(committed(&plan), "Hello, world");
        assert!(plan.contains(&TypeStep::Backspace));
    }

    #[test]
    fn test_typing_plan_default_rate_fidelity() {
        for seed in 0..20 {
            let h = Humanizer::with_seed(seed, true);
            let plan = h.typing_plan("the quick brown fox");
            assert_eq!(committed(&plan), "the quick brown fox");
        }
    }

    #[test]
    fn test_neighbor_key_same_row() {
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..20 {
            let n = neighbor_key('g', &mut rng);
            assert!("fh".contains(n));
        }
        // non-letter characters come back unchanged
        assert_eq!(neighbor_key('7', &mut rng), '7');
    }

    #[test]
    fn test_pause_due_stride() {
        let h = Humanizer::with_seed(2, true);
        assert!(!h.pause_due(0));
        let due: Vec<u64> = (1..=40).filter(|n| h.pause_due(*n)).collect();
        assert!(!due.is_empty());
        // strides are regular
        if due.len() >= 2 {
            assert_eq!(due[1] - due[0], due[0]);
        }
        let off = Humanizer::with_seed(2, false);
        assert!(!(1..=40).any(|n| off.pause_due(n)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_delay_bounds() {
        let h = Humanizer::with_seed(8, true);
        let start = tokio::time::Instant::now();
        h.delay(500, 750).await;
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(500));
        assert!(elapsed < Duration::from_millis(750));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_without_jitter_is_exact() {
        let h = Humanizer::with_seed(8, false);
        let start = tokio::time::Instant::now();
        h.wait_with_jitter(500).await;
        assert_eq!(start.elapsed(), Duration::from_millis(500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_with_jitter_bounds() {
        let h = Humanizer::with_seed(8, true);
        let start = tokio::time::Instant::now();
        h.wait_with_jitter(500).await;
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(500));
        assert!(elapsed < Duration::from_millis(500 + WAIT_JITTER_MS));
    }
}
