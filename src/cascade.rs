//! Element resolution cascade
//!
//! Turns a loosely-specified target description into a concrete element and
//! performs the requested action. Strategies are an explicit ordered list
//! evaluated by a small combinator that short-circuits on first success and
//! collects failure reasons for diagnostics; each backend supplies its own
//! attempt function over its transport.

use futures::future::BoxFuture;
use tracing::debug;

use crate::error::Error;

/// One locator strategy in the cascade, ordered by priority
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Strategy {
    /// The descriptor interpreted literally as a structural query
    Css,
    /// Exact visible-text match
    ExactText,
    /// Accessible role + name match
    RoleName,
    /// Case-insensitive attribute substring (aria-label, id, name,
    /// placeholder, title)
    AttributeSubstring,
    /// Synthesized ancestor/descendant text-containment path
    StructuralPath,
    /// Script-injected full-DOM scan with relaxed word-overlap matching
    DomScan,
    /// Last-resort click at a heuristic viewport position
    Coordinate,
}

impl Strategy {
    /// Strategy order for click actions
    pub const CLICK_ORDER: &'static [Strategy] = &[
        Strategy::Css,
        Strategy::ExactText,
        Strategy::RoleName,
        Strategy::AttributeSubstring,
        Strategy::StructuralPath,
        Strategy::DomScan,
        Strategy::Coordinate,
    ];

    /// Strategy order for typing actions (no coordinate fallback: typing
    /// blind would violate the content-fidelity guarantee)
    pub const TYPE_ORDER: &'static [Strategy] = &[
        Strategy::Css,
        Strategy::ExactText,
        Strategy::RoleName,
        Strategy::AttributeSubstring,
        Strategy::StructuralPath,
        Strategy::DomScan,
    ];

    /// Strategy order for locate-only probes
    pub const EXTRACT_ORDER: &'static [Strategy] = Strategy::TYPE_ORDER;

    /// Stable name used in logs and failure trails
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::Css => "css",
            Strategy::ExactText => "exact-text",
            Strategy::RoleName => "role-name",
            Strategy::AttributeSubstring => "attribute",
            Strategy::StructuralPath => "structural-path",
            Strategy::DomScan => "dom-scan",
            Strategy::Coordinate => "coordinate",
        }
    }
}

/// The action a cascade run is resolving for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionRequest {
    /// Click the resolved element
    Click,
    /// Focus the resolved element so the caller can type into it
    Type(String),
    /// Locate only; no DOM mutation
    Extract,
}

/// Successful cascade outcome: which strategy landed the action
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    /// The strategy that succeeded
    pub strategy: Strategy,
    /// False only for coordinate clicks, which cannot confirm they hit
    /// the intended element
    pub verified: bool,
}

/// One failed strategy attempt, kept for diagnostics
#[derive(Debug, Clone)]
pub struct StrategyFailure {
    /// The strategy that was attempted
    pub strategy: Strategy,
    /// Why it did not complete the action
    pub reason: String,
}

/// Run the ordered strategies, stopping at the first that both finds a
/// node and completes the action. `attempt` returns `Ok(true)` on success,
/// `Ok(false)` when the strategy found nothing applicable, and `Err` when
/// it found a node but the action failed. Strategies run strictly
/// sequentially; a failed attempt must leave the page usable for the next.
pub async fn run_cascade<'a, F>(
    order: &[Strategy],
    mut attempt: F,
) -> std::result::Result<Resolution, Vec<StrategyFailure>>
where
    F: FnMut(Strategy) -> BoxFuture<'a, std::result::Result<bool, String>>,
{
    let mut failures = Vec::new();
    for &strategy in order {
        match attempt(strategy).await {
            Ok(true) => {
                debug!(strategy = strategy.as_str(), "cascade resolved");
                return Ok(Resolution {
                    strategy,
                    verified: strategy != Strategy::Coordinate,
                });
            }
            Ok(false) => failures.push(StrategyFailure {
                strategy,
                reason: "no matching node".to_string(),
            }),
            Err(reason) => failures.push(StrategyFailure { strategy, reason }),
        }
    }
    Err(failures)
}

/// Convert a cascade failure trail into the typed error
pub fn exhausted(target: &str, failures: &[StrategyFailure]) -> Error {
    let attempts: Vec<(&'static str, String)> = failures
        .iter()
        .map(|f| (f.strategy.as_str(), f.reason.clone()))
        .collect();
    Error::element_not_found(target, &attempts)
}

/// The input to resolution: a free-form string that may be a structural
/// locator, visible text, an accessible name, or a coordinate hint.
/// Immutable per call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetDescriptor {
    raw: String,
}

const STRUCTURAL_TAGS: &[&str] = &[
    "a", "button", "input", "select", "textarea", "form", "nav", "header", "footer", "main",
    "article", "aside", "img", "iframe", "label", "table", "ul", "ol", "li", "h1", "h2", "h3",
    "div", "span", "p",
];

impl TargetDescriptor {
    /// Wrap a raw descriptor string
    pub fn new<S: Into<String>>(raw: S) -> Self {
        Self { raw: raw.into() }
    }

    /// The raw descriptor text
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Lowercased alphanumeric words of the descriptor
    pub fn words(&self) -> Vec<String> {
        self.raw
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .map(|w| w.to_lowercase())
            .collect()
    }

    /// Whether the descriptor plausibly is a structural query worth
    /// handing to the engine's selector machinery
    pub fn looks_structural(&self) -> bool {
        let raw = self.raw.trim();
        if raw.is_empty() {
            return false;
        }
        if raw.starts_with("//") || raw.starts_with("./") {
            return true;
        }
        if raw.contains(char::is_whitespace) {
            // "div > a" style combinators are the only structural queries
            // with spaces we accept
            return raw.contains('>') || raw.contains('[');
        }
        if raw.starts_with('#') || raw.starts_with('.') || raw.starts_with('[') {
            return true;
        }
        if raw.chars().any(|c| "[]>:*=".contains(c)) {
            return true;
        }
        STRUCTURAL_TAGS.contains(&raw.to_lowercase().as_str())
    }

    /// Heuristic viewport position for descriptors naming well-known UI
    /// placements. Used only by the coordinate strategy.
    pub fn known_position(&self, viewport: (u32, u32)) -> Option<(f64, f64)> {
        let (w, h) = (viewport.0 as f64, viewport.1 as f64);
        let lower = self.raw.to_lowercase();
        let hit = |needles: &[&str]| needles.iter().any(|n| lower.contains(n));

        if hit(&["sign in", "log in", "login", "account", "profile", "avatar"]) {
            Some((w * 0.93, h * 0.06))
        } else if hit(&["search"]) {
            Some((w * 0.5, h * 0.07))
        } else if hit(&["menu", "hamburger"]) {
            Some((w * 0.04, h * 0.06))
        } else if hit(&["accept", "cookie", "consent"]) {
            Some((w * 0.5, h * 0.88))
        } else {
            None
        }
    }
}

const XPATH_UPPER: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const XPATH_LOWER: &str = "abcdefghijklmnopqrstuvwxyz";

/// Quote a string as an XPath literal, falling back to `concat()` when it
/// mixes both quote characters
pub fn xpath_literal(s: &str) -> String {
    if !s.contains('\'') {
        format!("'{s}'")
    } else if !s.contains('"') {
        format!("\"{s}\"")
    } else {
        let parts: Vec<String> = s
            .split('\'')
            .map(|part| format!("'{part}'"))
            .collect();
        format!("concat({})", parts.join(", \"'\", "))
    }
}

/// XPath for an exact visible-text match
pub fn xpath_exact_text(desc: &TargetDescriptor) -> String {
    let lit = xpath_literal(desc.raw().trim());
    format!(
        "//button[normalize-space(.) = {lit}] \
         | //a[normalize-space(.) = {lit}] \
         | //input[@value = {lit}] \
         | //*[normalize-space(text()) = {lit}]"
    )
}

/// XPath for an accessible role + name match
pub fn xpath_role_name(desc: &TargetDescriptor, action: &ActionRequest) -> String {
    let lit = xpath_literal(desc.raw().trim());
    match action {
        ActionRequest::Type(_) => format!(
            "//*[(self::input or self::textarea or @role='textbox' or @role='searchbox' or @role='combobox') \
             and (@aria-label = {lit} or @placeholder = {lit} or @name = {lit})]"
        ),
        _ => format!(
            "//*[(self::button or self::a or @role='button' or @role='link' or @role='menuitem' or @role='tab') \
             and (normalize-space(.) = {lit} or @aria-label = {lit})]"
        ),
    }
}

/// XPath for a case-insensitive attribute substring match
pub fn xpath_attribute_substring(desc: &TargetDescriptor) -> String {
    let lower = xpath_literal(&desc.raw().trim().to_lowercase());
    let contains = |attr: &str| {
        format!("contains(translate(@{attr}, '{XPATH_UPPER}', '{XPATH_LOWER}'), {lower})")
    };
    format!(
        "//*[{} or {} or {} or {} or {}]",
        contains("aria-label"),
        contains("id"),
        contains("name"),
        contains("placeholder"),
        contains("title"),
    )
}

/// XPath synthesized from the descriptor's words: an ancestor containing
/// the first word with a descendant containing the last
pub fn xpath_structural_path(desc: &TargetDescriptor) -> Option<String> {
    let words = desc.words();
    match words.as_slice() {
        [] => None,
        [only] => Some(format!(
            "//*[contains(normalize-space(text()), {})]",
            xpath_literal(only)
        )),
        [first, .., last] => Some(format!(
            "//*[contains(normalize-space(.), {})]//*[contains(normalize-space(text()), {})]",
            xpath_literal(first),
            xpath_literal(last)
        )),
    }
}

/// In-page script: evaluate `xpath`, check visibility, perform the action
/// on the first match. Resolves to `true` when the action was performed.
pub fn xpath_action_script(xpath: &str, action: &ActionRequest) -> String {
    let xpath_js = serde_json::Value::String(xpath.to_string());
    format!(
        r#"(() => {{
    const result = document.evaluate({xpath_js}, document, null, XPathResult.FIRST_ORDERED_NODE_TYPE, null);
    const el = result.singleNodeValue;
    if (!el) return false;
    const rect = el.getBoundingClientRect();
    if (rect.width === 0 || rect.height === 0) return false;
    {}
    return true;
}})()"#,
        action_stmt(action)
    )
}

/// In-page script: scan the whole DOM for the best relaxed match (text
/// overlapping at least half the descriptor's words) and perform the
/// action on it. Resolves to `true` when a candidate was found.
pub fn dom_scan_script(desc: &TargetDescriptor, action: &ActionRequest) -> String {
    let words = serde_json::to_string(&desc.words()).unwrap_or_else(|_| "[]".to_string());
    let needle = serde_json::Value::String(desc.raw().trim().to_lowercase());
    let selector = match action {
        ActionRequest::Type(_) => "input, textarea, [contenteditable='true']",
        _ => "a, button, input, select, [role='button'], [role='link'], [onclick], [tabindex]",
    };
    format!(
        r#"(() => {{
    const words = {words};
    const needle = {needle};
    const visible = (el) => {{
        const rect = el.getBoundingClientRect();
        return rect.width > 0 && rect.height > 0;
    }};
    const score = (text) => {{
        if (!text) return 0;
        const hay = text.toLowerCase();
        if (needle && hay.includes(needle)) return 1;
        if (words.length === 0) return 0;
        let hits = 0;
        for (const w of words) if (hay.includes(w)) hits++;
        return hits / words.length;
    }};
    let best = null;
    let bestScore = 0;
    for (const el of document.querySelectorAll("{selector}")) {{
        if (!visible(el)) continue;
        const text = el.innerText || el.value || el.getAttribute('aria-label')
            || el.getAttribute('placeholder') || el.getAttribute('title') || '';
        const s = score(text);
        if (s >= 0.5 && s > bestScore) {{
            best = el;
            bestScore = s;
            if (s >= 1) break;
        }}
    }}
    if (!best) return false;
    {}
    return true;
}})()"#,
        action_stmt_on("best", action)
    )
}

/// In-page script resolving to `true` once any candidate for the
/// descriptor is visible. Used by `wait(target)` conditions.
pub fn visibility_probe_script(desc: &TargetDescriptor) -> String {
    if desc.looks_structural() {
        let selector = serde_json::Value::String(desc.raw().to_string());
        format!(
            r#"(() => {{
    let el = null;
    try {{ el = document.querySelector({selector}); }} catch (e) {{ return false; }}
    if (!el) return false;
    const rect = el.getBoundingClientRect();
    return rect.width > 0 && rect.height > 0;
}})()"#
        )
    } else {
        dom_scan_script(desc, &ActionRequest::Extract)
    }
}

fn action_stmt(action: &ActionRequest) -> String {
    action_stmt_on("el", action)
}

fn action_stmt_on(var: &str, action: &ActionRequest) -> String {
    match action {
        ActionRequest::Click => format!("{var}.click();"),
        ActionRequest::Type(_) => format!("{var}.focus();"),
        ActionRequest::Extract => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_cascade_short_circuits_on_first_success() {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_in = calls.clone();
        let outcome = run_cascade(Strategy::CLICK_ORDER, move |strategy| {
            let calls = calls_in.clone();
            Box::pin(async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(strategy == Strategy::ExactText)
            })
        })
        .await
        .unwrap();

        assert_eq!(outcome.strategy, Strategy::ExactText);
        assert!(outcome.verified);
        // css failed, exact-text succeeded, nothing after was attempted
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_cascade_collects_all_failures_on_exhaustion() {
        let failures = run_cascade(Strategy::TYPE_ORDER, |strategy| {
            Box::pin(async move {
                if strategy == Strategy::RoleName {
                    Err("focus rejected".to_string())
                } else {
                    Ok(false)
                }
            })
        })
        .await
        .unwrap_err();

        assert_eq!(failures.len(), Strategy::TYPE_ORDER.len());
        let role = failures
            .iter()
            .find(|f| f.strategy == Strategy::RoleName)
            .unwrap();
        assert_eq!(role.reason, "focus rejected");

        let err = exhausted("Sign In", &failures);
        let msg = err.to_string();
        assert!(msg.contains("Sign In"));
        assert!(msg.contains("role-name: focus rejected"));
    }

    #[tokio::test]
    async fn test_coordinate_success_is_unverified() {
        let outcome = run_cascade(Strategy::CLICK_ORDER, |strategy| {
            Box::pin(async move { Ok(strategy == Strategy::Coordinate) })
        })
        .await
        .unwrap();
        assert_eq!(outcome.strategy, Strategy::Coordinate);
        assert!(!outcome.verified);
    }

    #[test]
    fn test_type_order_has_no_coordinate_strategy() {
        assert!(!Strategy::TYPE_ORDER.contains(&Strategy::Coordinate));
        assert_eq!(
            Strategy::CLICK_ORDER.last().copied(),
            Some(Strategy::Coordinate)
        );
    }

    #[test]
    fn test_descriptor_words() {
        let desc = TargetDescriptor::new("Sign In / Register");
        assert_eq!(desc.words(), vec!["sign", "in", "register"]);
    }

    #[test]
    fn test_looks_structural() {
        for raw in ["#login", ".btn-primary", "button", "//div[@id='x']", "input[name=q]", "div > a"] {
            assert!(TargetDescriptor::new(raw).looks_structural(), "{raw}");
        }
        for raw in ["Sign In", "search the docs", "", "Accept cookies"] {
            assert!(!TargetDescriptor::new(raw).looks_structural(), "{raw:?}");
        }
    }

    #[test]
    fn test_known_position_hints() {
        let viewport = (1000, 800);
        let pos = TargetDescriptor::new("Sign In")
            .known_position(viewport)
            .unwrap();
        assert!(pos.0 > 900.0 && pos.1 < 60.0);
        assert!(TargetDescriptor::new("Search")
            .known_position(viewport)
            .is_some());
        assert!(TargetDescriptor::new("the weather")
            .known_position(viewport)
            .is_none());
    }

    #[test]
    fn test_xpath_literal_quoting() {
        assert_eq!(xpath_literal("plain"), "'plain'");
        assert_eq!(xpath_literal("it's"), "\"it's\"");
        let mixed = xpath_literal(r#"it's "x""#);
        assert!(mixed.starts_with("concat("));
        assert!(mixed.contains("\"'\""));
    }

    #[test]
    fn test_xpath_builders_embed_descriptor() {
        let desc = TargetDescriptor::new("Sign In");
        assert!(xpath_exact_text(&desc).contains("normalize-space(.) = 'Sign In'"));
        assert!(xpath_role_name(&desc, &ActionRequest::Click).contains("@role='button'"));
        assert!(
            xpath_role_name(&desc, &ActionRequest::Type(String::new()))
                .contains("@placeholder = 'Sign In'")
        );
        assert!(xpath_attribute_substring(&desc).contains("'sign in'"));
    }

    #[test]
    fn test_xpath_structural_path_shapes() {
        assert!(xpath_structural_path(&TargetDescriptor::new("")).is_none());
        let single = xpath_structural_path(&TargetDescriptor::new("Search")).unwrap();
        assert!(single.contains("contains(normalize-space(text()), 'search')"));
        let multi = xpath_structural_path(&TargetDescriptor::new("Create new project")).unwrap();
        assert!(multi.contains("'create'"));
        assert!(multi.contains("'project'"));
    }

    #[test]
    fn test_scan_script_embeds_words_and_action() {
        let desc = TargetDescriptor::new("Add to cart");
        let click = dom_scan_script(&desc, &ActionRequest::Click);
        assert!(click.contains("[\"add\",\"to\",\"cart\"]"));
        assert!(click.contains("best.click();"));
        let ty = dom_scan_script(&desc, &ActionRequest::Type("x".to_string()));
        assert!(ty.contains("best.focus();"));
        assert!(ty.contains("textarea"));
    }

    #[test]
    fn test_visibility_probe_uses_selector_for_structural() {
        let probe = visibility_probe_script(&TargetDescriptor::new("#login"));
        assert!(probe.contains("querySelector"));
        let probe = visibility_probe_script(&TargetDescriptor::new("Sign In"));
        assert!(probe.contains("getBoundingClientRect"));
    }
}
