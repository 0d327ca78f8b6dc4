//! Browser control backends
//!
//! One capability contract ([`BrowserBackend`]) over three transports: the
//! raw debugging-protocol driver, the hybrid managed-launch/protocol
//! backend, and the high-level WebDriver backend. The factory picks one
//! per session; callers never inspect backend shapes at runtime.

pub mod cdp;
pub mod factory;
pub mod hybrid;
pub mod stealth;
pub mod webdriver;

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{Error, Result};
use crate::extraction::{ExtractedLink, PageMetadata};
use crate::session::SessionState;

pub use cdp::CdpBackend;
pub use factory::create_backend;
pub use hybrid::HybridBackend;
pub use stealth::StealthMode;
pub use webdriver::WebDriverBackend;

/// A condition passed to [`BrowserBackend::wait`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitFor {
    /// A plain duration in milliseconds (jittered when humanization is on)
    Millis(u64),
    /// The document load event
    Load,
    /// No network request in flight for a settling window
    NetworkIdle,
    /// The current URL changing
    Navigation,
    /// A target descriptor becoming visible
    Visible(String),
}

impl WaitFor {
    /// Parse the loosely-typed wait argument: a number is a duration, the
    /// named wait classes map to themselves, and anything else is a target
    /// descriptor meaning "wait until visible"
    pub fn parse(condition: &str) -> WaitFor {
        let trimmed = condition.trim();
        if let Ok(ms) = trimmed.parse::<u64>() {
            return WaitFor::Millis(ms);
        }
        match trimmed.to_lowercase().as_str() {
            "load" => WaitFor::Load,
            "network-idle" | "networkidle" => WaitFor::NetworkIdle,
            "navigation" => WaitFor::Navigation,
            _ => WaitFor::Visible(trimmed.to_string()),
        }
    }
}

/// What [`BrowserBackend::extract_content`] should produce
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    /// Readable text of the page
    Text,
    /// Raw document HTML
    Html,
    /// All links with context
    Links,
    /// Title, description, OpenGraph and friends
    Metadata,
}

/// Structured content returned by [`BrowserBackend::extract_content`]
#[derive(Debug, Clone)]
pub enum PageContent {
    /// Readable text
    Text(String),
    /// Raw HTML
    Html(String),
    /// Extracted links
    Links(Vec<ExtractedLink>),
    /// Extracted metadata
    Metadata(Box<PageMetadata>),
}

/// The capability contract every backend implements.
///
/// Methods interacting with page content consult the element resolution
/// cascade internally; they never assume a single lookup succeeds. Soft
/// failures come back as `Ok(false)` with a logged reason, hard transport
/// failures as typed errors; no method reports an absent status silently.
/// A backend instance is exclusively owned by its creating caller, which
/// serializes its own calls; there is no parallel interaction within one
/// session.
#[async_trait]
pub trait BrowserBackend: Send {
    /// Launch or connect the underlying engine. Returns `false` instead of
    /// erroring so the factory's caller can try an alternate backend.
    async fn initialize(&mut self) -> bool;

    /// Tear down the engine process/connection
    async fn close(&mut self) -> Result<()>;

    /// Navigate to a URL (scheme auto-prepended). A load timeout is not
    /// fatal: the method returns `Ok(false)` and the session stays usable.
    async fn navigate(&mut self, url: &str) -> Result<bool>;

    /// Resolve a target via the cascade and click it
    async fn click(&mut self, target: &str) -> Result<bool>;

    /// Resolve a target via the cascade and type into it. The committed
    /// value always equals `text` exactly, regardless of simulated typing
    /// noise.
    async fn type_text(&mut self, target: &str, text: &str) -> Result<bool>;

    /// Press a single named key ("Enter", "Tab", ...) on the focused element
    async fn press_key(&mut self, key: &str) -> Result<bool>;

    /// Capture a PNG screenshot to `path`, creating missing parent
    /// directories. `Ok(None)` when the capture itself failed.
    async fn screenshot(&mut self, path: &Path) -> Result<Option<PathBuf>>;

    /// Suspend until the condition holds or its bounded timeout elapses.
    /// Always resolves; `Ok(false)` reports a timeout.
    async fn wait(&mut self, condition: WaitFor) -> Result<bool>;

    /// Evaluate a script in the page. `args` are exposed to the script as
    /// the `arguments` array.
    async fn evaluate(&mut self, script: &str, args: Vec<Value>) -> Result<Value>;

    /// The current page URL
    async fn current_url(&mut self) -> Result<String>;

    /// The current page title
    async fn title(&mut self) -> Result<String>;

    /// Extract structured content from the current page
    async fn extract_content(&mut self, kind: ContentKind) -> Result<PageContent>;

    /// Serialize cookie/storage state to a JSON file
    async fn save_session(&mut self, path: &Path) -> Result<bool>;

    /// Restore cookie/storage state from a JSON file
    async fn load_session(&mut self, path: &Path) -> Result<bool>;

    /// Proxy configuration is construction-time only; a live session must
    /// report failure rather than silently ignoring the request.
    async fn set_proxy(&mut self, _proxy: &str) -> Result<bool> {
        Err(Error::Unsupported(
            "proxy can only be configured at session construction".to_string(),
        ))
    }

    /// Human-readable backend identifier
    fn name(&self) -> &'static str;

    /// The session bookkeeping owned by this backend
    fn session(&self) -> &SessionState;
}
