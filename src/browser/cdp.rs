//! Protocol driver backend
//!
//! Drives a chromium-family engine directly over its remote-debugging wire
//! protocol: the engine is spawned with a fixed local debugging port, the
//! WebSocket endpoint is discovered from `/json/version`, and every
//! interaction is built from Page/DOM/Runtime/Network domain primitives
//! rather than a high-level driver API.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::Browser;
use chromiumoxide::cdp::browser_protocol::{dom, input, network, page as pg};
use chromiumoxide::cdp::js_protocol::runtime;
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::Page;
use futures::StreamExt;
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::browser::stealth::StealthMode;
use crate::browser::{BrowserBackend, ContentKind, PageContent, WaitFor};
use crate::cascade::{self, ActionRequest, Strategy, TargetDescriptor};
use crate::config::{DialogPolicy, DriveConfig};
use crate::detect::{EngineId, EnvironmentDetector};
use crate::error::{Error, Result};
use crate::extraction::{ContentExtractor, LinkExtractor, MetadataExtractor};
use crate::humanize::{Humanizer, TypeStep};
use crate::intervention::{InterventionGuard, CHALLENGE_PROBE_JS, INTERVENTION_POLL};
use crate::session::{
    normalize_url, seed_storage_script, SessionSnapshot, SessionState, StorageDump, StoredCookie,
    DUMP_STORAGE_JS,
};

/// How long one in-flight-request-free window must last before the network
/// counts as idle
const NETWORK_SETTLE: Duration = Duration::from_millis(500);

/// Poll interval while waiting for the debugging port to open
const PORT_POLL: Duration = Duration::from_millis(250);

/// Capability-contract implementation over the raw debugging protocol
pub struct CdpBackend {
    config: DriveConfig,
    engine: EngineId,
    humanizer: Humanizer,
    state: SessionState,
    intervention: InterventionGuard,
    child: Option<Child>,
    browser: Option<Browser>,
    handler_task: Option<JoinHandle<()>>,
    dialog_task: Option<JoinHandle<()>>,
    page: Option<Page>,
}

impl CdpBackend {
    /// Create an uninitialized backend for the given engine
    pub fn new(config: DriveConfig, engine: EngineId) -> Self {
        let humanizer = match config.rng_seed {
            Some(seed) => Humanizer::with_seed(seed, config.humanize),
            None => Humanizer::new(config.humanize),
        };
        Self {
            config,
            engine,
            humanizer,
            state: SessionState::default(),
            intervention: InterventionGuard::new(),
            child: None,
            browser: None,
            handler_task: None,
            dialog_task: None,
            page: None,
        }
    }

    fn page(&self) -> Result<&Page> {
        self.page.as_ref().ok_or(Error::NotInitialized)
    }

    fn engine_binary(&self) -> Option<String> {
        if let Some(path) = &self.config.binary_path {
            return Some(path.clone());
        }
        match self.engine {
            EngineId::EdgeCdp => EnvironmentDetector::edge_binary(),
            _ => EnvironmentDetector::chrome_binary(),
        }
    }

    async fn boot(&mut self) -> Result<()> {
        let binary = self.engine_binary().ok_or_else(|| Error::ProtocolUnavailable {
            port: self.config.debug_port,
            reason: format!("no {} binary found", self.engine.as_str()),
        })?;
        let port = self.config.debug_port;
        let user_agent = self
            .config
            .user_agent
            .clone()
            .unwrap_or_else(|| self.humanizer.user_agent().to_string());

        let mut cmd = Command::new(&binary);
        cmd.arg(format!("--remote-debugging-port={port}"))
            .arg(format!(
                "--window-size={},{}",
                self.config.viewport.width, self.config.viewport.height
            ))
            .arg(format!("--user-agent={user_agent}"))
            .args(StealthMode::launch_args());
        if self.config.headless {
            cmd.arg("--headless=new");
        }
        if let Some(proxy) = &self.config.proxy {
            cmd.arg(format!("--proxy-server={proxy}"));
        }
        cmd.args(&self.config.extra_launch_args)
            .arg("about:blank")
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .kill_on_drop(true);

        info!(binary = %binary, port, "launching engine for protocol session");
        let child = cmd.spawn()?;
        self.child = Some(child);

        self.wait_for_port(port).await?;
        let ws_url = self.discover_ws_endpoint(port).await?;

        let (browser, mut handler) = Browser::connect(&ws_url).await.map_err(|e| {
            Error::ProtocolUnavailable {
                port,
                reason: format!("websocket connect failed: {e}"),
            }
        })?;
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    warn!("protocol handler event error");
                    break;
                }
            }
            debug!("protocol handler finished");
        });

        let page = browser.new_page("about:blank").await?;
        page.execute(pg::EnableParams::default()).await?;
        page.execute(dom::EnableParams::default()).await?;
        page.execute(runtime::EnableParams::default()).await?;
        page.execute(network::EnableParams::default()).await?;
        StealthMode::apply_cdp(&page).await?;

        self.dialog_task = Some(Self::spawn_dialog_handler(
            page.clone(),
            self.config.dialog_policy,
        ));
        self.browser = Some(browser);
        self.handler_task = Some(handler_task);
        self.page = Some(page);
        self.state.initialized = true;
        info!(engine = self.engine.as_str(), "protocol session established");
        Ok(())
    }

    /// Poll the debugging port until it accepts connections, bounded by the
    /// configured timeout
    async fn wait_for_port(&self, port: u16) -> Result<()> {
        let deadline = tokio::time::Instant::now() + Duration::from_millis(self.config.timeout_ms);
        loop {
            match TcpStream::connect(("127.0.0.1", port)).await {
                Ok(_) => return Ok(()),
                Err(e) => {
                    if tokio::time::Instant::now() >= deadline {
                        return Err(Error::ProtocolUnavailable {
                            port,
                            reason: format!("port never opened: {e}"),
                        });
                    }
                    tokio::time::sleep(PORT_POLL).await;
                }
            }
        }
    }

    async fn discover_ws_endpoint(&self, port: u16) -> Result<String> {
        let version: Value = reqwest::get(format!("http://127.0.0.1:{port}/json/version"))
            .await
            .map_err(|e| Error::ProtocolUnavailable {
                port,
                reason: format!("version endpoint unreachable: {e}"),
            })?
            .json()
            .await
            .map_err(|e| Error::ProtocolUnavailable {
                port,
                reason: format!("version endpoint returned malformed JSON: {e}"),
            })?;
        version["webSocketDebuggerUrl"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| Error::ProtocolUnavailable {
                port,
                reason: "no webSocketDebuggerUrl in version response".to_string(),
            })
    }

    fn spawn_dialog_handler(page: Page, policy: DialogPolicy) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut dialogs = match page
                .event_listener::<pg::EventJavascriptDialogOpening>()
                .await
            {
                Ok(stream) => stream,
                Err(e) => {
                    warn!("dialog listener unavailable: {e}");
                    return;
                }
            };
            while let Some(dialog) = dialogs.next().await {
                let accept = policy == DialogPolicy::Accept;
                warn!(message = %dialog.message, accept, "auto-handling dialog");
                let params = pg::HandleJavaScriptDialogParams::builder()
                    .accept(accept)
                    .build();
                match params {
                    Ok(params) => {
                        if let Err(e) = page.execute(params).await {
                            warn!("failed to handle dialog: {e}");
                        }
                    }
                    Err(e) => warn!("failed to build dialog params: {e}"),
                }
            }
        })
    }

    async fn page_url(&self) -> Result<String> {
        let page = self.page()?;
        let url = page.url().await.map_err(Error::from)?;
        Ok(url.unwrap_or_else(|| "about:blank".to_string()))
    }

    /// Evaluate returning the raw JSON value; attempt-level (string) errors
    async fn eval_value(&self, script: &str) -> std::result::Result<Value, String> {
        let page = self.page().map_err(|e| e.to_string())?;
        let result = page.evaluate(script).await.map_err(|e| e.to_string())?;
        Ok(result.value().cloned().unwrap_or(Value::Null))
    }

    /// The obstruction marker currently visible on the page, if any
    async fn challenge_marker(&self) -> Option<String> {
        match self.eval_value(CHALLENGE_PROBE_JS).await {
            Ok(Value::String(marker)) => Some(marker),
            _ => None,
        }
    }

    /// Obstruction check run before every interaction: suspend while a
    /// challenge is visible, until navigation or the bounded timeout
    async fn check_intervention(&mut self) -> Result<()> {
        let marker = {
            let this = &*self;
            this.challenge_marker().await
        };
        let Some(marker) = marker else {
            self.intervention.clear();
            return Ok(());
        };
        if !self.intervention.activate(marker) {
            // already suspended once for this obstruction
            return Ok(());
        }
        {
            let this = &*self;
            this.wait_for_obstruction_clear().await;
        }
        self.intervention.clear();
        Ok(())
    }

    async fn wait_for_obstruction_clear(&self) {
        let before = self.page_url().await.unwrap_or_default();
        while !self.intervention.expired() {
            tokio::time::sleep(INTERVENTION_POLL).await;
            let now = self.page_url().await.unwrap_or_default();
            if now != before {
                // navigation fired: obstruction considered cleared
                return;
            }
            if self.challenge_marker().await.is_none() {
                return;
            }
        }
    }

    async fn pre_action(&mut self) -> Result<()> {
        if !self.state.initialized {
            return Err(Error::NotInitialized);
        }
        self.check_intervention().await?;
        let count = self.state.bump();
        if self.humanizer.pause_due(count) {
            self.humanizer.long_pause().await;
        }
        Ok(())
    }

    /// One cascade strategy attempt. `Ok(true)` means found and acted,
    /// `Ok(false)` means not applicable or no node, `Err` means a node was
    /// found but the action failed.
    async fn attempt(
        &self,
        strategy: Strategy,
        desc: &TargetDescriptor,
        action: &ActionRequest,
    ) -> std::result::Result<bool, String> {
        match strategy {
            Strategy::Css => {
                if !desc.looks_structural() {
                    return Ok(false);
                }
                match self.query_selector(desc.raw()).await? {
                    Some(node_id) => self.act_on_node(node_id, action).await.map(|_| true),
                    None => Ok(false),
                }
            }
            Strategy::ExactText => {
                self.attempt_xpath(&cascade::xpath_exact_text(desc), action)
                    .await
            }
            Strategy::RoleName => {
                self.attempt_xpath(&cascade::xpath_role_name(desc, action), action)
                    .await
            }
            Strategy::AttributeSubstring => {
                self.attempt_xpath(&cascade::xpath_attribute_substring(desc), action)
                    .await
            }
            Strategy::StructuralPath => match cascade::xpath_structural_path(desc) {
                Some(xpath) => self.attempt_xpath(&xpath, action).await,
                None => Ok(false),
            },
            Strategy::DomScan => {
                let script = cascade::dom_scan_script(desc, action);
                let matched = self.eval_value(&script).await?.as_bool().unwrap_or(false);
                if !matched {
                    return Ok(false);
                }
                if let ActionRequest::Type(text) = action {
                    // the scan focused the element; typing goes through it
                    self.type_into_focused(text).await?;
                }
                Ok(true)
            }
            Strategy::Coordinate => {
                if *action != ActionRequest::Click {
                    return Ok(false);
                }
                let viewport = (self.config.viewport.width, self.config.viewport.height);
                match desc.known_position(viewport) {
                    Some((x, y)) => {
                        self.click_at(x, y).await?;
                        Ok(true)
                    }
                    None => Ok(false),
                }
            }
        }
    }

    async fn query_selector(
        &self,
        selector: &str,
    ) -> std::result::Result<Option<dom::NodeId>, String> {
        let page = self.page().map_err(|e| e.to_string())?;
        let doc = page
            .execute(dom::GetDocumentParams::default())
            .await
            .map_err(|e| e.to_string())?;
        let qs = page
            .execute(
                dom::QuerySelectorParams::builder()
                    .node_id(doc.result.root.node_id)
                    .selector(selector)
                    .build()
                    .map_err(|e| e.to_string())?,
            )
            .await
            .map_err(|e| e.to_string())?;
        let node_id = qs.result.node_id;
        if *node_id.inner() == 0 {
            Ok(None)
        } else {
            Ok(Some(node_id))
        }
    }

    /// Resolve an XPath through the DOM domain's search machinery and act
    /// on the first hit
    async fn attempt_xpath(
        &self,
        xpath: &str,
        action: &ActionRequest,
    ) -> std::result::Result<bool, String> {
        let page = self.page().map_err(|e| e.to_string())?;
        // performSearch requires a known document
        page.execute(dom::GetDocumentParams::default())
            .await
            .map_err(|e| e.to_string())?;
        let search = page
            .execute(
                dom::PerformSearchParams::builder()
                    .query(xpath)
                    .build()
                    .map_err(|e| e.to_string())?,
            )
            .await
            .map_err(|e| e.to_string())?;
        let search_id = search.result.search_id.clone();
        if search.result.result_count == 0 {
            self.discard_search(&search_id).await;
            return Ok(false);
        }
        let results = page
            .execute(
                dom::GetSearchResultsParams::builder()
                    .search_id(&search_id)
                    .from_index(0)
                    .to_index(1)
                    .build()
                    .map_err(|e| e.to_string())?,
            )
            .await
            .map_err(|e| e.to_string());
        self.discard_search(&search_id).await;
        let node_id = match results?.result.node_ids.first().copied() {
            Some(id) => id,
            None => return Ok(false),
        };
        self.act_on_node(node_id, action).await?;
        Ok(true)
    }

    async fn discard_search(&self, search_id: &str) {
        if let Ok(page) = self.page() {
            if let Ok(params) = dom::DiscardSearchResultsParams::builder()
                .search_id(search_id)
                .build()
            {
                let _ = page.execute(params).await;
            }
        }
    }

    async fn act_on_node(
        &self,
        node_id: dom::NodeId,
        action: &ActionRequest,
    ) -> std::result::Result<(), String> {
        match action {
            ActionRequest::Click => self.click_node(node_id).await,
            ActionRequest::Type(text) => {
                self.focus_node(node_id).await?;
                self.type_into_focused(text).await
            }
            ActionRequest::Extract => {
                // locate-only: confirm the node has a box
                self.node_center(node_id).await.map(|_| ())
            }
        }
    }

    async fn focus_node(&self, node_id: dom::NodeId) -> std::result::Result<(), String> {
        let page = self.page().map_err(|e| e.to_string())?;
        page.execute(dom::FocusParams::builder().node_id(node_id).build())
            .await
            .map_err(|e| format!("focus failed: {e}"))?;
        Ok(())
    }

    /// Center of the node's box model content quad
    async fn node_center(&self, node_id: dom::NodeId) -> std::result::Result<(f64, f64), String> {
        let page = self.page().map_err(|e| e.to_string())?;
        page.execute(
            dom::ScrollIntoViewIfNeededParams::builder()
                .node_id(node_id)
                .build(),
        )
        .await
        .map_err(|e| e.to_string())?;
        let resp = page
            .execute(dom::GetBoxModelParams::builder().node_id(node_id).build())
            .await
            .map_err(|e| format!("no box model: {e}"))?;
        let quad = resp.result.model.content.inner().clone();
        if quad.len() < 8 {
            return Err("degenerate box model".to_string());
        }
        let x = (quad[0] + quad[2] + quad[4] + quad[6]) / 4.0;
        let y = (quad[1] + quad[3] + quad[5] + quad[7]) / 4.0;
        Ok((x, y))
    }

    async fn click_node(&self, node_id: dom::NodeId) -> std::result::Result<(), String> {
        let (x, y) = self.node_center(node_id).await?;
        self.click_at(x, y).await
    }

    /// Synthetic pointer click routed through the simulator: approach along
    /// a Bézier path, press, hold, release
    async fn click_at(&self, x: f64, y: f64) -> std::result::Result<(), String> {
        let page = self.page().map_err(|e| e.to_string())?;
        if self.humanizer.enabled() {
            let start = (x * 0.3 + 40.0, y * 0.6 + 30.0);
            for (px, py) in self.humanizer.mouse_path(start, (x, y), 10) {
                let params = input::DispatchMouseEventParams::builder()
                    .r#type(input::DispatchMouseEventType::MouseMoved)
                    .x(px)
                    .y(py)
                    .build()
                    .map_err(|e| e.to_string())?;
                page.execute(params).await.map_err(|e| e.to_string())?;
                self.humanizer.delay(8, 25).await;
            }
            self.humanizer.delay(50, 150).await;
        }
        let down = input::DispatchMouseEventParams::builder()
            .r#type(input::DispatchMouseEventType::MousePressed)
            .x(x)
            .y(y)
            .button(input::MouseButton::Left)
            .click_count(1)
            .build()
            .map_err(|e| e.to_string())?;
        page.execute(down).await.map_err(|e| e.to_string())?;
        if self.humanizer.enabled() {
            self.humanizer.delay(40, 120).await;
        }
        let up = input::DispatchMouseEventParams::builder()
            .r#type(input::DispatchMouseEventType::MouseReleased)
            .x(x)
            .y(y)
            .button(input::MouseButton::Left)
            .click_count(1)
            .build()
            .map_err(|e| e.to_string())?;
        page.execute(up).await.map_err(|e| e.to_string())?;
        Ok(())
    }

    /// Type into the currently focused element: clear through script
    /// injection, dispatch one key event per planned keystroke, then
    /// enforce the content-fidelity guarantee by reading the committed
    /// value back and force-correcting any drift
    async fn type_into_focused(&self, text: &str) -> std::result::Result<(), String> {
        self.eval_value(CLEAR_FOCUSED_JS).await?;
        let plan = if self.humanizer.enabled() {
            self.humanizer.typing_plan(text)
        } else {
            text.chars().map(TypeStep::Char).collect()
        };
        for step in plan {
            match step {
                TypeStep::Char(c) => self.dispatch_char(c).await?,
                TypeStep::Backspace => self.dispatch_raw_key("Backspace", "Backspace", 8).await?,
            }
            if self.humanizer.enabled() {
                self.humanizer.keystroke_gap().await;
            }
        }
        let committed = self.eval_value(READ_FOCUSED_VALUE_JS).await?;
        if committed.as_str() != Some(text) {
            warn!("typed value drifted, forcing exact text");
            let fix = format!(
                "(() => {{ const el = document.activeElement; if (!el) return false; \
                 if ('value' in el) {{ el.value = {0}; }} else {{ el.textContent = {0}; }} \
                 el.dispatchEvent(new Event('input', {{bubbles: true}})); \
                 el.dispatchEvent(new Event('change', {{bubbles: true}})); return true; }})()",
                Value::String(text.to_string())
            );
            self.eval_value(&fix).await?;
        }
        Ok(())
    }

    async fn dispatch_char(&self, c: char) -> std::result::Result<(), String> {
        let page = self.page().map_err(|e| e.to_string())?;
        let down = input::DispatchKeyEventParams::builder()
            .r#type(input::DispatchKeyEventType::KeyDown)
            .text(c.to_string())
            .build()
            .map_err(|e| e.to_string())?;
        page.execute(down).await.map_err(|e| e.to_string())?;
        let up = input::DispatchKeyEventParams::builder()
            .r#type(input::DispatchKeyEventType::KeyUp)
            .build()
            .map_err(|e| e.to_string())?;
        page.execute(up).await.map_err(|e| e.to_string())?;
        Ok(())
    }

    async fn dispatch_raw_key(
        &self,
        key: &str,
        code: &str,
        vk: i64,
    ) -> std::result::Result<(), String> {
        let page = self.page().map_err(|e| e.to_string())?;
        let down = input::DispatchKeyEventParams::builder()
            .r#type(input::DispatchKeyEventType::RawKeyDown)
            .key(key)
            .code(code)
            .windows_virtual_key_code(vk)
            .native_virtual_key_code(vk)
            .build()
            .map_err(|e| e.to_string())?;
        page.execute(down).await.map_err(|e| e.to_string())?;
        if let Some(text) = key_text(key) {
            let ch = input::DispatchKeyEventParams::builder()
                .r#type(input::DispatchKeyEventType::Char)
                .text(text)
                .build()
                .map_err(|e| e.to_string())?;
            page.execute(ch).await.map_err(|e| e.to_string())?;
        }
        let up = input::DispatchKeyEventParams::builder()
            .r#type(input::DispatchKeyEventType::KeyUp)
            .key(key)
            .code(code)
            .windows_virtual_key_code(vk)
            .native_virtual_key_code(vk)
            .build()
            .map_err(|e| e.to_string())?;
        page.execute(up).await.map_err(|e| e.to_string())?;
        Ok(())
    }

    /// In-flight request counter over Network domain events; idle only
    /// after the counter has been exactly zero for the full settle window
    async fn wait_network_idle(&self, timeout: Duration) -> Result<bool> {
        let page = self.page()?;
        let mut started = page
            .event_listener::<network::EventRequestWillBeSent>()
            .await?;
        let mut finished = page.event_listener::<network::EventLoadingFinished>().await?;
        let mut failed = page.event_listener::<network::EventLoadingFailed>().await?;

        let deadline = tokio::time::Instant::now() + timeout;
        let mut inflight: u32 = 0;
        loop {
            tokio::select! {
                Some(_) = started.next() => { inflight += 1; }
                Some(_) = finished.next() => { inflight = inflight.saturating_sub(1); }
                Some(_) = failed.next() => { inflight = inflight.saturating_sub(1); }
                _ = tokio::time::sleep(NETWORK_SETTLE) => {
                    if inflight == 0 {
                        return Ok(true);
                    }
                }
                _ = tokio::time::sleep_until(deadline) => {
                    debug!(inflight, "network never settled");
                    return Ok(false);
                }
            }
        }
    }

    async fn wait_visible(&self, target: &str, timeout: Duration) -> Result<bool> {
        let desc = TargetDescriptor::new(target);
        let probe = cascade::visibility_probe_script(&desc);
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if let Ok(Value::Bool(true)) = self.eval_value(&probe).await {
                return Ok(true);
            }
            if tokio::time::Instant::now() >= deadline {
                return Ok(false);
            }
            tokio::time::sleep(Duration::from_millis(250)).await;
        }
    }

    async fn wait_navigation(&self, timeout: Duration) -> Result<bool> {
        let page = self.page()?;
        let mut navigated = page.event_listener::<pg::EventFrameNavigated>().await?;
        Ok(tokio::time::timeout(timeout, navigated.next())
            .await
            .map(|ev| ev.is_some())
            .unwrap_or(false))
    }

    async fn document_html(&self) -> Result<String> {
        self.eval_value("document.documentElement.outerHTML")
            .await
            .map_err(Error::EvaluationFailed)?
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| Error::EvaluationFailed("document HTML unavailable".to_string()))
    }
}

const CLEAR_FOCUSED_JS: &str = r#"
(() => {
    const el = document.activeElement;
    if (!el) return false;
    if ('value' in el) {
        el.value = '';
        el.dispatchEvent(new Event('input', {bubbles: true}));
    } else if (el.isContentEditable) {
        el.textContent = '';
    }
    return true;
})()
"#;

const READ_FOCUSED_VALUE_JS: &str = r#"
(() => {
    const el = document.activeElement;
    if (!el) return null;
    return 'value' in el ? el.value : el.textContent;
})()
"#;

/// Char payload sent alongside raw key presses that produce input
fn key_text(key: &str) -> Option<&'static str> {
    match key {
        "Enter" => Some("\r"),
        "Tab" => Some("\t"),
        "Space" => Some(" "),
        _ => None,
    }
}

/// Key name → (key, code, virtual key code)
fn key_spec(key: &str) -> (String, String, i64) {
    let named = |k: &str, c: &str, vk: i64| (k.to_string(), c.to_string(), vk);
    match key {
        "Enter" => named("Enter", "Enter", 13),
        "Tab" => named("Tab", "Tab", 9),
        "Escape" => named("Escape", "Escape", 27),
        "Backspace" => named("Backspace", "Backspace", 8),
        "Delete" => named("Delete", "Delete", 46),
        "Space" | " " => named("Space", "Space", 32),
        "ArrowLeft" => named("ArrowLeft", "ArrowLeft", 37),
        "ArrowUp" => named("ArrowUp", "ArrowUp", 38),
        "ArrowRight" => named("ArrowRight", "ArrowRight", 39),
        "ArrowDown" => named("ArrowDown", "ArrowDown", 40),
        "Home" => named("Home", "Home", 36),
        "End" => named("End", "End", 35),
        "PageUp" => named("PageUp", "PageUp", 33),
        "PageDown" => named("PageDown", "PageDown", 34),
        other => (other.to_string(), String::new(), 0),
    }
}

#[async_trait]
impl BrowserBackend for CdpBackend {
    #[instrument(skip(self))]
    async fn initialize(&mut self) -> bool {
        if self.state.initialized {
            return true;
        }
        match self.boot().await {
            Ok(()) => true,
            Err(e) => {
                warn!(engine = self.engine.as_str(), "initialization failed: {e}");
                if let Some(mut child) = self.child.take() {
                    let _ = child.start_kill();
                }
                false
            }
        }
    }

    #[instrument(skip(self))]
    async fn close(&mut self) -> Result<()> {
        if let Some(task) = self.dialog_task.take() {
            task.abort();
        }
        if let Some(mut browser) = self.browser.take() {
            let _ = browser.close().await;
        }
        if let Some(task) = self.handler_task.take() {
            let _ = tokio::time::timeout(Duration::from_secs(5), task).await;
        }
        if let Some(mut child) = self.child.take() {
            let _ = child.start_kill();
            let _ = child.wait().await;
        }
        self.page = None;
        self.state.initialized = false;
        info!("protocol session closed");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn navigate(&mut self, url: &str) -> Result<bool> {
        if !self.state.initialized {
            return Err(Error::NotInitialized);
        }
        let target = normalize_url(url);
        let timeout = Duration::from_millis(self.config.timeout_ms);
        if self.humanizer.enabled() {
            self.humanizer.hesitate().await;
        }

        let loaded = {
            let page = self.page()?;
            let mut load_events = page.event_listener::<pg::EventLoadEventFired>().await?;
            let params = pg::NavigateParams::builder()
                .url(&target)
                .build()
                .map_err(Error::cdp)?;
            page.execute(params).await.map_err(Error::from)?;
            tokio::time::timeout(timeout, load_events.next())
                .await
                .map(|ev| ev.is_some())
                .unwrap_or(false)
        };
        if !loaded {
            // not fatal: the session stays open for the next instruction
            warn!(url = %target, "load event never fired within timeout");
            return Ok(false);
        }

        let final_url = self.page_url().await.unwrap_or_else(|_| target.clone());
        self.state.record_navigation(final_url);
        debug!(url = %target, "navigation complete");
        Ok(true)
    }

    #[instrument(skip(self))]
    async fn click(&mut self, target: &str) -> Result<bool> {
        self.pre_action().await?;
        let desc = TargetDescriptor::new(target);
        let action = ActionRequest::Click;
        let outcome = {
            let this = &*self;
            cascade::run_cascade(Strategy::CLICK_ORDER, |strategy| {
                let d = desc.clone();
                let a = action.clone();
                Box::pin(async move { this.attempt(strategy, &d, &a).await })
            })
            .await
        };
        match outcome {
            Ok(resolution) => {
                if !resolution.verified {
                    warn!(target, "coordinate click could not be verified");
                }
                Ok(true)
            }
            Err(failures) => {
                warn!("{}", cascade::exhausted(target, &failures));
                Ok(false)
            }
        }
    }

    #[instrument(skip(self, text))]
    async fn type_text(&mut self, target: &str, text: &str) -> Result<bool> {
        self.pre_action().await?;
        let desc = TargetDescriptor::new(target);
        let action = ActionRequest::Type(text.to_string());
        let outcome = {
            let this = &*self;
            cascade::run_cascade(Strategy::TYPE_ORDER, |strategy| {
                let d = desc.clone();
                let a = action.clone();
                Box::pin(async move { this.attempt(strategy, &d, &a).await })
            })
            .await
        };
        match outcome {
            Ok(_) => Ok(true),
            Err(failures) => {
                warn!("{}", cascade::exhausted(target, &failures));
                Ok(false)
            }
        }
    }

    #[instrument(skip(self))]
    async fn press_key(&mut self, key: &str) -> Result<bool> {
        self.pre_action().await?;
        let (key, code, vk) = key_spec(key);
        if code.is_empty() {
            // plain character keys go through the char pipeline
            if let Some(c) = key.chars().next() {
                self.dispatch_char(c).await.map_err(Error::cdp)?;
                return Ok(true);
            }
            return Ok(false);
        }
        self.dispatch_raw_key(&key, &code, vk)
            .await
            .map_err(Error::cdp)?;
        Ok(true)
    }

    #[instrument(skip(self))]
    async fn screenshot(&mut self, path: &Path) -> Result<Option<PathBuf>> {
        if !self.state.initialized {
            return Err(Error::NotInitialized);
        }
        let params = ScreenshotParams::builder()
            .format(pg::CaptureScreenshotFormat::Png)
            .full_page(true)
            .build();
        let bytes = match self.page()?.screenshot(params).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("screenshot capture failed: {e}");
                return Ok(None);
            }
        };
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        tokio::fs::write(path, bytes).await?;
        Ok(Some(path.to_path_buf()))
    }

    #[instrument(skip(self))]
    async fn wait(&mut self, condition: WaitFor) -> Result<bool> {
        if !self.state.initialized {
            return Err(Error::NotInitialized);
        }
        let timeout = Duration::from_millis(self.config.timeout_ms);
        match condition {
            WaitFor::Millis(ms) => {
                self.humanizer.wait_with_jitter(ms).await;
                Ok(true)
            }
            WaitFor::Load => {
                let script = r#"
                    new Promise(resolve => {
                        if (document.readyState === 'complete') {
                            resolve(true);
                        } else {
                            window.addEventListener('load', () => resolve(true));
                        }
                    })
                "#;
                let page = self.page()?;
                Ok(matches!(
                    tokio::time::timeout(timeout, page.evaluate(script)).await,
                    Ok(Ok(_))
                ))
            }
            WaitFor::NetworkIdle => self.wait_network_idle(timeout).await,
            WaitFor::Navigation => self.wait_navigation(timeout).await,
            WaitFor::Visible(target) => self.wait_visible(&target, timeout).await,
        }
    }

    #[instrument(skip(self, script, args))]
    async fn evaluate(&mut self, script: &str, args: Vec<Value>) -> Result<Value> {
        if !self.state.initialized {
            return Err(Error::NotInitialized);
        }
        let wrapped = if args.is_empty() {
            script.to_string()
        } else {
            format!(
                "(function() {{ return eval({}); }}).apply(null, {})",
                Value::String(script.to_string()),
                Value::Array(args)
            )
        };
        self.eval_value(&wrapped)
            .await
            .map_err(Error::EvaluationFailed)
    }

    async fn current_url(&mut self) -> Result<String> {
        self.page_url().await
    }

    async fn title(&mut self) -> Result<String> {
        self.eval_value("document.title")
            .await
            .map_err(Error::EvaluationFailed)?
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| Error::EvaluationFailed("title unavailable".to_string()))
    }

    #[instrument(skip(self))]
    async fn extract_content(&mut self, kind: ContentKind) -> Result<PageContent> {
        let html = self.document_html().await?;
        let url = self.page_url().await.ok();
        Ok(match kind {
            ContentKind::Html => PageContent::Html(html),
            ContentKind::Text => PageContent::Text(ContentExtractor::from_html(&html).text),
            ContentKind::Links => {
                PageContent::Links(LinkExtractor::from_html(&html, url.as_deref()))
            }
            ContentKind::Metadata => {
                PageContent::Metadata(Box::new(MetadataExtractor::from_html(&html)))
            }
        })
    }

    #[instrument(skip(self))]
    async fn save_session(&mut self, path: &Path) -> Result<bool> {
        let page = self.page()?;
        let cookies = page.get_cookies().await?;
        let stored: Vec<StoredCookie> = cookies
            .into_iter()
            .map(|c| StoredCookie {
                name: c.name,
                value: c.value,
                domain: Some(c.domain),
                path: Some(c.path),
                secure: c.secure,
                http_only: c.http_only,
                expires: if c.expires < 0.0 { None } else { Some(c.expires) },
            })
            .collect();

        let storage = self
            .eval_value(DUMP_STORAGE_JS)
            .await
            .map_err(Error::EvaluationFailed)?;
        let storage: StorageDump = match storage.as_str() {
            Some(raw) => serde_json::from_str(raw)?,
            None => StorageDump::default(),
        };

        let snapshot = SessionSnapshot {
            saved_at: None,
            url: self.page_url().await.ok(),
            cookies: stored,
            local_storage: storage.local,
            session_storage: storage.session,
        };
        snapshot.write(path).await?;
        Ok(true)
    }

    #[instrument(skip(self))]
    async fn load_session(&mut self, path: &Path) -> Result<bool> {
        let snapshot = SessionSnapshot::read(path).await?;
        {
            let page = self.page()?;
            for cookie in &snapshot.cookies {
                let mut builder = network::SetCookieParams::builder()
                    .name(&cookie.name)
                    .value(&cookie.value);
                if let Some(domain) = &cookie.domain {
                    builder = builder.domain(domain);
                }
                if let Some(cookie_path) = &cookie.path {
                    builder = builder.path(cookie_path);
                }
                let params = builder
                    .secure(cookie.secure)
                    .http_only(cookie.http_only)
                    .build()
                    .map_err(Error::cdp)?;
                page.execute(params).await?;
            }
        }
        if let Some(url) = snapshot.url.clone() {
            self.navigate(&url).await?;
        }
        let seed = seed_storage_script(&snapshot);
        self.eval_value(&seed)
            .await
            .map_err(Error::EvaluationFailed)?;
        debug!(cookies = snapshot.cookies.len(), "session restored");
        Ok(true)
    }

    fn name(&self) -> &'static str {
        match self.engine {
            EngineId::EdgeCdp => "cdp-edge",
            _ => "cdp-chrome",
        }
    }

    fn session(&self) -> &SessionState {
        &self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_backend_is_uninitialized() {
        let backend = CdpBackend::new(DriveConfig::default(), EngineId::ChromeCdp);
        assert!(!backend.session().initialized);
        assert!(backend.session().current_url.is_none());
        assert_eq!(backend.name(), "cdp-chrome");

        let edge = CdpBackend::new(DriveConfig::default(), EngineId::EdgeCdp);
        assert_eq!(edge.name(), "cdp-edge");
    }

    #[test]
    fn test_key_spec_named_keys() {
        assert_eq!(key_spec("Enter"), ("Enter".into(), "Enter".into(), 13));
        assert_eq!(key_spec("Tab"), ("Tab".into(), "Tab".into(), 9));
        assert_eq!(key_spec("Escape"), ("Escape".into(), "Escape".into(), 27));
        let (k, c, vk) = key_spec("x");
        assert_eq!(k, "x");
        assert!(c.is_empty());
        assert_eq!(vk, 0);
    }

    #[test]
    fn test_key_text_payloads() {
        assert_eq!(key_text("Enter"), Some("\r"));
        assert_eq!(key_text("Tab"), Some("\t"));
        assert_eq!(key_text("Escape"), None);
    }

}
