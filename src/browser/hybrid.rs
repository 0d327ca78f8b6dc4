//! Hybrid backend
//!
//! Boots the engine through the managed chromiumoxide launcher for
//! reliable process lifecycle and page management, then confirms the
//! engine's own debugging port is reachable over a raw socket, matching
//! the protocol driver's guarantees without re-implementing process
//! management. Interactions layer script-injection fallbacks over the
//! native locator API: native CSS locator, then a text-content locator,
//! then an injected scan over clickable elements.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig as CdpBrowserConfig};
use chromiumoxide::cdp::browser_protocol::{network, page as pg};
use chromiumoxide::handler::viewport::Viewport as CdpViewport;
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::Page;
use futures::StreamExt;
use serde_json::Value;
use tokio::net::TcpStream;
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

/// The hybrid fallback chain: native locator, text locator, injected scan
const HYBRID_ORDER: &[Strategy] = &[Strategy::Css, Strategy::ExactText, Strategy::DomScan];

const NETWORK_SETTLE: Duration = Duration::from_millis(500);

/// Capability-contract implementation over a managed launcher with
/// script-injection fallbacks
pub struct HybridBackend {
    config: DriveConfig,
    engine: EngineId,
    humanizer: Humanizer,
    state: SessionState,
    intervention: InterventionGuard,
    browser: Option<Browser>,
    handler_task: Option<JoinHandle<()>>,
    dialog_task: Option<JoinHandle<()>>,
    page: Option<Page>,
}

impl HybridBackend {
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
            browser: None,
            handler_task: None,
            dialog_task: None,
            page: None,
        }
    }

    fn page(&self) -> Result<&Page> {
        self.page.as_ref().ok_or(Error::NotInitialized)
    }

    async fn boot(&mut self) -> Result<()> {
        let mut builder = CdpBrowserConfig::builder();
        builder = builder.viewport(CdpViewport {
            width: self.config.viewport.width,
            height: self.config.viewport.height,
            device_scale_factor: None,
            emulating_mobile: false,
            is_landscape: true,
            has_touch: false,
        });
        if !self.config.headless {
            builder = builder.with_head();
        }
        let binary = self.config.binary_path.clone().or_else(|| match self.engine {
            EngineId::EdgeCdp => EnvironmentDetector::edge_binary(),
            _ => EnvironmentDetector::chrome_binary(),
        });
        if let Some(path) = binary {
            builder = builder.chrome_executable(path);
        }
        let user_agent = self
            .config
            .user_agent
            .clone()
            .unwrap_or_else(|| self.humanizer.user_agent().to_string());
        builder = builder.arg(format!("--user-agent={user_agent}"));
        if let Some(proxy) = &self.config.proxy {
            builder = builder.arg(format!("--proxy-server={proxy}"));
        }
        for arg in StealthMode::launch_args() {
            builder = builder.arg(arg);
        }
        for arg in &self.config.extra_launch_args {
            builder = builder.arg(arg);
        }
        let cdp_config = builder
            .build()
            .map_err(|e| Error::Cdp(format!("invalid launch configuration: {e}")))?;

        info!(engine = self.engine.as_str(), "launching engine through managed driver");
        let (browser, mut handler) = Browser::launch(cdp_config)
            .await
            .map_err(|e| Error::Cdp(format!("launch failed: {e}")))?;
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    warn!("browser handler event error");
                    break;
                }
            }
            debug!("browser handler finished");
        });

        // parity with the protocol driver: the debugging port must be
        // reachable over a plain socket
        self.probe_debug_socket(browser.websocket_address()).await?;

        let page = browser.new_page("about:blank").await?;
        StealthMode::apply_cdp(&page).await?;
        self.dialog_task = Some(Self::spawn_dialog_handler(
            page.clone(),
            self.config.dialog_policy,
        ));

        self.browser = Some(browser);
        self.handler_task = Some(handler_task);
        self.page = Some(page);
        self.state.initialized = true;
        info!("hybrid session established");
        Ok(())
    }

    async fn probe_debug_socket(&self, ws_address: &str) -> Result<()> {
        let parsed = url::Url::parse(ws_address).map_err(|e| Error::ProtocolUnavailable {
            port: 0,
            reason: format!("unparseable websocket address {ws_address}: {e}"),
        })?;
        let host = parsed.host_str().unwrap_or("127.0.0.1").to_string();
        let port = parsed.port().unwrap_or(self.config.debug_port);
        TcpStream::connect((host.as_str(), port))
            .await
            .map_err(|e| Error::ProtocolUnavailable {
                port,
                reason: format!("debugging socket unreachable: {e}"),
            })?;
        debug!(port, "debugging socket confirmed reachable");
        Ok(())
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
                if let Ok(params) = pg::HandleJavaScriptDialogParams::builder()
                    .accept(accept)
                    .build()
                {
                    if let Err(e) = page.execute(params).await {
                        warn!("failed to handle dialog: {e}");
                    }
                }
            }
        })
    }

    async fn eval_value(&self, script: &str) -> std::result::Result<Value, String> {
        let page = self.page().map_err(|e| e.to_string())?;
        let result = page.evaluate(script).await.map_err(|e| e.to_string())?;
        Ok(result.value().cloned().unwrap_or(Value::Null))
    }

    async fn page_url(&self) -> Result<String> {
        let page = self.page()?;
        Ok(page
            .url()
            .await
            .map_err(Error::from)?
            .unwrap_or_else(|| "about:blank".to_string()))
    }

    async fn challenge_marker(&self) -> Option<String> {
        match self.eval_value(CHALLENGE_PROBE_JS).await {
            Ok(Value::String(marker)) => Some(marker),
            _ => None,
        }
    }

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
            return Ok(());
        }
        {
            let this = &*self;
            let before = this.page_url().await.unwrap_or_default();
            while !this.intervention.expired() {
                tokio::time::sleep(INTERVENTION_POLL).await;
                let now = this.page_url().await.unwrap_or_default();
                if now != before || this.challenge_marker().await.is_none() {
                    break;
                }
            }
        }
        self.intervention.clear();
        Ok(())
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

    /// One fallback attempt: native locator, then the in-page text
    /// locator, then the injected scan
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
                let page = self.page().map_err(|e| e.to_string())?;
                let element = match page.find_element(desc.raw()).await {
                    Ok(element) => element,
                    Err(_) => return Ok(false),
                };
                if self.humanizer.enabled() {
                    self.humanizer.hesitate().await;
                }
                match action {
                    ActionRequest::Click => {
                        element.click().await.map_err(|e| e.to_string())?;
                    }
                    ActionRequest::Type(text) => {
                        element.click().await.map_err(|e| e.to_string())?;
                        self.type_into_focused(text).await?;
                    }
                    ActionRequest::Extract => {}
                }
                Ok(true)
            }
            Strategy::ExactText => {
                let script = cascade::xpath_action_script(&cascade::xpath_exact_text(desc), action);
                let matched = self.eval_value(&script).await?.as_bool().unwrap_or(false);
                if !matched {
                    return Ok(false);
                }
                if let ActionRequest::Type(text) = action {
                    self.type_into_focused(text).await?;
                }
                Ok(true)
            }
            Strategy::DomScan => {
                let script = cascade::dom_scan_script(desc, action);
                let matched = self.eval_value(&script).await?.as_bool().unwrap_or(false);
                if !matched {
                    return Ok(false);
                }
                if let ActionRequest::Type(text) = action {
                    self.type_into_focused(text).await?;
                }
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Script-injected typing into the focused element: clear, type with
    /// humanized noise, then read back and force-correct to the exact text
    async fn type_into_focused(&self, text: &str) -> std::result::Result<(), String> {
        self.eval_value(
            "(() => { const el = document.activeElement; if (!el) return false; \
             if ('value' in el) { el.value = ''; el.dispatchEvent(new Event('input', {bubbles: true})); } \
             return true; })()",
        )
        .await?;

        let plan = if self.humanizer.enabled() {
            self.humanizer.typing_plan(text)
        } else {
            text.chars().map(TypeStep::Char).collect()
        };
        for step in plan {
            match step {
                TypeStep::Char(c) => {
                    let insert = format!(
                        "(() => {{ const el = document.activeElement; if (!el || !('value' in el)) return false; \
                         el.value += {}; el.dispatchEvent(new Event('input', {{bubbles: true}})); return true; }})()",
                        Value::String(c.to_string())
                    );
                    self.eval_value(&insert).await?;
                }
                TypeStep::Backspace => {
                    self.eval_value(
                        "(() => { const el = document.activeElement; if (!el || !('value' in el)) return false; \
                         el.value = el.value.slice(0, -1); el.dispatchEvent(new Event('input', {bubbles: true})); return true; })()",
                    )
                    .await?;
                }
            }
            if self.humanizer.enabled() {
                self.humanizer.keystroke_gap().await;
            }
        }

        let committed = self
            .eval_value("(() => { const el = document.activeElement; return el && 'value' in el ? el.value : null; })()")
            .await?;
        if committed.as_str() != Some(text) {
            warn!("typed value drifted, forcing exact text");
            let fix = format!(
                "(() => {{ const el = document.activeElement; if (!el) return false; \
                 el.value = {}; el.dispatchEvent(new Event('input', {{bubbles: true}})); \
                 el.dispatchEvent(new Event('change', {{bubbles: true}})); return true; }})()",
                Value::String(text.to_string())
            );
            self.eval_value(&fix).await?;
        }
        Ok(())
    }

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
                    return Ok(false);
                }
            }
        }
    }

    async fn document_html(&self) -> Result<String> {
        self.eval_value("document.documentElement.outerHTML")
            .await
            .map_err(Error::EvaluationFailed)?
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| Error::EvaluationFailed("document HTML unavailable".to_string()))
    }

    async fn run_interaction(
        &mut self,
        target: &str,
        action: ActionRequest,
        order: &[Strategy],
    ) -> Result<bool> {
        self.pre_action().await?;
        let desc = TargetDescriptor::new(target);
        let outcome = {
            let this = &*self;
            cascade::run_cascade(order, |strategy| {
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
}

#[async_trait]
impl BrowserBackend for HybridBackend {
    #[instrument(skip(self))]
    async fn initialize(&mut self) -> bool {
        if self.state.initialized {
            return true;
        }
        match self.boot().await {
            Ok(()) => true,
            Err(e) => {
                warn!(engine = self.engine.as_str(), "initialization failed: {e}");
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
        self.page = None;
        self.state.initialized = false;
        info!("hybrid session closed");
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

        // a couple of retries, managed-driver navigation is flaky on slow hosts
        let mut last_error = None;
        for attempt in 0..3u32 {
            if attempt > 0 {
                warn!(attempt, url = %target, "navigation retry");
                tokio::time::sleep(Duration::from_millis(1000)).await;
            }
            let nav = {
                let page = self.page()?;
                match tokio::time::timeout(timeout, page.goto(target.as_str())).await {
                    Ok(Ok(_)) => Ok(()),
                    Ok(Err(e)) => Err(e.to_string()),
                    Err(_) => Err(format!("timed out after {}ms", self.config.timeout_ms)),
                }
            };
            match nav {
                Ok(()) => {
                    let final_url = self.page_url().await.unwrap_or_else(|_| target.clone());
                    self.state.record_navigation(final_url);
                    debug!(url = %target, "navigation complete");
                    return Ok(true);
                }
                Err(e) => last_error = Some(e),
            }
        }
        warn!(
            url = %target,
            "navigation failed: {}",
            last_error.unwrap_or_else(|| "unknown".to_string())
        );
        Ok(false)
    }

    #[instrument(skip(self))]
    async fn click(&mut self, target: &str) -> Result<bool> {
        self.run_interaction(target, ActionRequest::Click, HYBRID_ORDER)
            .await
    }

    #[instrument(skip(self, text))]
    async fn type_text(&mut self, target: &str, text: &str) -> Result<bool> {
        self.run_interaction(target, ActionRequest::Type(text.to_string()), HYBRID_ORDER)
            .await
    }

    #[instrument(skip(self))]
    async fn press_key(&mut self, key: &str) -> Result<bool> {
        self.pre_action().await?;
        // dispatch through the page's own event machinery
        let spec = serde_json::json!({ "key": key });
        let script = format!(
            "(() => {{ const opts = Object.assign({spec}, {{bubbles: true}}); \
             const el = document.activeElement || document.body; \
             el.dispatchEvent(new KeyboardEvent('keydown', opts)); \
             el.dispatchEvent(new KeyboardEvent('keyup', opts)); return true; }})()"
        );
        self.eval_value(&script)
            .await
            .map_err(Error::EvaluationFailed)?;
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
            WaitFor::Navigation => {
                let page = self.page()?;
                let mut navigated = page.event_listener::<pg::EventFrameNavigated>().await?;
                Ok(tokio::time::timeout(timeout, navigated.next())
                    .await
                    .map(|ev| ev.is_some())
                    .unwrap_or(false))
            }
            WaitFor::Visible(target) => {
                let desc = TargetDescriptor::new(&target);
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
            EngineId::EdgeCdp => "hybrid-edge",
            _ => "hybrid-chrome",
        }
    }

    fn session(&self) -> &SessionState {
        &self.state
    }
}
