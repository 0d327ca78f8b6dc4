//! High-level driver backend
//!
//! Drives one of three rendering engines (Blink via chromedriver, Gecko
//! via geckodriver, WebKit via safaridriver) through a WebDriver session.
//! The most complete backend: full seven-strategy cascade, structured
//! content extraction, and cookie/storage session persistence so later
//! sessions can resume authentication without replaying login.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use fantoccini::actions::{InputSource, MouseActions, PointerAction, MOUSE_BUTTON_LEFT};
use fantoccini::cookies::Cookie;
use fantoccini::elements::Element;
use fantoccini::key::Key;
use fantoccini::{Client, ClientBuilder, Locator};
use serde_json::{json, Value};
use tracing::{debug, info, instrument, warn};
use webdriver::capabilities::Capabilities;

use crate::browser::stealth::StealthMode;
use crate::browser::{BrowserBackend, ContentKind, PageContent, WaitFor};
use crate::cascade::{self, ActionRequest, Strategy, TargetDescriptor};
use crate::config::{DialogPolicy, DriveConfig, DriverEngine};
use crate::error::{Error, Result};
use crate::extraction::{ContentExtractor, LinkExtractor, MetadataExtractor};
use crate::humanize::{Humanizer, TypeStep};
use crate::intervention::{InterventionGuard, CHALLENGE_PROBE_JS, INTERVENTION_POLL};
use crate::session::{normalize_url, SessionSnapshot, SessionState, StoredCookie};

const NETWORK_SETTLE: Duration = Duration::from_millis(500);
const VISIBILITY_POLL: Duration = Duration::from_millis(250);

/// Capability-contract implementation over a WebDriver endpoint
pub struct WebDriverBackend {
    config: DriveConfig,
    engine: DriverEngine,
    humanizer: Humanizer,
    state: SessionState,
    intervention: InterventionGuard,
    client: Option<Client>,
}

impl WebDriverBackend {
    /// Create an uninitialized backend for the configured engine
    pub fn new(config: DriveConfig) -> Self {
        let humanizer = match config.rng_seed {
            Some(seed) => Humanizer::with_seed(seed, config.humanize),
            None => Humanizer::new(config.humanize),
        };
        let engine = config.driver_engine;
        Self {
            config,
            engine,
            humanizer,
            state: SessionState::default(),
            intervention: InterventionGuard::new(),
            client: None,
        }
    }

    fn client(&self) -> Result<&Client> {
        self.client.as_ref().ok_or(Error::NotInitialized)
    }

    fn build_capabilities(&self) -> Capabilities {
        let mut caps = Capabilities::new();
        let user_agent = self
            .config
            .user_agent
            .clone()
            .unwrap_or_else(|| self.humanizer.user_agent().to_string());

        match self.engine {
            DriverEngine::Chromium => {
                let mut args: Vec<String> = StealthMode::launch_args();
                args.push(format!(
                    "--window-size={},{}",
                    self.config.viewport.width, self.config.viewport.height
                ));
                args.push(format!("--user-agent={user_agent}"));
                if self.config.headless {
                    args.push("--headless=new".to_string());
                    args.push("--disable-gpu".to_string());
                }
                args.extend(self.config.extra_launch_args.iter().cloned());
                caps.insert("goog:chromeOptions".to_string(), json!({ "args": args }));
            }
            DriverEngine::Firefox => {
                let mut args: Vec<String> = Vec::new();
                if self.config.headless {
                    args.push("-headless".to_string());
                }
                args.extend(self.config.extra_launch_args.iter().cloned());
                caps.insert(
                    "moz:firefoxOptions".to_string(),
                    json!({
                        "args": args,
                        "prefs": {
                            "general.useragent.override": user_agent,
                            "dom.webdriver.enabled": false,
                        }
                    }),
                );
            }
            DriverEngine::Webkit => {
                // safaridriver accepts neither headless mode nor custom args
                caps.insert("browserName".to_string(), json!("safari"));
            }
        }

        if let Some(proxy) = &self.config.proxy {
            caps.insert(
                "proxy".to_string(),
                json!({
                    "proxyType": "manual",
                    "httpProxy": proxy,
                    "sslProxy": proxy,
                }),
            );
        }
        let prompt = match self.config.dialog_policy {
            DialogPolicy::Accept => "accept",
            DialogPolicy::Dismiss => "dismiss",
        };
        caps.insert("unhandledPromptBehavior".to_string(), json!(prompt));
        caps
    }

    async fn boot(&mut self) -> Result<()> {
        let caps = self.build_capabilities();
        info!(
            endpoint = %self.config.webdriver_url,
            engine = ?self.engine,
            "opening WebDriver session"
        );
        let client = ClientBuilder::native()
            .capabilities(caps)
            .connect(&self.config.webdriver_url)
            .await?;
        client
            .set_window_size(self.config.viewport.width, self.config.viewport.height)
            .await?;
        self.client = Some(client);
        self.state.initialized = true;
        info!("WebDriver session established");
        Ok(())
    }

    /// Scripts run through the WebDriver execute endpoint are function
    /// bodies, so expressions must be returned explicitly
    async fn eval_script(&self, script: &str) -> std::result::Result<Value, String> {
        let client = self.client().map_err(|e| e.to_string())?;
        client
            .execute(&format!("return {script};"), vec![])
            .await
            .map_err(|e| e.to_string())
    }

    async fn apply_stealth(&self) {
        if let Ok(client) = self.client() {
            for script in StealthMode::scripts() {
                if let Err(e) = client.execute(script, vec![]).await {
                    debug!("stealth script rejected: {e}");
                }
            }
        }
    }

    async fn page_url(&self) -> Result<String> {
        let client = self.client()?;
        Ok(client.current_url().await?.to_string())
    }

    async fn challenge_marker(&self) -> Option<String> {
        match self.eval_script(CHALLENGE_PROBE_JS.trim()).await {
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

    /// One strategy of the full cascade
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
                self.attempt_locator(Locator::Css(desc.raw()), action).await
            }
            Strategy::ExactText => {
                let xpath = cascade::xpath_exact_text(desc);
                self.attempt_locator(Locator::XPath(&xpath), action).await
            }
            Strategy::RoleName => {
                let xpath = cascade::xpath_role_name(desc, action);
                self.attempt_locator(Locator::XPath(&xpath), action).await
            }
            Strategy::AttributeSubstring => {
                let xpath = cascade::xpath_attribute_substring(desc);
                self.attempt_locator(Locator::XPath(&xpath), action).await
            }
            Strategy::StructuralPath => match cascade::xpath_structural_path(desc) {
                Some(xpath) => self.attempt_locator(Locator::XPath(&xpath), action).await,
                None => Ok(false),
            },
            Strategy::DomScan => {
                let script = cascade::dom_scan_script(desc, action);
                let matched = self.eval_script(&script).await?.as_bool().unwrap_or(false);
                if !matched {
                    return Ok(false);
                }
                if let ActionRequest::Type(text) = action {
                    let client = self.client().map_err(|e| e.to_string())?;
                    let element = client.active_element().await.map_err(|e| e.to_string())?;
                    self.type_into_element(&element, text).await?;
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

    async fn attempt_locator(
        &self,
        locator: Locator<'_>,
        action: &ActionRequest,
    ) -> std::result::Result<bool, String> {
        let client = self.client().map_err(|e| e.to_string())?;
        let element = match client.find(locator).await {
            Ok(element) => element,
            Err(_) => return Ok(false),
        };
        self.act_on_element(&element, action).await.map(|_| true)
    }

    async fn act_on_element(
        &self,
        element: &Element,
        action: &ActionRequest,
    ) -> std::result::Result<(), String> {
        match action {
            ActionRequest::Click => {
                if self.humanizer.enabled() {
                    self.humanizer.hesitate().await;
                    self.glide_to(element).await;
                }
                element.click().await.map_err(|e| e.to_string())
            }
            ActionRequest::Type(text) => {
                element.click().await.map_err(|e| e.to_string())?;
                self.type_into_element(element, text).await
            }
            ActionRequest::Extract => Ok(()),
        }
    }

    /// Humanized pointer approach; failures are cosmetic and ignored
    async fn glide_to(&self, element: &Element) {
        if let Ok(client) = self.client() {
            let actions =
                MouseActions::new("mouse".to_string()).then(PointerAction::MoveToElement {
                    element: element.clone(),
                    duration: Some(Duration::from_millis(180)),
                    x: 0.0,
                    y: 0.0,
                });
            let _ = client.perform_actions(actions).await;
            let _ = client.release_actions().await;
        }
    }

    /// Pointer click at a raw viewport position, approached along the
    /// simulator's Bézier path
    async fn click_at(&self, x: f64, y: f64) -> std::result::Result<(), String> {
        let client = self.client().map_err(|e| e.to_string())?;
        let start = (x * 0.3 + 40.0, y * 0.6 + 30.0);
        let mut actions = MouseActions::new("mouse".to_string());
        for (px, py) in self.humanizer.mouse_path(start, (x, y), 10) {
            actions = actions.then(PointerAction::MoveTo {
                duration: Some(Duration::from_millis(16)),
                x: px as f64,
                y: py as f64,
            });
        }
        actions = actions
            .then(PointerAction::Down {
                button: MOUSE_BUTTON_LEFT,
            })
            .then(PointerAction::Up {
                button: MOUSE_BUTTON_LEFT,
            });
        client
            .perform_actions(actions)
            .await
            .map_err(|e| e.to_string())?;
        let _ = client.release_actions().await;
        Ok(())
    }

    /// Humanized typing with the content-fidelity guarantee: whatever the
    /// noise branch did, the committed value must equal `text` exactly
    async fn type_into_element(
        &self,
        element: &Element,
        text: &str,
    ) -> std::result::Result<(), String> {
        element.clear().await.map_err(|e| e.to_string())?;
        let plan = if self.humanizer.enabled() {
            self.humanizer.typing_plan(text)
        } else {
            text.chars().map(TypeStep::Char).collect()
        };
        for step in plan {
            match step {
                TypeStep::Char(c) => {
                    element
                        .send_keys(&c.to_string())
                        .await
                        .map_err(|e| e.to_string())?;
                }
                TypeStep::Backspace => {
                    element
                        .send_keys(&Key::Backspace.to_string())
                        .await
                        .map_err(|e| e.to_string())?;
                }
            }
            if self.humanizer.enabled() {
                self.humanizer.keystroke_gap().await;
            }
        }

        let committed = element.prop("value").await.map_err(|e| e.to_string())?;
        if committed.as_deref() != Some(text) {
            warn!("typed value drifted, forcing exact text");
            let client = self.client().map_err(|e| e.to_string())?;
            let arg = serde_json::to_value(element).map_err(|e| e.to_string())?;
            client
                .execute(
                    "arguments[0].value = arguments[1]; \
                     arguments[0].dispatchEvent(new Event('input', {bubbles: true})); \
                     arguments[0].dispatchEvent(new Event('change', {bubbles: true}));",
                    vec![arg, Value::String(text.to_string())],
                )
                .await
                .map_err(|e| e.to_string())?;
        }
        Ok(())
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

    /// No wire-level network events exist over WebDriver; idle is derived
    /// from the resource-timing entry count staying stable for the full
    /// settle window
    async fn wait_network_idle(&self, timeout: Duration) -> Result<bool> {
        let deadline = tokio::time::Instant::now() + timeout;
        let mut last_count: i64 = -1;
        let mut last_change = tokio::time::Instant::now();
        loop {
            let count = self
                .eval_script("performance.getEntriesByType('resource').length")
                .await
                .ok()
                .and_then(|v| v.as_i64())
                .unwrap_or(0);
            let now = tokio::time::Instant::now();
            if count != last_count {
                last_count = count;
                last_change = now;
            } else if now.duration_since(last_change) >= NETWORK_SETTLE {
                return Ok(true);
            }
            if now >= deadline {
                return Ok(false);
            }
            tokio::time::sleep(VISIBILITY_POLL).await;
        }
    }

    async fn document_html(&self) -> Result<String> {
        let client = self.client()?;
        Ok(client.source().await?)
    }
}

fn webdriver_key(key: &str) -> String {
    match key.trim().to_ascii_lowercase().as_str() {
        "enter" | "return" => Key::Enter.to_string(),
        "tab" => Key::Tab.to_string(),
        "escape" | "esc" => Key::Escape.to_string(),
        "backspace" => Key::Backspace.to_string(),
        "delete" => Key::Delete.to_string(),
        "space" => Key::Space.to_string(),
        "arrowup" | "up" => Key::Up.to_string(),
        "arrowdown" | "down" => Key::Down.to_string(),
        "arrowleft" | "left" => Key::Left.to_string(),
        "arrowright" | "right" => Key::Right.to_string(),
        "home" => Key::Home.to_string(),
        "end" => Key::End.to_string(),
        "pageup" => Key::PageUp.to_string(),
        "pagedown" => Key::PageDown.to_string(),
        other => other.to_string(),
    }
}

#[async_trait]
impl BrowserBackend for WebDriverBackend {
    #[instrument(skip(self))]
    async fn initialize(&mut self) -> bool {
        if self.state.initialized {
            return true;
        }
        match self.boot().await {
            Ok(()) => true,
            Err(e) => {
                warn!(endpoint = %self.config.webdriver_url, "initialization failed: {e}");
                false
            }
        }
    }

    #[instrument(skip(self))]
    async fn close(&mut self) -> Result<()> {
        if let Some(client) = self.client.take() {
            client.close().await?;
        }
        self.state.initialized = false;
        info!("WebDriver session closed");
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
        let nav = {
            let client = self.client()?;
            tokio::time::timeout(timeout, client.goto(&target)).await
        };
        match nav {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                warn!(url = %target, "navigation failed: {e}");
                return Ok(false);
            }
            Err(_) => {
                warn!(url = %target, "navigation timed out after {}ms", self.config.timeout_ms);
                return Ok(false);
            }
        }
        self.apply_stealth().await;
        let final_url = self.page_url().await.unwrap_or_else(|_| target.clone());
        self.state.record_navigation(final_url);
        debug!(url = %target, "navigation complete");
        Ok(true)
    }

    #[instrument(skip(self))]
    async fn click(&mut self, target: &str) -> Result<bool> {
        self.run_interaction(target, ActionRequest::Click, Strategy::CLICK_ORDER)
            .await
    }

    #[instrument(skip(self, text))]
    async fn type_text(&mut self, target: &str, text: &str) -> Result<bool> {
        self.run_interaction(
            target,
            ActionRequest::Type(text.to_string()),
            Strategy::TYPE_ORDER,
        )
        .await
    }

    #[instrument(skip(self))]
    async fn press_key(&mut self, key: &str) -> Result<bool> {
        self.pre_action().await?;
        let client = self.client()?;
        let element = client.active_element().await?;
        element.send_keys(&webdriver_key(key)).await?;
        Ok(true)
    }

    #[instrument(skip(self))]
    async fn screenshot(&mut self, path: &Path) -> Result<Option<PathBuf>> {
        if !self.state.initialized {
            return Err(Error::NotInitialized);
        }
        let bytes = match self.client()?.screenshot().await {
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
                let deadline = tokio::time::Instant::now() + timeout;
                loop {
                    let ready = self
                        .eval_script("document.readyState")
                        .await
                        .ok()
                        .and_then(|v| v.as_str().map(str::to_string));
                    if ready.as_deref() == Some("complete") {
                        return Ok(true);
                    }
                    if tokio::time::Instant::now() >= deadline {
                        return Ok(false);
                    }
                    tokio::time::sleep(VISIBILITY_POLL).await;
                }
            }
            WaitFor::NetworkIdle => self.wait_network_idle(timeout).await,
            WaitFor::Navigation => {
                let before = self.page_url().await.unwrap_or_default();
                let deadline = tokio::time::Instant::now() + timeout;
                loop {
                    tokio::time::sleep(VISIBILITY_POLL).await;
                    let now = self.page_url().await.unwrap_or_default();
                    if now != before {
                        return Ok(true);
                    }
                    if tokio::time::Instant::now() >= deadline {
                        return Ok(false);
                    }
                }
            }
            WaitFor::Visible(target) => {
                let desc = TargetDescriptor::new(&target);
                if desc.looks_structural() {
                    let client = self.client()?;
                    return Ok(client
                        .wait()
                        .at_most(timeout)
                        .for_element(Locator::Css(desc.raw()))
                        .await
                        .is_ok());
                }
                let probe = cascade::visibility_probe_script(&desc);
                let deadline = tokio::time::Instant::now() + timeout;
                loop {
                    if let Ok(Value::Bool(true)) = self.eval_script(&probe).await {
                        return Ok(true);
                    }
                    if tokio::time::Instant::now() >= deadline {
                        return Ok(false);
                    }
                    tokio::time::sleep(VISIBILITY_POLL).await;
                }
            }
        }
    }

    #[instrument(skip(self, script, args))]
    async fn evaluate(&mut self, script: &str, args: Vec<Value>) -> Result<Value> {
        if !self.state.initialized {
            return Err(Error::NotInitialized);
        }
        let client = self.client()?;
        // WebDriver scripts are function bodies with an arguments array,
        // which matches the contract directly
        let wrapped = format!("return {script};");
        client
            .execute(&wrapped, args)
            .await
            .map_err(|e| Error::EvaluationFailed(e.to_string()))
    }

    async fn current_url(&mut self) -> Result<String> {
        self.page_url().await
    }

    async fn title(&mut self) -> Result<String> {
        let client = self.client()?;
        Ok(client.title().await?)
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
        let cookies = {
            let client = self.client()?;
            client.get_all_cookies().await?
        };
        let stored: Vec<StoredCookie> = cookies
            .iter()
            .map(|c| StoredCookie {
                name: c.name().to_string(),
                value: c.value().to_string(),
                domain: c.domain().map(str::to_string),
                path: c.path().map(str::to_string),
                secure: c.secure().unwrap_or(false),
                http_only: c.http_only().unwrap_or(false),
                expires: None,
            })
            .collect();

        let storage = self
            .eval_script(DUMP_STORAGE_JS)
            .await
            .map_err(Error::EvaluationFailed)?;
        let (local, session) = match storage {
            Value::Object(mut map) => (
                serde_json::from_value(map.remove("local").unwrap_or(Value::Null))
                    .unwrap_or_default(),
                serde_json::from_value(map.remove("session").unwrap_or(Value::Null))
                    .unwrap_or_default(),
            ),
            _ => Default::default(),
        };

        let snapshot = SessionSnapshot {
            saved_at: None,
            url: self.page_url().await.ok(),
            cookies: stored,
            local_storage: local,
            session_storage: session,
        };
        snapshot.write(path).await?;
        Ok(true)
    }

    #[instrument(skip(self))]
    async fn load_session(&mut self, path: &Path) -> Result<bool> {
        let snapshot = SessionSnapshot::read(path).await?;
        // cookies can only be added for the origin currently loaded
        if let Some(url) = snapshot.url.clone() {
            self.navigate(&url).await?;
        }
        {
            let client = self.client()?;
            for stored in &snapshot.cookies {
                let mut cookie = Cookie::new(stored.name.clone(), stored.value.clone());
                if let Some(domain) = &stored.domain {
                    cookie.set_domain(domain.clone());
                }
                if let Some(cookie_path) = &stored.path {
                    cookie.set_path(cookie_path.clone());
                }
                cookie.set_secure(stored.secure);
                cookie.set_http_only(stored.http_only);
                if let Err(e) = client.add_cookie(cookie).await {
                    debug!(cookie = %stored.name, "cookie rejected on restore: {e}");
                }
            }
            for (key, value) in &snapshot.local_storage {
                let _ = client
                    .execute(
                        "localStorage.setItem(arguments[0], arguments[1]);",
                        vec![json!(key), json!(value)],
                    )
                    .await;
            }
            for (key, value) in &snapshot.session_storage {
                let _ = client
                    .execute(
                        "sessionStorage.setItem(arguments[0], arguments[1]);",
                        vec![json!(key), json!(value)],
                    )
                    .await;
            }
            client.refresh().await?;
        }
        debug!(cookies = snapshot.cookies.len(), "session restored");
        Ok(true)
    }

    async fn set_proxy(&mut self, _proxy: &str) -> Result<bool> {
        // accepted only at construction time
        Err(Error::Unsupported(
            "proxy cannot be changed on a live WebDriver session".to_string(),
        ))
    }

    fn name(&self) -> &'static str {
        match self.engine {
            DriverEngine::Chromium => "webdriver-chromium",
            DriverEngine::Firefox => "webdriver-firefox",
            DriverEngine::Webkit => "webdriver-webkit",
        }
    }

    fn session(&self) -> &SessionState {
        &self.state
    }
}

const DUMP_STORAGE_JS: &str = r#"(() => {
    const dump = (s) => {
        const out = {};
        for (let i = 0; i < s.length; i++) {
            const k = s.key(i);
            out[k] = s.getItem(k);
        }
        return out;
    };
    try {
        return {local: dump(localStorage), session: dump(sessionStorage)};
    } catch (e) {
        return {local: {}, session: {}};
    }
})()"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_backend_is_uninitialized() {
        let backend = WebDriverBackend::new(DriveConfig::default());
        assert!(!backend.session().initialized);
        assert_eq!(backend.name(), "webdriver-chromium");
    }

    #[test]
    fn test_backend_name_tracks_engine() {
        let config = DriveConfig::builder()
            .driver_engine(DriverEngine::Firefox)
            .build();
        assert_eq!(WebDriverBackend::new(config).name(), "webdriver-firefox");
        let config = DriveConfig::builder()
            .driver_engine(DriverEngine::Webkit)
            .build();
        assert_eq!(WebDriverBackend::new(config).name(), "webdriver-webkit");
    }

    #[test]
    fn test_capabilities_chromium() {
        let config = DriveConfig::builder()
            .user_agent("TestBot/2.0")
            .proxy("http://127.0.0.1:8080")
            .arg("--mute-audio")
            .build();
        let backend = WebDriverBackend::new(config);
        let caps = backend.build_capabilities();

        let chrome = caps.get("goog:chromeOptions").unwrap();
        let args: Vec<String> = chrome["args"]
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_str().unwrap().to_string())
            .collect();
        assert!(args.contains(&"--headless=new".to_string()));
        assert!(args.contains(&"--user-agent=TestBot/2.0".to_string()));
        assert!(args.contains(&"--mute-audio".to_string()));
        assert!(args.iter().any(|a| a.starts_with("--window-size=")));

        assert_eq!(caps["proxy"]["proxyType"], "manual");
        assert_eq!(caps["unhandledPromptBehavior"], "accept");
    }

    #[test]
    fn test_capabilities_firefox_and_webkit() {
        let config = DriveConfig::builder()
            .driver_engine(DriverEngine::Firefox)
            .dialog_policy(DialogPolicy::Dismiss)
            .build();
        let caps = WebDriverBackend::new(config).build_capabilities();
        let firefox = caps.get("moz:firefoxOptions").unwrap();
        assert!(firefox["args"]
            .as_array()
            .unwrap()
            .contains(&json!("-headless")));
        assert_eq!(caps["unhandledPromptBehavior"], "dismiss");

        let config = DriveConfig::builder()
            .driver_engine(DriverEngine::Webkit)
            .build();
        let caps = WebDriverBackend::new(config).build_capabilities();
        assert_eq!(caps["browserName"], "safari");
        assert!(caps.get("goog:chromeOptions").is_none());
    }

    #[test]
    fn test_webdriver_key_mapping() {
        assert_eq!(webdriver_key("Enter"), Key::Enter.to_string());
        assert_eq!(webdriver_key("escape"), Key::Escape.to_string());
        assert_eq!(webdriver_key("ArrowDown"), Key::Down.to_string());
        assert_eq!(webdriver_key("x"), "x");
    }
}
