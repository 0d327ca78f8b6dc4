//! Detection evasion
//!
//! Techniques to make the automated browser look like a regular user
//! browser. Best-effort only: this reduces common detection signals, it
//! does not guarantee undetectable automation.

use chromiumoxide::cdp::browser_protocol::page::AddScriptToEvaluateOnNewDocumentParams;
use chromiumoxide::Page;
use tracing::{debug, instrument};

use crate::error::{Error, Result};

const HIDE_WEBDRIVER: &str = r#"
    Object.defineProperty(navigator, 'webdriver', {
        get: () => undefined,
        configurable: true
    });
"#;

const MOCK_CHROME_RUNTIME: &str = r#"
    if (!window.chrome) {
        window.chrome = {};
    }
    if (!window.chrome.runtime) {
        window.chrome.runtime = {
            connect: function() {},
            sendMessage: function() {},
            onMessage: {
                addListener: function() {},
                removeListener: function() {}
            }
        };
    }
"#;

const OVERRIDE_WEBGL: &str = r#"
    const getParameterOriginal = WebGLRenderingContext.prototype.getParameter;
    WebGLRenderingContext.prototype.getParameter = function(parameter) {
        // UNMASKED_VENDOR_WEBGL
        if (parameter === 37445) {
            return 'Intel Inc.';
        }
        // UNMASKED_RENDERER_WEBGL
        if (parameter === 37446) {
            return 'Intel Iris OpenGL Engine';
        }
        return getParameterOriginal.call(this, parameter);
    };
"#;

const MOCK_PLUGINS: &str = r#"
    Object.defineProperty(navigator, 'plugins', {
        get: () => {
            const plugins = [
                { name: 'Chrome PDF Plugin', filename: 'internal-pdf-viewer' },
                { name: 'Chrome PDF Viewer', filename: 'mhjfbmdgcfjbbpaeojofohoefgiehjai' },
                { name: 'Native Client', filename: 'internal-nacl-plugin' }
            ];
            plugins.item = (i) => plugins[i];
            plugins.namedItem = (name) => plugins.find(p => p.name === name);
            plugins.refresh = () => {};
            return plugins;
        },
        configurable: true
    });
"#;

const MOCK_LANGUAGES: &str = r#"
    Object.defineProperty(navigator, 'languages', {
        get: () => ['en-US', 'en'],
        configurable: true
    });
    Object.defineProperty(navigator, 'language', {
        get: () => 'en-US',
        configurable: true
    });
"#;

const HIDE_AUTOMATION_INDICATORS: &str = r#"
    if (navigator.permissions) {
        const originalQuery = navigator.permissions.query;
        navigator.permissions.query = (parameters) => (
            parameters.name === 'notifications' ?
                Promise.resolve({ state: Notification.permission }) :
                originalQuery(parameters)
        );
    }
    if (!navigator.connection) {
        Object.defineProperty(navigator, 'connection', {
            get: () => ({
                effectiveType: '4g',
                rtt: 50,
                downlink: 10,
                saveData: false
            }),
            configurable: true
        });
    }
"#;

/// Stealth configuration and application
pub struct StealthMode;

impl StealthMode {
    /// The evasion scripts, in application order
    pub fn scripts() -> &'static [&'static str] {
        &[
            HIDE_WEBDRIVER,
            MOCK_CHROME_RUNTIME,
            OVERRIDE_WEBGL,
            MOCK_PLUGINS,
            MOCK_LANGUAGES,
            HIDE_AUTOMATION_INDICATORS,
        ]
    }

    /// Register every evasion script to run on each new document of a
    /// CDP-controlled page
    #[instrument(skip(page))]
    pub async fn apply_cdp(page: &Page) -> Result<()> {
        for script in Self::scripts() {
            let params = AddScriptToEvaluateOnNewDocumentParams::builder()
                .source(*script)
                .build()
                .map_err(|e| Error::cdp(format!("failed to build script params: {e}")))?;
            page.execute(params)
                .await
                .map_err(|e| Error::cdp(format!("failed to inject stealth script: {e}")))?;
        }
        debug!("stealth scripts registered");
        Ok(())
    }

    /// Launch arguments that remove automation banners and fingerprints
    /// from chromium-family engines
    pub fn launch_args() -> Vec<String> {
        [
            "--disable-blink-features=AutomationControlled",
            "--no-first-run",
            "--no-default-browser-check",
            "--disable-infobars",
            "--disable-background-networking",
            "--disable-dev-shm-usage",
            "--mute-audio",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect()
    }
}
