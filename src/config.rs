//! Session configuration
//!
//! An explicit immutable configuration value handed to the factory and each
//! backend at construction time. Nothing in the crate reads configuration
//! from globals or the environment.

use serde::{Deserialize, Serialize};

/// Which backend the factory should build
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum BrowserChoice {
    /// Probe the environment and pick the best available transport
    #[default]
    Auto,
    /// Raw debugging protocol against the primary chromium-family engine
    ProtocolPrimary,
    /// Debugging protocol against the secondary chromium-family engine
    ProtocolSecondary,
    /// High-level WebDriver transport
    DriverDefault,
}

/// Which rendering engine the WebDriver backend should request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DriverEngine {
    /// Blink via chromedriver
    #[default]
    Chromium,
    /// Gecko via geckodriver
    Firefox,
    /// WebKit via safaridriver
    Webkit,
}

/// What to do with native JavaScript dialogs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DialogPolicy {
    /// Accept alerts/confirms/prompts
    #[default]
    Accept,
    /// Dismiss them
    Dismiss,
}

/// Viewport dimensions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    /// Width in CSS pixels
    pub width: u32,
    /// Height in CSS pixels
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
        }
    }
}

/// Configuration for one browser session
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DriveConfig {
    /// Backend selection (`"auto"` or an explicit transport)
    #[serde(rename = "browserType")]
    pub browser: BrowserChoice,
    /// Prefer the raw debugging protocol over the high-level driver when
    /// both can target the same engine
    pub use_low_level_protocol: bool,
    /// Run without a visible window (default: true)
    pub headless: bool,
    /// Viewport dimensions
    pub viewport: Viewport,
    /// Default timeout for navigation and waits, in milliseconds
    pub timeout_ms: u64,
    /// Additional engine launch arguments
    pub extra_launch_args: Vec<String>,
    /// User agent override (None = drawn from the simulator's pool)
    pub user_agent: Option<String>,
    /// Proxy server, construction-time only
    pub proxy: Option<String>,
    /// Humanized timing and motion (default: true)
    pub humanize: bool,
    /// Seed for the interaction simulator's RNG (None = OS entropy)
    pub rng_seed: Option<u64>,
    /// Native dialog handling policy
    pub dialog_policy: DialogPolicy,
    /// Local debugging port for the protocol driver
    pub debug_port: u16,
    /// WebDriver endpoint for the high-level backend
    pub webdriver_url: String,
    /// Rendering engine for the high-level backend
    pub driver_engine: DriverEngine,
    /// Explicit engine binary (None = auto-detect)
    pub binary_path: Option<String>,
}

impl Default for DriveConfig {
    fn default() -> Self {
        Self {
            browser: BrowserChoice::Auto,
            use_low_level_protocol: true,
            headless: true,
            viewport: Viewport::default(),
            timeout_ms: 30000,
            extra_launch_args: Vec::new(),
            user_agent: None,
            proxy: None,
            humanize: true,
            rng_seed: None,
            dialog_policy: DialogPolicy::Accept,
            debug_port: 9222,
            webdriver_url: "http://localhost:9515".to_string(),
            driver_engine: DriverEngine::Chromium,
            binary_path: None,
        }
    }
}

impl DriveConfig {
    /// Create a new config builder
    pub fn builder() -> DriveConfigBuilder {
        DriveConfigBuilder::default()
    }
}

/// Builder for [`DriveConfig`]
#[derive(Default)]
pub struct DriveConfigBuilder {
    config: DriveConfig,
}

impl DriveConfigBuilder {
    /// Set the backend selection
    pub fn browser(mut self, choice: BrowserChoice) -> Self {
        self.config.browser = choice;
        self
    }

    /// Prefer or avoid the raw debugging protocol
    pub fn use_low_level_protocol(mut self, low_level: bool) -> Self {
        self.config.use_low_level_protocol = low_level;
        self
    }

    /// Set headless mode
    pub fn headless(mut self, headless: bool) -> Self {
        self.config.headless = headless;
        self
    }

    /// Set viewport dimensions
    pub fn viewport(mut self, width: u32, height: u32) -> Self {
        self.config.viewport = Viewport { width, height };
        self
    }

    /// Set the default timeout
    pub fn timeout_ms(mut self, ms: u64) -> Self {
        self.config.timeout_ms = ms;
        self
    }

    /// Add an extra launch argument
    pub fn arg<S: Into<String>>(mut self, arg: S) -> Self {
        self.config.extra_launch_args.push(arg.into());
        self
    }

    /// Set a user agent override
    pub fn user_agent<S: Into<String>>(mut self, ua: S) -> Self {
        self.config.user_agent = Some(ua.into());
        self
    }

    /// Set a proxy server
    pub fn proxy<S: Into<String>>(mut self, proxy: S) -> Self {
        self.config.proxy = Some(proxy.into());
        self
    }

    /// Enable/disable humanized timing and motion
    pub fn humanize(mut self, humanize: bool) -> Self {
        self.config.humanize = humanize;
        self
    }

    /// Seed the interaction simulator
    pub fn rng_seed(mut self, seed: u64) -> Self {
        self.config.rng_seed = Some(seed);
        self
    }

    /// Set the dialog handling policy
    pub fn dialog_policy(mut self, policy: DialogPolicy) -> Self {
        self.config.dialog_policy = policy;
        self
    }

    /// Set the local debugging port
    pub fn debug_port(mut self, port: u16) -> Self {
        self.config.debug_port = port;
        self
    }

    /// Set the WebDriver endpoint
    pub fn webdriver_url<S: Into<String>>(mut self, url: S) -> Self {
        self.config.webdriver_url = url.into();
        self
    }

    /// Set the rendering engine for the high-level backend
    pub fn driver_engine(mut self, engine: DriverEngine) -> Self {
        self.config.driver_engine = engine;
        self
    }

    /// Set an explicit engine binary path
    pub fn binary_path<S: Into<String>>(mut self, path: S) -> Self {
        self.config.binary_path = Some(path.into());
        self
    }

    /// Build the config
    pub fn build(self) -> DriveConfig {
        self.config
    }
}
