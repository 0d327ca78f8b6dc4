//! ghostdrive - Human-Paced Browser Automation
//!
//! This crate drives a browser programmatically while reducing common
//! bot-detection signals. One capability contract is implemented by three
//! transport backends, selected once per session by a factory:
//!
//! - a raw remote-debugging-protocol driver ([`browser::CdpBackend`])
//! - a hybrid managed-launch/protocol backend ([`browser::HybridBackend`])
//! - a WebDriver backend spanning three rendering engines
//!   ([`browser::WebDriverBackend`])
//!
//! Every interaction resolves its target through an ordered cascade of
//! locator strategies and routes its timing and motion through a seedable
//! human-interaction simulator.
//!
//! # Architecture
//!
//! ```text
//! caller ──▶ Backend Factory ──▶ concrete Backend (capability contract)
//!                 │                      │
//!                 ▼                      ▼
//!          Environment Detector   Element Resolution Cascade
//!                                        │
//!                          ┌─────────────┴─────────────┐
//!                          ▼                           ▼
//!                 Human Interaction Simulator   Intervention State Machine
//! ```
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use ghostdrive::browser::{create_backend, WaitFor};
//! use ghostdrive::config::DriveConfig;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut session = create_backend(DriveConfig::default());
//!     if !session.initialize().await {
//!         return Err("no usable browser backend".into());
//!     }
//!
//!     session.navigate("example.com").await?;
//!     session.wait(WaitFor::NetworkIdle).await?;
//!     session.click("More information").await?;
//!     session.close().await?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod browser;
pub mod cascade;
pub mod config;
pub mod detect;
pub mod error;
pub mod extraction;
pub mod humanize;
pub mod intervention;
pub mod session;

// Re-exports for convenience
pub use browser::{create_backend, BrowserBackend, ContentKind, PageContent, WaitFor};
pub use cascade::{Strategy, TargetDescriptor};
pub use config::{BrowserChoice, DriveConfig};
pub use detect::{CapabilityReport, EngineId, EnvironmentDetector};
pub use error::{Error, Result};
pub use humanize::Humanizer;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
