//! Backend factory
//!
//! Maps caller configuration plus environment detection onto one concrete
//! backend. The backend set is closed: selection happens here, once, and
//! callers only ever see the capability contract.

use tracing::{debug, info};

use crate::browser::{BrowserBackend, CdpBackend, HybridBackend, WebDriverBackend};
use crate::config::{BrowserChoice, DriveConfig};
use crate::detect::{CapabilityReport, EngineId, EnvironmentDetector};

/// Build an uninitialized backend for the configuration. The caller must
/// still run `initialize()` and may fall back to a fresh session with a
/// different configuration when that returns `false`.
pub fn create_backend(config: DriveConfig) -> Box<dyn BrowserBackend> {
    let report = match config.browser {
        BrowserChoice::Auto => Some(EnvironmentDetector::detect()),
        _ => None,
    };
    create_backend_with_report(config, report)
}

/// Factory seam with an injectable detection report, so selection rules
/// are testable without probing the host
pub fn create_backend_with_report(
    config: DriveConfig,
    report: Option<CapabilityReport>,
) -> Box<dyn BrowserBackend> {
    let backend: Box<dyn BrowserBackend> = match config.browser {
        BrowserChoice::Auto => {
            let report = report.unwrap_or_else(EnvironmentDetector::detect);
            match report.preferred() {
                Some(EngineId::ChromeCdp) if config.use_low_level_protocol => {
                    Box::new(CdpBackend::new(config, EngineId::ChromeCdp))
                }
                Some(EngineId::EdgeCdp) if config.use_low_level_protocol => {
                    // a managed Edge install is not practical to drive raw
                    Box::new(HybridBackend::new(config, EngineId::EdgeCdp))
                }
                Some(EngineId::ChromeCdp) | Some(EngineId::EdgeCdp) => {
                    Box::new(WebDriverBackend::new(config))
                }
                _ => {
                    debug!("no protocol-capable engine detected, using the driver backend");
                    Box::new(WebDriverBackend::new(config))
                }
            }
        }
        BrowserChoice::ProtocolPrimary => {
            if config.use_low_level_protocol {
                Box::new(CdpBackend::new(config, EngineId::ChromeCdp))
            } else {
                Box::new(WebDriverBackend::new(config))
            }
        }
        BrowserChoice::ProtocolSecondary => {
            if config.use_low_level_protocol {
                Box::new(HybridBackend::new(config, EngineId::EdgeCdp))
            } else {
                Box::new(WebDriverBackend::new(config))
            }
        }
        BrowserChoice::DriverDefault => Box::new(WebDriverBackend::new(config)),
    };
    info!(backend = backend.name(), "backend selected");
    backend
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DriveConfig;
    use crate::detect::EnvironmentDetector;

    fn report_with(hit: &'static [&'static str]) -> CapabilityReport {
        EnvironmentDetector::detect_with(|name| hit.iter().any(|h| name.contains(h)))
    }

    #[test]
    fn test_explicit_primary_honors_protocol_flag() {
        let low = create_backend_with_report(
            DriveConfig::builder()
                .browser(BrowserChoice::ProtocolPrimary)
                .build(),
            None,
        );
        assert_eq!(low.name(), "cdp-chrome");

        let high = create_backend_with_report(
            DriveConfig::builder()
                .browser(BrowserChoice::ProtocolPrimary)
                .use_low_level_protocol(false)
                .build(),
            None,
        );
        assert_eq!(high.name(), "webdriver-chromium");
    }

    #[test]
    fn test_explicit_secondary_maps_to_hybrid() {
        let backend = create_backend_with_report(
            DriveConfig::builder()
                .browser(BrowserChoice::ProtocolSecondary)
                .build(),
            None,
        );
        assert_eq!(backend.name(), "hybrid-edge");
    }

    #[test]
    fn test_driver_default_is_webdriver() {
        let backend = create_backend_with_report(
            DriveConfig::builder()
                .browser(BrowserChoice::DriverDefault)
                .build(),
            None,
        );
        assert_eq!(backend.name(), "webdriver-chromium");
    }

    #[test]
    fn test_auto_with_empty_report_falls_back_to_webdriver() {
        // detection found nothing runnable: selection must still succeed
        let report = EnvironmentDetector::detect_with(|_| false);
        assert_eq!(report.preferred(), Some(EngineId::Driver));
        let backend = create_backend_with_report(DriveConfig::default(), Some(report));
        assert_eq!(backend.name(), "webdriver-chromium");
        assert!(!backend.session().initialized);
    }

    #[test]
    fn test_auto_prefers_protocol_chrome() {
        let backend =
            create_backend_with_report(DriveConfig::default(), Some(report_with(&["chrome"])));
        assert_eq!(backend.name(), "cdp-chrome");
    }

    #[test]
    fn test_auto_edge_only_selects_hybrid() {
        let backend =
            create_backend_with_report(DriveConfig::default(), Some(report_with(&["edge"])));
        assert_eq!(backend.name(), "hybrid-edge");
    }

    #[test]
    fn test_auto_without_protocol_flag_uses_webdriver() {
        let config = DriveConfig::builder().use_low_level_protocol(false).build();
        let backend = create_backend_with_report(config, Some(report_with(&["chrome"])));
        assert_eq!(backend.name(), "webdriver-chromium");
    }
}
