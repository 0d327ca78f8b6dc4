//! Environment detection
//!
//! Probes the host for installed browser engines so the factory can pick a
//! transport without the caller naming one.

use std::path::Path;
use std::process::Command;

use tracing::debug;

/// A backend the host is able to run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineId {
    /// Chrome/Chromium reachable over the debugging protocol
    ChromeCdp,
    /// Edge reachable over the debugging protocol
    EdgeCdp,
    /// Generic WebDriver transport, assumed always runnable
    Driver,
}

impl EngineId {
    /// Stable identifier used in logs and reports
    pub fn as_str(&self) -> &'static str {
        match self {
            EngineId::ChromeCdp => "cdp-chrome",
            EngineId::EdgeCdp => "cdp-edge",
            EngineId::Driver => "webdriver",
        }
    }
}

/// Result of one detection run. Never mutated after creation; recomputed
/// each time detection runs.
#[derive(Debug, Clone)]
pub struct CapabilityReport {
    engines: Vec<EngineId>,
}

impl CapabilityReport {
    /// All detected engines, in priority order, de-duplicated
    pub fn engines(&self) -> &[EngineId] {
        &self.engines
    }

    /// The preferred engine, if any was detected
    pub fn preferred(&self) -> Option<EngineId> {
        self.engines.first().copied()
    }

    /// Whether a specific engine was detected
    pub fn supports(&self, engine: EngineId) -> bool {
        self.engines.contains(&engine)
    }
}

const CHROME_BINARIES: &[&str] = &[
    "google-chrome",
    "google-chrome-stable",
    "chromium",
    "chromium-browser",
    "chrome",
];

const CHROME_PATHS: &[&str] = &[
    "/usr/bin/google-chrome",
    "/usr/bin/google-chrome-stable",
    "/usr/bin/chromium",
    "/usr/bin/chromium-browser",
    "/snap/bin/chromium",
    "/opt/google/chrome/chrome",
    "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
    "/Applications/Chromium.app/Contents/MacOS/Chromium",
    "C:\\Program Files\\Google\\Chrome\\Application\\chrome.exe",
    "C:\\Program Files (x86)\\Google\\Chrome\\Application\\chrome.exe",
];

const EDGE_BINARIES: &[&str] = &["microsoft-edge", "microsoft-edge-stable", "msedge"];

const EDGE_PATHS: &[&str] = &[
    "/usr/bin/microsoft-edge",
    "/usr/bin/microsoft-edge-stable",
    "/opt/microsoft/msedge/msedge",
    "/Applications/Microsoft Edge.app/Contents/MacOS/Microsoft Edge",
    "C:\\Program Files (x86)\\Microsoft\\Edge\\Application\\msedge.exe",
];

/// Probes the host filesystem and `PATH` for known engines
pub struct EnvironmentDetector;

impl EnvironmentDetector {
    /// Run detection against the real host: fixed filesystem locations
    /// plus shell lookups on `PATH`
    pub fn detect() -> CapabilityReport {
        Self::detect_with(|candidate| Path::new(candidate).is_file() || Self::lookup(candidate))
    }

    /// Detection with an injected candidate probe, so the priority and
    /// de-duplication rules are testable without touching the host. The
    /// probe is consulted for every known path and binary name.
    pub fn detect_with<F>(probe: F) -> CapabilityReport
    where
        F: Fn(&str) -> bool,
    {
        let mut engines = Vec::new();
        macro_rules! push {
            ($engine:expr) => {{
                let engine = $engine;
                if !engines.contains(&engine) {
                    engines.push(engine);
                }
            }};
        }

        if CHROME_PATHS.iter().chain(CHROME_BINARIES).any(|&c| probe(c)) {
            push!(EngineId::ChromeCdp);
        }
        if EDGE_PATHS.iter().chain(EDGE_BINARIES).any(|&c| probe(c)) {
            push!(EngineId::EdgeCdp);
        }

        if engines.is_empty() {
            debug!("no engines detected, falling back to the generic driver");
            push!(EngineId::Driver);
        }

        let report = CapabilityReport { engines };
        debug!(
            engines = ?report.engines.iter().map(|e| e.as_str()).collect::<Vec<_>>(),
            "environment detection complete"
        );
        report
    }

    /// Resolve the Chrome/Chromium binary to launch, if any
    pub fn chrome_binary() -> Option<String> {
        Self::first_binary(CHROME_PATHS, CHROME_BINARIES)
    }

    /// Resolve the Edge binary to launch, if any
    pub fn edge_binary() -> Option<String> {
        Self::first_binary(EDGE_PATHS, EDGE_BINARIES)
    }

    fn first_binary(paths: &[&str], names: &[&str]) -> Option<String> {
        for p in paths {
            if Path::new(p).is_file() {
                return Some((*p).to_string());
            }
        }
        names
            .iter()
            .find(|n| Self::lookup(n))
            .map(|n| (*n).to_string())
    }

    /// Shell lookup for a binary on `PATH`
    fn lookup(name: &str) -> bool {
        let finder = if cfg!(windows) { "where" } else { "which" };
        Command::new(finder)
            .arg(name)
            .output()
            .map(|out| out.status.success())
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_nothing_falls_back_to_driver() {
        let report = EnvironmentDetector::detect_with(|_| false);
        assert_eq!(report.engines(), &[EngineId::Driver]);
        assert_eq!(report.preferred(), Some(EngineId::Driver));
    }

    #[test]
    fn test_detect_priority_and_dedup() {
        let report = EnvironmentDetector::detect_with(|name| {
            // every probe hits: chrome matched many times must appear once
            name.contains("chrome") || name.contains("chromium") || name.contains("edge")
        });
        let engines = report.engines();
        assert_eq!(
            engines.iter().filter(|e| **e == EngineId::ChromeCdp).count(),
            1
        );
        assert_eq!(
            engines.iter().filter(|e| **e == EngineId::EdgeCdp).count(),
            1
        );
        assert_eq!(report.preferred(), Some(EngineId::ChromeCdp));
    }

    #[test]
    fn test_engine_id_names() {
        assert_eq!(EngineId::ChromeCdp.as_str(), "cdp-chrome");
        assert_eq!(EngineId::EdgeCdp.as_str(), "cdp-edge");
        assert_eq!(EngineId::Driver.as_str(), "webdriver");
    }

    #[test]
    fn test_report_is_recomputed_not_cached() {
        let hit = EnvironmentDetector::detect_with(|name| name == "msedge");
        assert_eq!(hit.engines(), &[EngineId::EdgeCdp]);
        assert!(!hit.supports(EngineId::ChromeCdp));
        // a later run with a different probe must not share state
        let miss = EnvironmentDetector::detect_with(|_| false);
        assert_eq!(miss.engines(), &[EngineId::Driver]);
    }
}
