//! Session bookkeeping and persisted state
//!
//! Every backend owns one [`SessionState`] tracking the navigation history
//! and action counter, and serializes authentication state through
//! [`SessionSnapshot`] JSON documents.

use std::collections::HashMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};

/// Mutable per-session bookkeeping shared by all backends
#[derive(Debug, Default)]
pub struct SessionState {
    /// Whether `initialize()` has completed successfully
    pub initialized: bool,
    /// The last successfully navigated URL
    pub current_url: Option<String>,
    /// Prior URLs, oldest first; grows only when navigating away from a
    /// non-null prior URL
    pub history: Vec<String>,
    /// Number of page interactions performed so far
    pub action_count: u64,
}

impl SessionState {
    /// Record a successful navigation, pushing the prior URL (if any) onto
    /// the history stack
    pub fn record_navigation(&mut self, url: String) {
        if let Some(prev) = self.current_url.take() {
            self.history.push(prev);
        }
        self.current_url = Some(url);
    }

    /// Bump the action counter, returning the new count
    pub fn bump(&mut self) -> u64 {
        self.action_count += 1;
        self.action_count
    }
}

/// Prepend `https://` when the caller omitted the scheme
pub fn normalize_url(url: &str) -> String {
    let trimmed = url.trim();
    if trimmed.starts_with("http://")
        || trimmed.starts_with("https://")
        || trimmed.starts_with("file://")
        || trimmed.starts_with("about:")
    {
        trimmed.to_string()
    } else {
        format!("https://{trimmed}")
    }
}

/// One cookie in a persisted session document
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoredCookie {
    /// Cookie name
    pub name: String,
    /// Cookie value
    pub value: String,
    /// Domain the cookie applies to
    pub domain: Option<String>,
    /// Path the cookie applies to
    pub path: Option<String>,
    /// Secure flag
    #[serde(default)]
    pub secure: bool,
    /// HttpOnly flag
    #[serde(default)]
    pub http_only: bool,
    /// Expiry as a unix timestamp, None for session cookies
    pub expires: Option<f64>,
}

/// Persisted cookie/storage snapshot, keyed by nothing but its file path
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SessionSnapshot {
    /// When the snapshot was taken
    pub saved_at: Option<DateTime<Utc>>,
    /// URL at snapshot time, used to scope storage restoration
    pub url: Option<String>,
    /// All cookies visible to the session
    pub cookies: Vec<StoredCookie>,
    /// `localStorage` entries for the snapshot origin
    #[serde(default)]
    pub local_storage: HashMap<String, String>,
    /// `sessionStorage` entries for the snapshot origin
    #[serde(default)]
    pub session_storage: HashMap<String, String>,
}

/// In-page script dumping local/session storage as a JSON string
pub(crate) const DUMP_STORAGE_JS: &str = r#"
(() => {
    const dump = (s) => {
        const out = {};
        for (let i = 0; i < s.length; i++) {
            const k = s.key(i);
            out[k] = s.getItem(k);
        }
        return out;
    };
    try {
        return JSON.stringify({local: dump(localStorage), session: dump(sessionStorage)});
    } catch (e) {
        return JSON.stringify({local: {}, session: {}});
    }
})()
"#;

/// Parsed result of [`DUMP_STORAGE_JS`]
#[derive(Debug, Default, Deserialize)]
pub(crate) struct StorageDump {
    #[serde(default)]
    pub local: HashMap<String, String>,
    #[serde(default)]
    pub session: HashMap<String, String>,
}

/// In-page script seeding local/session storage from a snapshot
pub(crate) fn seed_storage_script(snapshot: &SessionSnapshot) -> String {
    let local = serde_json::to_string(&snapshot.local_storage).unwrap_or_else(|_| "{}".into());
    let session = serde_json::to_string(&snapshot.session_storage).unwrap_or_else(|_| "{}".into());
    format!(
        r#"(() => {{
    const local = {local};
    const session = {session};
    try {{
        for (const [k, v] of Object.entries(local)) localStorage.setItem(k, v);
        for (const [k, v] of Object.entries(session)) sessionStorage.setItem(k, v);
        return true;
    }} catch (e) {{
        return false;
    }}
}})()"#
    )
}

impl SessionSnapshot {
    /// Stamp and write the snapshot as pretty JSON, creating missing
    /// parent directories
    pub async fn write(mut self, path: &Path) -> Result<()> {
        self.saved_at = Some(Utc::now());
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let body = serde_json::to_vec_pretty(&self)?;
        tokio::fs::write(path, body).await?;
        debug!(path = %path.display(), cookies = self.cookies.len(), "session snapshot written");
        Ok(())
    }

    /// Read a snapshot back from disk
    pub async fn read(path: &Path) -> Result<Self> {
        let body = tokio::fs::read(path)
            .await
            .map_err(|e| Error::Session(format!("cannot read {}: {e}", path.display())))?;
        let snapshot: SessionSnapshot = serde_json::from_slice(&body)
            .map_err(|e| Error::Session(format!("malformed snapshot {}: {e}", path.display())))?;
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_first_navigation_pushes_no_history() {
        let mut state = SessionState::default();
        state.record_navigation("https://example.com".to_string());
        assert_eq!(state.current_url.as_deref(), Some("https://example.com"));
        assert!(state.history.is_empty());
    }

    #[test]
    fn test_history_grows_from_non_null_prior() {
        let mut state = SessionState::default();
        state.record_navigation("https://a.test".to_string());
        state.record_navigation("https://b.test".to_string());
        state.record_navigation("https://c.test".to_string());
        assert_eq!(state.history, vec!["https://a.test", "https://b.test"]);
        assert_eq!(state.current_url.as_deref(), Some("https://c.test"));
    }

    #[test]
    fn test_action_counter() {
        let mut state = SessionState::default();
        assert_eq!(state.bump(), 1);
        assert_eq!(state.bump(), 2);
        assert_eq!(state.action_count, 2);
    }

    #[test]
    fn test_normalize_url_prepends_scheme() {
        assert_eq!(normalize_url("example.com"), "https://example.com");
        assert_eq!(normalize_url("  example.com  "), "https://example.com");
    }

    #[test]
    fn test_normalize_url_keeps_existing_scheme() {
        assert_eq!(normalize_url("http://example.com"), "http://example.com");
        assert_eq!(normalize_url("https://example.com"), "https://example.com");
        assert_eq!(normalize_url("file:///tmp/x.html"), "file:///tmp/x.html");
        assert_eq!(normalize_url("about:blank"), "about:blank");
    }

    #[test]
    fn test_snapshot_roundtrip_serde() {
        let snapshot = SessionSnapshot {
            saved_at: None,
            url: Some("https://example.com".to_string()),
            cookies: vec![StoredCookie {
                name: "sid".to_string(),
                value: "abc123".to_string(),
                domain: Some(".example.com".to_string()),
                path: Some("/".to_string()),
                secure: true,
                http_only: true,
                expires: Some(1893456000.0),
            }],
            local_storage: HashMap::from([("theme".to_string(), "dark".to_string())]),
            session_storage: HashMap::new(),
        };
        let json = serde_json::to_string(&snapshot).unwrap();
        let back: SessionSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(back.cookies, snapshot.cookies);
        assert_eq!(back.local_storage.get("theme").map(String::as_str), Some("dark"));
    }

    #[tokio::test]
    async fn test_snapshot_write_creates_parent_dirs() {
        let dir = std::env::temp_dir().join("ghostdrive-test-snapshots");
        let _ = tokio::fs::remove_dir_all(&dir).await;
        let path = dir.join("nested/state.json");

        let snapshot = SessionSnapshot {
            url: Some("https://example.com".to_string()),
            ..Default::default()
        };
        snapshot.write(&path).await.unwrap();

        let back = SessionSnapshot::read(&path).await.unwrap();
        assert_eq!(back.url.as_deref(), Some("https://example.com"));
        assert!(back.saved_at.is_some());
        let _ = tokio::fs::remove_dir_all(&dir).await;
    }

    #[test]
    fn test_seed_storage_script_embeds_entries() {
        let mut snapshot = SessionSnapshot::default();
        snapshot
            .local_storage
            .insert("token".to_string(), "abc".to_string());
        let script = seed_storage_script(&snapshot);
        assert!(script.contains("\"token\":\"abc\""));
        assert!(script.contains("localStorage.setItem"));
    }

    #[tokio::test]
    async fn test_snapshot_read_missing_file_is_session_error() {
        let err = SessionSnapshot::read(Path::new("/nonexistent/snapshot.json"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Session(_)));
    }
}
