//! Bearer-token storage and the 401 gate.
//!
//! The token lives in one place on disk (the platform config directory) and
//! one place in memory. Login writes both, logout and any 401 clear both; the
//! `expired` flag is how the rest of the app learns it must return to the
//! login screen.

use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tracing::warn;

#[derive(Debug, Serialize, Deserialize)]
struct StoredAuth {
    access_token: String,
}

#[derive(Debug)]
pub struct AuthState {
    path: Option<PathBuf>,
    token: RwLock<Option<String>>,
    expired: AtomicBool,
}

impl AuthState {
    pub fn load() -> Self {
        let path = ProjectDirs::from("edu", "Attend", "QrAttendance")
            .map(|proj| proj.config_dir().join("auth.json"));
        Self::load_from(path)
    }

    /// Used by tests to point the store at a scratch file.
    pub fn load_from(path: Option<PathBuf>) -> Self {
        let token = path
            .as_deref()
            .and_then(|p| fs::read_to_string(p).ok())
            .and_then(|content| serde_json::from_str::<StoredAuth>(&content).ok())
            .map(|auth| auth.access_token);
        Self {
            path,
            token: RwLock::new(token),
            expired: AtomicBool::new(false),
        }
    }

    pub fn token(&self) -> Option<String> {
        self.token.read().ok().and_then(|t| t.clone())
    }

    pub fn has_token(&self) -> bool {
        self.token.read().ok().map_or(false, |t| t.is_some())
    }

    pub fn set(&self, access_token: &str) {
        if let Ok(mut guard) = self.token.write() {
            *guard = Some(access_token.to_string());
        }
        self.expired.store(false, Ordering::SeqCst);
        if let Some(path) = &self.path {
            let stored = StoredAuth {
                access_token: access_token.to_string(),
            };
            let persist = || -> anyhow::Result<()> {
                if let Some(parent) = path.parent() {
                    fs::create_dir_all(parent)?;
                }
                fs::write(path, serde_json::to_string_pretty(&stored)?)?;
                Ok(())
            };
            if let Err(e) = persist() {
                warn!("failed to persist auth token: {e}");
            }
        }
    }

    pub fn clear(&self) {
        if let Ok(mut guard) = self.token.write() {
            *guard = None;
        }
        if let Some(path) = &self.path {
            let _ = fs::remove_file(path);
        }
    }

    /// Called by the response gate on any 401: clear the token and remember
    /// that a redirect to the login view is owed.
    pub fn expire(&self) {
        warn!("received 401, clearing stored credentials");
        self.clear();
        self.expired.store(true, Ordering::SeqCst);
    }

    /// One-shot read of the expiry flag; the caller redirects when true.
    pub fn take_expired(&self) -> bool {
        self.expired.swap(false, Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("attend-auth-test-{name}-{}.json", std::process::id()))
    }

    #[test]
    fn set_persists_and_reload_recovers() {
        let path = scratch("roundtrip");
        let auth = AuthState::load_from(Some(path.clone()));
        auth.set("tok-123");
        let reloaded = AuthState::load_from(Some(path.clone()));
        assert_eq!(reloaded.token().as_deref(), Some("tok-123"));
        let _ = fs::remove_file(path);
    }

    #[test]
    fn expire_clears_token_and_trips_flag() {
        let path = scratch("expire");
        let auth = AuthState::load_from(Some(path.clone()));
        auth.set("tok-456");
        auth.expire();
        assert!(!auth.has_token());
        assert!(!path.exists());
        assert!(auth.take_expired());
        // one-shot: second read is false
        assert!(!auth.take_expired());
    }

    #[test]
    fn clear_without_expiry_does_not_redirect() {
        let auth = AuthState::load_from(None);
        auth.set("tok-789");
        auth.clear();
        assert!(!auth.take_expired());
    }
}
