//! Deployment configuration. A single value: the API base URL.

use std::env;

use tracing::info;

pub const BASE_URL_VAR: &str = "ATTEND_API_BASE";
pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";

#[derive(Debug, Clone)]
pub struct Config {
    pub base_url: String,
}

impl Config {
    pub fn load() -> Self {
        let base_url = env::var(BASE_URL_VAR).unwrap_or_else(|_| {
            info!("{BASE_URL_VAR} not set, using default: {DEFAULT_BASE_URL}");
            DEFAULT_BASE_URL.to_string()
        });
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::load()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trailing_slash_is_stripped() {
        let cfg = Config {
            base_url: "http://api.example.edu/".trim_end_matches('/').to_string(),
        };
        assert_eq!(cfg.base_url, "http://api.example.edu");
    }
}
