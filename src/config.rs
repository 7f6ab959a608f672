// ABOUTME: Environment-driven configuration for storage, endpoints, and limits
// ABOUTME: Every knob has a default; env vars override for non-standard deployments
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

//! Runtime configuration assembled from environment variables with defaults

use crate::constants::{defaults, oauth, storage};
use crate::errors::{ClientError, ClientResult};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// WHOOP API endpoint configuration
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Base URL for the WHOOP developer API
    pub base_url: String,
    /// Per-request timeout
    pub request_timeout: Duration,
}

/// OAuth companion service configuration
#[derive(Debug, Clone)]
pub struct OAuthConfig {
    /// Base URL of the companion service handling the OAuth dance
    pub base_url: String,
}

impl OAuthConfig {
    /// Full URL for exchanging an authorization code
    #[must_use]
    pub fn token_exchange_url(&self, code: &str) -> String {
        format!("{}{}/{code}", self.base_url, oauth::TOKEN_EXCHANGE_PATH)
    }

    /// Full URL for refreshing an access token
    #[must_use]
    pub fn token_refresh_url(&self) -> String {
        format!("{}{}", self.base_url, oauth::TOKEN_REFRESH_PATH)
    }
}

/// On-disk storage locations for credentials and the encryption key
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Encrypted credential file
    pub token_path: PathBuf,
    /// Encryption key file
    pub key_path: PathBuf,
}

impl StorageConfig {
    /// Storage rooted at the given directory
    #[must_use]
    pub fn in_dir(dir: &std::path::Path) -> Self {
        Self {
            token_path: dir.join(storage::TOKEN_FILE),
            key_path: dir.join(storage::KEY_FILE),
        }
    }
}

/// Cache and rate-limit ceilings
#[derive(Debug, Clone)]
pub struct LimitsConfig {
    /// Response cache TTL
    pub cache_ttl: Duration,
    /// Maximum cached responses held at once
    pub cache_max_entries: usize,
    /// Fixed rate-limit window length
    pub rate_window: Duration,
    /// Maximum requests per window
    pub max_requests_per_window: u32,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            cache_ttl: Duration::from_secs(defaults::CACHE_TTL_SECS),
            cache_max_entries: defaults::CACHE_MAX_ENTRIES,
            rate_window: Duration::from_secs(defaults::RATE_WINDOW_SECS),
            max_requests_per_window: defaults::MAX_REQUESTS_PER_WINDOW,
        }
    }
}

/// Complete configuration for the WHOOP MCP core
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// WHOOP API endpoints and timeouts
    pub api: ApiConfig,
    /// OAuth companion service endpoints
    pub oauth: OAuthConfig,
    /// Credential and key file locations
    pub storage: StorageConfig,
    /// Cache and rate-limit ceilings
    pub limits: LimitsConfig,
}

impl ServerConfig {
    /// Build configuration from environment variables, falling back to defaults
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Persistence`] if no home directory can be
    /// resolved and `WHOOP_STORAGE_DIR` is not set.
    pub fn from_env() -> ClientResult<Self> {
        let storage_dir = env::var("WHOOP_STORAGE_DIR").map_or_else(
            |_| {
                dirs::home_dir()
                    .map(|home| home.join(storage::DIR_NAME))
                    .ok_or_else(|| {
                        ClientError::persistence(
                            "cannot resolve home directory; set WHOOP_STORAGE_DIR",
                        )
                    })
            },
            |dir| Ok(PathBuf::from(dir)),
        )?;

        Ok(Self {
            api: ApiConfig {
                base_url: env_or("WHOOP_API_BASE_URL", defaults::API_BASE_URL),
                request_timeout: Duration::from_secs(env_parsed(
                    "WHOOP_REQUEST_TIMEOUT_SECS",
                    defaults::REQUEST_TIMEOUT_SECS,
                )),
            },
            oauth: OAuthConfig {
                base_url: env_or("WHOOP_OAUTH_BASE_URL", defaults::OAUTH_BASE_URL),
            },
            storage: StorageConfig::in_dir(&storage_dir),
            limits: LimitsConfig {
                cache_ttl: Duration::from_secs(env_parsed(
                    "WHOOP_CACHE_TTL_SECS",
                    defaults::CACHE_TTL_SECS,
                )),
                cache_max_entries: defaults::CACHE_MAX_ENTRIES,
                rate_window: Duration::from_secs(defaults::RATE_WINDOW_SECS),
                max_requests_per_window: env_parsed(
                    "WHOOP_MAX_REQUESTS_PER_MINUTE",
                    defaults::MAX_REQUESTS_PER_WINDOW,
                ),
            },
        })
    }
}

/// Read an env var with a string default
fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_owned())
}

/// Read an env var parsed to `T`, falling back to the default on absence or parse failure
fn env_parsed<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|raw| raw.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn env_overrides_apply() {
        env::set_var("WHOOP_STORAGE_DIR", "/tmp/whoop-test");
        env::set_var("WHOOP_MAX_REQUESTS_PER_MINUTE", "7");
        let config = ServerConfig::from_env().unwrap();
        assert_eq!(config.limits.max_requests_per_window, 7);
        assert_eq!(
            config.storage.token_path,
            PathBuf::from("/tmp/whoop-test").join(storage::TOKEN_FILE)
        );
        env::remove_var("WHOOP_STORAGE_DIR");
        env::remove_var("WHOOP_MAX_REQUESTS_PER_MINUTE");
    }

    #[test]
    #[serial]
    fn invalid_numeric_override_falls_back_to_default() {
        env::set_var("WHOOP_STORAGE_DIR", "/tmp/whoop-test");
        env::set_var("WHOOP_CACHE_TTL_SECS", "not-a-number");
        let config = ServerConfig::from_env().unwrap();
        assert_eq!(
            config.limits.cache_ttl,
            Duration::from_secs(defaults::CACHE_TTL_SECS)
        );
        env::remove_var("WHOOP_STORAGE_DIR");
        env::remove_var("WHOOP_CACHE_TTL_SECS");
    }

    #[test]
    fn oauth_urls_compose_paths() {
        let oauth = OAuthConfig {
            base_url: "https://example.com".to_owned(),
        };
        assert_eq!(
            oauth.token_exchange_url("abc123"),
            "https://example.com/api/get-tokens/abc123"
        );
        assert_eq!(
            oauth.token_refresh_url(),
            "https://example.com/api/refresh-token"
        );
    }
}
