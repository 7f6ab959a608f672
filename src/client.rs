// ABOUTME: WHOOP API access layer mediating every outbound call through caching and rate limiting
// ABOUTME: Exposes typed read operations for profile, workouts, recovery, sleep, and cycles
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

//! # API Access Layer
//!
//! Every outbound WHOOP call goes through one pipeline: local rate check,
//! cache lookup, token acquisition, then the HTTP request with a bounded
//! timeout. Responses are mapped onto the closed error taxonomy; no retries
//! happen here. The client is explicitly constructed and passed to callers -
//! there is no process-wide singleton.

use crate::cache::{fingerprint, ResponseCache};
use crate::config::ServerConfig;
use crate::constants::{defaults, endpoints, ERROR_BODY_EXCERPT_LEN};
use crate::errors::{ClientError, ClientResult, RateLimitScope};
use crate::rate_limit::{FixedWindowLimiter, RateLimitStatus};
use crate::token::{AuthStatus, TokenStore};
use reqwest::StatusCode;
use serde_json::Value;
use std::sync::{Mutex, PoisonError};
use tracing::{debug, error, warn};

/// Optional date range and record limit for collection endpoints
#[derive(Debug, Clone, Default)]
pub struct RangeQuery {
    /// Inclusive start of the range (ISO 8601 date or datetime)
    pub start_date: Option<String>,
    /// Inclusive end of the range
    pub end_date: Option<String>,
    /// Maximum records to return; defaults to 25 when unset
    pub limit: Option<u32>,
}

impl RangeQuery {
    /// Query with only a record limit
    #[must_use]
    pub fn with_limit(limit: u32) -> Self {
        Self {
            limit: Some(limit),
            ..Self::default()
        }
    }

    /// Render as query parameters, applying the default limit
    fn to_params(&self) -> Vec<(&'static str, String)> {
        let mut params = vec![(
            "limit",
            self.limit.unwrap_or(defaults::COLLECTION_LIMIT).to_string(),
        )];
        if let Some(start) = &self.start_date {
            params.push(("start", start.clone()));
        }
        if let Some(end) = &self.end_date {
            params.push(("end", end.clone()));
        }
        params
    }
}

/// WHOOP API client with response caching and fixed-window rate limiting
pub struct WhoopClient {
    config: ServerConfig,
    tokens: TokenStore,
    http: reqwest::Client,
    cache: Mutex<ResponseCache>,
    limiter: Mutex<FixedWindowLimiter>,
}

impl WhoopClient {
    /// Build a client and its token store from configuration
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Persistence`] if the encryption key cannot be
    /// created or read, or [`ClientError::Network`] if the HTTP client cannot
    /// be constructed.
    pub fn new(config: ServerConfig) -> ClientResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.api.request_timeout)
            .build()
            .map_err(|e| ClientError::Network {
                message: format!("failed to build HTTP client: {e}"),
            })?;

        let tokens = TokenStore::new(&config.storage, config.oauth.clone(), http.clone())?;
        Ok(Self::from_parts(config, tokens, http))
    }

    /// Assemble a client from pre-built parts (dependency injection seam)
    #[must_use]
    pub fn from_parts(config: ServerConfig, tokens: TokenStore, http: reqwest::Client) -> Self {
        let cache = Mutex::new(ResponseCache::new(
            config.limits.cache_max_entries,
            config.limits.cache_ttl,
        ));
        let limiter = Mutex::new(FixedWindowLimiter::new(
            config.limits.max_requests_per_window,
            config.limits.rate_window,
        ));
        Self {
            config,
            tokens,
            http,
            cache,
            limiter,
        }
    }

    /// The token store backing this client
    #[must_use]
    pub fn token_store(&self) -> &TokenStore {
        &self.tokens
    }

    /// Basic user profile
    pub async fn get_profile(&self) -> ClientResult<Value> {
        self.request(endpoints::PROFILE, &[]).await
    }

    /// Workouts within the optional date range
    pub async fn get_workouts(&self, query: &RangeQuery) -> ClientResult<Value> {
        self.request(endpoints::WORKOUTS, &query.to_params()).await
    }

    /// Recovery records within the optional date range
    pub async fn get_recovery(&self, query: &RangeQuery) -> ClientResult<Value> {
        self.request(endpoints::RECOVERY, &query.to_params()).await
    }

    /// Sleep records within the optional date range
    pub async fn get_sleep(&self, query: &RangeQuery) -> ClientResult<Value> {
        self.request(endpoints::SLEEP, &query.to_params()).await
    }

    /// Physiological cycles within the optional date range
    pub async fn get_cycles(&self, query: &RangeQuery) -> ClientResult<Value> {
        self.request(endpoints::CYCLES, &query.to_params()).await
    }

    /// Authentication status from the token store; no network call
    #[must_use]
    pub fn auth_status(&self) -> AuthStatus {
        self.tokens.status()
    }

    /// Snapshot of the local rate limiter for diagnostics
    #[must_use]
    pub fn rate_limit_status(&self) -> RateLimitStatus {
        self.limiter
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .status()
    }

    /// Empty the response cache
    pub fn clear_cache(&self) {
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Authenticated GET against the WHOOP API through the full pipeline
    ///
    /// Pipeline order: rate check, cache lookup, token acquisition, HTTP
    /// call, response mapping. A cache entry is written only after a
    /// successful response, so failed or cancelled calls never leave partial
    /// entries.
    async fn request(&self, endpoint: &str, params: &[(&str, String)]) -> ClientResult<Value> {
        self.check_rate_limit()?;

        let cache_key = fingerprint(endpoint, params);
        if let Some(cached) = self
            .cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&cache_key)
        {
            return Ok(cached);
        }

        let access_token = self
            .tokens
            .get_valid_access_token()
            .await?
            .ok_or(ClientError::Unauthenticated)?;

        let url = format!(
            "{}/{}",
            self.config.api.base_url,
            endpoint.trim_start_matches('/')
        );
        debug!(endpoint, "Issuing WHOOP API request");

        let response = self
            .http
            .get(&url)
            .query(params)
            .header("Authorization", format!("Bearer {access_token}"))
            .send()
            .await
            .map_err(map_transport_error)?;

        let payload = self.handle_response(response).await?;
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(cache_key, payload.clone());
        Ok(payload)
    }

    /// Reject immediately when the local fixed-window ceiling is reached
    fn check_rate_limit(&self) -> ClientResult<()> {
        let mut limiter = self.limiter.lock().unwrap_or_else(PoisonError::into_inner);
        if limiter.try_acquire().is_err() {
            let status = limiter.status();
            warn!(
                limit = status.limit,
                "Local rate limit reached, rejecting request"
            );
            return Err(ClientError::RateLimitExceeded {
                scope: RateLimitScope::Local,
                retry_after_secs: status.resets_in_secs,
            });
        }
        Ok(())
    }

    /// Map the upstream response onto the error taxonomy
    async fn handle_response(&self, response: reqwest::Response) -> ClientResult<Value> {
        let status = response.status();
        debug!(status = %status, "WHOOP API response");

        if status.is_success() {
            return response.json().await.map_err(|e| {
                if e.is_timeout() {
                    ClientError::RequestTimeout
                } else {
                    ClientError::Upstream {
                        status: status.as_u16(),
                        body: format!("response body is not valid JSON: {e}"),
                    }
                }
            });
        }

        if status == StatusCode::UNAUTHORIZED {
            // Force re-authorization; the next call fails fast as Unauthenticated
            if let Err(e) = self.tokens.clear() {
                error!(error = %e, "Failed to clear credentials after 401");
            }
            return Err(ClientError::AuthenticationFailed);
        }

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after_secs = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.parse().ok())
                .unwrap_or(self.config.limits.rate_window.as_secs());
            return Err(ClientError::RateLimitExceeded {
                scope: RateLimitScope::Upstream,
                retry_after_secs,
            });
        }

        let body = response.text().await.unwrap_or_default();
        error!(status = %status, "WHOOP API request failed");
        Err(ClientError::Upstream {
            status: status.as_u16(),
            body: excerpt(&body),
        })
    }
}

/// Classify a transport-level failure from reqwest
fn map_transport_error(e: reqwest::Error) -> ClientError {
    if e.is_timeout() {
        ClientError::RequestTimeout
    } else {
        ClientError::Network {
            message: e.to_string(),
        }
    }
}

/// Bounded excerpt of an upstream response body for error messages
fn excerpt(body: &str) -> String {
    if body.len() <= ERROR_BODY_EXCERPT_LEN {
        return body.to_owned();
    }
    let mut end = ERROR_BODY_EXCERPT_LEN;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &body[..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_query_defaults_limit() {
        let params = RangeQuery::default().to_params();
        assert_eq!(params, vec![("limit", "25".to_owned())]);
    }

    #[test]
    fn range_query_includes_dates_when_set() {
        let query = RangeQuery {
            start_date: Some("2024-01-01".to_owned()),
            end_date: Some("2024-01-31".to_owned()),
            limit: Some(5),
        };
        let params = query.to_params();
        assert!(params.contains(&("limit", "5".to_owned())));
        assert!(params.contains(&("start", "2024-01-01".to_owned())));
        assert!(params.contains(&("end", "2024-01-31".to_owned())));
    }

    #[test]
    fn excerpt_truncates_long_bodies() {
        let long = "x".repeat(1000);
        let short = excerpt(&long);
        assert!(short.len() <= ERROR_BODY_EXCERPT_LEN + 3);
        assert!(short.ends_with("..."));
        assert_eq!(excerpt("short body"), "short body");
    }

    #[test]
    fn excerpt_respects_utf8_boundaries() {
        let body = "é".repeat(ERROR_BODY_EXCERPT_LEN);
        let short = excerpt(&body);
        assert!(short.ends_with("..."));
    }
}
