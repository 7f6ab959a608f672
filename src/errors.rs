// ABOUTME: Structured error taxonomy for token storage and WHOOP API access
// ABOUTME: Replaces string-typed failures with a closed set of machine-readable variants
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

//! # Error Taxonomy
//!
//! Every failure the core can produce is one of the variants below. Token
//! store faults that are recoverable (missing file, failed refresh) are not
//! errors at all - they surface as `Ok(None)`. Everything here propagates to
//! the external dispatcher, which owns user-facing presentation and retries.

use thiserror::Error;

/// Which limiter rejected the request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitScope {
    /// Rejected by the local fixed-window pre-check, before any network I/O
    Local,
    /// Rejected by the upstream API with a 429 response
    Upstream,
}

impl std::fmt::Display for RateLimitScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Local => write!(f, "local"),
            Self::Upstream => write!(f, "upstream"),
        }
    }
}

/// Unified error type for token storage and API access
#[derive(Debug, Error)]
pub enum ClientError {
    /// Credential or key file could not be written or read
    #[error("credential persistence failed: {message}")]
    Persistence {
        /// What went wrong, including the underlying I/O or crypto detail
        message: String,
    },

    /// Stored credentials exist but cannot be decrypted (rotated key, corrupt file)
    #[error("stored credentials could not be decrypted: {message}")]
    Decryption {
        /// What went wrong
        message: String,
    },

    /// No usable access token is available; re-authorization is required
    #[error("no valid access token available - re-authorize your WHOOP account")]
    Unauthenticated,

    /// Upstream rejected the bearer token; stored credentials have been cleared
    #[error("WHOOP rejected the access token - credentials cleared, re-authorization required")]
    AuthenticationFailed,

    /// Request rejected by a rate limiter; the caller decides whether to retry
    #[error("rate limit exceeded ({scope}), retry after {retry_after_secs}s")]
    RateLimitExceeded {
        /// Local pre-check or upstream 429
        scope: RateLimitScope,
        /// Seconds until a retry has a chance of succeeding
        retry_after_secs: u64,
    },

    /// Outbound call exceeded the fixed request timeout
    #[error("WHOOP API request timed out")]
    RequestTimeout,

    /// Transport-level failure (DNS, connection reset) before an HTTP status arrived
    #[error("network error talking to WHOOP API: {message}")]
    Network {
        /// Transport error detail
        message: String,
    },

    /// Upstream returned a non-success status not covered by a more specific variant
    #[error("WHOOP API request failed with status {status}: {body}")]
    Upstream {
        /// HTTP status code
        status: u16,
        /// Bounded excerpt of the response body
        body: String,
    },
}

impl ClientError {
    /// Persistence failure from any underlying error
    #[must_use]
    pub fn persistence(message: impl Into<String>) -> Self {
        Self::Persistence {
            message: message.into(),
        }
    }

    /// Decryption failure from any underlying error
    #[must_use]
    pub fn decryption(message: impl Into<String>) -> Self {
        Self::Decryption {
            message: message.into(),
        }
    }
}

/// Result type alias for the crate
pub type ClientResult<T> = Result<T, ClientError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limit_message_names_scope() {
        let local = ClientError::RateLimitExceeded {
            scope: RateLimitScope::Local,
            retry_after_secs: 42,
        };
        assert!(local.to_string().contains("(local)"));
        assert!(local.to_string().contains("42"));

        let upstream = ClientError::RateLimitExceeded {
            scope: RateLimitScope::Upstream,
            retry_after_secs: 60,
        };
        assert!(upstream.to_string().contains("(upstream)"));
    }

    #[test]
    fn upstream_error_carries_status_and_body() {
        let err = ClientError::Upstream {
            status: 503,
            body: "maintenance".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("503"));
        assert!(msg.contains("maintenance"));
    }
}
