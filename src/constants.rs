// ABOUTME: Centralized constants for endpoints, limits, and storage layout
// ABOUTME: Single source of truth for defaults shared by config, client, and tests
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

//! Centralized constants to avoid magic values scattered through the crate

/// WHOOP developer API endpoint paths
pub mod endpoints {
    /// Basic user profile
    pub const PROFILE: &str = "/user/profile/basic";
    /// Workout collection
    pub const WORKOUTS: &str = "/activity/workout";
    /// Recovery collection
    pub const RECOVERY: &str = "/recovery";
    /// Sleep collection
    pub const SLEEP: &str = "/activity/sleep";
    /// Physiological cycle collection
    pub const CYCLES: &str = "/cycle";
}

/// OAuth companion service paths
pub mod oauth {
    /// Code-for-token exchange, `GET {base}/api/get-tokens/{code}`
    pub const TOKEN_EXCHANGE_PATH: &str = "/api/get-tokens";
    /// Token refresh, `POST {base}/api/refresh-token`
    pub const TOKEN_REFRESH_PATH: &str = "/api/refresh-token";
}

/// Default values for configuration knobs
pub mod defaults {
    /// WHOOP developer API base URL
    pub const API_BASE_URL: &str = "https://api.prod.whoop.com/developer/v1";
    /// OAuth companion service base URL
    pub const OAUTH_BASE_URL: &str = "https://personal-integrations-462307.uc.r.appspot.com";
    /// Per-request timeout in seconds
    pub const REQUEST_TIMEOUT_SECS: u64 = 30;
    /// Response cache TTL in seconds
    pub const CACHE_TTL_SECS: u64 = 300;
    /// Maximum number of cached responses held at once
    pub const CACHE_MAX_ENTRIES: usize = 256;
    /// Fixed rate-limit window length in seconds
    pub const RATE_WINDOW_SECS: u64 = 60;
    /// Maximum requests allowed per window
    pub const MAX_REQUESTS_PER_WINDOW: u32 = 100;
    /// Default record limit for collection endpoints
    pub const COLLECTION_LIMIT: u32 = 25;
    /// Record limit used by the MCP tool call sites
    pub const TOOL_COLLECTION_LIMIT: u32 = 5;
    /// Access tokens are treated as expired this many seconds early
    pub const TOKEN_EXPIRY_BUFFER_SECS: i64 = 300;
    /// Fallback lifetime when a token response omits `expires_in`
    pub const TOKEN_LIFETIME_SECS: i64 = 3600;
}

/// On-disk storage layout
pub mod storage {
    /// Per-user storage directory name under the home directory
    pub const DIR_NAME: &str = ".whoop-mcp-server";
    /// Encrypted credential file name
    pub const TOKEN_FILE: &str = "tokens.json";
    /// Encryption key file name
    pub const KEY_FILE: &str = ".encryption_key";
}

/// Maximum bytes of an upstream error body carried in an error message
pub const ERROR_BODY_EXCERPT_LEN: usize = 256;
