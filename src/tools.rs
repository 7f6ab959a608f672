// ABOUTME: Tool-call envelope handlers consumed by an external MCP dispatcher
// ABOUTME: Wraps client read operations in the {tool, data|error, timestamp} contract
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

//! # Tool Handlers
//!
//! Thin adapters between the MCP dispatcher and [`WhoopClient`]. Each handler
//! returns the reference envelope `{tool, data | error, timestamp}`; the
//! structured [`ClientError`](crate::errors::ClientError) kinds are rendered
//! into the string `error` field to preserve the envelope shape the
//! dispatcher expects. Handlers never panic and never raise - failures travel
//! inside the envelope.

use crate::client::{RangeQuery, WhoopClient};
use crate::constants::defaults;
use crate::errors::ClientResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

/// Response envelope for one tool invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResponse {
    /// Name of the tool that produced this response
    pub tool: String,
    /// Payload on success
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// Human-readable message on failure
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// When the tool finished
    pub timestamp: DateTime<Utc>,
}

impl ToolResponse {
    fn success(tool: &str, data: Value) -> Self {
        Self {
            tool: tool.to_owned(),
            data: Some(data),
            error: None,
            timestamp: Utc::now(),
        }
    }

    fn failure(tool: &str, message: String) -> Self {
        Self {
            tool: tool.to_owned(),
            data: None,
            error: Some(message),
            timestamp: Utc::now(),
        }
    }

    /// Fold a client result into the envelope
    fn from_result(tool: &str, result: ClientResult<Value>) -> Self {
        match result {
            Ok(data) => {
                info!(tool, "Tool succeeded");
                Self::success(tool, data)
            }
            Err(e) => {
                warn!(tool, error = %e, "Tool failed");
                Self::failure(tool, e.to_string())
            }
        }
    }
}

/// Date range accepted by the data tools
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ToolQuery {
    /// Inclusive start of the range (ISO 8601)
    pub start_date: Option<String>,
    /// Inclusive end of the range
    pub end_date: Option<String>,
    /// Maximum records; the tool surface defaults to 5
    pub limit: Option<u32>,
}

impl ToolQuery {
    /// Convert to a client query, applying the tool-surface default limit
    fn into_range(self) -> RangeQuery {
        RangeQuery {
            start_date: self.start_date,
            end_date: self.end_date,
            limit: Some(self.limit.unwrap_or(defaults::TOOL_COLLECTION_LIMIT)),
        }
    }
}

/// Authentication status; synchronous, no network call
#[must_use]
pub fn get_whoop_auth_status(client: &WhoopClient) -> ToolResponse {
    let tool = "get_whoop_auth_status";
    match serde_json::to_value(client.auth_status()) {
        Ok(status) => ToolResponse::success(tool, status),
        Err(e) => ToolResponse::failure(tool, format!("failed to serialize status: {e}")),
    }
}

/// User profile
pub async fn get_whoop_profile(client: &WhoopClient) -> ToolResponse {
    ToolResponse::from_result("get_whoop_profile", client.get_profile().await)
}

/// Workout data
pub async fn get_whoop_workouts(client: &WhoopClient, query: ToolQuery) -> ToolResponse {
    ToolResponse::from_result(
        "get_whoop_workouts",
        client.get_workouts(&query.into_range()).await,
    )
}

/// Recovery data
pub async fn get_whoop_recovery(client: &WhoopClient, query: ToolQuery) -> ToolResponse {
    ToolResponse::from_result(
        "get_whoop_recovery",
        client.get_recovery(&query.into_range()).await,
    )
}

/// Sleep data
pub async fn get_whoop_sleep(client: &WhoopClient, query: ToolQuery) -> ToolResponse {
    ToolResponse::from_result(
        "get_whoop_sleep",
        client.get_sleep(&query.into_range()).await,
    )
}

/// Physiological cycle data
pub async fn get_whoop_cycles(client: &WhoopClient, query: ToolQuery) -> ToolResponse {
    ToolResponse::from_result(
        "get_whoop_cycles",
        client.get_cycles(&query.into_range()).await,
    )
}

/// Empty the response cache
#[must_use]
pub fn clear_whoop_cache(client: &WhoopClient) -> ToolResponse {
    client.clear_cache();
    ToolResponse::success("clear_whoop_cache", serde_json::json!({ "cleared": true }))
}
