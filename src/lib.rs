// ABOUTME: Library root for the WHOOP MCP server core
// ABOUTME: Wires together token storage, caching, rate limiting, and the API client
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

//! # WHOOP MCP Server Core
//!
//! Token-management and API-access core for a WHOOP Model Context Protocol
//! server. The crate owns two responsibilities:
//!
//! - encrypted, single-holder persistence of OAuth credentials on local disk
//!   ([`token::TokenStore`]), and
//! - a request layer that puts a fixed-window rate limiter and a TTL-bounded
//!   response cache in front of every outbound WHOOP API call
//!   ([`client::WhoopClient`]).
//!
//! The MCP transport itself is external; an MCP dispatcher calls into the
//! handlers in [`tools`] and presents the returned envelopes to the model.

/// TTL-bounded response cache
pub mod cache;
/// API access layer with caching and rate limiting
pub mod client;
/// Environment-driven configuration
pub mod config;
/// Endpoint paths and default limits
pub mod constants;
/// AES-256-GCM token cipher and key file management
pub mod crypto;
/// Structured error taxonomy
pub mod errors;
/// Structured logging setup
pub mod logging;
/// Fixed-window rate limiter
pub mod rate_limit;
/// Encrypted OAuth credential storage
pub mod token;
/// Tool-call envelope handlers for the MCP dispatcher
pub mod tools;
