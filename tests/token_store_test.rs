// ABOUTME: Integration tests for encrypted credential persistence and refresh
// ABOUTME: Covers round-trips, dual on-disk formats, expiry, refresh, and status
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

use base64::{engine::general_purpose, Engine};
use chrono::{Duration, Utc};
use httpmock::prelude::*;
use serde_json::json;
use tempfile::TempDir;
use whoop_mcp_server::{
    config::{OAuthConfig, StorageConfig},
    crypto::TokenCipher,
    errors::ClientError,
    token::{TokenGrant, TokenStatus, TokenStore},
};

fn oauth_for(base_url: &str) -> OAuthConfig {
    OAuthConfig {
        base_url: base_url.trim_end_matches('/').to_owned(),
    }
}

fn store_in(dir: &TempDir, oauth_base: &str) -> TokenStore {
    let storage = StorageConfig::in_dir(dir.path());
    TokenStore::new(&storage, oauth_for(oauth_base), reqwest::Client::new()).unwrap()
}

fn grant(access: &str, refresh: &str, expires_in: i64) -> TokenGrant {
    TokenGrant {
        access_token: access.to_owned(),
        refresh_token: Some(refresh.to_owned()),
        token_type: Some("Bearer".to_owned()),
        expires_in: Some(expires_in),
    }
}

#[tokio::test]
async fn save_then_load_round_trips_all_fields() {
    let dir = TempDir::new().unwrap();
    let store = store_in(&dir, "http://localhost:1");

    let saved = store
        .save_credentials(&grant("access-123", "refresh-456", 3600))
        .unwrap();
    let loaded = store.load_credentials().unwrap().unwrap();

    assert_eq!(loaded.access_token, "access-123");
    assert_eq!(loaded.refresh_token, "refresh-456");
    assert_eq!(loaded.token_type, "Bearer");
    // Timestamps persist with second precision
    assert_eq!(loaded.expires_at.timestamp(), saved.expires_at.timestamp());
    assert_eq!(loaded.created_at.timestamp(), saved.created_at.timestamp());
}

#[tokio::test]
async fn credential_file_does_not_contain_plaintext_tokens() {
    let dir = TempDir::new().unwrap();
    let store = store_in(&dir, "http://localhost:1");
    store
        .save_credentials(&grant("super-secret-access", "super-secret-refresh", 3600))
        .unwrap();

    let raw = std::fs::read(dir.path().join("tokens.json")).unwrap();
    let raw_str = String::from_utf8_lossy(&raw);
    assert!(!raw_str.contains("super-secret-access"));
    assert!(!raw_str.contains("super-secret-refresh"));
}

#[cfg(unix)]
#[tokio::test]
async fn credential_file_is_owner_only() {
    use std::os::unix::fs::PermissionsExt;

    let dir = TempDir::new().unwrap();
    let store = store_in(&dir, "http://localhost:1");
    store.save_credentials(&grant("a", "r", 3600)).unwrap();

    let mode = std::fs::metadata(dir.path().join("tokens.json"))
        .unwrap()
        .permissions()
        .mode();
    assert_eq!(mode & 0o777, 0o600);
}

#[tokio::test]
async fn missing_file_loads_as_none() {
    let dir = TempDir::new().unwrap();
    let store = store_in(&dir, "http://localhost:1");
    assert!(store.load_credentials().unwrap().is_none());
}

#[tokio::test]
async fn legacy_json_envelope_still_decodes() {
    let dir = TempDir::new().unwrap();
    let store = store_in(&dir, "http://localhost:1");

    // Build a legacy-format file with the same installation key
    let cipher = TokenCipher::load_or_generate(&dir.path().join(".encryption_key")).unwrap();
    let encrypt_field = |value: &str| -> String {
        general_purpose::STANDARD.encode(cipher.encrypt(value.as_bytes()).unwrap())
    };
    let expires_at = Utc::now() + Duration::hours(1);
    let created_at = Utc::now();
    let envelope = json!({
        "access_token": encrypt_field("legacy-access"),
        "refresh_token": encrypt_field("legacy-refresh"),
        "token_type": "Bearer",
        "expires_at": expires_at.to_rfc3339(),
        "created_at": created_at.to_rfc3339(),
    });
    std::fs::write(
        dir.path().join("tokens.json"),
        serde_json::to_vec_pretty(&envelope).unwrap(),
    )
    .unwrap();

    let loaded = store.load_credentials().unwrap().unwrap();
    assert_eq!(loaded.access_token, "legacy-access");
    assert_eq!(loaded.refresh_token, "legacy-refresh");
    assert_eq!(loaded.expires_at.timestamp(), expires_at.timestamp());
}

#[tokio::test]
async fn save_writes_current_format_marker() {
    let dir = TempDir::new().unwrap();
    let store = store_in(&dir, "http://localhost:1");
    store.save_credentials(&grant("a", "r", 3600)).unwrap();

    let raw = std::fs::read(dir.path().join("tokens.json")).unwrap();
    // Current format leads with the binary marker, not JSON
    assert_eq!(raw[0], 0x01);
}

#[tokio::test]
async fn undecryptable_file_is_a_decryption_error() {
    let dir = TempDir::new().unwrap();
    let store = store_in(&dir, "http://localhost:1");

    let mut garbage = vec![0x01];
    garbage.extend_from_slice(&[0xAB; 64]);
    std::fs::write(dir.path().join("tokens.json"), &garbage).unwrap();

    assert!(matches!(
        store.load_credentials(),
        Err(ClientError::Decryption { .. })
    ));
}

#[tokio::test]
async fn rotated_key_is_a_decryption_error() {
    let dir = TempDir::new().unwrap();
    let store = store_in(&dir, "http://localhost:1");
    store.save_credentials(&grant("a", "r", 3600)).unwrap();

    // Simulate a rotated key under the same credential file
    std::fs::remove_file(dir.path().join(".encryption_key")).unwrap();
    let store = store_in(&dir, "http://localhost:1");

    assert!(matches!(
        store.load_credentials(),
        Err(ClientError::Decryption { .. })
    ));
}

#[tokio::test]
async fn clear_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let store = store_in(&dir, "http://localhost:1");

    store.clear().unwrap();
    store.save_credentials(&grant("a", "r", 3600)).unwrap();
    store.clear().unwrap();
    store.clear().unwrap();
    assert!(store.load_credentials().unwrap().is_none());
}

#[tokio::test]
async fn status_reports_no_tokens_without_a_file() {
    let dir = TempDir::new().unwrap();
    let store = store_in(&dir, "http://localhost:1");

    let status = store.status();
    assert_eq!(status.status, TokenStatus::NoTokens);
    assert!(status.expires_at.is_none());
    assert!(!status.has_refresh_token);
}

#[tokio::test]
async fn status_reports_valid_and_expired() {
    let dir = TempDir::new().unwrap();
    let store = store_in(&dir, "http://localhost:1");

    store.save_credentials(&grant("a", "r", 3600)).unwrap();
    let status = store.status();
    assert_eq!(status.status, TokenStatus::Valid);
    assert!(status.has_refresh_token);
    assert_eq!(status.token_type.as_deref(), Some("Bearer"));

    store.save_credentials(&grant("a", "", -60)).unwrap();
    let status = store.status();
    assert_eq!(status.status, TokenStatus::Expired);
    assert!(!status.has_refresh_token);
}

#[tokio::test]
async fn valid_token_is_returned_without_refresh() {
    let dir = TempDir::new().unwrap();
    let store = store_in(&dir, "http://localhost:1");
    store
        .save_credentials(&grant("still-valid", "r", 3600))
        .unwrap();

    let token = store.get_valid_access_token().await.unwrap();
    assert_eq!(token.as_deref(), Some("still-valid"));
}

#[tokio::test]
async fn expired_token_triggers_refresh_and_persists_new_record() {
    let companion = MockServer::start_async().await;
    let refresh_mock = companion
        .mock_async(|when, then| {
            when.method(POST)
                .path("/api/refresh-token")
                .json_body(json!({ "refresh_token": "old-refresh" }));
            then.status(200).json_body(json!({
                "success": true,
                "access_token": "new-access",
                "refresh_token": "new-refresh",
                "expires_in": 7200,
                "token_type": "Bearer"
            }));
        })
        .await;

    let dir = TempDir::new().unwrap();
    let store = store_in(&dir, &companion.base_url());
    store
        .save_credentials(&grant("old-access", "old-refresh", -60))
        .unwrap();

    let token = store.get_valid_access_token().await.unwrap();
    assert_eq!(token.as_deref(), Some("new-access"));
    refresh_mock.assert_async().await;

    // The persisted file reflects the refreshed values
    let persisted = store.load_credentials().unwrap().unwrap();
    assert_eq!(persisted.access_token, "new-access");
    assert_eq!(persisted.refresh_token, "new-refresh");
    assert!(persisted.expires_at > Utc::now() + Duration::hours(1));
}

#[tokio::test]
async fn failed_refresh_degrades_to_no_token() {
    let companion = MockServer::start_async().await;
    companion
        .mock_async(|when, then| {
            when.method(POST).path("/api/refresh-token");
            then.status(200)
                .json_body(json!({ "success": false, "error": "refresh token revoked" }));
        })
        .await;

    let dir = TempDir::new().unwrap();
    let store = store_in(&dir, &companion.base_url());
    store.save_credentials(&grant("old", "revoked", -60)).unwrap();

    assert!(store.get_valid_access_token().await.unwrap().is_none());
}

#[tokio::test]
async fn refresh_http_error_degrades_to_no_token() {
    let companion = MockServer::start_async().await;
    companion
        .mock_async(|when, then| {
            when.method(POST).path("/api/refresh-token");
            then.status(500).body("internal error");
        })
        .await;

    let dir = TempDir::new().unwrap();
    let store = store_in(&dir, &companion.base_url());
    store.save_credentials(&grant("old", "r", -60)).unwrap();

    assert!(store.get_valid_access_token().await.unwrap().is_none());
}

#[tokio::test]
async fn expired_without_refresh_token_yields_none() {
    let dir = TempDir::new().unwrap();
    let store = store_in(&dir, "http://localhost:1");
    store
        .save_credentials(&TokenGrant {
            access_token: "old".to_owned(),
            refresh_token: None,
            token_type: None,
            expires_in: Some(-60),
        })
        .unwrap();

    assert!(store.get_valid_access_token().await.unwrap().is_none());
}

#[tokio::test]
async fn exchange_code_persists_credentials() {
    let companion = MockServer::start_async().await;
    let exchange_mock = companion
        .mock_async(|when, then| {
            when.method(GET).path("/api/get-tokens/auth-code-1");
            then.status(200).json_body(json!({
                "success": true,
                "access_token": "exchanged-access",
                "refresh_token": "exchanged-refresh",
                "expires_in": 3600,
                "token_type": "Bearer"
            }));
        })
        .await;

    let dir = TempDir::new().unwrap();
    let store = store_in(&dir, &companion.base_url());

    let record = store.exchange_code("auth-code-1").await.unwrap().unwrap();
    assert_eq!(record.access_token, "exchanged-access");
    exchange_mock.assert_async().await;
    assert_eq!(store.status().status, TokenStatus::Valid);
}

#[tokio::test]
async fn exchange_rejection_yields_none() {
    let companion = MockServer::start_async().await;
    companion
        .mock_async(|when, then| {
            when.method(GET).path("/api/get-tokens/bad-code");
            then.status(200)
                .json_body(json!({ "success": false, "error": "code expired" }));
        })
        .await;

    let dir = TempDir::new().unwrap();
    let store = store_in(&dir, &companion.base_url());

    assert!(store.exchange_code("bad-code").await.unwrap().is_none());
    assert_eq!(store.status().status, TokenStatus::NoTokens);
}
