// ABOUTME: Encrypted OAuth credential storage with expiry tracking and refresh
// ABOUTME: Single-holder token store backed by one credential file per installation
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

//! # Token Store
//!
//! Durable, encrypted, single-holder storage of one credential record.
//! Credentials come from the OAuth companion service (code exchange or
//! refresh) and are overwritten wholesale on every refresh. Absence of
//! credentials is signaled with `Ok(None)`, never an error; only persistence
//! and decryption faults propagate.

use crate::config::{OAuthConfig, StorageConfig};
use crate::constants::defaults;
use crate::crypto::{restrict_permissions, TokenCipher};
use crate::errors::{ClientError, ClientResult};
use base64::{engine::general_purpose, Engine};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// Leading byte identifying the current on-disk format (whole-record ciphertext)
const FORMAT_MARKER: u8 = 0x01;

/// One OAuth credential record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenRecord {
    /// Bearer access token; must be non-empty for the record to be usable
    pub access_token: String,
    /// Refresh token; may be empty when the grant omitted `offline` scope
    pub refresh_token: String,
    /// Token type, `Bearer` in practice
    pub token_type: String,
    /// When the access token expires
    #[serde(with = "chrono::serde::ts_seconds")]
    pub expires_at: DateTime<Utc>,
    /// When this record was persisted
    #[serde(with = "chrono::serde::ts_seconds")]
    pub created_at: DateTime<Utc>,
}

impl TokenRecord {
    /// A record is usable only with a non-empty access token
    #[must_use]
    pub fn is_usable(&self) -> bool {
        !self.access_token.is_empty()
    }
}

/// A successful token grant extracted from a companion service response
#[derive(Debug, Clone)]
pub struct TokenGrant {
    /// Bearer access token
    pub access_token: String,
    /// Refresh token, if issued
    pub refresh_token: Option<String>,
    /// Token type, if reported
    pub token_type: Option<String>,
    /// Lifetime in seconds, if reported
    pub expires_in: Option<i64>,
}

/// Wire shape of the companion service's exchange and refresh responses
#[derive(Debug, Deserialize)]
struct CompanionTokenResponse {
    success: bool,
    access_token: Option<String>,
    refresh_token: Option<String>,
    expires_in: Option<i64>,
    token_type: Option<String>,
    error: Option<String>,
}

impl CompanionTokenResponse {
    /// Reduce to a grant, or the failure reason reported by the service
    fn into_grant(self) -> Result<TokenGrant, String> {
        if !self.success {
            return Err(self.error.unwrap_or_else(|| "unspecified error".to_owned()));
        }
        match self.access_token {
            Some(access_token) if !access_token.is_empty() => Ok(TokenGrant {
                access_token,
                refresh_token: self.refresh_token,
                token_type: self.token_type,
                expires_in: self.expires_in,
            }),
            _ => Err("response missing access_token".to_owned()),
        }
    }
}

/// Credential state reported by [`TokenStore::status`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenStatus {
    /// No credential record exists (or it is unreadable)
    NoTokens,
    /// A non-expired access token is stored
    Valid,
    /// The stored access token is expired
    Expired,
}

/// Non-sensitive projection of the stored credentials for diagnostics
///
/// Never contains raw token values.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthStatus {
    /// Credential state
    pub status: TokenStatus,
    /// Expiry of the stored access token
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    /// Token type of the stored record
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
    /// Whether a refresh token is present
    pub has_refresh_token: bool,
}

impl AuthStatus {
    fn no_tokens() -> Self {
        Self {
            status: TokenStatus::NoTokens,
            expires_at: None,
            token_type: None,
            has_refresh_token: false,
        }
    }
}

/// Legacy on-disk envelope with per-field ciphertext and RFC 3339 timestamps
///
/// Deprecated: records are rewritten in the current whole-record format on
/// the next save. Remove after the migration window.
#[derive(Debug, Deserialize)]
struct LegacyEnvelope {
    access_token: String,
    refresh_token: String,
    token_type: Option<String>,
    expires_at: String,
    created_at: String,
}

/// Encrypted, single-holder OAuth credential storage
pub struct TokenStore {
    token_path: PathBuf,
    oauth: OAuthConfig,
    cipher: TokenCipher,
    http: reqwest::Client,
}

impl TokenStore {
    /// Open the store, creating the encryption key if this is a fresh installation
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Persistence`] if the key file cannot be created
    /// or read.
    pub fn new(
        storage: &StorageConfig,
        oauth: OAuthConfig,
        http: reqwest::Client,
    ) -> ClientResult<Self> {
        let cipher = TokenCipher::load_or_generate(&storage.key_path)?;
        Ok(Self {
            token_path: storage.token_path.clone(),
            oauth,
            cipher,
            http,
        })
    }

    /// Persist a token grant, overwriting any existing record
    ///
    /// Computes `expires_at = now + expires_in`, encrypts the whole record,
    /// and writes it atomically (temp file + rename) before restricting
    /// permissions to owner read/write.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Persistence`] on encryption or I/O failure.
    /// Callers must surface this, not swallow it.
    pub fn save_credentials(&self, grant: &TokenGrant) -> ClientResult<TokenRecord> {
        let now = Utc::now();
        let expires_in = grant.expires_in.unwrap_or(defaults::TOKEN_LIFETIME_SECS);
        let record = TokenRecord {
            access_token: grant.access_token.clone(),
            refresh_token: grant.refresh_token.clone().unwrap_or_default(),
            token_type: grant
                .token_type
                .clone()
                .unwrap_or_else(|| "Bearer".to_owned()),
            expires_at: now + Duration::seconds(expires_in),
            created_at: now,
        };

        let plaintext = serde_json::to_vec(&record)
            .map_err(|e| ClientError::persistence(format!("failed to serialize record: {e}")))?;
        let ciphertext = self.cipher.encrypt(&plaintext)?;

        let mut file_bytes = Vec::with_capacity(1 + ciphertext.len());
        file_bytes.push(FORMAT_MARKER);
        file_bytes.extend_from_slice(&ciphertext);

        if let Some(parent) = self.token_path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                ClientError::persistence(format!("failed to create storage directory: {e}"))
            })?;
        }

        // Atomic replace so a crash mid-write never leaves a torn record
        let tmp_path = self.token_path.with_extension("tmp");
        fs::write(&tmp_path, &file_bytes)
            .map_err(|e| ClientError::persistence(format!("failed to write credentials: {e}")))?;
        fs::rename(&tmp_path, &self.token_path).map_err(|e| {
            ClientError::persistence(format!("failed to replace credential file: {e}"))
        })?;
        restrict_permissions(&self.token_path)?;

        info!(expires_at = %record.expires_at, "Credentials saved");
        Ok(record)
    }

    /// Load and decrypt the persisted record
    ///
    /// Returns `Ok(None)` when no credential file exists. Supports both the
    /// current whole-record-ciphertext format and the legacy JSON envelope,
    /// distinguished by the file's leading byte.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Decryption`] when the file exists but cannot be
    /// decrypted or its format is unrecognized, and
    /// [`ClientError::Persistence`] on read failure.
    pub fn load_credentials(&self) -> ClientResult<Option<TokenRecord>> {
        let bytes = match fs::read(&self.token_path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No credential file found");
                return Ok(None);
            }
            Err(e) => {
                return Err(ClientError::persistence(format!(
                    "failed to read credentials: {e}"
                )))
            }
        };

        match bytes.first() {
            Some(&FORMAT_MARKER) => {
                let plaintext = self.cipher.decrypt(&bytes[1..])?;
                let record: TokenRecord = serde_json::from_slice(&plaintext).map_err(|e| {
                    ClientError::decryption(format!("decrypted record is malformed: {e}"))
                })?;
                Ok(Some(record))
            }
            Some(&b'{') => self.decode_legacy_envelope(&bytes).map(Some),
            _ => Err(ClientError::decryption(
                "credential file has an unrecognized format marker",
            )),
        }
    }

    /// Decode the deprecated JSON envelope with per-field base64 ciphertext
    fn decode_legacy_envelope(&self, bytes: &[u8]) -> ClientResult<TokenRecord> {
        let envelope: LegacyEnvelope = serde_json::from_slice(bytes)
            .map_err(|e| ClientError::decryption(format!("legacy envelope is malformed: {e}")))?;

        let decrypt_field = |field: &str, value: &str| -> ClientResult<String> {
            let raw = general_purpose::STANDARD.decode(value).map_err(|e| {
                ClientError::decryption(format!("legacy field {field} is not valid base64: {e}"))
            })?;
            let plaintext = self.cipher.decrypt(&raw)?;
            String::from_utf8(plaintext).map_err(|e| {
                ClientError::decryption(format!("legacy field {field} is not valid UTF-8: {e}"))
            })
        };

        let parse_time = |field: &str, value: &str| -> ClientResult<DateTime<Utc>> {
            DateTime::parse_from_rfc3339(value)
                .map(|t| t.with_timezone(&Utc))
                .map_err(|e| {
                    ClientError::decryption(format!("legacy field {field} is not RFC 3339: {e}"))
                })
        };

        Ok(TokenRecord {
            access_token: decrypt_field("access_token", &envelope.access_token)?,
            refresh_token: decrypt_field("refresh_token", &envelope.refresh_token)?,
            token_type: envelope.token_type.unwrap_or_else(|| "Bearer".to_owned()),
            expires_at: parse_time("expires_at", &envelope.expires_at)?,
            created_at: parse_time("created_at", &envelope.created_at)?,
        })
    }

    /// Whether the record's access token is expired, with the safety buffer applied
    #[must_use]
    pub fn is_expired(&self, record: &TokenRecord) -> bool {
        Self::is_expired_at(record, Utc::now())
    }

    /// Expiry check against an explicit clock
    ///
    /// A token is treated as expired [`defaults::TOKEN_EXPIRY_BUFFER_SECS`]
    /// before its actual expiry so it cannot lapse mid-flight.
    #[must_use]
    pub fn is_expired_at(record: &TokenRecord, now: DateTime<Utc>) -> bool {
        now + Duration::seconds(defaults::TOKEN_EXPIRY_BUFFER_SECS) >= record.expires_at
    }

    /// Return a non-expired access token, refreshing through the companion
    /// service when necessary
    ///
    /// This is the single integration point other components use. It never
    /// returns an expired token; `Ok(None)` means re-authorization is needed.
    ///
    /// # Errors
    ///
    /// Propagates persistence and decryption faults. Refresh failures degrade
    /// to `Ok(None)`.
    pub async fn get_valid_access_token(&self) -> ClientResult<Option<String>> {
        let Some(record) = self.load_credentials()? else {
            warn!("No stored credentials");
            return Ok(None);
        };

        if !record.is_usable() {
            warn!("Stored credentials have an empty access token");
            return Ok(None);
        }

        if !self.is_expired(&record) {
            return Ok(Some(record.access_token));
        }

        info!("Access token expired, attempting refresh");
        Ok(self
            .refresh(&record.refresh_token)
            .await?
            .map(|refreshed| refreshed.access_token))
    }

    /// Refresh the access token through the companion service
    ///
    /// On success the new record is persisted and returned. Every upstream
    /// failure mode (non-2xx status, `success:false` body, transport error,
    /// malformed body) is logged and degrades to `Ok(None)` so callers fall
    /// back to "no valid token".
    ///
    /// # Errors
    ///
    /// Only persistence of a successful refresh can fail.
    pub async fn refresh(&self, refresh_token: &str) -> ClientResult<Option<TokenRecord>> {
        if refresh_token.is_empty() {
            warn!("No refresh token available, cannot refresh");
            return Ok(None);
        }

        let url = self.oauth.token_refresh_url();
        let response = match self
            .http
            .post(&url)
            .json(&serde_json::json!({ "refresh_token": refresh_token }))
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "Token refresh request failed");
                return Ok(None);
            }
        };

        let status = response.status();
        if !status.is_success() {
            warn!(status = %status, "Token refresh rejected by companion service");
            return Ok(None);
        }

        let body: CompanionTokenResponse = match response.json().await {
            Ok(body) => body,
            Err(e) => {
                warn!(error = %e, "Token refresh response is malformed");
                return Ok(None);
            }
        };

        match body.into_grant() {
            Ok(grant) => {
                let record = self.save_credentials(&grant)?;
                info!("Access token refreshed");
                Ok(Some(record))
            }
            Err(reason) => {
                warn!(reason = %reason, "Token refresh failed");
                Ok(None)
            }
        }
    }

    /// Exchange an authorization code for tokens through the companion service
    ///
    /// Used by the setup flow. Shares the refresh path's failure semantics:
    /// upstream failures degrade to `Ok(None)` and are logged.
    ///
    /// # Errors
    ///
    /// Only persistence of a successful exchange can fail.
    pub async fn exchange_code(&self, code: &str) -> ClientResult<Option<TokenRecord>> {
        let url = self.oauth.token_exchange_url(code);
        let response = match self.http.get(&url).send().await {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "Token exchange request failed");
                return Ok(None);
            }
        };

        let status = response.status();
        if !status.is_success() {
            warn!(status = %status, "Token exchange rejected by companion service");
            return Ok(None);
        }

        let body: CompanionTokenResponse = match response.json().await {
            Ok(body) => body,
            Err(e) => {
                warn!(error = %e, "Token exchange response is malformed");
                return Ok(None);
            }
        };

        match body.into_grant() {
            Ok(grant) => {
                let record = self.save_credentials(&grant)?;
                info!("Authorization code exchanged for tokens");
                Ok(Some(record))
            }
            Err(reason) => {
                warn!(reason = %reason, "Token exchange failed");
                Ok(None)
            }
        }
    }

    /// Delete the persisted record; absence of the file is not an error
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Persistence`] on an I/O failure other than the
    /// file already being gone.
    pub fn clear(&self) -> ClientResult<()> {
        match fs::remove_file(&self.token_path) {
            Ok(()) => {
                info!("Credentials cleared");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ClientError::persistence(format!(
                "failed to delete credentials: {e}"
            ))),
        }
    }

    /// Non-sensitive status projection for diagnostics and setup flows
    ///
    /// An unreadable or undecryptable store reports `no_tokens` rather than
    /// failing; an absent store simply means "unauthenticated".
    #[must_use]
    pub fn status(&self) -> AuthStatus {
        let record = match self.load_credentials() {
            Ok(Some(record)) => record,
            Ok(None) => return AuthStatus::no_tokens(),
            Err(e) => {
                warn!(error = %e, "Credential store unreadable, reporting no_tokens");
                return AuthStatus::no_tokens();
            }
        };

        let status = if self.is_expired(&record) {
            TokenStatus::Expired
        } else {
            TokenStatus::Valid
        };

        AuthStatus {
            status,
            expires_at: Some(record.expires_at),
            token_type: Some(record.token_type),
            has_refresh_token: !record.refresh_token.is_empty(),
        }
    }
}
