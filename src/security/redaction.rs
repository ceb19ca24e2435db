//! Deterministic PII tokenization.
//!
//! A token has the shape `[REDACTED_<PIITYPE>_<16 hex>]`, where the hex is a
//! prefix of SHA-256 over `"<piiType>:<value>"`. Identical inputs always map
//! to the identical token, so tokenized fields can still be joined on.
//!
//! The token -> value map lives only in memory. It is owned by whoever runs
//! the ingestion session and is never written to the queue or to disk.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use lazy_static::lazy_static;
use parking_lot::RwLock;
use regex::Regex;
use sha2::{Digest, Sha256};

/// Number of hex characters kept from the digest.
pub const TOKEN_DIGEST_LEN: usize = 16;

/// Label used when a PII type has no characters to build one from.
const FALLBACK_LABEL: &str = "PII";

lazy_static! {
    static ref TOKEN_PATTERN: Regex =
        Regex::new(r"^\[REDACTED_[A-Z0-9_]+_[0-9a-f]{16}\]$").unwrap();
}

/// Compute the token for a value without recording it.
pub fn compute_token(value: &str, pii_type: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(pii_type.as_bytes());
    hasher.update(b":");
    hasher.update(value.as_bytes());
    let digest = hex::encode(hasher.finalize());

    format!(
        "[REDACTED_{}_{}]",
        token_label(pii_type),
        &digest[..TOKEN_DIGEST_LEN]
    )
}

/// Upper-cased PII type with anything outside `[A-Z0-9]` mapped to `_`.
/// Never empty, so every token matches `is_redaction_token`.
fn token_label(pii_type: &str) -> String {
    if pii_type.is_empty() {
        return FALLBACK_LABEL.to_string();
    }
    pii_type
        .chars()
        .map(|c| {
            let c = c.to_ascii_uppercase();
            if c.is_ascii_alphanumeric() {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Check whether a string is a well-formed redaction token.
pub fn is_redaction_token(s: &str) -> bool {
    TOKEN_PATTERN.is_match(s)
}

#[derive(Debug)]
struct TokenMap {
    entries: HashMap<String, String>,
    started_at: Instant,
}

/// In-memory token -> original value store for one ingestion session.
///
/// Shared by reference; all operations take `&self`.
#[derive(Debug)]
pub struct RedactionStore {
    inner: RwLock<TokenMap>,
}

impl Default for RedactionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RedactionStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(TokenMap {
                entries: HashMap::new(),
                started_at: Instant::now(),
            }),
        }
    }

    /// Tokenize a value and remember the mapping.
    pub fn redact(&self, value: &str, pii_type: &str) -> String {
        let token = compute_token(value, pii_type);

        let mut map = self.inner.write();
        if !map.entries.contains_key(&token) {
            map.entries.insert(token.clone(), value.to_string());
        }

        log::debug!("PII_REDACTED pii_type={} token={}", pii_type, token);
        token
    }

    /// Look up the original value behind a token.
    ///
    /// Returns `None` for unknown tokens, which is the normal outcome for
    /// tokens minted before the last [`clear`](Self::clear). `audit_reason`
    /// is written to the log together with the token; the value never is.
    pub fn restore(&self, token: &str, audit_reason: &str) -> Option<String> {
        let value = self.inner.read().entries.get(token).cloned();

        log::info!(
            "PII_RESTORE token={} found={} reason={:?}",
            token,
            value.is_some(),
            audit_reason
        );
        value
    }

    /// Drop every mapping.
    pub fn clear(&self) {
        let mut map = self.inner.write();
        let dropped = map.entries.len();
        map.entries.clear();
        map.started_at = Instant::now();

        log::info!("PII_STORE_CLEARED entries={}", dropped);
    }

    /// Clear the store if it has been alive longer than `retention`.
    ///
    /// Returns true if the store was cleared.
    pub fn clear_if_expired(&self, retention: Duration) -> bool {
        let expired = self.inner.read().started_at.elapsed() >= retention;
        if expired {
            self.clear();
        }
        expired
    }

    pub fn len(&self) -> usize {
        self.inner.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
