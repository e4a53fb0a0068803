//! Serializable request/response types shared by the store, matcher, and
//! handler surface. A stored record is a single JSON line; the store treats
//! it as an opaque payload.

use crate::errors::StubError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

/// Fixed status vocabulary of the handler surface.
pub mod status {
    pub const OK: u16 = 200;
    pub const CREATED: u16 = 201;
    pub const NOT_FOUND: u16 = 404;
    pub const GONE: u16 = 410;
    pub const EXPECTATION_FAILED: u16 = 417;
    pub const IM_A_TEAPOT: u16 = 418;
    pub const INTERNAL_SERVER_ERROR: u16 = 500;
}

// ── ServerMeta ────────────────────────────────────────────────────────────────

/// Transport/server-side metadata captured alongside the request head.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerMeta {
    pub remote_addr: String,
    pub server_name: String,
    pub server_port: u16,
    pub received_at_unix_ms: i64,
}

// ── RequestRecord ─────────────────────────────────────────────────────────────

const LARGE_BODY_THRESHOLD: usize = 64 * 1024; // 64 KB

/// Immutable snapshot of an inbound request, captured at arrival.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestRecord {
    pub method: String,
    pub path: String,
    pub query: String,
    pub headers: BTreeMap<String, String>,
    /// Full body, or `<hash:sha256:XXXXXXXXXXXXXXXX>` when truncated.
    pub body: String,
    #[serde(default)]
    pub body_truncated: bool,
    pub server: ServerMeta,
}

impl RequestRecord {
    /// Capture a snapshot, replacing bodies over `max_body_bytes` with a
    /// fingerprint marker so one oversized request cannot bloat the log.
    pub fn capture(
        method: impl Into<String>,
        path: impl Into<String>,
        query: impl Into<String>,
        headers: BTreeMap<String, String>,
        body: String,
        server: ServerMeta,
        max_body_bytes: usize,
    ) -> Self {
        let (body, body_truncated) = if body.len() > max_body_bytes {
            use sha2::{Digest, Sha256};
            let hash = Sha256::digest(body.as_bytes());
            let prefix = hex_bytes(&hash[..8]);
            (format!("<hash:sha256:{prefix}>"), true)
        } else {
            (body, false)
        };
        Self {
            method: method.into(),
            path: path.into(),
            query: query.into(),
            headers,
            body,
            body_truncated,
            server,
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Value of `name` in the query string, if present.
    pub fn query_param(&self, name: &str) -> Option<String> {
        self.query.split('&').find_map(|pair| {
            let mut parts = pair.splitn(2, '=');
            let key = parts.next()?;
            if key == name {
                Some(parts.next().unwrap_or("").to_string())
            } else {
                None
            }
        })
    }

    pub fn to_json(&self) -> Result<String, StubError> {
        serde_json::to_string(self).map_err(|e| StubError::Deserialization(e.to_string()))
    }

    pub fn from_json(payload: &str) -> Result<Self, StubError> {
        serde_json::from_str(payload).map_err(|e| StubError::Deserialization(e.to_string()))
    }
}

pub fn default_body_threshold() -> usize {
    LARGE_BODY_THRESHOLD
}

fn hex_bytes(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

// ── StubResponse ──────────────────────────────────────────────────────────────

/// A complete response message: both the stored template shape and the value
/// handed back to the routing layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StubResponse {
    pub status: u16,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub body: String,
}

impl StubResponse {
    pub fn text(status: u16, body: impl Into<String>) -> Self {
        let mut headers = BTreeMap::new();
        headers.insert("Content-Type".to_string(), "text/plain".to_string());
        Self {
            status,
            headers,
            body: body.into(),
        }
    }

    pub fn empty(status: u16) -> Self {
        Self {
            status,
            headers: BTreeMap::new(),
            body: String::new(),
        }
    }

    pub fn to_json(&self) -> Result<String, StubError> {
        serde_json::to_string(self).map_err(|e| StubError::Deserialization(e.to_string()))
    }

    /// Deserialize a stored template. A status outside the HTTP range is
    /// rejected here rather than surfacing at send time.
    pub fn from_json(payload: &str) -> Result<Self, StubError> {
        let response: Self = serde_json::from_str(payload)
            .map_err(|e| StubError::Deserialization(e.to_string()))?;
        if !(100..=599).contains(&response.status) {
            return Err(StubError::Deserialization(format!(
                "status {} is outside the valid response range",
                response.status
            )));
        }
        Ok(response)
    }
}

pub fn system_time_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
