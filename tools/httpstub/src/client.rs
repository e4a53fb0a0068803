use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Opaque key isolating one mock instance's persisted state. Every storage
/// operation is scoped by it; two requests with the same transport identity
/// always resolve to the same key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClientKey(String);

/// Transport-level identity a `ClientKey` is derived from: an explicit scope
/// value when the caller supplied one, else the peer address and the server
/// port the request arrived on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIdentity {
    pub scope: Option<String>,
    pub remote_addr: String,
    pub server_port: u16,
}

impl ClientIdentity {
    fn canonical_json(&self) -> String {
        let scope = self.scope.as_deref().map_or_else(
            || "null".to_string(),
            |value| format!("\"{}\"", escape_json(&normalize_text(value))),
        );
        format!(
            "{{\"scope\":{},\"remote_addr\":\"{}\",\"server_port\":{}}}",
            scope,
            escape_json(&normalize_text(&self.remote_addr)),
            self.server_port
        )
    }
}

impl ClientKey {
    pub fn derive(identity: &ClientIdentity) -> Self {
        let canonical = identity.canonical_json();
        let mut digest = Sha256::new();
        digest.update(canonical.as_bytes());
        let bytes = digest.finalize();
        let mut out = String::with_capacity(32);
        // 16 bytes of digest is plenty for state isolation and keeps
        // filenames and row keys short.
        for byte in &bytes[..16] {
            out.push_str(&format!("{byte:02x}"));
        }
        Self(out)
    }

    /// Accept a caller-provided key verbatim (tests, fixed fixtures).
    pub fn fixed(value: impl Into<String>) -> Self {
        Self(normalize_text(&value.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

pub fn normalize_text(value: &str) -> String {
    value
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .trim()
        .to_lowercase()
}

fn escape_json(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
        .replace('\r', "\\r")
        .replace('\t', "\\t")
}
