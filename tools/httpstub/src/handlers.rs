//! Operation surface handed to the routing layer.
//!
//! Every method returns a complete `StubResponse`; errors are converted at
//! this boundary and never cross it, so a storage or decode failure becomes a
//! 500-class response instead of unwinding into the host.

use crate::client::ClientKey;
use crate::config::{StorageBackendKind, StubConfig};
use crate::errors::StubError;
use crate::expectation::parse_submission;
use crate::logging::append_run_log;
use crate::recorder::{Position, Recorder};
use crate::request::{status, RequestRecord, ServerMeta, StubResponse};
use crate::resolver::resolve;
use crate::store::{Namespace, SqliteBackend, Store};
use serde_json::json;
use std::collections::BTreeMap;

pub const IDENTITY_BODY: &str = "O RLY?";

pub struct Api {
    store: Store,
    max_body_bytes: usize,
}

impl Api {
    pub fn new(store: Store) -> Self {
        Self {
            store,
            max_body_bytes: crate::request::default_body_threshold(),
        }
    }

    /// Build the full stack from configuration: backend selection, state
    /// path, body-capture cap.
    pub fn from_config(cfg: &StubConfig) -> Result<Self, StubError> {
        let store = match cfg.storage.backend {
            StorageBackendKind::Memory => Store::in_memory(),
            StorageBackendKind::Sqlite => {
                let path = cfg.storage.path.as_ref().ok_or_else(|| {
                    StubError::InvalidConfig(
                        "storage.path is required for the sqlite backend".to_string(),
                    )
                })?;
                Store::new(Box::new(SqliteBackend::open(path)?))
            }
        };
        Ok(Self {
            store,
            max_body_bytes: cfg.capture.max_body_bytes,
        })
    }

    /// Snapshot an inbound request under the configured body-capture cap.
    pub fn capture_request(
        &self,
        method: impl Into<String>,
        path: impl Into<String>,
        query: impl Into<String>,
        headers: BTreeMap<String, String>,
        body: String,
        server: ServerMeta,
    ) -> RequestRecord {
        RequestRecord::capture(method, path, query, headers, body, server, self.max_body_bytes)
    }

    // ── Expectation operations ────────────────────────────────────────────────

    pub fn clear_expectations(&self, client: &ClientKey) -> StubResponse {
        respond(self.store.clear(client, Namespace::Expectations).map(|()| {
            append_run_log(
                "info",
                "api.expectations.cleared",
                json!({ "client": client.as_str() }),
            );
            StubResponse::empty(status::OK)
        }))
    }

    pub fn submit_expectation(&self, client: &ClientKey, body: &str) -> StubResponse {
        respond(self.submit_expectation_inner(client, body))
    }

    fn submit_expectation_inner(
        &self,
        client: &ClientKey,
        body: &str,
    ) -> Result<StubResponse, StubError> {
        let expectation = match parse_submission(body) {
            Ok(expectation) => expectation,
            Err(err) => {
                append_run_log(
                    "warn",
                    "api.expectation.rejected",
                    json!({ "client": client.as_str(), "reason": err.to_string() }),
                );
                return Err(err);
            }
        };
        self.store
            .prepend(client, Namespace::Expectations, expectation.to_json()?)?;
        append_run_log(
            "info",
            "api.expectation.created",
            json!({
                "client": client.as_str(),
                "rules": expectation.matcher.len(),
                "limited": expectation.limiter.is_some(),
            }),
        );
        Ok(StubResponse::empty(status::CREATED))
    }

    // ── Request log operations ────────────────────────────────────────────────

    pub fn request_count(&self, client: &ClientKey) -> StubResponse {
        respond(
            Recorder::new(&self.store)
                .count(client)
                .map(|count| StubResponse::text(status::OK, count.to_string())),
        )
    }

    pub fn request_at(&self, client: &ClientKey, index: usize) -> StubResponse {
        respond(
            Recorder::new(&self.store)
                .read_at(client, index)
                .and_then(|found| match found {
                    Some(record) => Ok(StubResponse::text(status::OK, record.to_json()?)),
                    None => Ok(StubResponse::text(
                        status::NOT_FOUND,
                        format!("Index {index} not found"),
                    )),
                }),
        )
    }

    /// Fetch-and-remove; destructive regardless of the verb the routing
    /// layer maps here.
    pub fn pop_request(&self, client: &ClientKey, position: Position) -> StubResponse {
        respond(
            Recorder::new(&self.store)
                .pop(client, position)
                .and_then(|found| match found {
                    Some(record) => Ok(StubResponse::text(status::OK, record.to_json()?)),
                    None => Ok(StubResponse::text(
                        status::NOT_FOUND,
                        format!("{} not possible", position.as_str()),
                    )),
                }),
        )
    }

    pub fn clear_requests(&self, client: &ClientKey) -> StubResponse {
        respond(
            Recorder::new(&self.store)
                .clear(client)
                .map(|()| StubResponse::empty(status::OK)),
        )
    }

    // ── Reset and diagnostics ─────────────────────────────────────────────────

    pub fn reset_all(&self, client: &ClientKey) -> StubResponse {
        respond(
            self.store
                .clear(client, Namespace::Requests)
                .and_then(|()| self.store.clear(client, Namespace::Expectations))
                .map(|()| {
                    append_run_log(
                        "info",
                        "api.reset_all",
                        json!({ "client": client.as_str() }),
                    );
                    StubResponse::empty(status::OK)
                }),
        )
    }

    pub fn identity(&self) -> StubResponse {
        StubResponse::text(status::IM_A_TEAPOT, IDENTITY_BODY)
    }

    // ── Fallback pipeline ─────────────────────────────────────────────────────

    /// No structural route matched: log the request, then match and resolve.
    pub fn handle_fallback(&self, client: &ClientKey, record: RequestRecord) -> StubResponse {
        respond(self.handle_fallback_inner(client, record))
    }

    fn handle_fallback_inner(
        &self,
        client: &ClientKey,
        record: RequestRecord,
    ) -> Result<StubResponse, StubError> {
        Recorder::new(&self.store).log(client, &record)?;
        let response = resolve(&self.store, client, &record)?;
        append_run_log(
            "debug",
            "api.fallback.resolved",
            json!({
                "client": client.as_str(),
                "method": record.method,
                "path": record.path,
                "status": response.status,
            }),
        );
        Ok(response)
    }
}

/// Boundary conversion: validation failures answer 417 with the reason,
/// everything else surfaces as a 500 with diagnostic text.
fn respond(result: Result<StubResponse, StubError>) -> StubResponse {
    match result {
        Ok(response) => response,
        Err(StubError::Validation(reason)) => {
            StubResponse::text(status::EXPECTATION_FAILED, reason)
        }
        Err(err) => {
            append_run_log("error", "api.internal_error", json!({ "error": err.to_string() }));
            StubResponse::text(status::INTERNAL_SERVER_ERROR, err.to_string())
        }
    }
}
