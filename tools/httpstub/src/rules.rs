//! Declarative matcher/limiter/rewrite vocabulary.
//!
//! Submitted expectations carry data, never code: each rule is a tagged JSON
//! object decoded into one of the enums below and evaluated by the core.

use crate::errors::StubError;
use crate::request::{RequestRecord, StubResponse};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ── RequestRule ───────────────────────────────────────────────────────────────

/// One predicate over an inbound request. An expectation's rules combine with
/// logical AND.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum RequestRule {
    MethodIs { value: String },
    PathIs { value: String },
    PathContains { value: String },
    PathMatches { pattern: String },
    HeaderEquals { name: String, value: String },
    HeaderExists { name: String },
    QueryEquals { name: String, value: String },
    BodyContains { value: String },
    BodyMatches { pattern: String },
}

impl RequestRule {
    /// Evaluate against a captured request. Body rules never match a
    /// truncated body: the fingerprint marker is not request content.
    pub fn matches(&self, request: &RequestRecord) -> Result<bool, StubError> {
        Ok(match self {
            Self::MethodIs { value } => request.method.eq_ignore_ascii_case(value),
            Self::PathIs { value } => request.path == *value,
            Self::PathContains { value } => request.path.contains(value.as_str()),
            Self::PathMatches { pattern } => compile(pattern)?.is_match(&request.path),
            Self::HeaderEquals { name, value } => {
                request.header(name).is_some_and(|have| have == value.as_str())
            }
            Self::HeaderExists { name } => request.header(name).is_some(),
            Self::QueryEquals { name, value } => {
                request.query_param(name).is_some_and(|have| have == *value)
            }
            Self::BodyContains { value } => {
                !request.body_truncated && request.body.contains(value.as_str())
            }
            Self::BodyMatches { pattern } => {
                !request.body_truncated && compile(pattern)?.is_match(&request.body)
            }
        })
    }

    /// Submission-time check: regex rules must carry a compilable pattern.
    pub fn validate(&self) -> Result<(), StubError> {
        match self {
            Self::PathMatches { pattern } | Self::BodyMatches { pattern } => {
                compile(pattern).map(|_| ())
            }
            _ => Ok(()),
        }
    }
}

fn compile(pattern: &str) -> Result<Regex, StubError> {
    Regex::new(pattern).map_err(|e| StubError::Deserialization(format!("bad pattern: {e}")))
}

// ── RunLimit ──────────────────────────────────────────────────────────────────

/// Limiter predicate over an expectation's run counter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum RunLimit {
    RunsLessThan { max: u64 },
}

impl RunLimit {
    pub fn allows(&self, runs: u64) -> bool {
        match self {
            Self::RunsLessThan { max } => runs < *max,
        }
    }
}

// ── ResponseRewrite ───────────────────────────────────────────────────────────

/// One declarative mutation applied to a resolved response template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ResponseRewrite {
    SetStatus { status: u16 },
    MergeHeaders { headers: BTreeMap<String, String> },
    SubstituteBody { needle: String, replacement: String },
}

impl ResponseRewrite {
    pub fn apply(&self, response: &mut StubResponse) {
        match self {
            Self::SetStatus { status } => response.status = *status,
            Self::MergeHeaders { headers } => {
                for (name, value) in headers {
                    response.headers.insert(name.clone(), value.clone());
                }
            }
            Self::SubstituteBody {
                needle,
                replacement,
            } => {
                response.body = response.body.replace(needle.as_str(), replacement.as_str());
            }
        }
    }

    pub fn validate(&self) -> Result<(), StubError> {
        match self {
            Self::SetStatus { status } if !(100..=599).contains(status) => {
                Err(StubError::Validation(format!(
                    "set_status {status} is outside the valid response range"
                )))
            }
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{RequestRule, ResponseRewrite, RunLimit};
    use crate::request::{RequestRecord, ServerMeta, StubResponse};
    use std::collections::BTreeMap;

    fn request(method: &str, path: &str, query: &str, body: &str) -> RequestRecord {
        let mut headers = BTreeMap::new();
        headers.insert("X-Api-Key".to_string(), "secret".to_string());
        RequestRecord::capture(
            method,
            path,
            query,
            headers,
            body.to_string(),
            ServerMeta {
                remote_addr: "127.0.0.1:1000".to_string(),
                server_name: "localhost".to_string(),
                server_port: 8080,
                received_at_unix_ms: 0,
            },
            1024,
        )
    }

    #[test]
    fn method_rule_ignores_case() {
        let rule = RequestRule::MethodIs {
            value: "get".to_string(),
        };
        assert!(rule.matches(&request("GET", "/", "", "")).expect("eval"));
        assert!(!rule.matches(&request("POST", "/", "", "")).expect("eval"));
    }

    #[test]
    fn path_rules_cover_exact_contains_and_regex() {
        let req = request("GET", "/api/users/42", "", "");
        let exact = RequestRule::PathIs {
            value: "/api/users/42".to_string(),
        };
        let contains = RequestRule::PathContains {
            value: "/users/".to_string(),
        };
        let regex = RequestRule::PathMatches {
            pattern: r"^/api/users/\d+$".to_string(),
        };
        assert!(exact.matches(&req).expect("eval"));
        assert!(contains.matches(&req).expect("eval"));
        assert!(regex.matches(&req).expect("eval"));
    }

    #[test]
    fn header_and_query_rules() {
        let req = request("GET", "/", "page=2", "");
        assert!(RequestRule::HeaderExists {
            name: "x-api-key".to_string()
        }
        .matches(&req)
        .expect("eval"));
        assert!(RequestRule::HeaderEquals {
            name: "X-API-KEY".to_string(),
            value: "secret".to_string()
        }
        .matches(&req)
        .expect("eval"));
        assert!(RequestRule::QueryEquals {
            name: "page".to_string(),
            value: "2".to_string()
        }
        .matches(&req)
        .expect("eval"));
        assert!(!RequestRule::QueryEquals {
            name: "page".to_string(),
            value: "3".to_string()
        }
        .matches(&req)
        .expect("eval"));
    }

    #[test]
    fn body_rules_never_match_truncated_bodies() {
        let mut req = request("POST", "/", "", "payload with marker inside");
        let rule = RequestRule::BodyContains {
            value: "marker".to_string(),
        };
        assert!(rule.matches(&req).expect("eval"));
        req.body_truncated = true;
        assert!(!rule.matches(&req).expect("eval"));
    }

    #[test]
    fn bad_regex_fails_validation_and_evaluation() {
        let rule = RequestRule::PathMatches {
            pattern: "(".to_string(),
        };
        assert!(rule.validate().is_err());
        assert!(rule.matches(&request("GET", "/", "", "")).is_err());
    }

    #[test]
    fn run_limit_allows_strictly_below_max() {
        let limit = RunLimit::RunsLessThan { max: 2 };
        assert!(limit.allows(0));
        assert!(limit.allows(1));
        assert!(!limit.allows(2));
        assert!(!limit.allows(3));
    }

    #[test]
    fn rewrites_apply_in_sequence() {
        let mut response = StubResponse::text(200, "hello NAME");
        ResponseRewrite::SetStatus { status: 202 }.apply(&mut response);
        let mut headers = BTreeMap::new();
        headers.insert("X-Extra".to_string(), "1".to_string());
        ResponseRewrite::MergeHeaders { headers }.apply(&mut response);
        ResponseRewrite::SubstituteBody {
            needle: "NAME".to_string(),
            replacement: "world".to_string(),
        }
        .apply(&mut response);

        assert_eq!(response.status, 202);
        assert_eq!(response.headers.get("X-Extra").map(String::as_str), Some("1"));
        assert_eq!(response.body, "hello world");
    }

    #[test]
    fn set_status_rewrite_validates_range() {
        assert!(ResponseRewrite::SetStatus { status: 9 }.validate().is_err());
        assert!(ResponseRewrite::SetStatus { status: 204 }.validate().is_ok());
    }

    #[test]
    fn rules_round_trip_their_wire_form() {
        let rule: RequestRule =
            serde_json::from_str(r#"{"rule":"header_equals","name":"X-A","value":"1"}"#)
                .expect("decode");
        assert_eq!(
            rule,
            RequestRule::HeaderEquals {
                name: "X-A".to_string(),
                value: "1".to_string()
            }
        );
        let json = serde_json::to_string(&rule).expect("encode");
        assert!(json.contains("\"rule\":\"header_equals\""));
    }
}
