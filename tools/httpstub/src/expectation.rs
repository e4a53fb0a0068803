//! Stored expectations and wire-level submission parsing.

use crate::errors::StubError;
use crate::request::StubResponse;
use crate::rules::{RequestRule, ResponseRewrite, RunLimit};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One canned answer: rules, a serialized response template, an optional
/// limiter, optional rewrites, and the run counter. The template stays an
/// opaque string until a match resolves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Expectation {
    #[serde(default)]
    pub matcher: Vec<RequestRule>,
    pub response: String,
    #[serde(default)]
    pub limiter: Option<RunLimit>,
    #[serde(default)]
    pub transform: Option<Vec<ResponseRewrite>>,
    pub runs: u64,
}

impl Expectation {
    pub fn to_json(&self) -> Result<String, StubError> {
        serde_json::to_string(self).map_err(|e| StubError::Deserialization(e.to_string()))
    }

    pub fn from_json(payload: &str) -> Result<Self, StubError> {
        serde_json::from_str(payload).map_err(|e| StubError::Deserialization(e.to_string()))
    }
}

/// Parse and validate a submission body. Field checks run in a fixed order
/// and any failure is a `Validation` error naming the offending key; stored
/// state is never touched on the failure path.
pub fn parse_submission(body: &str) -> Result<Expectation, StubError> {
    let wire: Value = serde_json::from_str(body)
        .map_err(|e| StubError::Validation(format!("submission is not valid JSON: {e}")))?;

    let matcher = match wire.get("matcher") {
        None | Some(Value::Null) => Vec::new(),
        Some(value) => decode_matcher(value)?,
    };

    let response = match wire.get("response") {
        None | Some(Value::Null) => {
            return Err(StubError::Validation(
                "key \"response\" not found in submission".to_string(),
            ))
        }
        Some(value) => decode_response(value)?,
    };

    let limiter = match wire.get("limiter") {
        None | Some(Value::Null) => None,
        Some(value) => Some(decode_limiter(value)?),
    };

    let transform = match wire.get("transform") {
        None | Some(Value::Null) => None,
        Some(value) => Some(decode_transform(value)?),
    };

    Ok(Expectation {
        matcher,
        response,
        limiter,
        transform,
        runs: 0,
    })
}

fn decode_matcher(value: &Value) -> Result<Vec<RequestRule>, StubError> {
    let items = value.as_array().ok_or_else(|| {
        StubError::Validation("key \"matcher\" must be a list of known rules".to_string())
    })?;
    let mut rules = Vec::with_capacity(items.len());
    for item in items {
        let rule: RequestRule = serde_json::from_value(item.clone()).map_err(|_| {
            StubError::Validation("key \"matcher\" must be a list of known rules".to_string())
        })?;
        rule.validate()
            .map_err(|e| StubError::Validation(format!("key \"matcher\": {e}")))?;
        rules.push(rule);
    }
    Ok(rules)
}

fn decode_response(value: &Value) -> Result<String, StubError> {
    let raw = value.to_string();
    let template = StubResponse::from_json(&raw).map_err(|_| {
        StubError::Validation("key \"response\" must be a response message".to_string())
    })?;
    // Store the canonical serialized form, not the caller's raw text.
    template.to_json()
}

fn decode_limiter(value: &Value) -> Result<RunLimit, StubError> {
    serde_json::from_value(value.clone()).map_err(|_| {
        StubError::Validation("key \"limiter\" must be a known limit rule".to_string())
    })
}

fn decode_transform(value: &Value) -> Result<Vec<ResponseRewrite>, StubError> {
    let items = value.as_array().ok_or_else(|| {
        StubError::Validation("key \"transform\" must be a list of known rewrites".to_string())
    })?;
    let mut rewrites = Vec::with_capacity(items.len());
    for item in items {
        let rewrite: ResponseRewrite = serde_json::from_value(item.clone()).map_err(|_| {
            StubError::Validation(
                "key \"transform\" must be a list of known rewrites".to_string(),
            )
        })?;
        rewrite.validate()?;
        rewrites.push(rewrite);
    }
    Ok(rewrites)
}
