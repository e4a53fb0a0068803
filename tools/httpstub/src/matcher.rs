//! Expectation selection over the stored, newest-first list.

use crate::errors::StubError;
use crate::expectation::Expectation;
use crate::request::RequestRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchOutcome {
    /// All rules passed and the limiter (if any) allows another run.
    Matched { index: usize },
    /// All rules passed but the limiter denies; reported only when nothing
    /// later in the scan fully matches.
    Exhausted { index: usize },
    NoMatch,
}

/// Scan expectations in stored order (newest first). The first expectation
/// whose rules all pass and whose limiter allows wins outright. A
/// rule-passing expectation whose limiter denies is remembered (first one
/// only) and reported as `Exhausted` when the scan ends without a winner.
pub fn match_request(
    request: &RequestRecord,
    expectations: &[Expectation],
) -> Result<MatchOutcome, StubError> {
    let mut exhausted: Option<usize> = None;

    'scan: for (index, expectation) in expectations.iter().enumerate() {
        for rule in &expectation.matcher {
            if !rule.matches(request)? {
                continue 'scan;
            }
        }

        if let Some(limiter) = &expectation.limiter {
            if !limiter.allows(expectation.runs) {
                if exhausted.is_none() {
                    exhausted = Some(index);
                }
                continue;
            }
        }

        return Ok(MatchOutcome::Matched { index });
    }

    Ok(match exhausted {
        Some(index) => MatchOutcome::Exhausted { index },
        None => MatchOutcome::NoMatch,
    })
}

#[cfg(test)]
mod tests {
    use super::{match_request, MatchOutcome};
    use crate::expectation::Expectation;
    use crate::request::{RequestRecord, ServerMeta, StubResponse};
    use crate::rules::{RequestRule, RunLimit};
    use std::collections::BTreeMap;

    fn request(method: &str, path: &str) -> RequestRecord {
        RequestRecord::capture(
            method,
            path,
            "",
            BTreeMap::new(),
            String::new(),
            ServerMeta {
                remote_addr: "127.0.0.1:2000".to_string(),
                server_name: "localhost".to_string(),
                server_port: 8080,
                received_at_unix_ms: 0,
            },
            1024,
        )
    }

    fn expectation(rules: Vec<RequestRule>, limiter: Option<RunLimit>, runs: u64) -> Expectation {
        Expectation {
            matcher: rules,
            response: StubResponse::empty(200).to_json().expect("template"),
            limiter,
            transform: None,
            runs,
        }
    }

    #[test]
    fn empty_list_is_no_match() {
        let outcome = match_request(&request("GET", "/"), &[]).expect("match");
        assert_eq!(outcome, MatchOutcome::NoMatch);
    }

    #[test]
    fn single_failing_rule_disqualifies() {
        let list = vec![expectation(
            vec![
                RequestRule::MethodIs {
                    value: "GET".to_string(),
                },
                RequestRule::PathIs {
                    value: "/other".to_string(),
                },
            ],
            None,
            0,
        )];
        let outcome = match_request(&request("GET", "/x"), &list).expect("match");
        assert_eq!(outcome, MatchOutcome::NoMatch);
    }

    #[test]
    fn newest_expectation_wins_over_older_specific_one() {
        // Stored newest-first: index 0 is the newer catch-all.
        let list = vec![
            expectation(
                vec![RequestRule::MethodIs {
                    value: "GET".to_string(),
                }],
                None,
                0,
            ),
            expectation(
                vec![RequestRule::PathIs {
                    value: "/x".to_string(),
                }],
                None,
                0,
            ),
        ];
        let outcome = match_request(&request("GET", "/x"), &list).expect("match");
        assert_eq!(outcome, MatchOutcome::Matched { index: 0 });
    }

    #[test]
    fn rule_less_expectation_matches_everything() {
        let list = vec![expectation(Vec::new(), None, 7)];
        let outcome = match_request(&request("DELETE", "/anything"), &list).expect("match");
        assert_eq!(outcome, MatchOutcome::Matched { index: 0 });
    }

    #[test]
    fn exhausted_is_a_fallback_not_a_winner() {
        // Newer expectation is exhausted; the older one still matches and
        // must win outright.
        let list = vec![
            expectation(Vec::new(), Some(RunLimit::RunsLessThan { max: 1 }), 1),
            expectation(Vec::new(), None, 0),
        ];
        let outcome = match_request(&request("GET", "/"), &list).expect("match");
        assert_eq!(outcome, MatchOutcome::Matched { index: 1 });
    }

    #[test]
    fn exhausted_reported_when_nothing_else_matches() {
        let list = vec![
            expectation(Vec::new(), Some(RunLimit::RunsLessThan { max: 2 }), 2),
            expectation(
                vec![RequestRule::PathIs {
                    value: "/elsewhere".to_string(),
                }],
                None,
                0,
            ),
        ];
        let outcome = match_request(&request("GET", "/"), &list).expect("match");
        assert_eq!(outcome, MatchOutcome::Exhausted { index: 0 });
    }

    #[test]
    fn first_exhausted_candidate_is_the_one_reported() {
        let list = vec![
            expectation(Vec::new(), Some(RunLimit::RunsLessThan { max: 1 }), 1),
            expectation(Vec::new(), Some(RunLimit::RunsLessThan { max: 5 }), 5),
        ];
        let outcome = match_request(&request("GET", "/"), &list).expect("match");
        assert_eq!(outcome, MatchOutcome::Exhausted { index: 0 });
    }

    #[test]
    fn broken_stored_rule_surfaces_as_error() {
        let list = vec![expectation(
            vec![RequestRule::PathMatches {
                pattern: "(".to_string(),
            }],
            None,
            0,
        )];
        assert!(match_request(&request("GET", "/"), &list).is_err());
    }
}
