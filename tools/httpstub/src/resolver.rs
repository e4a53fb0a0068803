//! Turning a match outcome into an outbound response.

use crate::client::ClientKey;
use crate::errors::StubError;
use crate::expectation::Expectation;
use crate::matcher::{match_request, MatchOutcome};
use crate::request::{status, RequestRecord, StubResponse};
use crate::store::{Namespace, Store};

pub const GONE_BODY: &str = "Expectation no longer applicable";
pub const NOT_FOUND_BODY: &str = "No matching expectation found";

/// Evaluate the stored expectations against `request` and build the final
/// response. The whole sequence (decode, match, run-counter increment,
/// persist) runs inside the expectations resource's critical section, so
/// concurrent evaluations for one client cannot lose a counter update and
/// cannot over-admit past a limiter.
pub fn resolve(
    store: &Store,
    client: &ClientKey,
    request: &RequestRecord,
) -> Result<StubResponse, StubError> {
    store.exclusive(client, Namespace::Expectations, |records| {
        let mut expectations = records
            .iter()
            .map(|payload| Expectation::from_json(payload))
            .collect::<Result<Vec<_>, _>>()?;

        match match_request(request, &expectations)? {
            MatchOutcome::Matched { index } => {
                expectations[index].runs += 1;
                records[index] = expectations[index].to_json()?;

                let mut response = StubResponse::from_json(&expectations[index].response)?;
                if let Some(rewrites) = &expectations[index].transform {
                    for rewrite in rewrites {
                        rewrite.apply(&mut response);
                    }
                }
                Ok(response)
            }
            MatchOutcome::Exhausted { .. } => Ok(StubResponse::text(status::GONE, GONE_BODY)),
            MatchOutcome::NoMatch => Ok(StubResponse::text(status::NOT_FOUND, NOT_FOUND_BODY)),
        }
    })
}
