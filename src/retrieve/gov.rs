//! SDK governance module REST calls (`cosmos.gov.v1` and `cosmos.gov.v1beta1`).

use super::{EndpointFailure, ProposalVariant};
use crate::catalog::Endpoint;
use reqwest::{Client, StatusCode};
use serde_json::Value;

/// `proposal_status=2` is PROPOSAL_STATUS_VOTING_PERIOD.
pub const CURRENT_PROPOSALS_PATH: &str = "/cosmos/gov/v1/proposals?proposal_status=2";
pub const LEGACY_PROPOSALS_PATH: &str = "/cosmos/gov/v1beta1/proposals?proposal_status=2";

/// gRPC `Unimplemented`, surfaced in the gateway's JSON error body.
const GRPC_UNIMPLEMENTED: i64 = 12;

pub fn proposals_path(variant: ProposalVariant) -> &'static str {
    match variant {
        ProposalVariant::Legacy => LEGACY_PROPOSALS_PATH,
        _ => CURRENT_PROPOSALS_PATH,
    }
}

/// GET the voting-period proposal list from one endpoint.
pub async fn fetch_proposals(
    http: &Client,
    endpoint: &Endpoint,
    variant: ProposalVariant,
) -> Result<Vec<Value>, EndpointFailure> {
    let url = endpoint.join(proposals_path(variant));
    let resp = http.get(&url).send().await?;

    let status = resp.status();
    if status != StatusCode::OK {
        let body = resp.text().await.unwrap_or_default();
        return Err(classify_failure(status, &body));
    }

    let body: Value = resp.json().await?;
    extract_proposals(body)
}

/// Map a non-200 response onto a failure, recognising "not implemented"
/// both as HTTP 501 and as a gateway error body carrying gRPC code 12.
pub fn classify_failure(status: StatusCode, body: &str) -> EndpointFailure {
    if status == StatusCode::NOT_IMPLEMENTED {
        return EndpointFailure::NotImplemented;
    }
    let code = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("code").and_then(Value::as_i64));
    if code == Some(GRPC_UNIMPLEMENTED) {
        return EndpointFailure::NotImplemented;
    }
    EndpointFailure::Status(status.as_u16())
}

fn extract_proposals(mut body: Value) -> Result<Vec<Value>, EndpointFailure> {
    match body.get_mut("proposals").map(Value::take) {
        Some(Value::Array(entries)) => Ok(entries),
        Some(Value::Null) => Ok(Vec::new()),
        Some(other) => Err(EndpointFailure::Malformed(format!(
            "`proposals` is not an array: {}",
            other
        ))),
        None => Err(EndpointFailure::Malformed("missing `proposals`".to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_not_implemented_detection() {
        assert_eq!(
            classify_failure(StatusCode::NOT_IMPLEMENTED, ""),
            EndpointFailure::NotImplemented
        );
        assert_eq!(
            classify_failure(
                StatusCode::BAD_REQUEST,
                r#"{"code":12,"message":"Not Implemented","details":[]}"#
            ),
            EndpointFailure::NotImplemented
        );
        assert_eq!(
            classify_failure(StatusCode::SERVICE_UNAVAILABLE, "<html>bad gateway</html>"),
            EndpointFailure::Status(503)
        );
    }

    #[test]
    fn test_extract_proposals() {
        let entries = extract_proposals(json!({"proposals": [{"id": "1"}], "pagination": {}})).unwrap();
        assert_eq!(entries.len(), 1);
        assert!(extract_proposals(json!({"proposals": null})).unwrap().is_empty());
        assert!(matches!(
            extract_proposals(json!({"error": "nope"})),
            Err(EndpointFailure::Malformed(_))
        ));
    }
}
