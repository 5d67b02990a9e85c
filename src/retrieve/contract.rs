//! Governance exposed through a CosmWasm contract (DAO-DAO style single
//! proposal module), queried via the wasm module's smart-query route.
//!
//! Query: `{"list_proposals": {"limit": N, "start_after": <last id>}}`,
//! base64 encoded into the URL path. Paging stops at the first empty page.

use super::EndpointFailure;
use crate::catalog::Endpoint;
use base64::engine::general_purpose::URL_SAFE as BASE64;
use base64::Engine;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use std::collections::HashSet;
use tracing::{debug, warn};

pub const NEUTRON_SINGLE_PROPOSAL_CONTRACT: &str =
    "neutron1436kxs0w2es6xlqpp9rd35e3d0cjnw4sv8j3a7483sgks29jqwgshlt6zh";
const DEFAULT_PAGE_LIMIT: usize = 50;
/// Hard stop on runaway pagination.
const MAX_PAGES: usize = 200;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractGovernance {
    pub address: String,
    pub page_limit: usize,
    /// Status value the contract uses for proposals open for voting.
    pub active_status: String,
}

impl ContractGovernance {
    pub fn neutron_single_proposal() -> Self {
        Self {
            address: NEUTRON_SINGLE_PROPOSAL_CONTRACT.to_string(),
            page_limit: DEFAULT_PAGE_LIMIT,
            active_status: "open".to_string(),
        }
    }

    /// URL path for one page of `list_proposals`.
    pub fn page_path(&self, start_after: Option<&Value>) -> String {
        let mut list = json!({ "limit": self.page_limit });
        if let Some(cursor) = start_after {
            list["start_after"] = cursor.clone();
        }
        let query = json!({ "list_proposals": list });
        format!(
            "/cosmwasm/wasm/v1/contract/{}/smart/{}",
            self.address,
            BASE64.encode(query.to_string())
        )
    }

    /// Page through every proposal on one endpoint and keep the active ones.
    pub async fn fetch_active(
        &self,
        http: &Client,
        endpoint: &Endpoint,
    ) -> Result<Vec<Value>, EndpointFailure> {
        let mut accumulated = ProposalAccumulator::default();
        let mut cursor: Option<Value> = None;

        for page_no in 0..MAX_PAGES {
            let url = endpoint.join(&self.page_path(cursor.as_ref()));
            let resp = http.get(&url).send().await?;
            if resp.status() != StatusCode::OK {
                return Err(EndpointFailure::Status(resp.status().as_u16()));
            }
            let body: Value = resp.json().await?;
            let page = page_entries(body)?;

            if page.is_empty() {
                debug!(endpoint = %endpoint, pages = page_no, total = accumulated.len(), "contract pagination complete");
                return Ok(accumulated.into_active(&self.active_status));
            }

            let next = page.last().and_then(|p| p.get("id")).cloned();
            let added = accumulated.extend(page);
            if added == 0 || next.is_none() {
                // Cursor did not advance; the contract ignored start_after.
                warn!(endpoint = %endpoint, "contract pagination stalled, stopping");
                return Ok(accumulated.into_active(&self.active_status));
            }
            cursor = next;
        }

        warn!(endpoint = %endpoint, max_pages = MAX_PAGES, "contract pagination hit page limit");
        Ok(accumulated.into_active(&self.active_status))
    }
}

fn page_entries(mut body: Value) -> Result<Vec<Value>, EndpointFailure> {
    match body.pointer_mut("/data/proposals").map(Value::take) {
        Some(Value::Array(entries)) => Ok(entries),
        _ => Err(EndpointFailure::Malformed(
            "missing `data.proposals`".to_string(),
        )),
    }
}

/// Proposals keyed by their contract id, first occurrence wins.
#[derive(Debug, Default)]
pub struct ProposalAccumulator {
    seen: HashSet<String>,
    entries: Vec<Value>,
}

impl ProposalAccumulator {
    /// Returns how many previously unseen entries were added.
    pub fn extend(&mut self, page: Vec<Value>) -> usize {
        let mut added = 0;
        for entry in page {
            let Some(id) = entry.get("id").map(id_key) else {
                continue;
            };
            if self.seen.insert(id) {
                self.entries.push(entry);
                added += 1;
            }
        }
        added
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn into_active(self, active_status: &str) -> Vec<Value> {
        self.entries
            .into_iter()
            .filter(|p| {
                p.pointer("/proposal/status").and_then(Value::as_str) == Some(active_status)
            })
            .collect()
    }
}

fn id_key(id: &Value) -> String {
    match id {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: u64, status: &str) -> Value {
        json!({"id": id, "proposal": {"title": format!("prop {}", id), "status": status}})
    }

    #[test]
    fn test_accumulator_dedups_and_filters() {
        let mut acc = ProposalAccumulator::default();
        assert_eq!(acc.extend(vec![entry(1, "open"), entry(2, "passed")]), 2);
        assert_eq!(acc.extend(vec![entry(2, "passed"), entry(3, "open")]), 1);
        assert_eq!(acc.len(), 3);

        let active = acc.into_active("open");
        let ids: Vec<u64> = active.iter().map(|p| p["id"].as_u64().unwrap()).collect();
        assert_eq!(ids, vec![1, 3]);
    }

    #[test]
    fn test_page_path_encodes_cursor() {
        let gov = ContractGovernance::neutron_single_proposal();
        let first = gov.page_path(None);
        let encoded = first.rsplit('/').next().unwrap();
        let decoded = String::from_utf8(BASE64.decode(encoded).unwrap()).unwrap();
        assert_eq!(decoded, r#"{"list_proposals":{"limit":50}}"#);

        let next = gov.page_path(Some(&json!(50)));
        let encoded = next.rsplit('/').next().unwrap();
        let decoded = String::from_utf8(BASE64.decode(encoded).unwrap()).unwrap();
        assert_eq!(decoded, r#"{"list_proposals":{"limit":50,"start_after":50}}"#);
        assert!(next.starts_with(&format!(
            "/cosmwasm/wasm/v1/contract/{}/smart/",
            NEUTRON_SINGLE_PROPOSAL_CONTRACT
        )));
    }
}
