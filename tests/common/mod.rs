#![allow(dead_code)]

use govwatch::catalog::{Chain, Endpoint, EndpointKind, NetworkType};
use govwatch::probe::HealthProber;
use govwatch::retrieve::{ProposalRetriever, StrategyRegistry};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

pub fn chain(chain_id: &str, rest: &[String]) -> Arc<Chain> {
    Arc::new(Chain {
        name: chain_id.split('-').next().unwrap_or(chain_id).to_string(),
        chain_id: chain_id.to_string(),
        pretty_name: chain_id.to_string(),
        network_type: NetworkType::Mainnet,
        rpc_endpoints: Vec::new(),
        rest_endpoints: rest
            .iter()
            .map(|u| Endpoint::new(u, EndpointKind::Rest))
            .collect(),
        endpoint_overrides: None,
        explorers: HashMap::new(),
        sdk_version: None,
    })
}

pub fn retriever() -> ProposalRetriever {
    let prober = HealthProber::new(Duration::from_millis(500), 4).unwrap();
    ProposalRetriever::new(Duration::from_secs(2), prober, StrategyRegistry::default()).unwrap()
}

pub fn current_proposal(id: &str, title: &str) -> Value {
    json!({
        "id": id,
        "messages": [{"@type": "/cosmos.gov.v1.MsgExecLegacyContent"}],
        "status": "PROPOSAL_STATUS_VOTING_PERIOD",
        "submit_time": "2024-06-01T10:00:00Z",
        "title": title,
        "summary": format!("{} summary", title)
    })
}

pub fn legacy_proposal(id: &str, title: &str) -> Value {
    json!({
        "proposal_id": id,
        "content": {
            "@type": "/cosmos.gov.v1beta1.TextProposal",
            "title": title,
            "description": "legacy body"
        },
        "status": "PROPOSAL_STATUS_VOTING_PERIOD",
        "submit_time": "2023-11-20T08:30:00Z"
    })
}

/// Chain whose REST endpoints are pinned by an override list.
pub fn pinned_chain(chain_id: &str, declared: &[String], pinned: &[String]) -> Arc<Chain> {
    let mut chain = (*chain(chain_id, declared)).clone();
    chain.endpoint_overrides = Some(
        pinned
            .iter()
            .map(|u| Endpoint::new(u, EndpointKind::Rest))
            .collect(),
    );
    Arc::new(chain)
}
