//! Response normalization: every retrieval variant maps onto one
//! `CanonicalProposal`.
//!
//! Optional fields degrade to empty strings or placeholders. Only a missing
//! proposal id is an error, and it drops that single entry.

use crate::config::ConfigError;
use crate::retrieve::{ProposalVariant, RawProposals, StrategyRegistry};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::HashMap;
use thiserror::Error;
use tracing::warn;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum NormalizeError {
    #[error("{chain_id}: proposal entry has no id")]
    MissingProposalId { chain_id: String },
    #[error("{0}: no contract normalizer registered")]
    NoNormalizer(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalProposal {
    pub chain_id: String,
    /// Chain-scoped; only `(chain_id, proposal_id)` is unique.
    pub proposal_id: String,
    pub title: String,
    pub description: String,
    pub submit_time: DateTime<Utc>,
    /// Best-effort proposal kind, usually a protobuf type URL.
    pub kind: String,
    pub status: String,
    pub variant: ProposalVariant,
}

/// Per-contract mapping of raw entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContractNormalizer {
    /// DAO-DAO single proposal module as deployed on Neutron.
    SingleProposal { kind: &'static str },
}

impl ContractNormalizer {
    fn normalize(
        &self,
        chain_id: &str,
        entry: &Value,
        now: DateTime<Utc>,
    ) -> Result<CanonicalProposal, NormalizeError> {
        match self {
            ContractNormalizer::SingleProposal { kind } => {
                let proposal_id = id_field(entry, "id").ok_or_else(|| {
                    NormalizeError::MissingProposalId {
                        chain_id: chain_id.to_string(),
                    }
                })?;
                let inner = entry.get("proposal");
                Ok(CanonicalProposal {
                    chain_id: chain_id.to_string(),
                    proposal_id,
                    title: str_field(inner, "title"),
                    description: str_field(inner, "description"),
                    // The contract keeps no submit time.
                    submit_time: now,
                    kind: kind.to_string(),
                    status: str_field(inner, "status"),
                    variant: ProposalVariant::Contract,
                })
            }
        }
    }
}

/// chain id → contract normalizer.
#[derive(Debug, Clone)]
pub struct NormalizerRegistry {
    contracts: HashMap<String, ContractNormalizer>,
}

impl Default for NormalizerRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register(
            "neutron-1",
            ContractNormalizer::SingleProposal {
                kind: "Neutron Single Proposal",
            },
        );
        registry
    }
}

impl NormalizerRegistry {
    pub fn empty() -> Self {
        Self {
            contracts: HashMap::new(),
        }
    }

    pub fn register(&mut self, chain_id: &str, normalizer: ContractNormalizer) {
        self.contracts.insert(chain_id.to_string(), normalizer);
    }

    pub fn contract(&self, chain_id: &str) -> Option<ContractNormalizer> {
        self.contracts.get(chain_id).copied()
    }

    /// Normalize one raw entry tagged with the variant that produced it.
    pub fn normalize(
        &self,
        chain_id: &str,
        entry: &Value,
        variant: ProposalVariant,
    ) -> Result<CanonicalProposal, NormalizeError> {
        match variant {
            ProposalVariant::Current => normalize_current(chain_id, entry),
            ProposalVariant::Legacy => normalize_legacy(chain_id, entry),
            ProposalVariant::Contract => self
                .contract(chain_id)
                .ok_or_else(|| NormalizeError::NoNormalizer(chain_id.to_string()))?
                .normalize(chain_id, entry, Utc::now()),
        }
    }

    /// Normalize a whole batch, dropping (and logging) entries without an id.
    pub fn normalize_all(&self, raw: &RawProposals) -> Vec<CanonicalProposal> {
        raw.entries
            .iter()
            .filter_map(|entry| {
                match self.normalize(&raw.chain_id, entry, raw.variant) {
                    Ok(p) => Some(p),
                    Err(e) => {
                        warn!(chain = %raw.chain_id, variant = %raw.variant, error = %e, "dropping proposal entry");
                        None
                    }
                }
            })
            .collect()
    }
}

/// Every chain with a contract retrieval strategy needs a contract normalizer.
/// Checked once at startup.
pub fn validate_registries(
    strategies: &StrategyRegistry,
    normalizers: &NormalizerRegistry,
) -> Result<(), ConfigError> {
    for chain_id in strategies.contract_chains() {
        if normalizers.contract(chain_id).is_none() {
            return Err(ConfigError::MissingNormalizer(chain_id.to_string()));
        }
    }
    Ok(())
}

/// `cosmos.gov.v1`: title/summary at top level, older chains nest them in
/// the first message's legacy `content`.
fn normalize_current(chain_id: &str, entry: &Value) -> Result<CanonicalProposal, NormalizeError> {
    let proposal_id = id_field(entry, "id").ok_or_else(|| NormalizeError::MissingProposalId {
        chain_id: chain_id.to_string(),
    })?;

    let first_message = entry
        .get("messages")
        .and_then(Value::as_array)
        .and_then(|m| m.first());
    let message_content = first_message.and_then(|m| m.get("content"));

    let mut title = str_field(Some(entry), "title");
    if title.is_empty() {
        title = first_non_empty(&[
            str_field(message_content, "title"),
            str_field(first_message, "title"),
        ]);
    }

    let mut description = str_field(Some(entry), "summary");
    if description.is_empty() {
        description = first_non_empty(&[
            str_field(message_content, "description"),
            str_field(first_message, "description"),
        ]);
    }

    Ok(CanonicalProposal {
        chain_id: chain_id.to_string(),
        proposal_id,
        title,
        description,
        submit_time: time_field(entry, "submit_time"),
        kind: str_field(first_message, "@type"),
        status: str_field(Some(entry), "status"),
        variant: ProposalVariant::Current,
    })
}

/// `cosmos.gov.v1beta1`: everything lives in the typed `content` wrapper.
fn normalize_legacy(chain_id: &str, entry: &Value) -> Result<CanonicalProposal, NormalizeError> {
    let proposal_id =
        id_field(entry, "proposal_id").ok_or_else(|| NormalizeError::MissingProposalId {
            chain_id: chain_id.to_string(),
        })?;

    let content = entry.get("content");
    let kind = str_field(content, "@type");
    let mut title = str_field(content, "title");
    if title.is_empty() {
        let declared = if kind.is_empty() { "unknown" } else { kind.as_str() };
        title = format!("No title (Type is {})", declared);
    }

    Ok(CanonicalProposal {
        chain_id: chain_id.to_string(),
        proposal_id,
        title,
        description: str_field(content, "description"),
        submit_time: time_field(entry, "submit_time"),
        kind,
        status: str_field(Some(entry), "status"),
        variant: ProposalVariant::Legacy,
    })
}

fn str_field(obj: Option<&Value>, key: &str) -> String {
    obj.and_then(|o| o.get(key))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .trim()
        .to_string()
}

/// Ids arrive as strings (`"42"`) from the SDK and numbers from contracts.
fn id_field(obj: &Value, key: &str) -> Option<String> {
    match obj.get(key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Missing or unparsable timestamps fall back to "now".
fn time_field(obj: &Value, key: &str) -> DateTime<Utc> {
    obj.get(key)
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(Utc::now)
}

fn first_non_empty(candidates: &[String]) -> String {
    candidates
        .iter()
        .find(|c| !c.is_empty())
        .cloned()
        .unwrap_or_default()
}
