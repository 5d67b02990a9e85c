//! Proposal retrieval across heterogeneous governance APIs.
//!
//! Chains either speak the SDK governance module (current `v1` shape with a
//! fallback to legacy `v1beta1`) or expose governance only through a
//! CosmWasm contract. The strategy is picked per chain id from a
//! `StrategyRegistry`; every success is tagged with the `ProposalVariant`
//! that produced it so the normalizer knows the response shape.
//!
//! Failures are isolated per chain: an exhausted chain is reported as
//! `RetrieveError::AllEndpointsExhausted` and simply skipped for the cycle.

pub mod contract;
pub mod gov;

pub use contract::ContractGovernance;

use crate::catalog::{Chain, Endpoint};
use crate::probe::HealthProber;
use rand::seq::SliceRandom;
use reqwest::Client;
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

/// Wire shape a proposal list was retrieved with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProposalVariant {
    /// `cosmos.gov.v1`
    Current,
    /// `cosmos.gov.v1beta1`
    Legacy,
    /// CosmWasm smart-contract query
    Contract,
}

impl fmt::Display for ProposalVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProposalVariant::Current => write!(f, "v1"),
            ProposalVariant::Legacy => write!(f, "v1beta1"),
            ProposalVariant::Contract => write!(f, "contract"),
        }
    }
}

/// Raw, not yet normalized, open proposals for one chain.
#[derive(Debug, Clone)]
pub struct RawProposals {
    pub chain_id: String,
    pub variant: ProposalVariant,
    /// Endpoint that answered.
    pub endpoint: String,
    pub entries: Vec<serde_json::Value>,
}

/// Why a single endpoint could not serve a request.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EndpointFailure {
    #[error("unreachable: {0}")]
    Unreachable(String),
    #[error("timed out")]
    Timeout,
    #[error("HTTP {0}")]
    Status(u16),
    #[error("governance API not implemented")]
    NotImplemented,
    #[error("malformed response: {0}")]
    Malformed(String),
}

impl From<reqwest::Error> for EndpointFailure {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            EndpointFailure::Timeout
        } else if e.is_decode() {
            EndpointFailure::Malformed(e.to_string())
        } else {
            EndpointFailure::Unreachable(e.to_string())
        }
    }
}

#[derive(Debug, Clone)]
pub struct EndpointAttempt {
    pub endpoint: String,
    pub variant: ProposalVariant,
    pub failure: EndpointFailure,
}

impl fmt::Display for EndpointAttempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]: {}", self.endpoint, self.variant, self.failure)
    }
}

#[derive(Error, Debug)]
pub enum RetrieveError {
    #[error("{chain_id}: {variant} governance API not implemented")]
    NotImplemented {
        chain_id: String,
        variant: ProposalVariant,
        causes: Vec<EndpointAttempt>,
    },
    #[error("{chain_id}: all endpoints exhausted ({} failed attempts)", .causes.len())]
    AllEndpointsExhausted {
        chain_id: String,
        causes: Vec<EndpointAttempt>,
    },
}

impl RetrieveError {
    pub fn causes(&self) -> &[EndpointAttempt] {
        match self {
            RetrieveError::NotImplemented { causes, .. } => causes,
            RetrieveError::AllEndpointsExhausted { causes, .. } => causes,
        }
    }

    fn into_causes(self) -> Vec<EndpointAttempt> {
        match self {
            RetrieveError::NotImplemented { causes, .. } => causes,
            RetrieveError::AllEndpointsExhausted { causes, .. } => causes,
        }
    }
}

#[derive(Debug, Clone)]
pub enum RetrievalStrategy {
    /// Governance module, current API first then legacy.
    Default,
    Contract(ContractGovernance),
}

/// chain id → retrieval strategy. Unregistered chains use the default.
#[derive(Debug, Clone)]
pub struct StrategyRegistry {
    custom: HashMap<String, ContractGovernance>,
}

impl Default for StrategyRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register("neutron-1", ContractGovernance::neutron_single_proposal());
        registry
    }
}

impl StrategyRegistry {
    pub fn empty() -> Self {
        Self {
            custom: HashMap::new(),
        }
    }

    pub fn register(&mut self, chain_id: &str, governance: ContractGovernance) {
        self.custom.insert(chain_id.to_string(), governance);
    }

    pub fn for_chain(&self, chain_id: &str) -> RetrievalStrategy {
        match self.custom.get(chain_id) {
            Some(gov) => RetrievalStrategy::Contract(gov.clone()),
            None => RetrievalStrategy::Default,
        }
    }

    /// Chain ids using a contract strategy.
    pub fn contract_chains(&self) -> impl Iterator<Item = &str> {
        self.custom.keys().map(String::as_str)
    }
}

pub struct ProposalRetriever {
    http: Client,
    prober: HealthProber,
    strategies: StrategyRegistry,
}

impl ProposalRetriever {
    pub fn new(
        fetch_timeout: Duration,
        prober: HealthProber,
        strategies: StrategyRegistry,
    ) -> Result<Self, reqwest::Error> {
        let http = Client::builder().timeout(fetch_timeout).build()?;
        Ok(Self {
            http,
            prober,
            strategies,
        })
    }

    pub fn strategies(&self) -> &StrategyRegistry {
        &self.strategies
    }

    /// Fetch the open-for-vote proposals of one chain.
    pub async fn fetch(&self, chain: &Chain) -> Result<RawProposals, RetrieveError> {
        match self.strategies.for_chain(&chain.chain_id) {
            RetrievalStrategy::Default => self.fetch_default(chain).await,
            RetrievalStrategy::Contract(gov) => self.fetch_contract(chain, &gov).await,
        }
    }

    /// Override list verbatim, else whatever declared REST endpoints pass a probe.
    async fn healthy_endpoints(&self, chain: &Chain) -> Vec<Endpoint> {
        if let Some(pinned) = &chain.endpoint_overrides {
            return pinned.clone();
        }
        self.prober.healthy(&chain.rest_endpoints).await
    }

    async fn fetch_default(&self, chain: &Chain) -> Result<RawProposals, RetrieveError> {
        let endpoints = self.healthy_endpoints(chain).await;
        if endpoints.is_empty() {
            debug!(
                chain = %chain.chain_id,
                declared = chain.rest_endpoints.len(),
                "no healthy REST endpoints"
            );
            return Err(RetrieveError::AllEndpointsExhausted {
                chain_id: chain.chain_id.clone(),
                causes: Vec::new(),
            });
        }

        let current_err = match self
            .try_variant(chain, &endpoints, ProposalVariant::Current)
            .await
        {
            Ok(raw) => return Ok(raw),
            Err(e) => e,
        };
        debug!(
            chain = %chain.chain_id,
            error = %current_err,
            "v1 proposals unavailable, falling back to v1beta1"
        );

        match self
            .try_variant(chain, &endpoints, ProposalVariant::Legacy)
            .await
        {
            Ok(raw) => Ok(raw),
            Err(legacy_err) => {
                let mut causes = current_err.into_causes();
                causes.extend(legacy_err.into_causes());
                Err(RetrieveError::AllEndpointsExhausted {
                    chain_id: chain.chain_id.clone(),
                    causes,
                })
            }
        }
    }

    /// Try each endpoint, in a fresh random order, until one answers 200.
    async fn try_variant(
        &self,
        chain: &Chain,
        endpoints: &[Endpoint],
        variant: ProposalVariant,
    ) -> Result<RawProposals, RetrieveError> {
        let mut order = endpoints.to_vec();
        order.shuffle(&mut rand::thread_rng());

        let mut causes = Vec::new();
        for endpoint in order {
            match gov::fetch_proposals(&self.http, &endpoint, variant).await {
                Ok(entries) => {
                    debug!(
                        chain = %chain.chain_id,
                        endpoint = %endpoint,
                        variant = %variant,
                        proposals = entries.len(),
                        "retrieved active proposals"
                    );
                    return Ok(RawProposals {
                        chain_id: chain.chain_id.clone(),
                        variant,
                        endpoint: endpoint.url,
                        entries,
                    });
                }
                Err(failure) => {
                    debug!(
                        chain = %chain.chain_id,
                        endpoint = %endpoint,
                        variant = %variant,
                        error = %failure,
                        "endpoint failed"
                    );
                    causes.push(EndpointAttempt {
                        endpoint: endpoint.url,
                        variant,
                        failure,
                    });
                }
            }
        }

        let all_unimplemented = !causes.is_empty()
            && causes
                .iter()
                .all(|c| c.failure == EndpointFailure::NotImplemented);
        if all_unimplemented {
            Err(RetrieveError::NotImplemented {
                chain_id: chain.chain_id.clone(),
                variant,
                causes,
            })
        } else {
            Err(RetrieveError::AllEndpointsExhausted {
                chain_id: chain.chain_id.clone(),
                causes,
            })
        }
    }

    async fn fetch_contract(
        &self,
        chain: &Chain,
        gov: &ContractGovernance,
    ) -> Result<RawProposals, RetrieveError> {
        // Contract chains skip probing: every declared endpoint is tried in turn.
        let endpoints = chain
            .endpoint_overrides
            .clone()
            .unwrap_or_else(|| chain.rest_endpoints.clone());

        let mut causes = Vec::new();
        for endpoint in endpoints {
            match gov.fetch_active(&self.http, &endpoint).await {
                Ok(entries) => {
                    info!(
                        chain = %chain.chain_id,
                        endpoint = %endpoint,
                        active = entries.len(),
                        "retrieved contract proposals"
                    );
                    return Ok(RawProposals {
                        chain_id: chain.chain_id.clone(),
                        variant: ProposalVariant::Contract,
                        endpoint: endpoint.url,
                        entries,
                    });
                }
                Err(failure) => {
                    debug!(
                        chain = %chain.chain_id,
                        endpoint = %endpoint,
                        error = %failure,
                        "contract query failed"
                    );
                    causes.push(EndpointAttempt {
                        endpoint: endpoint.url,
                        variant: ProposalVariant::Contract,
                        failure,
                    });
                }
            }
        }

        Err(RetrieveError::AllEndpointsExhausted {
            chain_id: chain.chain_id.clone(),
            causes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_defaults_to_gov_module() {
        let registry = StrategyRegistry::default();
        assert!(matches!(registry.for_chain("osmosis-1"), RetrievalStrategy::Default));
        assert!(matches!(
            registry.for_chain("neutron-1"),
            RetrievalStrategy::Contract(_)
        ));
        assert_eq!(registry.contract_chains().collect::<Vec<_>>(), vec!["neutron-1"]);
    }

    #[test]
    fn test_exhausted_error_lists_causes() {
        let err = RetrieveError::AllEndpointsExhausted {
            chain_id: "juno-1".to_string(),
            causes: vec![EndpointAttempt {
                endpoint: "https://a".to_string(),
                variant: ProposalVariant::Legacy,
                failure: EndpointFailure::Status(503),
            }],
        };
        assert_eq!(err.to_string(), "juno-1: all endpoints exhausted (1 failed attempts)");
        assert_eq!(err.causes()[0].to_string(), "https://a [v1beta1]: HTTP 503");
    }
}
