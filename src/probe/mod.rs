//! Endpoint health prober.
//!
//! Liveness is recomputed on every call; nothing is cached between cycles.
//! A probe is a cheap status request, falling back to a legacy governance
//! listing when the status route is missing or broken (plenty of public
//! REST deployments disable node_info but keep gov open). Every failure
//! degrades to "unhealthy"; probing never returns an error.

use crate::catalog::{Endpoint, EndpointKind};
use futures::stream::{self, StreamExt};
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

pub const RPC_STATUS_PATH: &str = "/health";
pub const REST_STATUS_PATH: &str = "/cosmos/base/tendermint/v1beta1/node_info";
pub const FALLBACK_PROBE_PATH: &str = "/cosmos/gov/v1beta1/proposals?proposal_status=2";

#[derive(Clone)]
pub struct HealthProber {
    http: Client,
    workers: usize,
}

impl HealthProber {
    pub fn new(timeout: Duration, workers: usize) -> Result<Self, reqwest::Error> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            workers: workers.max(1),
        })
    }

    /// Return the subset of `endpoints` currently answering, in declared order.
    pub async fn healthy(&self, endpoints: &[Endpoint]) -> Vec<Endpoint> {
        let mut results: Vec<(usize, bool)> = stream::iter(endpoints.iter().enumerate())
            .map(|(idx, endpoint)| async move { (idx, self.is_healthy(endpoint).await) })
            .buffer_unordered(self.workers)
            .collect()
            .await;

        results.sort_by_key(|(idx, _)| *idx);
        let healthy: Vec<Endpoint> = results
            .into_iter()
            .filter(|(_, ok)| *ok)
            .map(|(idx, _)| endpoints[idx].clone())
            .collect();

        debug!(
            declared = endpoints.len(),
            healthy = healthy.len(),
            "endpoint health probe complete"
        );
        healthy
    }

    pub async fn is_healthy(&self, endpoint: &Endpoint) -> bool {
        let status_path = match endpoint.kind {
            EndpointKind::Rpc => RPC_STATUS_PATH,
            EndpointKind::Rest => REST_STATUS_PATH,
        };

        if self.probe(endpoint, status_path).await {
            return true;
        }
        self.probe(endpoint, FALLBACK_PROBE_PATH).await
    }

    async fn probe(&self, endpoint: &Endpoint, path: &str) -> bool {
        let url = endpoint.join(path);
        match self.http.get(&url).send().await {
            Ok(resp) if resp.status().is_success() => true,
            Ok(resp) => {
                debug!(url = %url, status = %resp.status(), "probe returned non-success");
                false
            }
            Err(e) => {
                debug!(url = %url, error = %e, timeout = e.is_timeout(), "probe failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unreachable_endpoint_is_unhealthy() {
        let prober = HealthProber::new(Duration::from_millis(200), 4).unwrap();
        // TEST-NET-1, never routable
        let endpoint = Endpoint::new("http://192.0.2.1:9", EndpointKind::Rest);
        assert!(!prober.is_healthy(&endpoint).await);
        assert!(prober.healthy(&[endpoint]).await.is_empty());
    }

    #[tokio::test]
    async fn test_empty_endpoint_list() {
        let prober = HealthProber::new(Duration::from_millis(200), 4).unwrap();
        assert!(prober.healthy(&[]).await.is_empty());
    }
}
