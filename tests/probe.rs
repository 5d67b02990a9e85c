use govwatch::catalog::{Endpoint, EndpointKind};
use govwatch::probe::HealthProber;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn test_fallback_probe_counts_as_healthy() {
    // node_info disabled, governance still served
    let gov_only = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/cosmos/base/tendermint/v1beta1/node_info"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&gov_only)
        .await;
    Mock::given(method("GET"))
        .and(path("/cosmos/gov/v1beta1/proposals"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&gov_only)
        .await;

    let prober = HealthProber::new(Duration::from_millis(500), 2).unwrap();
    assert!(prober.is_healthy(&Endpoint::new(&gov_only.uri(), EndpointKind::Rest)).await);
}

#[tokio::test]
async fn test_rpc_uses_health_route_and_order_is_kept() {
    let rpc_a = MockServer::start().await;
    let rpc_dead = MockServer::start().await;
    let rpc_b = MockServer::start().await;
    for server in [&rpc_a, &rpc_b] {
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(200))
            .mount(server)
            .await;
    }

    let endpoints = vec![
        Endpoint::new(&rpc_a.uri(), EndpointKind::Rpc),
        Endpoint::new(&rpc_dead.uri(), EndpointKind::Rpc),
        Endpoint::new(&rpc_b.uri(), EndpointKind::Rpc),
    ];
    let prober = HealthProber::new(Duration::from_millis(500), 3).unwrap();
    let healthy = prober.healthy(&endpoints).await;

    let urls: Vec<String> = healthy.into_iter().map(|e| e.url).collect();
    assert_eq!(urls, vec![rpc_a.uri(), rpc_b.uri()]);
}
