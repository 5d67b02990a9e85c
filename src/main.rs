use govwatch::catalog::{Catalog, CatalogHandle, Chain};
use govwatch::config::{Config, LedgerBackend};
use govwatch::ledger::{Ledger, RedisStore};
use govwatch::normalize::{validate_registries, NormalizerRegistry};
use govwatch::notify::LogSink;
use govwatch::probe::HealthProber;
use govwatch::retrieve::{ProposalRetriever, StrategyRegistry};
use govwatch::scheduler::{Scheduler, SchedulerSettings, Subscription};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

const CONFIG_FILE: &str = "govwatch.toml";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Load config
    let from_file = Path::new(CONFIG_FILE).exists();
    let config = if from_file {
        Config::load(Path::new(CONFIG_FILE))?
    } else {
        Config::from_env()?
    };

    // Initialize logging
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level));

    if config.logging.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .init();
    }

    info!("govwatch v{} starting", env!("CARGO_PKG_VERSION"));
    if !from_file {
        info!("no {} found, using env-only config", CONFIG_FILE);
    }

    // --- Chain catalog ---
    let catalog = Catalog::load_dir(&config.registry.path)?.with_overrides(&config.overrides);
    let catalog = CatalogHandle::new(catalog);
    let snapshot = catalog.snapshot();

    let mut chains: Vec<Arc<Chain>> = Vec::new();
    let mut seen = HashSet::new();
    let mut subscriptions = Vec::new();

    let mut resolve = |key: &str, chains: &mut Vec<Arc<Chain>>| match snapshot.get_chain(key) {
        Ok(chain) => {
            if seen.insert(chain.chain_id.clone()) {
                chains.push(chain.clone());
            }
            Some(chain.chain_id.clone())
        }
        Err(e) => {
            warn!(error = %e, "chain not loaded");
            None
        }
    };

    for key in &config.chains {
        resolve(key, &mut chains);
    }
    for channel in &config.channels {
        let chain_ids: Vec<String> = config
            .channel_chains(channel)
            .into_iter()
            .filter_map(|key| resolve(key, &mut chains))
            .collect();
        info!(channel = %channel.id, chains = chain_ids.len(), "channel subscribed");
        subscriptions.push(Subscription::new(&channel.id, chain_ids));
    }

    if chains.is_empty() {
        warn!("no chains resolved, nothing to monitor");
        return Ok(());
    }
    if subscriptions.is_empty() {
        warn!("no notification channels configured, proposals will not be delivered");
    }

    // --- Retrieval / normalization ---
    let strategies = StrategyRegistry::default();
    let normalizers = NormalizerRegistry::default();
    validate_registries(&strategies, &normalizers)?;

    let prober = HealthProber::new(
        Duration::from_millis(config.probe.timeout_ms),
        config.probe.workers,
    )?;
    let retriever = ProposalRetriever::new(
        Duration::from_secs(config.fetch.timeout_secs),
        prober,
        strategies,
    )?;

    // --- Ledger ---
    let ledger = match config.ledger.backend {
        LedgerBackend::Memory => {
            warn!("in-memory ledger: notification history is lost on restart");
            Ledger::in_memory()
        }
        LedgerBackend::Redis => {
            let store = RedisStore::connect(&config.ledger.url, &config.ledger.prefix).await?;
            store.ping().await?;
            info!(prefix = %config.ledger.prefix, "Valkey ledger ready");
            Ledger::new(Arc::new(store))
        }
    };

    let settings = SchedulerSettings::from(&config.scheduler);
    info!(
        chains = chains.len(),
        interval_secs = settings.interval.as_secs(),
        chunk_size = settings.chunk_size,
        workers = settings.workers,
        probe_workers = config.probe.workers,
        "starting polling loop"
    );

    let scheduler = Scheduler::new(
        Arc::new(retriever),
        normalizers,
        ledger,
        Arc::new(LogSink::new()),
        chains,
        subscriptions,
        settings,
    );
    scheduler.run().await;

    info!("govwatch stopped");
    Ok(())
}
