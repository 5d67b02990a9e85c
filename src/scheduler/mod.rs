//! Polling cycle driver.
//!
//! One cycle: chains are split into fixed-size chunks, chunks run one after
//! another, chains inside a chunk are retrieved concurrently (bounded by
//! `workers`). Once every chunk is in, proposals are normalized and pushed
//! through the ledger to the sink, one delivery at a time with a pacing
//! delay in between.

use crate::catalog::Chain;
use crate::config::SchedulerConfig;
use crate::ledger::{Ledger, ProposalKey};
use crate::normalize::{CanonicalProposal, NormalizerRegistry};
use crate::notify::{self, NotificationSink};
use crate::retrieve::ProposalRetriever;
use futures::stream::{self, StreamExt};
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerSettings {
    pub interval: Duration,
    pub chunk_size: usize,
    pub workers: usize,
    pub notify_delay: Duration,
}

impl From<&SchedulerConfig> for SchedulerSettings {
    fn from(cfg: &SchedulerConfig) -> Self {
        Self {
            interval: Duration::from_secs(cfg.interval_secs),
            chunk_size: cfg.chunk_size.max(1),
            workers: cfg.workers.max(1),
            notify_delay: Duration::from_millis(cfg.notify_delay_ms),
        }
    }
}

/// A notification channel and the chain ids it wants to hear about.
#[derive(Debug, Clone)]
pub struct Subscription {
    pub channel: String,
    pub chain_ids: HashSet<String>,
}

impl Subscription {
    pub fn new<I, S>(channel: &str, chain_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            channel: channel.to_string(),
            chain_ids: chain_ids.into_iter().map(Into::into).collect(),
        }
    }

    pub fn wants(&self, chain_id: &str) -> bool {
        self.chain_ids.contains(chain_id)
    }
}

/// Counters for one polling cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub chains_polled: usize,
    pub chains_failed: usize,
    pub proposals_seen: usize,
    pub already_notified: usize,
    pub delivered: usize,
    pub delivery_failures: usize,
    pub ledger_errors: usize,
}

enum Outcome {
    Delivered,
    AlreadyNotified,
    DeliveryFailed,
    LedgerFailed,
}

pub struct Scheduler {
    retriever: Arc<ProposalRetriever>,
    normalizers: NormalizerRegistry,
    ledger: Ledger,
    sink: Arc<dyn NotificationSink>,
    chains: Vec<Arc<Chain>>,
    subscriptions: Vec<Subscription>,
    settings: SchedulerSettings,
}

impl Scheduler {
    pub fn new(
        retriever: Arc<ProposalRetriever>,
        normalizers: NormalizerRegistry,
        ledger: Ledger,
        sink: Arc<dyn NotificationSink>,
        chains: Vec<Arc<Chain>>,
        subscriptions: Vec<Subscription>,
        settings: SchedulerSettings,
    ) -> Self {
        Self {
            retriever,
            normalizers,
            ledger,
            sink,
            chains,
            subscriptions,
            settings,
        }
    }

    /// Poll every chain once and deliver whatever is new.
    pub async fn run_cycle(&self) -> CycleReport {
        let mut report = CycleReport::default();
        let batches = self.retrieve_all(&mut report).await;

        for (chain, proposals) in &batches {
            for sub in self.subscriptions.iter().filter(|s| s.wants(&chain.chain_id)) {
                for proposal in proposals {
                    match self.notify_once(&sub.channel, chain, proposal).await {
                        Outcome::Delivered => report.delivered += 1,
                        Outcome::AlreadyNotified => report.already_notified += 1,
                        Outcome::DeliveryFailed => report.delivery_failures += 1,
                        Outcome::LedgerFailed => report.ledger_errors += 1,
                    }
                }
            }
        }

        report
    }

    async fn retrieve_all(
        &self,
        report: &mut CycleReport,
    ) -> Vec<(Arc<Chain>, Vec<CanonicalProposal>)> {
        let mut batches = Vec::with_capacity(self.chains.len());

        for chunk in self.chains.chunks(self.settings.chunk_size) {
            let results: Vec<_> = stream::iter(chunk.iter().cloned())
                .map(|chain| async move {
                    let result = self.retriever.fetch(&chain).await;
                    (chain, result)
                })
                .buffer_unordered(self.settings.workers)
                .collect()
                .await;

            for (chain, result) in results {
                report.chains_polled += 1;
                match result {
                    Ok(raw) => {
                        let proposals = self.normalizers.normalize_all(&raw);
                        debug!(
                            chain = %chain.chain_id,
                            variant = %raw.variant,
                            endpoint = %raw.endpoint,
                            proposals = proposals.len(),
                            "chain polled"
                        );
                        report.proposals_seen += proposals.len();
                        batches.push((chain, proposals));
                    }
                    Err(e) => {
                        report.chains_failed += 1;
                        let causes: Vec<String> =
                            e.causes().iter().map(ToString::to_string).collect();
                        warn!(error = %e, causes = ?causes, "skipping chain this cycle");
                    }
                }
            }
        }

        batches
    }

    async fn notify_once(
        &self,
        channel: &str,
        chain: &Chain,
        proposal: &CanonicalProposal,
    ) -> Outcome {
        let key = ProposalKey::new(channel, &chain.chain_id, &proposal.proposal_id);

        let first_seen = match self
            .ledger
            .get_or_set_first_seen_submit_time(&key, proposal.submit_time)
            .await
        {
            Ok(t) => t,
            Err(e) => {
                warn!(key = %key, error = %e, "ledger read failed");
                return Outcome::LedgerFailed;
            }
        };

        match self.ledger.is_notified(&key).await {
            Ok(true) => return Outcome::AlreadyNotified,
            Ok(false) => {}
            Err(e) => {
                warn!(key = %key, error = %e, "ledger read failed");
                return Outcome::LedgerFailed;
            }
        }

        let message = notify::render(chain, proposal, first_seen);
        let delivered = self.sink.deliver(channel, &message.headline).await;
        // Pace the sink whether or not the delivery went through.
        tokio::time::sleep(self.settings.notify_delay).await;

        let handle = match delivered {
            Ok(handle) => handle,
            Err(e) => {
                warn!(key = %key, error = %e, "delivery failed, will retry next cycle");
                return Outcome::DeliveryFailed;
            }
        };

        if let Some(follow_up) = &message.follow_up {
            if let Err(e) = self.sink.reply(channel, &handle, follow_up).await {
                warn!(key = %key, error = %e, "follow-up delivery failed");
            }
        }

        if let Err(e) = self.ledger.mark_notified(&key).await {
            // Headline is out but uncommitted; it will be redelivered.
            warn!(key = %key, error = %e, "failed to record notification");
            return Outcome::LedgerFailed;
        }

        info!(
            channel = channel,
            chain = %chain.chain_id,
            proposal = %proposal.proposal_id,
            title = %proposal.title,
            "proposal notified"
        );
        Outcome::Delivered
    }

    /// Run cycles until Ctrl-C.
    pub async fn run(&self) {
        self.run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "failed to listen for Ctrl-C");
                std::future::pending::<()>().await;
            }
        })
        .await
    }

    /// Run cycles until `shutdown` resolves. Shutdown is only observed
    /// between cycles, never mid-delivery.
    ///
    /// `shutdown` is polled once before the first cycle so sources that
    /// register on first poll (the Ctrl-C handler) are armed for the whole run.
    pub async fn run_until<F>(&self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        if futures::poll!(shutdown.as_mut()).is_ready() {
            info!("shutdown requested before first cycle");
            return;
        }
        let mut cycle: u64 = 0;

        loop {
            cycle += 1;
            let started = std::time::Instant::now();
            let report = self.run_cycle().await;
            info!(
                cycle = cycle,
                elapsed_ms = started.elapsed().as_millis() as u64,
                chains = report.chains_polled,
                failed = report.chains_failed,
                proposals = report.proposals_seen,
                delivered = report.delivered,
                delivery_failures = report.delivery_failures,
                ledger_errors = report.ledger_errors,
                "cycle complete"
            );

            tokio::select! {
                _ = tokio::time::sleep(self.settings.interval) => {}
                _ = &mut shutdown => {
                    info!(cycles = cycle, "shutdown requested, stopping");
                    break;
                }
            }
        }
    }
}
