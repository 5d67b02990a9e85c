//! Notification sink seam and message rendering.
//!
//! The actual transport (Slack, webhooks, ...) lives behind
//! `NotificationSink`. A delivered headline returns an opaque handle the
//! follow-up (proposal description) is threaded under.

use crate::catalog::Chain;
use crate::normalize::CanonicalProposal;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;
use tracing::info;

/// Descriptions are cut to this many characters before rendering.
pub const MAX_DESCRIPTION_CHARS: usize = 500;

#[derive(Error, Debug)]
pub enum DeliveryError {
    #[error("sink rejected message for {channel}: {reason}")]
    Rejected { channel: String, reason: String },
    #[error("sink transport error: {0}")]
    Transport(String),
}

/// Opaque sink-issued id of a delivered message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryHandle(pub String);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedMessage {
    pub text: String,
}

#[derive(Debug, Clone)]
pub struct Notification {
    pub headline: RenderedMessage,
    /// Threaded under the headline when present.
    pub follow_up: Option<RenderedMessage>,
}

#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn deliver(
        &self,
        channel: &str,
        message: &RenderedMessage,
    ) -> Result<DeliveryHandle, DeliveryError>;

    async fn reply(
        &self,
        channel: &str,
        parent: &DeliveryHandle,
        message: &RenderedMessage,
    ) -> Result<DeliveryHandle, DeliveryError>;
}

/// Writes notifications to the tracing log. Useful for dry runs.
#[derive(Debug, Default)]
pub struct LogSink {
    next_id: AtomicU64,
}

impl LogSink {
    pub fn new() -> Self {
        Self::default()
    }

    fn issue(&self) -> DeliveryHandle {
        DeliveryHandle(self.next_id.fetch_add(1, Ordering::Relaxed).to_string())
    }
}

#[async_trait]
impl NotificationSink for LogSink {
    async fn deliver(
        &self,
        channel: &str,
        message: &RenderedMessage,
    ) -> Result<DeliveryHandle, DeliveryError> {
        let handle = self.issue();
        info!(channel = channel, handle = %handle.0, text = %message.text, "notification");
        Ok(handle)
    }

    async fn reply(
        &self,
        channel: &str,
        parent: &DeliveryHandle,
        message: &RenderedMessage,
    ) -> Result<DeliveryHandle, DeliveryError> {
        let handle = self.issue();
        info!(channel = channel, parent = %parent.0, text = %message.text, "notification reply");
        Ok(handle)
    }
}

/// Build the headline + threaded description for one proposal.
pub fn render(
    chain: &Chain,
    proposal: &CanonicalProposal,
    first_seen: DateTime<Utc>,
) -> Notification {
    let mut headline = format!(
        "New proposal on {} ({}) #{}: {}",
        chain.pretty_name, chain.chain_id, proposal.proposal_id, proposal.title
    );
    if !proposal.kind.is_empty() {
        headline.push_str(&format!("\nType: {}", proposal.kind));
    }
    headline.push_str(&format!(
        "\nSubmitted: {}",
        first_seen.format("%Y-%m-%d %H:%M UTC")
    ));
    if let Some(link) = explorer_link(chain, &proposal.proposal_id) {
        headline.push_str(&format!("\n{}", link));
    }

    let follow_up = if proposal.description.is_empty() {
        None
    } else {
        Some(RenderedMessage {
            text: truncate_chars(&proposal.description, MAX_DESCRIPTION_CHARS),
        })
    };

    Notification {
        headline: RenderedMessage { text: headline },
        follow_up,
    }
}

/// Proposal page on a known explorer, mintscan preferred.
pub fn explorer_link(chain: &Chain, proposal_id: &str) -> Option<String> {
    if let Some(e) = chain.explorers.get("mintscan") {
        return Some(format!("{}/proposals/{}", e.url.trim_end_matches('/'), proposal_id));
    }
    if let Some(e) = chain.explorers.get("ping.pub") {
        return Some(format!("{}/gov/{}", e.url.trim_end_matches('/'), proposal_id));
    }
    None
}

fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((cut, _)) => format!("{}…", &text[..cut]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Explorer, NetworkType};
    use crate::retrieve::ProposalVariant;
    use std::collections::HashMap;

    fn chain(explorer_kind: Option<&str>) -> Chain {
        let mut explorers = HashMap::new();
        if let Some(kind) = explorer_kind {
            explorers.insert(
                kind.to_string(),
                Explorer {
                    kind: kind.to_string(),
                    url: "https://explorer.example/juno/".to_string(),
                },
            );
        }
        Chain {
            name: "juno".to_string(),
            chain_id: "juno-1".to_string(),
            pretty_name: "Juno".to_string(),
            network_type: NetworkType::Mainnet,
            rpc_endpoints: Vec::new(),
            rest_endpoints: Vec::new(),
            endpoint_overrides: None,
            explorers,
            sdk_version: None,
        }
    }

    fn proposal(description: &str) -> CanonicalProposal {
        CanonicalProposal {
            chain_id: "juno-1".to_string(),
            proposal_id: "321".to_string(),
            title: "Upgrade to v22".to_string(),
            description: description.to_string(),
            submit_time: Utc::now(),
            kind: "/cosmos.upgrade.v1beta1.MsgSoftwareUpgrade".to_string(),
            status: "PROPOSAL_STATUS_VOTING_PERIOD".to_string(),
            variant: ProposalVariant::Current,
        }
    }

    #[test]
    fn test_render_headline_and_thread() {
        let n = render(&chain(Some("mintscan")), &proposal("details"), Utc::now());
        assert!(n.headline.text.starts_with("New proposal on Juno (juno-1) #321: Upgrade to v22"));
        assert!(n.headline.text.contains("https://explorer.example/juno/proposals/321"));
        assert_eq!(n.follow_up.unwrap().text, "details");

        let n = render(&chain(None), &proposal(""), Utc::now());
        assert!(n.follow_up.is_none());
    }

    #[test]
    fn test_ping_pub_link() {
        assert_eq!(
            explorer_link(&chain(Some("ping.pub")), "7").as_deref(),
            Some("https://explorer.example/juno/gov/7")
        );
    }

    #[test]
    fn test_description_truncated_on_char_boundary() {
        let long = "é".repeat(MAX_DESCRIPTION_CHARS + 10);
        let n = render(&chain(None), &proposal(&long), Utc::now());
        let text = n.follow_up.unwrap().text;
        assert_eq!(text.chars().count(), MAX_DESCRIPTION_CHARS + 1);
        assert!(text.ends_with('…'));
    }

    #[tokio::test]
    async fn test_log_sink_issues_distinct_handles() {
        let sink = LogSink::new();
        let msg = RenderedMessage { text: "hi".to_string() };
        let a = sink.deliver("C1", &msg).await.unwrap();
        let b = sink.reply("C1", &a, &msg).await.unwrap();
        assert_ne!(a, b);
    }
}
