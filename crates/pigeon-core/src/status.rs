//! Status fan-out: one concurrent probe per target, partial failure
//! tolerated and recorded instead of propagated.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::task::JoinSet;
use tracing::error;

use crate::error::FetchError;
use crate::fleet::Target;
use crate::transport;

/// One subscription's stuck-message state as reported by a broker.
///
/// `old_message_count` and `old_messages` come from the broker and are not
/// required to agree; the identifier list drives iteration, the count drives
/// the stuck predicate.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionStatus {
    pub topic_name: String,
    pub property: String,
    pub old_message_count: u64,
    #[serde(default)]
    pub old_messages: Vec<String>,
    pub subscription_name: String,
}

impl SubscriptionStatus {
    pub fn has_stuck_messages(&self) -> bool {
        self.old_message_count != 0
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueReport {
    #[serde(default)]
    pub subscriptions: Vec<SubscriptionStatus>,
}

/// The status document a broker returns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerStatus {
    /// Host name the broker reports about itself; display only. Outcomes are
    /// keyed by the target the request was sent to.
    pub host: String,
    #[serde(rename = "pigeonStatus")]
    pub queue_report: QueueReport,
}

/// Outcome of probing one target.
#[derive(Debug)]
pub struct TargetStatus {
    pub target: Target,
    pub result: Result<BrokerStatus, FetchError>,
}

/// Probe every target concurrently and collect exactly one outcome per
/// target. No ordering is imposed; callers wanting deterministic output sort
/// by host themselves.
pub async fn collect_status(client: &Client, targets: &[Target]) -> Vec<TargetStatus> {
    let mut probes = spawn_status_probes(client, targets);
    let mut statuses = Vec::with_capacity(targets.len());
    while let Some(joined) = probes.join_next().await {
        match joined {
            Ok(status) => statuses.push(status),
            Err(err) => error!(%err, "status probe did not complete"),
        }
    }
    statuses
}

/// Spawn the per-target probe tasks without waiting for them, so callers can
/// act on each listing as it arrives.
pub(crate) fn spawn_status_probes(client: &Client, targets: &[Target]) -> JoinSet<TargetStatus> {
    let mut probes = JoinSet::new();
    for target in targets {
        let client = client.clone();
        let target = target.clone();
        probes.spawn(async move {
            let result = fetch_status(&client, &target).await;
            TargetStatus { target, result }
        });
    }
    probes
}

async fn fetch_status(client: &Client, target: &Target) -> Result<BrokerStatus, FetchError> {
    let body = transport::get_bytes(client, target.status_url()).await?;
    Ok(serde_json::from_slice(&body)?)
}
