//! Skip dispatch: administrative discard of stuck messages, one PUT per
//! (target, message identifier) pair.
//!
//! Both modes collect every outcome and never abort on a per-target failure,
//! matching the status aggregator's tolerance of a partly unreachable fleet.

use reqwest::Client;
use tokio::task::JoinSet;
use tracing::{debug, error};

use crate::error::FetchError;
use crate::fleet::Target;
use crate::status::{self, BrokerStatus};
use crate::transport;

/// Message selector meaning "every stuck message of the queue".
pub const SKIP_ALL: &str = "all";

/// Outcome of one skip request.
#[derive(Debug)]
pub struct SkipOutcome {
    pub host: String,
    pub message_id: String,
    pub result: Result<(), FetchError>,
}

impl SkipOutcome {
    pub fn succeeded(&self) -> bool {
        self.result.is_ok()
    }
}

/// A target whose stuck-message listing could not be obtained, so nothing
/// was dispatched to it.
#[derive(Debug)]
pub struct TargetFailure {
    pub host: String,
    pub error: FetchError,
}

/// Everything that happened during one skip invocation.
#[derive(Debug, Default)]
pub struct SkipReport {
    pub outcomes: Vec<SkipOutcome>,
    pub unreachable: Vec<TargetFailure>,
}

impl SkipReport {
    pub fn failed_count(&self) -> usize {
        self.outcomes.iter().filter(|o| !o.succeeded()).count()
    }
}

/// Skip one message on every target.
///
/// Brokers that do not hold the message answer non-200; that is recorded as
/// an ordinary failure outcome, not treated specially.
pub async fn skip_one(
    client: &Client,
    targets: &[Target],
    queue: &str,
    message_id: &str,
) -> SkipReport {
    let mut dispatches = JoinSet::new();
    for target in targets {
        dispatches.spawn(dispatch_skip(
            client.clone(),
            target.clone(),
            queue.to_string(),
            message_id.to_string(),
        ));
    }

    let mut report = SkipReport::default();
    drain_dispatches(&mut dispatches, &mut report).await;
    report
}

/// List every target's stuck messages for `queue`, then skip each one on the
/// broker that holds it.
///
/// Dispatch for a broker starts as soon as its listing arrives; slower
/// brokers do not hold up remediation on the ones that already answered.
pub async fn skip_all(client: &Client, targets: &[Target], queue: &str) -> SkipReport {
    let mut listings = status::spawn_status_probes(client, targets);
    let mut dispatches = JoinSet::new();
    let mut report = SkipReport::default();

    while let Some(joined) = listings.join_next().await {
        let listing = match joined {
            Ok(listing) => listing,
            Err(err) => {
                error!(%err, "status probe did not complete");
                continue;
            }
        };
        match listing.result {
            Ok(broker) => {
                for message_id in stuck_messages_for_queue(&broker, queue) {
                    dispatches.spawn(dispatch_skip(
                        client.clone(),
                        listing.target.clone(),
                        queue.to_string(),
                        message_id,
                    ));
                }
            }
            Err(error) => report.unreachable.push(TargetFailure {
                host: listing.target.host().to_string(),
                error,
            }),
        }
    }

    drain_dispatches(&mut dispatches, &mut report).await;
    report
}

/// Stuck message identifiers of the subscription named `queue`, in the order
/// the broker reported them.
pub fn stuck_messages_for_queue(broker: &BrokerStatus, queue: &str) -> Vec<String> {
    broker
        .queue_report
        .subscriptions
        .iter()
        .filter(|sub| sub.subscription_name == queue && sub.has_stuck_messages())
        .flat_map(|sub| sub.old_messages.iter().cloned())
        .collect()
}

async fn dispatch_skip(
    client: Client,
    target: Target,
    queue: String,
    message_id: String,
) -> SkipOutcome {
    let url = target.skip_url(&queue, &message_id);
    debug!(%url, host = target.host(), "dispatching skip");
    let result = transport::put_expect_ok(&client, &url).await;
    SkipOutcome {
        host: target.host().to_string(),
        message_id,
        result,
    }
}

async fn drain_dispatches(dispatches: &mut JoinSet<SkipOutcome>, report: &mut SkipReport) {
    while let Some(joined) = dispatches.join_next().await {
        match joined {
            Ok(outcome) => report.outcomes.push(outcome),
            Err(err) => error!(%err, "skip dispatch did not complete"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn broker_with(subs: &[(&str, &str, u64, &[&str])]) -> BrokerStatus {
        let subscriptions = subs
            .iter()
            .map(|(property, queue, count, ids)| {
                serde_json::json!({
                    "topicName": format!("{queue}.topic"),
                    "property": property,
                    "oldMessageCount": count,
                    "oldMessages": ids,
                    "subscriptionName": queue,
                })
            })
            .collect::<Vec<_>>();
        serde_json::from_value(serde_json::json!({
            "host": "tail1",
            "pigeonStatus": { "subscriptions": subscriptions }
        }))
        .unwrap()
    }

    #[test]
    fn extracts_identifiers_for_the_named_queue_only() {
        let broker = broker_with(&[
            ("NevecTW", "Q", 2, &["m1", "m2"]),
            ("NevecTW", "R", 1, &["m3"]),
        ]);
        assert_eq!(stuck_messages_for_queue(&broker, "Q"), ["m1", "m2"]);
        assert_eq!(stuck_messages_for_queue(&broker, "R"), ["m3"]);
        assert!(stuck_messages_for_queue(&broker, "S").is_empty());
    }

    #[test]
    fn zero_count_subscription_contributes_nothing() {
        let broker = broker_with(&[("NevecTW", "Q", 0, &[])]);
        assert!(stuck_messages_for_queue(&broker, "Q").is_empty());
    }

    #[test]
    fn report_counts_failures() {
        let report = SkipReport {
            outcomes: vec![
                SkipOutcome {
                    host: "tail1".into(),
                    message_id: "m1".into(),
                    result: Ok(()),
                },
                SkipOutcome {
                    host: "tail2".into(),
                    message_id: "m1".into(),
                    result: Err(FetchError::Status {
                        code: 500,
                        body: String::new(),
                    }),
                },
            ],
            unreachable: Vec::new(),
        };
        assert_eq!(report.failed_count(), 1);
        assert!(report.outcomes[0].succeeded());
        assert!(!report.outcomes[1].succeeded());
    }
}
