//! Fleet directory lookup and target derivation.

use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::Endpoints;
use crate::error::{DirectoryError, FetchError};
use crate::transport;

#[derive(Debug, Clone, Deserialize)]
struct MembershipGroup {
    #[serde(default)]
    members: Vec<String>,
}

// The control plane answers with a list of host groups; some deployments
// return a single bare group instead.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum MembershipDoc {
    Groups(Vec<MembershipGroup>),
    Single(MembershipGroup),
}

/// A broker node eligible for status/skip requests.
///
/// Ephemeral: derived from the directory response for one invocation.
#[derive(Debug, Clone)]
pub struct Target {
    host: String,
    status_url: String,
    skip_base: String,
}

impl Target {
    pub fn from_host(host: &str, endpoints: &Endpoints) -> Self {
        let base = format!(
            "{}://{}:{}",
            endpoints.broker_scheme, host, endpoints.broker_port
        );
        Self {
            host: host.to_string(),
            status_url: format!("{base}{}", endpoints.status_path),
            skip_base: format!("{base}{}", endpoints.skip_path),
        }
    }

    /// Build a target from explicit URLs, bypassing endpoint derivation.
    pub fn with_urls(
        host: impl Into<String>,
        status_url: impl Into<String>,
        skip_base: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            status_url: status_url.into(),
            skip_base: skip_base.into(),
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn status_url(&self) -> &str {
        &self.status_url
    }

    pub fn skip_url(&self, queue: &str, message_id: &str) -> String {
        format!("{}{queue}?msgId={message_id}", self.skip_base)
    }
}

/// Fetch the fleet membership and filter it to the eligible targets.
///
/// An empty result is not an error: subsequent fan-outs simply operate on
/// zero targets.
pub async fn eligible_targets(
    client: &Client,
    endpoints: &Endpoints,
    marker: &str,
) -> Result<Vec<Target>, DirectoryError> {
    let body = transport::get_bytes(client, endpoints.directory_url.as_str()).await?;
    let members = parse_members(&body)?;
    let targets: Vec<Target> = members
        .iter()
        .filter(|host| host.contains(marker))
        .map(|host| Target::from_host(host, endpoints))
        .collect();
    debug!(
        eligible = targets.len(),
        total = members.len(),
        marker,
        "filtered fleet membership"
    );
    Ok(targets)
}

fn parse_members(body: &[u8]) -> Result<Vec<String>, DirectoryError> {
    let doc: MembershipDoc = serde_json::from_slice(body).map_err(FetchError::from)?;
    match doc {
        MembershipDoc::Single(group) => Ok(group.members),
        MembershipDoc::Groups(groups) => {
            if groups.len() > 1 {
                warn!(
                    groups = groups.len(),
                    "membership response contains multiple host groups, reading the first"
                );
            }
            groups
                .into_iter()
                .next()
                .map(|group| group.members)
                .ok_or(DirectoryError::EmptyMembership)
        }
    }
}
