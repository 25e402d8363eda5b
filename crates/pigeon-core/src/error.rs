//! Error taxonomy: invocation-fatal errors versus per-target failures that
//! are recorded in the aggregated results.

use std::io;
use std::path::PathBuf;
use std::process::ExitStatus;

use thiserror::Error;

/// Failure of a single HTTP transaction.
///
/// During fan-out these are recorded per target and never abort the batch;
/// only the directory lookup treats one as fatal (there is no partial fleet
/// to salvage at that point).
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("transaction error: {0}")]
    Request(#[from] reqwest::Error),
    #[error("server returned code {code} with message: {body}")]
    Status { code: u16, body: String },
    #[error("malformed response body: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Fleet membership lookup failure. Always fatal to the invocation.
#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("membership lookup failed: {0}")]
    Fetch(#[from] FetchError),
    #[error("membership response contains no host groups")]
    EmptyMembership,
}

/// Client identity could not be detected, loaded, or turned into a usable
/// transport. Always fatal; never retried.
#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("could not determine home directory")]
    NoHomeDir,
    #[error("failed to read {}: {}", .path.display(), .source)]
    Read { path: PathBuf, source: io::Error },
    #[error("malformed host document: {0}")]
    HostDocument(#[source] serde_json::Error),
    #[error("identity key {} does not exist", .0.display())]
    MissingKey(PathBuf),
    #[error("{utility} could not be run: {source}")]
    UtilityMissing { utility: String, source: io::Error },
    #[error("{utility} failed with {status}")]
    Utility { utility: String, status: ExitStatus },
    #[error("failed to load client certificate: {0}")]
    Identity(#[source] reqwest::Error),
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}

/// A required input is missing or malformed before any network call is made.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {}: {}", .path.display(), .source)]
    Read { path: PathBuf, source: io::Error },
    #[error("invalid config file {}: {}", .path.display(), .source)]
    Parse { path: PathBuf, source: toml::de::Error },
    #[error("invalid directory URL {url}: {source}")]
    DirectoryUrl { url: String, source: url::ParseError },
}
