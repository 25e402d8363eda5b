//! Client identity detection and role-certificate acquisition.
//!
//! Resolution order: explicit key/cert overrides win; a host carrying a
//! service-identity host document uses the service pair derived from it;
//! otherwise the operator's user identity under `~/.athenz` is used,
//! bootstrapping it with the `athenz-user-cert` utility when absent.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use serde::Deserialize;
use tracing::{debug, info};

use crate::config::{Environment, Settings};
use crate::error::CredentialError;

const SIA_ROOT_DIR: &str = "/var/lib/sia";
const USER_CERT_UTILITY: &str = "athenz-user-cert";
const ROLE_CERT_UTILITY: &str = "zts-rolecert";
const ZTS_ENDPOINT: &str = "https://zts.athens.yahoo.com:4443/zts/v1";
const ZTS_DNS_DOMAIN: &str = "zts.yahoo.cloud";
const UTILITY_PATH_DIRS: &str = "/usr/bin:/opt/yahoo/yamas/bin:/usr/local/bin";

/// Where the minted role certificate lands.
pub const ROLE_CERT_PATH: &str = "/tmp/pigeon_admin_role.cert";

/// A private key / certificate file pair.
#[derive(Debug, Clone)]
pub struct KeyCertPair {
    pub key: PathBuf,
    pub cert: PathBuf,
}

impl KeyCertPair {
    pub fn new(key: impl Into<PathBuf>, cert: impl Into<PathBuf>) -> Self {
        Self {
            key: key.into(),
            cert: cert.into(),
        }
    }

    /// Same key, different certificate. Role certificates are minted against
    /// the identity key, so broker clients reuse it.
    pub fn with_cert(&self, cert: impl Into<PathBuf>) -> Self {
        Self {
            key: self.key.clone(),
            cert: cert.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct HostDocument {
    domain: String,
    service: String,
}

/// Resolve the identity key/cert pair for this invocation.
pub fn detect_identity(settings: &Settings) -> Result<KeyCertPair, CredentialError> {
    if let (Some(key), Some(cert)) = (&settings.key_override, &settings.cert_override) {
        debug!(key = %key.display(), cert = %cert.display(), "using explicit key/cert pair");
        return Ok(KeyCertPair::new(key.clone(), cert.clone()));
    }

    let host_document = Path::new(SIA_ROOT_DIR).join("host_document");
    if host_document.exists() {
        return service_identity(&host_document);
    }
    user_identity()
}

fn service_identity(host_document: &Path) -> Result<KeyCertPair, CredentialError> {
    info!("detecting service identity");
    let raw = fs::read(host_document).map_err(|source| CredentialError::Read {
        path: host_document.to_path_buf(),
        source,
    })?;
    let doc: HostDocument = serde_json::from_slice(&raw).map_err(CredentialError::HostDocument)?;
    let service = primary_service(&doc.service);
    debug!(domain = %doc.domain, service, "parsed host document");

    Ok(KeyCertPair::new(
        format!("{SIA_ROOT_DIR}/keys/{}.{service}.key.pem", doc.domain),
        format!("{SIA_ROOT_DIR}/certs/{}.{service}.cert.pem", doc.domain),
    ))
}

// The service field can hold a comma-delimited list; the first entry is by
// convention the canonical service.
fn primary_service(raw: &str) -> &str {
    raw.split(',').next().unwrap_or(raw)
}

fn user_identity() -> Result<KeyCertPair, CredentialError> {
    let home = dirs::home_dir().ok_or(CredentialError::NoHomeDir)?;
    let identity_dir = home.join(".athenz");
    let pair = KeyCertPair::new(identity_dir.join("key"), identity_dir.join("cert"));
    if pair_present(&pair) {
        debug!(dir = %identity_dir.display(), "found user identity pair");
        return Ok(pair);
    }

    info!("user identity pair missing, running {USER_CERT_UTILITY}");
    run_utility(Command::new(USER_CERT_UTILITY), USER_CERT_UTILITY)?;
    if pair_present(&pair) {
        Ok(pair)
    } else {
        Err(CredentialError::MissingKey(pair.key))
    }
}

fn pair_present(pair: &KeyCertPair) -> bool {
    pair.key.exists() && pair.cert.exists()
}

/// Mint the short-lived role certificate used for broker calls.
pub fn acquire_role_cert(
    settings: &Settings,
    identity: &KeyCertPair,
) -> Result<PathBuf, CredentialError> {
    let role_domain = match settings.environment {
        Environment::Production => "nevec.pigeon.prod",
        Environment::Staging => "nevec.pigeon.int",
    };
    info!(role = %settings.role, domain = role_domain, "minting role certificate");

    let mut cmd = Command::new(ROLE_CERT_UTILITY);
    cmd.arg("-svc-key-file")
        .arg(&identity.key)
        .arg("-svc-cert-file")
        .arg(&identity.cert)
        .args(["-zts", ZTS_ENDPOINT])
        .args(["-role-domain", role_domain])
        .args(["-role-name", &settings.role])
        .args(["-dns-domain", ZTS_DNS_DOMAIN])
        .args(["-role-cert-file", ROLE_CERT_PATH]);
    run_utility(cmd, ROLE_CERT_UTILITY)?;

    Ok(PathBuf::from(ROLE_CERT_PATH))
}

fn run_utility(mut cmd: Command, utility: &str) -> Result<(), CredentialError> {
    // The utilities live outside the default PATH on some hosts; extend the
    // child's PATH rather than mutating our own environment.
    cmd.env("PATH", extended_path());
    debug!(utility, "running credential utility");
    let status = cmd.status().map_err(|source| CredentialError::UtilityMissing {
        utility: utility.to_string(),
        source,
    })?;
    if status.success() {
        Ok(())
    } else {
        Err(CredentialError::Utility {
            utility: utility.to_string(),
            status,
        })
    }
}

fn extended_path() -> String {
    match std::env::var("PATH") {
        Ok(path) => format!("{path}:{UTILITY_PATH_DIRS}"),
        Err(_) => UTILITY_PATH_DIRS.to_string(),
    }
}
