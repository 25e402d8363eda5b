//! Per-invocation configuration.
//!
//! All settings are resolved once, up front, into immutable values that are
//! passed to the components that need them. Defaults can be adjusted by an
//! optional config file; command-line flags override the file.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use url::Url;

use crate::error::ConfigError;

/// Role used to mint the administrative role certificate.
pub const DEFAULT_ROLE: &str = "pigeon_admin_role";

/// Marker token identifying fleet members that serve status/skip requests.
pub const DEFAULT_TAIL_MARKER: &str = "tail";

const BROKER_PORT: u16 = 4443;
const STATUS_PATH: &str = "/api/pigeon/v1/status";
const SKIP_PATH: &str = "/api/pigeon/v1/messages/skip/";

const DIRECTORY_URL_PROD: &str =
    "https://edge.dist.yahoo.com:4443/roles/v1/roles/nevec_egs_pigeon.HOSTs.prod/members?output=json";
const DIRECTORY_URL_STAGING: &str =
    "https://edge.dist.yahoo.com:4443/roles/v1/roles/nevec_egs_pigeon.HOSTs.int/members?output=json";

/// Which fleet an invocation operates on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Production,
    Staging,
}

/// Operator-facing settings for one invocation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub environment: Environment,
    pub role: String,
    pub tail_marker: String,
    pub key_override: Option<PathBuf>,
    pub cert_override: Option<PathBuf>,
}

impl Settings {
    pub fn new(environment: Environment) -> Self {
        Self {
            environment,
            role: DEFAULT_ROLE.to_string(),
            tail_marker: DEFAULT_TAIL_MARKER.to_string(),
            key_override: None,
            cert_override: None,
        }
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = role.into();
        self
    }

    pub fn with_tail_marker(mut self, marker: impl Into<String>) -> Self {
        self.tail_marker = marker.into();
        self
    }

    pub fn with_key_cert_override(mut self, key: PathBuf, cert: PathBuf) -> Self {
        self.key_override = Some(key);
        self.cert_override = Some(cert);
        self
    }
}

/// Resolved endpoint set: the membership endpoint plus the pieces from which
/// per-target status and skip URLs are derived.
#[derive(Debug, Clone)]
pub struct Endpoints {
    pub directory_url: Url,
    pub broker_scheme: String,
    pub broker_port: u16,
    pub status_path: String,
    pub skip_path: String,
}

impl Endpoints {
    pub fn for_environment(environment: Environment) -> Self {
        let raw = match environment {
            Environment::Production => DIRECTORY_URL_PROD,
            Environment::Staging => DIRECTORY_URL_STAGING,
        };
        Self {
            directory_url: Url::parse(raw).expect("built-in directory endpoint is a valid URL"),
            broker_scheme: "https".to_string(),
            broker_port: BROKER_PORT,
            status_path: STATUS_PATH.to_string(),
            skip_path: SKIP_PATH.to_string(),
        }
    }

    pub fn with_directory_url(mut self, raw: &str) -> Result<Self, ConfigError> {
        self.directory_url = Url::parse(raw).map_err(|source| ConfigError::DirectoryUrl {
            url: raw.to_string(),
            source,
        })?;
        Ok(self)
    }
}

/// Optional on-disk defaults, loaded from `<config dir>/pigeonctl/config.toml`.
/// A missing file yields the defaults; a malformed file is an error.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FileConfig {
    pub role: Option<String>,
    pub tail_marker: Option<String>,
    pub directory_url: Option<String>,
}

impl FileConfig {
    pub fn load_default() -> Result<Self, ConfigError> {
        let Some(config_dir) = dirs::config_dir() else {
            return Ok(Self::default());
        };
        Self::load_from(&config_dir.join("pigeonctl").join("config.toml"))
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}
