//! HTTP transport: the mutually-authenticated client and the wire helpers
//! shared by every component.

use std::fs;
use std::time::Duration;

use reqwest::{Client, Identity, StatusCode};
use tracing::debug;

use crate::credentials::KeyCertPair;
use crate::error::{CredentialError, FetchError};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(10);
const RESPONSE_TIMEOUT: Duration = Duration::from_secs(3);

/// Build a client presenting the given key/cert pair.
///
/// Server certificate verification is disabled on purpose: brokers present
/// internal certificates and the operator trusts the fleet network.
pub fn build_client(pair: &KeyCertPair) -> Result<Client, CredentialError> {
    debug!(key = %pair.key.display(), cert = %pair.cert.display(), "loading key/cert pair");
    let cert = fs::read(&pair.cert).map_err(|source| CredentialError::Read {
        path: pair.cert.clone(),
        source,
    })?;
    let key = fs::read(&pair.key).map_err(|source| CredentialError::Read {
        path: pair.key.clone(),
        source,
    })?;
    let identity = Identity::from_pkcs8_pem(&cert, &key).map_err(CredentialError::Identity)?;

    Client::builder()
        .identity(identity)
        .danger_accept_invalid_certs(true)
        .connect_timeout(CONNECT_TIMEOUT)
        .tcp_keepalive(KEEPALIVE_INTERVAL)
        .read_timeout(RESPONSE_TIMEOUT)
        .build()
        .map_err(CredentialError::Client)
}

/// GET `url`, requiring exactly HTTP 200. Returns the raw body.
pub async fn get_bytes(client: &Client, url: &str) -> Result<Vec<u8>, FetchError> {
    debug!(url, "issuing GET");
    let response = client.get(url).send().await?;
    let status = response.status();
    let body = response.bytes().await?;
    if status != StatusCode::OK {
        return Err(FetchError::Status {
            code: status.as_u16(),
            body: String::from_utf8_lossy(&body).into_owned(),
        });
    }
    Ok(body.to_vec())
}

/// PUT `url` with no body, requiring exactly HTTP 200.
pub async fn put_expect_ok(client: &Client, url: &str) -> Result<(), FetchError> {
    debug!(url, "issuing PUT");
    let response = client.put(url).send().await?;
    let status = response.status();
    if status != StatusCode::OK {
        let body = response.text().await.unwrap_or_default();
        return Err(FetchError::Status {
            code: status.as_u16(),
            body,
        });
    }
    Ok(())
}
