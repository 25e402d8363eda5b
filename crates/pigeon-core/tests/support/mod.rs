//! In-process mock brokers and a mock fleet directory for fan-out tests.
#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, put};
use axum::{Json, Router};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use url::Url;

use pigeon_core::config::Endpoints;
use pigeon_core::fleet::Target;

pub const STATUS_PATH: &str = "/api/pigeon/v1/status";
pub const SKIP_PATH: &str = "/api/pigeon/v1/messages/skip/";

#[derive(Clone)]
struct BrokerState {
    status_code: StatusCode,
    status_body: Value,
    skip_code: StatusCode,
    skips: Arc<Mutex<Vec<(String, String)>>>,
}

/// A broker node served from a local listener.
pub struct MockBroker {
    pub addr: SocketAddr,
    skips: Arc<Mutex<Vec<(String, String)>>>,
}

impl MockBroker {
    /// Broker answering 200 with the given status document and accepting
    /// every skip request.
    pub async fn healthy(status_body: Value) -> Self {
        Self::spawn(StatusCode::OK, status_body, StatusCode::OK).await
    }

    pub async fn spawn(status_code: StatusCode, status_body: Value, skip_code: StatusCode) -> Self {
        let skips = Arc::new(Mutex::new(Vec::new()));
        let state = BrokerState {
            status_code,
            status_body,
            skip_code,
            skips: Arc::clone(&skips),
        };
        let app = Router::new()
            .route(STATUS_PATH, get(status_handler))
            .route("/api/pigeon/v1/messages/skip/{queue}", put(skip_handler))
            .with_state(state);

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
        Self { addr, skips }
    }

    pub fn target(&self, host: &str) -> Target {
        Target::with_urls(
            host,
            format!("http://{}{STATUS_PATH}", self.addr),
            format!("http://{}{SKIP_PATH}", self.addr),
        )
    }

    /// `(queue, message_id)` pairs received by the skip endpoint, in arrival
    /// order.
    pub fn recorded_skips(&self) -> Vec<(String, String)> {
        self.skips.lock().unwrap().clone()
    }
}

async fn status_handler(State(state): State<BrokerState>) -> (StatusCode, Json<Value>) {
    (state.status_code, Json(state.status_body.clone()))
}

async fn skip_handler(
    State(state): State<BrokerState>,
    Path(queue): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> StatusCode {
    let message_id = params.get("msgId").cloned().unwrap_or_default();
    state.skips.lock().unwrap().push((queue, message_id));
    state.skip_code
}

/// A target whose address refuses connections.
pub async fn unreachable_target(host: &str) -> Target {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    Target::with_urls(
        host,
        format!("http://{addr}{STATUS_PATH}"),
        format!("http://{addr}{SKIP_PATH}"),
    )
}

/// One-route directory answering `GET /members` with the given body.
pub async fn spawn_directory(code: StatusCode, body: Value) -> SocketAddr {
    let app = Router::new().route(
        "/members",
        get(move || {
            let body = body.clone();
            async move { (code, Json(body)) }
        }),
    );
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
    addr
}

pub fn endpoints_for(directory: SocketAddr) -> Endpoints {
    Endpoints {
        directory_url: Url::parse(&format!("http://{directory}/members")).unwrap(),
        broker_scheme: "http".to_string(),
        broker_port: 4443,
        status_path: STATUS_PATH.to_string(),
        skip_path: SKIP_PATH.to_string(),
    }
}

pub fn broker_status(host: &str, subscriptions: Value) -> Value {
    json!({ "host": host, "pigeonStatus": { "subscriptions": subscriptions } })
}

pub fn subscription(namespace: &str, queue: &str, ids: &[&str]) -> Value {
    json!({
        "topicName": format!("{queue}.topic"),
        "property": namespace,
        "oldMessageCount": ids.len(),
        "oldMessages": ids,
        "subscriptionName": queue,
    })
}
