//! A loopback JSON-RPC node for tests.

use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use axum::{
    Router,
    extract::State,
    http::{HeaderMap, StatusCode, header::AUTHORIZATION},
    routing::post,
};
use serde_json::{Value, json};
use tokio::net::TcpListener;

use crate::{auth::RpcCredential, client::NodeClient};

type Handler = dyn Fn(&Value) -> (StatusCode, String) + Send + Sync;

#[derive(Clone)]
struct NodeState {
    handler: Arc<Handler>,
    authorization: Arc<Mutex<Option<String>>>,
    calls: Arc<Mutex<Vec<Value>>>,
}

pub(crate) struct FakeNode {
    url: String,
    authorization: Arc<Mutex<Option<String>>>,
    calls: Arc<Mutex<Vec<Value>>>,
}

impl FakeNode {
    pub(crate) async fn spawn<F>(handler: F) -> Self
    where
        F: Fn(&Value) -> (StatusCode, String) + Send + Sync + 'static,
    {
        let state = NodeState {
            handler: Arc::new(handler),
            authorization: Arc::default(),
            calls: Arc::default(),
        };
        let authorization = state.authorization.clone();
        let calls = state.calls.clone();

        let app = Router::new().route("/", post(handle)).with_state(state);
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            url: format!("http://{addr}/"),
            authorization,
            calls,
        }
    }

    pub(crate) fn client(&self) -> NodeClient {
        NodeClient::new(
            self.url.clone(),
            RpcCredential::from_user_pass("user", "pass"),
            Duration::from_secs(5),
        )
        .unwrap()
    }

    pub(crate) fn last_authorization(&self) -> Option<String> {
        self.authorization.lock().unwrap().clone()
    }

    /// Request envelopes received so far, in order.
    pub(crate) fn calls(&self) -> Vec<Value> {
        self.calls.lock().unwrap().clone()
    }

    /// Methods called so far, in order.
    pub(crate) fn methods(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|call| call["method"].as_str().unwrap_or_default().to_string())
            .collect()
    }
}

async fn handle(
    State(state): State<NodeState>,
    headers: HeaderMap,
    body: String,
) -> (StatusCode, String) {
    if let Some(value) = headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok()) {
        *state.authorization.lock().unwrap() = Some(value.to_string());
    }
    let request: Value = serde_json::from_str(&body).unwrap_or(Value::Null);
    state.calls.lock().unwrap().push(request.clone());
    (state.handler)(&request)
}

pub(crate) fn rpc_ok(result: Value) -> (StatusCode, String) {
    (
        StatusCode::OK,
        json!({ "result": result, "error": null, "id": null }).to_string(),
    )
}

pub(crate) fn rpc_error(status: StatusCode, code: i64, message: &str) -> (StatusCode, String) {
    (
        status,
        json!({ "result": null, "error": { "code": code, "message": message }, "id": null })
            .to_string(),
    )
}
