#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message as WsMessage};

use hub_api::{AppState, AppStateInner, build_router};
use hub_db::Database;
use hub_gateway::dispatcher::Dispatcher;
use hub_service::MessageService;

pub const SECRET: &str = "test-secret";

pub type Ws = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub struct TestServer {
    pub addr: SocketAddr,
    pub state: AppState,
    pub server: JoinHandle<()>,
    _tmp: tempfile::TempDir,
}

impl TestServer {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn service(&self) -> &MessageService {
        &self.state.service
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.server.abort();
    }
}

pub async fn spawn_server(require_session: bool) -> TestServer {
    let tmp = tempfile::tempdir().unwrap();
    let db = Database::open(&tmp.path().join("hub.db")).unwrap();
    let state: AppState = Arc::new(AppStateInner {
        service: MessageService::new(Arc::new(db)),
        dispatcher: Dispatcher::default(),
        jwt_secret: SECRET.to_string(),
        require_session,
    });

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = build_router(state.clone());
    let server = tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    TestServer {
        addr,
        state,
        server,
        _tmp: tmp,
    }
}

pub async fn connect(addr: SocketAddr) -> Ws {
    let (ws, _) = connect_async(format!("ws://{}/ws/community", addr))
        .await
        .unwrap();
    ws
}

pub async fn send(ws: &mut Ws, frame: Value) {
    ws.send(WsMessage::Text(frame.to_string().into())).await.unwrap();
}

pub async fn send_raw(ws: &mut Ws, text: &str) {
    ws.send(WsMessage::Text(text.into())).await.unwrap();
}

/// Next JSON event, skipping control frames. Fails after five seconds.
pub async fn next_event(ws: &mut Ws) -> Value {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match ws.next().await {
                Some(Ok(WsMessage::Text(txt))) => {
                    return serde_json::from_str::<Value>(txt.as_str()).unwrap();
                }
                Some(Ok(_)) => continue,
                other => panic!("socket ended: {other:?}"),
            }
        }
    })
    .await
    .expect("timed out waiting for an event")
}

/// Skips events until one of the given type arrives.
pub async fn next_of(ws: &mut Ws, kind: &str) -> Value {
    loop {
        let event = next_event(ws).await;
        if event["type"] == kind {
            return event;
        }
    }
}

/// Asserts no event of `kind` shows up within `ms` milliseconds.
pub async fn assert_no_event(ws: &mut Ws, kind: &str, ms: u64) {
    let seen = tokio::time::timeout(Duration::from_millis(ms), async {
        loop {
            match ws.next().await {
                Some(Ok(WsMessage::Text(txt))) => {
                    let event: Value = serde_json::from_str(txt.as_str()).unwrap();
                    if event["type"] == kind {
                        return event;
                    }
                }
                Some(Ok(_)) => continue,
                other => panic!("socket ended: {other:?}"),
            }
        }
    })
    .await;
    if let Ok(event) = seen {
        panic!("unexpected {kind} event: {event}");
    }
}

/// Joins with an asserted identity and waits for the presence snapshot.
pub async fn join(ws: &mut Ws, channel_id: &str, user_id: &str, username: &str) -> Value {
    send(
        ws,
        serde_json::json!({
            "type": "join",
            "channelId": channel_id,
            "userId": user_id,
            "username": username,
        }),
    )
    .await;
    next_of(ws, "presence").await
}

/// Like `join`, but names the community so the member's online flag follows
/// the connection.
pub async fn join_in(
    ws: &mut Ws,
    channel_id: &str,
    community_id: &str,
    user_id: &str,
    username: &str,
) -> Value {
    send(
        ws,
        serde_json::json!({
            "type": "join",
            "channelId": channel_id,
            "communityId": community_id,
            "userId": user_id,
            "username": username,
        }),
    )
    .await;
    next_of(ws, "presence").await
}

/// Registers a user over REST and returns `(user_id, token)`.
pub async fn register(client: &reqwest::Client, server: &TestServer, username: &str) -> (String, String) {
    let resp = client
        .post(server.url("/auth/register"))
        .json(&serde_json::json!({ "username": username, "password": "correct horse" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::CREATED);
    let body: Value = resp.json().await.unwrap();
    (
        body["userId"].as_str().unwrap().to_string(),
        body["token"].as_str().unwrap().to_string(),
    )
}
