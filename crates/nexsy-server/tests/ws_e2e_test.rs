use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use nexsy_db::Database;
use nexsy_server::build_app;
use nexsy_server::config::ServerConfig;
use nexsy_types::events::ServerEvent;
use nexsy_types::models::MessageStatus;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

fn test_config() -> ServerConfig {
    ServerConfig::from_lookup(|key| match key {
        "NEXSY_JWT_SECRET" => Some("e2e-test-secret".into()),
        "NEXSY_HOST" => Some("127.0.0.1".into()),
        _ => None,
    })
    .unwrap()
}

/// Serve the app on an ephemeral port and return its address.
async fn start_server() -> String {
    let db = Arc::new(Database::open_in_memory().unwrap());
    let app = build_app(&test_config(), db).unwrap();
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr.to_string()
}

async fn signup(http: &reqwest::Client, base: &str, username: &str) -> String {
    let res = http
        .post(format!("{}/api/register", base))
        .json(&json!({ "username": username, "password": "password1" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 201);

    let body: Value = http
        .post(format!("{}/api/login", base))
        .json(&json!({ "username": username, "password": "password1" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["success"], true);
    body["token"].as_str().unwrap().to_string()
}

async fn open_socket(addr: &str, username: &str) -> Socket {
    let (mut ws, _) = connect_async(format!("ws://{}/ws", addr)).await.unwrap();
    let snapshot = next_event(&mut ws).await;
    assert!(matches!(snapshot, ServerEvent::OnlineUsers(_)));

    let register = json!({ "type": "registerUser", "data": { "username": username } });
    ws.send(WsMessage::Text(register.to_string().into()))
        .await
        .unwrap();
    ws
}

async fn next_event(ws: &mut Socket) -> ServerEvent {
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timed out waiting for an event")
            .unwrap()
            .unwrap();
        if let WsMessage::Text(text) = frame {
            return serde_json::from_str(text.as_str()).unwrap();
        }
    }
}

/// Skip events until one with the given wire name arrives.
async fn wait_for(ws: &mut Socket, name: &str) -> ServerEvent {
    loop {
        let event = next_event(ws).await;
        if event.name() == name {
            return event;
        }
    }
}

#[tokio::test]
async fn chat_round_trip_over_http_and_websocket() {
    let addr = start_server().await;
    let base = format!("http://{}", addr);
    let http = reqwest::Client::new();

    let health: Value = http
        .get(format!("{}/api/health", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "OK");
    assert_eq!(health["database"], "connected");

    let amy_token = signup(&http, &base, "amy").await;
    signup(&http, &base, "bob").await;

    let mut amy = open_socket(&addr, "amy").await;
    wait_for(&mut amy, "allUsers").await;
    let mut bob = open_socket(&addr, "bob").await;
    wait_for(&mut bob, "allUsers").await;

    let send = json!({
        "type": "send_message",
        "data": { "sender": "bob", "receiver": "amy", "text": "hi" }
    });
    bob.send(WsMessage::Text(send.to_string().into())).await.unwrap();

    let ServerEvent::ReceiveMessage(received) = wait_for(&mut amy, "receive_message").await else {
        unreachable!()
    };
    assert_eq!(received.text, "hi");
    assert_eq!(received.status, MessageStatus::Delivered);
    let ServerEvent::MessageSent(acked) = wait_for(&mut bob, "message_sent").await else {
        unreachable!()
    };
    assert_eq!(acked.id, received.id);

    let seen = json!({
        "type": "mark_messages_seen",
        "data": { "sender": "bob", "receiver": "amy" }
    });
    amy.send(WsMessage::Text(seen.to_string().into())).await.unwrap();

    let ServerEvent::MessagesSeen(receipt) = wait_for(&mut bob, "messages_seen").await else {
        unreachable!()
    };
    assert_eq!(receipt.messages.len(), 1);
    assert_eq!(receipt.messages[0].status, MessageStatus::Seen);

    // History over REST reflects the same lifecycle.
    let history: Value = http
        .get(format!("{}/api/messages", base))
        .bearer_auth(&amy_token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(history["success"], true);
    assert_eq!(history["messages"][0]["status"], "seen");
    assert_eq!(history["messages"][0]["_id"], received.id.to_string());
}

#[tokio::test]
async fn message_history_requires_a_valid_token() {
    let addr = start_server().await;
    let base = format!("http://{}", addr);
    let http = reqwest::Client::new();

    let res = http.get(format!("{}/api/messages", base)).send().await.unwrap();
    assert_eq!(res.status(), 401);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["message"], "Access token required");

    let res = http
        .get(format!("{}/api/messages", base))
        .bearer_auth("forged.token.value")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 403);
}

#[tokio::test]
async fn closing_the_socket_takes_the_user_offline() {
    let addr = start_server().await;
    let base = format!("http://{}", addr);
    let http = reqwest::Client::new();
    signup(&http, &base, "amy").await;
    signup(&http, &base, "bob").await;

    let mut amy = open_socket(&addr, "amy").await;
    wait_for(&mut amy, "allUsers").await;
    let mut bob = open_socket(&addr, "bob").await;
    wait_for(&mut bob, "allUsers").await;

    bob.close(None).await.unwrap();

    loop {
        if let ServerEvent::OnlineUsers(online) = wait_for(&mut amy, "onlineUsers").await {
            if online == vec!["amy".to_string()] {
                break;
            }
        }
    }
}
