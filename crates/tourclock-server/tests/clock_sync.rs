//! End-to-end clock sync over real WebSockets.

use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::{sleep, timeout, Instant};
use tokio_tungstenite::{
    connect_async,
    tungstenite::{Error as WsError, Message},
    MaybeTlsStream, WebSocketStream,
};
use tourclock_protocol::clock_endpoint;
use tourclock_server::config::{Config, DirectoryConfig, EventConfig};
use tourclock_server::directory::EventStatus;
use tourclock_server::handlers::{self, AppState};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn start_server(config: Config) -> (SocketAddr, Arc<AppState>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let state = Arc::new(AppState::new(config));
    tokio::spawn(handlers::serve(listener, Arc::clone(&state)));
    (addr, state)
}

async fn connect(addr: SocketAddr, tour: &str) -> Client {
    let url = format!("ws://{addr}/tours/{tour}/clock");
    let (ws, _) = connect_async(url).await.unwrap();
    ws
}

async fn send(ws: &mut Client, text: &str) {
    ws.send(Message::Text(text.to_string())).await.unwrap();
}

async fn recv(ws: &mut Client) -> Option<String> {
    match timeout(Duration::from_millis(1000), ws.next()).await {
        Ok(Some(Ok(Message::Text(text)))) => Some(text),
        _ => None,
    }
}

async fn assert_silent(ws: &mut Client) {
    if let Ok(Some(Ok(msg))) = timeout(Duration::from_millis(200), ws.next()).await {
        panic!("Expected no message, got {:?}", msg);
    }
}

async fn wait_for_members(state: &AppState, channel: &str, expected: usize) {
    let deadline = Instant::now() + Duration::from_secs(2);
    loop {
        let count = state
            .registry
            .get(channel)
            .map(|c| c.member_count())
            .unwrap_or(0);
        if count == expected {
            return;
        }
        assert!(Instant::now() < deadline, "channel {channel} has {count} members, expected {expected}");
        sleep(Duration::from_millis(10)).await;
    }
}

async fn wait_for_endpoint(state: &AppState, tour: &str, expected: usize) {
    let deadline = Instant::now() + Duration::from_secs(2);
    let key = clock_endpoint(tour);
    while state.endpoints.connection_count(&key) != expected {
        assert!(Instant::now() < deadline, "endpoint {key} never reached {expected} connections");
        sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn test_manager_handshake_and_relay() {
    let (addr, state) = start_server(Config::default()).await;

    let mut s1 = connect(addr, "42").await;
    let mut s2 = connect(addr, "42").await;

    send(&mut s1, r#"{"type":"join","name":"alice","clockManager":true}"#).await;
    wait_for_members(&state, "42", 1).await;
    assert_silent(&mut s1).await;

    send(&mut s2, r#"{"type":"join","name":"bob","clockManager":false}"#).await;
    assert_eq!(recv(&mut s1).await.as_deref(), Some("join"));
    assert_silent(&mut s2).await;

    send(&mut s2, r#"{"type":"sync","data":{"elapsed":30}}"#).await;
    let relayed: serde_json::Value = serde_json::from_str(&recv(&mut s1).await.unwrap()).unwrap();
    assert_eq!(relayed, serde_json::json!({"elapsed": 30}));
    assert_silent(&mut s2).await;

    s1.close(None).await.unwrap();
    wait_for_members(&state, "42", 1).await;
    let remaining = state.registry.get("42").unwrap().identities();
    assert_eq!(remaining, vec!["bob".to_string()]);

    send(&mut s2, r#"{"type":"sync","data":{"elapsed":31}}"#).await;
    assert_silent(&mut s2).await;
}

#[tokio::test]
async fn test_protocol_errors_keep_connection_open() {
    let (addr, state) = start_server(Config::default()).await;

    let mut manager = connect(addr, "7").await;
    send(&mut manager, r#"{"type":"join","name":"m","clockManager":true}"#).await;
    wait_for_members(&state, "7", 1).await;

    let mut client = connect(addr, "7").await;
    send(&mut client, "not json").await;
    send(&mut client, r#"{"type":"shout"}"#).await;
    send(&mut client, r#"{"type":"sync","data":1}"#).await;
    assert_silent(&mut manager).await;

    send(&mut client, r#"{"type":"join","name":"late"}"#).await;
    assert_eq!(recv(&mut manager).await.as_deref(), Some("join"));
}

#[tokio::test]
async fn test_endpoint_broadcast_ignores_membership() {
    let (addr, state) = start_server(Config::default()).await;

    let mut joined = connect(addr, "42").await;
    let mut watcher = connect(addr, "42").await;
    let mut elsewhere = connect(addr, "43").await;

    send(&mut joined, r#"{"type":"join","name":"alice"}"#).await;
    wait_for_members(&state, "42", 1).await;
    wait_for_endpoint(&state, "42", 2).await;

    assert_eq!(state.notify_updated("42"), 2);
    assert_eq!(recv(&mut joined).await.as_deref(), Some("tour_updated_42"));
    assert_eq!(recv(&mut watcher).await.as_deref(), Some("tour_updated_42"));
    assert_silent(&mut elsewhere).await;
}

#[tokio::test]
async fn test_directory_refuses_connections() {
    let config = Config {
        directory: DirectoryConfig {
            open: false,
            events: vec![
                EventConfig {
                    id: "42".to_string(),
                    handle: Some("spring-open".to_string()),
                    status: EventStatus::Started,
                },
                EventConfig {
                    id: "43".to_string(),
                    handle: None,
                    status: EventStatus::Ended,
                },
            ],
        },
        ..Config::default()
    };
    let (addr, state) = start_server(config).await;

    // Handle resolves to the event id.
    let mut ws = connect(addr, "spring-open").await;
    send(&mut ws, r#"{"type":"join","name":"alice"}"#).await;
    wait_for_members(&state, "42", 1).await;

    for (tour, status) in [("43", 403), ("99", 404)] {
        match connect_async(format!("ws://{addr}/tours/{tour}/clock")).await {
            Err(WsError::Http(response)) => assert_eq!(response.status().as_u16(), status),
            other => panic!("Expected HTTP {status} for {tour}, got {:?}", other.map(|_| ())),
        }
    }
}
