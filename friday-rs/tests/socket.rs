//! WebSocket behavior against a live router.

mod common;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use common::{state, FakeSpeech, ScriptedChat};
use friday_rs::api::{router, ApiState};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn spawn_server(state: ApiState) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router(state)).await.unwrap();
    });
    addr
}

async fn next_event(ws: &mut Client) -> Value {
    let msg = tokio::time::timeout(Duration::from_secs(5), ws.next())
        .await
        .expect("no event within 5s")
        .expect("socket closed")
        .unwrap();
    serde_json::from_str(msg.to_text().unwrap()).unwrap()
}

async fn send(ws: &mut Client, frame: &str) {
    ws.send(Message::text(frame.to_string())).await.unwrap();
}

async fn wait_for_connections(state: &ApiState, expected: usize) {
    for _ in 0..100 {
        if state.sessions.open_connections() == expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!(
        "open connections stuck at {}, expected {expected}",
        state.sessions.open_connections()
    );
}

#[tokio::test]
async fn socket_round_trip_survives_bad_frames_and_cleans_up() {
    let st = state(
        ScriptedChat::new(&[Some("Fantastic, all done!")]),
        Arc::new(FakeSpeech::default()),
    );
    let addr = spawn_server(st.clone()).await;

    let (mut ws, _) = connect_async(format!("ws://{addr}/ws")).await.unwrap();

    assert_eq!(
        next_event(&mut ws).await,
        json!({ "event": "connected", "data": { "data": "Connected to FRIDAY" } })
    );
    assert_eq!(st.sessions.open_connections(), 1);

    send(&mut ws, "this is not json").await;
    let event = next_event(&mut ws).await;
    assert_eq!(event["event"], "error");
    assert!(event["data"]["message"]
        .as_str()
        .unwrap()
        .starts_with("Malformed message"));

    send(&mut ws, r#"{"event":"dance","data":{}}"#).await;
    let event = next_event(&mut ws).await;
    assert_eq!(event["data"]["message"], "Unknown event: dance");

    // still open after the bad frames
    send(&mut ws, r#"{"event":"text_message","data":{"text":"finish"}}"#).await;
    let event = next_event(&mut ws).await;
    assert_eq!(event["event"], "response");
    assert_eq!(event["data"]["text"], "Fantastic, all done!");
    assert_eq!(event["data"]["emotion"], "cheerful");
    assert!(event["data"]["audio"].is_string());

    send(&mut ws, r#"{"event":"ping","data":{}}"#).await;
    assert_eq!(next_event(&mut ws).await["event"], "pong");

    ws.close(None).await.unwrap();
    wait_for_connections(&st, 0).await;
}

#[tokio::test]
async fn each_connection_has_its_own_history() {
    let st = state(ScriptedChat::default(), Arc::new(FakeSpeech::default()));
    let addr = spawn_server(st.clone()).await;

    let (mut first, _) = connect_async(format!("ws://{addr}/ws")).await.unwrap();
    let (mut second, _) = connect_async(format!("ws://{addr}/ws")).await.unwrap();
    next_event(&mut first).await;
    next_event(&mut second).await;
    wait_for_connections(&st, 2).await;

    send(&mut first, r#"{"event":"text_message","data":{"text":"one"}}"#).await;
    assert_eq!(next_event(&mut first).await["data"]["text"], "You said: one");

    send(&mut second, r#"{"event":"reset","data":{}}"#).await;
    assert_eq!(
        next_event(&mut second).await,
        json!({ "event": "reset", "data": { "status": "Conversation reset" } })
    );

    drop(first);
    wait_for_connections(&st, 1).await;
    second.close(None).await.unwrap();
    wait_for_connections(&st, 0).await;
    assert_eq!(st.sessions.len().await, 0);
}
