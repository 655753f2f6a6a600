//! WebSocket frame relay through the endpoint registry.

mod common;

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use mesh_gateway::registry::OperationType;
use mesh_gateway::ws::WsMessageWrapper;
use mesh_gateway::MeshConfig;

use common::{operation, register, service, spawn_mock_service, start_gateway, TestGateway};

const ROOM: &str = "/chat/room";

/// Wire up a chat-style service: every inbound frame is acked and
/// re-sent, unchanged, to `reply_address` for the gateway to relay.
fn spawn_relay_service(gateway: &TestGateway, reply_address: &str) {
    let mut rx = gateway.cluster.bus().consumer(ROOM);
    let bus = gateway.cluster.bus().clone();
    let reply_address = reply_address.to_string();
    tokio::spawn(async move {
        while let Some(mut msg) = rx.recv().await {
            let wrapper: WsMessageWrapper = msg.body_as().unwrap();
            msg.reply(b"ok".to_vec());
            bus.send(&reply_address, serde_json::to_vec(&wrapper).unwrap())
                .unwrap();
        }
    });
}

async fn setup(reply_address_of: fn(&MeshConfig) -> String) -> TestGateway {
    let gateway = start_gateway(MeshConfig::default()).await;
    let mock = spawn_mock_service(
        &gateway.cluster,
        service(
            "/chat",
            9100,
            vec![operation("room", ROOM, OperationType::Websocket, &[])],
        ),
    );
    register(&gateway, &mock.info).await;
    let reply_address = reply_address_of(&gateway.config);
    spawn_relay_service(&gateway, &reply_address);
    gateway
}

#[tokio::test]
async fn test_broadcast_reaches_everyone_but_the_sender() {
    let gateway = setup(|c| c.ws.reply_all_but_sender_path.clone()).await;

    let (mut alice, _) = connect_async(gateway.ws_url(ROOM)).await.unwrap();
    let (mut bob, _) = connect_async(gateway.ws_url(ROOM)).await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    alice
        .send(Message::Text("hello everyone".into()))
        .await
        .unwrap();

    let frame = timeout(Duration::from_secs(2), bob.next())
        .await
        .expect("bob never received the broadcast")
        .unwrap()
        .unwrap();
    assert_eq!(frame.into_text().unwrap().as_str(), "hello everyone");

    // The sender is excluded.
    assert!(timeout(Duration::from_millis(300), alice.next())
        .await
        .is_err());
}

#[tokio::test]
async fn test_unicast_reply_goes_back_to_the_sender_only() {
    let gateway = setup(|c| c.ws.reply_path.clone()).await;

    let (mut alice, _) = connect_async(gateway.ws_url(ROOM)).await.unwrap();
    let (mut bob, _) = connect_async(gateway.ws_url(ROOM)).await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    alice.send(Message::Text("ping".into())).await.unwrap();

    let frame = timeout(Duration::from_secs(2), alice.next())
        .await
        .expect("alice never received her echo")
        .unwrap()
        .unwrap();
    assert_eq!(frame.into_text().unwrap().as_str(), "ping");

    assert!(timeout(Duration::from_millis(300), bob.next())
        .await
        .is_err());
}

#[tokio::test]
async fn test_binary_frames_keep_their_framing() {
    let gateway = setup(|c| c.ws.reply_path.clone()).await;

    let (mut alice, _) = connect_async(gateway.ws_url(ROOM)).await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    alice
        .send(Message::Binary(vec![1u8, 2, 3].into()))
        .await
        .unwrap();

    let frame = timeout(Duration::from_secs(2), alice.next())
        .await
        .expect("alice never received her echo")
        .unwrap()
        .unwrap();
    match frame {
        Message::Binary(bytes) => assert_eq!(bytes.as_ref(), [1u8, 2, 3]),
        other => panic!("expected a binary frame, got {other:?}"),
    }
}

#[tokio::test]
async fn test_upgrade_on_unknown_path_is_rejected() {
    let gateway = start_gateway(MeshConfig::default()).await;
    let err = connect_async(gateway.ws_url("/not/a/room")).await;
    assert!(err.is_err());
}
