use std::sync::Arc;

use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use tracing::{debug, error, info, warn};

use crate::{
    common::ConnectionId,
    protocol::{CallOutcome, MethodCall, OutgoingMessage},
    server::{AppState, AudioHub},
};

/// GET /v1/websocket
///
/// Authorization is checked by the router middleware before the upgrade.
pub async fn websocket_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

pub async fn handle_socket(mut socket: WebSocket, state: Arc<AppState>) {
    let connection_id = ConnectionId::generate();
    let (hub, events) = AudioHub::new(
        connection_id.clone(),
        state.engines.clone(),
        state.focus.clone(),
        &state.config.player,
    );
    state.hubs.insert(connection_id.clone(), hub.clone());
    info!("WebSocket connected: connection={}", connection_id);

    let ready = OutgoingMessage::Ready {
        connection_id: connection_id.clone(),
    };
    if let Err(e) = send_message(&mut socket, &ready).await {
        error!("Failed to send ready frame to {}: {}", connection_id, e);
        close_connection(&state, &connection_id);
        return;
    }

    loop {
        tokio::select! {
            event = events.recv_async() => {
                let Ok(event) = event else { break };
                if let Err(e) = send_message(&mut socket, &event.into_message()).await {
                    error!("Failed to send event to {}: {}", connection_id, e);
                    break;
                }
            }
            msg = socket.recv() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let reply = handle_text(&hub, text.as_str());
                        if let Err(e) = send_message(&mut socket, &reply).await {
                            error!("Failed to send reply to {}: {}", connection_id, e);
                            break;
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        debug!("Close frame from {}: {:?}", connection_id, frame);
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!("WebSocket error on {}: {}", connection_id, e);
                        break;
                    }
                    None => break,
                }
            }
        }
    }

    close_connection(&state, &connection_id);
}

/// Decodes one request frame and runs it. Frames that do not parse get an
/// error reply with id 0.
fn handle_text(hub: &AudioHub, text: &str) -> OutgoingMessage {
    match serde_json::from_str::<MethodCall>(text) {
        Ok(call) => hub.dispatch(&call.method, &call.args).into_reply(call.id),
        Err(e) => {
            warn!("[{}] malformed request: {}", hub.connection_id(), e);
            CallOutcome::Error(format!("malformed request: {}", e)).into_reply(0)
        }
    }
}

async fn send_message(socket: &mut WebSocket, message: &OutgoingMessage) -> Result<(), axum::Error> {
    match serde_json::to_string(message) {
        Ok(json) => socket.send(Message::Text(json.into())).await,
        Err(e) => {
            error!("Failed to serialize outgoing message: {}", e);
            Ok(())
        }
    }
}

fn close_connection(state: &AppState, connection_id: &ConnectionId) {
    if let Some((_, hub)) = state.hubs.remove(connection_id) {
        hub.shutdown();
    }
    info!("Connection closed: {}", connection_id);
}

#[cfg(test)]
mod tests {
    use std::{net::SocketAddr, time::Duration};

    use futures::{SinkExt, StreamExt};
    use serde_json::{Value, json};
    use tokio_tungstenite::{
        MaybeTlsStream, WebSocketStream, connect_async,
        tungstenite::{self, client::IntoClientRequest},
    };

    use super::*;
    use crate::{configs::Config, server::FocusArbiter, testing::ScriptedFactory, transport::router};

    type Client = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

    const PASSWORD: &str = "youshallnotpass";

    async fn spawn_server() -> (SocketAddr, Arc<AppState>) {
        let state = Arc::new(AppState::new(
            Config::default(),
            ScriptedFactory::new(),
            Arc::new(FocusArbiter::new()),
        ));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = router(state.clone());
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (addr, state)
    }

    async fn connect(addr: SocketAddr) -> Client {
        let mut request = format!("ws://{}/v1/websocket", addr)
            .into_client_request()
            .unwrap();
        request
            .headers_mut()
            .insert("authorization", PASSWORD.parse().unwrap());
        let (client, _) = connect_async(request).await.unwrap();
        client
    }

    async fn next_json(client: &mut Client) -> Value {
        loop {
            let frame = tokio::time::timeout(Duration::from_secs(5), client.next())
                .await
                .expect("timed out waiting for a frame")
                .expect("socket closed")
                .unwrap();
            if let tungstenite::Message::Text(text) = frame {
                return serde_json::from_str(text.as_str()).unwrap();
            }
        }
    }

    /// Reads frames until one matches, skipping the rest.
    async fn wait_for(client: &mut Client, matches: impl Fn(&Value) -> bool) -> Value {
        loop {
            let frame = next_json(client).await;
            if matches(&frame) {
                return frame;
            }
        }
    }

    async fn send(client: &mut Client, frame: Value) {
        client
            .send(tungstenite::Message::Text(frame.to_string().into()))
            .await
            .unwrap();
    }

    fn reply_to(id: u64) -> impl Fn(&Value) -> bool {
        move |frame| frame["op"] == "reply" && frame["id"] == id
    }

    #[tokio::test]
    async fn commands_replies_and_events_over_the_socket() {
        let (addr, state) = spawn_server().await;
        let mut client = connect(addr).await;

        let ready = next_json(&mut client).await;
        assert_eq!(ready["op"], "ready");
        let connection_id = ready["connectionId"].as_str().unwrap().to_string();
        assert!(state.hubs.contains_key(&ConnectionId::from(connection_id)));

        send(
            &mut client,
            json!({
                "id": 1,
                "method": "play",
                "args": {
                    "playerId": "p1",
                    "mode": "PlayerMode.MEDIA_PLAYER",
                    "url": "http://host/song.mp3",
                    "volume": 0.5,
                    "respectSilence": false,
                    "isLocal": false,
                    "stayAwake": false,
                },
            }),
        )
        .await;
        let reply = wait_for(&mut client, reply_to(1)).await;
        assert_eq!(reply["status"], "success");
        assert_eq!(reply["value"], 1);

        let duration = wait_for(&mut client, |f| f["method"] == "audio.onDuration").await;
        assert_eq!(duration["op"], "event");
        assert_eq!(duration["args"]["playerId"], "p1");
        assert_eq!(duration["args"]["value"], 5000);

        send(&mut client, json!({ "id": 2, "method": "shuffle", "args": {} })).await;
        let reply = wait_for(&mut client, reply_to(2)).await;
        assert_eq!(reply["status"], "notImplemented");

        send(
            &mut client,
            json!({
                "id": 3,
                "method": "seek",
                "args": { "playerId": "p1", "mode": "PlayerMode.MEDIA_PLAYER" },
            }),
        )
        .await;
        let reply = wait_for(&mut client, reply_to(3)).await;
        assert_eq!(reply["status"], "error");
        assert_eq!(reply["code"], "Unexpected error!");
        assert_eq!(reply["message"], "missing argument: position");
    }

    #[tokio::test]
    async fn malformed_frames_get_an_error_reply_with_id_zero() {
        let (addr, _state) = spawn_server().await;
        let mut client = connect(addr).await;
        next_json(&mut client).await;

        client
            .send(tungstenite::Message::Text("not json".into()))
            .await
            .unwrap();
        let reply = wait_for(&mut client, reply_to(0)).await;
        assert_eq!(reply["status"], "error");

        // The connection survives.
        send(&mut client, json!({ "id": 7, "method": "setDucking", "args": { "enable": true } })).await;
        let reply = wait_for(&mut client, reply_to(7)).await;
        assert_eq!(reply["status"], "success");
    }

    #[tokio::test]
    async fn closing_the_socket_removes_the_hub() {
        let (addr, state) = spawn_server().await;
        let mut client = connect(addr).await;
        next_json(&mut client).await;
        assert_eq!(state.hubs.len(), 1);

        client.close(None).await.unwrap();
        for _ in 0..100 {
            if state.hubs.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(state.hubs.is_empty());
    }

    #[tokio::test]
    async fn upgrade_without_password_is_rejected() {
        let (addr, _state) = spawn_server().await;
        let request = format!("ws://{}/v1/websocket", addr)
            .into_client_request()
            .unwrap();
        match connect_async(request).await {
            Err(tungstenite::Error::Http(response)) => assert_eq!(response.status(), 401),
            other => panic!("expected 401, got {:?}", other.map(|(_, r)| r.status())),
        }
    }

    #[tokio::test]
    async fn inspection_routes() {
        let (addr, _state) = spawn_server().await;
        let mut client = connect(addr).await;
        let ready = next_json(&mut client).await;
        let connection_id = ready["connectionId"].as_str().unwrap().to_string();

        send(
            &mut client,
            json!({
                "id": 1,
                "method": "setUrl",
                "args": {
                    "playerId": "p1",
                    "mode": "PlayerMode.MEDIA_PLAYER",
                    "url": "/tmp/a.mp3",
                    "isLocal": true,
                },
            }),
        )
        .await;
        wait_for(&mut client, reply_to(1)).await;

        let http = reqwest::Client::new();
        let get = |path: String| {
            http.get(format!("http://{}{}", addr, path))
                .header("authorization", PASSWORD)
                .send()
        };

        let response = get("/v1/stats".into()).await.unwrap();
        assert_eq!(response.status(), 200);
        assert_eq!(response.headers()["audiohost-api-version"], "1");
        let stats: Value = serde_json::from_str(&response.text().await.unwrap()).unwrap();
        assert_eq!(stats["connections"], 1);
        assert_eq!(stats["players"], 1);

        let response = get(format!("/v1/connections/{}/players", connection_id))
            .await
            .unwrap();
        let body: Value = serde_json::from_str(&response.text().await.unwrap()).unwrap();
        assert_eq!(body["players"][0]["playerId"], "p1");
        assert_eq!(body["players"][0]["url"], "/tmp/a.mp3");

        let response = get("/v1/connections/nope/players".into()).await.unwrap();
        assert_eq!(response.status(), 404);
        let body: Value = serde_json::from_str(&response.text().await.unwrap()).unwrap();
        assert_eq!(body["status"], 404);
        assert_eq!(body["path"], "/v1/connections/nope/players");

        let response = get("/v1/info".into()).await.unwrap();
        let info: Value = serde_json::from_str(&response.text().await.unwrap()).unwrap();
        assert_eq!(info["version"]["semver"], env!("CARGO_PKG_VERSION"));
        assert_eq!(info["backend"], "scripted");

        let unauthorized = http
            .get(format!("http://{}/v1/stats", addr))
            .send()
            .await
            .unwrap();
        assert_eq!(unauthorized.status(), 401);
    }
}
