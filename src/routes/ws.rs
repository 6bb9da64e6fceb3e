//! Real-time surface. A connection authenticates with its bearer token,
//! then joins per-auction rooms; direct events follow the authenticated
//! user. Room membership lives and dies with the connection.

use std::{collections::HashMap, sync::Arc};

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use jsonwebtoken::{Algorithm, Validation};
use tokio::{
    sync::{broadcast, mpsc},
    task::JoinHandle,
};
use ulid::Ulid;

use crate::{
    constants::JWT_AUDIENCE,
    models::{
        auth::ClaimOwned,
        events::{ClientFrame, ServerEvent},
    },
    state::AppState,
};

pub async fn ws_handler(State(state): State<Arc<AppState>>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| client_session(state, socket))
}

async fn client_session(state: Arc<AppState>, socket: WebSocket) {
    let (mut sink, mut stream) = socket.split();
    let (out_tx, mut out_rx) = mpsc::channel::<String>(64);

    let writer = tokio::spawn(async move {
        while let Some(text) = out_rx.recv().await {
            if sink.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    let mut authenticated: Option<ClaimOwned> = None;
    let mut rooms: HashMap<Ulid, JoinHandle<()>> = HashMap::new();
    let mut direct: Option<JoinHandle<()>> = None;

    while let Some(Ok(message)) = stream.next().await {
        match message {
            Message::Text(text) => {
                let frame = match serde_json::from_str::<ClientFrame>(&text) {
                    Ok(frame) => frame,
                    Err(_) => {
                        send_error(&out_tx, "malformed frame").await;
                        continue;
                    }
                };
                match frame {
                    ClientFrame::Authenticate { token } => {
                        let mut validation = Validation::new(Algorithm::HS256);
                        validation.set_audience(&[JWT_AUDIENCE]);
                        match jsonwebtoken::decode::<ClaimOwned>(&token, &state.jwt.1, &validation)
                        {
                            Ok(data) => {
                                let claim = data.claims;
                                let rx = state.events.subscribe_user(claim.sub).await;
                                if let Some(old) =
                                    direct.replace(spawn_forwarder(rx, out_tx.clone()))
                                {
                                    old.abort();
                                }
                                authenticated = Some(claim);
                                let _ = out_tx
                                    .send(r#"{"type":"authenticated"}"#.to_string())
                                    .await;
                            }
                            Err(err) => {
                                send_error(&out_tx, &format!("authentication failed: {err}"))
                                    .await;
                            }
                        }
                    }
                    ClientFrame::SubscribeAuction { auction_id } => {
                        if authenticated.is_none() {
                            send_error(&out_tx, "authenticate first").await;
                            continue;
                        }
                        let rx = state.events.subscribe_auction(auction_id).await;
                        if let Some(old) = rooms.insert(auction_id, spawn_forwarder(rx, out_tx.clone()))
                        {
                            old.abort();
                        }
                    }
                    ClientFrame::UnsubscribeAuction { auction_id } => {
                        if let Some(handle) = rooms.remove(&auction_id) {
                            handle.abort();
                        }
                    }
                }
            }
            Message::Close(_) => break,
            _ => {}
        }
    }

    for handle in rooms.into_values() {
        handle.abort();
    }
    if let Some(handle) = direct {
        handle.abort();
    }
    writer.abort();
}

fn spawn_forwarder(
    mut rx: broadcast::Receiver<ServerEvent>,
    out_tx: mpsc::Sender<String>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    let Ok(text) = serde_json::to_string(&event) else {
                        continue;
                    };
                    if out_tx.send(text).await.is_err() {
                        break;
                    }
                }
                // Events are hints; a lagging consumer re-fetches state.
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "socket subscriber lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

async fn send_error(out_tx: &mpsc::Sender<String>, message: &str) {
    let frame = serde_json::json!({ "type": "error", "message": message });
    let _ = out_tx.send(frame.to_string()).await;
}
