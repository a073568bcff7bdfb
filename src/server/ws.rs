//! WebSocket push endpoint.
//!
//! A new client receives `full`, then every `add`/`delete` broadcast by the
//! hub. Clients may send `delete`, `refresh` and `heartBeat`.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use clipshare_core::sync::{DeleteData, FullData};
use clipshare_core::ProtocolMessage;
use futures::{SinkExt, StreamExt};
use tokio::sync::broadcast::error::RecvError;

use super::routes::AppState;

pub(crate) async fn upgrade(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    // Subscribe before the snapshot so nothing falls between the two
    let mut updates = state.hub.subscribe();
    let (mut sink, mut stream) = socket.split();

    tracing::info!("Client connected ({} total)", state.hub.client_count());

    if send(&mut sink, &full_snapshot(&state).await).await.is_err() {
        return;
    }

    loop {
        tokio::select! {
            update = updates.recv() => {
                let message = match update {
                    Ok(message) => message,
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!("Client lagged by {} updates, resending board", skipped);
                        full_snapshot(&state).await
                    }
                    Err(RecvError::Closed) => break,
                };
                if send(&mut sink, &message).await.is_err() {
                    break;
                }
            }

            frame = stream.next() => {
                let text = match frame {
                    Some(Ok(Message::Text(text))) => text.to_string(),
                    Some(Ok(Message::Binary(bytes))) => String::from_utf8_lossy(&bytes).into_owned(),
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        tracing::debug!("WebSocket error: {}", e);
                        break;
                    }
                };

                if let Some(reply) = handle_frame(&state, &text).await {
                    if send(&mut sink, &reply).await.is_err() {
                        break;
                    }
                }
            }
        }
    }

    tracing::info!("Client disconnected");
}

/// Applies one client frame; returns the direct reply, if any.
async fn handle_frame(state: &AppState, frame: &str) -> Option<ProtocolMessage> {
    let message = match ProtocolMessage::decode(frame) {
        Ok(message) => message,
        Err(e) => {
            tracing::debug!("Malformed frame: {}", e);
            return Some(ProtocolMessage::error(format!("Malformed message: {}", e)));
        }
    };

    match message {
        ProtocolMessage::Delete { data, .. } => {
            let hash = data.file_or_text_hash;
            let mut store = state.store.write().await;
            match store.remove(&hash) {
                Some(_) => {
                    let time_stamp = store.next_timestamp();
                    drop(store);
                    tracing::info!("Deleted {}", hash.short());
                    state.hub.broadcast(ProtocolMessage::Delete {
                        time_stamp: Some(time_stamp),
                        data: DeleteData {
                            file_or_text_hash: hash,
                        },
                    });
                    None
                }
                None => {
                    tracing::debug!("{} already gone", hash.short());
                    None
                }
            }
        }
        ProtocolMessage::Refresh {} => Some(full_snapshot(state).await),
        ProtocolMessage::HeartBeat { salt } => Some(ProtocolMessage::HeartBeat { salt }),
        other => Some(ProtocolMessage::error(format!(
            "Clients may not send '{}'",
            other.action()
        ))),
    }
}

async fn full_snapshot(state: &AppState) -> ProtocolMessage {
    let store = state.store.read().await;
    ProtocolMessage::Full {
        time_stamp: Some(chrono::Utc::now().timestamp_millis()),
        data: FullData {
            msgs: store.items(),
        },
    }
}

async fn send<S>(sink: &mut S, message: &ProtocolMessage) -> Result<(), ()>
where
    S: futures::Sink<Message> + Unpin,
{
    let frame = message.encode().map_err(|e| {
        tracing::error!("Failed to encode {}: {}", message.action(), e);
    })?;
    sink.send(Message::Text(frame.into())).await.map_err(|_| ())
}
