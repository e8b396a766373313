//! Observer event stream
//!
//! Each socket registers with the hub, forwards its bounded queue to the
//! client and treats any inbound frame as a heartbeat acknowledgement.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use super::SEND_TIMEOUT;
use crate::api::server::AppState;
use crate::hub::EventHub;

/// `GET /ws/events`
pub async fn events_ws(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_events_ws(socket, state.hub))
}

async fn handle_events_ws(socket: WebSocket, hub: EventHub) {
    let (observer, mut events) = match hub.connect() {
        Ok(connected) => connected,
        Err(e) => {
            error!("Failed to register observer: {}", e);
            return;
        }
    };
    let id = observer.id;
    info!("Event stream opened for observer {}", id);

    let (mut sender, mut receiver) = socket.split();

    // Queue closes when the hub drops us (eviction, shutdown)
    let send_id = id.clone();
    let mut send_task = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            let json = match serde_json::to_string(event.as_ref()) {
                Ok(json) => json,
                Err(e) => {
                    error!("Failed to serialize event {}: {}", event.id, e);
                    continue;
                }
            };

            match timeout(SEND_TIMEOUT, sender.send(Message::Text(json))).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    debug!("Observer {} send failed: {}", send_id, e);
                    break;
                }
                Err(_) => {
                    warn!("Observer {} send timed out", send_id);
                    break;
                }
            }

            // Protocol-level ping so idle browsers still answer with a pong
            if event.is_heartbeat()
                && timeout(SEND_TIMEOUT, sender.send(Message::Ping(Vec::new())))
                    .await
                    .map_or(true, |r| r.is_err())
            {
                break;
            }
        }
        let _ = sender.close().await;
    });

    let recv_hub = hub.clone();
    let recv_id = id.clone();
    let mut receive_task = tokio::spawn(async move {
        while let Some(msg) = receiver.next().await {
            match msg {
                Ok(Message::Close(_)) => {
                    debug!("Observer {} sent close", recv_id);
                    break;
                }
                Ok(_) => {
                    if !recv_hub.touch(&recv_id) {
                        break;
                    }
                }
                Err(e) => {
                    debug!("Observer {} socket error: {}", recv_id, e);
                    break;
                }
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => {
            debug!("Send task ended for {}", id);
            receive_task.abort();
        }
        _ = &mut receive_task => {
            debug!("Receive task ended for {}", id);
            send_task.abort();
        }
    }

    hub.unregister(&id);
    info!("Event stream closed for observer {}", id);
}
