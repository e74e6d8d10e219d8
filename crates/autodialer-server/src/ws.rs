//! WebSocket transport for devices.
//!
//! A device connects to `/api/websocket?session=<id>` and shares the same
//! registry entry and queue as its HTTP polls. Device -> server frames are
//! [`ClientFrame`]s, server -> device frames are [`ServerFrame`]s:
//!
//! ```json
//! {"type": "device_connect", "device_type": "android"}  -> {"type": "connection_confirmed", ...}
//! {"type": "ping"}                                      -> {"type": "pong", ...}
//! {"type": "poll"}                                      -> {"type": "messages", ...}
//! ```
//!
//! Closing the socket marks the device disconnected, unless it has re-registered
//! since (new socket or HTTP connect). It is never removed.

use std::borrow::Cow;

use axum::{
    extract::{
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::{header, HeaderMap},
    response::Response,
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use autodialer_shared::protocol::{ClientFrame, ServerFrame};
use autodialer_shared::Transport;

use crate::api::AppState;
use crate::hub::SharedHub;
use crate::queue::now_millis;
use crate::registry::{DeviceMetadata, DeviceRecord};

/// Close code for a policy violation (RFC 6455).
const CLOSE_POLICY_VIOLATION: u16 = 1008;

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    session: Option<String>,
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
    headers: HeaderMap,
    State(state): State<AppState>,
) -> Response {
    let user_agent = headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    match query.session.filter(|s| !s.trim().is_empty()) {
        Some(device_id) => ws.on_upgrade(move |socket| {
            handle_socket(socket, state, device_id.trim().to_string(), user_agent)
        }),
        None => ws.on_upgrade(reject_socket),
    }
}

async fn reject_socket(mut socket: WebSocket) {
    warn!("WebSocket connection without session id");
    let frame = CloseFrame {
        code: CLOSE_POLICY_VIOLATION,
        reason: Cow::Borrowed("Session ID required"),
    };
    let _ = socket.send(Message::Close(Some(frame))).await;
}

async fn handle_socket(
    socket: WebSocket,
    state: AppState,
    device_id: String,
    user_agent: Option<String>,
) {
    let session_id = format!("ws_{}", Uuid::new_v4().simple());

    let metadata = DeviceMetadata {
        device_type: None,
        user_agent,
        transport: Transport::Websocket,
    };
    let record = attach(&state.hub, &device_id, &session_id, metadata).await;
    state.mirror.device(&record);
    state.mirror.session_opened(&session_id, &device_id);
    info!(device = %device_id, session = %session_id, "WebSocket device connected");

    let (mut ws_sender, mut ws_receiver) = socket.split();
    let (tx, mut rx) = mpsc::channel::<String>(64);

    let sender_task = tokio::spawn(async move {
        while let Some(text) = rx.recv().await {
            if ws_sender.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(msg)) = ws_receiver.next().await {
        match msg {
            Message::Text(text) => {
                let frame = match ClientFrame::parse(&text) {
                    Ok(frame) => frame,
                    Err(e) => {
                        warn!(device = %device_id, error = %e, "Invalid WebSocket frame");
                        continue;
                    }
                };

                let reply = respond(&state.hub, &device_id, frame).await;
                if let Some(record) = state.hub.lock().await.registry.get(&device_id).cloned() {
                    state.mirror.device(&record);
                }

                match reply.to_text() {
                    Ok(text) => {
                        if tx.send(text).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => warn!(device = %device_id, error = %e, "Failed to encode frame"),
                }
            }
            Message::Close(_) => break,
            _ => {}
        }
    }

    // Cleanup.
    if let Some(record) = detach(&state.hub, &device_id, &session_id).await {
        state.mirror.device(&record);
    }
    state.mirror.session_closed(&session_id);
    sender_task.abort();

    info!(device = %device_id, session = %session_id, "WebSocket device disconnected");
}

/// Register the device and bind it to this socket.
async fn attach(
    hub: &SharedHub,
    device_id: &str,
    session_id: &str,
    metadata: DeviceMetadata,
) -> DeviceRecord {
    let mut hub = hub.lock().await;
    let mut record = hub.registry.register(device_id, metadata);
    hub.registry.attach_socket(device_id, session_id);
    record.socket = Some(session_id.to_string());
    record
}

/// Socket closed. Returns the updated record when this socket still owned
/// the device and it was marked `disconnected`.
async fn detach(hub: &SharedHub, device_id: &str, session_id: &str) -> Option<DeviceRecord> {
    let mut hub = hub.lock().await;
    if hub.registry.release_socket(device_id, session_id) {
        hub.registry.get(device_id).cloned()
    } else {
        debug!(device = %device_id, session = %session_id, "Socket no longer owns device");
        None
    }
}

/// Apply one client frame to the hub and build the reply.
async fn respond(hub: &SharedHub, device_id: &str, frame: ClientFrame) -> ServerFrame {
    let mut hub = hub.lock().await;

    match frame {
        ClientFrame::DeviceConnect { device_type } => {
            if let Some(device_type) = device_type.as_deref() {
                hub.registry.set_device_type(device_id, device_type);
            }
            hub.registry.heartbeat(device_id);
            ServerFrame::ConnectionConfirmed {
                session_id: device_id.to_string(),
                timestamp: now_millis(),
            }
        }
        ClientFrame::Ping => {
            hub.registry.heartbeat(device_id);
            ServerFrame::Pong {
                timestamp: now_millis(),
            }
        }
        ClientFrame::Poll => {
            let (_, messages) = hub.poll(device_id);
            if !messages.is_empty() {
                debug!(device = %device_id, count = messages.len(), "Delivering messages over WebSocket");
            }
            ServerFrame::Messages {
                has_messages: !messages.is_empty(),
                messages,
            }
        }
    }
}
