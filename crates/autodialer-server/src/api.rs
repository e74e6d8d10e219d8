use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, info};
use uuid::Uuid;

use autodialer_shared::constants::{DEVICE_CONNECT_ACTION, SERVER_VERSION};
use autodialer_shared::protocol::{DeviceReport, QueuedMessage};
use autodialer_shared::{ListStatus, Transport};

use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::extract::{JsonBody, OptionalJsonBody};
use crate::hub::SharedHub;
use crate::lists::NewCallList;
use crate::mirror::Mirror;
use crate::queue::now_millis;
use crate::registry::{DeviceMetadata, DeviceRecord};
use crate::ws;

#[derive(Clone)]
pub struct AppState {
    pub hub: SharedHub,
    pub mirror: Mirror,
    pub config: Arc<ServerConfig>,
    pub started_at: Instant,
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_check))
        .route("/api/health", get(health_check))
        .route("/api/connect", get(get_session).post(connect_device))
        .route("/api/devices", get(list_devices).post(device_action))
        .route(
            "/api/lists",
            get(list_call_lists)
                .post(call_list_action)
                .delete(delete_call_list),
        )
        .route("/api/lists/:id/export", get(export_call_list))
        .route("/api/poll", get(poll_query).post(poll_with_report))
        .route("/api/poll/:device_id", get(poll_path))
        .route("/api/send", axum::routing::post(send_message))
        .route("/api/queue", get(queue_peek).post(queue_action))
        .route("/api/websocket", get(ws::ws_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ─── Shared request pieces ───

#[derive(Debug, Default, Deserialize)]
struct SessionQuery {
    session: Option<String>,
}

/// Resolve a device id from the `session` query parameter, then the body.
/// A supplied-but-blank id is rejected; `None` means nobody supplied one.
fn resolve_device_id(
    query: Option<String>,
    body: &[Option<String>],
) -> Result<Option<String>, ServerError> {
    let candidate = query.or_else(|| body.iter().flatten().next().cloned());
    match candidate {
        Some(id) if id.trim().is_empty() => {
            Err(ServerError::BadRequest("Session ID is required".into()))
        }
        Some(id) => Ok(Some(id.trim().to_string())),
        None => Ok(None),
    }
}

fn require_device_id(
    query: Option<String>,
    body: &[Option<String>],
) -> Result<String, ServerError> {
    resolve_device_id(query, body)?
        .ok_or_else(|| ServerError::BadRequest("Session ID is required".into()))
}

fn require_field(value: Option<String>, field: &str) -> Result<String, ServerError> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ServerError::BadRequest(format!("'{field}' is required")))
}

// ─── Health ───

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthResponse {
    status: &'static str,
    timestamp: i64,
    /// Seconds since start.
    uptime: f64,
    connected_devices: usize,
    total_sessions: usize,
    pending_messages: usize,
    version: &'static str,
}

async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let hub = state.hub.lock().await;
    Json(HealthResponse {
        status: "healthy",
        timestamp: now_millis(),
        uptime: state.started_at.elapsed().as_secs_f64(),
        connected_devices: hub.reachable_devices().len(),
        total_sessions: hub.registry.len(),
        pending_messages: hub.queue.total_pending(),
        version: SERVER_VERSION,
    })
}

// ─── Connect ───

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConnectRequest {
    session_id: Option<String>,
    device_id: Option<String>,
    action: Option<String>,
    device_type: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ClientSettings {
    polling_interval: u64,
    heartbeat_interval: u64,
    max_retries: u32,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ConnectResponse {
    status: &'static str,
    session_id: String,
    server_time: i64,
    message: &'static str,
    config: ClientSettings,
}

async fn connect_device(
    State(state): State<AppState>,
    Query(query): Query<SessionQuery>,
    headers: HeaderMap,
    OptionalJsonBody(body): OptionalJsonBody<ConnectRequest>,
) -> Result<Json<ConnectResponse>, ServerError> {
    let req = body.unwrap_or_default();

    if let Some(action) = req.action.as_deref() {
        if action != DEVICE_CONNECT_ACTION {
            return Err(ServerError::BadRequest(format!(
                "Unrecognized action: {action}"
            )));
        }
    }

    let session_id = resolve_device_id(query.session, &[req.session_id, req.device_id])?
        .unwrap_or_else(|| format!("device_{}", Uuid::new_v4().simple()));

    let metadata = DeviceMetadata {
        device_type: req
            .device_type
            .filter(|t| !t.trim().is_empty())
            .or_else(|| Some("unknown".to_string())),
        user_agent: headers
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
        transport: Transport::Http,
    };

    let record = state.hub.lock().await.registry.register(&session_id, metadata);
    state.mirror.device(&record);

    info!(
        device = %session_id,
        device_type = record.metadata.device_type.as_deref().unwrap_or("unknown"),
        "Device connected"
    );

    Ok(Json(ConnectResponse {
        status: "connected",
        session_id,
        server_time: now_millis(),
        message: "Device connected",
        config: ClientSettings {
            polling_interval: state.config.polling_interval_ms,
            heartbeat_interval: state.config.heartbeat_interval_ms,
            max_retries: state.config.client_max_retries,
        },
    }))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SessionResponse {
    session_id: String,
    status: String,
    connected_at: i64,
    last_seen: i64,
    /// Millis since connect.
    uptime: u64,
}

async fn get_session(
    State(state): State<AppState>,
    Query(query): Query<SessionQuery>,
) -> Result<Json<SessionResponse>, ServerError> {
    let session_id = require_device_id(query.session, &[])?;

    let hub = state.hub.lock().await;
    let device = hub
        .registry
        .get(&session_id)
        .ok_or_else(|| ServerError::DeviceNotFound(session_id.clone()))?;

    Ok(Json(SessionResponse {
        session_id: device.id.clone(),
        status: device.status.to_string(),
        connected_at: device.connected_at.timestamp_millis(),
        last_seen: device.last_seen_at.timestamp_millis(),
        uptime: device.connected_instant.elapsed().as_millis() as u64,
    }))
}

// ─── Devices ───

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DeviceView {
    session_id: String,
    device_type: String,
    status: String,
    transport: &'static str,
    last_seen: i64,
    last_seen_formatted: String,
    time_since_last_seen: u64,
    is_connected: bool,
    uptime: u64,
    user_agent: String,
    current_list: Option<String>,
    calls_active: u32,
    calls_completed: u32,
    pending_messages: usize,
}

#[derive(Serialize)]
struct DeviceSummary {
    total: usize,
    connected: usize,
    disconnected: usize,
}

#[derive(Serialize)]
struct DevicesResponse {
    devices: Vec<DeviceView>,
    summary: DeviceSummary,
}

fn device_view(device: &DeviceRecord, is_connected: bool, pending_messages: usize) -> DeviceView {
    DeviceView {
        session_id: device.id.clone(),
        device_type: device
            .metadata
            .device_type
            .clone()
            .unwrap_or_else(|| "unknown".into()),
        status: device.status.to_string(),
        transport: device.metadata.transport.as_str(),
        last_seen: device.last_seen_at.timestamp_millis(),
        last_seen_formatted: device.last_seen_at.to_rfc3339(),
        time_since_last_seen: device.last_seen.elapsed().as_millis() as u64,
        is_connected,
        uptime: device.connected_instant.elapsed().as_millis() as u64,
        user_agent: device
            .metadata
            .user_agent
            .clone()
            .unwrap_or_else(|| "Unknown".into()),
        current_list: device.current_list.clone(),
        calls_active: device.calls_active,
        calls_completed: device.calls_completed,
        pending_messages,
    }
}

async fn list_devices(State(state): State<AppState>) -> Json<DevicesResponse> {
    let hub = state.hub.lock().await;
    let devices: Vec<DeviceView> = hub
        .registry
        .list_by_recency()
        .iter()
        .map(|d| device_view(d, hub.is_reachable(d), hub.queue.len(&d.id)))
        .collect();

    let connected = devices.iter().filter(|d| d.is_connected).count();
    debug!(total = devices.len(), connected, "Listing devices");

    Json(DevicesResponse {
        summary: DeviceSummary {
            total: devices.len(),
            connected,
            disconnected: devices.len() - connected,
        },
        devices,
    })
}

#[derive(Debug, Deserialize)]
struct DeviceActionRequest {
    action: Option<String>,
    device_id: Option<String>,
}

async fn device_action(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<DeviceActionRequest>,
) -> Result<Json<Value>, ServerError> {
    let action = require_field(req.action, "action")?;

    match action.as_str() {
        "remove" => {
            let device_id = require_field(req.device_id, "device_id")?;
            if !state.hub.lock().await.remove_device(&device_id) {
                return Err(ServerError::DeviceNotFound(device_id));
            }
            state.mirror.remove_devices(vec![device_id.clone()]);
            info!(device = %device_id, "Device removed by operator");

            Ok(Json(serde_json::json!({
                "success": true,
                "message": "Device removed",
                "removed_count": 1,
            })))
        }
        "remove_disconnected" => {
            let removed = state.hub.lock().await.remove_stale_devices();
            let count = removed.len();
            state.mirror.remove_devices(removed);
            info!(removed = count, "Removed disconnected devices");

            Ok(Json(serde_json::json!({
                "success": true,
                "message": format!("{count} disconnected devices removed"),
                "removed_count": count,
            })))
        }
        other => Err(ServerError::BadRequest(format!(
            "Unrecognized action: {other}"
        ))),
    }
}

// ─── Call lists ───

async fn list_call_lists(State(state): State<AppState>) -> Json<Value> {
    let hub = state.hub.lock().await;
    Json(serde_json::json!({ "lists": hub.lists.list() }))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListData {
    name: Option<String>,
    numbers: Option<Vec<String>>,
    original_numbers: Option<Vec<String>>,
    ddd: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ListActionRequest {
    action: Option<String>,
    list_id: Option<String>,
    status: Option<String>,
    data: Option<ListData>,
}

async fn call_list_action(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<ListActionRequest>,
) -> Result<Json<Value>, ServerError> {
    let action = require_field(req.action, "action")?;

    match action.as_str() {
        "create" => {
            let data = req
                .data
                .ok_or_else(|| ServerError::BadRequest("'data' is required".into()))?;
            let new = NewCallList {
                name: data.name.unwrap_or_default(),
                numbers: data.numbers.unwrap_or_default(),
                original_numbers: data.original_numbers,
                ddd: data.ddd,
            };

            let list = state.hub.lock().await.lists.create(new)?.clone();
            state.mirror.list(&list);

            Ok(Json(serde_json::json!({
                "success": true,
                "listId": list.id,
                "message": format!(
                    "List created with {} numbers in {} groups",
                    list.total_numbers,
                    list.conference_groups.len()
                ),
                "list": list,
            })))
        }
        "update" => {
            let list_id = require_field(req.list_id, "list_id")?;
            let data = req.data.unwrap_or_default();

            let list = state
                .hub
                .lock()
                .await
                .lists
                .update(&list_id, data.name, data.ddd.map(Some))?
                .clone();
            state.mirror.list(&list);

            Ok(Json(serde_json::json!({
                "success": true,
                "message": "List updated",
                "list": list,
            })))
        }
        "update_status" => {
            let list_id = require_field(req.list_id, "list_id")?;
            let status: ListStatus = require_field(req.status, "status")?.parse()?;

            let list = state
                .hub
                .lock()
                .await
                .lists
                .set_status(&list_id, status)?
                .clone();
            state.mirror.list(&list);
            info!(list = %list_id, status = %status, "List status updated");

            Ok(Json(serde_json::json!({
                "success": true,
                "message": "Status updated",
                "list": list,
            })))
        }
        "send_to_devices" => {
            let list_id = require_field(req.list_id, "list_id")?;

            let (dispatch, devices) = {
                let mut hub = state.hub.lock().await;
                let dispatch = hub.send_list_to_devices(&list_id)?;
                let devices: Vec<DeviceRecord> = dispatch
                    .devices
                    .iter()
                    .filter_map(|id| hub.registry.get(id).cloned())
                    .collect();
                (dispatch, devices)
            };
            state.mirror.list(&dispatch.list);
            state.mirror.devices(devices);

            Ok(Json(serde_json::json!({
                "success": true,
                "message": format!("List sent to {} devices", dispatch.devices.len()),
                "devices_notified": dispatch.devices.len(),
                "devices": dispatch.devices,
            })))
        }
        "delete" => {
            let list_id = require_field(req.list_id, "list_id")?;
            delete_list(&state, &list_id).await.map(Json)
        }
        other => Err(ServerError::BadRequest(format!(
            "Unrecognized action: {other}"
        ))),
    }
}

#[derive(Debug, Deserialize)]
struct ListIdQuery {
    id: Option<String>,
}

async fn delete_call_list(
    State(state): State<AppState>,
    Query(query): Query<ListIdQuery>,
) -> Result<Json<Value>, ServerError> {
    let list_id = require_field(query.id, "id")?;
    delete_list(&state, &list_id).await.map(Json)
}

async fn delete_list(state: &AppState, list_id: &str) -> Result<Value, ServerError> {
    let (list, notified) = state.hub.lock().await.delete_list(list_id)?;
    state.mirror.remove_list(list_id);

    info!(
        list = %list_id,
        was = %list.status,
        stop_sent = notified.len(),
        "List deleted"
    );

    Ok(serde_json::json!({
        "success": true,
        "message": "List removed",
        "stop_sent_to": notified,
    }))
}

async fn export_call_list(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, ServerError> {
    let (csv, file_name) = {
        let hub = state.hub.lock().await;
        let list = hub
            .lists
            .get(&id)
            .ok_or_else(|| ServerError::ListNotFound(id.clone()))?;
        (list.to_csv()?, list.export_file_name())
    };

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{file_name}\""),
            ),
        ],
        csv,
    )
        .into_response())
}

// ─── Poll ───

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PollResponse {
    session_id: String,
    messages: Vec<QueuedMessage>,
    timestamp: i64,
    has_messages: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    accepted: Option<bool>,
}

async fn poll_query(
    State(state): State<AppState>,
    Query(query): Query<SessionQuery>,
) -> Result<Json<PollResponse>, ServerError> {
    let device_id = require_device_id(query.session, &[])?;
    Ok(Json(poll_device(&state, device_id, None).await))
}

async fn poll_path(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
) -> Result<Json<PollResponse>, ServerError> {
    let device_id = require_device_id(Some(device_id), &[])?;
    Ok(Json(poll_device(&state, device_id, None).await))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PollRequest {
    session_id: Option<String>,
    device_id: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    data: Value,
}

async fn poll_with_report(
    State(state): State<AppState>,
    Query(query): Query<SessionQuery>,
    OptionalJsonBody(body): OptionalJsonBody<PollRequest>,
) -> Result<Json<PollResponse>, ServerError> {
    let req = body.unwrap_or_default();
    let device_id = require_device_id(query.session, &[req.session_id, req.device_id])?;

    // Parse before touching state so a malformed report changes nothing.
    let report = DeviceReport::from_parts(req.kind.as_deref(), &req.data)?;

    Ok(Json(poll_device(&state, device_id, report).await))
}

async fn poll_device(
    state: &AppState,
    device_id: String,
    report: Option<DeviceReport>,
) -> PollResponse {
    let (known, messages, record, outcome) = {
        let mut hub = state.hub.lock().await;
        let outcome = report.map(|r| hub.apply_report(&device_id, r));
        let (known, messages) = hub.poll(&device_id);
        let record = hub.registry.get(&device_id).cloned();
        (known, messages, record, outcome)
    };

    if let Some(record) = &record {
        state.mirror.device(record);
    }
    if let Some(outcome) = &outcome {
        if let Some(list) = &outcome.list {
            state.mirror.list(list);
        }
        if let Some(call) = &outcome.call {
            state.mirror.call(&device_id, call);
        }
    }

    if !messages.is_empty() {
        debug!(device = %device_id, count = messages.len(), known, "Delivering messages");
    }

    PollResponse {
        has_messages: !messages.is_empty(),
        session_id: device_id,
        messages,
        timestamp: now_millis(),
        accepted: outcome.map(|o| o.accepted),
    }
}

// ─── Send ───

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SendRequest {
    session_id: Option<String>,
    device_id: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    data: Value,
}

async fn send_message(
    State(state): State<AppState>,
    Query(query): Query<SessionQuery>,
    JsonBody(req): JsonBody<SendRequest>,
) -> Result<Json<Value>, ServerError> {
    let device_id = require_device_id(query.session, &[req.session_id, req.device_id])?;
    let kind = require_field(req.kind, "type")?;
    if req.data.is_null() {
        return Err(ServerError::BadRequest("'data' is required".into()));
    }

    let message_id = state
        .hub
        .lock()
        .await
        .send_to_device(&device_id, &kind, req.data)?;

    Ok(Json(serde_json::json!({
        "success": true,
        "message": "Message queued",
        "sessionId": device_id,
        "type": kind,
        "messageId": message_id,
    })))
}

// ─── Queue inspection ───

#[derive(Debug, Deserialize)]
struct QueueQuery {
    device: Option<String>,
}

async fn queue_peek(
    State(state): State<AppState>,
    Query(query): Query<QueueQuery>,
) -> Result<Json<Value>, ServerError> {
    let device_id = require_field(query.device, "device")?;
    let messages = state.hub.lock().await.queue.peek(&device_id);

    Ok(Json(serde_json::json!({
        "deviceId": device_id,
        "size": messages.len(),
        "messages": messages,
    })))
}

#[derive(Debug, Deserialize)]
struct QueueActionRequest {
    action: Option<String>,
    device_id: Option<String>,
    message_id: Option<String>,
}

async fn queue_action(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<QueueActionRequest>,
) -> Result<Json<Value>, ServerError> {
    let action = require_field(req.action, "action")?;
    let device_id = require_field(req.device_id, "device_id")?;
    let mut hub = state.hub.lock().await;

    match action.as_str() {
        "retry" => {
            let message_id = require_field(req.message_id, "message_id")?;
            if !hub.queue.contains(&device_id, &message_id) {
                return Err(ServerError::MessageNotFound(message_id));
            }
            let retried = hub.queue.retry(&device_id, &message_id);
            Ok(Json(serde_json::json!({
                "success": retried,
                "dropped": !retried,
                "messageId": message_id,
            })))
        }
        "remove" => {
            let message_id = require_field(req.message_id, "message_id")?;
            if !hub.queue.remove(&device_id, &message_id) {
                return Err(ServerError::MessageNotFound(message_id));
            }
            Ok(Json(serde_json::json!({ "success": true, "messageId": message_id })))
        }
        "clear" => {
            let cleared = hub.queue.clear(&device_id);
            Ok(Json(serde_json::json!({ "success": true, "cleared": cleared })))
        }
        other => Err(ServerError::BadRequest(format!(
            "Unrecognized action: {other}"
        ))),
    }
}

pub async fn serve(state: AppState, addr: std::net::SocketAddr) -> anyhow::Result<()> {
    let app = build_router(state);

    info!(addr = %addr, "Starting HTTP API server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .await?;

    Ok(())
}
