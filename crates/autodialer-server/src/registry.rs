//! Device liveness tracking.
//!
//! Maintains an in-memory map of dialing devices keyed by their
//! session/device id. HTTP pollers and WebSocket clients share this one map.
//! Re-registering an id overwrites the previous record.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tracing::debug;

use autodialer_shared::{DeviceStatus, Transport};

/// What a device tells us about itself when it connects.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceMetadata {
    pub device_type: Option<String>,
    pub user_agent: Option<String>,
    pub transport: Transport,
}

/// Liveness record for one device.
#[derive(Debug, Clone)]
pub struct DeviceRecord {
    pub id: String,
    pub status: DeviceStatus,
    /// Monotonic reading used for every timeout decision.
    pub last_seen: Instant,
    /// Wall-clock twin of `last_seen`, for display only.
    pub last_seen_at: DateTime<Utc>,
    pub connected_at: DateTime<Utc>,
    pub connected_instant: Instant,
    pub current_list: Option<String>,
    pub calls_active: u32,
    pub calls_completed: u32,
    pub metadata: DeviceMetadata,
    /// WebSocket session currently serving this device, if any.
    pub socket: Option<String>,
    seq: u64,
}

impl DeviceRecord {
    /// Reachable = not flagged disconnected and seen within `timeout`.
    pub fn is_reachable(&self, now: Instant, timeout: Duration) -> bool {
        self.status.is_reachable() && now.saturating_duration_since(self.last_seen) <= timeout
    }

    fn touch(&mut self) {
        self.last_seen = Instant::now();
        self.last_seen_at = Utc::now();
    }
}

/// Tracks every known device.
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    devices: HashMap<String, DeviceRecord>,
    next_seq: u64,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite the record for `id`. The device keeps its
    /// original position in insertion order.
    pub fn register(&mut self, id: &str, metadata: DeviceMetadata) -> DeviceRecord {
        let seq = match self.devices.get(id) {
            Some(existing) => existing.seq,
            None => {
                self.next_seq += 1;
                self.next_seq
            }
        };

        let now = Instant::now();
        let wall = Utc::now();
        let record = DeviceRecord {
            id: id.to_string(),
            status: DeviceStatus::Connected,
            last_seen: now,
            last_seen_at: wall,
            connected_at: wall,
            connected_instant: now,
            current_list: None,
            calls_active: 0,
            calls_completed: 0,
            metadata,
            socket: None,
            seq,
        };

        debug!(
            device = %id,
            transport = record.metadata.transport.as_str(),
            "Registered device"
        );

        self.devices.insert(id.to_string(), record.clone());
        record
    }

    /// Refresh last-seen. A `disconnected` device comes back as `connected`.
    pub fn heartbeat(&mut self, id: &str) -> bool {
        let Some(device) = self.devices.get_mut(id) else {
            return false;
        };

        device.touch();
        if device.status == DeviceStatus::Disconnected {
            device.status = DeviceStatus::Connected;
            debug!(device = %id, "Device reconnected");
        }
        true
    }

    pub fn update_status(&mut self, id: &str, status: DeviceStatus) -> bool {
        match self.devices.get_mut(id) {
            Some(device) => {
                device.status = status;
                device.touch();
                true
            }
            None => false,
        }
    }

    /// Mark a device `disconnected` without forgetting it.
    pub fn mark_disconnected(&mut self, id: &str) -> bool {
        match self.devices.get_mut(id) {
            Some(device) => {
                device.status = DeviceStatus::Disconnected;
                true
            }
            None => false,
        }
    }

    /// Bind a WebSocket session to the device's current record.
    pub fn attach_socket(&mut self, id: &str, socket_id: &str) -> bool {
        match self.devices.get_mut(id) {
            Some(device) => {
                device.socket = Some(socket_id.to_string());
                true
            }
            None => false,
        }
    }

    /// A socket went away. The device is marked `disconnected` only while
    /// that socket still owns the record; a re-registration since then
    /// (new socket or HTTP connect) leaves it alone.
    pub fn release_socket(&mut self, id: &str, socket_id: &str) -> bool {
        match self.devices.get_mut(id) {
            Some(device) if device.socket.as_deref() == Some(socket_id) => {
                device.socket = None;
                device.status = DeviceStatus::Disconnected;
                true
            }
            _ => false,
        }
    }

    /// Record a device type announced after registration.
    pub fn set_device_type(&mut self, id: &str, device_type: &str) -> bool {
        match self.devices.get_mut(id) {
            Some(device) => {
                device.metadata.device_type = Some(device_type.to_string());
                true
            }
            None => false,
        }
    }

    pub fn assign_list(&mut self, id: &str, list_id: &str) -> bool {
        match self.devices.get_mut(id) {
            Some(device) => {
                device.current_list = Some(list_id.to_string());
                true
            }
            None => false,
        }
    }

    /// Clear `current_list` on every device working `list_id`.
    pub fn release_list(&mut self, list_id: &str) {
        for device in self.devices.values_mut() {
            if device.current_list.as_deref() == Some(list_id) {
                device.current_list = None;
            }
        }
    }

    pub fn record_call_started(&mut self, id: &str) -> bool {
        match self.devices.get_mut(id) {
            Some(device) => {
                device.calls_active += 1;
                device.status = DeviceStatus::Busy;
                device.touch();
                true
            }
            None => false,
        }
    }

    /// A call ended. The device goes back to `connected` once no calls are
    /// in flight.
    pub fn record_call_finished(&mut self, id: &str) -> bool {
        match self.devices.get_mut(id) {
            Some(device) => {
                device.calls_active = device.calls_active.saturating_sub(1);
                device.calls_completed += 1;
                if device.calls_active == 0 && device.status == DeviceStatus::Busy {
                    device.status = DeviceStatus::Connected;
                }
                device.touch();
                true
            }
            None => false,
        }
    }

    pub fn get(&self, id: &str) -> Option<&DeviceRecord> {
        self.devices.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.devices.contains_key(id)
    }

    /// All records in insertion order.
    pub fn list(&self) -> Vec<DeviceRecord> {
        let mut all: Vec<DeviceRecord> = self.devices.values().cloned().collect();
        all.sort_by_key(|d| d.seq);
        all
    }

    /// All records, most recently seen first.
    pub fn list_by_recency(&self) -> Vec<DeviceRecord> {
        let mut all = self.list();
        all.sort_by(|a, b| b.last_seen.cmp(&a.last_seen));
        all
    }

    pub fn remove(&mut self, id: &str) -> bool {
        let existed = self.devices.remove(id).is_some();
        if existed {
            debug!(device = %id, "Removed device");
        }
        existed
    }

    /// Flip every record idle longer than `timeout` to `disconnected`.
    /// Returns how many records changed; already-disconnected records are
    /// left alone, so a repeated sweep is a no-op.
    pub fn sweep_stale(&mut self, now: Instant, timeout: Duration) -> usize {
        let mut flipped = 0;
        for device in self.devices.values_mut() {
            if device.status != DeviceStatus::Disconnected
                && now.saturating_duration_since(device.last_seen) > timeout
            {
                device.status = DeviceStatus::Disconnected;
                flipped += 1;
            }
        }
        flipped
    }

    /// Delete every record that is not reachable. Returns the removed ids.
    pub fn remove_stale(&mut self, now: Instant, timeout: Duration) -> Vec<String> {
        let stale: Vec<String> = self
            .devices
            .values()
            .filter(|d| !d.is_reachable(now, timeout))
            .map(|d| d.id.clone())
            .collect();

        for id in &stale {
            self.devices.remove(id);
        }
        stale
    }

    /// Ids of reachable devices, in insertion order.
    pub fn reachable(&self, now: Instant, timeout: Duration) -> Vec<String> {
        self.list()
            .into_iter()
            .filter(|d| d.is_reachable(now, timeout))
            .map(|d| d.id)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TIMEOUT: Duration = Duration::from_secs(60);

    fn meta(device_type: &str) -> DeviceMetadata {
        DeviceMetadata {
            device_type: Some(device_type.to_string()),
            user_agent: None,
            transport: Transport::Http,
        }
    }

    #[test]
    fn test_register_and_get() {
        let mut registry = DeviceRegistry::new();
        let record = registry.register("d1", meta("android"));

        assert_eq!(record.status, DeviceStatus::Connected);
        assert!(registry.contains("d1"));
        assert_eq!(registry.len(), 1);
        assert_eq!(
            registry.get("d1").unwrap().metadata.device_type.as_deref(),
            Some("android")
        );
    }

    #[test]
    fn test_reregister_overwrites_but_keeps_order() {
        let mut registry = DeviceRegistry::new();
        registry.register("d1", meta("android"));
        registry.register("d2", meta("android"));
        registry.record_call_started("d1");

        registry.register("d1", meta("tablet"));

        let d1 = registry.get("d1").unwrap();
        assert_eq!(d1.calls_active, 0);
        assert_eq!(d1.status, DeviceStatus::Connected);
        assert_eq!(d1.metadata.device_type.as_deref(), Some("tablet"));

        let order: Vec<String> = registry.list().into_iter().map(|d| d.id).collect();
        assert_eq!(order, vec!["d1", "d2"]);
    }

    #[test]
    fn test_heartbeat_unknown_device_fails() {
        let mut registry = DeviceRegistry::new();
        assert!(!registry.heartbeat("ghost"));
        assert!(!registry.update_status("ghost", DeviceStatus::Busy));
    }

    #[test]
    fn test_heartbeat_revives_disconnected() {
        let mut registry = DeviceRegistry::new();
        registry.register("d1", meta("android"));
        registry.mark_disconnected("d1");

        assert!(registry.heartbeat("d1"));
        assert_eq!(registry.get("d1").unwrap().status, DeviceStatus::Connected);
    }

    #[test]
    fn test_sweep_marks_stale_device() {
        let mut registry = DeviceRegistry::new();
        registry.register("d1", meta("android"));

        let later = Instant::now() + Duration::from_secs(61);
        assert_eq!(registry.sweep_stale(later, TIMEOUT), 1);
        assert_eq!(
            registry.get("d1").unwrap().status,
            DeviceStatus::Disconnected
        );
    }

    #[test]
    fn test_sweep_is_idempotent() {
        let mut registry = DeviceRegistry::new();
        registry.register("d1", meta("android"));
        registry.register("d2", meta("android"));

        let later = Instant::now() + Duration::from_secs(120);
        assert_eq!(registry.sweep_stale(later, TIMEOUT), 2);
        assert_eq!(registry.sweep_stale(later, TIMEOUT), 0);
        assert!(registry
            .list()
            .iter()
            .all(|d| d.status == DeviceStatus::Disconnected));
    }

    #[test]
    fn test_sweep_spares_fresh_devices() {
        let mut registry = DeviceRegistry::new();
        registry.register("d1", meta("android"));
        assert_eq!(registry.sweep_stale(Instant::now(), TIMEOUT), 0);
    }

    #[test]
    fn test_remove_stale() {
        let mut registry = DeviceRegistry::new();
        registry.register("fresh", meta("android"));
        registry.register("gone", meta("android"));
        registry.mark_disconnected("gone");

        let removed = registry.remove_stale(Instant::now(), TIMEOUT);
        assert_eq!(removed, vec!["gone"]);
        assert!(registry.contains("fresh"));
        assert!(registry.remove_stale(Instant::now(), TIMEOUT).is_empty());
    }

    #[test]
    fn test_reachable_excludes_busy_timeouts_and_disconnected() {
        let mut registry = DeviceRegistry::new();
        registry.register("a", meta("android"));
        registry.register("b", meta("android"));
        registry.register("c", meta("android"));
        registry.update_status("b", DeviceStatus::Busy);
        registry.mark_disconnected("c");

        assert_eq!(registry.reachable(Instant::now(), TIMEOUT), vec!["a", "b"]);
        let later = Instant::now() + Duration::from_secs(61);
        assert!(registry.reachable(later, TIMEOUT).is_empty());
    }

    #[test]
    fn test_call_accounting() {
        let mut registry = DeviceRegistry::new();
        registry.register("d1", meta("android"));

        registry.record_call_started("d1");
        assert_eq!(registry.get("d1").unwrap().status, DeviceStatus::Busy);

        registry.record_call_finished("d1");
        let d1 = registry.get("d1").unwrap();
        assert_eq!(d1.calls_active, 0);
        assert_eq!(d1.calls_completed, 1);
        assert_eq!(d1.status, DeviceStatus::Connected);
    }

    #[test]
    fn test_release_list() {
        let mut registry = DeviceRegistry::new();
        registry.register("d1", meta("android"));
        registry.register("d2", meta("android"));
        registry.assign_list("d1", "l1");
        registry.assign_list("d2", "l2");

        registry.release_list("l1");
        assert!(registry.get("d1").unwrap().current_list.is_none());
        assert_eq!(registry.get("d2").unwrap().current_list.as_deref(), Some("l2"));
    }

    #[test]
    fn test_remove() {
        let mut registry = DeviceRegistry::new();
        registry.register("d1", meta("android"));
        assert!(registry.remove("d1"));
        assert!(!registry.remove("d1"));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_stale_socket_does_not_disconnect_new_owner() {
        let mut registry = DeviceRegistry::new();
        registry.register("d1", meta("android"));
        registry.attach_socket("d1", "ws_a");

        // Reconnect on a second socket before the first one notices.
        registry.register("d1", meta("android"));
        registry.attach_socket("d1", "ws_b");

        assert!(!registry.release_socket("d1", "ws_a"));
        assert_eq!(registry.get("d1").unwrap().status, DeviceStatus::Connected);

        assert!(registry.release_socket("d1", "ws_b"));
        assert_eq!(registry.get("d1").unwrap().status, DeviceStatus::Disconnected);
        assert!(registry.get("d1").unwrap().socket.is_none());
    }

    #[test]
    fn test_http_reconnect_detaches_socket() {
        let mut registry = DeviceRegistry::new();
        registry.register("d1", meta("android"));
        registry.attach_socket("d1", "ws_a");

        registry.register("d1", meta("android"));
        assert!(!registry.release_socket("d1", "ws_a"));
        assert_eq!(registry.get("d1").unwrap().status, DeviceStatus::Connected);
    }
}
