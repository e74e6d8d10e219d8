//! The hub owns every piece of in-memory state: the device registry, the
//! message queue and the call lists.
//!
//! It is built once in `main`, wrapped in [`SharedHub`] and handed to every
//! handler. Operations that touch more than one map (sending a list,
//! deleting an active list) live here so they run under a single lock.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::json;
use tokio::sync::Mutex;
use tracing::{info, warn};

use autodialer_shared::constants::{control_commands, message_kinds};
use autodialer_shared::protocol::{CallResult, DeviceReport, QueuedMessage};
use autodialer_shared::ListStatus;

use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::lists::{CallList, CallListBook};
use crate::queue::MessageQueue;
use crate::registry::{DeviceRecord, DeviceRegistry};

pub type SharedHub = Arc<Mutex<Hub>>;

pub struct Hub {
    pub registry: DeviceRegistry,
    pub queue: MessageQueue,
    pub lists: CallListBook,
    device_timeout: Duration,
}

/// Result of sending a list to the connected devices.
#[derive(Debug, Clone)]
pub struct Dispatch {
    pub list: CallList,
    pub devices: Vec<String>,
}

/// Result of applying a device report.
#[derive(Debug, Clone, Default)]
pub struct ReportOutcome {
    pub accepted: bool,
    /// Set when the report moved a list's counters.
    pub list: Option<CallList>,
    /// Set for call results, for the history mirror.
    pub call: Option<CallResult>,
}

impl Hub {
    pub fn new(config: &ServerConfig) -> Self {
        Self {
            registry: DeviceRegistry::new(),
            queue: MessageQueue::new(config.max_message_retries),
            lists: CallListBook::new(config.max_group_size, config.min_number_digits),
            device_timeout: config.device_timeout,
        }
    }

    pub fn shared(self) -> SharedHub {
        Arc::new(Mutex::new(self))
    }

    pub fn device_timeout(&self) -> Duration {
        self.device_timeout
    }

    /// Devices that can receive work right now.
    pub fn reachable_devices(&self) -> Vec<String> {
        self.registry.reachable(Instant::now(), self.device_timeout)
    }

    pub fn is_reachable(&self, device: &DeviceRecord) -> bool {
        device.is_reachable(Instant::now(), self.device_timeout)
    }

    /// A device poll: refresh liveness (when known) and drain its queue.
    pub fn poll(&mut self, device_id: &str) -> (bool, Vec<QueuedMessage>) {
        let known = self.registry.heartbeat(device_id);
        (known, self.queue.drain(device_id))
    }

    /// Enqueue a message for a registered device.
    pub fn send_to_device(
        &mut self,
        device_id: &str,
        kind: &str,
        data: serde_json::Value,
    ) -> Result<String, ServerError> {
        if !self.registry.contains(device_id) {
            return Err(ServerError::DeviceNotFound(device_id.to_string()));
        }
        Ok(self.queue.enqueue(device_id, kind, data))
    }

    /// Forget a device and everything queued for it.
    pub fn remove_device(&mut self, device_id: &str) -> bool {
        let existed = self.registry.remove(device_id);
        if existed {
            self.queue.clear(device_id);
        }
        existed
    }

    /// Operator bulk delete of unreachable devices.
    pub fn remove_stale_devices(&mut self) -> Vec<String> {
        let removed = self
            .registry
            .remove_stale(Instant::now(), self.device_timeout);
        for id in &removed {
            self.queue.clear(id);
        }
        removed
    }

    /// Deliver a list to every reachable device and mark it `active`.
    /// Fails without touching anything when no device is reachable.
    pub fn send_list_to_devices(&mut self, list_id: &str) -> Result<Dispatch, ServerError> {
        let payload = self
            .lists
            .get(list_id)
            .ok_or_else(|| ServerError::ListNotFound(list_id.to_string()))?
            .delivery_payload();

        let devices = self.reachable_devices();
        if devices.is_empty() {
            return Err(ServerError::NoConnectedDevices);
        }

        for device_id in &devices {
            self.queue
                .enqueue(device_id, message_kinds::CALL_LIST, payload.clone());
            self.registry.assign_list(device_id, list_id);
        }

        let list = self.lists.activate(list_id)?.clone();
        info!(list = %list_id, devices = devices.len(), "Call list sent to devices");

        Ok(Dispatch { list, devices })
    }

    /// Delete a list. An `active` list first gets a stop broadcast to every
    /// reachable device. Returns the removed list and who was told to stop.
    pub fn delete_list(&mut self, list_id: &str) -> Result<(CallList, Vec<String>), ServerError> {
        let status = self
            .lists
            .get(list_id)
            .ok_or_else(|| ServerError::ListNotFound(list_id.to_string()))?
            .status;

        let mut notified = Vec::new();
        if status == ListStatus::Active {
            notified = self.reachable_devices();
            let stop = json!({
                "command": control_commands::STOP,
                "list_id": list_id,
            });
            for device_id in &notified {
                self.queue
                    .enqueue(device_id, message_kinds::CONTROL, stop.clone());
            }
            info!(list = %list_id, devices = notified.len(), "Broadcast stop for active list");
        }

        self.registry.release_list(list_id);
        let list = self
            .lists
            .remove(list_id)
            .ok_or_else(|| ServerError::ListNotFound(list_id.to_string()))?;

        Ok((list, notified))
    }

    /// Apply a report a device piggybacked on its poll. Unknown devices are
    /// ignored; reports about unknown lists still count for the device.
    pub fn apply_report(&mut self, device_id: &str, report: DeviceReport) -> ReportOutcome {
        if !self.registry.contains(device_id) {
            return ReportOutcome::default();
        }

        match report {
            DeviceReport::Status(status) => ReportOutcome {
                accepted: self.registry.update_status(device_id, status),
                ..Default::default()
            },
            DeviceReport::CallStarted => ReportOutcome {
                accepted: self.registry.record_call_started(device_id),
                ..Default::default()
            },
            DeviceReport::CallResult(result) => {
                self.registry.record_call_finished(device_id);
                let list = match self.lists.record_result(&result.list_id) {
                    Ok(list) => Some(list.clone()),
                    Err(_) => {
                        warn!(
                            device = %device_id,
                            list = %result.list_id,
                            "Call result for unknown list"
                        );
                        None
                    }
                };
                ReportOutcome {
                    accepted: true,
                    list,
                    call: Some(result),
                }
            }
        }
    }

    /// One pass of the liveness sweep.
    pub fn sweep(&mut self) -> usize {
        self.registry
            .sweep_stale(Instant::now(), self.device_timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lists::NewCallList;
    use crate::registry::DeviceMetadata;
    use autodialer_shared::DeviceStatus;

    fn hub() -> Hub {
        Hub::new(&ServerConfig::default())
    }

    fn create_list(hub: &mut Hub) -> String {
        hub.lists
            .create(NewCallList {
                name: "Leads".into(),
                numbers: vec!["11999999999".into(), "1188888888".into()],
                original_numbers: None,
                ddd: None,
            })
            .unwrap()
            .id
            .clone()
    }

    #[test]
    fn test_send_list_without_devices_fails() {
        let mut hub = hub();
        let id = create_list(&mut hub);

        assert!(matches!(
            hub.send_list_to_devices(&id),
            Err(ServerError::NoConnectedDevices)
        ));
        assert_eq!(hub.lists.get(&id).unwrap().status, ListStatus::Paused);
    }

    #[test]
    fn test_send_list_unknown_list() {
        let mut hub = hub();
        hub.registry.register("d1", DeviceMetadata::default());
        assert!(matches!(
            hub.send_list_to_devices("nope"),
            Err(ServerError::ListNotFound(_))
        ));
        assert_eq!(hub.queue.len("d1"), 0);
    }

    #[test]
    fn test_send_list_enqueues_per_device() {
        let mut hub = hub();
        hub.registry.register("d1", DeviceMetadata::default());
        hub.registry.register("d2", DeviceMetadata::default());
        hub.registry.register("d3", DeviceMetadata::default());
        hub.registry.mark_disconnected("d3");
        let id = create_list(&mut hub);

        let dispatch = hub.send_list_to_devices(&id).unwrap();
        assert_eq!(dispatch.devices, vec!["d1", "d2"]);
        assert_eq!(dispatch.list.status, ListStatus::Active);

        for device in ["d1", "d2"] {
            let messages = hub.queue.drain(device);
            assert_eq!(messages.len(), 1);
            assert_eq!(messages[0].kind, message_kinds::CALL_LIST);
            assert_eq!(messages[0].data["list_id"], id.as_str());
            assert_eq!(
                hub.registry.get(device).unwrap().current_list.as_deref(),
                Some(id.as_str())
            );
        }
        assert_eq!(hub.queue.len("d3"), 0);
    }

    #[test]
    fn test_delete_active_list_broadcasts_stop() {
        let mut hub = hub();
        hub.registry.register("d1", DeviceMetadata::default());
        hub.registry.register("d2", DeviceMetadata::default());
        let id = create_list(&mut hub);
        hub.send_list_to_devices(&id).unwrap();
        hub.queue.drain("d1");
        hub.queue.drain("d2");

        let (removed, notified) = hub.delete_list(&id).unwrap();
        assert_eq!(removed.id, id);
        assert_eq!(notified.len(), 2);
        assert!(hub.lists.get(&id).is_none());

        for device in ["d1", "d2"] {
            let messages = hub.queue.drain(device);
            assert_eq!(messages.len(), 1);
            assert_eq!(messages[0].kind, message_kinds::CONTROL);
            assert_eq!(messages[0].data["command"], "stop");
            assert!(hub.registry.get(device).unwrap().current_list.is_none());
        }
    }

    #[test]
    fn test_delete_paused_list_is_silent() {
        let mut hub = hub();
        hub.registry.register("d1", DeviceMetadata::default());
        let id = create_list(&mut hub);

        let (_, notified) = hub.delete_list(&id).unwrap();
        assert!(notified.is_empty());
        assert_eq!(hub.queue.len("d1"), 0);
        assert!(matches!(
            hub.delete_list(&id),
            Err(ServerError::ListNotFound(_))
        ));
    }

    #[test]
    fn test_poll_unknown_device() {
        let mut hub = hub();
        let (known, messages) = hub.poll("ghost");
        assert!(!known);
        assert!(messages.is_empty());
    }

    #[test]
    fn test_send_to_unknown_device() {
        let mut hub = hub();
        assert!(matches!(
            hub.send_to_device("ghost", "STATUS", json!({})),
            Err(ServerError::DeviceNotFound(_))
        ));
    }

    #[test]
    fn test_remove_device_clears_queue() {
        let mut hub = hub();
        hub.registry.register("d1", DeviceMetadata::default());
        hub.send_to_device("d1", "STATUS", json!({})).unwrap();

        assert!(hub.remove_device("d1"));
        assert_eq!(hub.queue.len("d1"), 0);
        assert!(!hub.remove_device("d1"));
    }

    #[test]
    fn test_reports() {
        let mut hub = hub();
        hub.registry.register("d1", DeviceMetadata::default());
        let id = create_list(&mut hub);

        let outcome = hub.apply_report("d1", DeviceReport::CallStarted);
        assert!(outcome.accepted);
        assert_eq!(hub.registry.get("d1").unwrap().status, DeviceStatus::Busy);

        let outcome = hub.apply_report(
            "d1",
            DeviceReport::CallResult(CallResult {
                list_id: id.clone(),
                number: "11999999999".into(),
                outcome: "completed".into(),
                duration: Some(30),
            }),
        );
        assert!(outcome.accepted);
        assert_eq!(outcome.list.unwrap().completed_calls, 1);
        assert_eq!(hub.registry.get("d1").unwrap().calls_completed, 1);

        let outcome = hub.apply_report("ghost", DeviceReport::CallStarted);
        assert!(!outcome.accepted);
    }
}
