//! Per-device FIFO of pending messages.
//!
//! Devices pick messages up by draining their queue on every poll. A drain
//! hands back everything queued so far and leaves the queue empty; the hub
//! lock makes that atomic with respect to concurrent enqueues.

use std::collections::{HashMap, VecDeque};

use serde_json::Value;
use tracing::{debug, warn};
use uuid::Uuid;

use autodialer_shared::constants::MAX_MESSAGE_RETRIES;
use autodialer_shared::protocol::QueuedMessage;

pub struct MessageQueue {
    queues: HashMap<String, VecDeque<QueuedMessage>>,
    max_retries: u32,
}

impl MessageQueue {
    pub fn new(max_retries: u32) -> Self {
        Self {
            queues: HashMap::new(),
            max_retries,
        }
    }

    /// Append a message to the tail of `device_id`'s queue. Returns its id.
    pub fn enqueue(&mut self, device_id: &str, kind: &str, data: Value) -> String {
        let message = QueuedMessage {
            id: format!("msg_{}", Uuid::new_v4().simple()),
            device_id: device_id.to_string(),
            kind: kind.to_string(),
            data,
            timestamp: now_millis(),
            retries: 0,
        };
        let id = message.id.clone();

        let queue = self.queues.entry(device_id.to_string()).or_default();
        queue.push_back(message);

        debug!(
            device = %device_id,
            kind,
            message_id = %id,
            pending = queue.len(),
            "Queued message"
        );
        id
    }

    /// Take every pending message for `device_id`, oldest first.
    pub fn drain(&mut self, device_id: &str) -> Vec<QueuedMessage> {
        match self.queues.get_mut(device_id) {
            Some(queue) => queue.drain(..).collect(),
            None => Vec::new(),
        }
    }

    /// Snapshot without consuming.
    pub fn peek(&self, device_id: &str) -> Vec<QueuedMessage> {
        self.queues
            .get(device_id)
            .map(|q| q.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn remove(&mut self, device_id: &str, message_id: &str) -> bool {
        let Some(queue) = self.queues.get_mut(device_id) else {
            return false;
        };
        match queue.iter().position(|m| m.id == message_id) {
            Some(index) => {
                queue.remove(index);
                true
            }
            None => false,
        }
    }

    /// Count another delivery attempt. Once a message has used up its
    /// retries it is dropped and `false` is returned.
    pub fn retry(&mut self, device_id: &str, message_id: &str) -> bool {
        let Some(queue) = self.queues.get_mut(device_id) else {
            return false;
        };
        let Some(index) = queue.iter().position(|m| m.id == message_id) else {
            return false;
        };

        if queue[index].retries >= self.max_retries {
            queue.remove(index);
            warn!(
                device = %device_id,
                message_id,
                "Dropping message after exhausting retries"
            );
            return false;
        }

        let message = &mut queue[index];
        message.retries += 1;
        message.timestamp = now_millis();
        true
    }

    pub fn contains(&self, device_id: &str, message_id: &str) -> bool {
        self.queues
            .get(device_id)
            .is_some_and(|q| q.iter().any(|m| m.id == message_id))
    }

    /// Forget a device's queue entirely.
    pub fn clear(&mut self, device_id: &str) -> usize {
        self.queues.remove(device_id).map(|q| q.len()).unwrap_or(0)
    }

    pub fn len(&self, device_id: &str) -> usize {
        self.queues.get(device_id).map(VecDeque::len).unwrap_or(0)
    }

    pub fn total_pending(&self) -> usize {
        self.queues.values().map(VecDeque::len).sum()
    }
}

impl Default for MessageQueue {
    fn default() -> Self {
        Self::new(MAX_MESSAGE_RETRIES)
    }
}

pub(crate) fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_enqueue_then_drain() {
        let mut queue = MessageQueue::default();
        let id = queue.enqueue("d1", "CONTROL", json!({"command": "stop"}));

        let drained = queue.drain("d1");
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[0].id, id);
        assert_eq!(drained[0].kind, "CONTROL");
        assert_eq!(drained[0].data, json!({"command": "stop"}));
        assert_eq!(drained[0].retries, 0);

        assert!(queue.drain("d1").is_empty());
    }

    #[test]
    fn test_fifo_order() {
        let mut queue = MessageQueue::default();
        for i in 0..5 {
            queue.enqueue("d1", "STATUS", json!(i));
        }
        let data: Vec<Value> = queue.drain("d1").into_iter().map(|m| m.data).collect();
        assert_eq!(data, vec![json!(0), json!(1), json!(2), json!(3), json!(4)]);
    }

    #[test]
    fn test_unknown_device_is_noop() {
        let mut queue = MessageQueue::default();
        assert!(queue.drain("ghost").is_empty());
        assert!(!queue.remove("ghost", "msg_x"));
        assert!(!queue.retry("ghost", "msg_x"));
        assert_eq!(queue.len("ghost"), 0);
        assert_eq!(queue.clear("ghost"), 0);
    }

    #[test]
    fn test_queues_are_per_device() {
        let mut queue = MessageQueue::default();
        queue.enqueue("d1", "STATUS", json!(1));
        queue.enqueue("d2", "STATUS", json!(2));

        assert_eq!(queue.drain("d1").len(), 1);
        assert_eq!(queue.len("d2"), 1);
        assert_eq!(queue.total_pending(), 1);
    }

    #[test]
    fn test_message_ids_are_unique() {
        let mut queue = MessageQueue::default();
        let a = queue.enqueue("d1", "STATUS", Value::Null);
        let b = queue.enqueue("d1", "STATUS", Value::Null);
        assert_ne!(a, b);
    }

    #[test]
    fn test_remove_specific_message() {
        let mut queue = MessageQueue::default();
        let first = queue.enqueue("d1", "STATUS", json!(1));
        queue.enqueue("d1", "STATUS", json!(2));

        assert!(queue.remove("d1", &first));
        assert!(!queue.remove("d1", &first));
        let left = queue.peek("d1");
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].data, json!(2));
    }

    #[test]
    fn test_retry_until_dropped() {
        let mut queue = MessageQueue::new(3);
        let id = queue.enqueue("d1", "CALL_LIST", json!({}));

        for expected in 1..=3 {
            assert!(queue.retry("d1", &id));
            assert_eq!(queue.peek("d1")[0].retries, expected);
        }

        assert!(!queue.retry("d1", &id));
        assert!(!queue.contains("d1", &id));
        assert_eq!(queue.len("d1"), 0);
    }
}
