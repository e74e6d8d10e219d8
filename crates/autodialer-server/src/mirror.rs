//! Best-effort copy of hub state into SQLite.
//!
//! Writes are queued on a channel and applied in order by a single writer
//! thread, so a delete never overtakes the upsert queued before it. A failed
//! write is logged and otherwise ignored; nothing is ever read back.

use std::path::Path;

use chrono::Utc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use autodialer_shared::protocol::CallResult;
use autodialer_store::{CallHistoryEntry, CallListRow, Database, DeviceRow, StoreError};

use crate::lists::CallList;
use crate::registry::DeviceRecord;

type Job = Box<dyn FnOnce(&Database) -> Result<(), StoreError> + Send>;

#[derive(Clone, Default)]
pub struct Mirror {
    tx: Option<mpsc::UnboundedSender<(&'static str, Job)>>,
}

impl Mirror {
    /// A mirror that drops every write.
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    /// Open the database and start the writer thread. The thread exits once
    /// every clone of the mirror has been dropped.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let db = Database::open_at(path)?;
        let (tx, rx) = mpsc::unbounded_channel();

        std::thread::Builder::new()
            .name("mirror-writer".into())
            .spawn(move || run_writer(db, rx))?;

        Ok(Self { tx: Some(tx) })
    }

    pub fn is_enabled(&self) -> bool {
        self.tx.is_some()
    }

    pub fn device(&self, record: &DeviceRecord) {
        let row = device_row(record);
        self.write("upsert_device", move |db| db.upsert_device(&row));
    }

    pub fn devices(&self, records: Vec<DeviceRecord>) {
        if records.is_empty() {
            return;
        }
        let rows: Vec<DeviceRow> = records.iter().map(device_row).collect();
        self.write("upsert_devices", move |db| {
            rows.iter().try_for_each(|row| db.upsert_device(row))
        });
    }

    pub fn remove_devices(&self, ids: Vec<String>) {
        if ids.is_empty() {
            return;
        }
        self.write("delete_devices", move |db| {
            ids.iter().try_for_each(|id| db.delete_device(id).map(|_| ()))
        });
    }

    pub fn list(&self, list: &CallList) {
        let row = list_row(list);
        self.write("upsert_call_list", move |db| db.upsert_call_list(&row));
    }

    pub fn remove_list(&self, id: &str) {
        let id = id.to_string();
        self.write("delete_call_list", move |db| {
            db.delete_call_list(&id).map(|_| ())
        });
    }

    pub fn call(&self, device_id: &str, result: &CallResult) {
        let entry = CallHistoryEntry {
            device_id: device_id.to_string(),
            list_id: result.list_id.clone(),
            phone_number: result.number.clone(),
            status: result.outcome.clone(),
            duration: result.duration,
            timestamp: Utc::now(),
        };
        self.write("record_call", move |db| db.record_call(&entry).map(|_| ()));
    }

    pub fn session_opened(&self, session_id: &str, device_id: &str) {
        let (session_id, device_id) = (session_id.to_string(), device_id.to_string());
        self.write("open_session", move |db| {
            db.open_session(&session_id, &device_id, Utc::now())
        });
    }

    pub fn session_closed(&self, session_id: &str) {
        let session_id = session_id.to_string();
        self.write("close_session", move |db| {
            db.close_session(&session_id, Utc::now()).map(|_| ())
        });
    }

    fn write<F>(&self, op: &'static str, f: F)
    where
        F: FnOnce(&Database) -> Result<(), StoreError> + Send + 'static,
    {
        let Some(tx) = &self.tx else {
            return;
        };
        if tx.send((op, Box::new(f))).is_err() {
            warn!(op, "Mirror writer has stopped, dropping write");
        }
    }
}

fn run_writer(db: Database, mut rx: mpsc::UnboundedReceiver<(&'static str, Job)>) {
    while let Some((op, job)) = rx.blocking_recv() {
        match job(&db) {
            Ok(()) => debug!(op, "Mirror write"),
            Err(e) => warn!(op, error = %e, "Mirror write failed"),
        }
    }
    debug!("Mirror writer stopped");
}

pub fn device_row(record: &DeviceRecord) -> DeviceRow {
    DeviceRow {
        id: record.id.clone(),
        name: record
            .metadata
            .device_type
            .clone()
            .unwrap_or_else(|| "unknown".to_string()),
        status: record.status,
        transport: record.metadata.transport,
        user_agent: record.metadata.user_agent.clone(),
        current_list: record.current_list.clone(),
        calls_active: record.calls_active,
        calls_completed: record.calls_completed,
        connected_at: record.connected_at,
        last_seen: record.last_seen_at,
    }
}

pub fn list_row(list: &CallList) -> CallListRow {
    CallListRow {
        id: list.id.clone(),
        name: list.name.clone(),
        numbers: list.numbers.clone(),
        original_numbers: list.original_numbers.clone(),
        ddd: list.ddd.clone(),
        status: list.status,
        progress: list.progress,
        total_numbers: list.total_numbers as u32,
        completed_calls: list.completed_calls as u32,
        current_group: list.current_group as u32,
        created_at: list.created_at,
        updated_at: list.updated_at,
    }
}
