use rusqlite::params;

use crate::database::Database;
use crate::devices::parse_timestamp;
use crate::error::{Result, StoreError};
use crate::models::CallHistoryEntry;

impl Database {
    /// Append one call outcome. Returns the row id.
    pub fn record_call(&self, entry: &CallHistoryEntry) -> Result<i64> {
        self.conn().execute(
            "INSERT INTO call_history (device_id, list_id, phone_number, status, duration, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                entry.device_id,
                entry.list_id,
                entry.phone_number,
                entry.status,
                entry.duration.map(|d| d as i64),
                entry.timestamp.to_rfc3339(),
            ],
        )?;
        Ok(self.conn().last_insert_rowid())
    }

    /// History for one list, oldest first.
    pub fn call_history_for_list(&self, list_id: &str) -> Result<Vec<CallHistoryEntry>> {
        let mut stmt = self.conn().prepare(
            "SELECT device_id, list_id, phone_number, status, duration, timestamp
             FROM call_history WHERE list_id = ?1 ORDER BY id ASC",
        )?;
        let rows = stmt.query_map(params![list_id], |row| {
            let duration: Option<i64> = row.get(4)?;
            let ts: String = row.get(5)?;
            Ok(CallHistoryEntry {
                device_id: row.get(0)?,
                list_id: row.get(1)?,
                phone_number: row.get(2)?,
                status: row.get(3)?,
                duration: duration.map(|d| d.max(0) as u64),
                timestamp: parse_timestamp(5, &ts)?,
            })
        })?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(StoreError::Sqlite)
    }
}
