use chrono::{DateTime, Utc};
use rusqlite::params;

use autodialer_shared::{DeviceStatus, Transport};

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::DeviceRow;

const DEVICE_COLUMNS: &str = "id, name, status, transport, user_agent, current_list,
     calls_active, calls_completed, connected_at, last_seen";

impl Database {
    /// Insert the device or replace every column of the existing row.
    pub fn upsert_device(&self, device: &DeviceRow) -> Result<()> {
        self.conn().execute(
            "INSERT INTO devices (id, name, status, transport, user_agent, current_list,
                                  calls_active, calls_completed, connected_at, last_seen)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                status = excluded.status,
                transport = excluded.transport,
                user_agent = excluded.user_agent,
                current_list = excluded.current_list,
                calls_active = excluded.calls_active,
                calls_completed = excluded.calls_completed,
                connected_at = excluded.connected_at,
                last_seen = excluded.last_seen",
            params![
                device.id,
                device.name,
                device.status.as_str(),
                device.transport.as_str(),
                device.user_agent,
                device.current_list,
                device.calls_active,
                device.calls_completed,
                device.connected_at.to_rfc3339(),
                device.last_seen.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn get_device(&self, id: &str) -> Result<DeviceRow> {
        self.conn()
            .query_row(
                &format!("SELECT {DEVICE_COLUMNS} FROM devices WHERE id = ?1"),
                params![id],
                row_to_device,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })
    }

    pub fn list_devices(&self) -> Result<Vec<DeviceRow>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {DEVICE_COLUMNS} FROM devices ORDER BY last_seen DESC"
        ))?;
        let rows = stmt.query_map([], row_to_device)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(StoreError::Sqlite)
    }

    pub fn delete_device(&self, id: &str) -> Result<bool> {
        let affected = self
            .conn()
            .execute("DELETE FROM devices WHERE id = ?1", params![id])?;
        Ok(affected > 0)
    }
}

fn row_to_device(row: &rusqlite::Row<'_>) -> rusqlite::Result<DeviceRow> {
    let status_str: String = row.get(2)?;
    let transport_str: String = row.get(3)?;
    let connected_str: String = row.get(8)?;
    let last_seen_str: String = row.get(9)?;

    let status: DeviceStatus = status_str.parse().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, Box::new(e))
    })?;
    let transport = if transport_str == Transport::Websocket.as_str() {
        Transport::Websocket
    } else {
        Transport::Http
    };

    Ok(DeviceRow {
        id: row.get(0)?,
        name: row.get(1)?,
        status,
        transport,
        user_agent: row.get(4)?,
        current_list: row.get(5)?,
        calls_active: row.get(6)?,
        calls_completed: row.get(7)?,
        connected_at: parse_timestamp(8, &connected_str)?,
        last_seen: parse_timestamp(9, &last_seen_str)?,
    })
}

/// Parse an RFC-3339 column, reporting failures against column `idx`.
pub(crate) fn parse_timestamp(idx: usize, value: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device(id: &str) -> DeviceRow {
        let now = Utc::now();
        DeviceRow {
            id: id.to_string(),
            name: "android".to_string(),
            status: DeviceStatus::Connected,
            transport: Transport::Http,
            user_agent: Some("okhttp/4.12".to_string()),
            current_list: None,
            calls_active: 0,
            calls_completed: 0,
            connected_at: now,
            last_seen: now,
        }
    }

    #[test]
    fn upsert_replaces_existing_row() {
        let db = Database::open_in_memory().unwrap();
        let mut d = device("d1");
        db.upsert_device(&d).unwrap();

        d.status = DeviceStatus::Busy;
        d.calls_completed = 4;
        d.transport = Transport::Websocket;
        db.upsert_device(&d).unwrap();

        let stored = db.get_device("d1").unwrap();
        assert_eq!(stored.status, DeviceStatus::Busy);
        assert_eq!(stored.calls_completed, 4);
        assert_eq!(stored.transport, Transport::Websocket);
        assert_eq!(db.list_devices().unwrap().len(), 1);
    }

    #[test]
    fn delete_reports_existence() {
        let db = Database::open_in_memory().unwrap();
        db.upsert_device(&device("d1")).unwrap();

        assert!(db.delete_device("d1").unwrap());
        assert!(!db.delete_device("d1").unwrap());
        assert!(matches!(db.get_device("d1"), Err(StoreError::NotFound)));
    }
}
