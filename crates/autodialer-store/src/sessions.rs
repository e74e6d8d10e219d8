use chrono::{DateTime, Utc};
use rusqlite::params;

use crate::database::Database;
use crate::devices::parse_timestamp;
use crate::error::{Result, StoreError};
use crate::models::SessionRow;

impl Database {
    /// Record a freshly opened WebSocket session, reopening an old row with
    /// the same id.
    pub fn open_session(&self, id: &str, device_id: &str, at: DateTime<Utc>) -> Result<()> {
        self.conn().execute(
            "INSERT INTO sessions (id, device_id, status, created_at, last_activity)
             VALUES (?1, ?2, 'active', ?3, ?3)
             ON CONFLICT(id) DO UPDATE SET
                status = 'active',
                last_activity = excluded.last_activity",
            params![id, device_id, at.to_rfc3339()],
        )?;
        Ok(())
    }

    pub fn close_session(&self, id: &str, at: DateTime<Utc>) -> Result<bool> {
        let affected = self.conn().execute(
            "UPDATE sessions SET status = 'closed', last_activity = ?2 WHERE id = ?1",
            params![id, at.to_rfc3339()],
        )?;
        Ok(affected > 0)
    }

    pub fn get_session(&self, id: &str) -> Result<SessionRow> {
        self.conn()
            .query_row(
                "SELECT id, device_id, status, created_at, last_activity
                 FROM sessions WHERE id = ?1",
                params![id],
                |row| {
                    let created: String = row.get(3)?;
                    let last: String = row.get(4)?;
                    Ok(SessionRow {
                        id: row.get(0)?,
                        device_id: row.get(1)?,
                        status: row.get(2)?,
                        created_at: parse_timestamp(3, &created)?,
                        last_activity: parse_timestamp(4, &last)?,
                    })
                },
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_open_close_reopen() {
        let db = Database::open_in_memory().unwrap();
        let t0 = Utc::now();

        db.open_session("ws-1", "d1", t0).unwrap();
        assert_eq!(db.get_session("ws-1").unwrap().status, "active");

        assert!(db.close_session("ws-1", Utc::now()).unwrap());
        assert_eq!(db.get_session("ws-1").unwrap().status, "closed");

        db.open_session("ws-1", "d1", Utc::now()).unwrap();
        let session = db.get_session("ws-1").unwrap();
        assert_eq!(session.status, "active");
        assert_eq!(session.created_at.timestamp(), t0.timestamp());

        assert!(!db.close_session("missing", Utc::now()).unwrap());
    }
}
