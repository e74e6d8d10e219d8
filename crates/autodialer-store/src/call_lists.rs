use rusqlite::params;

use autodialer_shared::ListStatus;

use crate::database::Database;
use crate::devices::parse_timestamp;
use crate::error::{Result, StoreError};
use crate::models::CallListRow;

const LIST_COLUMNS: &str = "id, name, numbers, original_numbers, ddd, status, progress,
     total_numbers, completed_calls, current_group, created_at, updated_at";

impl Database {
    pub fn upsert_call_list(&self, list: &CallListRow) -> Result<()> {
        let numbers = serde_json::to_string(&list.numbers)?;
        let original = serde_json::to_string(&list.original_numbers)?;

        self.conn().execute(
            "INSERT INTO call_lists (id, name, numbers, original_numbers, ddd, status, progress,
                                     total_numbers, completed_calls, current_group,
                                     created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                numbers = excluded.numbers,
                original_numbers = excluded.original_numbers,
                ddd = excluded.ddd,
                status = excluded.status,
                progress = excluded.progress,
                total_numbers = excluded.total_numbers,
                completed_calls = excluded.completed_calls,
                current_group = excluded.current_group,
                updated_at = excluded.updated_at",
            params![
                list.id,
                list.name,
                numbers,
                original,
                list.ddd,
                list.status.as_str(),
                list.progress,
                list.total_numbers,
                list.completed_calls,
                list.current_group,
                list.created_at.to_rfc3339(),
                list.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn get_call_list(&self, id: &str) -> Result<CallListRow> {
        self.conn()
            .query_row(
                &format!("SELECT {LIST_COLUMNS} FROM call_lists WHERE id = ?1"),
                params![id],
                row_to_call_list,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })
    }

    pub fn list_call_lists(&self) -> Result<Vec<CallListRow>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {LIST_COLUMNS} FROM call_lists ORDER BY created_at ASC"
        ))?;
        let rows = stmt.query_map([], row_to_call_list)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(StoreError::Sqlite)
    }

    pub fn delete_call_list(&self, id: &str) -> Result<bool> {
        let affected = self
            .conn()
            .execute("DELETE FROM call_lists WHERE id = ?1", params![id])?;
        Ok(affected > 0)
    }
}

fn row_to_call_list(row: &rusqlite::Row<'_>) -> rusqlite::Result<CallListRow> {
    let numbers_json: String = row.get(2)?;
    let original_json: Option<String> = row.get(3)?;
    let status_str: String = row.get(5)?;
    let created_str: String = row.get(10)?;
    let updated_str: String = row.get(11)?;

    let numbers: Vec<String> = serde_json::from_str(&numbers_json).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, Box::new(e))
    })?;
    let original_numbers: Vec<String> = match original_json {
        Some(json) => serde_json::from_str(&json).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, Box::new(e))
        })?,
        None => Vec::new(),
    };
    let status: ListStatus = status_str.parse().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(5, rusqlite::types::Type::Text, Box::new(e))
    })?;

    Ok(CallListRow {
        id: row.get(0)?,
        name: row.get(1)?,
        numbers,
        original_numbers,
        ddd: row.get(4)?,
        status,
        progress: row.get(6)?,
        total_numbers: row.get(7)?,
        completed_calls: row.get(8)?,
        current_group: row.get(9)?,
        created_at: parse_timestamp(10, &created_str)?,
        updated_at: parse_timestamp(11, &updated_str)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn list(id: &str) -> CallListRow {
        let now = Utc::now();
        CallListRow {
            id: id.to_string(),
            name: "Leads".to_string(),
            numbers: vec!["11999999999".to_string(), "1188888888".to_string()],
            original_numbers: vec![
                "(11) 99999-9999".to_string(),
                "1188888888".to_string(),
                "abc".to_string(),
            ],
            ddd: Some("11".to_string()),
            status: ListStatus::Paused,
            progress: 0,
            total_numbers: 2,
            completed_calls: 0,
            current_group: 0,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn json_columns_survive_storage() {
        let db = Database::open_in_memory().unwrap();
        let l = list("l1");
        db.upsert_call_list(&l).unwrap();

        let stored = db.get_call_list("l1").unwrap();
        assert_eq!(stored.numbers, l.numbers);
        assert_eq!(stored.original_numbers.len(), 3);
        assert_eq!(stored.ddd.as_deref(), Some("11"));
    }

    #[test]
    fn upsert_updates_status_and_progress() {
        let db = Database::open_in_memory().unwrap();
        let mut l = list("l1");
        db.upsert_call_list(&l).unwrap();

        l.status = ListStatus::Active;
        l.completed_calls = 1;
        l.progress = 50;
        db.upsert_call_list(&l).unwrap();

        let stored = db.get_call_list("l1").unwrap();
        assert_eq!(stored.status, ListStatus::Active);
        assert_eq!(stored.progress, 50);
        assert_eq!(db.list_call_lists().unwrap().len(), 1);

        assert!(db.delete_call_list("l1").unwrap());
        assert!(db.list_call_lists().unwrap().is_empty());
    }
}
