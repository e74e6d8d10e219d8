//! Call lists and their lifecycle.
//!
//! A list is created `paused`, becomes `active` only when it is sent to
//! devices, and is moved to `paused` or `completed` by the dashboard.
//! Completion reports from devices advance progress but never change the
//! status on their own.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use autodialer_shared::batching::{group_for_position, make_groups, ConferenceGroup};
use autodialer_shared::phone::{format_display, parse_numbers};
use autodialer_shared::ListStatus;

use crate::error::ServerError;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallList {
    pub id: String,
    pub name: String,
    pub numbers: Vec<String>,
    /// `numbers` formatted for the dashboard.
    pub display_numbers: Vec<String>,
    pub original_numbers: Vec<String>,
    pub ddd: Option<String>,
    pub status: ListStatus,
    /// Percent of numbers reported as dialed.
    pub progress: u32,
    pub total_numbers: usize,
    pub completed_calls: usize,
    pub current_group: usize,
    pub conference_groups: Vec<ConferenceGroup>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CallList {
    /// Payload of the `CALL_LIST` message delivered to devices.
    pub fn delivery_payload(&self) -> serde_json::Value {
        serde_json::json!({
            "list_id": self.id,
            "name": self.name,
            "ddd": self.ddd,
            "numbers": self.numbers,
            "conference_groups": self.conference_groups,
            "current_group": self.current_group,
            "total_numbers": self.total_numbers,
        })
    }

    /// CSV export: `name,number` header, one `Contact <n>` row per number.
    pub fn to_csv(&self) -> Result<String, ServerError> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        let csv_err = |e: csv::Error| ServerError::Internal(format!("CSV export failed: {e}"));

        writer.write_record(["name", "number"]).map_err(csv_err)?;
        for (i, number) in self.numbers.iter().enumerate() {
            writer
                .write_record([format!("Contact {}", i + 1).as_str(), number.as_str()])
                .map_err(csv_err)?;
        }

        let bytes = writer
            .into_inner()
            .map_err(|e| ServerError::Internal(format!("CSV export failed: {e}")))?;
        String::from_utf8(bytes).map_err(|e| ServerError::Internal(e.to_string()))
    }

    /// File name offered for the CSV download.
    pub fn export_file_name(&self) -> String {
        let stem: String = self
            .name
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .collect();
        format!("{stem}.csv")
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// Input for [`CallListBook::create`].
#[derive(Debug, Clone, Default)]
pub struct NewCallList {
    pub name: String,
    /// Raw lines; normalized here.
    pub numbers: Vec<String>,
    /// Raw input as the operator pasted it, when it differs from `numbers`.
    pub original_numbers: Option<Vec<String>>,
    pub ddd: Option<String>,
}

/// All call lists, in creation order.
pub struct CallListBook {
    lists: Vec<CallList>,
    max_group_size: usize,
    min_digits: usize,
}

impl CallListBook {
    pub fn new(max_group_size: usize, min_digits: usize) -> Self {
        Self {
            lists: Vec::new(),
            max_group_size,
            min_digits,
        }
    }

    /// Normalize the numbers, drop the undialable ones and cut the rest into
    /// conference groups. The new list starts `paused`.
    pub fn create(&mut self, new: NewCallList) -> Result<&CallList, ServerError> {
        let name = new.name.trim().to_string();
        if name.is_empty() {
            return Err(ServerError::BadRequest("List name is required".into()));
        }

        let parsed = parse_numbers(&new.numbers, self.min_digits);
        if parsed.valid.is_empty() {
            return Err(ServerError::BadRequest("No valid numbers found".into()));
        }

        let original_numbers = match new.original_numbers {
            Some(lines) => lines
                .into_iter()
                .map(|l| l.trim().to_string())
                .filter(|l| !l.is_empty())
                .collect(),
            None => parsed.original,
        };

        let now = Utc::now();
        let list = CallList {
            id: format!("list_{}", Uuid::new_v4().simple()),
            name,
            total_numbers: parsed.valid.len(),
            conference_groups: make_groups(&parsed.valid, self.max_group_size),
            display_numbers: parsed.valid.iter().map(|n| format_display(n)).collect(),
            numbers: parsed.valid,
            original_numbers,
            ddd: clean_ddd(new.ddd),
            status: ListStatus::Paused,
            progress: 0,
            completed_calls: 0,
            current_group: 0,
            created_at: now,
            updated_at: now,
        };

        info!(
            list = %list.id,
            numbers = list.total_numbers,
            rejected = parsed.invalid.len(),
            groups = list.conference_groups.len(),
            "Created call list"
        );

        self.lists.push(list);
        Ok(&self.lists[self.lists.len() - 1])
    }

    pub fn get(&self, id: &str) -> Option<&CallList> {
        self.lists.iter().find(|l| l.id == id)
    }

    fn get_mut(&mut self, id: &str) -> Result<&mut CallList, ServerError> {
        self.lists
            .iter_mut()
            .find(|l| l.id == id)
            .ok_or_else(|| ServerError::ListNotFound(id.to_string()))
    }

    pub fn list(&self) -> &[CallList] {
        &self.lists
    }

    /// Rename a list or change its area code.
    pub fn update(
        &mut self,
        id: &str,
        name: Option<String>,
        ddd: Option<Option<String>>,
    ) -> Result<&CallList, ServerError> {
        let list = self.get_mut(id)?;

        if let Some(name) = name {
            let name = name.trim();
            if name.is_empty() {
                return Err(ServerError::BadRequest("List name is required".into()));
            }
            list.name = name.to_string();
        }
        if let Some(ddd) = ddd {
            list.ddd = clean_ddd(ddd);
        }

        list.touch();
        Ok(list)
    }

    /// Dashboard-driven transition. `active` is only reachable by sending
    /// the list to devices.
    pub fn set_status(&mut self, id: &str, status: ListStatus) -> Result<&CallList, ServerError> {
        if status == ListStatus::Active {
            return Err(ServerError::BadRequest(
                "Lists become active by sending them to devices".into(),
            ));
        }

        let list = self.get_mut(id)?;
        list.status = status;
        list.touch();
        Ok(list)
    }

    pub(crate) fn activate(&mut self, id: &str) -> Result<&CallList, ServerError> {
        let list = self.get_mut(id)?;
        list.status = ListStatus::Active;
        list.touch();
        Ok(list)
    }

    /// Count one dialed number. Progress is capped at the list size.
    pub fn record_result(&mut self, id: &str) -> Result<&CallList, ServerError> {
        let list = self.get_mut(id)?;

        list.completed_calls = (list.completed_calls + 1).min(list.total_numbers);
        list.progress = if list.total_numbers == 0 {
            0
        } else {
            (list.completed_calls * 100 / list.total_numbers) as u32
        };
        list.current_group =
            group_for_position(&list.conference_groups, list.completed_calls).unwrap_or(0);
        list.touch();
        Ok(list)
    }

    pub fn remove(&mut self, id: &str) -> Option<CallList> {
        let index = self.lists.iter().position(|l| l.id == id)?;
        Some(self.lists.remove(index))
    }

    pub fn len(&self) -> usize {
        self.lists.len()
    }
}

fn clean_ddd(ddd: Option<String>) -> Option<String> {
    ddd.map(|d| d.trim().to_string()).filter(|d| !d.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn book() -> CallListBook {
        CallListBook::new(6, 8)
    }

    fn new_list(numbers: &[&str]) -> NewCallList {
        NewCallList {
            name: "Leads".into(),
            numbers: numbers.iter().map(|n| n.to_string()).collect(),
            original_numbers: None,
            ddd: Some(" 11 ".into()),
        }
    }

    #[test]
    fn test_create_filters_and_groups() {
        let mut book = book();
        let list = book
            .create(new_list(&["11999999999", "1188888888", "abc"]))
            .unwrap()
            .clone();

        assert_eq!(list.numbers, vec!["11999999999", "1188888888"]);
        assert_eq!(list.display_numbers[0], "+11 (99) 99999-99");
        assert_eq!(list.display_numbers[1], "1188888888");
        assert_eq!(list.original_numbers.len(), 3);
        assert_eq!(list.total_numbers, 2);
        assert_eq!(list.status, ListStatus::Paused);
        assert_eq!(list.ddd.as_deref(), Some("11"));
        assert_eq!(list.conference_groups.len(), 1);
        assert_eq!(list.conference_groups[0].start_index, 0);
        assert_eq!(list.conference_groups[0].end_index, 1);
    }

    #[test]
    fn test_create_rejects_empty_input() {
        let mut book = book();
        assert!(matches!(
            book.create(new_list(&["abc", "123"])),
            Err(ServerError::BadRequest(_))
        ));

        let mut nameless = new_list(&["11999999999"]);
        nameless.name = "   ".into();
        assert!(matches!(
            book.create(nameless),
            Err(ServerError::BadRequest(_))
        ));
        assert_eq!(book.len(), 0);
    }

    #[test]
    fn test_explicit_originals_are_kept() {
        let mut book = book();
        let mut input = new_list(&["11999999999"]);
        input.original_numbers = Some(vec!["(11) 99999-9999".into(), "".into(), "x".into()]);
        let list = book.create(input).unwrap();
        assert_eq!(list.original_numbers, vec!["(11) 99999-9999", "x"]);
    }

    #[test]
    fn test_status_transitions() {
        let mut book = book();
        let id = book.create(new_list(&["11999999999"])).unwrap().id.clone();

        assert!(matches!(
            book.set_status(&id, ListStatus::Active),
            Err(ServerError::BadRequest(_))
        ));
        assert_eq!(book.get(&id).unwrap().status, ListStatus::Paused);

        book.activate(&id).unwrap();
        assert_eq!(
            book.set_status(&id, ListStatus::Completed).unwrap().status,
            ListStatus::Completed
        );
        assert!(matches!(
            book.set_status("nope", ListStatus::Paused),
            Err(ServerError::ListNotFound(_))
        ));
    }

    #[test]
    fn test_update_name_and_ddd() {
        let mut book = book();
        let id = book.create(new_list(&["11999999999"])).unwrap().id.clone();

        let list = book.update(&id, Some("Renamed".into()), Some(None)).unwrap();
        assert_eq!(list.name, "Renamed");
        assert!(list.ddd.is_none());

        assert!(book.update(&id, Some(" ".into()), None).is_err());
    }

    #[test]
    fn test_record_result_advances_progress_without_completing() {
        let mut book = book();
        let numbers: Vec<String> = (0..8).map(|i| format!("1199999000{i}")).collect();
        let refs: Vec<&str> = numbers.iter().map(String::as_str).collect();
        let id = book.create(new_list(&refs)).unwrap().id.clone();
        book.activate(&id).unwrap();

        for _ in 0..6 {
            book.record_result(&id).unwrap();
        }
        let list = book.get(&id).unwrap();
        assert_eq!(list.completed_calls, 6);
        assert_eq!(list.progress, 75);
        assert_eq!(list.current_group, 1);

        for _ in 0..5 {
            book.record_result(&id).unwrap();
        }
        let list = book.get(&id).unwrap();
        assert_eq!(list.completed_calls, 8);
        assert_eq!(list.progress, 100);
        assert_eq!(list.current_group, 1);
        assert_eq!(list.status, ListStatus::Active);
    }

    #[test]
    fn test_csv_export() {
        let mut book = book();
        let list = book
            .create(new_list(&["11999999999", "1188888888"]))
            .unwrap();

        let csv = list.to_csv().unwrap();
        assert_eq!(
            csv,
            "name,number\nContact 1,11999999999\nContact 2,1188888888\n"
        );
        assert_eq!(list.export_file_name(), "Leads.csv");
    }

    #[test]
    fn test_remove() {
        let mut book = book();
        let id = book.create(new_list(&["11999999999"])).unwrap().id.clone();
        assert!(book.remove(&id).is_some());
        assert!(book.remove(&id).is_none());
    }
}
