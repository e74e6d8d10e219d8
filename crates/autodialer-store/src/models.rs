//! Rows mirrored into SQLite.
//!
//! These are flat snapshots of the hub's records, decoupled from the
//! server's in-memory types so the schema can evolve on its own.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use autodialer_shared::{DeviceStatus, ListStatus, Transport};

// ---------------------------------------------------------------------------
// Device
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeviceRow {
    pub id: String,
    /// Reported device type, `unknown` when the device did not say.
    pub name: String,
    pub status: DeviceStatus,
    pub transport: Transport,
    pub user_agent: Option<String>,
    pub current_list: Option<String>,
    pub calls_active: u32,
    pub calls_completed: u32,
    pub connected_at: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Call list
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CallListRow {
    pub id: String,
    pub name: String,
    pub numbers: Vec<String>,
    pub original_numbers: Vec<String>,
    pub ddd: Option<String>,
    pub status: ListStatus,
    pub progress: u32,
    pub total_numbers: u32,
    pub completed_calls: u32,
    pub current_group: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Call history
// ---------------------------------------------------------------------------

/// One dialed number as reported by a device.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CallHistoryEntry {
    pub device_id: String,
    pub list_id: String,
    pub phone_number: String,
    pub status: String,
    pub duration: Option<u64>,
    pub timestamp: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// A WebSocket session. `status` is `active` while the socket is open and
/// `closed` afterwards.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionRow {
    pub id: String,
    pub device_id: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}
