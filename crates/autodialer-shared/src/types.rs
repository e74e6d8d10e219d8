use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;

/// Liveness of a dialing device.
///
/// Older device builds report `online`, `calling` and `offline`; those are
/// accepted as aliases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceStatus {
    /// Reachable and idle.
    #[serde(alias = "online")]
    Connected,
    /// Reachable and dialing.
    #[serde(alias = "calling")]
    Busy,
    /// Not seen within the liveness window.
    #[serde(alias = "offline")]
    Disconnected,
}

impl DeviceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Connected => "connected",
            Self::Busy => "busy",
            Self::Disconnected => "disconnected",
        }
    }

    pub fn is_reachable(&self) -> bool {
        !matches!(self, Self::Disconnected)
    }
}

impl fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeviceStatus {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "connected" | "online" => Ok(Self::Connected),
            "busy" | "calling" => Ok(Self::Busy),
            "disconnected" | "offline" => Ok(Self::Disconnected),
            other => Err(ProtocolError::UnknownStatus(other.to_string())),
        }
    }
}

/// Lifecycle of a call list: `paused` -> `active` -> `paused` | `completed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ListStatus {
    #[default]
    Paused,
    Active,
    Completed,
}

impl ListStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Paused => "paused",
            Self::Active => "active",
            Self::Completed => "completed",
        }
    }
}

impl fmt::Display for ListStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ListStatus {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "paused" => Ok(Self::Paused),
            "active" => Ok(Self::Active),
            "completed" => Ok(Self::Completed),
            other => Err(ProtocolError::UnknownStatus(other.to_string())),
        }
    }
}

/// How a device reached the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    #[default]
    Http,
    Websocket,
}

impl Transport {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Websocket => "websocket",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_status_aliases() {
        let s: DeviceStatus = serde_json::from_str("\"online\"").unwrap();
        assert_eq!(s, DeviceStatus::Connected);
        let s: DeviceStatus = serde_json::from_str("\"calling\"").unwrap();
        assert_eq!(s, DeviceStatus::Busy);
        assert_eq!("offline".parse::<DeviceStatus>().unwrap(), DeviceStatus::Disconnected);
        assert_eq!(
            serde_json::to_string(&DeviceStatus::Busy).unwrap(),
            "\"busy\""
        );
    }

    #[test]
    fn test_list_status_parse() {
        assert_eq!("Completed".parse::<ListStatus>().unwrap(), ListStatus::Completed);
        assert!("running".parse::<ListStatus>().is_err());
        assert_eq!(ListStatus::default(), ListStatus::Paused);
    }

    #[test]
    fn test_reachable() {
        assert!(DeviceStatus::Connected.is_reachable());
        assert!(DeviceStatus::Busy.is_reachable());
        assert!(!DeviceStatus::Disconnected.is_reachable());
    }
}
