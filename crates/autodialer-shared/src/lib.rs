//! # autodialer-shared
//!
//! Types shared between the autodialer server, its storage mirror and the
//! device-side protocol: status enumerations, wire frames, phone number
//! normalization and conference group batching.
//!
//! Nothing in this crate performs I/O.

pub mod batching;
pub mod constants;
pub mod error;
pub mod phone;
pub mod protocol;
pub mod types;

pub use batching::{make_groups, ConferenceGroup};
pub use error::ProtocolError;
pub use types::{DeviceStatus, ListStatus, Transport};
