//! Droid Transport Core - shared types
//!
//! This crate provides the transport data model exchanged with the device
//! event-group service, the poller configuration, and the common error type.

pub mod config;
pub mod events;
pub mod error;

pub use config::PollerConfig;
pub use events::{Event, EventGroup, EventGroupRequest, EventGroupResponse, EventKind};
pub use error::{TransportError, Result};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Lower bound used when a listener has neither a start time nor a watermark
pub const BEGINNING_OF_TIME: i64 = i64::MIN;

/// Upper bound used when a listener does not supply an end time
pub const END_OF_TIME: i64 = i64::MAX;
