//! Droid Transport - event polling for Android device tooling
//!
//! Pulls timed events from the device transport service and delivers them to
//! subscribers without redelivery.
//!
//! ## Architecture
//!
//! - `droid-transport-core`: event model, configuration and errors
//! - `droid-transport-poller`: listeners, registry, poll cycle engine and scheduler

#![warn(clippy::all)]

pub use droid_transport_core as core;
pub use droid_transport_poller as poller;

/// Prelude module for convenient imports
pub mod prelude {
    pub use droid_transport_core::{Event, EventKind, PollerConfig, TransportError};
    pub use droid_transport_poller::{
        EventListener, EventService, InMemoryEventService, InlineExecutor, PollerHandle,
        TokioExecutor, TransportEventPoller, WorkerExecutor,
    };
}
