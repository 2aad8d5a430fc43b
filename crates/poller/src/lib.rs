//! Transport Event Poller
//!
//! Periodically pulls event groups from the transport service and delivers
//! matching events to registered listeners, each on its own executor.

pub mod executor;
pub mod listener;
pub mod registry;
pub mod service;
pub mod poller;
pub mod scheduler;

pub use executor::{Executor, InlineExecutor, Task, TokioExecutor, WorkerExecutor};
pub use listener::{EventListener, EventListenerBuilder, ListenerId};
pub use registry::ListenerRegistry;
pub use service::{EventService, InMemoryEventService};
pub use poller::{timestamp_order, CycleReport, EventComparator, TransportEventPoller};
pub use scheduler::{PollerHandle, PollerState};
