//! Event-Group Service
//!
//! The poller's only external boundary. A production implementation talks to
//! the transport daemon; [`InMemoryEventService`] backs tests and the demo.

use std::collections::{BTreeMap, HashSet};
use parking_lot::RwLock;

use droid_transport_core::{
    Event, EventGroup, EventGroupRequest, EventGroupResponse, EventKind, Result, TransportError,
};

/// Synchronous query interface to the event-group service
pub trait EventService: Send + Sync {
    fn get_event_groups(&self, request: &EventGroupRequest) -> Result<EventGroupResponse>;
}

/// Thread-safe in-process event store
#[derive(Default)]
pub struct InMemoryEventService {
    events: RwLock<Vec<Event>>,
    unavailable: RwLock<HashSet<EventKind>>,
}

impl InMemoryEventService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, event: Event) {
        self.events.write().push(event);
    }

    pub fn publish_all(&self, events: impl IntoIterator<Item = Event>) {
        self.events.write().extend(events);
    }

    /// Make queries for `kind` fail until cleared
    pub fn set_unavailable(&self, kind: EventKind, unavailable: bool) {
        let mut kinds = self.unavailable.write();
        if unavailable {
            kinds.insert(kind);
        } else {
            kinds.remove(&kind);
        }
    }

    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl EventService for InMemoryEventService {
    fn get_event_groups(&self, request: &EventGroupRequest) -> Result<EventGroupResponse> {
        if self.unavailable.read().contains(&request.kind) {
            return Err(TransportError::Unavailable(format!(
                "no stream serving {} events",
                request.kind
            )));
        }

        // Publication order within a group is kept; the poller does the sorting.
        let mut groups: BTreeMap<i64, Vec<Event>> = BTreeMap::new();
        for event in self.events.read().iter().filter(|e| request.matches(e)) {
            groups.entry(event.group_id).or_default().push(event.clone());
        }

        Ok(EventGroupResponse {
            groups: groups
                .into_iter()
                .map(|(group_id, events)| EventGroup { group_id, events })
                .collect(),
        })
    }
}
