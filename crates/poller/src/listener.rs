//! Event Listener Descriptor
//!
//! Describes what a subscriber wants to receive and where its callback runs.
//! Listeners are immutable once built; identity is the [`ListenerId`] handed
//! out by the registry, never the listener's field values.

use std::fmt;
use std::sync::Arc;

use droid_transport_core::{Event, EventKind, END_OF_TIME};

use crate::executor::{Executor, InlineExecutor};

/// Registry-issued listener identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(uuid::Uuid);

impl ListenerId {
    pub(crate) fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

type Filter = Arc<dyn Fn(&Event) -> bool + Send + Sync>;
type Callback = Arc<dyn Fn(&Event) -> bool + Send + Sync>;
type Supplier<T> = Arc<dyn Fn() -> T + Send + Sync>;

/// A subscription to one kind of transport event
#[derive(Clone)]
pub struct EventListener {
    event_kind: EventKind,
    executor: Arc<dyn Executor>,
    filter: Filter,
    stream_id: Option<Supplier<i64>>,
    process_id: Option<Supplier<i32>>,
    group_id: Option<Supplier<i64>>,
    start_time: Option<Supplier<i64>>,
    end_time: Supplier<i64>,
    callback: Callback,
}

impl EventListener {
    /// Start building a listener for `event_kind`
    pub fn builder(event_kind: EventKind) -> EventListenerBuilder {
        EventListenerBuilder::new(event_kind)
    }

    pub fn event_kind(&self) -> EventKind {
        self.event_kind
    }

    pub fn executor(&self) -> &Arc<dyn Executor> {
        &self.executor
    }

    pub fn accepts(&self, event: &Event) -> bool {
        (self.filter)(event)
    }

    pub fn stream_id(&self) -> Option<i64> {
        self.stream_id.as_ref().map(|s| s())
    }

    pub fn process_id(&self) -> Option<i32> {
        self.process_id.as_ref().map(|s| s())
    }

    pub fn group_id(&self) -> Option<i64> {
        self.group_id.as_ref().map(|s| s())
    }

    pub fn start_time(&self) -> Option<i64> {
        self.start_time.as_ref().map(|s| s())
    }

    pub fn end_time(&self) -> i64 {
        (self.end_time)()
    }

    /// Invoke the callback; `true` asks for the listener to be removed
    pub fn on_event(&self, event: &Event) -> bool {
        (self.callback)(event)
    }
}

impl fmt::Debug for EventListener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventListener")
            .field("event_kind", &self.event_kind)
            .field("stream_id", &self.stream_id.is_some())
            .field("process_id", &self.process_id.is_some())
            .field("group_id", &self.group_id.is_some())
            .field("start_time", &self.start_time.is_some())
            .finish_non_exhaustive()
    }
}

/// Builder for [`EventListener`]
pub struct EventListenerBuilder {
    listener: EventListener,
}

impl EventListenerBuilder {
    fn new(event_kind: EventKind) -> Self {
        Self {
            listener: EventListener {
                event_kind,
                executor: Arc::new(InlineExecutor),
                filter: Arc::new(|_| true),
                stream_id: None,
                process_id: None,
                group_id: None,
                start_time: None,
                end_time: Arc::new(|| END_OF_TIME),
                callback: Arc::new(|_| false),
            },
        }
    }

    /// Where callbacks run (default: inline on the poller thread)
    pub fn executor(mut self, executor: Arc<dyn Executor>) -> Self {
        self.listener.executor = executor;
        self
    }

    pub fn filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(&Event) -> bool + Send + Sync + 'static,
    {
        self.listener.filter = Arc::new(filter);
        self
    }

    pub fn stream_id<F>(mut self, supplier: F) -> Self
    where
        F: Fn() -> i64 + Send + Sync + 'static,
    {
        self.listener.stream_id = Some(Arc::new(supplier));
        self
    }

    pub fn process_id<F>(mut self, supplier: F) -> Self
    where
        F: Fn() -> i32 + Send + Sync + 'static,
    {
        self.listener.process_id = Some(Arc::new(supplier));
        self
    }

    pub fn group_id<F>(mut self, supplier: F) -> Self
    where
        F: Fn() -> i64 + Send + Sync + 'static,
    {
        self.listener.group_id = Some(Arc::new(supplier));
        self
    }

    /// Explicit lower bound; takes precedence over the stored watermark
    pub fn start_time<F>(mut self, supplier: F) -> Self
    where
        F: Fn() -> i64 + Send + Sync + 'static,
    {
        self.listener.start_time = Some(Arc::new(supplier));
        self
    }

    pub fn end_time<F>(mut self, supplier: F) -> Self
    where
        F: Fn() -> i64 + Send + Sync + 'static,
    {
        self.listener.end_time = Arc::new(supplier);
        self
    }

    /// Callback per delivered event; return `true` to unregister the listener
    pub fn callback<F>(mut self, callback: F) -> Self
    where
        F: Fn(&Event) -> bool + Send + Sync + 'static,
    {
        self.listener.callback = Arc::new(callback);
        self
    }

    pub fn build(self) -> EventListener {
        self.listener
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let listener = EventListener::builder(EventKind::Echo).build();
        let event = Event::new(EventKind::Echo, 1);

        assert_eq!(listener.event_kind(), EventKind::Echo);
        assert!(listener.accepts(&event));
        assert!(!listener.on_event(&event));
        assert_eq!(listener.start_time(), None);
        assert_eq!(listener.end_time(), END_OF_TIME);
        assert_eq!(listener.stream_id(), None);
        assert_eq!(listener.process_id(), None);
        assert_eq!(listener.group_id(), None);
    }

    #[test]
    fn test_suppliers_are_evaluated_on_access() {
        let pid = Arc::new(parking_lot::Mutex::new(10));
        let p = Arc::clone(&pid);
        let listener = EventListener::builder(EventKind::Process)
            .process_id(move || *p.lock())
            .stream_id(|| 3)
            .filter(|e| e.is_ended)
            .build();

        assert_eq!(listener.process_id(), Some(10));
        *pid.lock() = 11;
        assert_eq!(listener.process_id(), Some(11));
        assert_eq!(listener.stream_id(), Some(3));
        assert!(!listener.accepts(&Event::new(EventKind::Process, 0)));
        assert!(listener.accepts(&Event::new(EventKind::Process, 0).ended()));
    }
}
