//! Poll Cycle Engine
//!
//! One cycle visits every registered listener in registration order:
//! - Build a time/id-bounded query from the listener and its watermark
//! - Fetch event groups from the service
//! - Sort, filter and dispatch matches onto the listener's executor
//! - Advance the listener's watermark past the newest dispatched event

use std::cmp::Ordering;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn, error};

use droid_transport_core::{Event, EventGroupRequest, Result, BEGINNING_OF_TIME};

use crate::listener::{EventListener, ListenerId};
use crate::registry::ListenerRegistry;
use crate::scheduler::PollerHandle;
use crate::service::EventService;

/// Total order applied to a listener's events before dispatch
pub type EventComparator = Arc<dyn Fn(&Event, &Event) -> Ordering + Send + Sync>;

/// Ascending timestamp order
pub fn timestamp_order() -> EventComparator {
    Arc::new(|a: &Event, b: &Event| a.timestamp.cmp(&b.timestamp))
}

/// Outcome of one poll cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Listeners visited
    pub listeners_polled: usize,
    /// Tasks handed to executors
    pub events_dispatched: usize,
    /// Listeners whose query or filter failed
    pub failures: usize,
}

/// Pulls events for registered listeners and fans them out
pub struct TransportEventPoller {
    service: Arc<dyn EventService>,
    registry: Arc<ListenerRegistry>,
    comparator: EventComparator,
}

impl TransportEventPoller {
    pub fn new(service: Arc<dyn EventService>) -> Self {
        Self {
            service,
            registry: Arc::new(ListenerRegistry::new()),
            comparator: timestamp_order(),
        }
    }

    /// Replace the default timestamp ordering
    pub fn with_comparator(mut self, comparator: EventComparator) -> Self {
        self.comparator = comparator;
        self
    }

    /// Create a poller and schedule it at a fixed `period`
    pub fn create_poller(
        service: Arc<dyn EventService>,
        period: Duration,
    ) -> Result<(Arc<Self>, PollerHandle)> {
        let poller = Arc::new(Self::new(service));
        let handle = PollerHandle::schedule(Arc::clone(&poller), period)?;
        Ok((poller, handle))
    }

    pub fn register_listener(&self, listener: EventListener) -> ListenerId {
        self.registry.register(listener)
    }

    pub fn unregister_listener(&self, id: ListenerId) -> bool {
        self.registry.unregister(id)
    }

    pub fn registry(&self) -> &Arc<ListenerRegistry> {
        &self.registry
    }

    /// Run a single poll cycle on the calling thread
    pub fn poll(&self) -> CycleReport {
        let mut report = CycleReport::default();

        for (id, listener) in self.registry.snapshot() {
            // Removed by a callback earlier in this cycle.
            if !self.registry.contains(id) {
                continue;
            }
            report.listeners_polled += 1;

            match panic::catch_unwind(AssertUnwindSafe(|| self.poll_listener(id, &listener))) {
                Ok(Ok(dispatched)) => report.events_dispatched += dispatched,
                Ok(Err(e)) => {
                    warn!("Polling {} events for listener {} failed: {}", listener.event_kind(), id, e);
                    report.failures += 1;
                }
                Err(_) => {
                    error!("Listener {} panicked while building or filtering its query", id);
                    report.failures += 1;
                }
            }
        }

        debug!(
            "Poll cycle: {} listeners, {} events dispatched, {} failures",
            report.listeners_polled, report.events_dispatched, report.failures
        );
        report
    }

    fn poll_listener(&self, id: ListenerId, listener: &Arc<EventListener>) -> Result<usize> {
        // Never re-query below what was already delivered, even with an explicit start.
        let start = match (listener.start_time(), self.registry.watermark(id)) {
            (Some(explicit), Some(watermark)) => explicit.max(watermark),
            (Some(bound), None) | (None, Some(bound)) => bound,
            (None, None) => BEGINNING_OF_TIME,
        };

        let request = EventGroupRequest {
            kind: listener.event_kind(),
            from_timestamp: start,
            to_timestamp: listener.end_time(),
            stream_id: listener.stream_id(),
            pid: listener.process_id(),
            group_id: listener.group_id(),
        };

        let response = self.service.get_event_groups(&request)?;
        if response.is_empty() {
            return Ok(0);
        }

        let mut events = response.into_events();
        events.sort_by(|a, b| (self.comparator)(a, b));

        let mut newest: Option<i64> = None;
        let mut dispatched = 0;
        for event in events
            .into_iter()
            .filter(|e| e.timestamp >= start && listener.accepts(e))
        {
            newest = Some(newest.map_or(event.timestamp, |n| n.max(event.timestamp)));
            self.dispatch(id, listener, event);
            dispatched += 1;
        }

        if let Some(newest) = newest {
            match self.registry.advance_watermark(id, start.max(newest.saturating_add(1))) {
                Some(watermark) => debug!("Listener {} watermark advanced to {}", id, watermark),
                None => debug!("Listener {} removed during dispatch, watermark dropped", id),
            }
        }

        Ok(dispatched)
    }

    fn dispatch(&self, id: ListenerId, listener: &Arc<EventListener>, event: Event) {
        let registry = Arc::clone(&self.registry);
        let target = Arc::clone(listener);

        listener.executor().execute(Box::new(move || {
            if !registry.contains(id) {
                debug!("Skipping {} event at {} for removed listener {}", event.kind, event.timestamp, id);
                return;
            }

            match panic::catch_unwind(AssertUnwindSafe(|| target.on_event(&event))) {
                Ok(true) => {
                    registry.unregister(id);
                    debug!("Listener {} asked to be removed", id);
                }
                Ok(false) => {}
                Err(_) => {
                    error!("Callback for listener {} panicked on {} event at {}", id, event.kind, event.timestamp);
                }
            }
        }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use droid_transport_core::{EventGroup, EventGroupResponse, EventKind, TransportError};
    use parking_lot::Mutex;
    use crate::service::InMemoryEventService;

    fn recorder() -> (Arc<Mutex<Vec<i64>>>, impl Fn(&Event) -> bool + Send + Sync + 'static) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        (seen, move |e: &Event| {
            sink.lock().push(e.timestamp);
            false
        })
    }

    #[test]
    fn test_first_cycle_then_idle_cycle() {
        let service = Arc::new(InMemoryEventService::new());
        service.publish_all(vec![Event::new(EventKind::Echo, 10), Event::new(EventKind::Echo, 20)]);
        let poller = TransportEventPoller::new(service);

        let (seen, callback) = recorder();
        let id = poller.register_listener(EventListener::builder(EventKind::Echo).callback(callback).build());

        let report = poller.poll();
        assert_eq!(report.events_dispatched, 2);
        assert_eq!(*seen.lock(), vec![10, 20]);
        assert_eq!(poller.registry().watermark(id), Some(21));

        let report = poller.poll();
        assert_eq!(report.events_dispatched, 0);
        assert_eq!(*seen.lock(), vec![10, 20]);
        assert_eq!(poller.registry().watermark(id), Some(21));
    }

    #[test]
    fn test_out_of_order_events_are_sorted() {
        let service = Arc::new(InMemoryEventService::new());
        service.publish_all(vec![
            Event::new(EventKind::Echo, 5).with_group_id(1),
            Event::new(EventKind::Echo, 2).with_group_id(2),
            Event::new(EventKind::Echo, 8).with_group_id(1),
        ]);
        let poller = TransportEventPoller::new(service);
        let (seen, callback) = recorder();
        poller.register_listener(EventListener::builder(EventKind::Echo).callback(callback).build());

        poller.poll();
        assert_eq!(*seen.lock(), vec![2, 5, 8]);
    }

    #[test]
    fn test_custom_comparator() {
        let service = Arc::new(InMemoryEventService::new());
        service.publish_all(vec![Event::new(EventKind::Echo, 1), Event::new(EventKind::Echo, 3)]);
        let poller = TransportEventPoller::new(service)
            .with_comparator(Arc::new(|a: &Event, b: &Event| b.timestamp.cmp(&a.timestamp)));
        let (seen, callback) = recorder();
        let id = poller.register_listener(EventListener::builder(EventKind::Echo).callback(callback).build());

        poller.poll();
        assert_eq!(*seen.lock(), vec![3, 1]);
        assert_eq!(poller.registry().watermark(id), Some(4));
    }

    #[test]
    fn test_filtered_out_events_leave_watermark_unchanged() {
        let service = Arc::new(InMemoryEventService::new());
        service.publish(Event::new(EventKind::Process, 7));
        let poller = TransportEventPoller::new(service);
        let id = poller.register_listener(
            EventListener::builder(EventKind::Process).filter(|e| e.is_ended).build(),
        );

        assert_eq!(poller.poll().events_dispatched, 0);
        assert_eq!(poller.registry().watermark(id), None);
    }

    #[test]
    fn test_explicit_start_time_bounds_query() {
        let service = Arc::new(InMemoryEventService::new());
        service.publish_all((1..=5).map(|ts| Event::new(EventKind::CpuTrace, ts)));
        let poller = TransportEventPoller::new(service);
        let (seen, callback) = recorder();
        poller.register_listener(
            EventListener::builder(EventKind::CpuTrace)
                .start_time(|| 3)
                .end_time(|| 4)
                .callback(callback)
                .build(),
        );

        poller.poll();
        assert_eq!(*seen.lock(), vec![3, 4]);
    }

    #[test]
    fn test_constant_start_time_does_not_redeliver() {
        let service = Arc::new(InMemoryEventService::new());
        service.publish_all(vec![Event::new(EventKind::Echo, 10), Event::new(EventKind::Echo, 20)]);
        let poller = TransportEventPoller::new(service.clone());
        let (seen, callback) = recorder();
        let id = poller.register_listener(
            EventListener::builder(EventKind::Echo)
                .start_time(|| 0)
                .callback(callback)
                .build(),
        );

        poller.poll();
        poller.poll();
        poller.poll();
        assert_eq!(*seen.lock(), vec![10, 20]);
        assert_eq!(poller.registry().watermark(id), Some(21));

        service.publish(Event::new(EventKind::Echo, 30));
        poller.poll();
        assert_eq!(*seen.lock(), vec![10, 20, 30]);
    }

    #[test]
    fn test_start_time_ahead_of_watermark_wins() {
        let service = Arc::new(InMemoryEventService::new());
        service.publish_all((1..=6).map(|ts| Event::new(EventKind::Echo, ts)));
        let poller = TransportEventPoller::new(service);
        let window = Arc::new(Mutex::new((0, 2)));
        let (from, to) = (Arc::clone(&window), Arc::clone(&window));
        let (seen, callback) = recorder();
        let id = poller.register_listener(
            EventListener::builder(EventKind::Echo)
                .start_time(move || from.lock().0)
                .end_time(move || to.lock().1)
                .callback(callback)
                .build(),
        );

        poller.poll();
        assert_eq!(*seen.lock(), vec![1, 2]);
        assert_eq!(poller.registry().watermark(id), Some(3));

        // Jumping the start past the watermark skips the gap.
        *window.lock() = (5, 6);
        poller.poll();
        assert_eq!(*seen.lock(), vec![1, 2, 5, 6]);
        assert_eq!(poller.registry().watermark(id), Some(7));
    }

    struct StaleService;

    impl EventService for StaleService {
        // Ignores the requested range, as a lagging daemon snapshot might.
        fn get_event_groups(&self, request: &EventGroupRequest) -> Result<EventGroupResponse> {
            Ok(EventGroupResponse {
                groups: vec![EventGroup {
                    group_id: 0,
                    events: vec![Event::new(request.kind, 1), Event::new(request.kind, 2)],
                }],
            })
        }
    }

    #[test]
    fn test_stale_events_not_redelivered() {
        let poller = TransportEventPoller::new(Arc::new(StaleService));
        let (seen, callback) = recorder();
        let id = poller.register_listener(EventListener::builder(EventKind::Echo).callback(callback).build());

        poller.poll();
        poller.poll();
        poller.poll();
        assert_eq!(*seen.lock(), vec![1, 2]);
        assert_eq!(poller.registry().watermark(id), Some(3));
    }

    struct FailingService;

    impl EventService for FailingService {
        fn get_event_groups(&self, _request: &EventGroupRequest) -> Result<EventGroupResponse> {
            Err(TransportError::Service("connection reset".into()))
        }
    }

    #[test]
    fn test_service_failure_is_reported() {
        let poller = TransportEventPoller::new(Arc::new(FailingService));
        poller.register_listener(EventListener::builder(EventKind::Echo).build());

        let report = poller.poll();
        assert_eq!(report.listeners_polled, 1);
        assert_eq!(report.failures, 1);
    }
}
