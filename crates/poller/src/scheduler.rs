//! Poll Scheduler
//!
//! Drives a poller at a fixed rate on its own named thread. The caller owns
//! the returned [`PollerHandle`]; dropping it stops the schedule.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use crossbeam_channel::{bounded, select, tick, Receiver, Sender};
use parking_lot::{Mutex, RwLock};
use tracing::{info, debug, warn};

use droid_transport_core::{PollerConfig, Result, TransportError};

use crate::poller::TransportEventPoller;

/// Lifecycle of a scheduled poller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollerState {
    /// Handle built, thread not yet running
    Created,
    /// Thread running, waiting for its first cycle
    Scheduled,
    /// A poll cycle is in flight
    Running,
    /// Between cycles
    Idle,
    /// No further cycles will run
    Stopped,
}

struct PendingSchedule {
    poller: Arc<TransportEventPoller>,
    period: Duration,
    thread_name: String,
}

/// Caller-owned control over one poller's schedule
pub struct PollerHandle {
    state: Arc<RwLock<PollerState>>,
    cancelled: Arc<AtomicBool>,
    stop_sender: Mutex<Option<Sender<()>>>,
    pending: Option<PendingSchedule>,
    thread: Option<JoinHandle<()>>,
}

impl PollerHandle {
    /// Build an unstarted handle running `poller` every `period`
    pub fn new(poller: Arc<TransportEventPoller>, period: Duration) -> Result<Self> {
        Self::build(poller, period, PollerConfig::default().thread_name)
    }

    /// Build an unstarted handle using the period and thread name from `config`
    pub fn with_config(poller: Arc<TransportEventPoller>, config: &PollerConfig) -> Result<Self> {
        config.validate()?;
        Self::build(poller, config.poll_period(), config.thread_name.clone())
    }

    /// Build and start in one step
    pub fn schedule(poller: Arc<TransportEventPoller>, period: Duration) -> Result<Self> {
        let mut handle = Self::new(poller, period)?;
        handle.start()?;
        Ok(handle)
    }

    fn build(poller: Arc<TransportEventPoller>, period: Duration, thread_name: String) -> Result<Self> {
        if period.is_zero() {
            return Err(TransportError::Config("poll period must be greater than zero".into()));
        }

        Ok(Self {
            state: Arc::new(RwLock::new(PollerState::Created)),
            cancelled: Arc::new(AtomicBool::new(false)),
            stop_sender: Mutex::new(None),
            pending: Some(PendingSchedule { poller, period, thread_name }),
            thread: None,
        })
    }

    /// Spawn the scheduler thread; a handle can be started once
    pub fn start(&mut self) -> Result<()> {
        if self.is_stopped() {
            return Err(TransportError::InvalidState("poller was stopped before it started".into()));
        }
        let PendingSchedule { poller, period, thread_name } = self.pending
            .take()
            .ok_or_else(|| TransportError::InvalidState("poller is already scheduled".into()))?;

        let (stop_sender, stop_receiver) = bounded::<()>(0);
        set_state(&self.state, PollerState::Scheduled);

        let spawned = {
            let state = Arc::clone(&self.state);
            let cancelled = Arc::clone(&self.cancelled);
            std::thread::Builder::new()
                .name(thread_name.clone())
                .spawn(move || run_schedule(poller, period, state, cancelled, stop_receiver))
        };
        let thread = match spawned {
            Ok(thread) => thread,
            Err(e) => {
                self.cancelled.store(true, Ordering::SeqCst);
                set_state(&self.state, PollerState::Stopped);
                return Err(e.into());
            }
        };

        *self.stop_sender.lock() = Some(stop_sender);
        self.thread = Some(thread);
        info!("Scheduled transport poller every {:?} on thread {}", period, thread_name);
        Ok(())
    }

    pub fn state(&self) -> PollerState {
        *self.state.read()
    }

    pub fn is_stopped(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Prevent future cycles without waiting for an in-flight one
    pub fn stop(&self) {
        if self.cancelled.swap(true, Ordering::SeqCst) {
            return;
        }
        // Disconnecting wakes the scheduler thread out of its tick wait.
        self.stop_sender.lock().take();
        if self.thread.is_none() {
            set_state(&self.state, PollerState::Stopped);
        }
        debug!("Stop requested for transport poller");
    }

    /// Stop and wait for the scheduler thread to exit
    pub fn join(mut self) {
        self.stop();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("Transport poller thread panicked");
            }
        }
    }
}

impl Drop for PollerHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

fn set_state(state: &RwLock<PollerState>, next: PollerState) {
    let mut current = state.write();
    debug!("Poller state transition: {:?} -> {:?}", *current, next);
    *current = next;
}

fn run_schedule(
    poller: Arc<TransportEventPoller>,
    period: Duration,
    state: Arc<RwLock<PollerState>>,
    cancelled: Arc<AtomicBool>,
    stop_receiver: Receiver<()>,
) {
    let ticker = tick(period);

    // First cycle runs immediately; later ones on the tick. Ticks arriving
    // during a slow cycle are coalesced, so cycles never overlap.
    while !cancelled.load(Ordering::SeqCst) {
        set_state(&state, PollerState::Running);
        poller.poll();
        set_state(&state, PollerState::Idle);

        select! {
            recv(ticker) -> _ => {}
            recv(stop_receiver) -> _ => {}
        }
    }

    set_state(&state, PollerState::Stopped);
    info!("Transport poller stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use droid_transport_core::{Event, EventKind};
    use crate::listener::EventListener;
    use crate::service::InMemoryEventService;

    #[test]
    fn test_zero_period_rejected() {
        let poller = Arc::new(TransportEventPoller::new(Arc::new(InMemoryEventService::new())));
        assert!(matches!(
            PollerHandle::new(poller, Duration::ZERO),
            Err(TransportError::Config(_))
        ));
    }

    #[test]
    fn test_runs_cycles_until_stopped() {
        let service = Arc::new(InMemoryEventService::new());
        let poller = Arc::new(TransportEventPoller::new(service.clone()));
        let (tx, rx) = crossbeam_channel::unbounded();
        poller.register_listener(
            EventListener::builder(EventKind::Echo)
                .callback(move |e| {
                    let _ = tx.send(e.timestamp);
                    false
                })
                .build(),
        );

        let handle = PollerHandle::schedule(Arc::clone(&poller), Duration::from_millis(5)).unwrap();
        service.publish(Event::new(EventKind::Echo, 1));
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), 1);

        service.publish(Event::new(EventKind::Echo, 2));
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), 2);

        handle.stop();
        assert!(handle.is_stopped());
        handle.join();

        service.publish(Event::new(EventKind::Echo, 3));
        assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());
    }

    #[test]
    fn test_lifecycle_states() {
        let poller = Arc::new(TransportEventPoller::new(Arc::new(InMemoryEventService::new())));
        let mut handle = PollerHandle::new(poller, Duration::from_millis(5)).unwrap();
        assert_eq!(handle.state(), PollerState::Created);

        handle.start().unwrap();
        assert_ne!(handle.state(), PollerState::Created);
        assert!(matches!(handle.start(), Err(TransportError::InvalidState(_))));

        let state = Arc::clone(&handle.state);
        handle.join();
        assert_eq!(*state.read(), PollerState::Stopped);
    }

    #[test]
    fn test_stopped_before_start_cannot_start() {
        let poller = Arc::new(TransportEventPoller::new(Arc::new(InMemoryEventService::new())));
        let mut handle = PollerHandle::new(poller, Duration::from_millis(5)).unwrap();

        handle.stop();
        assert_eq!(handle.state(), PollerState::Stopped);
        assert!(matches!(handle.start(), Err(TransportError::InvalidState(_))));
        assert_eq!(handle.state(), PollerState::Stopped);
    }

    #[test]
    fn test_slow_cycles_do_not_overlap() {
        let service = Arc::new(InMemoryEventService::new());
        service.publish_all((0..4).map(|ts| Event::new(EventKind::Echo, ts)));
        let poller = Arc::new(TransportEventPoller::new(service));

        let in_flight = Arc::new(AtomicUsize::new(0));
        let overlapped = Arc::new(AtomicBool::new(false));
        let (tx, rx) = crossbeam_channel::unbounded();
        {
            let in_flight = Arc::clone(&in_flight);
            let overlapped = Arc::clone(&overlapped);
            // Inline callbacks run on the scheduler thread, so they are part of the cycle.
            poller.register_listener(
                EventListener::builder(EventKind::Echo)
                    .filter(|_| true)
                    .callback(move |_| {
                        if in_flight.fetch_add(1, Ordering::SeqCst) > 0 {
                            overlapped.store(true, Ordering::SeqCst);
                        }
                        std::thread::sleep(Duration::from_millis(10));
                        in_flight.fetch_sub(1, Ordering::SeqCst);
                        let _ = tx.send(());
                        false
                    })
                    .build(),
            );
        }

        let handle = PollerHandle::schedule(poller, Duration::from_millis(1)).unwrap();
        for _ in 0..4 {
            rx.recv_timeout(Duration::from_secs(5)).unwrap();
        }
        handle.join();
        assert!(!overlapped.load(Ordering::SeqCst));
    }
}
