//! Droid Transport demo
//!
//! Runs a poller against an in-memory event service fed with synthetic
//! process and network events until Ctrl-C.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use anyhow::Result;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use droid_transport::core::{Event, EventKind, PollerConfig};
use droid_transport::poller::{
    EventListener, InMemoryEventService, PollerHandle, TokioExecutor, TransportEventPoller,
    WorkerExecutor,
};

const DEMO_PID: i32 = 4242;

#[tokio::main]
async fn main() -> Result<()> {
    let config = match std::env::args().nth(1) {
        Some(path) => PollerConfig::load_from(&PathBuf::from(path))?,
        None => PollerConfig::load()?,
    };

    // Initialize logging; RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log.level));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_file(config.log.file_line)
        .with_line_number(config.log.file_line)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Droid Transport v{} starting...", droid_transport::core::VERSION);

    let service = Arc::new(InMemoryEventService::new());
    let poller = Arc::new(TransportEventPoller::new(service.clone()));

    // Process lifecycle listener on a dedicated "UI" thread; done once the process ends
    let ui_thread = Arc::new(WorkerExecutor::new("demo-ui")?);
    poller.register_listener(
        EventListener::builder(EventKind::Process)
            .executor(ui_thread)
            .process_id(|| DEMO_PID)
            .callback(|event| {
                if event.is_ended {
                    info!("Process {} ended at {}", event.pid, event.timestamp);
                    true
                } else {
                    info!("Process {} alive at {}", event.pid, event.timestamp);
                    false
                }
            })
            .build(),
    );

    // Network samples on the tokio runtime
    poller.register_listener(
        EventListener::builder(EventKind::NetworkSpeed)
            .executor(Arc::new(TokioExecutor::current()))
            .filter(|event| event.payload.get("bytes").is_some())
            .callback(|event| {
                info!("Network sample at {}: {}", event.timestamp, event.payload);
                false
            })
            .build(),
    );

    let mut handle = PollerHandle::with_config(Arc::clone(&poller), &config)?;
    handle.start()?;

    let producer = tokio::spawn(produce_events(service, config.poll_period()));

    tokio::signal::ctrl_c().await?;
    info!("Shutting down...");

    producer.abort();
    tokio::task::spawn_blocking(move || handle.join()).await?;

    Ok(())
}

/// Publish a synthetic device session: a process that lives for a while and
/// a steady stream of network samples
async fn produce_events(service: Arc<InMemoryEventService>, period: Duration) {
    let started = Instant::now();
    let now = move || started.elapsed().as_nanos() as i64;

    service.publish(Event::new(EventKind::Process, now()).with_pid(DEMO_PID).with_group_id(DEMO_PID as i64));

    let mut ticker = tokio::time::interval(period / 2);
    for sample in 0u64.. {
        ticker.tick().await;
        service.publish(
            Event::new(EventKind::NetworkSpeed, now())
                .with_pid(DEMO_PID)
                .with_payload(serde_json::json!({ "bytes": sample * 512 })),
        );

        if sample == 20 {
            service.publish(
                Event::new(EventKind::Process, now())
                    .with_pid(DEMO_PID)
                    .with_group_id(DEMO_PID as i64)
                    .ended(),
            );
        }
    }
}
