//! Transport Event Model
//!
//! Events are produced on the device by the transport daemon and grouped
//! server-side by `group_id`. The poller only ever reads them.

use serde::{Deserialize, Serialize};

use crate::{BEGINNING_OF_TIME, END_OF_TIME};

/// Kinds of events published by the transport pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    /// Device stream connected or disconnected
    Stream,
    /// App process started or ended
    Process,
    /// Profiling agent attached
    Agent,
    /// Echo command response
    Echo,
    /// CPU trace capture
    CpuTrace,
    /// Live allocation tracking
    MemoryAllocTracking,
    /// Heap dump capture
    MemoryHeapDump,
    /// Network throughput sample
    NetworkSpeed,
    /// Layout inspector component tree
    LayoutInspectorTree,
    /// App inspection command response
    AppInspectionResponse,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Stream => "STREAM",
            EventKind::Process => "PROCESS",
            EventKind::Agent => "AGENT",
            EventKind::Echo => "ECHO",
            EventKind::CpuTrace => "CPU_TRACE",
            EventKind::MemoryAllocTracking => "MEMORY_ALLOC_TRACKING",
            EventKind::MemoryHeapDump => "MEMORY_HEAP_DUMP",
            EventKind::NetworkSpeed => "NETWORK_SPEED",
            EventKind::LayoutInspectorTree => "LAYOUT_INSPECTOR_TREE",
            EventKind::AppInspectionResponse => "APP_INSPECTION_RESPONSE",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single timed event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Event kind
    pub kind: EventKind,
    /// Device timestamp in nanoseconds
    pub timestamp: i64,
    /// Stream (device connection) id
    #[serde(default)]
    pub stream_id: i64,
    /// Process id on the device
    #[serde(default)]
    pub pid: i32,
    /// Group id shared by related events
    #[serde(default)]
    pub group_id: i64,
    /// Whether this event closes its group
    #[serde(default)]
    pub is_ended: bool,
    /// Kind-specific payload
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl Event {
    /// Create an event with empty ids and payload
    pub fn new(kind: EventKind, timestamp: i64) -> Self {
        Self {
            kind,
            timestamp,
            stream_id: 0,
            pid: 0,
            group_id: 0,
            is_ended: false,
            payload: serde_json::Value::Null,
        }
    }

    pub fn with_stream_id(mut self, stream_id: i64) -> Self {
        self.stream_id = stream_id;
        self
    }

    pub fn with_pid(mut self, pid: i32) -> Self {
        self.pid = pid;
        self
    }

    pub fn with_group_id(mut self, group_id: i64) -> Self {
        self.group_id = group_id;
        self
    }

    pub fn ended(mut self) -> Self {
        self.is_ended = true;
        self
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }
}

/// Events sharing a group id
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventGroup {
    pub group_id: i64,
    pub events: Vec<Event>,
}

impl EventGroup {
    /// Check whether the group has received its closing event
    pub fn is_ended(&self) -> bool {
        self.events.last().map(|e| e.is_ended).unwrap_or(false)
    }
}

/// Query sent to the event-group service
///
/// Both timestamp bounds are inclusive. A `None` id leaves that dimension
/// unconstrained.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventGroupRequest {
    pub kind: EventKind,
    pub from_timestamp: i64,
    pub to_timestamp: i64,
    pub stream_id: Option<i64>,
    pub pid: Option<i32>,
    pub group_id: Option<i64>,
}

impl EventGroupRequest {
    /// Unbounded request for a kind
    pub fn new(kind: EventKind) -> Self {
        Self {
            kind,
            from_timestamp: BEGINNING_OF_TIME,
            to_timestamp: END_OF_TIME,
            stream_id: None,
            pid: None,
            group_id: None,
        }
    }

    /// Check whether an event satisfies every constrained dimension
    pub fn matches(&self, event: &Event) -> bool {
        event.kind == self.kind
            && event.timestamp >= self.from_timestamp
            && event.timestamp <= self.to_timestamp
            && self.stream_id.map_or(true, |id| id == event.stream_id)
            && self.pid.map_or(true, |pid| pid == event.pid)
            && self.group_id.map_or(true, |id| id == event.group_id)
    }
}

/// Response from the event-group service
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventGroupResponse {
    #[serde(default)]
    pub groups: Vec<EventGroup>,
}

impl EventGroupResponse {
    pub fn is_empty(&self) -> bool {
        self.groups.iter().all(|g| g.events.is_empty())
    }

    /// Flatten all groups into one sequence, group order preserved
    pub fn into_events(self) -> Vec<Event> {
        self.groups.into_iter().flat_map(|g| g.events).collect()
    }
}
