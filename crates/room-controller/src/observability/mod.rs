//! Observability for the Room Controller.
//!
//! # Privacy by Default
//!
//! Actor loops use `#[instrument(skip_all)]` with explicit fields. Display
//! names and story text are user-supplied and never logged; only their
//! lengths are. Metric labels never carry room or connection ids.
//!
//! # Metrics
//!
//! | Metric | Type | Labels | Purpose |
//! |--------|------|--------|---------|
//! | `rc_rooms_active` | Gauge | none | Rooms held in the registry |
//! | `rc_connections_active` | Gauge | none | Open WebSocket connections |
//! | `rc_actor_mailbox_depth` | Gauge | `actor_type` | Backpressure indicator |
//! | `rc_events_total` | Counter | `event_type` | Client events processed |
//! | `rc_events_rejected_total` | Counter | `reason` | Frames dropped before processing |
//! | `rc_event_latency_seconds` | Histogram | `event_type` | Receipt to fan-out latency |
//! | `rc_messages_dropped_total` | Counter | none | Outbound messages not delivered |
//! | `rc_rooms_evicted_total` | Counter | none | Rooms removed by idle eviction |
//! | `rc_actor_panics_total` | Counter | `actor_type` | Actor task panics |

pub mod health;
pub mod metrics;

pub use health::{health_router, HealthState};
pub use metrics::{
    init_metrics_recorder, record_actor_panic, record_event, record_event_latency,
    record_event_rejected, record_messages_dropped, record_rooms_evicted,
    set_actor_mailbox_depth, set_connections_active, set_rooms_active,
};
