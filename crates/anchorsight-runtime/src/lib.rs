//! `anchorsight-runtime` – The selection loop and session wiring.
//!
//! # Modules
//!
//! - [`selection_engine`] – [`SelectionEngine`][selection_engine::SelectionEngine]:
//!   the 90 Hz loop that samples the device pose, casts a ray from the
//!   device's tilted raycast origin, and reconciles the shared highlight.
//! - [`seed`] – the five startup cylinders and the highlight indicator,
//!   created concurrently on a [`JoinSet`](tokio::task::JoinSet).
//! - [`session`] – [`Session`][session::Session]: builds the world, the event
//!   bus and the anchor binding service, and starts/stops the selection loop
//!   through a [`CancellationToken`](tokio_util::sync::CancellationToken).
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]:
//!   initialises the global `tracing` subscriber with an optional OTLP span
//!   exporter.  Set `OTEL_EXPORTER_OTLP_ENDPOINT` to enable live trace export.

pub mod seed;
pub mod selection_engine;
pub mod session;
pub mod telemetry;

pub use selection_engine::{DeviceRig, POLL_HZ, POLL_PERIOD, RAYCAST_TILT_DEG, SelectionEngine, TickOutcome};
pub use session::{SelectionHandle, Session};
pub use telemetry::{LogFormat, TracerProviderGuard, init_tracing};
