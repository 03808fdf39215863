//! `sitl-runtime` – Firmware Host
//!
//! Runs firmware written against the serial bridge the way the board would:
//! `setup` once, then `step` in a loop.
//!
//! # Modules
//!
//! - [`session`] – [`Session`][session::Session] and the
//!   [`Firmware`][session::Firmware] trait.  The session owns the
//!   [`StreamBridge`][sitl_stream::StreamBridge], drains its link events
//!   after every call, and returns a [`SessionOutcome`][session::SessionOutcome]
//!   instead of exiting the process.
//! - [`lifecycle`] – [`LifecyclePolicy`][lifecycle::LifecyclePolicy]: maps
//!   [`LinkEvent`][sitl_types::LinkEvent]s to continue / terminate decisions.
//!   The default ends the session when the simulator goes away.
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]: installs the
//!   global `tracing` subscriber, with optional OTLP span export when
//!   `OTEL_EXPORTER_OTLP_ENDPOINT` is set.

pub mod lifecycle;
pub mod session;
pub mod telemetry;

pub use lifecycle::{LifecyclePolicy, SessionAction};
pub use session::{Context, Firmware, Session, SessionError, SessionOutcome};
pub use telemetry::{TracerProviderGuard, init_tracing};
