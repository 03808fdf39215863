//! `sitl-transport` – Simulator Link
//!
//! Raw byte transport between host-side firmware and an external physics /
//! sensor simulator.  Nothing here knows about framing or protocols.
//!
//! # Modules
//!
//! - [`clock`] – [`Clock`][clock::Clock]: the monotonic time and sleep
//!   collaborator.  [`SystemClock`][clock::SystemClock] for real runs,
//!   [`ManualClock`][clock::ManualClock] for deterministic tests.
//! - [`retry`] – [`RetryPolicy`][retry::RetryPolicy]: connect backoff cadence,
//!   attempt/deadline bounds, and the write would-block budget.
//! - [`socket`] – [`SocketTransport`][socket::SocketTransport]: TCP client with
//!   connect-with-retry, non-blocking send/receive, and a queued stream of
//!   [`LinkEvent`][sitl_types::LinkEvent]s.

pub mod clock;
pub mod retry;
pub mod socket;

pub use clock::{Clock, ManualClock, SystemClock};
pub use retry::RetryPolicy;
pub use socket::SocketTransport;
