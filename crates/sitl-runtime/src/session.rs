//! [`Session`] – the setup/loop driver that hosts firmware.
//!
//! Mirrors the embedded entry point: [`Firmware::setup`] runs once, then
//! [`Firmware::step`] runs repeatedly.  After every call the session drains
//! the bridge's [`LinkEvent`]s and asks the [`LifecyclePolicy`] whether to
//! keep going.  The outcome is returned as a value; exiting the process is
//! left to `main`.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use sitl_runtime::session::{Context, Firmware, Session, SessionError, SessionOutcome};
//! use sitl_stream::StreamBridge;
//! use sitl_transport::ManualClock;
//!
//! struct Blink;
//!
//! impl Firmware for Blink {
//!     fn setup(&mut self, ctx: &mut Context<'_>) -> Result<(), SessionError> {
//!         ctx.serial.begin(115_200);
//!         Ok(())
//!     }
//!
//!     fn step(&mut self, ctx: &mut Context<'_>) {
//!         let now = ctx.millis();
//!         ctx.serial.print(now);
//!         ctx.delay(10);
//!     }
//! }
//!
//! let clock = Arc::new(ManualClock::new());
//! let mut session = Session::new(StreamBridge::new(), clock);
//! let outcome = session.run_steps(&mut Blink, 3).unwrap();
//! assert_eq!(outcome, SessionOutcome::StepLimit { steps: 3 });
//! assert_eq!(session.bridge().echo(), b"01020");
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use sitl_stream::StreamBridge;
use sitl_transport::Clock;
use sitl_types::{LinkEvent, SitlError};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::lifecycle::{LifecyclePolicy, SessionAction};

// ─────────────────────────────────────────────────────────────────────────────
// Error / outcome types
// ─────────────────────────────────────────────────────────────────────────────

/// Errors that stop a session before its loop starts.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("firmware setup failed: {0}")]
    Setup(String),

    #[error(transparent)]
    Link(#[from] SitlError),
}

/// How a session loop ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    /// The lifecycle policy ended the session in response to `event`.
    Terminated { exit_code: i32, event: LinkEvent },
    /// The shutdown flag was raised.
    ShutdownRequested,
    /// [`Session::run_steps`] reached its step budget.  `steps` is the
    /// session total.
    StepLimit { steps: u64 },
}

impl SessionOutcome {
    /// Process exit code for this outcome.
    pub fn exit_code(&self) -> i32 {
        match self {
            SessionOutcome::Terminated { exit_code, .. } => *exit_code,
            SessionOutcome::ShutdownRequested | SessionOutcome::StepLimit { .. } => 0,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Firmware interface
// ─────────────────────────────────────────────────────────────────────────────

/// What firmware sees on each call: its serial port and the clock.
pub struct Context<'a> {
    pub serial: &'a mut StreamBridge,
    pub clock: &'a dyn Clock,
}

impl Context<'_> {
    pub fn millis(&self) -> u64 {
        self.clock.millis()
    }

    pub fn micros(&self) -> u64 {
        self.clock.micros()
    }

    /// Block for `ms` milliseconds.
    pub fn delay(&self, ms: u64) {
        self.clock.sleep(Duration::from_millis(ms));
    }
}

/// Firmware hosted by a [`Session`].
pub trait Firmware {
    /// Called once before the loop.
    fn setup(&mut self, ctx: &mut Context<'_>) -> Result<(), SessionError>;

    /// One iteration of the firmware main loop.
    fn step(&mut self, ctx: &mut Context<'_>);
}

// ─────────────────────────────────────────────────────────────────────────────
// Session
// ─────────────────────────────────────────────────────────────────────────────

/// Owns the serial bridge and drives a [`Firmware`] against it.
pub struct Session {
    bridge: StreamBridge,
    clock: Arc<dyn Clock>,
    policy: LifecyclePolicy,
    shutdown: Arc<AtomicBool>,
    loop_period: Duration,
    steps: u64,
}

impl Session {
    /// A session with the fail-fast policy and no pause between steps.
    ///
    /// `clock` is what firmware sees through [`Context`]; give the bridge the
    /// same clock if connect backoff should follow it too.
    pub fn new(bridge: StreamBridge, clock: Arc<dyn Clock>) -> Self {
        Self {
            bridge,
            clock,
            policy: LifecyclePolicy::default(),
            shutdown: Arc::new(AtomicBool::new(false)),
            loop_period: Duration::ZERO,
            steps: 0,
        }
    }

    pub fn with_policy(mut self, policy: LifecyclePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Sleep `period` after every step.  Zero runs steps back to back.
    pub fn with_loop_period(mut self, period: Duration) -> Self {
        self.loop_period = period;
        self
    }

    /// Share an externally owned shutdown flag (e.g. set from a Ctrl-C handler).
    pub fn with_shutdown_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.shutdown = flag;
        self
    }

    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        self.shutdown.clone()
    }

    pub fn bridge(&self) -> &StreamBridge {
        &self.bridge
    }

    pub fn bridge_mut(&mut self) -> &mut StreamBridge {
        &mut self.bridge
    }

    /// Loop iterations completed so far.
    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// Run `setup` then `step` until the policy or the shutdown flag ends it.
    pub fn run(&mut self, firmware: &mut impl Firmware) -> Result<SessionOutcome, SessionError> {
        self.drive(firmware, None)
    }

    /// Like [`run`][Self::run] but stops after `max_steps` further loop
    /// iterations.  `setup` runs again on every call.
    pub fn run_steps(
        &mut self,
        firmware: &mut impl Firmware,
        max_steps: u64,
    ) -> Result<SessionOutcome, SessionError> {
        self.drive(firmware, Some(max_steps))
    }

    fn drive(
        &mut self,
        firmware: &mut impl Firmware,
        limit: Option<u64>,
    ) -> Result<SessionOutcome, SessionError> {
        let stop_at = limit.map(|max| self.steps.saturating_add(max));
        info!("firmware setup");
        firmware.setup(&mut Context {
            serial: &mut self.bridge,
            clock: self.clock.as_ref(),
        })?;
        if let Some(outcome) = self.check_events() {
            return Ok(self.finish(outcome));
        }

        info!("firmware loop started");
        loop {
            if self.shutdown.load(Ordering::SeqCst) {
                return Ok(self.finish(SessionOutcome::ShutdownRequested));
            }
            if stop_at.is_some_and(|stop| self.steps >= stop) {
                return Ok(SessionOutcome::StepLimit { steps: self.steps });
            }

            firmware.step(&mut Context {
                serial: &mut self.bridge,
                clock: self.clock.as_ref(),
            });
            self.steps += 1;

            if let Some(outcome) = self.check_events() {
                return Ok(self.finish(outcome));
            }
            if !self.loop_period.is_zero() {
                self.clock.sleep(self.loop_period);
            }
        }
    }

    fn check_events(&mut self) -> Option<SessionOutcome> {
        while let Some(event) = self.bridge.take_event() {
            match self.policy.decide(&event) {
                SessionAction::Continue => debug!(?event, "link event"),
                SessionAction::Terminate { exit_code } => {
                    warn!(?event, exit_code, "link event ends session");
                    return Some(SessionOutcome::Terminated { exit_code, event });
                }
            }
        }
        None
    }

    /// Close the link and discard the events that closing produced, so a
    /// later `run` starts from an empty queue.
    fn finish(&mut self, outcome: SessionOutcome) -> SessionOutcome {
        self.bridge.disconnect_sitl();
        while let Some(event) = self.bridge.take_event() {
            debug!(?event, "link event after session end");
        }
        info!(steps = self.steps, ?outcome, "session finished");
        outcome
    }
}
