//! [`LifecyclePolicy`] – what a link event means for the session.
//!
//! The transport and bridge only report what happened to the simulator link.
//! Whether a vanished simulator ends the firmware process is decided here, by
//! the layer that owns program lifetime.
//!
//! | Event | [`fail_fast`][LifecyclePolicy::fail_fast] | [`lenient`][LifecyclePolicy::lenient] |
//! |---|---|---|
//! | `Connected` | continue | continue |
//! | `ConnectFailed` | continue (the caller already got the error) | continue |
//! | `Lost { PeerClosed }` | terminate, exit code 0 | continue |
//! | `Lost { .. }` | terminate, exit code 1 | continue |
//! | `Disconnected` | continue | continue |

use sitl_types::{FailureReason, LinkEvent};

/// Decision taken for one [`LinkEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionAction {
    Continue,
    Terminate { exit_code: i32 },
}

/// Maps link events to session actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LifecyclePolicy {
    pub on_connect_failed: SessionAction,
    pub on_peer_closed: SessionAction,
    pub on_transport_error: SessionAction,
    pub on_disconnect: SessionAction,
}

impl Default for LifecyclePolicy {
    fn default() -> Self {
        Self::fail_fast()
    }
}

impl LifecyclePolicy {
    /// Production policy: once the simulator is gone there is nothing for
    /// the firmware to do, so the session ends.
    pub fn fail_fast() -> Self {
        Self {
            on_connect_failed: SessionAction::Continue,
            on_peer_closed: SessionAction::Terminate { exit_code: 0 },
            on_transport_error: SessionAction::Terminate { exit_code: 1 },
            on_disconnect: SessionAction::Continue,
        }
    }

    /// Test policy: link loss is observed but never ends the session.
    pub fn lenient() -> Self {
        Self {
            on_connect_failed: SessionAction::Continue,
            on_peer_closed: SessionAction::Continue,
            on_transport_error: SessionAction::Continue,
            on_disconnect: SessionAction::Continue,
        }
    }

    pub fn decide(&self, event: &LinkEvent) -> SessionAction {
        match event {
            LinkEvent::Connected { .. } => SessionAction::Continue,
            LinkEvent::ConnectFailed { .. } => self.on_connect_failed,
            LinkEvent::Lost {
                reason: FailureReason::PeerClosed,
            } => self.on_peer_closed,
            LinkEvent::Lost { .. } => self.on_transport_error,
            LinkEvent::Disconnected => self.on_disconnect,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lost(reason: FailureReason) -> LinkEvent {
        LinkEvent::Lost { reason }
    }

    #[test]
    fn fail_fast_terminates_on_peer_close() {
        let policy = LifecyclePolicy::fail_fast();
        assert_eq!(
            policy.decide(&lost(FailureReason::PeerClosed)),
            SessionAction::Terminate { exit_code: 0 }
        );
    }

    #[test]
    fn fail_fast_terminates_on_transport_error() {
        let policy = LifecyclePolicy::fail_fast();
        for reason in [FailureReason::SendError, FailureReason::ReceiveError] {
            assert_eq!(
                policy.decide(&lost(reason)),
                SessionAction::Terminate { exit_code: 1 }
            );
        }
    }

    #[test]
    fn fail_fast_survives_explicit_disconnect_and_connect_failure() {
        let policy = LifecyclePolicy::fail_fast();
        assert_eq!(policy.decide(&LinkEvent::Disconnected), SessionAction::Continue);
        assert_eq!(
            policy.decide(&LinkEvent::ConnectFailed {
                reason: FailureReason::Unresolvable
            }),
            SessionAction::Continue
        );
    }

    #[test]
    fn lenient_never_terminates() {
        let policy = LifecyclePolicy::lenient();
        let events = [
            LinkEvent::Connected {
                host: "localhost".to_string(),
                port: 5555,
            },
            LinkEvent::ConnectFailed {
                reason: FailureReason::RetriesExhausted,
            },
            lost(FailureReason::PeerClosed),
            lost(FailureReason::SendError),
            LinkEvent::Disconnected,
        ];
        for event in &events {
            assert_eq!(policy.decide(event), SessionAction::Continue);
        }
    }

    #[test]
    fn default_is_fail_fast() {
        assert_eq!(LifecyclePolicy::default(), LifecyclePolicy::fail_fast());
    }
}
