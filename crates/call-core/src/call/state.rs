//! The four state axes of a call

use std::fmt;

use serde::{Deserialize, Serialize};

/// Main call state
///
/// The main chain runs `Created → WaitingAdmission → Connecting →
/// Connected ⇄ Paused`. Clearing runs `Clear → ClearReleaseRecvd |
/// ClearReleaseSent → Cleared → Removed` and never goes back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum CallState {
    Created,
    WaitingAdmission,
    Connecting,
    Connected,
    Paused,
    Clear,
    ClearReleaseRecvd,
    ClearReleaseSent,
    Cleared,
    Removed,
}

impl CallState {
    pub fn is_clearing(&self) -> bool {
        *self >= CallState::Clear
    }

    /// Whether `next` may follow `self`
    pub fn can_transition_to(&self, next: CallState) -> bool {
        use CallState::*;
        if *self == next {
            return true;
        }
        match (*self, next) {
            (Removed, _) => false,
            (Paused, Connected) => true,
            (Clear, ClearReleaseRecvd | ClearReleaseSent) => true,
            (ClearReleaseRecvd | ClearReleaseSent, Cleared | Removed) => true,
            (ClearReleaseRecvd, ClearReleaseSent) | (ClearReleaseSent, ClearReleaseRecvd) => false,
            (from, to) if from.is_clearing() => to > from,
            (_, to) => to > *self,
        }
    }
}

impl fmt::Display for CallState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CallState::Created => "created",
            CallState::WaitingAdmission => "waiting-admission",
            CallState::Connecting => "connecting",
            CallState::Connected => "connected",
            CallState::Paused => "paused",
            CallState::Clear => "clear",
            CallState::ClearReleaseRecvd => "clear-release-received",
            CallState::ClearReleaseSent => "clear-release-sent",
            CallState::Cleared => "cleared",
            CallState::Removed => "removed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum H245SessionState {
    Idle,
    Paused,
    Active,
    EndSent,
    EndRecvd,
    Closed,
}

impl H245SessionState {
    pub fn is_open(&self) -> bool {
        matches!(self, H245SessionState::Active | H245SessionState::Paused)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MasterSlaveState {
    Idle,
    DetermineSent,
    AckReceived,
    Master,
    Slave,
}

impl MasterSlaveState {
    pub fn is_decided(&self) -> bool {
        matches!(self, MasterSlaveState::Master | MasterSlaveState::Slave)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LocalTcsState {
    Idle,
    SetSent,
    SetAckReceived,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RemoteTcsState {
    Idle,
    SetReceived,
    SetAckSent,
}

/// One-shot and feature flags of a call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallFlags {
    pub fast_start: bool,
    pub tunneling: bool,
    pub media_wait_for_connect: bool,
    pub manual_ringback: bool,
    pub auto_answer: bool,
    pub try_be_master: bool,
    /// EndSessionCommand already built
    pub end_session_built: bool,
    /// ReleaseComplete already built
    pub release_built: bool,
    /// A fast-start answer has been received or sent
    pub fast_start_answered: bool,
    pub h245_connected: bool,
    pub alerting_sent: bool,
    pub connect_sent: bool,
    pub t38: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const ALL: [CallState; 10] = [
        CallState::Created,
        CallState::WaitingAdmission,
        CallState::Connecting,
        CallState::Connected,
        CallState::Paused,
        CallState::Clear,
        CallState::ClearReleaseRecvd,
        CallState::ClearReleaseSent,
        CallState::Cleared,
        CallState::Removed,
    ];

    #[test]
    fn test_main_chain() {
        assert!(CallState::Created.can_transition_to(CallState::WaitingAdmission));
        assert!(CallState::Connected.can_transition_to(CallState::Paused));
        assert!(CallState::Paused.can_transition_to(CallState::Connected));
        assert!(!CallState::Connected.can_transition_to(CallState::Connecting));
        assert!(CallState::Created.can_transition_to(CallState::Clear));
    }

    #[test]
    fn test_clearing_chain() {
        assert!(CallState::Clear.can_transition_to(CallState::ClearReleaseSent));
        assert!(CallState::ClearReleaseSent.can_transition_to(CallState::Cleared));
        assert!(!CallState::ClearReleaseSent.can_transition_to(CallState::ClearReleaseRecvd));
        assert!(!CallState::Removed.can_transition_to(CallState::Cleared));
    }

    proptest! {
        #[test]
        fn clearing_never_returns_to_main_chain(path in proptest::collection::vec(0usize..10, 1..20)) {
            let mut state = CallState::Clear;
            for idx in path {
                let next = ALL[idx];
                if state.can_transition_to(next) {
                    state = next;
                }
                prop_assert!(state.is_clearing());
            }
        }
    }
}
