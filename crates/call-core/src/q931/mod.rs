//! H.225 call signaling of a call
//!
//! [`builder`] produces the Q.931 messages this endpoint sends, with their
//! H.225 user-user part. [`handler`] applies received ones. Both work on
//! the [`Call`](crate::call::Call) and leave framed output in its outbox.

pub mod builder;
pub mod handler;

use crate::call::{CallDirection, CallState};

/// Q.931 call state value reported in a Status message
pub fn q931_call_state(state: CallState, direction: CallDirection) -> u8 {
    match state {
        CallState::Created => 0,
        CallState::WaitingAdmission => 1,
        CallState::Connecting => match direction {
            CallDirection::Outgoing => 3,
            CallDirection::Incoming => 7,
        },
        CallState::Connected | CallState::Paused => 10,
        CallState::Clear | CallState::ClearReleaseRecvd | CallState::ClearReleaseSent => 19,
        CallState::Cleared | CallState::Removed => 0,
    }
}
