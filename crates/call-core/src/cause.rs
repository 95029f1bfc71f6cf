//! Call clear reasons and their Q.931 / H.225 wire form
//!
//! Every reason maps to a distinct (cause, release reason) pair, so a pair
//! produced by [`CallClearReason::to_wire`] always maps back to the same
//! reason. Pairs from other stacks fall back on the cause value, then on
//! the release reason, then on [`CallClearReason::Unknown`].

use std::fmt;

use h323_wire_core::{Q931Cause, ReleaseCompleteReason};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CallClearReason {
    Unknown,
    InvalidMessage,
    TransportFailure,
    NoRoute,
    NoUser,
    NoBandwidth,
    GkNoCalledUser,
    GkNoCallerUser,
    GkNoResources,
    GkUnreachable,
    GkCleared,
    NoCommonCapabilities,
    RemoteForwarded,
    LocalForwarded,
    RemoteCleared,
    LocalCleared,
    RemoteBusy,
    LocalBusy,
    RemoteNoAnswer,
    LocalNotAnswered,
    RemoteRejected,
    LocalRejected,
    RemoteCongested,
    LocalCongested,
}

use CallClearReason as R;
use Q931Cause as C;
use ReleaseCompleteReason as Rc;

const WIRE_TABLE: [(CallClearReason, Q931Cause, ReleaseCompleteReason); 24] = [
    (R::Unknown, C::NormalUnspecified, Rc::UndefinedReason),
    (R::InvalidMessage, C::ProtocolErrorUnspecified, Rc::UndefinedReason),
    (R::TransportFailure, C::TemporaryFailure, Rc::UndefinedReason),
    (R::NoRoute, C::NoRouteToDestination, Rc::UnreachableDestination),
    (R::NoUser, C::SubscriberAbsent, Rc::UndefinedReason),
    (R::NoBandwidth, C::ResourcesUnavailable, Rc::NoBandwidth),
    (R::GkNoCalledUser, C::SubscriberAbsent, Rc::CalledPartyNotRegistered),
    (R::GkNoCallerUser, C::SubscriberAbsent, Rc::CallerNotRegistered),
    (R::GkNoResources, C::Congestion, Rc::GatekeeperResources),
    (R::GkUnreachable, C::TemporaryFailure, Rc::UnreachableGatekeeper),
    (R::GkCleared, C::ResourcesUnavailable, Rc::GatekeeperResources),
    (R::NoCommonCapabilities, C::IncompatibleDestination, Rc::UndefinedReason),
    (R::RemoteForwarded, C::Redirection, Rc::FacilityCallDeflection),
    (R::LocalForwarded, C::Redirection, Rc::NonStandardReason),
    (R::RemoteCleared, C::NormalCallClearing, Rc::UndefinedReason),
    (R::LocalCleared, C::NormalCallClearing, Rc::NonStandardReason),
    (R::RemoteBusy, C::UserBusy, Rc::InConf),
    (R::LocalBusy, C::UserBusy, Rc::NonStandardReason),
    (R::RemoteNoAnswer, C::NoAnswer, Rc::UndefinedReason),
    (R::LocalNotAnswered, C::NoAnswer, Rc::NonStandardReason),
    (R::RemoteRejected, C::CallRejected, Rc::DestinationRejection),
    (R::LocalRejected, C::CallRejected, Rc::NonStandardReason),
    (R::RemoteCongested, C::Congestion, Rc::NoBandwidth),
    (R::LocalCongested, C::Congestion, Rc::NonStandardReason),
];

impl CallClearReason {
    pub const ALL: [CallClearReason; 24] = {
        let mut all = [R::Unknown; 24];
        let mut i = 0;
        while i < WIRE_TABLE.len() {
            all[i] = WIRE_TABLE[i].0;
            i += 1;
        }
        all
    };

    /// Cause value and release reason announcing this reason
    pub fn to_wire(self) -> (Q931Cause, ReleaseCompleteReason) {
        WIRE_TABLE
            .iter()
            .find(|(reason, _, _)| *reason == self)
            .map(|(_, cause, rc)| (*cause, *rc))
            .unwrap_or((C::NormalUnspecified, Rc::UndefinedReason))
    }

    /// Reason for a received cause value and release reason
    pub fn from_wire(cause: Option<Q931Cause>, reason: Option<ReleaseCompleteReason>) -> Self {
        if let (Some(c), Some(r)) = (cause, reason) {
            if let Some((found, _, _)) = WIRE_TABLE.iter().find(|(_, wc, wr)| *wc == c && *wr == r) {
                return *found;
            }
        }
        if let Some(found) = cause.and_then(from_cause) {
            return found;
        }
        reason.and_then(from_release_reason).unwrap_or(R::Unknown)
    }

    /// The same reason as reported by the other party
    ///
    /// A peer that cleared locally is, for us, a remote clearing.
    pub fn remote_view(self) -> Self {
        match self {
            R::LocalForwarded => R::RemoteForwarded,
            R::LocalCleared => R::RemoteCleared,
            R::LocalBusy => R::RemoteBusy,
            R::LocalNotAnswered => R::RemoteNoAnswer,
            R::LocalRejected => R::RemoteRejected,
            R::LocalCongested => R::RemoteCongested,
            other => other,
        }
    }
}

fn from_cause(cause: Q931Cause) -> Option<CallClearReason> {
    let reason = match cause.value() {
        0x10 => R::RemoteCleared,
        0x11 => R::RemoteBusy,
        0x12 | 0x13 => R::RemoteNoAnswer,
        0x15 => R::RemoteRejected,
        0x17 => R::RemoteForwarded,
        0x02 | 0x03 => R::NoRoute,
        0x01 | 0x14 | 0x16 => R::NoUser,
        0x22 | 0x2a | 0x2c => R::RemoteCongested,
        0x26 | 0x29 => R::TransportFailure,
        0x2f => R::NoBandwidth,
        0x58 => R::NoCommonCapabilities,
        0x51 | 0x6f => R::InvalidMessage,
        _ => return None,
    };
    Some(reason)
}

fn from_release_reason(reason: ReleaseCompleteReason) -> Option<CallClearReason> {
    let mapped = match reason {
        Rc::NoBandwidth => R::NoBandwidth,
        Rc::GatekeeperResources => R::GkNoResources,
        Rc::UnreachableDestination => R::NoRoute,
        Rc::DestinationRejection | Rc::SecurityDenied | Rc::NoPermission => R::RemoteRejected,
        Rc::UnreachableGatekeeper => R::GkUnreachable,
        Rc::InConf | Rc::AdaptiveBusy => R::RemoteBusy,
        Rc::CalledPartyNotRegistered => R::GkNoCalledUser,
        Rc::CallerNotRegistered => R::GkNoCallerUser,
        Rc::FacilityCallDeflection => R::RemoteForwarded,
        Rc::GatewayResources => R::RemoteCongested,
        _ => return None,
    };
    Some(mapped)
}

impl fmt::Display for CallClearReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            R::Unknown => "unknown reason",
            R::InvalidMessage => "invalid H.323 message",
            R::TransportFailure => "transport failure",
            R::NoRoute => "no route to destination",
            R::NoUser => "called user not found",
            R::NoBandwidth => "insufficient bandwidth",
            R::GkNoCalledUser => "called user not registered with gatekeeper",
            R::GkNoCallerUser => "caller not registered with gatekeeper",
            R::GkNoResources => "gatekeeper out of resources",
            R::GkUnreachable => "gatekeeper unreachable",
            R::GkCleared => "call cleared by gatekeeper",
            R::NoCommonCapabilities => "no common capabilities",
            R::RemoteForwarded => "call forwarded by remote",
            R::LocalForwarded => "call forwarded locally",
            R::RemoteCleared => "call cleared by remote",
            R::LocalCleared => "call cleared locally",
            R::RemoteBusy => "remote busy",
            R::LocalBusy => "local busy",
            R::RemoteNoAnswer => "remote did not answer",
            R::LocalNotAnswered => "local did not answer",
            R::RemoteRejected => "remote rejected",
            R::LocalRejected => "local rejected",
            R::RemoteCongested => "remote congested",
            R::LocalCongested => "local congested",
        };
        f.write_str(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::HashSet;

    #[test]
    fn test_pairs_are_distinct() {
        let pairs: HashSet<_> = CallClearReason::ALL.iter().map(|r| r.to_wire()).collect();
        assert_eq!(pairs.len(), CallClearReason::ALL.len());
    }

    #[test]
    fn test_foreign_pairs_fall_back() {
        assert_eq!(
            CallClearReason::from_wire(Some(Q931Cause::UserBusy), Some(Rc::UndefinedReason)),
            R::RemoteBusy
        );
        assert_eq!(
            CallClearReason::from_wire(Some(Q931Cause::NormalUnspecified), Some(Rc::CalledPartyNotRegistered)),
            R::GkNoCalledUser
        );
        assert_eq!(CallClearReason::from_wire(None, Some(Rc::InConf)), R::RemoteBusy);
        assert_eq!(CallClearReason::from_wire(Some(Q931Cause::Other(0x7f)), None), R::Unknown);
        assert_eq!(CallClearReason::from_wire(None, None), R::Unknown);
    }

    #[test]
    fn test_remote_view() {
        let (cause, reason) = R::LocalCleared.to_wire();
        assert_eq!(CallClearReason::from_wire(Some(cause), Some(reason)).remote_view(), R::RemoteCleared);
        assert_eq!(R::GkUnreachable.remote_view(), R::GkUnreachable);
    }

    proptest! {
        #[test]
        fn cause_mapping_round_trips(idx in 0usize..24) {
            let reason = CallClearReason::ALL[idx];
            let (cause, rc) = reason.to_wire();
            let back = CallClearReason::from_wire(Some(cause), Some(rc));
            prop_assert!(back == reason || back == R::Unknown);
        }

        #[test]
        fn from_wire_is_total(cause in 0u8..128, rc in 0usize..25) {
            // Never panics, whatever the peer sends
            let _ = CallClearReason::from_wire(Some(Q931Cause::from(cause)), Some(Rc::ALL[rc]));
        }
    }
}
