//! Q.931 cause values and H.225 release-complete reasons

use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! cause_values {
    ($($name:ident = $value:expr),+ $(,)?) => {
        /// Q.931 cause value carried in the Cause information element
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum Q931Cause {
            $($name,)+
            /// A value this stack has no name for
            Other(u8),
        }

        impl Q931Cause {
            /// The 7-bit cause value
            pub fn value(&self) -> u8 {
                match self {
                    $(Q931Cause::$name => $value,)+
                    Q931Cause::Other(v) => *v & 0x7f,
                }
            }
        }

        impl From<u8> for Q931Cause {
            fn from(value: u8) -> Self {
                match value & 0x7f {
                    $($value => Q931Cause::$name,)+
                    other => Q931Cause::Other(other),
                }
            }
        }
    };
}

cause_values! {
    ErrorInCauseIe = 0x00,
    UnallocatedNumber = 0x01,
    NoRouteToNetwork = 0x02,
    NoRouteToDestination = 0x03,
    ChannelUnacceptable = 0x06,
    NormalCallClearing = 0x10,
    UserBusy = 0x11,
    NoResponse = 0x12,
    NoAnswer = 0x13,
    SubscriberAbsent = 0x14,
    CallRejected = 0x15,
    NumberChanged = 0x16,
    Redirection = 0x17,
    DestinationOutOfOrder = 0x1b,
    InvalidNumberFormat = 0x1c,
    StatusEnquiryResponse = 0x1e,
    NormalUnspecified = 0x1f,
    NoCircuitChannelAvailable = 0x22,
    NetworkOutOfOrder = 0x26,
    TemporaryFailure = 0x29,
    Congestion = 0x2a,
    RequestedCircuitUnavailable = 0x2c,
    ResourcesUnavailable = 0x2f,
    InvalidCallReference = 0x51,
    IncompatibleDestination = 0x58,
    RecoveryOnTimerExpiry = 0x66,
    ProtocolErrorUnspecified = 0x6f,
}

impl fmt::Display for Q931Cause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Q931Cause::Other(v) => write!(f, "cause {}", v),
            named => write!(f, "{:?} ({})", named, named.value()),
        }
    }
}

/// H.225 ReleaseCompleteReason, numbered by its choice index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum ReleaseCompleteReason {
    NoBandwidth = 0,
    GatekeeperResources = 1,
    UnreachableDestination = 2,
    DestinationRejection = 3,
    InvalidRevision = 4,
    NoPermission = 5,
    UnreachableGatekeeper = 6,
    GatewayResources = 7,
    BadFormatAddress = 8,
    AdaptiveBusy = 9,
    InConf = 10,
    UndefinedReason = 11,
    FacilityCallDeflection = 12,
    SecurityDenied = 13,
    CalledPartyNotRegistered = 14,
    CallerNotRegistered = 15,
    NewConnectionNeeded = 16,
    NonStandardReason = 17,
    ReplaceWithConferenceInvite = 18,
    GenericDataReason = 19,
    NeededFeatureNotSupported = 20,
    TunnelledSignallingRejected = 21,
    InvalidCid = 22,
    SecurityError = 23,
    HopCountExceeded = 24,
}

impl ReleaseCompleteReason {
    pub const ALL: [ReleaseCompleteReason; 25] = [
        Self::NoBandwidth,
        Self::GatekeeperResources,
        Self::UnreachableDestination,
        Self::DestinationRejection,
        Self::InvalidRevision,
        Self::NoPermission,
        Self::UnreachableGatekeeper,
        Self::GatewayResources,
        Self::BadFormatAddress,
        Self::AdaptiveBusy,
        Self::InConf,
        Self::UndefinedReason,
        Self::FacilityCallDeflection,
        Self::SecurityDenied,
        Self::CalledPartyNotRegistered,
        Self::CallerNotRegistered,
        Self::NewConnectionNeeded,
        Self::NonStandardReason,
        Self::ReplaceWithConferenceInvite,
        Self::GenericDataReason,
        Self::NeededFeatureNotSupported,
        Self::TunnelledSignallingRejected,
        Self::InvalidCid,
        Self::SecurityError,
        Self::HopCountExceeded,
    ];

    pub fn index(&self) -> u8 {
        *self as u8
    }
}

impl From<u8> for ReleaseCompleteReason {
    fn from(value: u8) -> Self {
        Self::ALL
            .get(value as usize)
            .copied()
            .unwrap_or(ReleaseCompleteReason::UndefinedReason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cause_roundtrip_named() {
        assert_eq!(Q931Cause::from(0x10), Q931Cause::NormalCallClearing);
        assert_eq!(Q931Cause::NormalCallClearing.value(), 16);
        assert_eq!(Q931Cause::from(0x90), Q931Cause::NormalCallClearing);
    }

    #[test]
    fn test_cause_other_preserved() {
        let cause = Q931Cause::from(0x3a);
        assert_eq!(cause, Q931Cause::Other(0x3a));
        assert_eq!(cause.value(), 0x3a);
    }

    #[test]
    fn test_release_reason_index() {
        for (i, reason) in ReleaseCompleteReason::ALL.iter().enumerate() {
            assert_eq!(reason.index() as usize, i);
            assert_eq!(ReleaseCompleteReason::from(i as u8), *reason);
        }
        assert_eq!(ReleaseCompleteReason::from(200), ReleaseCompleteReason::UndefinedReason);
    }
}
