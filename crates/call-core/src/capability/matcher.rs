//! Direction-aware capability compatibility

use h323_wire_core::h245::capability::{CapabilityDirection, MediaCapability};
use tracing::trace;

use super::{CapParams, CapabilityDescriptor};

/// Which of our directions a remote capability is checked against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchDirection {
    /// We receive what the peer transmits
    Receive,
    /// We transmit what the peer can receive
    Transmit,
}

impl From<MatchDirection> for CapabilityDirection {
    fn from(dir: MatchDirection) -> Self {
        match dir {
            MatchDirection::Receive => CapabilityDirection::Receive,
            MatchDirection::Transmit => CapabilityDirection::Transmit,
        }
    }
}

/// Check a local descriptor against one remote capability
///
/// On success returns a copy of `local` adjusted to the agreement and
/// restricted to `dir`. Frame counts are only ever clamped down and a
/// transmit MPI only ever raised.
pub fn check_compatible(
    local: &CapabilityDescriptor,
    remote: &MediaCapability,
    dir: MatchDirection,
) -> Option<CapabilityDescriptor> {
    if local.cap != remote.cap_type() {
        return None;
    }
    let allowed = match dir {
        MatchDirection::Receive => local.can_receive(),
        MatchDirection::Transmit => local.can_transmit(),
    };
    if !allowed {
        return None;
    }

    let params = match (&local.params, remote) {
        (
            CapParams::Simple { tx_frames, rx_frames, silence_suppression },
            MediaCapability::Audio { frames, .. },
        ) => {
            let (tx, rx) = adjust_frames(*tx_frames, *rx_frames, *frames, dir)?;
            CapParams::Simple { tx_frames: tx, rx_frames: rx, silence_suppression: *silence_suppression }
        }
        (CapParams::Gsm { tx_frames, rx_frames, comfort_noise, scrambled }, MediaCapability::Gsm { .. }) => {
            let frames = remote.frames()?;
            let (tx, rx) = adjust_frames(*tx_frames, *rx_frames, frames, dir)?;
            CapParams::Gsm {
                tx_frames: tx,
                rx_frames: rx,
                comfort_noise: *comfort_noise,
                scrambled: *scrambled,
            }
        }
        (
            CapParams::H263 { format, mpi, max_bitrate },
            MediaCapability::H263 { format: remote_format, mpi: remote_mpi, .. },
        ) => {
            if format != remote_format {
                trace!(local = ?format, remote = ?remote_format, "picture format mismatch");
                return None;
            }
            let mpi = match dir {
                MatchDirection::Receive if *remote_mpi < *mpi => {
                    trace!(local = mpi, remote = remote_mpi, "remote picture interval below ours");
                    return None;
                }
                MatchDirection::Receive => *mpi,
                MatchDirection::Transmit => (*mpi).max(*remote_mpi),
            };
            CapParams::H263 { format: *format, mpi, max_bitrate: *max_bitrate }
        }
        (CapParams::T38, MediaCapability::T38 { .. }) => CapParams::T38,
        _ => return None,
    };

    trace!(cap = %local.cap, ?dir, ?params, "capability compatible");
    Some(CapabilityDescriptor {
        cap: local.cap,
        direction: dir.into(),
        params,
        ops: local.ops.clone(),
    })
}

/// Returns the adjusted (tx, rx) pair
fn adjust_frames(tx: u32, rx: u32, remote: u32, dir: MatchDirection) -> Option<(u32, u32)> {
    match dir {
        MatchDirection::Receive => {
            if rx < remote {
                trace!(local_rx = rx, remote_tx = remote, "peer sends more frames than we accept");
                return None;
            }
            Some((tx, remote))
        }
        MatchDirection::Transmit => Some((tx.min(remote), rx)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use h323_wire_core::h245::capability::{CapType, PictureFormat};
    use proptest::prelude::*;

    fn ulaw(tx: u32, rx: u32) -> CapabilityDescriptor {
        CapabilityDescriptor::audio(CapType::G711Ulaw64k, tx, rx, CapabilityDirection::ReceiveAndTransmit)
    }

    fn remote_ulaw(frames: u32) -> MediaCapability {
        MediaCapability::Audio { cap: CapType::G711Ulaw64k, frames, silence_suppression: false }
    }

    #[test]
    fn test_transmit_reduced_to_peer_limit() {
        let joint = check_compatible(&ulaw(240, 240), &remote_ulaw(160), MatchDirection::Transmit).unwrap();
        assert_eq!(joint.params.tx_frames(), Some(160));
        assert_eq!(joint.direction, CapabilityDirection::Transmit);

        let joint = check_compatible(&ulaw(20, 240), &remote_ulaw(160), MatchDirection::Transmit).unwrap();
        assert_eq!(joint.params.tx_frames(), Some(20));
    }

    #[test]
    fn test_receive_requires_room() {
        assert!(check_compatible(&ulaw(20, 120), &remote_ulaw(160), MatchDirection::Receive).is_none());
        let joint = check_compatible(&ulaw(20, 240), &remote_ulaw(160), MatchDirection::Receive).unwrap();
        assert_eq!(joint.params.rx_frames(), Some(160));
    }

    #[test]
    fn test_codec_and_direction_must_match() {
        let alaw = MediaCapability::Audio { cap: CapType::G711Alaw64k, frames: 20, silence_suppression: false };
        assert!(check_compatible(&ulaw(20, 240), &alaw, MatchDirection::Transmit).is_none());

        let rx_only = CapabilityDescriptor::audio(CapType::G711Ulaw64k, 20, 240, CapabilityDirection::Receive);
        assert!(check_compatible(&rx_only, &remote_ulaw(160), MatchDirection::Transmit).is_none());
    }

    #[test]
    fn test_h263_rules() {
        let local = CapabilityDescriptor::h263(PictureFormat::Qcif, 2, 1920, CapabilityDirection::ReceiveAndTransmit);
        let remote = |format, mpi| MediaCapability::H263 { format, mpi, max_bitrate: 1920 };

        assert!(check_compatible(&local, &remote(PictureFormat::Cif, 2), MatchDirection::Receive).is_none());
        assert!(check_compatible(&local, &remote(PictureFormat::Qcif, 1), MatchDirection::Receive).is_none());
        assert!(check_compatible(&local, &remote(PictureFormat::Qcif, 3), MatchDirection::Receive).is_some());

        let joint = check_compatible(&local, &remote(PictureFormat::Qcif, 4), MatchDirection::Transmit).unwrap();
        assert!(matches!(joint.params, CapParams::H263 { mpi: 4, .. }));
        let joint = check_compatible(&local, &remote(PictureFormat::Qcif, 1), MatchDirection::Transmit).unwrap();
        assert!(matches!(joint.params, CapParams::H263 { mpi: 2, .. }));
    }

    #[test]
    fn test_t38_matches_by_tag() {
        let local = CapabilityDescriptor::t38(CapabilityDirection::ReceiveAndTransmit);
        let remote = MediaCapability::T38 { max_bitrate: 1 };
        assert!(check_compatible(&local, &remote, MatchDirection::Receive).is_some());
        assert!(check_compatible(&local, &remote, MatchDirection::Transmit).is_some());
    }

    proptest! {
        #[test]
        fn transmit_frames_never_increase(tx in 1u32..1000, rx in 1u32..1000, remote in 1u32..1000) {
            let local = ulaw(tx, rx);
            for dir in [MatchDirection::Receive, MatchDirection::Transmit] {
                if let Some(joint) = check_compatible(&local, &remote_ulaw(remote), dir) {
                    prop_assert!(joint.params.tx_frames().unwrap() <= tx);
                    prop_assert!(joint.params.rx_frames().unwrap() <= rx);
                }
            }
        }
    }
}
