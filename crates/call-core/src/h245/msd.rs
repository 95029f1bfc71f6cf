//! Master/slave determination

use h323_wire_core::h245::message::{H245Message, MsdDecision};
use rand::Rng;
use tracing::{debug, info, warn};

use crate::call::{Call, MasterSlaveState};
use crate::cause::CallClearReason;
use crate::error::Result;
use crate::timer::TimerKind;

/// Largest status determination number
pub const MAX_SDN: u32 = 16_777_215;
/// Attempts before a call with a stuck determination is cleared
pub const MAX_MSD_RETRIES: u32 = 3;

const MODULO: u32 = 0x00FF_FFFF;
const HALF: u32 = 0x0080_0000;

/// Outcome of comparing two determination requests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MsdOutcome {
    Master,
    Slave,
    /// Identical numbers, nothing decided
    Indeterminate,
}

/// Decide our role from both terminal types and determination numbers
pub fn determine(local_type: u8, local_sdn: u32, remote_type: u8, remote_sdn: u32) -> MsdOutcome {
    if local_type != remote_type {
        return if local_type > remote_type { MsdOutcome::Master } else { MsdOutcome::Slave };
    }
    let diff = remote_sdn.wrapping_sub(local_sdn) & MODULO;
    match diff {
        0 | HALF => MsdOutcome::Indeterminate,
        d if d < HALF => MsdOutcome::Master,
        _ => MsdOutcome::Slave,
    }
}

/// Fresh status determination number
pub fn random_sdn() -> u32 {
    rand::thread_rng().gen_range(0..=MAX_SDN)
}

fn opposite(decision: MsdDecision) -> MsdDecision {
    match decision {
        MsdDecision::Master => MsdDecision::Slave,
        MsdDecision::Slave => MsdDecision::Master,
    }
}

impl Call {
    pub(crate) fn send_msd(&mut self) -> Result<()> {
        let msg = H245Message::MasterSlaveDetermination {
            terminal_type: self.ctx.defaults.terminal_type,
            status_determination_number: self.msd.status_determination_number,
        };
        self.send_h245(msg)?;
        self.msd.state = MasterSlaveState::DetermineSent;
        self.start_timer(TimerKind::MsdResponse);
        debug!(parent: self.span(), sdn = self.msd.status_determination_number, "master/slave determination sent");
        Ok(())
    }

    pub(super) fn on_msd(&mut self, remote_type: u8, remote_sdn: u32) -> Result<()> {
        self.timers.delete(TimerKind::MsdResponse);

        let outcome = if self.flags.try_be_master && self.msd.state == MasterSlaveState::Idle {
            MsdOutcome::Master
        } else {
            determine(
                self.ctx.defaults.terminal_type,
                self.msd.status_determination_number,
                remote_type,
                remote_sdn,
            )
        };

        let ours = match outcome {
            MsdOutcome::Master => MsdDecision::Master,
            MsdOutcome::Slave => MsdDecision::Slave,
            MsdOutcome::Indeterminate => {
                warn!(parent: self.span(), "identical determination numbers, rejecting");
                self.msd.status_determination_number = random_sdn();
                return self.send_h245(H245Message::MasterSlaveDeterminationReject);
            }
        };
        self.send_h245(H245Message::MasterSlaveDeterminationAck { decision: opposite(ours) })?;
        self.settle_msd(ours)
    }

    pub(super) fn on_msd_ack(&mut self, decision: MsdDecision) -> Result<()> {
        self.timers.delete(TimerKind::MsdResponse);
        match self.msd.state {
            MasterSlaveState::DetermineSent => {
                self.msd.state = MasterSlaveState::AckReceived;
                self.send_h245(H245Message::MasterSlaveDeterminationAck { decision: opposite(decision) })?;
                self.settle_msd(decision)
            }
            MasterSlaveState::Master | MasterSlaveState::Slave => {
                debug!(parent: self.span(), "determination acknowledged");
                Ok(())
            }
            state => {
                debug!(parent: self.span(), ?state, "unexpected determination ack");
                Ok(())
            }
        }
    }

    pub(super) fn on_msd_reject(&mut self) -> Result<()> {
        self.timers.delete(TimerKind::MsdResponse);
        self.msd.state = MasterSlaveState::Idle;
        self.msd.status_determination_number = random_sdn();
        self.msd.retries += 1;
        if self.msd.retries >= MAX_MSD_RETRIES {
            warn!(parent: self.span(), retries = self.msd.retries, "master/slave determination failed");
            self.mark_for_clearing(CallClearReason::LocalCleared, None);
            return Ok(());
        }
        self.send_msd()
    }

    fn settle_msd(&mut self, decision: MsdDecision) -> Result<()> {
        self.msd.state = match decision {
            MsdDecision::Master => MasterSlaveState::Master,
            MsdDecision::Slave => MasterSlaveState::Slave,
        };
        info!(parent: self.span(), role = ?decision, "master/slave determined");
        self.check_negotiation_complete()
    }
}
