//! Per-call protocol timers
//!
//! A call only records which timers are live. The engine drains newly
//! started timers after each operation, sleeps on a task and calls back
//! into the call under its lock; a timer deleted in the meantime is
//! simply ignored when it fires.

use std::collections::HashMap;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    H245ConnectRetry,
    MsdResponse,
    TcsResponse,
    OpenLogicalChannel(u16),
    CloseLogicalChannel(u16),
    RequestChannelClose(u16),
    SessionEnd,
    Establishment,
}

/// A timer waiting to be scheduled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingTimer {
    pub id: u64,
    pub kind: TimerKind,
    pub after: Duration,
}

#[derive(Debug, Default)]
pub struct TimerList {
    next_id: u64,
    active: HashMap<u64, TimerKind>,
    pending: Vec<PendingTimer>,
}

impl TimerList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a timer; an existing one of the same kind is replaced
    pub fn start(&mut self, kind: TimerKind, after: Duration) -> u64 {
        self.delete(kind);
        self.next_id += 1;
        let id = self.next_id;
        self.active.insert(id, kind);
        self.pending.push(PendingTimer { id, kind, after });
        id
    }

    /// Delete the live timer of this kind, if any
    pub fn delete(&mut self, kind: TimerKind) -> bool {
        let ids: Vec<u64> = self
            .active
            .iter()
            .filter(|(_, k)| **k == kind)
            .map(|(id, _)| *id)
            .collect();
        for id in &ids {
            self.active.remove(id);
        }
        self.pending.retain(|p| p.kind != kind);
        !ids.is_empty()
    }

    /// Consume a fired timer; `None` if it was deleted meanwhile
    pub fn fire(&mut self, id: u64) -> Option<TimerKind> {
        self.active.remove(&id)
    }

    pub fn is_active(&self, kind: TimerKind) -> bool {
        self.active.values().any(|k| *k == kind)
    }

    pub fn take_pending(&mut self) -> Vec<PendingTimer> {
        std::mem::take(&mut self.pending)
    }

    pub fn clear(&mut self) {
        self.active.clear();
        self.pending.clear();
    }

    pub fn len(&self) -> usize {
        self.active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }
}
