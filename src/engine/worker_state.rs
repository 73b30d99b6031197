//! Per-partition worker state machine.
//!
//! Each owned partition runs one worker looping through
//! `Polling -> Delivering -> Checkpointing -> Polling`, with three terminal
//! states:
//! - `Stopped`: graceful exit (shutdown, shed by the balancer, handler
//!   abort, or run-window boundary)
//! - `LeaseLost`: another instance took the lease; the worker halted without
//!   checkpointing
//! - `Degraded`: the change source stayed unavailable past the retry budget

use std::fmt;

/// State of one partition worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum WorkerState {
    /// Worker spawned, lease held, loop not yet polling.
    #[default]
    Starting = 0,

    /// Requesting the next change batch from the source.
    Polling = 1,

    /// Handler invocation in flight.
    Delivering = 2,

    /// Persisting the advanced continuation token.
    Checkpointing = 3,

    /// Graceful terminal state.
    Stopped = 4,

    /// Involuntary terminal state: ownership moved to another instance.
    LeaseLost = 5,

    /// Terminal state: the change source stayed unavailable past the retry
    /// budget.
    Degraded = 6,
}

impl WorkerState {
    /// True once the worker has exited its loop.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            WorkerState::Stopped | WorkerState::LeaseLost | WorkerState::Degraded
        )
    }

    /// True while the worker still holds its partition.
    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }

    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            1 => WorkerState::Polling,
            2 => WorkerState::Delivering,
            3 => WorkerState::Checkpointing,
            4 => WorkerState::Stopped,
            5 => WorkerState::LeaseLost,
            6 => WorkerState::Degraded,
            _ => WorkerState::Starting,
        }
    }
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WorkerState::Starting => "starting",
            WorkerState::Polling => "polling",
            WorkerState::Delivering => "delivering",
            WorkerState::Checkpointing => "checkpointing",
            WorkerState::Stopped => "stopped",
            WorkerState::LeaseLost => "lease-lost",
            WorkerState::Degraded => "degraded",
        };
        f.write_str(name)
    }
}
