//! Last-known debuggee status
//!
//! Every status replaces the previous one outright; the emitted event
//! depends only on the new run-state. A `pausing` followed by another
//! `pausing` therefore reports `Continued` twice.

use crate::config::defaults::THREAD_ID;
use crate::events::{DebugEvent, StopReason};
use crate::protocol::{RunState, Status};

#[derive(Debug, Default)]
pub struct StatusMachine {
    current: Status,
}

impl StatusMachine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the held status and derive the event for it
    pub fn apply(&mut self, status: Status) -> DebugEvent {
        let event = event_for(status.runstate);
        self.current = status;
        event
    }

    pub fn current(&self) -> &Status {
        &self.current
    }

    pub fn run_state(&self) -> RunState {
        self.current.runstate
    }
}

fn event_for(runstate: RunState) -> DebugEvent {
    match runstate {
        RunState::Paused => DebugEvent::Stopped {
            reason: StopReason::Breakpoint,
            thread_id: THREAD_ID,
        },
        RunState::Stepping => DebugEvent::Stopped {
            reason: StopReason::Step,
            thread_id: THREAD_ID,
        },
        RunState::Running | RunState::Pausing => DebugEvent::Continued {
            thread_id: THREAD_ID,
        },
    }
}
