// Copyright 2025 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! The target/waiter/killer lifecycle, as a tagged variant rather than three
//! parallel `Option<pid>` fields -- invariants like "a waiter only runs once
//! the target is gone" and "a killer only runs once a waiter is running"
//! hold by construction instead of needing to be checked.
//!
//! This module is deliberately free of any `poll`/`signalfd`/`spawn` call:
//! the event loop decides *when* to spawn the waiter or killer and hands
//! the (already-obtained) result back in, which keeps the transitions here
//! plain data, directly testable without a real child process.

use std::ffi::OsString;
use std::path::PathBuf;

use base::process::Pid;

use crate::stream::StdioStream;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildState {
    RunningTarget { target_pid: Pid },
    WaitingForCleanup { waiter_pid: Pid },
    KillingCleanup { waiter_pid: Pid, killer_pid: Pid },
    Exiting,
}

impl ChildState {
    pub fn target_pid(&self) -> Option<Pid> {
        match self {
            ChildState::RunningTarget { target_pid } => Some(*target_pid),
            _ => None,
        }
    }

    pub fn waiter_pid(&self) -> Option<Pid> {
        match self {
            ChildState::WaitingForCleanup { waiter_pid }
            | ChildState::KillingCleanup { waiter_pid, .. } => Some(*waiter_pid),
            _ => None,
        }
    }

    pub fn killer_pid(&self) -> Option<Pid> {
        match self {
            ChildState::KillingCleanup { killer_pid, .. } => Some(*killer_pid),
            _ => None,
        }
    }
}

/// What the event loop should do after `SupervisorState::on_target_exited`.
#[derive(Debug, PartialEq, Eq)]
pub enum TargetExitAction {
    /// Termination was already requested; no waiter is needed.
    None,
    /// Spawn the waiter (`[WAITER_EXEC, "--wait"]`) and report the result
    /// back via `record_waiter_spawn`.
    SpawnWaiter,
}

pub struct SupervisorState {
    pub out_dir: PathBuf,
    pub waiter_cmd: Vec<OsString>,
    pub target_exit: i32,
    pub termination_requested: bool,
    pub child: ChildState,
    pub stdout: Option<StdioStream>,
    pub stderr: Option<StdioStream>,
}

impl SupervisorState {
    pub fn new(
        out_dir: PathBuf,
        waiter_cmd: Vec<OsString>,
        target_pid: Pid,
        stdout: Option<StdioStream>,
        stderr: Option<StdioStream>,
    ) -> SupervisorState {
        SupervisorState {
            out_dir,
            waiter_cmd,
            // A generic error until the target's real status is known.
            target_exit: 1,
            termination_requested: false,
            child: ChildState::RunningTarget { target_pid },
            stdout,
            stderr,
        }
    }

    pub fn is_exiting(&self) -> bool {
        matches!(self.child, ChildState::Exiting)
    }

    /// Unconditionally advances to `Exiting`, for the two "stop everything
    /// now" error paths: a signal-descriptor fatal error, and a failed read
    /// from it.
    pub fn force_exit(&mut self) {
        self.child = ChildState::Exiting;
    }

    /// Records an external termination request. Returns the target's pid
    /// if it's still running, so the caller can forward the signal.
    /// Idempotent: calling this again while a killer is already in flight
    /// (a second termination request before the killer exits) changes
    /// nothing.
    pub fn request_termination(&mut self) -> Option<Pid> {
        self.termination_requested = true;
        self.child.target_pid()
    }

    /// True exactly when the waiter is running and no killer has been
    /// spawned yet -- the condition under which a termination request
    /// should spawn one.
    pub fn needs_killer_spawn(&self) -> bool {
        matches!(self.child, ChildState::WaitingForCleanup { .. })
    }

    pub fn record_killer_spawn(&mut self, result: Result<Pid, ()>) {
        if let ChildState::WaitingForCleanup { waiter_pid } = self.child {
            self.child = match result {
                Ok(killer_pid) => ChildState::KillingCleanup {
                    waiter_pid,
                    killer_pid,
                },
                Err(()) => ChildState::Exiting,
            };
        }
    }

    /// Records that the target exited with `exit_status`. Advances to
    /// `Exiting` directly if termination was already requested, otherwise
    /// asks the caller to spawn the waiter.
    pub fn on_target_exited(&mut self, exit_status: i32) -> TargetExitAction {
        self.target_exit = exit_status;
        if self.termination_requested {
            self.child = ChildState::Exiting;
            TargetExitAction::None
        } else {
            TargetExitAction::SpawnWaiter
        }
    }

    pub fn record_waiter_spawn(&mut self, result: Result<Pid, ()>) {
        self.child = match result {
            Ok(waiter_pid) => ChildState::WaitingForCleanup { waiter_pid },
            Err(()) => ChildState::Exiting,
        };
    }

    /// Records that the waiter exited. The killer, if any, is allowed to be
    /// reaped later without blocking shutdown.
    pub fn on_waiter_exited(&mut self) {
        if matches!(
            self.child,
            ChildState::WaitingForCleanup { .. } | ChildState::KillingCleanup { .. }
        ) {
            self.child = ChildState::Exiting;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_state(target_pid: Pid) -> SupervisorState {
        SupervisorState::new(PathBuf::from("/tmp"), vec![], target_pid, None, None)
    }

    #[test]
    fn signal_forwarding_skips_waiter_on_target_exit() {
        let mut state = new_state(100);
        assert_eq!(state.request_termination(), Some(100));
        assert!(state.termination_requested);

        let action = state.on_target_exited(0);
        assert_eq!(action, TargetExitAction::None);
        assert!(state.is_exiting());
        assert_eq!(state.target_exit, 0);
    }

    #[test]
    fn waiter_path_runs_to_completion() {
        let mut state = new_state(100);

        let action = state.on_target_exited(7);
        assert_eq!(action, TargetExitAction::SpawnWaiter);
        assert_eq!(state.target_exit, 7);
        assert!(!state.is_exiting());

        state.record_waiter_spawn(Ok(200));
        assert_eq!(state.child.waiter_pid(), Some(200));
        assert!(!state.is_exiting());

        state.on_waiter_exited();
        assert!(state.is_exiting());
        // The target's status, not the waiter's, is what gets persisted.
        assert_eq!(state.target_exit, 7);
    }

    #[test]
    fn late_termination_spawns_killer_once() {
        let mut state = new_state(100);
        state.on_target_exited(0);
        state.record_waiter_spawn(Ok(200));

        assert!(state.needs_killer_spawn());
        assert_eq!(state.request_termination(), None); // target already gone
        state.record_killer_spawn(Ok(300));
        assert_eq!(state.child.killer_pid(), Some(300));
        assert!(!state.needs_killer_spawn());

        // A second termination request leaves the killer untouched.
        assert_eq!(state.request_termination(), None);
        assert!(!state.needs_killer_spawn());
        assert_eq!(state.child.killer_pid(), Some(300));

        state.on_waiter_exited();
        assert!(state.is_exiting());
    }

    #[test]
    fn failed_waiter_spawn_goes_straight_to_exiting() {
        let mut state = new_state(100);
        state.on_target_exited(0);
        state.record_waiter_spawn(Err(()));
        assert!(state.is_exiting());
    }

    #[test]
    fn failed_killer_spawn_goes_straight_to_exiting() {
        let mut state = new_state(100);
        state.on_target_exited(0);
        state.record_waiter_spawn(Ok(200));
        state.record_killer_spawn(Err(()));
        assert!(state.is_exiting());
    }
}
