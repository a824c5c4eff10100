// Copyright 2025 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! The single-threaded event loop: multiplexes the signal descriptor and the
//! two stream descriptors, drives the ring buffers, orchestrates the
//! target/waiter/killer lifecycle, and performs the throttled + final
//! persistence.

use std::ffi::OsStr;
use std::ffi::OsString;
use std::os::fd::AsFd;
use std::os::fd::AsRawFd;
use std::os::fd::OwnedFd;
use std::path::PathBuf;
use std::time::Duration;

use base::poll::PollSet;
use base::poll::Revents;
use base::process::Pid;
use base::process::Stdio;
use base::signal::SignalEvent;
use base::signal::SignalSource;
use base::time::monotonic_now;
use base::time::MonotonicTime;

use crate::persist;
use crate::state::SupervisorState;
use crate::state::TargetExitAction;
use crate::status::StreamStatus;
use crate::stream::StdioStream;
use crate::stream::DEFAULT_CHANNEL_CAPACITY;

/// How often a dirty stream is flushed to disk while the target is still
/// producing output.
pub const FLUSH_INTERVAL_MS: i64 = 500;

pub struct EventLoopConfig {
    pub out_dir: PathBuf,
    pub waiter_exec: OsString,
    pub waiter_context: OsString,
    pub target_pid: Pid,
    pub stdout_fd: Option<OwnedFd>,
    pub stderr_fd: Option<OwnedFd>,
    pub capture_disabled: bool,
}

/// Runs the event loop to completion and returns the target's exit status
/// (or the supervisor's last-known fallback, `1`, if the target never
/// reported one).
pub fn run(signal: SignalSource, config: EventLoopConfig) -> i32 {
    let EventLoopConfig {
        out_dir,
        waiter_exec,
        waiter_context,
        target_pid,
        mut stdout_fd,
        mut stderr_fd,
        capture_disabled,
    } = config;

    let (stdout_stream, stderr_stream) = if capture_disabled {
        (None, None)
    } else {
        (
            Some(new_stdio_stream("stdout.txt")),
            Some(new_stdio_stream("stderr.txt")),
        )
    };

    let mut state = SupervisorState::new(
        out_dir,
        vec![waiter_exec.clone()],
        target_pid,
        stdout_stream,
        stderr_stream,
    );

    while !state.is_exiting() {
        let timeout = compute_poll_timeout(&state, capture_disabled);
        let poll_set = PollSet::new(
            signal.as_raw_fd(),
            stdout_fd.as_ref().map(|fd| fd.as_raw_fd()),
            stderr_fd.as_ref().map(|fd| fd.as_raw_fd()),
        );

        match poll_set.wait(timeout) {
            Ok(outcome) => {
                if !capture_disabled {
                    process_stream_event(&mut state.stdout, &mut stdout_fd, outcome.stdout);
                    process_stream_event(&mut state.stderr, &mut stderr_fd, outcome.stderr);
                }
                process_signal_events(&mut state, &signal, &waiter_context, outcome.signal);

                if !capture_disabled {
                    let now = monotonic_now();
                    maybe_flush(&mut state, Some(now));
                }
            }
            Err(e) => {
                log::error!("poll() failed: {e}");
                break;
            }
        }
    }

    persist::write_status(&state.out_dir, state.target_exit);
    if !capture_disabled {
        maybe_flush(&mut state, None);
    }

    state.target_exit
}

fn new_stdio_stream(file_name: &'static str) -> StdioStream {
    StdioStream::new(file_name, DEFAULT_CHANNEL_CAPACITY, DEFAULT_CHANNEL_CAPACITY)
        .expect("DEFAULT_CHANNEL_CAPACITY is non-zero")
}

/// Blocks indefinitely when capture is disabled, otherwise waits only as
/// long as the most urgent dirty stream allows.
fn compute_poll_timeout(state: &SupervisorState, capture_disabled: bool) -> Option<Duration> {
    if capture_disabled {
        return None;
    }

    let now = monotonic_now();
    let ms_stdout = millis_until_flush(&state.stdout, now);
    let ms_stderr = millis_until_flush(&state.stderr, now);
    let ms = ms_stdout.min(ms_stderr).clamp(0, i32::MAX as i64);
    Some(Duration::from_millis(ms as u64))
}

fn millis_until_flush(stream: &Option<StdioStream>, now: MonotonicTime) -> i64 {
    stream
        .as_ref()
        .map(|s| s.millis_until_flush(now, FLUSH_INTERVAL_MS))
        .unwrap_or(i64::MAX)
}

fn maybe_flush(state: &mut SupervisorState, now: Option<MonotonicTime>) {
    if let Some(stream) = state.stdout.as_mut() {
        maybe_flush_one(&state.out_dir, stream, now);
    }
    if let Some(stream) = state.stderr.as_mut() {
        maybe_flush_one(&state.out_dir, stream, now);
    }
}

fn maybe_flush_one(out_dir: &std::path::Path, stream: &mut StdioStream, now: Option<MonotonicTime>) {
    let should_flush = match now {
        None => stream.is_dirty(),
        Some(now) => stream.is_dirty() && stream.millis_until_flush(now, FLUSH_INTERVAL_MS) <= 0,
    };
    if should_flush {
        persist::flush_stream(out_dir, stream);
        stream.mark_flushed(now);
    }
}

/// Disables the descriptor (by dropping its `OwnedFd`, which closes it and
/// leaves the poll slot `None` thereafter) on a fatal error, EOF, or
/// hangup.
fn process_stream_event(
    stream: &mut Option<StdioStream>,
    fd: &mut Option<OwnedFd>,
    revents: Revents,
) {
    let (Some(stream), Some(owned_fd)) = (stream.as_mut(), fd.as_ref()) else {
        return;
    };

    let mut disable = revents.err || revents.nval;

    if revents.readable {
        match stream.append_from_fd(owned_fd.as_fd()) {
            StreamStatus::Eof => disable = true,
            StreamStatus::Error(e) => {
                if !matches!(e.raw_os_error(), Some(libc::EINTR) | Some(libc::EAGAIN)) {
                    disable = true;
                }
            }
            StreamStatus::Alive => {}
        }
    } else if revents.hup {
        disable = true;
    }

    if disable {
        *fd = None;
    }
}

fn process_signal_events(
    state: &mut SupervisorState,
    signal: &SignalSource,
    waiter_context: &OsStr,
    revents: Revents,
) {
    if revents.err || revents.nval {
        log::error!("[FATAL] error on the signal descriptor. Killing the target and exiting.");
        if let Some(pid) = state.child.target_pid() {
            let _ = base::signal::terminate(pid);
        }
        state.force_exit();
        return;
    }

    if !revents.readable {
        return;
    }

    match signal.read_one() {
        Ok(Some(event)) => dispatch_signal(state, event, waiter_context),
        Ok(None) => {}
        Err(e) => {
            log::error!("[FATAL] error reading from the signal descriptor: {e}");
            state.force_exit();
        }
    }
}

fn dispatch_signal(state: &mut SupervisorState, event: SignalEvent, waiter_context: &OsStr) {
    match event.signo {
        libc::SIGTERM => on_sigterm_received(state, waiter_context),
        libc::SIGCHLD => on_sigchld_received(state, event, waiter_context),
        other => log::warn!("unexpected signal ({other}) received"),
    }
}

fn on_sigterm_received(state: &mut SupervisorState, waiter_context: &OsStr) {
    if let Some(pid) = state.request_termination() {
        log::info!("received SIGTERM, forwarding it to the target");
        match base::signal::terminate(pid) {
            Ok(()) => log::info!("SIGTERM delivered to the target"),
            Err(e) => log::warn!("kill() failed on the target: {e}"),
        }
    }

    if state.needs_killer_spawn() {
        log::info!("running the killer to force the waiter to exit");
        let result = spawn_cleanup_helper(&state.waiter_cmd, waiter_context, "--kill");
        state.record_killer_spawn(result);
    }
}

fn on_sigchld_received(state: &mut SupervisorState, event: SignalEvent, waiter_context: &OsStr) {
    // We still have to reap to avoid a zombie process.
    base::process::reap_any_exited();

    let Some(pid) = event.pid else {
        return;
    };

    if state.child.target_pid() == Some(pid) {
        let status = event.status.unwrap_or(1);
        log::info!("the target process exited with status {status}");

        if state.on_target_exited(status) == TargetExitAction::SpawnWaiter {
            log::info!("running the waiter to wait for background processes to finish");
            let result = spawn_cleanup_helper(&state.waiter_cmd, waiter_context, "--wait");
            state.record_waiter_spawn(result);
        }
    } else if state.child.waiter_pid() == Some(pid) {
        let status = event.status.unwrap_or(0);
        log::info!("the waiter process exited with status {status}");
        state.on_waiter_exited();
    }
}

fn spawn_cleanup_helper(waiter_cmd: &[OsString], waiter_context: &OsStr, flag: &str) -> Result<Pid, ()> {
    let mut argv = waiter_cmd.to_vec();
    argv.push(OsString::from(flag));
    match base::process::spawn(
        &argv,
        &[("WAITER_CONTEXT", waiter_context)],
        Stdio::Default,
        Stdio::Default,
        Stdio::Default,
        None,
    ) {
        Ok(child) => Ok(child.pid()),
        Err(e) => {
            log::error!("failed to start the cleanup helper ({flag}): {e}");
            Err(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn poll_timeout_is_unbounded_when_capture_is_disabled() {
        let state = SupervisorState::new(PathBuf::from("/tmp"), vec![], 1, None, None);
        assert_eq!(compute_poll_timeout(&state, true), None);
    }

    #[test]
    fn poll_timeout_is_zero_for_a_never_flushed_dirty_stream() {
        let stdout = StdioStream::new("stdout.txt", 16, 16).unwrap();
        let mut state = SupervisorState::new(PathBuf::from("/tmp"), vec![], 1, Some(stdout), None);
        // Simulate a POLLIN read outcome without a real fd: that's the only
        // thing that sets `dirty`, so flip it directly here.
        state.stdout.as_mut().unwrap().mark_dirty_for_test();
        let now = monotonic_now();
        assert_eq!(millis_until_flush(&state.stdout, now), 0);
    }

    #[test]
    fn poll_timeout_is_unbounded_for_a_clean_stream() {
        let stdout = StdioStream::new("stdout.txt", 16, 16).unwrap();
        let state = SupervisorState::new(PathBuf::from("/tmp"), vec![], 1, Some(stdout), None);
        let now = monotonic_now();
        assert_eq!(millis_until_flush(&state.stdout, now), i64::MAX);
    }

    #[test]
    fn maybe_flush_one_skips_a_clean_stream() {
        let dir = tempfile::tempdir().unwrap();
        let mut stream = StdioStream::new("stdout.txt", 16, 16).unwrap();
        maybe_flush_one(dir.path(), &mut stream, Some(monotonic_now()));
        assert!(!dir.path().join("stdout.txt").exists());
    }
}
