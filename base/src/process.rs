// Copyright 2025 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! The spawn/wait adapter: fork+exec with optional piped stdio, plus
//! non-blocking zombie reaping. Built on `std::process::Command` rather than
//! a hand-rolled `fork()`, using `pre_exec` to apply the saved signal mask
//! after fork, before exec.

use std::ffi::OsStr;
use std::os::unix::process::CommandExt;
use std::process::Child;
use std::process::Command;
use std::process::Stdio as StdStdio;

use crate::errno::Error;
use crate::errno::Result;
use crate::signal::SavedSigmask;

pub type Pid = libc::pid_t;

/// How a spawned process's stdio should be wired up. Mirrors the original's
/// `SpawnedProcessStdio`.
#[derive(Clone, Copy, PartialEq, Eq)]
pub enum Stdio {
    /// Inherit/do not redirect -- the spawned process gets its own stream.
    Default,
    /// Create a pipe; the parent-side end is handed back to the caller.
    Piped,
}

impl Stdio {
    fn to_std(self) -> StdStdio {
        match self {
            Stdio::Default => StdStdio::inherit(),
            Stdio::Piped => StdStdio::piped(),
        }
    }
}

/// A spawned child. The pipe ends, if requested, are owned here; dropping
/// them closes the parent-side descriptor.
pub struct SpawnedChild {
    child: Child,
}

impl SpawnedChild {
    pub fn pid(&self) -> Pid {
        self.child.id() as Pid
    }

    pub fn stdout(&mut self) -> Option<std::process::ChildStdout> {
        self.child.stdout.take()
    }

    pub fn stderr(&mut self) -> Option<std::process::ChildStderr> {
        self.child.stderr.take()
    }
}

/// Spawns `argv[0]` with `argv[1..]`, with `env` entries added on top of the
/// inherited environment, and `stdin`/`stdout`/`stderr` wired per `Stdio`.
///
/// When `restore_mask` is given, a `pre_exec` hook restores it in the child
/// between fork and exec, so the spawned process runs with the supervisor's
/// original signal disposition instead of inheriting the blocked
/// `SIGTERM`/`SIGCHLD` mask.
pub fn spawn<S: AsRef<OsStr>>(
    argv: &[S],
    env: &[(&str, &OsStr)],
    stdin: Stdio,
    stdout: Stdio,
    stderr: Stdio,
    restore_mask: Option<SavedSigmask>,
) -> Result<SpawnedChild> {
    let (program, args) = argv.split_first().expect("argv must be non-empty");

    let mut cmd = Command::new(program);
    cmd.args(args);
    for (k, v) in env {
        cmd.env(k, v);
    }
    cmd.stdin(stdin.to_std());
    cmd.stdout(stdout.to_std());
    cmd.stderr(stderr.to_std());

    if let Some(mask) = restore_mask {
        // SAFETY: restore() only calls sigprocmask, which is async-signal-safe,
        // and runs after fork but before exec in the child, per CommandExt::pre_exec.
        unsafe {
            cmd.pre_exec(move || mask.restore());
        }
    }

    let child = cmd.spawn().map_err(Error::Spawn)?;
    Ok(SpawnedChild { child })
}

/// Reaps any exited descendant, `WNOHANG`, repeatedly. Reaping only the
/// specifically-signaled pid can leave short-lived zombies around when more
/// than one child exits close together; looping over `waitpid(-1, ...)`
/// drains all of them without any visible effect on the output files.
pub fn reap_any_exited() {
    loop {
        let mut status: libc::c_int = 0;
        // SAFETY: status is a valid out-parameter.
        let ret = unsafe { libc::waitpid(-1, &mut status, libc::WNOHANG) };
        if ret <= 0 {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use std::time::Instant;

    #[test]
    fn spawn_runs_the_requested_program() {
        let child = spawn(&["/bin/true"], &[], Stdio::Default, Stdio::Default, Stdio::Default, None)
            .unwrap();
        assert!(child.pid() > 0);

        // Give the child a moment to exit, then drain it so it doesn't
        // linger as a zombie for the rest of the test run.
        let deadline = Instant::now() + Duration::from_secs(2);
        loop {
            reap_any_exited();
            // SAFETY: pid 0 is a valid argument to kill(); ESRCH means gone.
            let alive = unsafe { libc::kill(child.pid(), 0) } == 0;
            if !alive || Instant::now() > deadline {
                break;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
    }

    #[test]
    fn spawn_surfaces_a_missing_executable_as_an_error() {
        let result = spawn(
            &["/definitely/not/a/real/executable"],
            &[],
            Stdio::Default,
            Stdio::Default,
            Stdio::Default,
            None,
        );
        assert!(matches!(result, Err(Error::Spawn(_))));
    }

    #[test]
    fn piped_stdout_is_readable() {
        use std::io::Read;

        let mut child = spawn(
            &["/bin/echo", "hello"],
            &[],
            Stdio::Default,
            Stdio::Piped,
            Stdio::Default,
            None,
        )
        .unwrap();

        let mut out = String::new();
        child.stdout().unwrap().read_to_string(&mut out).unwrap();
        assert_eq!(out, "hello\n");

        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            reap_any_exited();
            // SAFETY: pid 0 is a valid argument to kill(); ESRCH means gone.
            if unsafe { libc::kill(child.pid(), 0) } != 0 {
                break;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
    }
}
