// Copyright 2025 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Delivers `SIGTERM` and `SIGCHLD` as a readable file descriptor, so the
//! event loop can treat signals as ordinary poll events instead of using a
//! signal handler.

use std::io;
use std::mem::MaybeUninit;
use std::os::fd::FromRawFd;
use std::os::fd::OwnedFd;
use std::os::fd::RawFd;

use crate::errno::Error;
use crate::errno::Result;
use crate::process::Pid;

/// The process's signal mask as it was before `SignalSource::arm` blocked
/// `SIGTERM`/`SIGCHLD`. The target child's exec should run with this mask
/// restored (spec: "blocked signals are inherited by the target's pre-exec
/// image and then restored ... immediately before the exec").
#[derive(Clone, Copy)]
pub struct SavedSigmask(libc::sigset_t);

impl SavedSigmask {
    /// Restores this mask on the calling thread. Only safe to call after a
    /// `fork()`, before `exec()`, in the child.
    pub fn restore(&self) -> io::Result<()> {
        // SAFETY: self.0 is a valid sigset_t previously returned by the kernel.
        let ret = unsafe { libc::sigprocmask(libc::SIG_SETMASK, &self.0, std::ptr::null_mut()) };
        if ret != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }
}

/// A signal observed through the signalfd.
#[derive(Debug, Clone, Copy)]
pub struct SignalEvent {
    pub signo: libc::c_int,
    /// Present for `SIGCHLD`: the pid that changed state.
    pub pid: Option<Pid>,
    /// Present for `SIGCHLD`: `si_status` (exit code or signal number,
    /// depending on `si_code`; the event loop only cares that a
    /// `waitpid(WNOHANG)` reap is now safe).
    pub status: Option<i32>,
}

pub struct SignalSource {
    fd: OwnedFd,
}

fn blocked_signal_set() -> io::Result<libc::sigset_t> {
    // SAFETY: set is a valid out-parameter sized for sigset_t.
    unsafe {
        let mut set = MaybeUninit::<libc::sigset_t>::uninit();
        if libc::sigemptyset(set.as_mut_ptr()) != 0 {
            return Err(io::Error::last_os_error());
        }
        let mut set = set.assume_init();
        for signo in [libc::SIGTERM, libc::SIGCHLD] {
            if libc::sigaddset(&mut set, signo) != 0 {
                return Err(io::Error::last_os_error());
            }
        }
        Ok(set)
    }
}

impl SignalSource {
    /// Blocks `SIGTERM`/`SIGCHLD` on this thread's mask and arms a
    /// non-blocking, close-on-exec signalfd for them. Returns the source
    /// plus the mask that was in effect before the call, so the target
    /// child can have it restored pre-exec.
    pub fn arm() -> Result<(SignalSource, SavedSigmask)> {
        let new_set = blocked_signal_set().map_err(Error::SignalMask)?;

        // SAFETY: old_set is a valid out-parameter; new_set was just built above.
        let old_set = unsafe {
            let mut old_set = MaybeUninit::<libc::sigset_t>::uninit();
            if libc::sigprocmask(libc::SIG_BLOCK, &new_set, old_set.as_mut_ptr()) != 0 {
                return Err(Error::SignalMask(io::Error::last_os_error()));
            }
            old_set.assume_init()
        };

        // SAFETY: new_set is a valid sigset_t; -1 requests a new signalfd.
        let raw = unsafe {
            libc::signalfd(-1, &new_set, libc::SFD_NONBLOCK | libc::SFD_CLOEXEC)
        };
        if raw < 0 {
            return Err(Error::SignalFd(io::Error::last_os_error()));
        }
        // SAFETY: raw is a just-created, valid, owned descriptor.
        let fd = unsafe { OwnedFd::from_raw_fd(raw) };

        Ok((SignalSource { fd }, SavedSigmask(old_set)))
    }

    pub fn as_raw_fd(&self) -> RawFd {
        use std::os::fd::AsRawFd;
        self.fd.as_raw_fd()
    }

    /// Reads one signal record. Returns `Ok(None)` on a transient read error
    /// (`EINTR`/`EAGAIN`), treating a negative, non-fatal `read()` as
    /// "nothing to do yet".
    pub fn read_one(&self) -> Result<Option<SignalEvent>> {
        let mut siginfo = MaybeUninit::<libc::signalfd_siginfo>::uninit();
        let size = std::mem::size_of::<libc::signalfd_siginfo>();

        // SAFETY: the buffer is sized exactly for one signalfd_siginfo record.
        let bytes_read = unsafe {
            libc::read(self.fd.as_raw_fd(), siginfo.as_mut_ptr() as *mut libc::c_void, size)
        };

        if bytes_read < 0 {
            let err = io::Error::last_os_error();
            return match err.raw_os_error() {
                Some(libc::EINTR) | Some(libc::EAGAIN) => Ok(None),
                _ => Err(Error::SignalRead(err)),
            };
        }
        if bytes_read == 0 {
            return Ok(None);
        }
        if bytes_read as usize != size {
            return Err(Error::SignalRead(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "short read from signalfd",
            )));
        }

        // SAFETY: the kernel filled exactly size_of::<signalfd_siginfo>() bytes above.
        let siginfo = unsafe { siginfo.assume_init() };
        let is_sigchld = siginfo.ssi_signo as i32 == libc::SIGCHLD;
        Ok(Some(SignalEvent {
            signo: siginfo.ssi_signo as libc::c_int,
            pid: is_sigchld.then_some(siginfo.ssi_pid as Pid),
            status: is_sigchld.then_some(siginfo.ssi_status as i32),
        }))
    }
}

/// Sends `SIGTERM` to `pid`. Best-effort: the target may already have
/// exited.
pub fn terminate(pid: Pid) -> io::Result<()> {
    // SAFETY: kill() only inspects its arguments; pid may legitimately be gone.
    let ret = unsafe { libc::kill(pid, libc::SIGTERM) };
    if ret != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}
