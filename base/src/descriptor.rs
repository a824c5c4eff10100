// Copyright 2025 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Small `fcntl(2)`-based descriptor flag helpers, the Rust equivalent of the
//! original `FdSetCloexecFlag.c` / `FdSetNonblockFlag.c`.

use std::io;
use std::os::unix::io::RawFd;

use crate::errno::Error;
use crate::errno::Result;

fn get_flags(fd: RawFd) -> io::Result<libc::c_int> {
    // SAFETY: fd is a valid, open descriptor for the lifetime of this call.
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
    if flags < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(flags)
}

fn set_flag(fd: RawFd, get: libc::c_int, set: libc::c_int, flag: libc::c_int, on: bool) -> io::Result<()> {
    // SAFETY: fd is a valid, open descriptor for the lifetime of this call.
    let current = unsafe { libc::fcntl(fd, get) };
    if current < 0 {
        return Err(io::Error::last_os_error());
    }
    let updated = if on { current | flag } else { current & !flag };
    // SAFETY: fd is a valid, open descriptor and updated is a well-formed flag set.
    let ret = unsafe { libc::fcntl(fd, set, updated) };
    if ret < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// Extension trait adding the two descriptor-flag operations the supervisor
/// needs: close-on-exec (so secondary children never inherit stray fds) and
/// non-blocking (required before a descriptor can be polled as part of the
/// event loop).
pub trait AsRawFdExt {
    fn raw_fd(&self) -> RawFd;

    fn set_cloexec(&self, on: bool) -> Result<()> {
        set_flag(self.raw_fd(), libc::F_GETFD, libc::F_SETFD, libc::FD_CLOEXEC, on)
            .map_err(Error::Fcntl)
    }

    fn set_nonblocking(&self, on: bool) -> Result<()> {
        set_flag(self.raw_fd(), libc::F_GETFL, libc::F_SETFL, libc::O_NONBLOCK, on)
            .map_err(Error::Fcntl)
    }

    fn is_nonblocking(&self) -> Result<bool> {
        let flags = get_flags(self.raw_fd()).map_err(Error::Fcntl)?;
        Ok(flags & libc::O_NONBLOCK != 0)
    }
}

impl<T: std::os::unix::io::AsRawFd> AsRawFdExt for T {
    fn raw_fd(&self) -> RawFd {
        self.as_raw_fd()
    }
}
