// Copyright 2025 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! The crate's `Error`/`Result` type: a small typed wrapper over the handful
//! of failure modes this crate's syscalls can produce, rather than bare
//! `io::Error` everywhere.

use std::io;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("a zero-capacity buffer was requested")]
    ZeroCapacity,
    #[error("failed to block signals: {0}")]
    SignalMask(#[source] io::Error),
    #[error("failed to create a signalfd: {0}")]
    SignalFd(#[source] io::Error),
    #[error("failed to read from the signal descriptor: {0}")]
    SignalRead(#[source] io::Error),
    #[error("poll(2) failed: {0}")]
    Poll(#[source] io::Error),
    #[error("failed to spawn a child process: {0}")]
    Spawn(#[source] io::Error),
    #[error("fcntl(2) failed: {0}")]
    Fcntl(#[source] io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
