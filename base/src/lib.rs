// Copyright 2025 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Small system utility modules for usage by the supervisor binary.
//!
//! This crate carries the platform-facing primitives the supervisor is built
//! on: raw descriptor ownership, `poll(2)` multiplexing, signal blocking via
//! `signalfd(2)`, monotonic time, and child process spawn/wait. It does not
//! know about head/tail buffers, flush policy, or the target/waiter/killer
//! state machine; those live in the `supervisor` crate.

pub mod descriptor;
pub mod errno;
pub mod poll;
pub mod process;
pub mod signal;
pub mod time;

pub use descriptor::AsRawFdExt;
pub use errno::Error;
pub use errno::Result;
pub use process::Pid;
