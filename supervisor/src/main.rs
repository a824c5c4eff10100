// Copyright 2025 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! `supervisor <outDir> <cmd> [args...]` -- spawns `<cmd>`, captures its
//! stdout/stderr, waits for a dependent cleanup process after it exits, and
//! persists everything to `<outDir>`.

mod config;
mod eventloop;
mod filelog;
mod headbuf;
mod headtail;
mod persist;
mod state;
mod status;
mod stream;
mod tailbuf;

use std::os::fd::OwnedFd;
use std::os::unix::io::AsRawFd;
use std::process::ExitCode;

use base::AsRawFdExt;

use crate::config::Config;
use crate::eventloop::EventLoopConfig;

fn main() -> ExitCode {
    let config = match Config::from_env(std::env::args_os(), |k| std::env::var_os(k)) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };

    filelog::FileLogger::open(&config.out_dir).install();

    let exit_code = run(config);
    ExitCode::from(exit_code as u8)
}

fn run(config: Config) -> i32 {
    let (signal, saved_mask) = match base::signal::SignalSource::arm() {
        Ok(pair) => pair,
        Err(e) => {
            log::error!("failed to arm the signal descriptor: {e}");
            return 1;
        }
    };

    let stdio = if config.capture_disabled {
        base::process::Stdio::Default
    } else {
        base::process::Stdio::Piped
    };

    let spawned = base::process::spawn(
        &config.target_argv,
        &[],
        base::process::Stdio::Default,
        stdio,
        stdio,
        Some(saved_mask),
    );

    let mut spawned = match spawned {
        Ok(child) => child,
        Err(e) => {
            log::error!("failed to spawn {:?}: {e}", config.target_argv[0]);
            return 1;
        }
    };

    let target_pid = spawned.pid();

    let stdout_fd = spawned.stdout().map(prepare_stream_fd);
    let stderr_fd = spawned.stderr().map(prepare_stream_fd);

    eventloop::run(
        signal,
        EventLoopConfig {
            out_dir: config.out_dir,
            waiter_exec: config.waiter_exec,
            waiter_context: config.waiter_context,
            target_pid,
            stdout_fd,
            stderr_fd,
            capture_disabled: config.capture_disabled,
        },
    )
}

/// Sets the non-blocking flag (required before polling) and close-on-exec
/// (so the waiter/killer never inherit it) on a freshly piped child stream.
fn prepare_stream_fd<T: AsRawFd + Into<OwnedFd>>(stream: T) -> OwnedFd {
    if let Err(e) = stream.set_nonblocking(true) {
        log::error!("failed to set O_NONBLOCK on a child stream: {e}");
    }
    if let Err(e) = stream.set_cloexec(true) {
        log::error!("failed to set close-on-exec on a child stream: {e}");
    }
    stream.into()
}
