// Copyright 2025 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! A `log::Log` implementation backing `<outDir>/supervisor.log`: open for
//! write, mark close-on-exec, and flush after every record so a log
//! survives even if the supervisor is killed without warning.

use std::fs::File;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

use base::AsRawFdExt;

pub struct FileLogger {
    file: Mutex<Option<File>>,
}

impl FileLogger {
    /// Opens `<out_dir>/supervisor.log` for writing, truncating any prior
    /// contents. A failure to open is not fatal -- a missing log file is
    /// tolerable, so the logger simply discards every record instead.
    pub fn open(out_dir: &Path) -> FileLogger {
        let path = out_dir.join("supervisor.log");
        let file = match OpenOptions::new().create(true).write(true).truncate(true).open(&path) {
            Ok(file) => {
                if let Err(e) = file.set_cloexec(true) {
                    eprintln!("failed to set close-on-exec on {}: {}", path.display(), e);
                }
                Some(file)
            }
            Err(e) => {
                eprintln!("failed to open log file {}: {}", path.display(), e);
                None
            }
        };

        FileLogger {
            file: Mutex::new(file),
        }
    }

    /// Installs `self` as the global logger at `log::LevelFilter::Info`.
    pub fn install(self) {
        log::set_max_level(log::LevelFilter::Info);
        if log::set_boxed_logger(Box::new(self)).is_err() {
            eprintln!("a logger was already installed; supervisor.log will be empty");
        }
    }
}

impl log::Log for FileLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        metadata.level() <= log::Level::Info
    }

    fn log(&self, record: &log::Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let mut guard = match self.file.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        if let Some(file) = guard.as_mut() {
            let _ = writeln!(file, "[{}] {}", record.level(), record.args());
            // Flushed after every record, per the original's logPrintf, so a
            // hard kill of the supervisor still leaves a usable log.
            let _ = file.flush();
        }
    }

    fn flush(&self) {
        let mut guard = match self.file.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(file) = guard.as_mut() {
            let _ = file.flush();
        }
    }
}
