// Copyright 2025 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Writes captured streams and the final exit status to `outDir`. Every
//! write overwrites-and-truncates; there is no append.

use std::fs::File;
use std::io;
use std::io::Write;
use std::path::Path;

use crate::stream::StdioStream;

/// The fixed separator written byte-for-byte when a stream has discarded
/// bytes between its head and tail.
const CUT_MARKER: &[u8] = b"\n\n------------------- cut ----------------------\n\n";

/// Overwrites `<out_dir>/<stream.file_name()>` with the stream's current
/// head/cut-marker/tail representation. Failures are swallowed: a flush
/// that fails now may succeed on the very next throttled attempt, and
/// logging every failure here would spam `supervisor.log` once per flush
/// interval.
pub fn flush_stream(out_dir: &Path, stream: &StdioStream) {
    let path = out_dir.join(stream.file_name());
    let _ = write_stream_file(&path, stream);
}

fn write_stream_file(path: &Path, stream: &StdioStream) -> io::Result<()> {
    let mut file = File::create(path)?;
    let data = stream.data();

    file.write_all(data.head)?;
    if data.bytes_discarded > 0 {
        file.write_all(CUT_MARKER)?;
    }
    for chunk in data.tail.iter() {
        file.write_all(chunk)?;
    }
    Ok(())
}

/// Overwrites `<out_dir>/status.txt` with the decimal exit status. Unlike
/// stream flushes, failure here is logged: this only runs once, right
/// before the supervisor exits, so there is no "next attempt" to silently
/// paper over it.
pub fn write_status(out_dir: &Path, status: i32) {
    let path = out_dir.join("status.txt");
    if let Err(e) = write_status_file(&path, status) {
        log::error!("failed to write {}: {}", path.display(), e);
    }
}

fn write_status_file(path: &Path, status: i32) -> io::Result<()> {
    let mut file = File::create(path)?;
    write!(file, "{status}")
}
