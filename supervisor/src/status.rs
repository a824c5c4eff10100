// Copyright 2025 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! The three-way classification every stream read produces.

use std::io;

#[derive(Debug)]
pub enum StreamStatus {
    /// At least one byte was consumed; the stream may have more.
    Alive,
    /// The descriptor reported end-of-file.
    Eof,
    /// An I/O error occurred. The caller inspects `io::Error::kind()` /
    /// `raw_os_error()` to decide whether it's transient (`EINTR`,
    /// `EAGAIN`/`EWOULDBLOCK`) or permanent.
    Error(io::Error),
}

impl StreamStatus {
    pub fn is_transient_error(&self) -> bool {
        matches!(
            self,
            StreamStatus::Error(e)
                if matches!(e.raw_os_error(), Some(libc::EINTR) | Some(libc::EAGAIN))
        )
    }
}
