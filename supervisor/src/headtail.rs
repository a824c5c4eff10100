// Copyright 2025 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Combines a [`HeadBuffer`] and a [`TailBuffer`] into the single capture
//! unit persisted per stream: the first bytes ever seen, the last bytes
//! still held, and a running count of everything in between that fit in
//! neither.

use std::os::fd::BorrowedFd;

use base::Error;

use crate::headbuf::HeadBuffer;
use crate::status::StreamStatus;
use crate::tailbuf::DiscardSink;
use crate::tailbuf::TailBuffer;

pub struct HeadTailData<'a> {
    pub head: &'a [u8],
    pub tail: crate::tailbuf::TailChunks<'a>,
    pub bytes_discarded: usize,
}

pub struct HeadTailBuffer {
    head: HeadBuffer,
    tail: TailBuffer,
    bytes_discarded: usize,
}

/// Forwards bytes the tail buffer evicts into the head buffer, counting
/// whatever the head buffer in turn has no room for as permanently lost.
/// Mirrors `processDataDiscardedByTailBuffer` in the original.
struct ForwardToHead<'a> {
    head: &'a mut HeadBuffer,
    bytes_discarded: &'a mut usize,
}

impl DiscardSink for ForwardToHead<'_> {
    fn absorb(&mut self, bytes: &[u8]) {
        let accepted = self.head.append(bytes);
        *self.bytes_discarded += bytes.len() - accepted;
    }
}

impl HeadTailBuffer {
    pub fn new(head_capacity: usize, tail_capacity: usize) -> Result<HeadTailBuffer, Error> {
        Ok(HeadTailBuffer {
            head: HeadBuffer::new(head_capacity),
            tail: TailBuffer::new(tail_capacity)?,
            bytes_discarded: 0,
        })
    }

    pub fn data(&self) -> HeadTailData<'_> {
        HeadTailData {
            head: self.head.as_slice(),
            tail: self.tail.chunks(),
            bytes_discarded: self.bytes_discarded,
        }
    }

    pub fn append_from_fd(&mut self, fd: BorrowedFd<'_>) -> StreamStatus {
        let mut sink = ForwardToHead {
            head: &mut self.head,
            bytes_discarded: &mut self.bytes_discarded,
        };
        self.tail.append_from_fd(fd, &mut sink)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::os::fd::AsFd;
    use std::os::fd::FromRawFd;
    use std::os::fd::OwnedFd;

    fn feed(buf: &mut HeadTailBuffer, data: &[u8]) {
        let mut fds = [0i32; 2];
        assert_eq!(unsafe { libc::pipe(fds.as_mut_ptr()) }, 0);
        let write_fd = unsafe { OwnedFd::from_raw_fd(fds[1]) };
        let read_fd = unsafe { OwnedFd::from_raw_fd(fds[0]) };

        let mut writer = std::fs::File::from(write_fd);
        writer.write_all(data).unwrap();
        drop(writer);

        loop {
            match buf.append_from_fd(read_fd.as_fd()) {
                StreamStatus::Alive => continue,
                StreamStatus::Eof => break,
                StreamStatus::Error(e) => panic!("unexpected error: {e}"),
            }
        }
    }

    #[test]
    fn zero_tail_capacity_rejected() {
        assert!(HeadTailBuffer::new(10, 0).is_err());
    }

    #[test]
    fn short_input_lands_entirely_in_both_ends() {
        let mut buf = HeadTailBuffer::new(10, 10).unwrap();
        feed(&mut buf, b"hello");
        let data = buf.data();
        assert_eq!(data.head, b"hello");
        let tail: Vec<u8> = data.tail.iter().flat_map(|c| c.iter().copied()).collect();
        assert_eq!(tail, b"hello");
        assert_eq!(data.bytes_discarded, 0);
    }

    #[test]
    fn middle_bytes_are_counted_as_discarded_once_both_ends_are_full() {
        // head keeps "01234", tail keeps "BCDEFGHIJK" (last 10), and
        // everything strictly between (the bytes the tail evicted that the
        // head had no room left for) is counted as discarded.
        let mut buf = HeadTailBuffer::new(5, 10).unwrap();
        let alphabet: Vec<u8> = (b'0'..=b'9').chain(b'A'..=b'Z').collect();
        feed(&mut buf, &alphabet);

        let data = buf.data();
        assert_eq!(data.head, b"01234");
        let tail: Vec<u8> = data.tail.iter().flat_map(|c| c.iter().copied()).collect();
        assert_eq!(&tail[..], &alphabet[alphabet.len() - 10..]);
        assert_eq!(
            data.bytes_discarded,
            alphabet.len() - data.head.len() - tail.len()
        );
    }
}
