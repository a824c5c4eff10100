// Copyright 2025 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! A fixed-capacity ring buffer keeping only the last bytes ever accepted.
//! Overflowed bytes are handed to a `DiscardSink` before the space they
//! occupied becomes writable again, so the sink can copy them out -- a
//! typed stand-in for a raw function pointer plus `void*` context.

use std::io;
use std::os::fd::AsRawFd;
use std::os::fd::BorrowedFd;

use smallvec::SmallVec;

use base::errno::Error;
use crate::status::StreamStatus;

/// Receives bytes the `TailBuffer` is about to discard to make room for new
/// data.
pub trait DiscardSink {
    fn absorb(&mut self, bytes: &[u8]);
}

/// A sink that throws everything away; useful for tests that only care
/// about the tail's own contents.
pub struct NullSink;

impl DiscardSink for NullSink {
    fn absorb(&mut self, _bytes: &[u8]) {}
}

/// Up to two byte-slice views into the ring's current contents, ordered:
/// chunk 0 starts at `begin`; chunk 1 (present only when data wraps) starts
/// at offset 0.
pub type TailChunks<'a> = SmallVec<[&'a [u8]; 2]>;

pub struct TailBuffer {
    data: Box<[u8]>,
    capacity: usize,
    begin: usize,
    size: usize,
}

impl TailBuffer {
    pub fn new(capacity: usize) -> Result<TailBuffer, Error> {
        if capacity == 0 {
            return Err(Error::ZeroCapacity);
        }
        Ok(TailBuffer {
            data: vec![0u8; capacity].into_boxed_slice(),
            capacity,
            begin: 0,
            size: 0,
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// The logical content as 1 or 2 contiguous slices, never more.
    pub fn chunks(&self) -> TailChunks<'_> {
        let mut chunks = TailChunks::new();

        let first_len = self.size.min(self.capacity - self.begin);
        if first_len > 0 {
            chunks.push(&self.data[self.begin..self.begin + first_len]);
        }

        // The data wraps iff begin + size overflows the buffer.
        let second_len = (self.begin + self.size).saturating_sub(self.capacity);
        if second_len > 0 {
            chunks.push(&self.data[..second_len]);
        }

        chunks
    }

    /// Reserves room for up to `max_bytes` more bytes, evicting from the
    /// logical front (via `sink`) as needed. Returns the iovecs to read
    /// into and the number of bytes actually reserved (`== max_bytes` as
    /// long as `max_bytes <= capacity`).
    fn reserve_for_append(
        &mut self,
        max_bytes: usize,
        sink: &mut impl DiscardSink,
    ) -> SmallVec<[std::ops::Range<usize>; 4]> {
        let mut reserved = SmallVec::<[std::ops::Range<usize>; 4]>::new();
        let mut total = 0usize;

        // Free region 1: from the end of the data to either the end of the
        // buffer or the start of the data, whichever comes first.
        let free1_begin = (self.begin + self.size) % self.capacity;
        let free1_end = if self.begin + self.size == free1_begin {
            self.capacity
        } else {
            self.begin
        };
        let free1_size = free1_end - free1_begin;
        let take = free1_size.min(max_bytes - total);
        if take > 0 {
            reserved.push(free1_begin..free1_begin + take);
            total += take;
        }

        // Free region 2: from the start of the buffer to the start of the
        // data, only meaningful when the data doesn't wrap (including the
        // all-evicted case where `size == 0` but `begin` has wrapped around
        // partway through the buffer).
        if self.begin + self.size <= self.capacity {
            let free2_size = self.begin;
            let take = free2_size.min(max_bytes - total);
            if take > 0 {
                reserved.push(0..take);
                total += take;
            }
        }

        // Still short: evict from the logical front. At most two data
        // chunks can exist, so at most two iterations are needed.
        for _ in 0..2 {
            if total >= max_bytes {
                break;
            }

            let data_chunk_size = self.size.min(self.capacity - self.begin);
            if data_chunk_size == 0 {
                break;
            }

            let to_discard = data_chunk_size.min(max_bytes - total);
            let discard_begin = self.begin;

            // Hand the bytes to the sink before the region becomes
            // writable, so it can copy them out first.
            sink.absorb(&self.data[discard_begin..discard_begin + to_discard]);

            self.begin = (self.begin + to_discard) % self.capacity;
            self.size -= to_discard;

            reserved.push(discard_begin..discard_begin + to_discard);
            total += to_discard;
        }

        reserved
    }

    /// Queries how many bytes are currently readable; if positive, reserves
    /// exactly that much space and reads directly into it; otherwise falls
    /// back to a small scratch read to distinguish EOF/error/spurious-readable.
    pub fn append_from_fd(&mut self, fd: BorrowedFd<'_>, sink: &mut impl DiscardSink) -> StreamStatus {
        let mut available: libc::c_int = 0;
        // SAFETY: available is a valid out-parameter for FIONREAD.
        let ioctl_ret = unsafe { libc::ioctl(fd.as_raw_fd(), libc::FIONREAD, &mut available) };
        if ioctl_ret < 0 {
            return StreamStatus::Error(io::Error::last_os_error());
        }

        if available > 0 {
            let want = available as usize;
            let reserved_ranges = self.reserve_for_append(want, sink);
            let mut iovecs: SmallVec<[libc::iovec; 4]> = SmallVec::new();
            for range in &reserved_ranges {
                iovecs.push(libc::iovec {
                    iov_base: self.data[range.clone()].as_mut_ptr() as *mut libc::c_void,
                    iov_len: range.len(),
                });
            }

            // SAFETY: each iovec points into self.data, which outlives this call,
            // and the ranges are disjoint and in-bounds by construction above.
            let bytes_read = unsafe {
                libc::readv(fd.as_raw_fd(), iovecs.as_ptr(), iovecs.len() as libc::c_int)
            };

            if bytes_read < 0 {
                return StreamStatus::Error(io::Error::last_os_error());
            } else if bytes_read == 0 {
                return StreamStatus::Eof;
            }
            self.size += bytes_read as usize;
            StreamStatus::Alive
        } else {
            let mut scratch = [0u8; 4096];
            let scratch_len = scratch.len().min(self.capacity);

            // SAFETY: scratch is a valid, appropriately sized buffer.
            let bytes_read = unsafe {
                libc::read(
                    fd.as_raw_fd(),
                    scratch.as_mut_ptr() as *mut libc::c_void,
                    scratch_len,
                )
            };

            if bytes_read < 0 {
                return StreamStatus::Error(io::Error::last_os_error());
            } else if bytes_read == 0 {
                return StreamStatus::Eof;
            }

            let bytes_read = bytes_read as usize;
            let reserved_ranges = self.reserve_for_append(bytes_read, sink);

            let mut remaining = &scratch[..bytes_read];
            for range in &reserved_ranges {
                let take = remaining.len().min(range.len());
                self.data[range.start..range.start + take].copy_from_slice(&remaining[..take]);
                remaining = &remaining[take..];
            }

            self.size += bytes_read;
            StreamStatus::Alive
        }
    }
}
