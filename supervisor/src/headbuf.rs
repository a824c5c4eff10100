// Copyright 2025 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Fixed-capacity, append-only byte buffer keeping only the first bytes ever
//! offered to it.

/// Keeps the first `capacity` bytes ever `append`ed; everything past that is
/// silently dropped. `capacity == 0` is legal and simply drops everything.
pub struct HeadBuffer {
    data: Vec<u8>,
    capacity: usize,
}

impl HeadBuffer {
    pub fn new(capacity: usize) -> HeadBuffer {
        HeadBuffer {
            data: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Appends as much of `data` as still fits. Returns the number of bytes
    /// actually accepted, `min(data.len(), capacity - len())`.
    pub fn append(&mut self, data: &[u8]) -> usize {
        let room = self.capacity - self.data.len();
        let to_take = room.min(data.len());
        self.data.extend_from_slice(&data[..to_take]);
        to_take
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
