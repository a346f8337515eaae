// cansocket/src/ring_buffer.rs
//
// A growable FIFO byte buffer built from contiguous chunks.
//
// This file is part of the Rust 'cansocket' library.
//
// Licensed under the MIT license:
//   <LICENSE or http://opensource.org/licenses/MIT>
// This file may not be copied, modified, or distributed except according
// to those terms.

//! The byte buffer behind the socket streams.
//!
//! Data is kept in a queue of chunks. Space is reserved at the tail in one
//! contiguous piece, so a kernel read can go straight into the buffer, and
//! the head is handed out one contiguous block at a time, so a kernel write
//! can go straight out of it. Bytes are only copied when the application
//! reads or writes.

use bytes::{Buf, BytesMut};
use std::collections::VecDeque;

/// Default size of a newly allocated chunk.
pub const DEFAULT_CHUNK_SIZE: usize = 4096;

/// A FIFO of bytes with contiguous reservations at the tail.
#[derive(Debug, Clone)]
pub struct RingBuffer {
    chunks: VecDeque<BytesMut>,
    len: usize,
    chunk_size: usize,
}

impl RingBuffer {
    /// Creates an empty buffer that allocates chunks of the given size.
    pub fn new(chunk_size: usize) -> Self {
        Self {
            chunks: VecDeque::new(),
            len: 0,
            chunk_size: chunk_size.max(1),
        }
    }

    /// The number of bytes in the buffer
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the buffer holds no bytes
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The size of newly allocated chunks
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Reserves `n` contiguous bytes at the tail and gets them to fill in.
    ///
    /// The bytes count as buffered right away; whatever isn't filled has to
    /// be given back with [`chop`](Self::chop).
    pub fn reserve(&mut self, n: usize) -> &mut [u8] {
        let fits = self
            .chunks
            .back()
            .map(|chunk| chunk.capacity() - chunk.len() >= n)
            .unwrap_or(false);

        if !fits {
            // an empty spare chunk too small for this is replaced
            if self.chunks.back().map(BytesMut::is_empty).unwrap_or(false) {
                self.chunks.pop_back();
            }
            self.chunks
                .push_back(BytesMut::with_capacity(n.max(self.chunk_size)));
        }
        self.len += n;

        let last = self.chunks.len() - 1;
        let chunk = &mut self.chunks[last];
        let start = chunk.len();
        chunk.resize(start + n, 0);
        &mut chunk[start..]
    }

    /// Removes up to `n` bytes from the tail.
    pub fn chop(&mut self, mut n: usize) {
        n = n.min(self.len);
        self.len -= n;

        while n > 0 {
            let Some(chunk) = self.chunks.back_mut() else {
                break;
            };
            let avail = chunk.len();
            if avail > n {
                chunk.truncate(avail - n);
                break;
            }
            n -= avail;
            self.chunks.pop_back();
        }
        self.trim_empty();
    }

    /// Removes up to `n` bytes from the head.
    pub fn free(&mut self, mut n: usize) {
        n = n.min(self.len);
        self.len -= n;

        while n > 0 {
            let Some(chunk) = self.chunks.front_mut() else {
                break;
            };
            let avail = chunk.len();
            if avail > n {
                chunk.advance(n);
                break;
            }
            n -= avail;
            self.pop_front();
        }
        self.trim_empty();
    }

    fn pop_front(&mut self) {
        if self.chunks.len() == 1 {
            // keep the last chunk around for the next reservation
            if let Some(chunk) = self.chunks.front_mut() {
                chunk.clear();
            }
        } else {
            self.chunks.pop_front();
        }
    }

    // Drop chunks that were emptied by a chop, except a lone spare one.
    fn trim_empty(&mut self) {
        while self.chunks.len() > 1 && self.chunks.back().map(BytesMut::is_empty).unwrap_or(false) {
            self.chunks.pop_back();
        }
        if self.len == 0 {
            self.chunks.truncate(1);
            if let Some(chunk) = self.chunks.front_mut() {
                chunk.clear();
            }
        }
    }

    /// The size of the first contiguous block at the head.
    pub fn next_data_block_size(&self) -> usize {
        self.chunks.front().map(BytesMut::len).unwrap_or(0)
    }

    /// The first contiguous block at the head.
    pub fn read_pointer(&self) -> &[u8] {
        match self.chunks.front() {
            Some(chunk) => &chunk[..],
            None => &[],
        }
    }

    /// Makes sure the first contiguous block holds at least `n` bytes, or
    /// everything in the buffer if there is less than that.
    pub fn make_contiguous(&mut self, n: usize) {
        let n = n.min(self.len);
        if self.next_data_block_size() >= n {
            return;
        }

        let mut block = BytesMut::with_capacity(n.max(self.chunk_size));
        let mut rest = n;
        while rest > 0 {
            let Some(chunk) = self.chunks.front_mut() else {
                break;
            };
            let take = chunk.len().min(rest);
            block.extend_from_slice(&chunk[..take]);
            rest -= take;
            if take == chunk.len() {
                self.chunks.pop_front();
            } else {
                chunk.advance(take);
            }
        }
        self.chunks.push_front(block);
    }

    /// Appends bytes at the tail.
    pub fn append(&mut self, data: &[u8]) {
        if !data.is_empty() {
            self.reserve(data.len()).copy_from_slice(data);
        }
    }

    /// Copies bytes from the head without removing them.
    pub fn peek(&self, buf: &mut [u8]) -> usize {
        let mut n = 0;
        for chunk in &self.chunks {
            if n == buf.len() {
                break;
            }
            let take = chunk.len().min(buf.len() - n);
            buf[n..n + take].copy_from_slice(&chunk[..take]);
            n += take;
        }
        n
    }

    /// Moves bytes from the head into `buf`.
    pub fn read(&mut self, buf: &mut [u8]) -> usize {
        let n = self.peek(buf);
        self.free(n);
        n
    }

    /// Takes everything out of the buffer.
    pub fn read_all(&mut self) -> Vec<u8> {
        let mut buf = vec![0u8; self.len];
        self.read(&mut buf);
        buf
    }

    /// Finds the first position of a byte within the first `max` bytes.
    pub fn index_of(&self, byte: u8, max: usize) -> Option<usize> {
        self.chunks
            .iter()
            .flat_map(|chunk| chunk.iter())
            .take(max)
            .position(|&b| b == byte)
    }

    /// Whether a whole line, ending in '\n', is buffered.
    pub fn can_read_line(&self) -> bool {
        self.index_of(b'\n', self.len).is_some()
    }

    /// Takes one line out of the buffer, including the '\n', but no more
    /// than `max` bytes. Without a full line, takes what is there up to
    /// `max`.
    pub fn read_line(&mut self, max: usize) -> Vec<u8> {
        let n = match self.index_of(b'\n', max) {
            Some(pos) => pos + 1,
            None => self.len.min(max),
        };
        let mut buf = vec![0u8; n];
        self.read(&mut buf);
        buf
    }

    /// Removes everything, keeping one chunk allocated.
    pub fn clear(&mut self) {
        self.len = 0;
        self.trim_empty();
    }
}

impl Default for RingBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_CHUNK_SIZE)
    }
}

/////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reserve_chop() {
        let mut buf = RingBuffer::new(16);
        assert!(buf.is_empty());

        let space = buf.reserve(10);
        assert_eq!(10, space.len());
        space[..4].copy_from_slice(b"abcd");
        buf.chop(6);

        assert_eq!(4, buf.len());
        assert_eq!(b"abcd", buf.read_pointer());
    }

    #[test]
    fn test_reserve_is_contiguous() {
        let mut buf = RingBuffer::new(8);
        buf.append(b"12345");

        // doesn't fit the rest of the first chunk, so it gets a new one
        let space = buf.reserve(6);
        assert_eq!(6, space.len());
        space.copy_from_slice(b"abcdef");

        assert_eq!(11, buf.len());
        assert_eq!(5, buf.next_data_block_size());

        let mut out = [0u8; 11];
        assert_eq!(11, buf.read(&mut out));
        assert_eq!(b"12345abcdef", &out);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_chop_across_chunks() {
        let mut buf = RingBuffer::new(4);
        buf.append(b"abcd");
        buf.append(b"efgh");
        buf.free(1);

        buf.chop(5);
        assert_eq!(2, buf.len());
        assert_eq!(b"bc", buf.read_pointer());

        buf.chop(10);
        assert!(buf.is_empty());
        assert_eq!(0, buf.next_data_block_size());
    }

    #[test]
    fn test_reserve_after_drain() {
        let mut buf = RingBuffer::new(4);
        buf.append(b"ab");
        buf.free(2);

        // too big for the spare chunk
        buf.append(b"abcdef");
        assert_eq!(6, buf.next_data_block_size());
        assert_eq!(b"abcdef", buf.read_pointer());
    }

    #[test]
    fn test_free() {
        let mut buf = RingBuffer::new(4);
        buf.append(b"abcd");
        buf.append(b"ef");

        buf.free(3);
        assert_eq!(3, buf.len());
        assert_eq!(b"d", buf.read_pointer());

        buf.free(1);
        assert_eq!(b"ef", buf.read_pointer());

        buf.free(100);
        assert!(buf.is_empty());
        assert!(buf.read_pointer().is_empty());
    }

    #[test]
    fn test_make_contiguous() {
        let mut buf = RingBuffer::new(4);
        buf.append(b"ab");
        buf.append(b"cdef");
        buf.append(b"gh");
        buf.free(1);

        assert_eq!(1, buf.next_data_block_size());
        buf.make_contiguous(3);
        assert_eq!(b"bcd", buf.read_pointer());
        assert_eq!(7, buf.len());

        let mut out = [0u8; 7];
        buf.read(&mut out);
        assert_eq!(b"bcdefgh", &out);

        buf.append(b"xy");
        buf.make_contiguous(16);
        assert_eq!(b"xy", buf.read_pointer());
    }

    #[test]
    fn test_peek_and_lines() {
        let mut buf = RingBuffer::new(4);
        buf.append(b"one\ntw");
        buf.append(b"o\n");

        let mut out = [0u8; 5];
        assert_eq!(5, buf.peek(&mut out));
        assert_eq!(b"one\nt", &out);
        assert_eq!(8, buf.len());

        assert!(buf.can_read_line());
        assert_eq!(Some(3), buf.index_of(b'\n', 8));
        assert_eq!(None, buf.index_of(b'\n', 3));

        assert_eq!(b"one\n".to_vec(), buf.read_line(100));
        assert_eq!(b"tw".to_vec(), buf.read_line(2));
        assert_eq!(b"o\n".to_vec(), buf.read_line(100));
        assert!(!buf.can_read_line());
    }

    #[test]
    fn test_read_all_and_clear() {
        let mut buf = RingBuffer::default();
        buf.append(&[1, 2, 3]);
        assert_eq!(vec![1, 2, 3], buf.read_all());

        buf.append(&[4, 5]);
        buf.clear();
        assert!(buf.is_empty());
        assert!(buf.read_all().is_empty());
    }
}
