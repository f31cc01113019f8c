use core::ops::{Add, Range};
use std::ops::{AddAssign, Deref};

use crate::Result;

/// Whether the producer has lapped the consumer: more samples are unread than the ring holds,
/// so the oldest of them have been overwritten.
pub fn is_overrun(produced: u64, consumed: u64, capacity: usize) -> bool {
    produced.saturating_sub(consumed) > capacity as u64
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RingCursor {
    index: usize,
    bound: usize,
}

impl RingCursor {
    pub fn new(bound: usize) -> RingCursor {
        assert!(bound > 0);
        RingCursor { index: 0, bound }
    }

    pub fn index(self) -> usize {
        self.index
    }

    pub fn bound(self) -> usize {
        self.bound
    }

    /// Splits `count` samples starting at the cursor into the part up to the end of the ring
    /// and the part continuing from its start. The second range is empty unless the span wraps.
    pub fn segments(self, count: usize) -> (Range<usize>, Range<usize>) {
        assert!(count <= self.bound);
        let tail_end = self.bound.min(self.index + count);
        let tail = self.index..tail_end;
        let head = 0..(count - tail.len());
        (tail, head)
    }
}

impl Add<usize> for RingCursor {
    type Output = RingCursor;

    fn add(self, offset: usize) -> Self::Output {
        RingCursor { index: (self.index + offset % self.bound) % self.bound, bound: self.bound }
    }
}

impl AddAssign<usize> for RingCursor {
    fn add_assign(&mut self, offset: usize) {
        *self = *self + offset
    }
}

/// Linear staging buffer between the ring and the output file. Allocated once per run.
#[derive(Debug)]
pub struct WriteChunk {
    samples: Box<[f64]>,
    filled: usize,
}

impl WriteChunk {
    pub fn new(size: usize) -> WriteChunk {
        WriteChunk { samples: vec![0.0; size].into_boxed_slice(), filled: 0 }
    }

    pub fn capacity(&self) -> usize {
        self.samples.len()
    }

    /// Replaces the contents with `count` samples read from the ring at `cursor`. `copy` is
    /// called with a ring offset and a destination and must not wrap; spans crossing the end
    /// of the ring are read as two calls, tail first.
    pub fn fill<F>(&mut self, cursor: RingCursor, count: usize, mut copy: F) -> Result<&[f64]>
            where F: FnMut(usize, &mut [f64]) -> Result<()> {
        assert!(count <= self.samples.len());
        self.filled = 0;
        let (tail, head) = cursor.segments(count);
        let (first, second) = self.samples[..count].split_at_mut(tail.len());
        copy(tail.start, first)?;
        if !head.is_empty() {
            log::trace!("chunk wraps: {:?} then {:?}", tail, head);
            copy(head.start, second)?;
        }
        self.filled = count;
        Ok(&self.samples[..count])
    }

    pub fn clear(&mut self) {
        self.filled = 0;
    }
}

impl Deref for WriteChunk {
    type Target = [f64];

    fn deref(&self) -> &[f64] {
        &self.samples[..self.filled]
    }
}
