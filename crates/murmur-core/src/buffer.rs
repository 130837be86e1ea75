//! Reference-counted sample buffer pool.
//!
//! The [`BufferPool`] owns every sample buffer a compiled graph reads or writes.
//! Buffers are handed out during compilation with a reader count equal to the
//! fan-out of the outlet that writes them. Each reader releases its reference
//! once its unit has been placed in the order, and a buffer whose count reaches
//! zero goes back on the free list where a later unit in the same order may
//! pick it up.
//!
//! Because acquisition order matches execution order, recycling a buffer this
//! way never lets a later writer clobber data an earlier reader still needs.
//!
//! The pool only grows while a graph is being compiled. Processing a block
//! touches existing buffers and never allocates.

use std::fmt;

/// Identifier of a sample buffer owned by a [`BufferPool`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BufferId(pub(crate) u32);

impl BufferId {
    /// The shared, read-only, all-zero buffer.
    pub const ZERO: Self = Self(u32::MAX);

    /// Returns the raw numeric identifier.
    #[inline]
    pub fn index(self) -> u32 {
        self.0
    }

    /// Returns true for the shared zero buffer.
    #[inline]
    pub fn is_zero(self) -> bool {
        self == Self::ZERO
    }
}

impl fmt::Display for BufferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_zero() {
            write!(f, "buf[zero]")
        } else {
            write!(f, "buf[{}]", self.0)
        }
    }
}

/// Accounting snapshot of a [`BufferPool`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Buffers allocated so far.
    pub allocated: usize,
    /// Buffers currently charged with at least one reader.
    pub live: usize,
    /// Calls to [`BufferPool::acquire`] since the last reset.
    pub acquired: u64,
    /// Buffers returned to the free list since the last reset.
    pub released: u64,
}

/// Pool of block-sized sample buffers keyed by reference count.
pub struct BufferPool {
    block_size: usize,
    buffers: Vec<Box<[f32]>>,
    readers: Vec<u32>,
    free: Vec<u32>,
    zero: Box<[f32]>,
    acquired: u64,
    released: u64,
}

impl BufferPool {
    /// Creates an empty pool for the given block size.
    pub fn new(block_size: usize) -> Self {
        Self::with_capacity(block_size, 0)
    }

    /// Creates a pool with `count` buffers already allocated and free.
    pub fn with_capacity(block_size: usize, count: usize) -> Self {
        let mut pool = Self {
            block_size,
            buffers: Vec::with_capacity(count),
            readers: Vec::with_capacity(count),
            free: Vec::with_capacity(count),
            zero: vec![0.0; block_size].into_boxed_slice(),
            acquired: 0,
            released: 0,
        };
        for _ in 0..count {
            pool.allocate();
        }
        pool.reset();
        pool
    }

    /// Returns the number of samples in every buffer.
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Returns the number of allocated buffers, excluding the zero buffer.
    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    /// Returns true if no buffer has been allocated yet.
    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    /// Returns the shared all-zero buffer.
    #[inline]
    pub fn zero_buffer(&self) -> BufferId {
        BufferId::ZERO
    }

    /// Takes a free buffer and charges it with `readers` outstanding reads.
    ///
    /// A buffer acquired with no readers is written but never read, so it goes
    /// straight back on the free list.
    pub fn acquire(&mut self, readers: usize) -> BufferId {
        let idx = match self.free.pop() {
            Some(idx) => idx,
            None => self.allocate(),
        };
        self.acquired += 1;
        if readers == 0 {
            self.free.push(idx);
            self.released += 1;
        } else {
            self.readers[idx as usize] = readers as u32;
        }
        BufferId(idx)
    }

    /// Adds `additional` readers to a buffer that is already charged.
    ///
    /// # Panics
    ///
    /// Panics if the buffer is on the free list.
    pub fn reserve(&mut self, id: BufferId, additional: usize) {
        if id.is_zero() || additional == 0 {
            return;
        }
        let count = &mut self.readers[id.0 as usize];
        assert!(*count > 0, "reserve on free buffer {id}");
        *count += additional as u32;
    }

    /// Drops one reader from a buffer, freeing it when none remain.
    ///
    /// # Panics
    ///
    /// Panics on underflow, which means a unit released a buffer it never held.
    pub fn release(&mut self, id: BufferId) {
        if id.is_zero() {
            return;
        }
        let count = &mut self.readers[id.0 as usize];
        assert!(*count > 0, "buffer pool underflow on {id}");
        *count -= 1;
        if *count == 0 {
            self.free.push(id.0);
            self.released += 1;
        }
    }

    /// Returns the number of outstanding readers of a buffer.
    pub fn readers(&self, id: BufferId) -> usize {
        if id.is_zero() {
            0
        } else {
            self.readers[id.0 as usize] as usize
        }
    }

    /// Frees every buffer and clears the counters. Memory is kept.
    pub fn reset(&mut self) {
        self.readers.fill(0);
        self.free.clear();
        self.free.extend((0..self.buffers.len() as u32).rev());
        self.acquired = 0;
        self.released = 0;
    }

    /// Returns an accounting snapshot.
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            allocated: self.buffers.len(),
            live: self.readers.iter().filter(|&&r| r > 0).count(),
            acquired: self.acquired,
            released: self.released,
        }
    }

    /// Returns the samples of a buffer.
    #[inline]
    pub fn get(&self, id: BufferId) -> &[f32] {
        if id.is_zero() {
            &self.zero
        } else {
            &self.buffers[id.0 as usize]
        }
    }

    /// Returns the samples of a buffer for writing.
    ///
    /// # Panics
    ///
    /// Panics when asked for the zero buffer.
    #[inline]
    pub fn get_mut(&mut self, id: BufferId) -> &mut [f32] {
        assert!(!id.is_zero(), "the zero buffer is read-only");
        &mut self.buffers[id.0 as usize]
    }

    /// Moves a buffer's storage out so it can be written while other buffers
    /// are read. Must be handed back with [`restore`](Self::restore).
    #[inline]
    pub(crate) fn take(&mut self, id: BufferId) -> Box<[f32]> {
        std::mem::take(&mut self.buffers[id.0 as usize])
    }

    #[inline]
    pub(crate) fn restore(&mut self, id: BufferId, samples: Box<[f32]>) {
        debug_assert_eq!(samples.len(), self.block_size);
        self.buffers[id.0 as usize] = samples;
    }

    /// Writes `left + right` into `out`. `out` must differ from both inputs.
    pub fn sum_into(&mut self, left: BufferId, right: BufferId, out: BufferId) {
        debug_assert!(out != left && out != right);
        let mut dst = self.take(out);
        for ((d, &l), &r) in dst.iter_mut().zip(self.get(left)).zip(self.get(right)) {
            *d = l + r;
        }
        self.restore(out, dst);
    }

    fn allocate(&mut self) -> u32 {
        let idx = self.buffers.len() as u32;
        self.buffers.push(vec![0.0; self.block_size].into_boxed_slice());
        self.readers.push(0);
        idx
    }
}

impl fmt::Debug for BufferPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferPool")
            .field("block_size", &self.block_size)
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}
