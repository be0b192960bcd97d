//! Scratch memory targeted by the memory activity patterns.
//!
//! The region is deliberately larger than any cache level so memory
//! activities load the memory subsystem rather than L1/L2. Read and write
//! cursors persist across segments: a second `MEMORY` segment continues
//! where the previous one stopped instead of re-warming the same lines.

use rattle_common::config::{DEFAULT_SCRATCH_WORDS, MIN_SCRATCH_WORDS};
use static_assertions::const_assert;
use tracing::debug;

/// Word distance between two consecutive reads (1028 bytes, well past a cache line).
pub const READ_STRIDE_WORDS: usize = 257;

/// Words written per write step.
pub const WRITE_RUN_WORDS: usize = 4;

const_assert!(DEFAULT_SCRATCH_WORDS.is_power_of_two());
const_assert!(MIN_SCRATCH_WORDS.is_power_of_two());
const_assert!(MIN_SCRATCH_WORDS % WRITE_RUN_WORDS == 0);
const_assert!(READ_STRIDE_WORDS * 4 > 128);

/// Power-of-two block of 32-bit words with persistent access cursors.
#[derive(Debug)]
pub struct ScratchRegion {
    words: Box<[u32]>,
    mask: usize,
    read_cursor: usize,
    write_cursor: usize,
}

impl ScratchRegion {
    /// Allocate and fill a region of `words` words with all-ones.
    ///
    /// `words` is rounded up to a power of two no smaller than
    /// [`MIN_SCRATCH_WORDS`]; validated configurations are never adjusted.
    #[must_use]
    pub fn new(words: usize) -> Self {
        let words = words.max(MIN_SCRATCH_WORDS).next_power_of_two();
        debug!(words, bytes = words * 4, "Allocating scratch region");
        Self {
            words: vec![u32::MAX; words].into_boxed_slice(),
            mask: words - 1,
            read_cursor: 0,
            write_cursor: 0,
        }
    }

    /// Number of words in the region.
    #[must_use]
    pub fn len(&self) -> usize {
        self.words.len()
    }

    /// Always false; the region holds at least [`MIN_SCRATCH_WORDS`] words.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Read-only view of the words.
    #[must_use]
    pub fn words(&self) -> &[u32] {
        &self.words
    }

    /// Advance the read cursor by one stride and load the word there.
    #[inline(always)]
    pub(crate) fn read_next(&mut self) -> u32 {
        self.read_cursor = (self.read_cursor + READ_STRIDE_WORDS) & self.mask;
        self.words[self.read_cursor]
    }

    /// Store `value` into the next run of words and advance the write cursor.
    #[inline(always)]
    pub(crate) fn write_next(&mut self, value: u32) {
        let start = self.write_cursor;
        for word in &mut self.words[start..start + WRITE_RUN_WORDS] {
            // SAFETY: `word` is a valid, aligned, exclusive reference into the
            // region. The volatile store keeps the compiler from eliding writes
            // that are never read back.
            unsafe { std::ptr::write_volatile(word, value) };
        }
        self.write_cursor = (start + WRITE_RUN_WORDS) & self.mask;
    }

    /// Current read cursor position in words.
    #[must_use]
    pub fn read_cursor(&self) -> usize {
        self.read_cursor
    }

    /// Current write cursor position in words.
    #[must_use]
    pub fn write_cursor(&self) -> usize {
        self.write_cursor
    }
}
