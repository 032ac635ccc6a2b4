//! Non-relocating slot storage
//!
//! Segment `k` holds `32 << k` set-once slots and is allocated the first time
//! an index inside it is written. Segments are never moved or freed while the
//! log is alive, so a `&T` handed to a reader stays valid no matter how far
//! the writer grows the log.

use std::sync::OnceLock;

const FIRST_SEGMENT_SHIFT: u32 = 5;
const FIRST_SEGMENT_CAPACITY: usize = 1 << FIRST_SEGMENT_SHIFT;
const SEGMENT_COUNT: usize = 26;

/// Total number of slots across all segments
pub(crate) const CAPACITY: usize = FIRST_SEGMENT_CAPACITY * ((1 << SEGMENT_COUNT) - 1);

/// Append-only slots with wait-free reads
pub(crate) struct SegmentedLog<T> {
    segments: Box<[OnceLock<Box<[OnceLock<T>]>>]>,
}

impl<T> SegmentedLog<T> {
    pub fn new() -> Self {
        let segments = (0..SEGMENT_COUNT).map(|_| OnceLock::new()).collect();
        Self { segments }
    }

    /// Read slot `index`; `None` if it was never written.
    ///
    /// Never blocks: `OnceLock::get` is a single acquire load.
    pub fn get(&self, index: usize) -> Option<&T> {
        let (segment, offset) = locate(index);
        self.segments.get(segment)?.get()?.get(offset)?.get()
    }

    /// Write slot `index`. Hands the value back if the slot is out of range or
    /// already written.
    ///
    /// Must only be called by the ledger's single writer.
    pub fn set(&self, index: usize, value: T) -> Result<(), T> {
        let (segment, offset) = locate(index);
        let Some(cell) = self.segments.get(segment) else {
            return Err(value);
        };
        let slots = cell.get_or_init(|| {
            (0..FIRST_SEGMENT_CAPACITY << segment)
                .map(|_| OnceLock::new())
                .collect()
        });
        match slots.get(offset) {
            Some(slot) => slot.set(value),
            None => Err(value),
        }
    }
}

impl<T> Default for SegmentedLog<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Map a flat index to (segment, offset within segment)
fn locate(index: usize) -> (usize, usize) {
    let biased = index / FIRST_SEGMENT_CAPACITY + 1;
    let segment = (usize::BITS - 1 - biased.leading_zeros()) as usize;
    let segment_start = FIRST_SEGMENT_CAPACITY * ((1usize << segment) - 1);
    (segment, index - segment_start)
}
