//! Dense sequence allocator
//!
//! Geometry, material and texture indices are dense integers consumed by the
//! hit shaders. Each table owns one `SequenceAllocator`; indices are only
//! handed out and given back through it.

use std::ops::Range;

/// Allocator for a dense `0..len` index sequence
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SequenceAllocator {
    next: u32,
}

impl SequenceAllocator {
    /// Create an empty allocator
    pub fn new() -> Self {
        Self::default()
    }

    /// Hand out the next index
    pub fn allocate_index(&mut self) -> u32 {
        let index = self.next;
        self.next += 1;
        index
    }

    /// Give back a range of indices
    ///
    /// The owner reindexes everything above `range` downward by its length.
    /// Returns `false` (and changes nothing) for a range outside `0..len`.
    pub fn release_range(&mut self, range: Range<u32>) -> bool {
        if range.start > range.end || range.end > self.next {
            log::warn!("Ignoring release of {:?} from sequence of {}", range, self.next);
            return false;
        }
        self.next -= range.end - range.start;
        true
    }

    /// Give back every index
    pub fn release_all(&mut self) {
        self.next = 0;
    }

    /// Number of live indices
    pub fn len(&self) -> u32 {
        self.next
    }

    /// Whether no index is live
    pub fn is_empty(&self) -> bool {
        self.next == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocation_is_dense() {
        let mut allocator = SequenceAllocator::new();
        assert_eq!(allocator.allocate_index(), 0);
        assert_eq!(allocator.allocate_index(), 1);
        assert_eq!(allocator.allocate_index(), 2);
        assert_eq!(allocator.len(), 3);
    }

    #[test]
    fn test_release_shrinks_sequence() {
        let mut allocator = SequenceAllocator::new();
        for _ in 0..4 {
            allocator.allocate_index();
        }
        assert!(allocator.release_range(1..2));
        assert_eq!(allocator.allocate_index(), 3);
    }

    #[test]
    fn test_out_of_range_release_is_rejected() {
        let mut allocator = SequenceAllocator::new();
        allocator.allocate_index();
        assert!(!allocator.release_range(0..2));
        assert_eq!(allocator.len(), 1);
    }
}
