//! The bounded run of encoder output kept for resumption.

use std::collections::VecDeque;

use bytes::Bytes;

/// The most recent encoder output blocks and the absolute byte range they
/// cover.
///
/// `end - start` always equals the total length of the retained blocks.
#[derive(Debug, Clone)]
pub struct RetainedWindow {
    blocks: VecDeque<Bytes>,
    start: u64,
    end: u64,
    max_blocks: usize,
}

impl RetainedWindow {
    pub fn new(max_blocks: usize) -> Self {
        Self {
            blocks: VecDeque::with_capacity(max_blocks + 1),
            start: 0,
            end: 0,
            max_blocks,
        }
    }

    /// Absolute offset of the first retained byte.
    pub fn start(&self) -> u64 {
        self.start
    }

    /// Absolute offset one past the last byte produced so far.
    pub fn end(&self) -> u64 {
        self.end
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Whether `offset` falls inside the retained bytes.
    pub fn covers(&self, offset: u64) -> bool {
        self.start <= offset && offset < self.end
    }

    /// Append a block, evicting the oldest ones beyond the cap.
    pub fn push(&mut self, block: Bytes) {
        self.end += block.len() as u64;
        self.blocks.push_back(block);
        while self.blocks.len() > self.max_blocks {
            match self.blocks.pop_front() {
                Some(evicted) => self.start += evicted.len() as u64,
                None => break,
            }
        }
    }

    /// The retained bytes from `offset` on, as cheap slices of the blocks.
    ///
    /// Returns nothing when `offset` is not covered.
    pub fn replay_from(&self, offset: u64) -> Vec<Bytes> {
        if !self.covers(offset) {
            return Vec::new();
        }
        let mut skip = offset - self.start;
        let mut out = Vec::with_capacity(self.blocks.len());
        for block in &self.blocks {
            let len = block.len() as u64;
            if skip >= len {
                skip -= len;
                continue;
            }
            out.push(block.slice(skip as usize..));
            skip = 0;
        }
        out
    }

    /// Forget the retained bytes once they have been delivered.
    pub fn clear(&mut self) {
        self.blocks.clear();
        self.start = self.end;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(byte: u8, len: usize) -> Bytes {
        Bytes::from(vec![byte; len])
    }

    #[test]
    fn empty_window_covers_nothing() {
        let window = RetainedWindow::new(2);
        assert!(!window.covers(0));
        assert_eq!(window.end(), 0);
        assert!(window.replay_from(0).is_empty());
    }

    #[test]
    fn evicts_oldest_block_over_cap() {
        let mut window = RetainedWindow::new(2);
        window.push(block(b'a', 10));
        window.push(block(b'b', 10));
        window.push(block(b'c', 5));

        assert_eq!(window.block_count(), 2);
        assert_eq!(window.start(), 10);
        assert_eq!(window.end(), 25);
        assert!(!window.covers(9));
        assert!(window.covers(10));
        assert!(window.covers(24));
        assert!(!window.covers(25));
    }

    #[test]
    fn replay_slices_first_block() {
        let mut window = RetainedWindow::new(2);
        window.push(block(b'a', 10));
        window.push(block(b'b', 10));

        let replay = window.replay_from(13);
        assert_eq!(replay.len(), 1);
        assert_eq!(replay[0], block(b'b', 7));

        let replay = window.replay_from(4);
        assert_eq!(replay.len(), 2);
        assert_eq!(replay[0], block(b'a', 6));
        assert_eq!(replay[1], block(b'b', 10));
    }

    #[test]
    fn clear_moves_start_to_end() {
        let mut window = RetainedWindow::new(2);
        window.push(block(b'a', 10));
        window.clear();
        assert!(window.is_empty());
        assert_eq!(window.start(), 10);
        assert_eq!(window.end(), 10);

        window.push(block(b'b', 4));
        assert_eq!(window.start(), 10);
        assert_eq!(window.end(), 14);
    }

    #[test]
    fn zero_cap_retains_nothing() {
        let mut window = RetainedWindow::new(0);
        window.push(block(b'a', 10));
        assert!(window.is_empty());
        assert_eq!(window.start(), window.end());
    }
}
