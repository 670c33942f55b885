use std::collections::VecDeque;

/// Bounded first-in first-out queue with a fixed depth.
#[derive(Debug, Clone)]
pub struct SyncFifo<T> {
    entries: VecDeque<T>,
    depth: usize,
    high_water: usize,
}

impl<T> SyncFifo<T> {
    pub fn new(depth: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(depth),
            depth,
            high_water: 0,
        }
    }

    /// Hands the item back when the FIFO is full.
    pub fn push(&mut self, item: T) -> Result<(), T> {
        if self.is_full() {
            return Err(item);
        }
        self.entries.push_back(item);
        self.high_water = self.high_water.max(self.entries.len());
        Ok(())
    }

    pub fn pop(&mut self) -> Option<T> {
        self.entries.pop_front()
    }

    pub fn front(&self) -> Option<&T> {
        self.entries.front()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.entries.len() >= self.depth
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Highest fill level seen so far.
    pub fn high_water(&self) -> usize {
        self.high_water
    }

    pub fn free(&self) -> usize {
        self.depth.saturating_sub(self.entries.len())
    }
}
