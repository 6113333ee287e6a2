//! Cooperative slice queue for incremental rendering
//!
//! Work units are queued FIFO and run one per `pump`, which the main loop
//! calls once per frame. A unit that has started always runs to completion;
//! cancellation only ever discards units that haven't started. Each unit is
//! tagged with the generation it was queued under, and `cancel_all` bumps
//! the generation so nothing stale can land after a newer state.

use std::collections::VecDeque;

type Unit<T> = Box<dyn FnOnce(&mut T)>;

struct Slice<T> {
    generation: u64,
    work: Unit<T>,
}

/// FIFO queue of cooperative work units targeting `T`.
pub struct SliceQueue<T> {
    pending: VecDeque<Slice<T>>,
    generation: u64,
}

impl<T> Default for SliceQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> SliceQueue<T> {
    pub fn new() -> Self {
        Self {
            pending: VecDeque::new(),
            generation: 0,
        }
    }

    /// Current render generation.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Queue a unit under the current generation.
    pub fn submit(&mut self, work: impl FnOnce(&mut T) + 'static) {
        self.pending.push_back(Slice {
            generation: self.generation,
            work: Box::new(work),
        });
    }

    /// Invalidate every queued-but-not-started unit and start a new
    /// generation. Returns how many units were discarded.
    pub fn cancel_all(&mut self) -> usize {
        self.generation += 1;
        let dropped = self.pending.len();
        self.pending.clear();
        dropped
    }

    /// Run at most one queued unit. Returns whether a unit ran.
    pub fn pump(&mut self, target: &mut T) -> bool {
        while let Some(slice) = self.pending.pop_front() {
            // Stale units can only exist if queued after a cancel bump,
            // which submit prevents; skip defensively all the same.
            if slice.generation != self.generation {
                continue;
            }
            (slice.work)(target);
            return true;
        }
        false
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    pub fn is_idle(&self) -> bool {
        self.pending.is_empty()
    }
}
