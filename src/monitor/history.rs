use std::collections::VecDeque;

/// Default number of probe outcomes kept per monitor.
pub const DEFAULT_HISTORY_SIZE: usize = 10;

/// Fixed-capacity FIFO of probe outcomes, `true` meaning up.
#[derive(Debug, Clone)]
pub struct HistoryWindow {
    outcomes: VecDeque<bool>,
    capacity: usize,
}

impl HistoryWindow {
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            outcomes: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn record(&mut self, up: bool) {
        if self.outcomes.len() == self.capacity {
            self.outcomes.pop_front();
        }
        self.outcomes.push_back(up);
    }

    pub fn down_count(&self) -> usize {
        self.outcomes.iter().filter(|up| !**up).count()
    }

    /// Down outcomes among the `n` most recent entries.
    pub fn recent_down_count(&self, n: usize) -> usize {
        let skip = self.outcomes.len().saturating_sub(n);
        self.outcomes.iter().skip(skip).filter(|up| !**up).count()
    }

    pub fn size(&self) -> usize {
        self.outcomes.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
