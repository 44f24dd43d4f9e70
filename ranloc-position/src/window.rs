//! Per-entity feature windows

use std::collections::VecDeque;

/// One measurement's feature vector.
pub type FeatureRow = Vec<f64>;

/// Fixed-length ring of the most recent feature rows for one entity.
///
/// Sequence prediction needs a full window; until then rows accumulate,
/// and once full the oldest row leaves as each new one arrives.
#[derive(Debug, Clone)]
pub struct WindowBuffer {
    rows: VecDeque<FeatureRow>,
    lookback: usize,
}

impl WindowBuffer {
    pub fn new(lookback: usize) -> Self {
        Self {
            rows: VecDeque::with_capacity(lookback),
            lookback,
        }
    }

    /// Appends a row, evicting the oldest when full. A row of a
    /// different width than the buffered ones resets the window first
    /// (the stream switched wire variants mid-flight).
    pub fn push(&mut self, row: FeatureRow) {
        if let Some(front) = self.rows.front() {
            if front.len() != row.len() {
                self.rows.clear();
            }
        }
        if self.rows.len() == self.lookback {
            self.rows.pop_front();
        }
        self.rows.push_back(row);
    }

    /// True once `lookback` rows are buffered.
    pub fn is_ready(&self) -> bool {
        self.rows.len() == self.lookback
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Ordered copy of the window, oldest first.
    pub fn snapshot(&self) -> Vec<FeatureRow> {
        self.rows.iter().cloned().collect()
    }
}
