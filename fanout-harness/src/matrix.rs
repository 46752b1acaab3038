use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet};

use fanout_common::StrategyKind;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum MatrixError {
    #[error("timing for {strategy} at batch size {batch_size} is already recorded")]
    Duplicate {
        strategy: StrategyKind,
        batch_size: usize,
    },
    #[error("elapsed time {0} ms is not a finite, non-negative number")]
    InvalidElapsed(f64),
}

/// Elapsed milliseconds per (strategy, batch size). Cells are written once.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TimingMatrix {
    cells: BTreeMap<(StrategyKind, usize), f64>,
}

impl TimingMatrix {
    pub fn new() -> Self {
        Self::default()
    }

    /// ```
    /// use fanout_harness::{StrategyKind, TimingMatrix};
    ///
    /// let mut matrix = TimingMatrix::new();
    /// matrix.record(StrategyKind::Async, 3, 41.5).unwrap();
    /// assert_eq!(matrix.get(StrategyKind::Async, 3), Some(41.5));
    /// assert!(matrix.record(StrategyKind::Async, 3, 40.0).is_err());
    /// ```
    pub fn record(
        &mut self,
        strategy: StrategyKind,
        batch_size: usize,
        elapsed_ms: f64,
    ) -> Result<(), MatrixError> {
        if !elapsed_ms.is_finite() || elapsed_ms < 0.0 {
            return Err(MatrixError::InvalidElapsed(elapsed_ms));
        }
        match self.cells.entry((strategy, batch_size)) {
            Entry::Occupied(_) => Err(MatrixError::Duplicate {
                strategy,
                batch_size,
            }),
            Entry::Vacant(slot) => {
                slot.insert(elapsed_ms);
                Ok(())
            }
        }
    }

    pub fn get(&self, strategy: StrategyKind, batch_size: usize) -> Option<f64> {
        self.cells.get(&(strategy, batch_size)).copied()
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Cells ordered by strategy, then batch size.
    pub fn iter(&self) -> impl Iterator<Item = (StrategyKind, usize, f64)> + '_ {
        self.cells.iter().map(|(&(s, n), &ms)| (s, n, ms))
    }

    pub fn strategies(&self) -> Vec<StrategyKind> {
        self.cells
            .keys()
            .map(|&(s, _)| s)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn batch_sizes(&self) -> Vec<usize> {
        self.cells
            .keys()
            .map(|&(_, n)| n)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// `(batch size, ms)` points for one strategy, ascending by batch size.
    pub fn series(&self, strategy: StrategyKind) -> Vec<(usize, f64)> {
        self.cells
            .range((strategy, 0)..=(strategy, usize::MAX))
            .map(|(&(_, n), &ms)| (n, ms))
            .collect()
    }

    /// True when exactly the given grid is filled.
    pub fn is_complete(&self, strategies: &[StrategyKind], batch_sizes: &[usize]) -> bool {
        let expected: BTreeSet<(StrategyKind, usize)> = strategies
            .iter()
            .flat_map(|&s| batch_sizes.iter().map(move |&n| (s, n)))
            .collect();
        expected.len() == self.cells.len() && expected.iter().all(|k| self.cells.contains_key(k))
    }
}
