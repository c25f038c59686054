//! Run detection over positional masks.

use serde::{Deserialize, Serialize};

/// Inclusive range of positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Run {
    pub start: usize,
    pub end: usize,
}

impl Run {
    pub fn new(start: usize, end: usize) -> Self {
        debug_assert!(start <= end);
        Run { start, end }
    }

    pub fn len(&self) -> usize {
        self.end - self.start + 1
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn contains(&self, pos: usize) -> bool {
        pos >= self.start && pos <= self.end
    }
}

/// Maximal runs of positions `0..len` where every position satisfies
/// `eligible` and every adjacent pair `(i - 1, i)` inside the run satisfies
/// `joins(i)`.
///
/// Runs never overlap and cannot be extended without violating one of the
/// two predicates.
pub fn chained_runs(
    len: usize,
    eligible: impl Fn(usize) -> bool,
    joins: impl Fn(usize) -> bool,
) -> Vec<Run> {
    let mut runs = Vec::new();
    let mut start: Option<usize> = None;
    for i in 0..len {
        if !eligible(i) {
            if let Some(s) = start.take() {
                runs.push(Run::new(s, i - 1));
            }
            continue;
        }
        match start {
            Some(s) if !joins(i) => {
                runs.push(Run::new(s, i - 1));
                start = Some(i);
            }
            Some(_) => {}
            None => start = Some(i),
        }
    }
    if let Some(s) = start {
        runs.push(Run::new(s, len - 1));
    }
    runs
}
