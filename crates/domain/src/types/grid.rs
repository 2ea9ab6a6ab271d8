//! Fixed-resolution timeline covering one 24h window

use std::ops::RangeInclusive;

use serde::Serialize;

use crate::constants::SECONDS_PER_DAY;
use crate::errors::{Result, ServerTideError};

/// Three parallel sequences describing one day in equally sized slots.
///
/// Invariants upheld by construction:
/// - `instants`, `active` and `variants` always have the same length
/// - `instants` is strictly increasing with a constant step of
///   `step_seconds`
///
/// A default grid is empty; the evaluator treats that as an invariant
/// violation rather than "never active".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TimeGrid {
    instants: Vec<i64>,
    active: Vec<bool>,
    variants: Vec<String>,
    step_seconds: i64,
}

/// Read-only view of one grid slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridSlot<'a> {
    /// Unix timestamp (seconds) at which the slot starts
    pub instant: i64,
    pub active: bool,
    pub variant: &'a str,
}

impl TimeGrid {
    /// Build an all-inactive grid for the window `[window_start, window_start + 24h - 1s]`.
    ///
    /// # Errors
    /// Returns `ServerTideError::Invariant` when `step_seconds` is not a
    /// positive divisor of one day.
    pub fn new(window_start: i64, step_seconds: i64) -> Result<Self> {
        if step_seconds <= 0 || SECONDS_PER_DAY % step_seconds != 0 {
            return Err(ServerTideError::Invariant(format!(
                "grid step of {step_seconds}s does not divide a day"
            )));
        }

        let window_end = window_start + SECONDS_PER_DAY - 1;
        let step = usize::try_from(step_seconds)
            .map_err(|_| ServerTideError::Invariant("grid step out of range".into()))?;
        let instants: Vec<i64> = (window_start..window_end).step_by(step).collect();
        let len = instants.len();

        Ok(Self {
            instants,
            active: vec![false; len],
            variants: vec![String::new(); len],
            step_seconds,
        })
    }

    pub fn len(&self) -> usize {
        self.instants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instants.is_empty()
    }

    pub fn step_seconds(&self) -> i64 {
        self.step_seconds
    }

    pub fn instants(&self) -> &[i64] {
        &self.instants
    }

    pub fn active(&self) -> &[bool] {
        &self.active
    }

    pub fn variants(&self) -> &[String] {
        &self.variants
    }

    pub fn first_instant(&self) -> Option<i64> {
        self.instants.first().copied()
    }

    pub fn last_instant(&self) -> Option<i64> {
        self.instants.last().copied()
    }

    /// Index of the slot starting exactly at `instant`, if any.
    pub fn index_of(&self, instant: i64) -> Option<usize> {
        let first = self.first_instant()?;
        let offset = instant.checked_sub(first)?;
        if offset < 0 || offset % self.step_seconds != 0 {
            return None;
        }
        let index = usize::try_from(offset / self.step_seconds).ok()?;
        (index < self.len()).then_some(index)
    }

    pub fn slot(&self, index: usize) -> Option<GridSlot<'_>> {
        Some(GridSlot {
            instant: *self.instants.get(index)?,
            active: *self.active.get(index)?,
            variant: self.variants.get(index)?.as_str(),
        })
    }

    pub fn slots(&self) -> impl Iterator<Item = GridSlot<'_>> + '_ {
        (0..self.len()).filter_map(|index| self.slot(index))
    }

    pub fn active_count(&self) -> usize {
        self.active.iter().filter(|active| **active).count()
    }

    /// Mark every slot in `range` active and stamp it with `variant`.
    ///
    /// The range end is clamped to the last slot; an empty or out-of-grid
    /// range is ignored. Later calls overwrite the variant of slots marked
    /// by earlier ones.
    pub fn mark(&mut self, range: RangeInclusive<usize>, variant: &str) {
        let Some(last) = self.len().checked_sub(1) else {
            return;
        };
        let start = *range.start();
        let end = (*range.end()).min(last);
        if start > end {
            return;
        }

        for index in start..=end {
            self.active[index] = true;
            if self.variants[index] != variant {
                self.variants[index] = variant.to_string();
            }
        }
    }
}
