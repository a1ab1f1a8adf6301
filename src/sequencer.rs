//! Step sequencer
//!
//! A resumable cursor over one scenario's steps. The execution pass pulls
//! steps until one stalls; the replay pass then drains whatever is left from
//! the same cursor, so no step is ever handed out twice.
//!
//! Exhaustion is a state, not an error: once the last step has been yielded,
//! every further call returns `None`.

use std::iter::FusedIterator;
use crate::model::Step;

/// Cursor lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorState {
    /// Nothing yielded yet
    NotStarted,
    /// At least one step yielded, more may follow
    Running,
    /// Every step has been yielded
    Exhausted,
}

/// Resumable cursor over a scenario's step list
#[derive(Debug, Clone)]
pub struct StepCursor<'a> {
    steps: &'a [Step],
    index: usize,
    state: CursorState,
}

impl<'a> StepCursor<'a> {
    pub fn new(steps: &'a [Step]) -> Self {
        let state = if steps.is_empty() {
            CursorState::Exhausted
        } else {
            CursorState::NotStarted
        };
        Self { steps, index: 0, state }
    }

    pub fn state(&self) -> CursorState {
        self.state
    }

    pub fn is_exhausted(&self) -> bool {
        self.state == CursorState::Exhausted
    }

    /// Number of steps already handed out
    pub fn yielded(&self) -> usize {
        self.index
    }

    /// Number of steps not yet handed out
    pub fn remaining(&self) -> usize {
        self.steps.len() - self.index
    }

    /// Index (into the scenario's step list) of the step `next` will yield
    pub fn position(&self) -> usize {
        self.index
    }
}

impl<'a> Iterator for StepCursor<'a> {
    type Item = &'a Step;

    fn next(&mut self) -> Option<&'a Step> {
        if self.state == CursorState::Exhausted {
            return None;
        }
        let step = self.steps.get(self.index)?;
        self.index += 1;
        self.state = if self.index == self.steps.len() {
            CursorState::Exhausted
        } else {
            CursorState::Running
        };
        Some(step)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = self.remaining();
        (n, Some(n))
    }
}

impl ExactSizeIterator for StepCursor<'_> {}

impl FusedIterator for StepCursor<'_> {}
