/// Pending declarations waiting for their parent
///
/// States may be registered in any order. A declaration stays queued until
/// its parent has been built; [`StateQueue::flush`] keeps passing over the
/// queue until it is empty or two full passes in a row build nothing.
use std::collections::VecDeque;

use tracing::trace;

use super::declaration::StateDeclaration;
use super::object::State;
use crate::error::RouterError;

/// Consecutive passes without progress before a flush gives up
const STALL_LIMIT: usize = 2;

#[derive(Debug, Default)]
pub struct StateQueue {
    queue: VecDeque<StateDeclaration>,
}

impl StateQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, declaration: StateDeclaration, prepend: bool) {
        if prepend {
            self.queue.push_front(declaration);
        } else {
            self.queue.push_back(declaration);
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.queue.iter().any(|d| d.name == name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.queue.iter().map(|d| d.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Builds queued declarations in order
    ///
    /// `try_build` returns `Ok(None)` when the declaration is not ready (its
    /// parent is missing). A build error drops that declaration and stops the
    /// flush. When the queue stalls, the orphans stay queued and the first
    /// one is reported.
    pub fn flush<F>(&mut self, mut try_build: F) -> Result<Vec<State>, RouterError>
    where
        F: FnMut(&StateDeclaration) -> Result<Option<State>, RouterError>,
    {
        let mut built = Vec::new();
        let mut stalled = 0;

        while !self.queue.is_empty() {
            let mut progress = false;

            for _ in 0..self.queue.len() {
                let Some(declaration) = self.queue.pop_front() else {
                    break;
                };
                match try_build(&declaration)? {
                    Some(state) => {
                        built.push(state);
                        progress = true;
                    }
                    None => {
                        trace!(state = %declaration.name, "parent not ready, requeued");
                        self.queue.push_back(declaration);
                    }
                }
            }

            stalled = if progress { 0 } else { stalled + 1 };
            if stalled >= STALL_LIMIT {
                let orphan = self.queue.front().map(|d| d.name.clone()).unwrap_or_default();
                return Err(RouterError::OrphanedState(orphan));
            }
        }

        Ok(built)
    }
}
