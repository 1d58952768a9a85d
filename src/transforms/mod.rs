#![allow(missing_docs)]

use crate::event::LogEvent;

pub mod multiline;

/// Transforms that are simple, and don't require attention to coordination.
/// You can run them as simple functions over events in any order.
///
/// Implementations that keep state across calls share it between clones, so
/// a cloned transform handed to another task sees the same open groups.
pub trait FunctionTransform: Send + dyn_clone::DynClone + Sync {
    fn transform(&mut self, output: &mut OutputBuffer, event: LogEvent);
}

dyn_clone::clone_trait_object!(FunctionTransform);

#[derive(Debug, Default, Clone, PartialEq)]
pub struct OutputBuffer(Vec<LogEvent>);

impl OutputBuffer {
    pub fn with_capacity(capacity: usize) -> Self {
        Self(Vec::with_capacity(capacity))
    }

    pub fn push(&mut self, event: LogEvent) {
        self.0.push(event);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn first(&self) -> Option<&LogEvent> {
        self.0.first()
    }

    pub fn drain(&mut self) -> impl Iterator<Item = LogEvent> + '_ {
        self.0.drain(..)
    }
}
