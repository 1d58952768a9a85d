use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc, Mutex, MutexGuard, PoisonError,
};

use dashmap::DashMap;

use crate::event::{Discriminant, LogEvent, ObjectMap};

/// The in-progress group of a single stream.
///
/// The event that opened the group is kept as the anchor: every field of the
/// emitted event except the source field comes from it.
#[derive(Debug)]
pub struct StreamBuffer {
    anchor: LogEvent,
    message: String,
    captures: ObjectMap,
    lines: usize,
    dirty: bool,
    opened: u64,
}

/// A closed group, ready to be emitted.
#[derive(Debug)]
pub struct Finished {
    pub event: LogEvent,
    pub lines: usize,
    pub dirty: bool,
}

impl StreamBuffer {
    pub fn new(anchor: LogEvent, line: String, captures: ObjectMap, opened: u64) -> Self {
        Self {
            anchor,
            message: line,
            captures,
            lines: 1,
            dirty: false,
            opened,
        }
    }

    /// Appends a continuation line. Captures only fill names that are not yet
    /// set.
    pub fn merge(&mut self, line: &str, captures: ObjectMap) {
        self.message.push('\n');
        self.message.push_str(line);
        for (name, value) in captures {
            self.captures.entry(name).or_insert(value);
        }
        self.lines += 1;
        self.dirty = true;
    }

    /// Builds the emitted event. The source field is only rewritten when a
    /// merge happened, so single lines leave the anchor untouched.
    pub fn finish(self, source: &str) -> Finished {
        let Self {
            mut anchor,
            message,
            captures,
            lines,
            dirty,
            ..
        } = self;

        for (name, value) in captures {
            anchor.insert(name, value);
        }
        if dirty {
            anchor.insert(source, message);
        }

        Finished {
            event: anchor,
            lines,
            dirty,
        }
    }
}

#[derive(Debug, Default)]
struct Slot {
    buffer: Option<StreamBuffer>,
    // Set once the slot has been unlinked from the table. Anyone still
    // holding the `Arc` must look the key up again.
    retired: bool,
}

/// Open buffers keyed by stream.
///
/// Each stream owns a mutex of its own, so work on different streams never
/// contends beyond the brief shard access needed to find the slot. Slot
/// locks are always taken before shard locks and no map reference is held
/// while a slot is locked.
#[derive(Debug, Default)]
pub struct BufferTable {
    slots: DashMap<Discriminant, Arc<Mutex<Slot>>>,
    sequence: AtomicU64,
}

fn lock(slot: &Mutex<Slot>) -> MutexGuard<'_, Slot> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

impl BufferTable {
    /// A monotonically increasing number recording when a buffer was opened.
    pub fn next_sequence(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::Relaxed)
    }

    /// Runs `f` with exclusive access to the buffer of `key`, creating the
    /// entry on first use. If `f` leaves no buffer behind the entry is
    /// removed.
    pub fn with_buffer<R>(
        &self,
        key: &Discriminant,
        f: impl FnOnce(&mut Option<StreamBuffer>) -> R,
    ) -> R {
        loop {
            let existing = self.slots.get(key).map(|slot| Arc::clone(slot.value()));
            let slot = match existing {
                Some(slot) => slot,
                None => Arc::clone(self.slots.entry(key.clone()).or_default().value()),
            };

            let mut guard = lock(&slot);
            if guard.retired {
                continue;
            }

            let result = f(&mut guard.buffer);
            if guard.buffer.is_none() {
                guard.retired = true;
                self.slots
                    .remove_if(key, |_, current| Arc::ptr_eq(current, &slot));
            }
            return result;
        }
    }

    /// Takes every open buffer out of the table, oldest first.
    pub fn drain(&self) -> Vec<(Discriminant, StreamBuffer)> {
        let keys: Vec<Discriminant> = self.slots.iter().map(|entry| entry.key().clone()).collect();

        let mut drained = Vec::with_capacity(keys.len());
        for key in keys {
            let Some(slot) = self.slots.get(&key).map(|slot| Arc::clone(slot.value())) else {
                continue;
            };

            let mut guard = lock(&slot);
            if guard.retired {
                continue;
            }
            let buffer = guard.buffer.take();
            guard.retired = true;
            self.slots
                .remove_if(&key, |_, current| Arc::ptr_eq(current, &slot));
            drop(guard);

            if let Some(buffer) = buffer {
                drained.push((key, buffer));
            }
        }

        drained.sort_by_key(|(_, buffer)| buffer.opened);
        drained
    }

    /// Number of streams with an open buffer.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}
