use super::{
    buffer::{BufferTable, Finished, StreamBuffer},
    matcher::{LineMatch, PatternMatcher},
    What,
};
use crate::event::{to_string_lossy, Discriminant, LogEvent, ObjectMap};

/// The per-stream state machine.
///
/// A stream is either empty or accumulating. Whether a line joins the open
/// group, closes it or opens a new one depends on the merge direction and on
/// the (possibly negated) match of the line.
#[derive(Debug)]
pub struct Aggregator {
    matcher: PatternMatcher,
    what: What,
    source: String,
    stream_identity: Vec<String>,
    table: BufferTable,
}

/// A closed group together with the stream it belonged to.
#[derive(Debug)]
pub struct Emitted {
    pub stream: Discriminant,
    pub finished: Finished,
}

impl Aggregator {
    pub fn new(
        matcher: PatternMatcher,
        what: What,
        source: String,
        stream_identity: Vec<String>,
    ) -> Self {
        Self {
            matcher,
            what,
            source,
            stream_identity,
            table: BufferTable::default(),
        }
    }

    pub fn stream_of(&self, event: &LogEvent) -> Discriminant {
        Discriminant::from_log_event(event, &self.stream_identity)
    }

    /// Feeds one event. Returns the group this event closed, if any.
    pub fn process(&self, event: LogEvent) -> Option<Emitted> {
        let stream = self.stream_of(&event);
        let line = event
            .get(&self.source)
            .map(to_string_lossy)
            .unwrap_or_default()
            .into_owned();
        let LineMatch {
            continuation,
            captures,
        } = self.matcher.matches(&line);

        trace!(
            message = "Processing line.",
            stream = %stream,
            continuation,
        );

        let finished = self.table.with_buffer(&stream, |slot| {
            if continuation {
                match slot {
                    Some(buffer) => buffer.merge(&line, captures),
                    None => *slot = Some(self.open(event, line, captures)),
                }
                return None;
            }

            match self.what {
                // The line opens a new group and closes the previous one.
                What::Previous => slot
                    .replace(self.open(event, line, captures))
                    .map(|previous| previous.finish(&self.source)),
                // The line is the last one of the open group, or a group of
                // its own.
                What::Next => {
                    let buffer = match slot.take() {
                        Some(mut buffer) => {
                            buffer.merge(&line, captures);
                            buffer
                        }
                        None => self.open(event, line, captures),
                    };
                    Some(buffer.finish(&self.source))
                }
            }
        });

        finished.map(|finished| Emitted { stream, finished })
    }

    /// Closes every open group, oldest first.
    pub fn flush(&self) -> Vec<Emitted> {
        self.table
            .drain()
            .into_iter()
            .map(|(stream, buffer)| Emitted {
                stream,
                finished: buffer.finish(&self.source),
            })
            .collect()
    }

    pub fn open_streams(&self) -> usize {
        self.table.len()
    }

    fn open(&self, event: LogEvent, line: String, captures: ObjectMap) -> StreamBuffer {
        StreamBuffer::new(event, line, captures, self.table.next_sequence())
    }
}
