use metrics::{counter, gauge, histogram};

use crate::{event::Discriminant, internal_event::InternalEvent};

/// A group of more than one line was closed and emitted.
#[derive(Debug)]
pub struct MultilineEventAggregated<'a> {
    pub stream: &'a Discriminant,
    pub lines: usize,
}

impl InternalEvent for MultilineEventAggregated<'_> {
    fn emit(self) {
        trace!(
            message = "Emitting aggregated event.",
            stream = %self.stream,
            lines = self.lines,
        );
        counter!("multiline_events_aggregated_total").increment(1);
        histogram!("multiline_event_lines").record(self.lines as f64);
    }

    fn name(&self) -> Option<&'static str> {
        Some("MultilineEventAggregated")
    }
}

#[derive(Debug)]
pub struct MultilineEventPassedThrough<'a> {
    pub stream: &'a Discriminant,
}

impl InternalEvent for MultilineEventPassedThrough<'_> {
    fn emit(self) {
        trace!(message = "Passing event through unchanged.", stream = %self.stream);
        counter!("multiline_events_passthrough_total").increment(1);
    }
}

#[derive(Debug)]
pub struct MultilineStreamsFlushed {
    pub count: usize,
}

impl InternalEvent for MultilineStreamsFlushed {
    fn emit(self) {
        debug!(message = "Flushed open streams.", count = self.count);
        counter!("multiline_flushed_events_total").increment(self.count as u64);
    }

    fn name(&self) -> Option<&'static str> {
        Some("MultilineStreamsFlushed")
    }
}

#[derive(Debug)]
pub struct MultilineOpenStreams {
    pub count: usize,
}

impl InternalEvent for MultilineOpenStreams {
    fn emit(self) {
        gauge!("multiline_open_streams").set(self.count as f64);
    }
}
