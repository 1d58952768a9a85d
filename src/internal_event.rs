//! The internal event plumbing: every component reports what it did by
//! constructing a small struct and handing it to [`emit`].

pub trait InternalEvent: Sized {
    fn emit(self);

    // Optional for backwards compat until all events implement this
    fn name(&self) -> Option<&'static str> {
        None
    }
}

pub fn emit(event: impl InternalEvent) {
    event.emit();
}

/// Emit an internal event.
macro_rules! emit {
    ($event:expr) => {
        $crate::internal_event::emit($event)
    };
}

pub mod error_stage {
    pub const RECEIVING: &str = "receiving";
    pub const PROCESSING: &str = "processing";
    pub const SENDING: &str = "sending";
}

pub mod error_type {
    pub const READER_FAILED: &str = "reader_failed";
    pub const TEMPLATE_FAILED: &str = "template_failed";
    pub const WRITER_FAILED: &str = "writer_failed";
}
