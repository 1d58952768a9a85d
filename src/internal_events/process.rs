use std::path::Path;

use metrics::counter;

use crate::internal_event::{error_stage, error_type, InternalEvent};

#[derive(Debug)]
pub struct MultilineStarted<'a> {
    pub inputs: &'a [String],
}

impl InternalEvent for MultilineStarted<'_> {
    fn emit(self) {
        info!(
            target: "multiline",
            message = "Multiline has started.",
            version = %crate::get_version(),
            inputs = ?self.inputs,
        );
        counter!("started_total").increment(1);
    }
}

#[derive(Debug)]
pub struct MultilineStopped;

impl InternalEvent for MultilineStopped {
    fn emit(self) {
        info!(target: "multiline", message = "Multiline has stopped.");
        counter!("stopped_total").increment(1);
    }
}

#[derive(Debug)]
pub struct InputOpened<'a> {
    pub name: &'a str,
}

impl InternalEvent for InputOpened<'_> {
    fn emit(self) {
        debug!(message = "Reading input.", input = %self.name);
        counter!("inputs_opened_total").increment(1);
    }
}

#[derive(Debug)]
pub struct InputReadError<'a> {
    pub name: &'a str,
    pub path: Option<&'a Path>,
    pub error: std::io::Error,
}

impl InternalEvent for InputReadError<'_> {
    fn emit(self) {
        error!(
            message = "Failed reading input.",
            input = %self.name,
            path = ?self.path,
            error = %self.error,
            error_code = "reading_input",
            error_type = error_type::READER_FAILED,
            stage = error_stage::RECEIVING,
        );
        counter!(
            "component_errors_total",
            "error_code" => "reading_input",
            "error_type" => error_type::READER_FAILED,
            "stage" => error_stage::RECEIVING,
        )
        .increment(1);
    }

    fn name(&self) -> Option<&'static str> {
        Some("InputReadError")
    }
}

#[derive(Debug)]
pub struct OutputWriteError {
    pub error: std::io::Error,
}

impl InternalEvent for OutputWriteError {
    fn emit(self) {
        error!(
            message = "Failed writing output.",
            error = %self.error,
            error_code = "writing_output",
            error_type = error_type::WRITER_FAILED,
            stage = error_stage::SENDING,
        );
        counter!(
            "component_errors_total",
            "error_code" => "writing_output",
            "error_type" => error_type::WRITER_FAILED,
            "stage" => error_stage::SENDING,
        )
        .increment(1);
    }
}
