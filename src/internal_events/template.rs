use metrics::counter;

use crate::internal_event::{error_stage, error_type, InternalEvent};

pub struct TemplateRenderingError<'a> {
    pub field: Option<&'a str>,
    pub error: crate::template::TemplateRenderingError,
}

impl InternalEvent for TemplateRenderingError<'_> {
    fn emit(self) {
        let mut msg = "Failed to render template".to_owned();
        if let Some(field) = self.field {
            use std::fmt::Write;
            _ = write!(msg, " for \"{field}\"");
        }
        msg.push_str(". Mutation skipped.");

        warn!(
            message = %msg,
            error = %self.error,
            error_type = error_type::TEMPLATE_FAILED,
            stage = error_stage::PROCESSING,
            internal_log_rate_limit = true,
        );

        counter!(
            "component_errors_total",
            "error_type" => error_type::TEMPLATE_FAILED,
            "stage" => error_stage::PROCESSING,
        )
        .increment(1);
    }

    fn name(&self) -> Option<&'static str> {
        Some("TemplateRenderingError")
    }
}
