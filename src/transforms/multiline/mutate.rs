use crate::{event::LogEvent, internal_events::TemplateRenderingError, template::Template};

/// Tag and field changes applied to aggregated events.
///
/// Templates are rendered against the event being changed, as it stands at
/// that step. A template that cannot be rendered skips only its own change.
#[derive(Clone, Debug, Default)]
pub struct TagFieldMutator {
    pub(super) add_field: Vec<(Template, Template)>,
    pub(super) remove_field: Vec<Template>,
    pub(super) multiline_tag: Option<String>,
    pub(super) add_tag: Vec<Template>,
    pub(super) remove_tag: Vec<Template>,
}

fn render(template: &Template, event: &LogEvent, option: &'static str) -> Option<String> {
    template
        .render_string(event)
        .map_err(|error| {
            emit!(TemplateRenderingError {
                field: Some(option),
                error,
            })
        })
        .ok()
}

impl TagFieldMutator {
    pub fn apply(&self, event: &mut LogEvent) {
        for (key, value) in &self.add_field {
            let Some(key) = render(key, event, "add_field") else {
                continue;
            };
            if let Some(value) = render(value, event, "add_field") {
                event.insert(key, value);
            }
        }

        for field in &self.remove_field {
            if let Some(field) = render(field, event, "remove_field") {
                event.remove(&field);
            }
        }

        if let Some(tag) = &self.multiline_tag {
            event.add_tag(tag.as_str());
        }
        for tag in &self.add_tag {
            if let Some(tag) = render(tag, event, "add_tag") {
                event.add_tag(tag);
            }
        }

        for tag in &self.remove_tag {
            if let Some(tag) = render(tag, event, "remove_tag") {
                event.remove_tag(&tag);
            }
        }
    }
}
