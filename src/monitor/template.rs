//! Incident subject/message templates.
//!
//! Templates use `{{ field }}` placeholders. They are compiled once while the
//! monitor is validated, so rendering later cannot fail: a missing field
//! renders as an empty string.

use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;
use serde::Deserialize;
use thiserror::Error;

/// Fields a template may reference.
pub const FIELDS: &[&str] = &[
    "monitor.name",
    "monitor.target",
    "monitor.type",
    "monitor.component_id",
    "system_name",
    "now",
    "fail_reason",
    "incident.id",
    "incident.name",
    "incident.message",
];

static PLACEHOLDER: OnceLock<Result<Regex, regex::Error>> = OnceLock::new();

fn placeholder_regex() -> Result<&'static Regex, TemplateError> {
    PLACEHOLDER
        .get_or_init(|| Regex::new(r"\{\{([^{}]*)\}\}"))
        .as_ref()
        .map_err(|e| TemplateError::Pattern(e.to_string()))
}

#[derive(Error, Debug, PartialEq)]
pub enum TemplateError {
    #[error("unterminated placeholder at byte {0}")]
    Unterminated(usize),
    #[error("empty placeholder at byte {0}")]
    Empty(usize),
    #[error("unknown field '{0}'")]
    UnknownField(String),
    #[error("placeholder pattern: {0}")]
    Pattern(String),
}

/// Values available to a template while rendering.
pub type TemplateContext = HashMap<&'static str, String>;

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Literal(String),
    Field(String),
}

/// A parsed template string.
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    segments: Vec<Segment>,
}

impl Template {
    pub fn parse(source: &str) -> Result<Self, TemplateError> {
        let mut segments = Vec::new();
        let mut last = 0;

        for caps in placeholder_regex()?.captures_iter(source) {
            let Some(whole) = caps.get(0) else {
                continue;
            };
            push_literal(&mut segments, &source[last..whole.start()], last)?;

            let field = caps[1].trim();
            if field.is_empty() {
                return Err(TemplateError::Empty(whole.start()));
            }
            if !FIELDS.contains(&field) {
                return Err(TemplateError::UnknownField(field.to_string()));
            }
            segments.push(Segment::Field(field.to_string()));
            last = whole.end();
        }
        push_literal(&mut segments, &source[last..], last)?;

        Ok(Self { segments })
    }

    pub fn render(&self, context: &TemplateContext) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Field(field) => {
                    if let Some(value) = context.get(field.as_str()) {
                        out.push_str(value);
                    }
                }
            }
        }
        out
    }
}

fn push_literal(segments: &mut Vec<Segment>, text: &str, offset: usize) -> Result<(), TemplateError> {
    if let Some(pos) = text.find("{{") {
        return Err(TemplateError::Unterminated(offset + pos));
    }
    if !text.is_empty() {
        segments.push(Segment::Literal(text.to_string()));
    }
    Ok(())
}

/// Subject and message template pair for one incident state.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MessageTemplate {
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub message: String,
    #[serde(skip)]
    compiled: Option<(Template, Template)>,
}

impl MessageTemplate {
    pub fn new(subject: &str, message: &str) -> Self {
        Self {
            subject: subject.to_string(),
            message: message.to_string(),
            compiled: None,
        }
    }

    /// Fill in the subject and message left empty by the configuration.
    pub fn set_default(&mut self, default: &MessageTemplate) {
        if self.subject.is_empty() {
            self.subject = default.subject.clone();
        }
        if self.message.is_empty() {
            self.message = default.message.clone();
        }
    }

    pub fn compile(&mut self) -> Result<(), TemplateError> {
        let subject = Template::parse(&self.subject)?;
        let message = Template::parse(&self.message)?;
        self.compiled = Some((subject, message));
        Ok(())
    }

    /// Render `(subject, message)`.
    pub fn exec(&self, context: &TemplateContext) -> (String, String) {
        match &self.compiled {
            Some((subject, message)) => (subject.render(context), message.render(context)),
            None => (
                render_uncompiled(&self.subject, context),
                render_uncompiled(&self.message, context),
            ),
        }
    }
}

fn render_uncompiled(source: &str, context: &TemplateContext) -> String {
    match Template::parse(source) {
        Ok(template) => template.render(context),
        Err(_) => source.to_string(),
    }
}

/// Default "investigating" and "fixed" templates.
pub fn default_investigating() -> MessageTemplate {
    MessageTemplate::new(
        "{{ monitor.name }} - {{ system_name }}",
        "{{ monitor.name }} check **failed** (server time: {{ now }})\n\n{{ fail_reason }}",
    )
}

pub fn default_fixed() -> MessageTemplate {
    MessageTemplate::new(
        "{{ monitor.name }} - {{ system_name }}",
        "**Resolved** - {{ now }}\n\n- - -\n\n{{ incident.message }}",
    )
}
