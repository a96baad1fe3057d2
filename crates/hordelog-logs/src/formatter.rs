use serde_json::Value;
use std::collections::HashMap;

use hordelog_types::LogLine;

/// A piece of a rendered line
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LineSegment {
    /// Literal text
    Text(String),

    /// A substituted structured value
    Property {
        name: String,
        text: String,
        /// Value of `$type` for object properties (e.g. `SourceFile`)
        kind: Option<String>,
    },
}

impl LineSegment {
    pub fn text(&self) -> &str {
        match self {
            Self::Text(text) => text,
            Self::Property { text, .. } => text,
        }
    }
}

/// Renders structured log lines from their message templates
pub struct LineFormatter;

impl LineFormatter {
    /// Split a line into text and property segments
    pub fn segments(line: &LogLine) -> Vec<LineSegment> {
        match (&line.format, &line.properties) {
            (Some(format), Some(properties)) => Self::expand(format, properties),
            _ => vec![LineSegment::Text(line.message.clone())],
        }
    }

    /// Render a line to plain text
    pub fn render(line: &LogLine) -> String {
        match (&line.format, &line.properties) {
            (Some(format), Some(properties)) => Self::expand(format, properties)
                .iter()
                .map(LineSegment::text)
                .collect(),
            _ => line.message.clone(),
        }
    }

    fn expand(format: &str, properties: &HashMap<String, Value>) -> Vec<LineSegment> {
        let mut segments = Vec::new();
        let mut text = String::new();
        let mut rest = format;

        while let Some(pos) = rest.find(['{', '}']) {
            text.push_str(&rest[..pos]);
            let tail = &rest[pos..];

            if tail.starts_with("{{") {
                text.push('{');
                rest = &tail[2..];
                continue;
            }
            if tail.starts_with("}}") {
                text.push('}');
                rest = &tail[2..];
                continue;
            }
            if tail.starts_with('}') {
                text.push('}');
                rest = &tail[1..];
                continue;
            }

            // Opening brace of a placeholder
            let Some(close) = tail.find('}') else {
                text.push_str(tail);
                rest = "";
                break;
            };
            let placeholder = &tail[..=close];
            let inner = &tail[1..close];
            let name = inner.split(':').next().unwrap_or(inner).trim();

            match properties.get(name) {
                Some(value) if !name.is_empty() => {
                    if !text.is_empty() {
                        segments.push(LineSegment::Text(std::mem::take(&mut text)));
                    }
                    let (text, kind) = Self::property_text(value);
                    segments.push(LineSegment::Property {
                        name: name.to_string(),
                        text,
                        kind,
                    });
                }
                _ => text.push_str(placeholder),
            }
            rest = &tail[close + 1..];
        }

        text.push_str(rest);
        if !text.is_empty() {
            segments.push(LineSegment::Text(text));
        }
        segments
    }

    /// Display text and type tag for a property value
    fn property_text(value: &Value) -> (String, Option<String>) {
        match value {
            Value::String(s) => (s.clone(), None),
            Value::Null => ("null".to_string(), None),
            Value::Object(obj) => {
                let kind = obj.get("$type").and_then(Value::as_str).map(String::from);
                let text = match obj.get("$text") {
                    Some(Value::String(s)) => s.clone(),
                    Some(other) => other.to_string(),
                    None => value.to_string(),
                };
                (text, kind)
            }
            other => (other.to_string(), None),
        }
    }
}
