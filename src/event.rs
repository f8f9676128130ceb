//! Wire protocol for structured events emitted by child processes and
//! embedded scripts (spec.md §4.8, §6).

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Line prefix that marks a structured event (note the trailing space).
pub const EVENT_PREFIX: &str = "@@REMAKE@@ ";

/// Which standard stream a plain output line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stream {
    Stdout,
    Stderr,
}

impl Stream {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Stream::Stdout => "stdout",
            Stream::Stderr => "stderr",
        }
    }
}

/// A parsed `@@REMAKE@@ ` event payload. Always carries the raw JSON object
/// so unknown keys/events are forwarded verbatim, per spec.md §4.8.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub event: String,
    #[serde(flatten)]
    pub fields: serde_json::Map<String, Value>,
}

impl Event {
    #[must_use]
    pub fn new(event: impl Into<String>) -> Self {
        Self {
            event: event.into(),
            fields: serde_json::Map::new(),
        }
    }

    #[must_use]
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(key.to_string(), value.into());
        self
    }

    #[must_use]
    pub fn field_str(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(Value::as_str)
    }

    /// The synthesized `end` event the process runner emits on child exit.
    #[must_use]
    pub fn end(exit_code: i32) -> Self {
        Event::new("end")
            .with("exit_code", exit_code)
            .with("success", exit_code == 0)
    }

    /// The synthesized `error` event for runtime failures (spawn/I-O errors).
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Event::new("error").with("message", message.into())
    }

    /// Serialize to a single line, without the `@@REMAKE@@ ` prefix or
    /// trailing newline.
    ///
    /// # Panics
    ///
    /// Never: `Event` fields are always JSON-safe scalars/collections built
    /// via [`Event::with`] or `serde` deserialization.
    #[must_use]
    pub fn to_line(&self) -> String {
        serde_json::to_string(self).expect("Event always serializes")
    }

    /// Render with the wire prefix and no trailing newline.
    #[must_use]
    pub fn to_wire(&self) -> String {
        format!("{EVENT_PREFIX}{}", self.to_line())
    }
}

/// Outcome of scanning one line of child output.
pub enum ParsedLine {
    /// A structured event line.
    Event(Event),
    /// A plain line that is not wire-prefixed, or wire-prefixed but not
    /// valid JSON (degrades to plain output rather than being dropped).
    Output(String),
}

/// Parse one line of child stdout/stderr per the `@@REMAKE@@ ` wire format.
#[must_use]
pub fn parse_line(line: &str) -> ParsedLine {
    let Some(rest) = line.strip_prefix(EVENT_PREFIX) else {
        return ParsedLine::Output(line.to_string());
    };

    match serde_json::from_str::<Event>(rest) {
        Ok(event) => ParsedLine::Event(event),
        Err(_) => ParsedLine::Output(line.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_prefixed_line_is_output() {
        match parse_line("hello world") {
            ParsedLine::Output(s) => assert_eq!(s, "hello world"),
            ParsedLine::Event(_) => panic!("expected output"),
        }
    }

    #[test]
    fn prefixed_line_parses_event_and_preserves_unknown_keys() {
        let line = r#"@@REMAKE@@ {"event":"progress","id":"p1","current":3,"total":10}"#;
        match parse_line(line) {
            ParsedLine::Event(e) => {
                assert_eq!(e.event, "progress");
                assert_eq!(e.fields["current"], 3);
                assert_eq!(e.fields["total"], 10);
            }
            ParsedLine::Output(_) => panic!("expected event"),
        }
    }

    #[test]
    fn malformed_json_after_prefix_degrades_to_output() {
        let line = "@@REMAKE@@ {not json}";
        match parse_line(line) {
            ParsedLine::Output(s) => assert_eq!(s, line),
            ParsedLine::Event(_) => panic!("expected output fallback"),
        }
    }

    #[test]
    fn end_event_reports_success_for_zero_exit_code() {
        let e = Event::end(0);
        assert_eq!(e.fields["success"], true);
        let e = Event::end(1);
        assert_eq!(e.fields["success"], false);
    }

    #[test]
    fn to_wire_round_trips_through_parse_line() {
        let e = Event::new("print").with("message", "hi");
        let wire = e.to_wire();
        match parse_line(&wire) {
            ParsedLine::Event(parsed) => assert_eq!(parsed, e),
            ParsedLine::Output(_) => panic!("expected event"),
        }
    }
}
