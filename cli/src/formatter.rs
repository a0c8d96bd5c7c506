//! Output formatting for the tail stream.
//!
//! One line per event. `Text` is colorized for terminals; `Json` emits the
//! envelope as JSON Lines for piping into other tools.

use atlas_link::{topics, ConnectionState, ConnectionStatus, DataUpdate, EntityId, EventEnvelope};
use clap::ValueEnum;
use colored::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

/// Formats router events for display
pub struct EventFormatter {
    format: OutputFormat,
    color: bool,
}

impl EventFormatter {
    pub fn new(format: OutputFormat, color: bool) -> Self {
        Self { format, color }
    }

    pub fn format_event(&self, event: &EventEnvelope) -> String {
        if self.format == OutputFormat::Json {
            return serde_json::to_string(event).unwrap_or_else(|e| {
                format!("{{\"topic\":\"{}\",\"error\":\"{}\"}}", event.topic, e)
            });
        }

        match event.topic.as_str() {
            topics::CONNECTION_STATUS => match event.decode::<ConnectionStatus>() {
                Ok(status) => self.format_status(&status),
                Err(_) => self.tagged(&event.topic, &event.payload.to_string()),
            },
            topics::DATA_UPDATE => match event.decode::<DataUpdate>() {
                Ok(update) => self.format_data_update(&update),
                Err(_) => self.tagged(&event.topic, &event.payload.to_string()),
            },
            topics::SUBSCRIPTION_NACK => {
                let line = self.tagged(&event.topic, &event.payload.to_string());
                self.paint(line, |s| s.red())
            },
            _ => self.tagged(&event.topic, &event.payload.to_string()),
        }
    }

    /// Text rendering of a status snapshot.
    pub fn format_status(&self, status: &ConnectionStatus) -> String {
        let mut line = format!("[status] {}", status.state);
        if let Some(error) = &status.error {
            line.push_str(" - ");
            line.push_str(error);
        }
        if status.heartbeat_overdue {
            line.push_str(" (heartbeat overdue)");
        }
        if let Some(at) = status.last_heartbeat_at {
            line.push_str(&format!(" [last heartbeat {}]", at.to_rfc3339()));
        }

        match status.state {
            ConnectionState::Connected if status.heartbeat_overdue => self.paint(line, |s| s.yellow()),
            ConnectionState::Connected => self.paint(line, |s| s.green()),
            ConnectionState::Connecting | ConnectionState::Reconnecting { .. } => {
                self.paint(line, |s| s.yellow())
            },
            ConnectionState::Disconnected if status.error.is_some() => self.paint(line, |s| s.red()),
            ConnectionState::Disconnected | ConnectionState::Closed => self.paint(line, |s| s.dimmed()),
        }
    }

    fn format_data_update(&self, update: &DataUpdate) -> String {
        let id = EntityId::from_entity(&update.entity)
            .map(|id| id.to_string())
            .unwrap_or_else(|| "?".to_string());
        let head = format!("[{}] {} id={}", topics::DATA_UPDATE, update.mutation_type, id);
        format!("{} {}", self.paint(head, |s| s.cyan()), update.entity)
    }

    fn tagged(&self, topic: &str, body: &str) -> String {
        format!("{} {}", self.paint(format!("[{}]", topic), |s| s.bold()), body)
    }

    fn paint<F>(&self, text: String, style: F) -> String
    where
        F: FnOnce(&str) -> ColoredString,
    {
        if self.color {
            style(&text).to_string()
        } else {
            text
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn plain() -> EventFormatter {
        EventFormatter::new(OutputFormat::Text, false)
    }

    #[test]
    fn test_status_line_includes_error() {
        let status = ConnectionStatus::derive(
            ConnectionState::Reconnecting { attempt: 2 },
            Some("Reconnecting (attempt 2 of 5)".into()),
            2,
            None,
            false,
        );
        assert_eq!(
            plain().format_status(&status),
            "[status] reconnecting (attempt 2) - Reconnecting (attempt 2 of 5)"
        );
    }

    #[test]
    fn test_data_update_line() {
        let event = EventEnvelope::new(
            topics::DATA_UPDATE,
            json!({"mutation_type": "insert", "entity": {"id": 7, "title": "X"}}),
        );
        assert_eq!(
            plain().format_event(&event),
            r#"[data-update] insert id=7 {"id":7,"title":"X"}"#
        );
    }

    #[test]
    fn test_json_output_is_the_envelope() {
        let event = EventEnvelope::new("private-update", json!({"category": "x"}))
            .with_server_timestamp(Some(5));
        let line = EventFormatter::new(OutputFormat::Json, true).format_event(&event);
        let parsed: EventEnvelope = serde_json::from_str(&line).unwrap();
        assert_eq!(parsed, event);
    }

    #[test]
    fn test_unknown_payload_falls_back_to_raw() {
        let event = EventEnvelope::new(topics::DATA_UPDATE, json!({"unexpected": true}));
        assert_eq!(plain().format_event(&event), r#"[data-update] {"unexpected":true}"#);
    }
}
