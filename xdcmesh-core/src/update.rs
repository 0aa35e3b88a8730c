//! Status update records.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Position of an update in the current epoch's total order.
///
/// Serials start at 1. A cursor of 0 means nothing has been seen yet.
pub type Serial = u64;

/// Update as submitted by an instance, before it has been ordered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmittedUpdate {
    /// Application-defined payload, opaque to the engine
    pub payload: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub info: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

impl SubmittedUpdate {
    /// Creates an update carrying only a payload.
    pub fn new(payload: impl Into<Value>) -> Self {
        Self {
            payload: payload.into(),
            info: None,
            document: None,
            summary: None,
        }
    }

    /// Attaches an info message shown by hosts in their chat view.
    pub fn with_info(mut self, info: impl Into<String>) -> Self {
        self.info = Some(info.into());
        self
    }

    /// Attaches a document name.
    pub fn with_document(mut self, document: impl Into<String>) -> Self {
        self.document = Some(document.into());
        self
    }

    /// Attaches a short summary.
    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = Some(summary.into());
        self
    }

    pub(crate) fn into_update(self, serial: Serial, max_serial: Serial) -> Update {
        Update {
            payload: self.payload,
            info: self.info,
            document: self.document,
            summary: self.summary,
            serial,
            max_serial,
        }
    }
}

/// Update accepted into the log.
///
/// `max_serial` reflects what the log knew when this copy was handed out,
/// so two recipients can observe different values for the same serial.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Update {
    pub payload: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub info: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    pub serial: Serial,
    pub max_serial: Serial,
}

/// An accepted update paired with the description its sender gave it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateEntry {
    pub update: Update,
    pub descr: String,
}

impl UpdateEntry {
    /// Returns a copy stamped with a different `max_serial`.
    pub fn restamped(&self, max_serial: Serial) -> Self {
        let mut entry = self.clone();
        entry.update.max_serial = max_serial;
        entry
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_submitted_update_builder() {
        let update = SubmittedUpdate::new(json!({"move": "e4"}))
            .with_info("Alice moved")
            .with_summary("Turn 1");

        assert_eq!(update.payload, json!({"move": "e4"}));
        assert_eq!(update.info.as_deref(), Some("Alice moved"));
        assert_eq!(update.document, None);
        assert_eq!(update.summary.as_deref(), Some("Turn 1"));
    }

    #[test]
    fn test_optional_fields_are_omitted_from_json() {
        let update = SubmittedUpdate::new("Hello").into_update(1, 1);
        let value = serde_json::to_value(&update).unwrap();

        assert_eq!(
            value,
            json!({"payload": "Hello", "serial": 1, "max_serial": 1})
        );
    }

    #[test]
    fn test_restamped_keeps_serial() {
        let entry = UpdateEntry {
            update: SubmittedUpdate::new("Bye").into_update(2, 2),
            descr: "bye".to_string(),
        };

        let restamped = entry.restamped(7);
        assert_eq!(restamped.update.serial, 2);
        assert_eq!(restamped.update.max_serial, 7);
        assert_eq!(entry.update.max_serial, 2);
    }
}
