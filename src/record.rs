//! The persisted application record and its text-field edit rules.

use serde::{Deserialize, Serialize};

use crate::error::{SaveError, SaveResult};

/// The one record shape this crate persists.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ApplicationRecord {
    pub numeric_value: f32,
    pub message: String,
    pub counter: i32,
}

impl ApplicationRecord {
    pub fn new(numeric_value: f32, message: impl Into<String>, counter: i32) -> Self {
        Self {
            numeric_value,
            message: message.into(),
            counter,
        }
    }
}

// Bitwise float comparison so a decoded NaN equals the NaN that was encoded.
impl PartialEq for ApplicationRecord {
    fn eq(&self, other: &Self) -> bool {
        self.numeric_value.to_bits() == other.numeric_value.to_bits()
            && self.message == other.message
            && self.counter == other.counter
    }
}

/// A single field edit as it arrives from an input widget.
#[derive(Clone, Debug, PartialEq)]
pub enum FieldEdit {
    NumericValue(f32),
    Message(String),
    Counter(i32),
}

impl FieldEdit {
    /// Parses decimal widget text. Empty text is not an edit.
    pub fn numeric_from_text(text: &str) -> SaveResult<Option<Self>> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Ok(None);
        }
        trimmed
            .parse::<f32>()
            .map(|value| Some(FieldEdit::NumericValue(value)))
            .map_err(|_| SaveError::InvalidFieldInput {
                field: "numeric value",
                input: text.to_string(),
            })
    }

    /// Any text is a valid message, including the empty string.
    pub fn message_from_text(text: &str) -> Self {
        FieldEdit::Message(text.to_string())
    }

    /// Parses integer widget text. Empty text is not an edit.
    pub fn counter_from_text(text: &str) -> SaveResult<Option<Self>> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Ok(None);
        }
        trimmed
            .parse::<i32>()
            .map(|value| Some(FieldEdit::Counter(value)))
            .map_err(|_| SaveError::InvalidFieldInput {
                field: "counter",
                input: text.to_string(),
            })
    }

    pub fn apply(self, record: &mut ApplicationRecord) {
        match self {
            FieldEdit::NumericValue(value) => record.numeric_value = value,
            FieldEdit::Message(message) => record.message = message,
            FieldEdit::Counter(value) => record.counter = value,
        }
    }
}
