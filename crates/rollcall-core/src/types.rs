use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Directory id reserved for the recognizer's background class.
pub const RESERVED_ID: &str = "0";

/// Label used when an identity id cannot be resolved to a name.
pub const UNKNOWN_NAME: &str = "Unknown";

/// An enrolled person, keyed by a stable numeric id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: String,
    pub display_name: String,
}

/// One recognizer result within a single tick.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Detection {
    /// `None` when the recognizer could not resolve the face.
    pub identity: Option<Identity>,
    pub confidence: f32,
}

impl Detection {
    pub fn known(id: impl Into<String>, display_name: impl Into<String>, confidence: f32) -> Self {
        Self {
            identity: Some(Identity {
                id: id.into(),
                display_name: display_name.into(),
            }),
            confidence,
        }
    }

    pub fn unknown(confidence: f32) -> Self {
        Self {
            identity: None,
            confidence,
        }
    }

    /// Id of the recognized identity, or `None` for unknown faces and the
    /// background class.
    pub fn known_id(&self) -> Option<&str> {
        self.identity
            .as_ref()
            .map(|i| i.id.as_str())
            .filter(|id| !id.is_empty() && *id != RESERVED_ID)
    }
}

/// Kind of attendance transition recorded in the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Action {
    Entry,
    Exit,
    /// Synthesized at shutdown for identities still present.
    ExitForced,
}

impl Action {
    pub const ALL: [Action; 3] = [Action::Entry, Action::Exit, Action::ExitForced];

    /// Ledger text for this action.
    pub fn as_str(self) -> &'static str {
        match self {
            Action::Entry => "ENTRY",
            Action::Exit => "EXIT",
            Action::ExitForced => "EXIT (FORCED)",
        }
    }

    pub fn is_exit(self) -> bool {
        matches!(self, Action::Exit | Action::ExitForced)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown action: {0:?}")]
pub struct ParseActionError(pub String);

impl FromStr for Action {
    type Err = ParseActionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Action::ALL
            .into_iter()
            .find(|a| a.as_str() == s)
            .ok_or_else(|| ParseActionError(s.to_string()))
    }
}

/// A single immutable row of the attendance ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendanceEvent {
    /// Local wall-clock time of the tick that produced the event.
    pub timestamp: NaiveDateTime,
    pub identity_id: String,
    pub display_name: String,
    pub action: Action,
}

pub const DATE_FORMAT: &str = "%Y-%m-%d";
pub const TIME_FORMAT: &str = "%H:%M:%S";

impl AttendanceEvent {
    /// Build an event. Commas and line breaks in the text fields are replaced
    /// with spaces so the row always has exactly five columns.
    pub fn new(
        timestamp: NaiveDateTime,
        identity_id: &str,
        display_name: &str,
        action: Action,
    ) -> Self {
        Self {
            timestamp,
            identity_id: sanitize_field(identity_id),
            display_name: sanitize_field(display_name),
            action,
        }
    }

    pub fn date(&self) -> NaiveDate {
        self.timestamp.date()
    }

    pub fn time(&self) -> NaiveTime {
        self.timestamp.time()
    }

    /// `Date,Time,Student_ID,Student_Name,Action` row, without a line terminator.
    pub fn to_row(&self) -> String {
        format!(
            "{},{},{},{},{}",
            self.timestamp.format(DATE_FORMAT),
            self.timestamp.format(TIME_FORMAT),
            self.identity_id,
            self.display_name,
            self.action
        )
    }
}

fn sanitize_field(value: &str) -> String {
    value
        .trim()
        .chars()
        .map(|c| if matches!(c, ',' | '\n' | '\r') { ' ' } else { c })
        .collect()
}
