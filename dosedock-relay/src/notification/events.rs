//! Reminder events and their rendered message text.
//!
//! Defines the event kinds the relay understands, the per-event channel
//! preferences, and the fixed message templates.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Event-kind-specific template fields (e.g. `patientName`, `meds`, `time`).
pub type EventFields = HashMap<String, String>;

/// Static metadata about a supported event kind.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct EventKindInfo {
    pub kind: EventKind,
    /// Canonical wire name.
    pub name: &'static str,
    /// Additional accepted spellings.
    pub aliases: &'static [&'static str],
}

const EVENT_KINDS: &[EventKindInfo] = &[
    EventKindInfo {
        kind: EventKind::DoseDue,
        name: "DOSE_DUE",
        aliases: &["dose_due", "dose.due", "DoseDue"],
    },
    EventKindInfo {
        kind: EventKind::RefillReminder,
        name: "REFILL_REMINDER",
        aliases: &["refill_reminder", "refill.reminder", "RefillReminder"],
    },
    EventKindInfo {
        kind: EventKind::TestReminder,
        name: "TEST_REMINDER",
        aliases: &["test_reminder", "test.reminder", "TestReminder"],
    },
];

pub fn event_kinds() -> &'static [EventKindInfo] {
    EVENT_KINDS
}

/// Kind of reminder event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    DoseDue,
    RefillReminder,
    TestReminder,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        self.info().name
    }

    pub fn info(&self) -> &'static EventKindInfo {
        let idx = match self {
            Self::DoseDue => 0,
            Self::RefillReminder => 1,
            Self::TestReminder => 2,
        };
        &EVENT_KINDS[idx]
    }

    /// Render this kind's template. Missing fields become empty strings.
    pub fn render(&self, fields: &EventFields) -> String {
        let field = |key: &str| fields.get(key).map(String::as_str).unwrap_or("");

        match self {
            Self::DoseDue => format!(
                "Hi {}, this is your DoseDock reminder to take your {} at {}.",
                field("patientName"),
                field("meds"),
                field("time"),
            ),
            Self::RefillReminder => format!(
                "Hi {}, your DoseDock dispenser is running low on {}. Please refill soon.",
                field("patientName"),
                field("meds"),
            ),
            Self::TestReminder => "DoseDock test reminder, notifications are working.".to_string(),
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        let normalized = normalize_kind(trimmed);
        if !normalized.is_empty() {
            for info in EVENT_KINDS {
                let matches = normalize_kind(info.name) == normalized
                    || info.aliases.iter().any(|a| normalize_kind(a) == normalized);
                if matches {
                    return Ok(info.kind);
                }
            }
        }
        Err(Error::UnknownEventKind(s.to_string()))
    }
}

fn normalize_kind(input: &str) -> String {
    input
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// Tone requested for synthesized speech.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Emotion {
    Neutral,
    Calm,
    Friendly,
    Urgent,
}

impl Emotion {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Neutral => "neutral",
            Self::Calm => "calm",
            Self::Friendly => "friendly",
            Self::Urgent => "urgent",
        }
    }
}

impl fmt::Display for Emotion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-event channel preferences, chosen by the caregiver.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelOptions {
    /// Voice short name (e.g. "Charon", "Kore") or full voice name.
    pub voice: Option<String>,
    pub emotion: Option<Emotion>,
    /// Speaking rate; non-positive values fall back to 1.0.
    pub speaking_rate: Option<f32>,
    /// Extra style instructions for the speech channel.
    pub style_prompt: Option<String>,
}

/// A reminder event addressed to one recipient.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    kind: EventKind,
    recipient: String,
    fields: EventFields,
    options: ChannelOptions,
}

impl Event {
    pub fn new(kind: EventKind, recipient: impl Into<String>, fields: EventFields) -> Self {
        Self {
            kind,
            recipient: recipient.into(),
            fields,
            options: ChannelOptions::default(),
        }
    }

    /// Build an event from its wire name.
    ///
    /// # Errors
    ///
    /// `UnknownEventKind` when `kind` is not a recognized event name.
    pub fn parse(kind: &str, recipient: impl Into<String>, fields: EventFields) -> Result<Self> {
        Ok(Self::new(kind.parse()?, recipient, fields))
    }

    pub fn with_options(mut self, options: ChannelOptions) -> Self {
        self.options = options;
        self
    }

    pub fn kind(&self) -> EventKind {
        self.kind
    }

    pub fn recipient(&self) -> &str {
        &self.recipient
    }

    pub fn fields(&self) -> &EventFields {
        &self.fields
    }

    pub fn options(&self) -> &ChannelOptions {
        &self.options
    }

    /// Render the channel-ready message text.
    pub fn render(&self) -> String {
        self.kind.render(&self.fields)
    }
}

/// Render a message for an event named on the wire.
///
/// Only the event name is validated; an empty recipient or missing fields
/// surface later as delivery failures or empty substitutions.
///
/// # Errors
///
/// `UnknownEventKind` when `kind` is not a recognized event name.
pub fn render(kind: &str, fields: &EventFields) -> Result<String> {
    let kind: EventKind = kind.parse()?;
    Ok(kind.render(fields))
}
