//! Note model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Title used when a note is saved without one.
pub const DEFAULT_TITLE: &str = "Untitled";

/// Identifier of a note.
///
/// Hosted notes carry the provider-generated UUID; notes created offline use
/// the creation time in milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NoteId(String);

impl NoteId {
    /// Wrap an existing identifier
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Identifier for a note created without the hosted backend
    #[must_use]
    pub fn from_millis(millis: i64) -> Self {
        Self(millis.to_string())
    }

    /// Get the string representation of this ID
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for NoteId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(Error::InvalidInput("Note id must not be empty".to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }
}

/// A note in the system
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    pub id: NoteId,
    pub title: String,
    pub content: String,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Note {
    /// Case-insensitive substring match over title and content
    #[must_use]
    pub fn matches(&self, term: &str) -> bool {
        let needle = term.trim().to_lowercase();
        if needle.is_empty() {
            return true;
        }
        self.title.to_lowercase().contains(&needle) || self.content.to_lowercase().contains(&needle)
    }

    /// Listing preview of the content
    #[must_use]
    pub fn preview(&self) -> String {
        crate::util::snippet(&self.content, 100)
    }

    /// Apply a validated draft on top of this note
    pub fn apply(&mut self, draft: &NoteDraft) {
        self.title.clone_from(&draft.title);
        self.content.clone_from(&draft.content);
        self.updated_at = draft.updated_at;
    }
}

/// Insert or update payload for the `notes` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NoteDraft {
    pub title: String,
    pub content: String,
    pub user_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl NoteDraft {
    /// Build a draft from raw editor input.
    ///
    /// Returns `None` when title and content are both empty after trimming;
    /// such a note is never persisted.
    pub fn from_input(
        user_id: &str,
        title: &str,
        content: &str,
        now: DateTime<Utc>,
        is_new: bool,
    ) -> Option<Self> {
        let title = title.trim();
        let content = content.trim();
        if title.is_empty() && content.is_empty() {
            return None;
        }

        Some(Self {
            title: if title.is_empty() {
                DEFAULT_TITLE.to_string()
            } else {
                title.to_string()
            },
            content: content.to_string(),
            user_id: user_id.to_string(),
            created_at: is_new.then_some(now),
            updated_at: now,
        })
    }

    /// Materialize the draft as a note with a locally assigned id
    #[must_use]
    pub fn into_note(self, id: NoteId) -> Note {
        Note {
            id,
            title: self.title,
            content: self.content,
            user_id: self.user_id,
            created_at: self.created_at.unwrap_or(self.updated_at),
            updated_at: self.updated_at,
        }
    }
}
