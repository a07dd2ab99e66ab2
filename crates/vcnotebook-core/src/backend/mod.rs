//! Hosted backend seams: note rows, attachment rows and object storage.

mod supabase;

#[cfg(test)]
pub(crate) mod memory;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;

use crate::error::{Error, Result};
use crate::models::{Attachment, AttachmentId, NewAttachment, Note, NoteDraft, NoteId};
use crate::util::compact_text;

pub use supabase::{SupabaseClient, DEFAULT_BUCKET};

/// Note rows owned by one user.
#[async_trait]
pub trait NoteBackend: Send + Sync {
    /// All of the user's notes, most recently updated first.
    async fn list_notes(&self, user_id: &str) -> Result<Vec<Note>>;

    /// Full-text search scoped to the user, most recently updated first.
    async fn search_notes(&self, user_id: &str, term: &str) -> Result<Vec<Note>>;

    async fn insert_note(&self, draft: &NoteDraft) -> Result<Note>;

    /// Update the note with `id` owned by `draft.user_id`.
    async fn update_note(&self, id: &NoteId, draft: &NoteDraft) -> Result<Note>;

    async fn delete_note(&self, user_id: &str, id: &NoteId) -> Result<()>;
}

/// Attachment metadata rows.
#[async_trait]
pub trait AttachmentBackend: Send + Sync {
    /// Attachments of a note, newest first.
    async fn list_attachments(&self, note_id: &NoteId) -> Result<Vec<Attachment>>;

    /// Insert rows in a single request, returning them as stored.
    async fn insert_attachments(&self, rows: &[NewAttachment]) -> Result<Vec<Attachment>>;

    async fn delete_attachment(&self, id: &AttachmentId) -> Result<()>;
}

/// Binary object storage for attachment contents.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    fn bucket(&self) -> &str;

    async fn upload_object(&self, path: &str, bytes: Vec<u8>, content_type: &str) -> Result<()>;

    async fn remove_object(&self, path: &str) -> Result<()>;

    /// Time-limited URL granting read access to the object.
    async fn signed_url(&self, path: &str, expires_in_secs: u64) -> Result<String>;
}

#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    message: Option<String>,
    msg: Option<String>,
    error_description: Option<String>,
    error: Option<String>,
}

/// Human readable message out of a backend error body.
pub(crate) fn parse_api_error(body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<ApiErrorResponse>(body) {
        if let Some(message) = payload
            .message
            .or(payload.msg)
            .or(payload.error_description)
            .or(payload.error)
        {
            return compact_text(&message);
        }
    }
    let trimmed = compact_text(body);
    if trimmed.is_empty() {
        "empty response body".to_string()
    } else {
        trimmed
    }
}

/// Pass successful responses through; map failures onto the error taxonomy.
pub(crate) async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(status_error(status, &body))
}

pub(crate) fn status_error(status: StatusCode, body: &str) -> Error {
    let message = parse_api_error(body);
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        Error::Unauthorized(message)
    } else {
        Error::Api {
            status: status.as_u16(),
            message,
        }
    }
}
