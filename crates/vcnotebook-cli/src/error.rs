use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] vcnotebook_core::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("No note content provided")]
    EmptyContent,
    #[error("Edited note content cannot be empty")]
    EmptyEditedContent,
    #[error("Note ID cannot be empty")]
    EmptyNoteId,
    #[error("Search query cannot be empty")]
    EmptySearchQuery,
    #[error("Note not found for id/prefix: {0}")]
    NoteNotFound(String),
    #[error("{0}")]
    AmbiguousNoteId(String),
    #[error("Attachment not found on this note: {0}")]
    AttachmentNotFound(String),
    #[error("None of the {0} file(s) were uploaded")]
    UploadFailed(usize),
    #[error("No preview URL available for {0}")]
    PreviewUnavailable(String),
    #[error("Editor command failed: {0}")]
    EditorFailed(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Authentication error: {0}")]
    Auth(String),
    #[error("Not signed in. Run `vcnotebook auth login` first.")]
    NotSignedIn,
    #[error("Attachments need the hosted backend; this session is offline ({0})")]
    AttachmentsOffline(String),
    #[error("Aborted")]
    Aborted,
}

impl From<vcnotebook_core::auth::AuthError> for CliError {
    fn from(error: vcnotebook_core::auth::AuthError) -> Self {
        Self::Auth(error.to_string())
    }
}
