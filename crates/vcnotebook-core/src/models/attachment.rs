//! Attachment model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use uuid::Uuid;

use crate::error::{Error, Result};

use super::note::NoteId;

const IMAGE_EXTENSIONS: [&str; 8] = ["jpg", "jpeg", "png", "gif", "webp", "heic", "bmp", "svg"];
const VIDEO_EXTENSIONS: [&str; 6] = ["mp4", "mov", "webm", "avi", "mkv", "m4v"];
const FALLBACK_MIME_TYPE: &str = "application/octet-stream";

/// Identifier of an attachment row, or of a staged upload that has no row yet.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AttachmentId(String);

impl AttachmentId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Client-side id for a staged upload.
    #[must_use]
    pub fn staged() -> Self {
        Self(format!("temp-{}", Uuid::now_v7()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AttachmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// How an attachment is rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Image,
    Video,
    Other,
}

impl MediaKind {
    /// Classify a file by its extension.
    pub fn from_file_name(file_name: &str) -> Self {
        let Some(extension) = file_extension(file_name) else {
            return Self::Other;
        };
        if IMAGE_EXTENSIONS.contains(&extension.as_str()) {
            Self::Image
        } else if VIDEO_EXTENSIONS.contains(&extension.as_str()) {
            Self::Video
        } else {
            Self::Other
        }
    }
}

/// Attachment metadata as stored in the `file_attachments` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub id: AttachmentId,
    /// `None` while the attachment is staged for a note that is not saved yet.
    pub note_id: Option<NoteId>,
    pub user_id: String,
    pub file_name: String,
    pub file_size: u64,
    pub file_type: String,
    pub storage_path: String,
    pub storage_bucket: String,
    pub created_at: DateTime<Utc>,
    /// Set for staged uploads; never written to the backend.
    #[serde(skip)]
    pub is_temporary: bool,
}

impl Attachment {
    /// A staged attachment whose object is uploaded but whose row is not.
    pub fn staged(
        user_id: impl Into<String>,
        upload: &FileUpload,
        storage_path: impl Into<String>,
        storage_bucket: impl Into<String>,
    ) -> Self {
        Self {
            id: AttachmentId::staged(),
            note_id: None,
            user_id: user_id.into(),
            file_name: upload.file_name.clone(),
            file_size: upload.size(),
            file_type: upload.mime_type(),
            storage_path: storage_path.into(),
            storage_bucket: storage_bucket.into(),
            created_at: Utc::now(),
            is_temporary: true,
        }
    }

    /// Row payload binding this attachment to a note.
    #[must_use]
    pub fn to_new_row(&self, note_id: &NoteId) -> NewAttachment {
        NewAttachment {
            note_id: note_id.clone(),
            user_id: self.user_id.clone(),
            file_name: self.file_name.clone(),
            file_size: self.file_size,
            file_type: self.file_type.clone(),
            storage_path: self.storage_path.clone(),
            storage_bucket: self.storage_bucket.clone(),
        }
    }

    pub fn media_kind(&self) -> MediaKind {
        MediaKind::from_file_name(&self.file_name)
    }

    pub fn is_image(&self) -> bool {
        self.media_kind() == MediaKind::Image
    }

    pub fn is_video(&self) -> bool {
        self.media_kind() == MediaKind::Video
    }

    pub fn is_media(&self) -> bool {
        self.media_kind() != MediaKind::Other
    }

    pub fn formatted_size(&self) -> String {
        crate::util::format_file_size(self.file_size)
    }
}

/// Insert payload for the `file_attachments` table; the id and creation time
/// are assigned by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewAttachment {
    pub note_id: NoteId,
    pub user_id: String,
    pub file_name: String,
    pub file_size: u64,
    pub file_type: String,
    pub storage_path: String,
    pub storage_bucket: String,
}

/// A file picked for upload.
#[derive(Clone, PartialEq, Eq)]
pub struct FileUpload {
    pub file_name: String,
    pub bytes: Vec<u8>,
    pub mime_type: Option<String>,
}

impl FileUpload {
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Result<Self> {
        let file_name = file_name.into().trim().to_string();
        if file_name.is_empty() {
            return Err(Error::InvalidInput(
                "Attachment file name cannot be empty".to_string(),
            ));
        }
        Ok(Self {
            file_name,
            bytes,
            mime_type: None,
        })
    }

    /// Read a file from disk, keeping only its final path component as the name.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .ok_or_else(|| {
                Error::InvalidInput(format!("Not a file path: {}", path.display()))
            })?;
        let bytes = std::fs::read(path)?;
        Self::new(file_name, bytes)
    }

    #[must_use]
    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = crate::util::normalize_text_option(Some(mime_type.into()));
        self
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }

    pub fn extension(&self) -> Option<String> {
        file_extension(&self.file_name)
    }

    /// Explicit MIME type, else one guessed from the extension.
    pub fn mime_type(&self) -> String {
        self.mime_type.clone().unwrap_or_else(|| {
            mime_guess::from_path(&self.file_name)
                .first_raw()
                .unwrap_or(FALLBACK_MIME_TYPE)
                .to_string()
        })
    }
}

impl fmt::Debug for FileUpload {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("FileUpload")
            .field("file_name", &self.file_name)
            .field("size", &self.bytes.len())
            .field("mime_type", &self.mime_type)
            .finish()
    }
}

fn file_extension(file_name: &str) -> Option<String> {
    let (stem, extension) = file_name.rsplit_once('.')?;
    if stem.is_empty() || extension.is_empty() {
        return None;
    }
    Some(extension.to_ascii_lowercase())
}
