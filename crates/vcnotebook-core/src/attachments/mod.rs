//! Attachment controller.
//!
//! Tracks the permanent attachments of the selected note and the temporary
//! attachments staged for a note that has not been saved yet. Staged uploads
//! already have their object in storage; their rows are written when the note
//! is first saved.

use std::collections::HashMap;
use std::sync::Arc;

use uuid::Uuid;

use crate::backend::{AttachmentBackend, ObjectStorage};
use crate::error::{Error, Result};
use crate::models::{Attachment, AttachmentId, FileUpload, NoteId};
use crate::util::unix_millis_now;

/// Upload ceiling per file (50 MiB).
pub const MAX_UPLOAD_BYTES: u64 = 50 * 1024 * 1024;

/// Lifetime of preview URLs.
pub const PREVIEW_URL_TTL_SECS: u64 = 3600;

pub struct AttachmentController {
    user_id: String,
    storage: Arc<dyn ObjectStorage>,
    rows: Arc<dyn AttachmentBackend>,
    permanent: Vec<Attachment>,
    temporary: Vec<Attachment>,
    previews: HashMap<AttachmentId, String>,
}

impl AttachmentController {
    pub fn new(
        user_id: impl Into<String>,
        storage: Arc<dyn ObjectStorage>,
        rows: Arc<dyn AttachmentBackend>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            storage,
            rows,
            permanent: Vec::new(),
            temporary: Vec::new(),
            previews: HashMap::new(),
        }
    }

    /// Attachments of the selected note, newest first.
    pub fn permanent(&self) -> &[Attachment] {
        &self.permanent
    }

    /// Uploads staged for the unsaved note, in upload order.
    pub fn temporary(&self) -> &[Attachment] {
        &self.temporary
    }

    /// The list to display for the given selection.
    pub fn visible(&self, current_note: Option<&NoteId>) -> &[Attachment] {
        if current_note.is_some() {
            &self.permanent
        } else {
            &self.temporary
        }
    }

    /// Cached preview URL for a media attachment.
    pub fn cached_preview(&self, id: &AttachmentId) -> Option<&str> {
        self.previews.get(id).map(String::as_str)
    }

    /// Upload one file. With a persisted current note the attachment row is
    /// written immediately; otherwise the upload is staged until the note is
    /// saved.
    pub async fn upload(
        &mut self,
        file: FileUpload,
        current_note: Option<&NoteId>,
    ) -> Result<Attachment> {
        let size = file.size();
        if size > MAX_UPLOAD_BYTES {
            return Err(Error::FileTooLarge {
                size,
                limit: MAX_UPLOAD_BYTES,
            });
        }

        let path = storage_path(&self.user_id, &file);
        let staged = Attachment::staged(&self.user_id, &file, &path, self.storage.bucket());
        self.storage
            .upload_object(&path, file.bytes, &staged.file_type)
            .await?;
        tracing::info!(file = %staged.file_name, size, %path, "Uploaded attachment object");

        let attachment = match current_note {
            Some(note_id) => {
                let stored = self
                    .rows
                    .insert_attachments(&[staged.to_new_row(note_id)])
                    .await
                    .inspect_err(|error| {
                        tracing::warn!(%path, "Attachment row insert failed, object left orphaned: {error}");
                    })?;
                let attachment = stored.into_iter().next().ok_or_else(|| Error::Api {
                    status: 200,
                    message: "Insert did not return the stored attachment".to_string(),
                })?;
                self.permanent.insert(0, attachment.clone());
                attachment
            }
            None => {
                self.temporary.push(staged.clone());
                staged
            }
        };

        if attachment.is_media() {
            self.preview_url(&attachment).await;
        }
        Ok(attachment)
    }

    /// Upload files one after another. A failed file does not stop the rest.
    pub async fn upload_many(
        &mut self,
        files: Vec<FileUpload>,
        current_note: Option<&NoteId>,
    ) -> Vec<Result<Attachment>> {
        let mut results = Vec::with_capacity(files.len());
        for file in files {
            let name = file.file_name.clone();
            let result = self.upload(file, current_note).await;
            if let Err(error) = &result {
                tracing::warn!(file = %name, "Attachment upload failed: {error}");
            }
            results.push(result);
        }
        results
    }

    /// Write rows for every staged upload under `note_id` in one request.
    /// On failure the staged uploads are kept.
    pub async fn associate_temporary_with_note(&mut self, note_id: &NoteId) -> Result<usize> {
        if self.temporary.is_empty() {
            return Ok(0);
        }

        let rows: Vec<_> = self
            .temporary
            .iter()
            .map(|attachment| attachment.to_new_row(note_id))
            .collect();
        let stored = self.rows.insert_attachments(&rows).await?;

        for (staged, stored) in self.temporary.iter().zip(&stored) {
            if let Some(url) = self.previews.remove(&staged.id) {
                self.previews.insert(stored.id.clone(), url);
            }
        }
        self.temporary.clear();
        let count = stored.len();
        for attachment in stored.into_iter().rev() {
            self.permanent.insert(0, attachment);
        }
        tracing::info!(note = %note_id, count, "Promoted staged attachments");
        Ok(count)
    }

    /// Reload for a new selection. A saved note gets its permanent list and
    /// drops anything staged; an unsaved note keeps its staged uploads.
    /// A failed fetch leaves both lists as they were.
    pub async fn load_for_note(&mut self, note_id: Option<&NoteId>) -> Result<&[Attachment]> {
        let Some(note_id) = note_id else {
            self.permanent.clear();
            return Ok(&self.temporary);
        };

        let rows = self.rows.list_attachments(note_id).await?;
        if !self.temporary.is_empty() {
            tracing::warn!(
                count = self.temporary.len(),
                "Discarding staged attachments of an unsaved note"
            );
        }
        self.temporary.clear();
        self.previews.clear();

        self.permanent = rows;
        let media: Vec<Attachment> = self
            .permanent
            .iter()
            .filter(|attachment| attachment.is_media())
            .cloned()
            .collect();
        for attachment in &media {
            self.preview_url(attachment).await;
        }
        Ok(&self.permanent)
    }

    /// Delete an attachment. Object removal is best effort; the row delete is not.
    pub async fn delete(&mut self, id: &AttachmentId) -> Result<()> {
        if let Some(index) = self.temporary.iter().position(|item| &item.id == id) {
            let staged = self.temporary.remove(index);
            self.remove_object_best_effort(&staged.storage_path).await;
            self.previews.remove(id);
            return Ok(());
        }

        let attachment = self
            .permanent
            .iter()
            .find(|item| &item.id == id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("attachment {id}")))?;

        self.remove_object_best_effort(&attachment.storage_path).await;
        self.rows.delete_attachment(id).await?;
        self.permanent.retain(|item| &item.id != id);
        self.previews.remove(id);
        tracing::info!(attachment = %id, "Deleted attachment");
        Ok(())
    }

    /// Signed URL valid for an hour, or `None` when signing fails.
    pub async fn preview_url(&mut self, attachment: &Attachment) -> Option<String> {
        match self
            .storage
            .signed_url(&attachment.storage_path, PREVIEW_URL_TTL_SECS)
            .await
        {
            Ok(url) => {
                self.previews.insert(attachment.id.clone(), url.clone());
                Some(url)
            }
            Err(error) => {
                tracing::warn!(attachment = %attachment.id, "Failed to sign preview URL: {error}");
                None
            }
        }
    }

    /// Remove the stored object of an attachment without touching its row.
    pub async fn remove_object_best_effort(&self, path: &str) {
        if let Err(error) = self.storage.remove_object(path).await {
            tracing::warn!(%path, "Failed to remove attachment object: {error}");
        }
    }

    /// Rows of a note without changing the controller's lists.
    pub async fn fetch_for_note(&self, note_id: &NoteId) -> Result<Vec<Attachment>> {
        self.rows.list_attachments(note_id).await
    }
}

/// `{user}/{unix_millis}_{random}.{ext}`; the extension is dropped when the
/// original name has none.
fn storage_path(user_id: &str, file: &FileUpload) -> String {
    let random = Uuid::new_v4().simple().to_string();
    let stem = format!("{user_id}/{}_{}", unix_millis_now(), &random[..12]);
    match file.extension().map(|ext| sanitize_extension(&ext)) {
        Some(ext) if !ext.is_empty() => format!("{stem}.{ext}"),
        _ => stem,
    }
}

fn sanitize_extension(extension: &str) -> String {
    extension
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .collect()
}
