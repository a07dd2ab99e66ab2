//! In-memory backend double for controller tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;

use super::{AttachmentBackend, NoteBackend, ObjectStorage};
use crate::error::{Error, Result};
use crate::models::{Attachment, AttachmentId, NewAttachment, Note, NoteDraft, NoteId};

/// Which operations should fail, and how.
#[derive(Debug, Default, Clone)]
pub struct Failures {
    pub list: Option<FailureKind>,
    pub search: Option<FailureKind>,
    pub write: Option<FailureKind>,
    pub attachment_rows: Option<FailureKind>,
    pub remove_object: Option<FailureKind>,
    pub sign: Option<FailureKind>,
}

#[derive(Debug, Clone, Copy)]
pub enum FailureKind {
    Transport,
    Api,
}

impl FailureKind {
    fn error(self) -> Error {
        match self {
            Self::Transport => Error::Transport("connection refused".to_string()),
            Self::Api => Error::Api {
                status: 400,
                message: "rejected".to_string(),
            },
        }
    }
}

fn check(kind: Option<FailureKind>) -> Result<()> {
    kind.map_or(Ok(()), |kind| Err(kind.error()))
}

#[derive(Default)]
pub struct MemoryBackend {
    pub notes: Mutex<Vec<Note>>,
    pub attachments: Mutex<Vec<Attachment>>,
    pub objects: Mutex<Vec<String>>,
    pub failures: Mutex<Failures>,
    pub calls: AtomicUsize,
    next_id: AtomicUsize,
}

impl MemoryBackend {
    pub fn with_notes(notes: Vec<Note>) -> Self {
        let backend = Self::default();
        *backend.notes.lock().unwrap() = notes;
        backend
    }

    pub fn fail(&self, update: impl FnOnce(&mut Failures)) {
        update(&mut self.failures.lock().unwrap());
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn failures(&self) -> Failures {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.failures.lock().unwrap().clone()
    }

    fn next_id(&self, prefix: &str) -> String {
        format!("{prefix}-{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1)
    }
}

#[async_trait]
impl NoteBackend for MemoryBackend {
    async fn list_notes(&self, user_id: &str) -> Result<Vec<Note>> {
        check(self.failures().list)?;
        let mut notes: Vec<Note> = self
            .notes
            .lock()
            .unwrap()
            .iter()
            .filter(|note| note.user_id == user_id)
            .cloned()
            .collect();
        notes.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(notes)
    }

    async fn search_notes(&self, user_id: &str, term: &str) -> Result<Vec<Note>> {
        check(self.failures().search)?;
        let notes = self.list_notes(user_id).await?;
        Ok(notes.into_iter().filter(|note| note.matches(term)).collect())
    }

    async fn insert_note(&self, draft: &NoteDraft) -> Result<Note> {
        check(self.failures().write)?;
        let note = draft.clone().into_note(NoteId::new(self.next_id("note")));
        self.notes.lock().unwrap().push(note.clone());
        Ok(note)
    }

    async fn update_note(&self, id: &NoteId, draft: &NoteDraft) -> Result<Note> {
        check(self.failures().write)?;
        let mut notes = self.notes.lock().unwrap();
        let note = notes
            .iter_mut()
            .find(|note| &note.id == id && note.user_id == draft.user_id)
            .ok_or_else(|| Error::NotFound(format!("note {id}")))?;
        note.apply(draft);
        Ok(note.clone())
    }

    async fn delete_note(&self, user_id: &str, id: &NoteId) -> Result<()> {
        check(self.failures().write)?;
        self.notes
            .lock()
            .unwrap()
            .retain(|note| !(&note.id == id && note.user_id == user_id));
        Ok(())
    }
}

#[async_trait]
impl AttachmentBackend for MemoryBackend {
    async fn list_attachments(&self, note_id: &NoteId) -> Result<Vec<Attachment>> {
        check(self.failures().attachment_rows)?;
        let mut rows: Vec<Attachment> = self
            .attachments
            .lock()
            .unwrap()
            .iter()
            .filter(|row| row.note_id.as_ref() == Some(note_id))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows)
    }

    async fn insert_attachments(&self, rows: &[NewAttachment]) -> Result<Vec<Attachment>> {
        check(self.failures().attachment_rows)?;
        let stored: Vec<Attachment> = rows
            .iter()
            .map(|row| Attachment {
                id: AttachmentId::new(self.next_id("att")),
                note_id: Some(row.note_id.clone()),
                user_id: row.user_id.clone(),
                file_name: row.file_name.clone(),
                file_size: row.file_size,
                file_type: row.file_type.clone(),
                storage_path: row.storage_path.clone(),
                storage_bucket: row.storage_bucket.clone(),
                created_at: Utc::now(),
                is_temporary: false,
            })
            .collect();
        self.attachments
            .lock()
            .unwrap()
            .extend(stored.iter().cloned());
        Ok(stored)
    }

    async fn delete_attachment(&self, id: &AttachmentId) -> Result<()> {
        check(self.failures().attachment_rows)?;
        self.attachments.lock().unwrap().retain(|row| &row.id != id);
        Ok(())
    }
}

#[async_trait]
impl ObjectStorage for MemoryBackend {
    fn bucket(&self) -> &str {
        super::DEFAULT_BUCKET
    }

    async fn upload_object(&self, path: &str, _bytes: Vec<u8>, _content_type: &str) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.objects.lock().unwrap().push(path.to_string());
        Ok(())
    }

    async fn remove_object(&self, path: &str) -> Result<()> {
        check(self.failures().remove_object)?;
        self.objects.lock().unwrap().retain(|object| object != path);
        Ok(())
    }

    async fn signed_url(&self, path: &str, expires_in_secs: u64) -> Result<String> {
        check(self.failures().sign)?;
        Ok(format!("https://storage.test/{path}?expires={expires_in_secs}"))
    }
}
