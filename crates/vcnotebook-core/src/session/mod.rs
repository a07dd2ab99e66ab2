//! Notebook session: one signed-in user, one notes controller and, while the
//! hosted backend is in use, one attachment controller.

use std::sync::Arc;

use crate::attachments::AttachmentController;
use crate::backend::{AttachmentBackend, NoteBackend, ObjectStorage, SupabaseClient};
use crate::config::ServerConfigClient;
use crate::db::LocalNoteStore;
use crate::error::{Error, Result};
use crate::models::{Attachment, AttachmentId, FileUpload, Note, NoteId};
use crate::notes::{LoadReport, NotesController};
use crate::state::BackendMode;

/// Outcome of [`Notebook::save_current`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveOutcome {
    pub note: Note,
    pub created: bool,
    /// Staged attachments written under the new note.
    pub promoted: usize,
    /// Set when the note was saved but its staged attachments were not.
    pub promotion_error: Option<String>,
}

/// Collects what a session needs before deciding hosted or offline.
pub struct NotebookBuilder {
    user_id: String,
    local: LocalNoteStore,
    access_token: Option<String>,
}

impl NotebookBuilder {
    pub fn new(user_id: impl Into<String>, local: LocalNoteStore) -> Self {
        Self {
            user_id: user_id.into(),
            local,
            access_token: None,
        }
    }

    /// Identity token forwarded to the hosted backend.
    #[must_use]
    pub fn access_token(mut self, token: Option<String>) -> Self {
        self.access_token = token;
        self
    }

    /// Ask the proxy for backend credentials. Any failure, or credentials
    /// that are absent or unusable, yields an offline session.
    pub async fn connect_via(self, config: &ServerConfigClient) -> Notebook {
        let backend_config = match config.backend_config().await {
            Ok(backend_config) => backend_config,
            Err(error) => {
                let reason = format!("backend configuration unavailable: {error}");
                return self.offline(&reason);
            }
        };
        let Some((url, anon_key)) = backend_config.credentials() else {
            return self.offline("backend credentials are not configured");
        };
        match SupabaseClient::new(&url, &anon_key) {
            Ok(client) => self.with_supabase(client),
            Err(error) => self.offline(&error.to_string()),
        }
    }

    pub fn with_supabase(self, client: SupabaseClient) -> Notebook {
        let client = match self.access_token.clone() {
            Some(token) => client.with_access_token(token),
            None => client,
        };
        let client = Arc::new(client);
        self.with_backend(client.clone(), client.clone(), client)
    }

    pub fn with_backend(
        self,
        notes: Arc<dyn NoteBackend>,
        rows: Arc<dyn AttachmentBackend>,
        storage: Arc<dyn ObjectStorage>,
    ) -> Notebook {
        let mut controller = NotesController::new(self.user_id.clone(), self.local);
        let attachments = match controller.connect(notes) {
            Ok(()) => Some(AttachmentController::new(self.user_id, storage, rows)),
            Err(_) => None,
        };
        tracing::info!(mode = %controller.mode(), "Notebook session ready");
        Notebook {
            notes: controller,
            attachments,
        }
    }

    pub fn offline(self, reason: &str) -> Notebook {
        let mut controller = NotesController::new(self.user_id, self.local);
        controller.go_offline(reason);
        Notebook {
            notes: controller,
            attachments: None,
        }
    }
}

pub struct Notebook {
    notes: NotesController,
    attachments: Option<AttachmentController>,
}

impl Notebook {
    pub const fn mode(&self) -> BackendMode {
        self.notes.mode()
    }

    pub const fn notes(&self) -> &NotesController {
        &self.notes
    }

    pub fn notes_mut(&mut self) -> &mut NotesController {
        &mut self.notes
    }

    pub const fn attachments(&self) -> Option<&AttachmentController> {
        self.attachments.as_ref()
    }

    fn attachments_mut(&mut self) -> Result<&mut AttachmentController> {
        if !self.notes.mode().is_hosted() {
            return Err(Error::Offline);
        }
        self.attachments.as_mut().ok_or(Error::Offline)
    }

    pub async fn load(&mut self) -> Result<LoadReport> {
        self.notes.load_all().await
    }

    pub async fn search(&mut self, term: &str) -> &[Note] {
        self.notes.search(term).await
    }

    /// Let a failed hosted call end the hosted session when the backend is
    /// unreachable or the credentials were refused.
    fn settle<T>(&mut self, operation: &str, result: Result<T>) -> Result<T> {
        if let Err(error) = &result {
            self.go_offline_on(operation, error);
        }
        result
    }

    fn go_offline_on(&mut self, operation: &str, error: &Error) {
        if error.is_transport_or_credential() {
            tracing::warn!(operation, "Hosted attachment operation failed: {error}");
            self.notes.go_offline(&error.to_string());
        }
    }

    /// Select a note and load its attachments. The selection only changes
    /// once the attachments are loaded.
    pub async fn select_note(&mut self, id: &NoteId) -> Result<Note> {
        let note = self
            .notes
            .find(id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("note {id}")))?;
        if let Ok(attachments) = self.attachments_mut() {
            let loaded = attachments.load_for_note(Some(id)).await.map(|_| ());
            self.settle("load attachments", loaded)?;
        }
        self.notes.select(id);
        Ok(note)
    }

    /// Start an unsaved note; staged uploads stay with it.
    pub async fn new_note(&mut self) -> Result<()> {
        self.notes.clear_selection();
        if let Ok(attachments) = self.attachments_mut() {
            let loaded = attachments.load_for_note(None).await.map(|_| ());
            self.settle("load attachments", loaded)?;
        }
        Ok(())
    }

    /// Save the editor contents. A newly created note receives the staged
    /// uploads; failing to attach them does not undo the save.
    pub async fn save_current(&mut self, title: &str, content: &str) -> Result<Option<SaveOutcome>> {
        let Some(saved) = self.notes.save_current(title, content).await? else {
            return Ok(None);
        };

        let mut outcome = SaveOutcome {
            note: saved.note,
            created: saved.created,
            promoted: 0,
            promotion_error: None,
        };
        if !outcome.created {
            return Ok(Some(outcome));
        }

        let staged = self
            .attachments
            .as_ref()
            .map_or(0, |attachments| attachments.temporary().len());
        if staged == 0 {
            return Ok(Some(outcome));
        }

        let note_id = outcome.note.id.clone();
        let promoted = match self.attachments_mut() {
            Ok(attachments) => attachments.associate_temporary_with_note(&note_id).await,
            Err(error) => Err(error),
        };
        match promoted {
            Ok(count) => outcome.promoted = count,
            Err(error) => {
                tracing::warn!(note = %note_id, "Failed to attach staged files: {error}");
                self.go_offline_on("promote staged attachments", &error);
                outcome.promotion_error = Some(error.to_string());
            }
        }
        Ok(Some(outcome))
    }

    /// Delete a note, then remove its stored objects on a best-effort basis.
    /// An unreachable backend while listing the note's attachments aborts
    /// the delete before anything is removed.
    pub async fn delete_note(&mut self, id: &NoteId) -> Result<()> {
        let listed = match self.attachments_mut() {
            Ok(attachments) => attachments.fetch_for_note(id).await,
            Err(_) => Ok(Vec::new()),
        };
        let stored = match listed {
            Ok(stored) => stored,
            Err(error) if error.is_transport_or_credential() => {
                return self.settle("list attachments", Err(error));
            }
            Err(error) => {
                tracing::warn!(note = %id, "Could not list attachments before delete: {error}");
                Vec::new()
            }
        };

        let was_current = self.notes.current_note_id() == Some(id);
        self.notes.delete(id).await?;

        if let Some(attachments) = self.attachments.as_mut() {
            for attachment in &stored {
                attachments
                    .remove_object_best_effort(&attachment.storage_path)
                    .await;
            }
            if was_current {
                let loaded = attachments.load_for_note(None).await.map(|_| ());
                self.settle("load attachments", loaded)?;
            }
        }
        Ok(())
    }

    pub async fn upload(&mut self, file: FileUpload) -> Result<Attachment> {
        let current = self.notes.current_note_id().cloned();
        let uploaded = self.attachments_mut()?.upload(file, current.as_ref()).await;
        self.settle("upload attachment", uploaded)
    }

    /// Per-file results; the first unreachable-backend failure ends the
    /// hosted session.
    pub async fn upload_many(&mut self, files: Vec<FileUpload>) -> Result<Vec<Result<Attachment>>> {
        let current = self.notes.current_note_id().cloned();
        let results = self
            .attachments_mut()?
            .upload_many(files, current.as_ref())
            .await;
        if let Some(error) = results
            .iter()
            .filter_map(|result| result.as_ref().err())
            .find(|error| error.is_transport_or_credential())
        {
            self.go_offline_on("upload attachments", error);
        }
        Ok(results)
    }

    pub async fn delete_attachment(&mut self, id: &AttachmentId) -> Result<()> {
        let deleted = self.attachments_mut()?.delete(id).await;
        self.settle("delete attachment", deleted)
    }

    pub async fn preview_url(&mut self, attachment: &Attachment) -> Option<String> {
        self.attachments_mut().ok()?.preview_url(attachment).await
    }

    /// Attachments to show for the current selection.
    pub fn visible_attachments(&self) -> &[Attachment] {
        match &self.attachments {
            Some(attachments) => attachments.visible(self.notes.current_note_id()),
            None => &[],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::memory::{FailureKind, MemoryBackend};
    use crate::notes::DataSource;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn hosted() -> (Notebook, Arc<MemoryBackend>) {
        let backend = Arc::new(MemoryBackend::default());
        let notebook = NotebookBuilder::new("user-1", LocalNoteStore::open_in_memory().unwrap())
            .with_backend(backend.clone(), backend.clone(), backend.clone());
        (notebook, backend)
    }

    fn upload(name: &str) -> FileUpload {
        FileUpload::new(name, vec![1, 2, 3]).unwrap()
    }

    #[tokio::test]
    async fn first_save_promotes_staged_uploads_once() {
        let (mut notebook, backend) = hosted();
        notebook.load().await.unwrap();
        notebook.upload(upload("a.png")).await.unwrap();
        notebook.upload(upload("b.pdf")).await.unwrap();
        assert_eq!(notebook.visible_attachments().len(), 2);

        let outcome = notebook.save_current("Trip", "photos").await.unwrap().unwrap();
        assert!(outcome.created);
        assert_eq!(outcome.promoted, 2);
        assert_eq!(outcome.promotion_error, None);

        let rows = backend.attachments.lock().unwrap().clone();
        assert_eq!(rows.len(), 2);
        assert!(rows
            .iter()
            .all(|row| row.note_id.as_ref() == Some(&outcome.note.id)));
        assert_eq!(notebook.visible_attachments().len(), 2);

        let again = notebook.save_current("Trip", "more").await.unwrap().unwrap();
        assert!(!again.created);
        assert_eq!(again.promoted, 0);
        assert_eq!(backend.attachments.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn promotion_failure_keeps_the_saved_note() {
        let (mut notebook, backend) = hosted();
        notebook.upload(upload("a.png")).await.unwrap();
        backend.fail(|failures| failures.attachment_rows = Some(FailureKind::Api));

        let outcome = notebook.save_current("Kept", "").await.unwrap().unwrap();
        assert!(outcome.promotion_error.is_some());
        assert_eq!(notebook.notes().notes().len(), 1);
        assert_eq!(notebook.attachments().unwrap().temporary().len(), 1);
    }

    #[tokio::test]
    async fn upload_to_selected_note_is_permanent() {
        let (mut notebook, backend) = hosted();
        let saved = notebook.save_current("Note", "").await.unwrap().unwrap();
        notebook.select_note(&saved.note.id).await.unwrap();

        let attachment = notebook.upload(upload("c.txt")).await.unwrap();
        assert!(!attachment.is_temporary);
        assert_eq!(backend.attachments.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn delete_note_removes_stored_objects() {
        let (mut notebook, backend) = hosted();
        let saved = notebook.save_current("Note", "").await.unwrap().unwrap();
        notebook.upload(upload("c.txt")).await.unwrap();
        assert_eq!(backend.objects.lock().unwrap().len(), 1);

        notebook.delete_note(&saved.note.id).await.unwrap();
        assert!(backend.objects.lock().unwrap().is_empty());
        assert!(notebook.notes().notes().is_empty());
        assert!(notebook.visible_attachments().is_empty());
    }

    #[tokio::test]
    async fn offline_session_refuses_attachments() {
        let mut notebook = NotebookBuilder::new("user-1", LocalNoteStore::open_in_memory().unwrap())
            .offline("test");
        assert_eq!(notebook.mode(), BackendMode::Offline);
        assert!(matches!(
            notebook.upload(upload("a.txt")).await,
            Err(Error::Offline)
        ));
        let saved = notebook.save_current("Local", "").await.unwrap().unwrap();
        assert!(saved.created);
        assert!(notebook.visible_attachments().is_empty());
    }

    #[tokio::test]
    async fn unreachable_attachment_rows_end_hosted_session_and_keep_selection() {
        let (mut notebook, backend) = hosted();
        let first = notebook.save_current("First", "").await.unwrap().unwrap();
        notebook.new_note().await.unwrap();
        let second = notebook.save_current("Second", "").await.unwrap().unwrap();
        assert_eq!(notebook.notes().current_note_id(), Some(&second.note.id));
        backend.fail(|failures| failures.attachment_rows = Some(FailureKind::Transport));

        let selected = notebook.select_note(&first.note.id).await;
        assert!(matches!(selected, Err(Error::Transport(_))));
        assert_eq!(notebook.mode(), BackendMode::Offline);
        assert_eq!(notebook.notes().current_note_id(), Some(&second.note.id));

        assert!(matches!(
            notebook.upload(upload("late.txt")).await,
            Err(Error::Offline)
        ));
        let offline_select = notebook.select_note(&first.note.id).await.unwrap();
        assert_eq!(offline_select.id, first.note.id);
    }

    #[tokio::test]
    async fn unreachable_storage_rows_during_upload_go_offline() {
        let (mut notebook, backend) = hosted();
        notebook.save_current("Note", "").await.unwrap().unwrap();
        backend.fail(|failures| failures.attachment_rows = Some(FailureKind::Transport));

        let results = notebook
            .upload_many(vec![upload("a.txt"), upload("b.txt")])
            .await
            .unwrap();
        assert!(results.iter().all(|result| result.is_err()));
        assert_eq!(notebook.mode(), BackendMode::Offline);
    }

    #[tokio::test]
    async fn rejected_attachment_delete_stays_hosted() {
        let (mut notebook, backend) = hosted();
        notebook.save_current("Note", "").await.unwrap().unwrap();
        let attachment = notebook.upload(upload("a.txt")).await.unwrap();
        backend.fail(|failures| failures.attachment_rows = Some(FailureKind::Api));

        assert!(notebook.delete_attachment(&attachment.id).await.is_err());
        assert_eq!(notebook.mode(), BackendMode::Hosted);
    }

    #[tokio::test]
    async fn failed_config_fetch_keeps_every_note_operation_local() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/config"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let local = LocalNoteStore::open_in_memory().unwrap();
        let config = ServerConfigClient::new(&server.uri()).unwrap();
        let mut notebook = NotebookBuilder::new("user-1", local.clone())
            .connect_via(&config)
            .await;
        assert_eq!(notebook.mode(), BackendMode::Offline);

        let kept = notebook.notes_mut().create("Kept", "v1").await.unwrap().unwrap();
        let dropped = notebook.notes_mut().create("Dropped", "").await.unwrap().unwrap();
        notebook
            .notes_mut()
            .update(&kept.id, "Kept", "v2")
            .await
            .unwrap();
        notebook.notes_mut().delete(&dropped.id).await.unwrap();

        let stored = local.load_notes("user-1").await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].id, kept.id);
        assert_eq!(stored[0].content, "v2");

        let report = notebook.load().await.unwrap();
        assert_eq!(report.source, DataSource::Local);
        assert_eq!(report.count, 1);
        assert_eq!(notebook.notes().notes()[0].content, "v2");

        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].url.path(), "/api/config");
    }

    #[tokio::test]
    async fn unreachable_proxy_means_offline() {
        let config = ServerConfigClient::new("http://127.0.0.1:9").unwrap();
        let mut notebook = NotebookBuilder::new("user-1", LocalNoteStore::open_in_memory().unwrap())
            .connect_via(&config)
            .await;
        assert_eq!(notebook.mode(), BackendMode::Offline);
        assert!(notebook.load().await.is_ok());
    }

    #[tokio::test]
    async fn missing_credentials_mean_offline() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/config"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "supabaseUrl": null,
                "supabaseAnonKey": null
            })))
            .mount(&server)
            .await;

        let config = ServerConfigClient::new(&server.uri()).unwrap();
        let notebook = NotebookBuilder::new("user-1", LocalNoteStore::open_in_memory().unwrap())
            .connect_via(&config)
            .await;
        assert_eq!(notebook.mode(), BackendMode::Offline);
    }

    #[tokio::test]
    async fn usable_credentials_mean_hosted() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/config"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "supabaseUrl": server.uri(),
                "supabaseAnonKey": "anon"
            })))
            .mount(&server)
            .await;

        let config = ServerConfigClient::new(&server.uri()).unwrap();
        let notebook = NotebookBuilder::new("user-1", LocalNoteStore::open_in_memory().unwrap())
            .connect_via(&config)
            .await;
        assert_eq!(notebook.mode(), BackendMode::Hosted);
    }
}
