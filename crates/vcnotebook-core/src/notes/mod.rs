//! Note synchronization controller.
//!
//! Owns the user's note list, the filtered view shown to the user, the active
//! search term and the current selection. Operations go to the hosted backend
//! while the session is hosted and to the local store once it has fallen back
//! to offline mode.

use std::sync::Arc;

use chrono::Utc;

use crate::backend::NoteBackend;
use crate::db::LocalNoteStore;
use crate::error::{Error, Result};
use crate::models::{Note, NoteDraft, NoteId};
use crate::search::filter_notes;
use crate::state::BackendMode;
use crate::util::unix_millis_now;

/// Where a load was served from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataSource {
    Hosted,
    Local,
}

/// Outcome of [`NotesController::load_all`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadReport {
    pub source: DataSource,
    pub count: usize,
    /// Set when the hosted load failed and the local store was used instead.
    pub fallback_reason: Option<String>,
}

/// Outcome of [`NotesController::save_current`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedNote {
    pub note: Note,
    pub created: bool,
}

pub struct NotesController {
    user_id: String,
    mode: BackendMode,
    backend: Option<Arc<dyn NoteBackend>>,
    local: LocalNoteStore,
    notes: Vec<Note>,
    filtered: Vec<Note>,
    search_term: String,
    current: Option<NoteId>,
}

impl NotesController {
    pub fn new(user_id: impl Into<String>, local: LocalNoteStore) -> Self {
        Self {
            user_id: user_id.into(),
            mode: BackendMode::Uninitialized,
            backend: None,
            local,
            notes: Vec::new(),
            filtered: Vec::new(),
            search_term: String::new(),
            current: None,
        }
    }

    /// Serve operations from the hosted backend. Refused once offline.
    pub fn connect(&mut self, backend: Arc<dyn NoteBackend>) -> Result<()> {
        if self.mode.is_offline() {
            return Err(Error::Offline);
        }
        self.backend = Some(backend);
        self.mode = BackendMode::Hosted;
        Ok(())
    }

    /// Switch to the local store for the rest of this controller's life.
    pub fn go_offline(&mut self, reason: &str) {
        if !self.mode.is_offline() {
            tracing::warn!(reason, "Switching notes to offline mode");
        }
        self.mode = BackendMode::Offline;
        self.backend = None;
    }

    pub const fn mode(&self) -> BackendMode {
        self.mode
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn notes(&self) -> &[Note] {
        &self.notes
    }

    /// The list to display: all notes, or the search results when a term is set.
    pub fn filtered(&self) -> &[Note] {
        &self.filtered
    }

    pub fn search_term(&self) -> &str {
        &self.search_term
    }

    pub fn find(&self, id: &NoteId) -> Option<&Note> {
        self.notes.iter().find(|note| &note.id == id)
    }

    pub const fn current_note_id(&self) -> Option<&NoteId> {
        self.current.as_ref()
    }

    pub fn current_note(&self) -> Option<&Note> {
        self.current.as_ref().and_then(|id| self.find(id))
    }

    /// Make `id` the current note. Unknown ids leave the selection unchanged.
    pub fn select(&mut self, id: &NoteId) -> Option<&Note> {
        let index = self.notes.iter().position(|note| &note.id == id)?;
        self.current = Some(id.clone());
        self.notes.get(index)
    }

    /// Start a new, unsaved note.
    pub fn clear_selection(&mut self) {
        self.current = None;
    }

    fn hosted_backend(&mut self) -> Option<Arc<dyn NoteBackend>> {
        match self.mode {
            BackendMode::Hosted => self.backend.clone(),
            BackendMode::Uninitialized => {
                self.go_offline("no hosted backend configured");
                None
            }
            BackendMode::Offline => None,
        }
    }

    fn note_failure(&mut self, operation: &str, error: &Error) {
        tracing::warn!(operation, "Hosted note operation failed: {error}");
        if error.is_transport_or_credential() {
            self.go_offline(&error.to_string());
        }
    }

    /// Load every note of the user, falling back to the local store when the
    /// hosted backend fails.
    pub async fn load_all(&mut self) -> Result<LoadReport> {
        let mut fallback_reason = None;

        if let Some(backend) = self.hosted_backend() {
            match backend.list_notes(&self.user_id).await {
                Ok(notes) => {
                    self.notes = notes;
                    self.refresh_view().await;
                    tracing::info!(count = self.notes.len(), "Loaded notes from hosted backend");
                    return Ok(LoadReport {
                        source: DataSource::Hosted,
                        count: self.notes.len(),
                        fallback_reason: None,
                    });
                }
                Err(error) => {
                    tracing::warn!("Failed to load hosted notes: {error}");
                    self.go_offline(&error.to_string());
                    fallback_reason = Some(error.to_string());
                }
            }
        }

        self.notes = self.local.load_notes(&self.user_id).await?;
        self.refresh_view().await;
        tracing::info!(count = self.notes.len(), "Loaded notes from local store");
        Ok(LoadReport {
            source: DataSource::Local,
            count: self.notes.len(),
            fallback_reason,
        })
    }

    /// Create a note. Returns `Ok(None)` without touching anything when the
    /// title and content are both empty.
    pub async fn create(&mut self, title: &str, content: &str) -> Result<Option<Note>> {
        let Some(draft) = NoteDraft::from_input(&self.user_id, title, content, Utc::now(), true)
        else {
            return Ok(None);
        };

        let note = if let Some(backend) = self.hosted_backend() {
            match backend.insert_note(&draft).await {
                Ok(note) => note,
                Err(error) => {
                    self.note_failure("create", &error);
                    return Err(error);
                }
            }
        } else {
            let note = draft.into_note(self.next_local_id());
            let mut notes = self.notes.clone();
            notes.insert(0, note.clone());
            self.local.save_notes(&self.user_id, &notes).await?;
            note
        };

        self.remember(note.clone());
        self.refresh_view().await;
        tracing::info!(note = %note.id, mode = %self.mode, "Created note");
        Ok(Some(note))
    }

    /// Update a note. Returns `Ok(None)` without touching anything when the
    /// title and content are both empty.
    pub async fn update(&mut self, id: &NoteId, title: &str, content: &str) -> Result<Option<Note>> {
        let Some(draft) = NoteDraft::from_input(&self.user_id, title, content, Utc::now(), false)
        else {
            return Ok(None);
        };

        let note = if let Some(backend) = self.hosted_backend() {
            match backend.update_note(id, &draft).await {
                Ok(note) => note,
                Err(error) => {
                    self.note_failure("update", &error);
                    return Err(error);
                }
            }
        } else {
            let mut notes = self.notes.clone();
            let note = notes
                .iter_mut()
                .find(|note| &note.id == id)
                .ok_or_else(|| Error::NotFound(format!("note {id}")))?;
            note.apply(&draft);
            let note = note.clone();
            self.local.save_notes(&self.user_id, &notes).await?;
            note
        };

        self.remember(note.clone());
        self.refresh_view().await;
        tracing::info!(note = %note.id, mode = %self.mode, "Updated note");
        Ok(Some(note))
    }

    /// Delete a note. Confirmation is the caller's responsibility.
    pub async fn delete(&mut self, id: &NoteId) -> Result<()> {
        if let Some(backend) = self.hosted_backend() {
            if let Err(error) = backend.delete_note(&self.user_id, id).await {
                self.note_failure("delete", &error);
                return Err(error);
            }
            self.notes.retain(|note| &note.id != id);
        } else {
            if self.find(id).is_none() {
                return Err(Error::NotFound(format!("note {id}")));
            }
            let notes: Vec<Note> = self
                .notes
                .iter()
                .filter(|note| &note.id != id)
                .cloned()
                .collect();
            self.local.save_notes(&self.user_id, &notes).await?;
            self.notes = notes;
        }

        if self.current.as_ref() == Some(id) {
            self.current = None;
        }
        self.refresh_view().await;
        tracing::info!(note = %id, mode = %self.mode, "Deleted note");
        Ok(())
    }

    /// Set the search term and return the refreshed view. Never fails: a
    /// hosted search error degrades to matching the in-memory list.
    pub async fn search(&mut self, term: &str) -> &[Note] {
        self.search_term = term.trim().to_string();
        self.refresh_view().await;
        &self.filtered
    }

    /// Save the editor contents: update the selected note, or create one and
    /// select it.
    pub async fn save_current(&mut self, title: &str, content: &str) -> Result<Option<SavedNote>> {
        if let Some(id) = self.current.clone() {
            let note = self.update(&id, title, content).await?;
            return Ok(note.map(|note| SavedNote {
                note,
                created: false,
            }));
        }

        let Some(note) = self.create(title, content).await? else {
            return Ok(None);
        };
        self.current = Some(note.id.clone());
        Ok(Some(SavedNote {
            note,
            created: true,
        }))
    }

    fn remember(&mut self, note: Note) {
        if let Some(existing) = self.notes.iter_mut().find(|existing| existing.id == note.id) {
            *existing = note;
        } else {
            self.notes.insert(0, note);
        }
    }

    async fn refresh_view(&mut self) {
        if self.search_term.is_empty() {
            self.filtered = self.notes.clone();
            return;
        }

        let term = self.search_term.clone();
        self.filtered = if let Some(backend) = self.hosted_backend() {
            match backend.search_notes(&self.user_id, &term).await {
                Ok(found) => found,
                Err(error) => {
                    self.note_failure("search", &error);
                    filter_notes(&self.notes, &term)
                }
            }
        } else {
            filter_notes(&self.notes, &term)
        };
    }

    fn next_local_id(&self) -> NoteId {
        let mut millis = unix_millis_now();
        loop {
            let id = NoteId::from_millis(millis);
            if self.find(&id).is_none() {
                return id;
            }
            millis += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::memory::{FailureKind, MemoryBackend};
    use pretty_assertions::assert_eq;

    fn seeded_note(id: &str, title: &str, content: &str, age_minutes: i64) -> Note {
        let when = Utc::now() - chrono::Duration::minutes(age_minutes);
        NoteDraft::from_input("user-1", title, content, when, true)
            .unwrap()
            .into_note(NoteId::new(id))
    }

    fn hosted(notes: Vec<Note>) -> (NotesController, Arc<MemoryBackend>) {
        let backend = Arc::new(MemoryBackend::with_notes(notes));
        let mut controller =
            NotesController::new("user-1", LocalNoteStore::open_in_memory().unwrap());
        controller.connect(backend.clone()).unwrap();
        (controller, backend)
    }

    fn offline() -> NotesController {
        let mut controller =
            NotesController::new("user-1", LocalNoteStore::open_in_memory().unwrap());
        controller.go_offline("test");
        controller
    }

    fn ids(notes: &[Note]) -> Vec<String> {
        notes.iter().map(|note| note.id.to_string()).collect()
    }

    #[tokio::test]
    async fn load_all_is_ordered_and_idempotent() {
        let (mut controller, _) = hosted(vec![
            seeded_note("old", "Old", "", 30),
            seeded_note("new", "New", "", 1),
        ]);

        let report = controller.load_all().await.unwrap();
        assert_eq!(report.source, DataSource::Hosted);
        let first = ids(controller.notes());
        controller.load_all().await.unwrap();
        assert_eq!(ids(controller.notes()), first);
        assert_eq!(first, vec!["new", "old"]);
        assert_eq!(ids(controller.filtered()), first);
    }

    #[tokio::test]
    async fn load_failure_falls_back_to_local_store_for_good() {
        let local = LocalNoteStore::open_in_memory().unwrap();
        local
            .save_notes("user-1", &[seeded_note("1700000000000", "Local", "", 5)])
            .await
            .unwrap();
        let backend = Arc::new(MemoryBackend::default());
        backend.fail(|failures| failures.list = Some(FailureKind::Api));
        let mut controller = NotesController::new("user-1", local.clone());
        controller.connect(backend.clone()).unwrap();

        let report = controller.load_all().await.unwrap();
        assert_eq!(report.source, DataSource::Local);
        assert!(report.fallback_reason.is_some());
        assert_eq!(controller.mode(), BackendMode::Offline);
        assert_eq!(ids(controller.notes()), vec!["1700000000000"]);

        let calls = backend.call_count();
        controller.create("Offline", "still works").await.unwrap().unwrap();
        assert_eq!(backend.call_count(), calls);
        assert_eq!(local.load_notes("user-1").await.unwrap().len(), 2);

        assert!(matches!(controller.connect(backend), Err(Error::Offline)));
        assert_eq!(controller.mode(), BackendMode::Offline);
    }

    #[tokio::test]
    async fn uninitialized_controller_uses_local_store() {
        let mut controller =
            NotesController::new("user-1", LocalNoteStore::open_in_memory().unwrap());
        assert_eq!(controller.mode(), BackendMode::Uninitialized);
        let report = controller.load_all().await.unwrap();
        assert_eq!(report.source, DataSource::Local);
        assert_eq!(controller.mode(), BackendMode::Offline);
    }

    #[tokio::test]
    async fn empty_input_is_a_no_op() {
        let (mut controller, backend) = hosted(vec![seeded_note("a", "A", "", 1)]);
        controller.load_all().await.unwrap();
        let calls = backend.call_count();
        let before = controller.notes().to_vec();

        assert_eq!(controller.create("  ", "\n").await.unwrap(), None);
        assert_eq!(
            controller.update(&NoteId::new("a"), "", " ").await.unwrap(),
            None
        );
        assert_eq!(backend.call_count(), calls);
        assert_eq!(controller.notes(), before.as_slice());
    }

    #[tokio::test]
    async fn create_prepends_exactly_once() {
        let (mut controller, _) = hosted(vec![seeded_note("a", "A", "", 1)]);
        controller.load_all().await.unwrap();

        let note = controller.create("", "only content").await.unwrap().unwrap();
        assert_eq!(note.title, "Untitled");
        assert_eq!(controller.notes()[0].id, note.id);
        assert_eq!(
            controller.notes().iter().filter(|n| n.id == note.id).count(),
            1
        );
        assert_eq!(controller.filtered(), controller.notes());
    }

    #[tokio::test]
    async fn write_with_active_search_reruns_search() {
        let (mut controller, _) = hosted(vec![seeded_note("a", "Groceries", "milk", 1)]);
        controller.load_all().await.unwrap();
        assert_eq!(controller.search("milk").await.len(), 1);

        controller.create("Dairy", "more milk").await.unwrap();
        controller.create("Unrelated", "tea").await.unwrap();
        assert_eq!(controller.filtered().len(), 2);
        assert_eq!(controller.notes().len(), 3);

        assert_eq!(controller.search("  ").await.len(), 3);
    }

    #[tokio::test]
    async fn update_replaces_entry_by_id() {
        let (mut controller, _) = hosted(vec![
            seeded_note("a", "A", "", 1),
            seeded_note("b", "B", "", 2),
        ]);
        controller.load_all().await.unwrap();

        let updated = controller
            .update(&NoteId::new("b"), "B2", "changed")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.title, "B2");
        assert_eq!(ids(controller.notes()), vec!["a", "b"]);
        assert_eq!(controller.notes()[1].content, "changed");
    }

    #[tokio::test]
    async fn write_failure_leaves_state_untouched() {
        let (mut controller, backend) = hosted(vec![seeded_note("a", "A", "", 1)]);
        controller.load_all().await.unwrap();
        backend.fail(|failures| failures.write = Some(FailureKind::Api));

        assert!(controller.create("New", "").await.is_err());
        assert_eq!(ids(controller.notes()), vec!["a"]);
        assert_eq!(controller.mode(), BackendMode::Hosted);
    }

    #[tokio::test]
    async fn transport_failure_on_write_goes_offline() {
        let (mut controller, backend) = hosted(vec![seeded_note("a", "A", "", 1)]);
        controller.load_all().await.unwrap();
        backend.fail(|failures| failures.write = Some(FailureKind::Transport));

        assert!(controller.delete(&NoteId::new("a")).await.is_err());
        assert_eq!(controller.mode(), BackendMode::Offline);
    }

    #[tokio::test]
    async fn delete_clears_current_selection() {
        let (mut controller, _) = hosted(vec![
            seeded_note("a", "A", "", 1),
            seeded_note("b", "B", "", 2),
        ]);
        controller.load_all().await.unwrap();
        controller.select(&NoteId::new("a")).unwrap();

        controller.delete(&NoteId::new("b")).await.unwrap();
        assert_eq!(controller.current_note_id(), Some(&NoteId::new("a")));

        controller.delete(&NoteId::new("a")).await.unwrap();
        assert_eq!(controller.current_note_id(), None);
        assert!(controller.notes().is_empty());
    }

    #[tokio::test]
    async fn hosted_create_then_delete_is_gone_after_reload() {
        let backend = Arc::new(MemoryBackend::default());
        let mut controller = NotesController::new("u1", LocalNoteStore::open_in_memory().unwrap());
        controller.connect(backend.clone()).unwrap();

        let a = controller.create("A", "first").await.unwrap().unwrap();
        let b = controller.create("B", "second").await.unwrap().unwrap();

        let rows = backend.notes.lock().unwrap().clone();
        assert_eq!(rows.len(), 2);
        for row in &rows {
            assert_eq!(row.user_id, "u1");
            assert_eq!(row.created_at, row.updated_at);
        }

        controller.delete(&a.id).await.unwrap();
        let report = controller.load_all().await.unwrap();
        assert_eq!(report.source, DataSource::Hosted);
        assert_eq!(ids(controller.notes()), vec![b.id.to_string()]);
        assert!(controller.find(&a.id).is_none());
    }

    #[tokio::test]
    async fn search_error_degrades_to_local_match() {
        let (mut controller, backend) = hosted(vec![
            seeded_note("a", "Groceries", "milk", 1),
            seeded_note("b", "Work", "standup", 2),
        ]);
        controller.load_all().await.unwrap();
        backend.fail(|failures| failures.search = Some(FailureKind::Api));

        let found = ids(controller.search("MILK").await);
        assert_eq!(found, vec!["a"]);
        assert_eq!(controller.mode(), BackendMode::Hosted);

        backend.fail(|failures| failures.search = Some(FailureKind::Transport));
        let found = ids(controller.search("stand").await);
        assert_eq!(found, vec!["b"]);
        assert_eq!(controller.mode(), BackendMode::Offline);
    }

    #[tokio::test]
    async fn offline_notes_get_unique_timestamp_ids() {
        let mut controller = offline();
        let first = controller.create("One", "").await.unwrap().unwrap();
        let second = controller.create("Two", "").await.unwrap().unwrap();
        assert_ne!(first.id, second.id);
        assert!(first.id.as_str().parse::<i64>().is_ok());
        assert_eq!(ids(controller.notes()), vec![second.id.to_string(), first.id.to_string()]);
    }

    #[tokio::test]
    async fn offline_update_and_delete_persist() {
        let local = LocalNoteStore::open_in_memory().unwrap();
        let mut controller = NotesController::new("user-1", local.clone());
        controller.go_offline("test");

        let note = controller.create("Draft", "v1").await.unwrap().unwrap();
        controller.update(&note.id, "Draft", "v2").await.unwrap();
        assert_eq!(local.load_notes("user-1").await.unwrap()[0].content, "v2");

        assert!(matches!(
            controller.update(&NoteId::new("missing"), "x", "").await,
            Err(Error::NotFound(_))
        ));

        controller.delete(&note.id).await.unwrap();
        assert!(local.load_notes("user-1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn save_current_creates_then_updates() {
        let mut controller = offline();
        let saved = controller.save_current("First", "").await.unwrap().unwrap();
        assert!(saved.created);
        assert_eq!(controller.current_note_id(), Some(&saved.note.id));

        let saved_again = controller.save_current("First", "more").await.unwrap().unwrap();
        assert!(!saved_again.created);
        assert_eq!(saved_again.note.id, saved.note.id);
        assert_eq!(controller.notes().len(), 1);

        controller.clear_selection();
        assert!(controller.save_current("", "").await.unwrap().is_none());
    }
}
