//! Local search used offline and when hosted full-text search fails.

use crate::models::Note;

/// Notes whose title or content contains `term`, case-insensitively,
/// keeping the input order.
pub fn filter_notes(notes: &[Note], term: &str) -> Vec<Note> {
    notes
        .iter()
        .filter(|note| note.matches(term))
        .cloned()
        .collect()
}
