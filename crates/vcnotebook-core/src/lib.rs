//! vcnotebook-core - Core library for VCNotebook
//!
//! Shared models, the offline note store, the hosted backend client and the
//! controllers driven by every VCNotebook front end.

pub mod attachments;
pub mod auth;
pub mod backend;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod notes;
pub mod premium;
pub mod search;
pub mod session;
pub mod state;
pub mod util;

pub use error::{Error, Result};
pub use models::{Attachment, AttachmentId, FileUpload, Note, NoteId};
pub use session::{Notebook, NotebookBuilder, SaveOutcome};
pub use state::BackendMode;
