//! Data models for VCNotebook

mod attachment;
mod note;
mod subscription;

pub use attachment::{Attachment, AttachmentId, FileUpload, MediaKind, NewAttachment};
pub use note::{Note, NoteDraft, NoteId, DEFAULT_TITLE};
pub use subscription::{SubscriptionStatus, STATUS_ACTIVE, STATUS_INACTIVE};
