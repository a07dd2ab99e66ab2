use std::path::PathBuf;

use vcnotebook_core::FileUpload;

use crate::cli::GlobalArgs;
use crate::commands::common::{
    ensure_hosted, normalize_content, open_notebook, resolve_note_content,
};
use crate::error::CliError;

/// Create a note. Files passed with `--attach` are staged first and moved
/// under the note once it is saved. A title with no content makes a
/// title-only note; stdin and `$EDITOR` are only consulted without a title.
pub async fn run_add(
    title: Option<&str>,
    content_parts: &[String],
    attach: &[PathBuf],
    global: &GlobalArgs,
) -> Result<(), CliError> {
    let title = title.and_then(normalize_content);
    let content = if title.is_some() && normalize_content(&content_parts.join(" ")).is_none() {
        String::new()
    } else {
        resolve_note_content(content_parts)?
    };
    let uploads = attach
        .iter()
        .map(FileUpload::from_path)
        .collect::<Result<Vec<_>, _>>()?;

    let mut notebook = open_notebook(global).await?;
    notebook.new_note().await?;

    if !uploads.is_empty() {
        ensure_hosted(&notebook, "files cannot be attached")?;
        for result in notebook.upload_many(uploads).await? {
            match result {
                Ok(attachment) => tracing::debug!(file = %attachment.file_name, "Staged upload"),
                Err(error) => eprintln!("Warning: upload failed: {error}"),
            }
        }
    }

    let Some(outcome) = notebook.save_current(title.as_deref().unwrap_or_default(), &content).await? else {
        return Err(CliError::EmptyContent);
    };

    if outcome.promoted > 0 {
        eprintln!("Attached {} file(s)", outcome.promoted);
    }
    if let Some(error) = &outcome.promotion_error {
        eprintln!("Warning: note saved but its attachments were not linked: {error}");
    }
    println!("{}", outcome.note.id);
    Ok(())
}
