use std::path::PathBuf;

use vcnotebook_core::{AttachmentId, FileUpload, Notebook};

use crate::cli::{AttachCommands, GlobalArgs};
use crate::commands::common::{
    attachment_to_list_item, ensure_hosted, format_attachment_line, open_notebook, resolve_note,
};
use crate::error::CliError;

pub async fn run_attach(command: AttachCommands, global: &GlobalArgs) -> Result<(), CliError> {
    match command {
        AttachCommands::Upload { note, files } => upload(&note, &files, global).await,
        AttachCommands::List { note, json } => list(&note, json, global).await,
        AttachCommands::Delete { note, attachment } => delete(&note, &attachment, global).await,
        AttachCommands::Url { note, attachment } => preview_url(&note, &attachment, global).await,
    }
}

/// Open the notebook with `note_query` selected and its attachments loaded.
async fn open_for_note(note_query: &str, global: &GlobalArgs) -> Result<Notebook, CliError> {
    let mut notebook = open_notebook(global).await?;
    ensure_hosted(&notebook, "attachments are stored remotely")?;
    let note = resolve_note(note_query, notebook.notes().notes())?;
    notebook.select_note(&note.id).await?;
    Ok(notebook)
}

async fn upload(note: &str, files: &[PathBuf], global: &GlobalArgs) -> Result<(), CliError> {
    let uploads = files
        .iter()
        .map(FileUpload::from_path)
        .collect::<Result<Vec<_>, _>>()?;
    let mut notebook = open_for_note(note, global).await?;

    let mut failed = 0usize;
    for (path, result) in files.iter().zip(notebook.upload_many(uploads).await?) {
        match result {
            Ok(attachment) => println!("{}", format_attachment_line(&attachment)),
            Err(error) => {
                failed += 1;
                eprintln!("Warning: {} was not uploaded: {error}", path.display());
            }
        }
    }
    if failed > 0 && failed == files.len() {
        return Err(CliError::UploadFailed(failed));
    }
    Ok(())
}

async fn list(note: &str, as_json: bool, global: &GlobalArgs) -> Result<(), CliError> {
    let notebook = open_for_note(note, global).await?;
    let attachments = notebook.visible_attachments();
    if as_json {
        let items = attachments
            .iter()
            .map(attachment_to_list_item)
            .collect::<Vec<_>>();
        println!("{}", serde_json::to_string_pretty(&items)?);
    } else {
        for attachment in attachments {
            println!("{}", format_attachment_line(attachment));
        }
    }
    Ok(())
}

async fn delete(note: &str, attachment: &str, global: &GlobalArgs) -> Result<(), CliError> {
    let mut notebook = open_for_note(note, global).await?;
    let id = AttachmentId::new(attachment.trim());
    notebook.delete_attachment(&id).await?;
    println!("{id}");
    Ok(())
}

async fn preview_url(note: &str, attachment: &str, global: &GlobalArgs) -> Result<(), CliError> {
    let mut notebook = open_for_note(note, global).await?;
    let wanted = attachment.trim();
    let Some(found) = notebook
        .visible_attachments()
        .iter()
        .find(|candidate| candidate.id.as_str() == wanted)
        .cloned()
    else {
        return Err(CliError::AttachmentNotFound(wanted.to_string()));
    };

    match notebook.preview_url(&found).await {
        Some(url) => {
            println!("{url}");
            Ok(())
        }
        None => Err(CliError::PreviewUnavailable(found.file_name)),
    }
}
