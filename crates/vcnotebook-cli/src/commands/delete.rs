use std::io;

use crate::cli::GlobalArgs;
use crate::commands::common::{confirm, open_notebook, resolve_note, short_id};
use crate::error::CliError;

pub async fn run_delete(id: &str, skip_prompt: bool, global: &GlobalArgs) -> Result<(), CliError> {
    let mut notebook = open_notebook(global).await?;
    let note = resolve_note(id, notebook.notes().notes())?;

    if !skip_prompt {
        let prompt = format!("Delete note '{}' ({})?", note.title, short_id(note.id.as_str()));
        if !confirm(&prompt, &mut io::stdin().lock(), &mut io::stderr())? {
            return Err(CliError::Aborted);
        }
    }

    notebook.delete_note(&note.id).await?;
    println!("{}", note.id);
    Ok(())
}
