use crate::cli::GlobalArgs;
use crate::commands::common::{
    capture_editor_input_with_initial, normalize_content, open_notebook, resolve_note,
};
use crate::error::CliError;

pub async fn run_edit(
    id: &str,
    title: Option<&str>,
    content: Option<&str>,
    global: &GlobalArgs,
) -> Result<(), CliError> {
    let mut notebook = open_notebook(global).await?;
    let note = resolve_note(id, notebook.notes().notes())?;
    notebook.select_note(&note.id).await?;

    let edited_content = match content {
        Some(content) => normalize_content(content),
        None => capture_editor_input_with_initial(&note.content)?,
    };
    let Some(edited_content) = edited_content else {
        return Err(CliError::EmptyEditedContent);
    };
    let edited_title = title.map_or(note.title.as_str(), str::trim);

    if edited_content == note.content && edited_title == note.title {
        println!("{}", note.id);
        return Ok(());
    }

    let saved = notebook.save_current(edited_title, &edited_content).await?;
    let id = saved.map_or(note.id, |outcome| outcome.note.id);
    println!("{id}");
    Ok(())
}
