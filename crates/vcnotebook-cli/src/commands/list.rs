use crate::cli::GlobalArgs;
use crate::commands::common::{open_notebook, print_notes};
use crate::error::CliError;

pub async fn run_list(limit: usize, as_json: bool, global: &GlobalArgs) -> Result<(), CliError> {
    let notebook = open_notebook(global).await?;
    let notes = notebook.notes().notes();
    print_notes(&notes[..notes.len().min(limit)], as_json)
}
