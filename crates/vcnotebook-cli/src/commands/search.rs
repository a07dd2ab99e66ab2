use crate::cli::GlobalArgs;
use crate::commands::common::{normalize_search_query, open_notebook, print_notes};
use crate::error::CliError;

pub async fn run_search(
    query: &str,
    limit: usize,
    as_json: bool,
    global: &GlobalArgs,
) -> Result<(), CliError> {
    let query = normalize_search_query(query)?;
    let mut notebook = open_notebook(global).await?;
    let matches = notebook.search(&query).await;
    print_notes(&matches[..matches.len().min(limit)], as_json)
}
