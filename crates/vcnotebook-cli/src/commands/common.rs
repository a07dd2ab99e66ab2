use std::env;
use std::io::{self, BufRead, IsTerminal, Read, Write};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Utc};
use serde::Serialize;
use vcnotebook_core::config::ServerConfigClient;
use vcnotebook_core::db::LocalNoteStore;
use vcnotebook_core::util::{relative_day, snippet};
use vcnotebook_core::{Attachment, Note, Notebook, NotebookBuilder};

use crate::auth::{load_stored_session, AuthSession, FirebaseAuthService};
use crate::cli::GlobalArgs;
use crate::error::CliError;

/// Identity used when nobody is signed in.
pub const LOCAL_USER_ID: &str = "local";
const LOCAL_DB_FILE: &str = "notes.db";
const SHORT_ID_CHARS: usize = 13;

#[derive(Debug, Serialize)]
pub struct NoteListItem {
    pub id: String,
    pub title: String,
    pub preview: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub relative_time: String,
}

#[derive(Debug, Serialize)]
pub struct AttachmentListItem {
    pub id: String,
    pub file_name: String,
    pub file_size: u64,
    pub file_type: String,
    pub size: String,
    pub storage_path: String,
}

/// Who the command runs as, and why it cannot use the hosted backend if so.
#[derive(Debug)]
pub struct Identity {
    pub user_id: String,
    pub session: Option<AuthSession>,
    pub offline_reason: Option<&'static str>,
}

pub async fn resolve_identity(global: &GlobalArgs) -> Result<Identity, CliError> {
    if let Some(user_id) = global.user_id.as_deref().map(str::trim).filter(|id| !id.is_empty()) {
        return Ok(Identity {
            user_id: user_id.to_string(),
            session: None,
            offline_reason: Some("local identity override"),
        });
    }

    let session = if global.offline {
        load_stored_session(&global.api_url)?
    } else {
        match FirebaseAuthService::connect(&global.api_url, global.auth_url.as_deref()).await {
            Ok(service) => service.restore_session().await?,
            Err(error) => {
                tracing::warn!("Identity provider unavailable, using stored session: {error}");
                load_stored_session(&global.api_url)?
            }
        }
    };

    let offline_reason = if global.offline {
        Some("offline mode requested")
    } else if session.is_none() {
        Some("not signed in")
    } else {
        None
    };

    Ok(Identity {
        user_id: session
            .as_ref()
            .map_or_else(|| LOCAL_USER_ID.to_string(), |session| session.user.id.clone()),
        session,
        offline_reason,
    })
}

/// A signed-in session, refreshed when close to expiry.
pub async fn require_session(global: &GlobalArgs) -> Result<AuthSession, CliError> {
    let service = FirebaseAuthService::connect(&global.api_url, global.auth_url.as_deref()).await?;
    service.restore_session().await?.ok_or(CliError::NotSignedIn)
}

pub fn resolve_data_dir(cli_data_dir: Option<PathBuf>) -> Result<PathBuf, CliError> {
    cli_data_dir
        .or_else(|| dirs::data_dir().map(|dir| dir.join("vcnotebook")))
        .ok_or_else(|| {
            CliError::Config("Could not resolve a data directory; pass --data-dir".to_string())
        })
}

/// Open the notebook for this invocation and load its notes.
pub async fn open_notebook(global: &GlobalArgs) -> Result<Notebook, CliError> {
    let identity = resolve_identity(global).await?;
    let data_dir = resolve_data_dir(global.data_dir.clone())?;
    std::fs::create_dir_all(&data_dir)?;
    let local = LocalNoteStore::open(data_dir.join(LOCAL_DB_FILE))?;

    let builder = NotebookBuilder::new(identity.user_id, local);
    let mut notebook = if let Some(reason) = identity.offline_reason {
        builder.offline(reason)
    } else {
        match ServerConfigClient::new(&global.api_url) {
            Ok(config) => {
                builder
                    .access_token(identity.session.map(|session| session.id_token))
                    .connect_via(&config)
                    .await
            }
            Err(error) => builder.offline(&error.to_string()),
        }
    };

    let report = notebook.load().await?;
    if let Some(reason) = &report.fallback_reason {
        eprintln!("Warning: showing local notes ({reason})");
    }
    tracing::debug!(mode = %notebook.mode(), count = report.count, "Notes loaded");
    Ok(notebook)
}

/// Find a note by full id or unique id prefix.
pub fn resolve_note(query: &str, notes: &[Note]) -> Result<Note, CliError> {
    let query = normalize_note_identifier(query)?;
    if let Some(note) = notes.iter().find(|note| note.id.as_str() == query) {
        return Ok(note.clone());
    }

    let matching = notes
        .iter()
        .filter(|note| note.id.as_str().starts_with(&query))
        .collect::<Vec<_>>();

    match matching.as_slice() {
        [] => Err(CliError::NoteNotFound(query)),
        [note] => Ok((*note).clone()),
        many => {
            let options = many
                .iter()
                .take(3)
                .map(|note| short_id(note.id.as_str()))
                .collect::<Vec<_>>()
                .join(", ");
            Err(CliError::AmbiguousNoteId(format!(
                "ID prefix '{query}' is ambiguous; matches: {options}"
            )))
        }
    }
}

pub fn short_id(id: &str) -> String {
    id.chars().take(SHORT_ID_CHARS).collect()
}

fn single_line(text: &str, max_chars: usize) -> String {
    snippet(&text.split_whitespace().collect::<Vec<_>>().join(" "), max_chars)
}

pub fn format_note_lines(notes: &[Note], now: DateTime<Utc>) -> Vec<String> {
    notes
        .iter()
        .map(|note| {
            let id = short_id(note.id.as_str());
            let title = single_line(&note.title, 21);
            let preview = single_line(&note.content, 37);
            let relative_time = relative_day(note.updated_at, now);
            format!("{id:<13}  {title:<24}  {preview:<40}  {relative_time}")
        })
        .collect()
}

pub fn note_to_list_item(note: &Note, now: DateTime<Utc>) -> NoteListItem {
    NoteListItem {
        id: note.id.to_string(),
        title: note.title.clone(),
        preview: note.preview(),
        content: note.content.clone(),
        created_at: note.created_at,
        updated_at: note.updated_at,
        relative_time: relative_day(note.updated_at, now),
    }
}

pub fn print_notes(notes: &[Note], as_json: bool) -> Result<(), CliError> {
    let now = Utc::now();
    if as_json {
        let items = notes
            .iter()
            .map(|note| note_to_list_item(note, now))
            .collect::<Vec<_>>();
        println!("{}", serde_json::to_string_pretty(&items)?);
    } else {
        for line in format_note_lines(notes, now) {
            println!("{line}");
        }
    }
    Ok(())
}

pub fn format_attachment_line(attachment: &Attachment) -> String {
    format!(
        "{}  {:<32}  {:>9}  {}",
        attachment.id,
        single_line(&attachment.file_name, 29),
        attachment.formatted_size(),
        attachment.file_type
    )
}

pub fn attachment_to_list_item(attachment: &Attachment) -> AttachmentListItem {
    AttachmentListItem {
        id: attachment.id.to_string(),
        file_name: attachment.file_name.clone(),
        file_size: attachment.file_size,
        file_type: attachment.file_type.clone(),
        size: attachment.formatted_size(),
        storage_path: attachment.storage_path.clone(),
    }
}

/// Attachments are hosted-only; say so before doing any work.
pub fn ensure_hosted(notebook: &Notebook, reason: &str) -> Result<(), CliError> {
    if notebook.mode().is_hosted() {
        Ok(())
    } else {
        Err(CliError::AttachmentsOffline(reason.to_string()))
    }
}

/// Ask a yes/no question; anything but `y`/`yes` declines.
pub fn confirm(
    prompt: &str,
    input: &mut impl BufRead,
    output: &mut impl Write,
) -> Result<bool, CliError> {
    write!(output, "{prompt} [y/N] ")?;
    output.flush()?;
    let mut answer = String::new();
    input.read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
}

pub fn resolve_note_content(content_parts: &[String]) -> Result<String, CliError> {
    if let Some(content) = normalize_content(&content_parts.join(" ")) {
        return Ok(content);
    }

    if let Some(content) = read_piped_stdin()? {
        return Ok(content);
    }

    if let Some(content) = capture_editor_input_with_initial("")? {
        return Ok(content);
    }

    Err(CliError::EmptyContent)
}

pub fn normalize_content(content: &str) -> Option<String> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

pub fn normalize_search_query(query: &str) -> Result<String, CliError> {
    normalize_content(query).ok_or(CliError::EmptySearchQuery)
}

pub fn normalize_note_identifier(id: &str) -> Result<String, CliError> {
    normalize_content(id).ok_or(CliError::EmptyNoteId)
}

pub fn read_piped_stdin() -> Result<Option<String>, CliError> {
    let stdin = io::stdin();
    if stdin.is_terminal() {
        return Ok(None);
    }

    let mut buffer = String::new();
    stdin.lock().read_to_string(&mut buffer)?;
    Ok(normalize_content(&buffer))
}

pub fn capture_editor_input_with_initial(
    initial_content: &str,
) -> Result<Option<String>, CliError> {
    let editor = preferred_editor();
    let temp_file = create_temp_note_file_path();
    std::fs::write(&temp_file, initial_content)?;

    let launch_result = launch_editor(&editor, &temp_file);
    let note_content = std::fs::read_to_string(&temp_file)?;
    let _ = std::fs::remove_file(&temp_file);

    launch_result?;
    Ok(normalize_content(&note_content))
}

pub fn launch_editor(editor: &str, file_path: &Path) -> Result<(), CliError> {
    let status = match Command::new(editor).arg(file_path).status() {
        Ok(status) => status,
        // EDITOR may carry arguments, e.g. "code --wait".
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            let mut parts = editor.split_whitespace();
            let Some(program) = parts.next() else {
                return Err(CliError::EditorFailed("empty EDITOR command".into()));
            };
            Command::new(program).args(parts).arg(file_path).status()?
        }
        Err(err) => return Err(CliError::Io(err)),
    };

    if status.success() {
        Ok(())
    } else {
        Err(CliError::EditorFailed(format!(
            "`{editor}` exited with status {status}"
        )))
    }
}

pub fn preferred_editor() -> String {
    env::var("VISUAL")
        .or_else(|_| env::var("EDITOR"))
        .unwrap_or_else(|_| default_editor().to_string())
}

pub const fn default_editor() -> &'static str {
    if cfg!(windows) {
        "notepad"
    } else {
        "vi"
    }
}

pub fn create_temp_note_file_path() -> PathBuf {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |duration| duration.as_nanos());
    env::temp_dir().join(format!("vcnotebook-note-{}-{now}.md", std::process::id()))
}
