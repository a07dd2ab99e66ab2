use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use vcnotebook_core::config::DEFAULT_API_URL;

#[derive(Parser)]
#[command(name = "vcnotebook")]
#[command(about = "Notes with attachments from the command line")]
#[command(version)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Base URL of the VCNotebook API proxy
    #[arg(long, global = true, env = "VCNOTEBOOK_API_URL", default_value = DEFAULT_API_URL)]
    pub api_url: String,

    /// Directory holding the local note store
    #[arg(long, global = true, env = "VCNOTEBOOK_DATA_DIR", value_name = "PATH")]
    pub data_dir: Option<PathBuf>,

    /// Use this identity against the local store only
    #[arg(long, global = true, value_name = "ID")]
    pub user_id: Option<String>,

    /// Skip the hosted backend and work from the local store
    #[arg(long, global = true)]
    pub offline: bool,

    /// Identity provider REST host (emulator or tests)
    #[arg(long, global = true, env = "VCNOTEBOOK_AUTH_URL", hide = true)]
    pub auth_url: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Check the proxy environment variables
    VerifyEnv,
    /// Sign in, inspect or forget the stored session
    Auth {
        #[command(subcommand)]
        command: AuthCommands,
    },
    /// Create, browse and edit notes
    Notes {
        #[command(subcommand)]
        command: NotesCommands,
    },
    /// Manage files attached to a note
    Attach {
        #[command(subcommand)]
        command: AttachCommands,
    },
    /// Subscription status and upgrade checkout
    Premium {
        #[command(subcommand)]
        command: PremiumCommands,
    },
}

#[derive(Subcommand)]
pub enum AuthCommands {
    /// Sign in with email/password and store the session in the keychain
    Login {
        /// Account email
        #[arg(long, value_name = "EMAIL")]
        email: String,
        /// Account password
        #[arg(long, value_name = "PASSWORD", env = "VCNOTEBOOK_PASSWORD", hide_env_values = true)]
        password: String,
        /// Create the account instead of signing in
        #[arg(long)]
        sign_up: bool,
    },
    /// Show the signed-in account
    Status,
    /// Forget the stored session
    Logout,
}

#[derive(Subcommand)]
pub enum NotesCommands {
    /// List notes, newest first
    List {
        /// Number of notes to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Search titles and content
    Search {
        /// Search query
        query: String,
        /// Number of notes to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Create a new note
    #[command(alias = "new")]
    Add {
        /// Note title
        #[arg(short, long)]
        title: Option<String>,
        /// Files to attach once the note is saved
        #[arg(long = "attach", value_name = "FILE", num_args = 1..)]
        attach: Vec<PathBuf>,
        /// Note content (stdin or $EDITOR when omitted without a title)
        content: Vec<String>,
    },
    /// Edit an existing note
    Edit {
        /// Note ID or unique ID prefix
        id: String,
        /// Replace the title
        #[arg(short, long)]
        title: Option<String>,
        /// Replace the content instead of opening $EDITOR
        #[arg(short, long)]
        content: Option<String>,
    },
    /// Delete a note and its attachments
    Delete {
        /// Note ID or unique ID prefix
        id: String,
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
}

#[derive(Subcommand)]
pub enum AttachCommands {
    /// Upload files to a note
    Upload {
        /// Note ID or unique ID prefix
        note: String,
        /// Files to upload
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// List a note's attachments
    List {
        /// Note ID or unique ID prefix
        note: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete an attachment
    Delete {
        /// Note ID or unique ID prefix
        note: String,
        /// Attachment ID
        attachment: String,
    },
    /// Print a time-limited preview URL
    Url {
        /// Note ID or unique ID prefix
        note: String,
        /// Attachment ID
        attachment: String,
    },
}

#[derive(Subcommand)]
pub enum PremiumCommands {
    /// Show the current subscription
    Status,
    /// Start a checkout and print its URL
    Upgrade,
}
