//! VCNotebook CLI - notes, attachments and the premium tier from the terminal.

mod auth;
mod cli;
mod commands;
mod error;


use std::process::ExitCode;

use clap::Parser;

use crate::cli::{Cli, Commands, NotesCommands};
use crate::commands::add::run_add;
use crate::commands::attach::run_attach;
use crate::commands::auth_cmd::run_auth;
use crate::commands::delete::run_delete;
use crate::commands::edit::run_edit;
use crate::commands::list::run_list;
use crate::commands::premium::run_premium;
use crate::commands::search::run_search;
use crate::commands::verify_env::run_verify_env;
use crate::error::CliError;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => code,
        Err(error) => {
            eprintln!("Error: {error}");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<ExitCode, CliError> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(
                "vcnotebook=info"
                    .parse()
                    .map_err(|error| CliError::Config(format!("{error}")))?,
            ),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let global = &cli.global;

    match cli.command {
        Commands::VerifyEnv => {
            return Ok(if run_verify_env() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            });
        }
        Commands::Auth { command } => run_auth(command, global).await?,
        Commands::Notes { command } => match command {
            NotesCommands::List { limit, json } => run_list(limit, json, global).await?,
            NotesCommands::Search { query, limit, json } => {
                run_search(&query, limit, json, global).await?;
            }
            NotesCommands::Add {
                title,
                attach,
                content,
            } => run_add(title.as_deref(), &content, &attach, global).await?,
            NotesCommands::Edit { id, title, content } => {
                run_edit(&id, title.as_deref(), content.as_deref(), global).await?;
            }
            NotesCommands::Delete { id, yes } => run_delete(&id, yes, global).await?,
        },
        Commands::Attach { command } => run_attach(command, global).await?,
        Commands::Premium { command } => run_premium(command, global).await?,
    }

    Ok(ExitCode::SUCCESS)
}
