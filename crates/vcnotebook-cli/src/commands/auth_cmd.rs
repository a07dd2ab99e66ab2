use crate::auth::{clear_stored_session, FirebaseAuthService};
use crate::cli::{AuthCommands, GlobalArgs};
use crate::error::CliError;

pub async fn run_auth(command: AuthCommands, global: &GlobalArgs) -> Result<(), CliError> {
    match command {
        AuthCommands::Login {
            email,
            password,
            sign_up,
        } => {
            let service =
                FirebaseAuthService::connect(&global.api_url, global.auth_url.as_deref()).await?;
            let session = if sign_up {
                service.sign_up(&email, &password).await?
            } else {
                service.sign_in(&email, &password).await?
            };

            tracing::info!(user = %session.user.id, "Signed in");
            let email_label = session.user.email.as_deref().unwrap_or(email.as_str());
            println!("Signed in as {email_label}");
            Ok(())
        }
        AuthCommands::Status => {
            let service =
                FirebaseAuthService::connect(&global.api_url, global.auth_url.as_deref()).await?;
            if let Some(session) = service.restore_session().await? {
                let email_label = session.user.email.as_deref().unwrap_or("(no email)");
                println!(
                    "Signed in as {} (uid={}, expires_at={})",
                    email_label, session.user.id, session.expires_at
                );
            } else {
                println!("Not signed in.");
            }
            Ok(())
        }
        AuthCommands::Logout => {
            clear_stored_session(&global.api_url)?;
            println!("Signed out");
            Ok(())
        }
    }
}
