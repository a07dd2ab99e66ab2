use vcnotebook_core::premium::PremiumClient;

use crate::cli::{GlobalArgs, PremiumCommands};
use crate::commands::common::require_session;
use crate::error::CliError;

pub async fn run_premium(command: PremiumCommands, global: &GlobalArgs) -> Result<(), CliError> {
    let session = require_session(global).await?;
    let client = PremiumClient::new(&global.api_url)?.with_access_token(session.id_token.clone());

    match command {
        PremiumCommands::Status => {
            let status = client.subscription_status(&session.user.id).await?;
            let updated = status
                .updated_at
                .map_or_else(|| "never".to_string(), |at| at.format("%Y-%m-%d %H:%M UTC").to_string());
            println!(
                "{} (status={}, updated={updated})",
                status.badge(),
                status.subscription_status
            );
            Ok(())
        }
        PremiumCommands::Upgrade => {
            let email = session
                .user
                .email
                .as_deref()
                .ok_or_else(|| CliError::Auth("the signed-in account has no email".to_string()))?;
            let checkout_url = client.create_checkout(email, &session.user.id).await?;
            eprintln!("Open this page to finish the upgrade:");
            println!("{checkout_url}");
            Ok(())
        }
    }
}
