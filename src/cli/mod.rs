//! Command handlers and their console plumbing.
//!
//! Each verb lives in its own module and follows the same shape: query the
//! server, build a `Table`, then print it and/or write it to the output file.

pub mod args;
pub mod jobs;
pub mod license;
pub mod logs;
pub mod nodes;
pub mod stats;

use anyhow::{Context, Result};
use async_trait::async_trait;
use dialoguer::{Password, theme::ColorfulTheme};
use tracing::warn;

use crate::api::{ApiError, DpxClient, Reauthenticate, Session};
use crate::report::{Table, write_table_to_file};
use args::OutputArgs;

/// Ask for a password on the terminal.
pub async fn prompt_password(prompt: String) -> Result<String> {
    tokio::task::spawn_blocking(move || {
        Password::with_theme(&ColorfulTheme::default())
            .with_prompt(prompt)
            .allow_empty_password(true)
            .interact()
    })
    .await
    .context("Password prompt panicked")?
    .context("Failed to read password")
}

/// Re-authenticates by asking the user for their password again.
pub struct PromptReauth;

#[async_trait]
impl Reauthenticate for PromptReauth {
    async fn reauthenticate(
        &self,
        client: &DpxClient,
        expired: &Session,
        _error: &ApiError,
    ) -> Option<Session> {
        let prompt = format!("Re-enter password for {}@{}", expired.user(), client.host());
        let password = match prompt_password(prompt).await {
            Ok(password) => password,
            Err(e) => {
                warn!(error = %e, "Could not prompt for password");
                return None;
            }
        };

        match client.login(expired.user(), &password).await {
            Ok(Some(session)) => {
                println!("Login ok");
                Some(session)
            }
            Ok(None) => {
                println!(
                    "Failed to log in as {}! Is the password correct?",
                    expired.user()
                );
                None
            }
            Err(e) => {
                warn!(error = %e, "Login request failed");
                None
            }
        }
    }
}

/// Write `table` to the output file, if one was given.
///
/// A bad destination is reported but does not fail the command.
pub async fn write_output(table: &Table, output: &OutputArgs) {
    let Some(path) = &output.output else {
        return;
    };

    match write_table_to_file(table, path).await {
        Ok(written) => println!("Wrote report to {}", written.display()),
        Err(e) => println!("Could not write report: {e}"),
    }
}

/// Print `table` unless console output is disabled, then write the output file.
pub async fn emit_table(table: &Table, output: &OutputArgs) {
    if !output.no_console {
        print!("{}", table.render_console());
    }
    write_output(table, output).await;
}
