//! Connecting and first-run sign-in.

use anyhow::anyhow;
use grammers_client::{Client, Config as ClientConfig, InitParams, SignInError};
use grammers_session::Session;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::info;

use telebackup_core::{config::Config, errors::Error, Result};

use crate::{map_err, MtprotoClient};

/// Connect with the configured credentials, signing in interactively when the
/// stored session is not authorised yet.
pub async fn connect(cfg: &Config) -> Result<MtprotoClient> {
    let session_path = cfg.session_path();
    let session = Session::load_file_or_create(&session_path)?;

    let client = Client::connect(ClientConfig {
        session,
        api_id: cfg.api_id,
        api_hash: cfg.api_hash.clone(),
        params: InitParams {
            // Flood waits are surfaced to the copier instead of slept through here.
            flood_sleep_threshold: 0,
            ..Default::default()
        },
    })
    .await
    .map_err(|e| Error::External(format!("failed to connect: {e}")))?;

    let client = MtprotoClient::new(client, session_path);

    if !client.client().is_authorized().await.map_err(map_err)? {
        info!("session '{}' is not signed in", cfg.session_name);
        sign_in(client.client())
            .await
            .map_err(|e| Error::External(format!("sign-in failed: {e:#}")))?;
        client.save_session()?;
        info!("signed in; session saved");
    }

    Ok(client)
}

async fn sign_in(client: &Client) -> anyhow::Result<()> {
    let phone = prompt("Phone number (international format): ").await?;
    let token = client
        .request_login_code(&phone)
        .await
        .map_err(|e| anyhow!("requesting login code: {e}"))?;

    let code = prompt("Login code: ").await?;
    match client.sign_in(&token, &code).await {
        Ok(_) => Ok(()),
        Err(SignInError::PasswordRequired(password_token)) => {
            let hint = password_token.hint().unwrap_or("none").to_string();
            let password = prompt(&format!("Two-step verification password (hint: {hint}): ")).await?;
            client
                .check_password(password_token, password.as_bytes())
                .await
                .map_err(|e| anyhow!("checking password: {e}"))?;
            Ok(())
        }
        Err(e) => Err(anyhow!("signing in: {e}")),
    }
}

async fn prompt(message: &str) -> anyhow::Result<String> {
    let mut stdout = tokio::io::stdout();
    stdout.write_all(message.as_bytes()).await?;
    stdout.flush().await?;

    let mut line = String::new();
    BufReader::new(tokio::io::stdin())
        .read_line(&mut line)
        .await?;
    let line = line.trim().to_string();
    if line.is_empty() {
        return Err(anyhow!("no input"));
    }
    Ok(line)
}
