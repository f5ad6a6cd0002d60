// ABOUTME: Matrix client initialization and authentication
// ABOUTME: Builds the client on a persistent sqlite store and logs in via token or password

use anyhow::{Context, Result};
use matrix_sdk::{
    authentication::{matrix::MatrixSession, SessionTokens},
    ruma::OwnedUserId,
    Client, SessionMeta,
};
use nixbot_core::config::{MatrixConfig, StateConfig};

pub async fn create_client(matrix: &MatrixConfig, state: &StateConfig) -> Result<Client> {
    let store_dir = state.matrix_store_dir();
    std::fs::create_dir_all(&store_dir)
        .with_context(|| format!("Failed to create store directory {}", store_dir.display()))?;

    let client = Client::builder()
        .homeserver_url(&matrix.home_server)
        .sqlite_store(&store_dir, matrix.store_passphrase.as_deref())
        .build()
        .await
        .context("Failed to create Matrix client")?;

    tracing::info!(store = %store_dir.display(), "Matrix client created successfully");

    Ok(client)
}

pub async fn login(client: &Client, matrix: &MatrixConfig) -> Result<()> {
    if let Some(token) = matrix.access_token.as_deref() {
        tracing::info!("Logging in with access token");
        let user_id: OwnedUserId = matrix.user_id.parse().context("Invalid MATRIX_USER_ID")?;
        let session = MatrixSession {
            meta: SessionMeta {
                user_id,
                device_id: matrix.device_name.as_str().into(),
            },
            tokens: SessionTokens {
                access_token: token.to_string(),
                refresh_token: None,
            },
        };
        client
            .restore_session(session)
            .await
            .context("Failed to restore session")?;
    } else if let Some(password) = matrix.password.as_deref() {
        tracing::info!("Logging in with password");
        client
            .matrix_auth()
            .login_username(&matrix.user_id, password)
            .initial_device_display_name(&matrix.device_name)
            .send()
            .await
            .context("Failed to log in")?;
    } else {
        anyhow::bail!("Either MATRIX_PASSWORD or MATRIX_ACCESS_TOKEN is required");
    }

    let user_id = client
        .user_id()
        .context("Login finished without a user ID")?;
    tracing::info!(user_id = %user_id, "Logged in successfully");

    Ok(())
}
