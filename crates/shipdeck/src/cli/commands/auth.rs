use anyhow::Result;
use dialoguer::{theme::ColorfulTheme, Password};
use shipdeck_common::{AuthState, ShipdeckError};
use tracing::warn;

use crate::api_client::session::SessionStore;
use crate::api_client::ApiClient;
use crate::tui::{spinner, spinner_error, spinner_success, Styles};

/// Current login state as the server sees it
pub async fn auth_state(client: &ApiClient) -> Result<AuthState> {
    Ok(client.check_session().await?.into())
}

/// Username of the logged-in user, or an error telling them to log in
pub async fn require_login(client: &ApiClient) -> Result<String> {
    match auth_state(client).await? {
        AuthState::Authenticated { username } => Ok(username),
        AuthState::Anonymous => Err(ShipdeckError::NotAuthenticated.into()),
    }
}

pub async fn login(token: Option<String>, client: &ApiClient, store: &SessionStore) -> Result<()> {
    let token = match token.filter(|t| !t.trim().is_empty()) {
        Some(token) => token,
        None => Password::with_theme(&ColorfulTheme::default())
            .with_prompt("GitHub personal access token")
            .interact()?,
    };

    let pb = spinner("Logging in...");
    let response = match client.login(token.trim()).await {
        Ok(response) => response,
        Err(e) => {
            spinner_error(&pb, "Login failed");
            return Err(e);
        }
    };
    spinner_success(&pb, &format!("Logged in as {}", response.username));

    match client.session_cookie() {
        Some(cookie) => store.save(&cookie)?,
        None => Styles::warning("Server did not set a session cookie; you will need to log in again"),
    }

    Ok(())
}

pub async fn logout(client: &ApiClient, store: &SessionStore) -> Result<()> {
    if let Err(e) = client.logout().await {
        warn!("Server logout failed: {:#}", e);
    }
    store.clear()?;
    Styles::success("Logged out");
    Ok(())
}

pub async fn whoami(client: &ApiClient) -> Result<()> {
    match auth_state(client).await? {
        AuthState::Authenticated { username } => {
            Styles::success(&format!("Logged in to GitHub as {}", username));
        }
        AuthState::Anonymous => {
            Styles::info("Not logged in. Run 'shipdeck login' to connect GitHub.");
        }
    }
    Ok(())
}
