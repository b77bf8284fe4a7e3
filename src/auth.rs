use anyhow::{anyhow, Context, Result};
use reqwest::blocking::Client;
use serde::Deserialize;
use serde_json::json;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tracing::{info, warn};

use crate::config::AppConfig;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct User {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Session {
    pub access_token: String,
    pub user: User,
}

/// Signed-in session shared with the record store, which attaches its
/// access token to every request.
pub type SessionHandle = Arc<RwLock<Option<Session>>>;

#[derive(Deserialize)]
struct AuthErrorBody {
    #[serde(default)]
    error_description: Option<String>,
    #[serde(default)]
    msg: Option<String>,
}

/// Password sign-in against the hosted identity provider.
pub struct AuthClient {
    client: Client,
    auth_url: String,
    anon_key: String,
    session: SessionHandle,
    error: Option<String>,
}

impl AuthClient {
    pub fn new(config: &AppConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            auth_url: format!("{}/auth/v1", config.supabase_url.trim_end_matches('/')),
            anon_key: config.supabase_anon_key.clone(),
            session: Arc::new(RwLock::new(None)),
            error: None,
        })
    }

    pub fn session_handle(&self) -> SessionHandle {
        self.session.clone()
    }

    pub fn current_user(&self) -> Option<User> {
        self.session
            .read()
            .ok()
            .and_then(|guard| guard.as_ref().map(|s| s.user.clone()))
    }

    pub fn is_signed_in(&self) -> bool {
        self.current_user().is_some()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn clear_error(&mut self) {
        self.error = None;
    }

    /// Requests a session for the given credentials. Blocks on the network,
    /// so the UI runs it on a worker thread and hands the result to
    /// [`AuthClient::finish_login`].
    pub fn request_session(client: &Client, auth_url: &str, anon_key: &str, email: &str, password: &str) -> Result<Session> {
        let response = client
            .post(format!("{}/token", auth_url))
            .query(&[("grant_type", "password")])
            .header("apikey", anon_key)
            .json(&json!({ "email": email, "password": password }))
            .send()?;

        let status = response.status();
        if status.is_success() {
            return Ok(response.json::<Session>()?);
        }

        let reason = response
            .json::<AuthErrorBody>()
            .ok()
            .and_then(|body| body.error_description.or(body.msg))
            .unwrap_or_else(|| format!("sign-in failed ({})", status));
        Err(anyhow!(reason))
    }

    /// Everything a worker thread needs to call [`AuthClient::request_session`].
    pub fn login_request(&self, email: &str, password: &str) -> LoginRequest {
        LoginRequest {
            client: self.client.clone(),
            auth_url: self.auth_url.clone(),
            anon_key: self.anon_key.clone(),
            email: email.trim().to_string(),
            password: password.to_string(),
        }
    }

    pub fn finish_login(&mut self, result: Result<Session>) -> bool {
        match result {
            Ok(session) => {
                info!(user = %session.user.id, "signed in");
                if let Ok(mut guard) = self.session.write() {
                    *guard = Some(session);
                }
                self.error = None;
                true
            }
            Err(e) => {
                warn!(error = %e, "sign-in failed");
                self.error = Some(format!("Login failed: {}", e));
                false
            }
        }
    }

    pub fn logout(&mut self) {
        if let Ok(mut guard) = self.session.write() {
            *guard = None;
        }
        info!("signed out");
    }
}

pub struct LoginRequest {
    client: Client,
    auth_url: String,
    anon_key: String,
    email: String,
    password: String,
}

impl LoginRequest {
    pub fn send(self) -> Result<Session> {
        AuthClient::request_session(&self.client, &self.auth_url, &self.anon_key, &self.email, &self.password)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> AppConfig {
        AppConfig {
            supabase_url: "https://project.example/".to_string(),
            supabase_anon_key: "anon".to_string(),
            admin_enabled: true,
            cache_path: None,
            site_url: None,
            request_timeout_secs: 5,
        }
    }

    #[test]
    fn finish_login_sets_and_clears_session() {
        let mut auth = AuthClient::new(&test_config()).unwrap();
        assert!(!auth.is_signed_in());

        let shared = auth.session_handle();
        let ok = auth.finish_login(Ok(Session {
            access_token: "tok".to_string(),
            user: User {
                id: "u1".to_string(),
                email: Some("me@example.com".to_string()),
            },
        }));
        assert!(ok);
        assert_eq!(auth.current_user().map(|u| u.id), Some("u1".to_string()));
        assert_eq!(shared.read().unwrap().as_ref().map(|s| s.access_token.clone()), Some("tok".to_string()));

        auth.logout();
        assert!(!auth.is_signed_in());
    }

    #[test]
    fn failed_login_keeps_error_until_cleared() {
        let mut auth = AuthClient::new(&test_config()).unwrap();
        assert!(!auth.finish_login(Err(anyhow!("Invalid login credentials"))));
        assert_eq!(auth.error(), Some("Login failed: Invalid login credentials"));

        auth.clear_error();
        assert_eq!(auth.error(), None);
    }

    #[test]
    fn auth_url_is_normalized() {
        let auth = AuthClient::new(&test_config()).unwrap();
        assert_eq!(auth.auth_url, "https://project.example/auth/v1");
    }
}
