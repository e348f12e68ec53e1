// src/services/auth.rs
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;

use crate::config::AuthConfig;
use crate::error::PipelineError;
use crate::services::TokenProvider;

/// Tokens are refreshed this long before their reported expiry.
const EXPIRY_BUFFER_MINUTES: i64 = 5;

struct TokenState {
    token: Option<String>,
    expires_at: Option<DateTime<Utc>>,
}

/// Bearer-token client for the Copernicus identity service.
///
/// Process-scoped state passed explicitly into the components that need it;
/// created at run start, dropped at run end.
pub struct CopernicusAuth {
    token_url: String,
    client_id: String,
    client_secret: String,
    username: String,
    password: String,
    http: reqwest::blocking::Client,
    state: Mutex<TokenState>,
}

impl CopernicusAuth {
    pub fn new(token_url: &str, auth: &AuthConfig) -> Result<Self, PipelineError> {
        let http = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| PipelineError::Config(format!("http client: {e}")))?;
        Ok(Self {
            token_url: token_url.to_string(),
            client_id: auth.client_id.clone(),
            client_secret: auth.client_secret.clone(),
            username: auth.username.clone(),
            password: auth.password.clone(),
            http,
            state: Mutex::new(TokenState {
                token: None,
                expires_at: None,
            }),
        })
    }

    fn refresh(&self) -> Result<String, PipelineError> {
        tracing::info!("refreshing Copernicus access token");
        let mut form = vec![
            ("grant_type", "password"),
            ("username", self.username.as_str()),
            ("password", self.password.as_str()),
            ("client_id", self.client_id.as_str()),
        ];
        if !self.client_secret.is_empty() {
            form.push(("client_secret", self.client_secret.as_str()));
        }

        let response = self
            .http
            .post(&self.token_url)
            .form(&form)
            .send()
            .map_err(|e| PipelineError::Auth(format!("token request failed: {e}")))?;
        if !response.status().is_success() {
            return Err(PipelineError::Auth(format!(
                "token endpoint returned {}",
                response.status()
            )));
        }
        let body: serde_json::Value = response
            .json()
            .map_err(|e| PipelineError::Auth(format!("token response unparseable: {e}")))?;
        let token = body
            .get("access_token")
            .and_then(|v| v.as_str())
            .ok_or_else(|| PipelineError::Auth("token response missing access_token".to_string()))?
            .to_string();
        let expires_in = body.get("expires_in").and_then(|v| v.as_i64()).unwrap_or(3600);

        let mut state = self.state.lock();
        state.token = Some(token.clone());
        state.expires_at = Some(Utc::now() + Duration::seconds(expires_in));
        tracing::debug!("token refreshed, expires in {expires_in}s");
        Ok(token)
    }
}

impl TokenProvider for CopernicusAuth {
    fn bearer_token(&self) -> Result<String, PipelineError> {
        {
            let state = self.state.lock();
            if let (Some(token), Some(expires_at)) = (&state.token, state.expires_at) {
                if Utc::now() < expires_at - Duration::minutes(EXPIRY_BUFFER_MINUTES) {
                    return Ok(token.clone());
                }
            }
        }
        self.refresh()
    }
}
