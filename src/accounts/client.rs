//! HTTP client for a remote account backend.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, error, instrument};

use super::backend::{
    Account, AccountBackend, AccountError, Credentials, LeaderboardEntry, MatchReport, MatchSaved,
};

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

/// [`AccountBackend`] speaking JSON to the account HTTP API.
#[derive(Debug, Clone)]
pub struct HttpAccountClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpAccountClient {
    /// Creates a client for the API rooted at `base_url`.
    #[instrument(skip(base_url))]
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        debug!(%base_url, "Creating account client");
        Self {
            client: reqwest::Client::new(),
            base_url,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn read<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, AccountError> {
        let status = response.status();
        if status.is_success() {
            return response.json::<T>().await.map_err(unavailable);
        }

        let text = response.text().await.map_err(unavailable)?;
        let message = serde_json::from_str::<ErrorBody>(&text)
            .map(|body| body.message)
            .unwrap_or(text);
        error!(%status, %message, "Account API error");
        Err(match status {
            StatusCode::CONFLICT => AccountError::UsernameTaken,
            StatusCode::UNAUTHORIZED => AccountError::InvalidCredentials,
            StatusCode::BAD_REQUEST => AccountError::InvalidRequest { reason: message },
            _ => AccountError::Unavailable {
                reason: format!("{}: {}", status, message),
            },
        })
    }
}

fn unavailable(err: reqwest::Error) -> AccountError {
    AccountError::Unavailable {
        reason: err.to_string(),
    }
}

#[async_trait]
impl AccountBackend for HttpAccountClient {
    #[instrument(skip(self, credentials), fields(username = %credentials.username()))]
    async fn register(&self, credentials: Credentials) -> Result<Account, AccountError> {
        let response = self
            .client
            .post(self.url("/api/auth/register"))
            .json(&credentials)
            .send()
            .await
            .map_err(unavailable)?;
        Self::read(response).await
    }

    #[instrument(skip(self, credentials), fields(username = %credentials.username()))]
    async fn login(&self, credentials: Credentials) -> Result<Account, AccountError> {
        let response = self
            .client
            .post(self.url("/api/auth/login"))
            .json(&credentials)
            .send()
            .await
            .map_err(unavailable)?;
        Self::read(response).await
    }

    #[instrument(skip(self))]
    async fn save_match(&self, report: MatchReport) -> Result<MatchSaved, AccountError> {
        let response = self
            .client
            .post(self.url("/api/matches"))
            .json(&report)
            .send()
            .await
            .map_err(unavailable)?;
        Self::read(response).await
    }

    #[instrument(skip(self))]
    async fn leaderboard(&self) -> Result<Vec<LeaderboardEntry>, AccountError> {
        let response = self
            .client
            .get(self.url("/api/leaderboard"))
            .send()
            .await
            .map_err(unavailable)?;
        Self::read(response).await
    }
}
