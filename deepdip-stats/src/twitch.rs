use chrono::{DateTime, Utc};
use deepdip_core::{VideoError, VideoLookup, VideoRecord, locate_video};
use log::{debug, info, warn};
use reqwest::StatusCode;
use reqwest::blocking::{Client, RequestBuilder, Response};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

const TOKEN_URL: &str = "https://id.twitch.tv/oauth2/token";
const HELIX_USERS_URL: &str = "https://api.twitch.tv/helix/users";
const HELIX_VIDEOS_URL: &str = "https://api.twitch.tv/helix/videos";

#[derive(Debug, Error)]
pub enum TwitchError {
    #[error("CLIENT_ID and CLIENT_SECRET must be set to look up stream recordings")]
    MissingCredentials,
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
    #[error("{context} failed: {source}")]
    Request {
        context: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("{context} answered {status}")]
    Status {
        context: &'static str,
        status: StatusCode,
    },
    #[error("token file {path}: {source}")]
    TokenIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("token file {path}: {source}")]
    TokenFormat {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("unknown streamer {0}")]
    UnknownStreamer(String),
    #[error(transparent)]
    Video(#[from] VideoError),
}

/// Application credentials for the client credentials grant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TwitchCredentials {
    pub client_id: String,
    pub client_secret: String,
}

impl TwitchCredentials {
    /// Read `CLIENT_ID` and `CLIENT_SECRET` from the environment.
    pub fn from_env() -> Result<Self, TwitchError> {
        Self::from_values(
            std::env::var("CLIENT_ID").ok(),
            std::env::var("CLIENT_SECRET").ok(),
        )
    }

    fn from_values(
        client_id: Option<String>,
        client_secret: Option<String>,
    ) -> Result<Self, TwitchError> {
        match (client_id, client_secret) {
            (Some(client_id), Some(client_secret))
                if !client_id.is_empty() && !client_secret.is_empty() =>
            {
                Ok(Self {
                    client_id,
                    client_secret,
                })
            }
            _ => Err(TwitchError::MissingCredentials),
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct HelixPage<T> {
    data: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct HelixUser {
    id: String,
}

/// Read a previously saved access token. An absent or empty file means no
/// token has been issued yet.
fn read_cached_token(path: &Path) -> Result<Option<String>, TwitchError> {
    if !path.is_file() {
        return Ok(None);
    }
    let text = fs::read_to_string(path).map_err(|source| TwitchError::TokenIo {
        path: path.to_path_buf(),
        source,
    })?;
    if text.trim().is_empty() {
        return Ok(None);
    }
    let token: TokenResponse =
        serde_json::from_str(&text).map_err(|source| TwitchError::TokenFormat {
            path: path.to_path_buf(),
            source,
        })?;
    Ok(Some(token.access_token))
}

/// Video platform client that resolves on-stream timestamps.
///
/// Video lists are fetched once per streamer and kept for the lifetime of
/// the client.
pub struct TwitchClient {
    http: Client,
    credentials: TwitchCredentials,
    token_path: PathBuf,
    token: String,
    videos: HashMap<String, Vec<VideoRecord>>,
}

impl TwitchClient {
    /// Build a client, reusing the token saved at `token_path` or requesting
    /// a fresh one.
    pub fn connect(
        credentials: TwitchCredentials,
        token_path: impl Into<PathBuf>,
        timeout: Duration,
    ) -> Result<Self, TwitchError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(TwitchError::Client)?;
        let token_path = token_path.into();
        let mut client = Self {
            http,
            credentials,
            token: read_cached_token(&token_path)?.unwrap_or_default(),
            token_path,
            videos: HashMap::new(),
        };
        if client.token.is_empty() {
            client.refresh_token()?;
        }
        Ok(client)
    }

    fn refresh_token(&mut self) -> Result<(), TwitchError> {
        const CONTEXT: &str = "token request";
        info!("Requesting a new video platform token");
        let response = self
            .http
            .post(TOKEN_URL)
            .form(&[
                ("client_id", self.credentials.client_id.as_str()),
                ("client_secret", self.credentials.client_secret.as_str()),
                ("grant_type", "client_credentials"),
            ])
            .send()
            .map_err(|source| TwitchError::Request {
                context: CONTEXT,
                source,
            })?;
        let body: serde_json::Value = checked(response, CONTEXT)?
            .json()
            .map_err(|source| TwitchError::Request {
                context: CONTEXT,
                source,
            })?;
        let token: TokenResponse =
            serde_json::from_value(body.clone()).map_err(|source| TwitchError::TokenFormat {
                path: self.token_path.clone(),
                source,
            })?;

        let pretty =
            serde_json::to_string_pretty(&body).map_err(|source| TwitchError::TokenFormat {
                path: self.token_path.clone(),
                source,
            })?;
        fs::write(&self.token_path, pretty).map_err(|source| TwitchError::TokenIo {
            path: self.token_path.clone(),
            source,
        })?;
        debug!("Token saved to {}", self.token_path.display());
        self.token = token.access_token;
        Ok(())
    }

    fn authorized(&self, url: &str) -> RequestBuilder {
        self.http
            .get(url)
            .header("Client-ID", &self.credentials.client_id)
            .bearer_auth(&self.token)
    }

    /// GET a helix endpoint, refreshing the token once if it was rejected.
    fn helix<T: DeserializeOwned>(
        &mut self,
        context: &'static str,
        url: &str,
        query: &[(&str, &str)],
    ) -> Result<Vec<T>, TwitchError> {
        let send = |client: &Self| {
            client
                .authorized(url)
                .query(query)
                .send()
                .map_err(|source| TwitchError::Request { context, source })
        };
        let mut response = send(&*self)?;
        if response.status() == StatusCode::UNAUTHORIZED {
            warn!("Video platform token rejected, refreshing");
            self.refresh_token()?;
            response = send(&*self)?;
        }
        let page: HelixPage<T> = checked(response, context)?
            .json()
            .map_err(|source| TwitchError::Request { context, source })?;
        Ok(page.data)
    }

    fn videos_for(&mut self, streamer: &str) -> Result<&[VideoRecord], TwitchError> {
        if !self.videos.contains_key(streamer) {
            info!("Fetching recordings for {streamer}");
            let user = self
                .helix::<HelixUser>("user lookup", HELIX_USERS_URL, &[("login", streamer)])?
                .into_iter()
                .next()
                .ok_or_else(|| TwitchError::UnknownStreamer(streamer.to_string()))?;
            let videos = self.helix::<VideoRecord>(
                "video listing",
                HELIX_VIDEOS_URL,
                &[("user_id", user.id.as_str())],
            )?;
            debug!("{streamer} has {} recordings", videos.len());
            self.videos.insert(streamer.to_string(), videos);
        }
        Ok(self.videos.get(streamer).map_or(&[][..], Vec::as_slice))
    }
}

fn checked(response: Response, context: &'static str) -> Result<Response, TwitchError> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(TwitchError::Status { context, status })
    }
}

impl VideoLookup for TwitchClient {
    type Error = TwitchError;

    fn video_url(
        &mut self,
        streamer: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<String>, Self::Error> {
        let videos = self.videos_for(streamer)?;
        Ok(locate_video(videos, at)?.map(|hit| hit.url()))
    }
}
