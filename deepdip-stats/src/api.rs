use deepdip_core::{PlayerHistory, StatsSource};
use log::debug;
use reqwest::StatusCode;
use reqwest::blocking::Client;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
    #[error("request for {player} failed: {source}")]
    Request {
        player: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("stats API answered {status} for {player}")]
    Status { player: String, status: StatusCode },
}

/// Blocking client for the Deep Dip player stats endpoint.
pub struct DeepDipApi {
    client: Client,
    base_url: String,
}

impl DeepDipApi {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("deepdip-stats/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(ApiError::Client)?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }
}

impl StatsSource for DeepDipApi {
    type Error = ApiError;

    fn fetch_history(&self, player: &str) -> Result<PlayerHistory, Self::Error> {
        debug!("Fetching stats for {player} from {}", self.base_url);
        let request_failed = |source| ApiError::Request {
            player: player.to_string(),
            source,
        };
        let response = self
            .client
            .get(&self.base_url)
            .query(&[("username", player)])
            .send()
            .map_err(request_failed)?;

        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::Status {
                player: player.to_string(),
                status,
            });
        }
        response.json::<PlayerHistory>().map_err(request_failed)
    }
}
