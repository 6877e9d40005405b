//! DevByte playlist endpoint and its wire format.

use super::database::DatabaseVideo;
use super::repository::RefreshError;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Playlist payload: `{"videos": [...]}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct NetworkVideoContainer {
    pub videos: Vec<NetworkVideo>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NetworkVideo {
    pub title: String,
    pub description: String,
    pub url: String,
    pub updated: String,
    pub thumbnail: String,
    #[serde(rename = "closedCaptions", default, skip_serializing_if = "Option::is_none")]
    pub closed_captions: Option<String>,
}

impl NetworkVideoContainer {
    pub fn as_database_model(&self) -> Vec<DatabaseVideo> {
        self.videos
            .iter()
            .map(|video| DatabaseVideo {
                url: video.url.clone(),
                updated: video.updated.clone(),
                title: video.title.clone(),
                description: video.description.clone(),
                thumbnail: video.thumbnail.clone(),
            })
            .collect()
    }
}

/// HTTP client for the playlist endpoint.
pub struct DevByteService {
    client: reqwest::Client,
    playlist_url: String,
}

impl DevByteService {
    /// Create a client for `playlist_url` with a per-request timeout.
    pub fn new(playlist_url: String, timeout_sec: u64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_sec))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            playlist_url,
        })
    }

    pub fn playlist_url(&self) -> &str {
        &self.playlist_url
    }

    /// Fetch the playlist.
    pub async fn get_playlist(&self) -> Result<NetworkVideoContainer, RefreshError> {
        debug!("Fetching playlist from {}", self.playlist_url);
        let response = self
            .client
            .get(&self.playlist_url)
            .send()
            .await
            .map_err(|e| RefreshError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(RefreshError::Status(status.as_u16()));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| RefreshError::Transport(e.to_string()))?;

        serde_json::from_slice(&body).map_err(|e| RefreshError::Decode(e.to_string()))
    }
}
