use super::database::{get_database, VideoDatabase};
use super::network::DevByteService;
use crate::metrics;
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

/// Why a refresh did not complete.
#[derive(Debug, Error)]
pub enum RefreshError {
    /// Connection, timeout or body read failure.
    #[error("Network error: {0}")]
    Transport(String),

    /// Non-2xx response.
    #[error("HTTP {0}")]
    Status(u16),

    /// The payload was not a playlist.
    #[error("Malformed playlist: {0}")]
    Decode(String),

    #[error("Storage error: {0}")]
    Storage(#[from] anyhow::Error),
}

impl RefreshError {
    /// Whether a later attempt may succeed without any change on our side.
    pub fn is_transient(&self) -> bool {
        matches!(self, RefreshError::Transport(_) | RefreshError::Status(_))
    }
}

/// Source of truth for the video list: refreshes the local store from the network.
#[cfg_attr(feature = "mock", mockall::automock)]
#[async_trait]
pub trait VideosRepository: Send + Sync {
    /// Fetch the playlist and write it to the local store. Returns the number
    /// of videos written.
    async fn refresh_videos(&self) -> Result<usize, RefreshError>;
}

/// Opens the data store and hands out a repository bound to it.
#[cfg_attr(feature = "mock", mockall::automock)]
pub trait RepositoryProvider: Send + Sync {
    fn open(&self) -> Result<Arc<dyn VideosRepository>, RefreshError>;
}

pub struct DevByteVideosRepository {
    database: Arc<dyn VideoDatabase>,
    service: Arc<DevByteService>,
}

impl DevByteVideosRepository {
    pub fn new(database: Arc<dyn VideoDatabase>, service: Arc<DevByteService>) -> Self {
        Self { database, service }
    }
}

#[async_trait]
impl VideosRepository for DevByteVideosRepository {
    async fn refresh_videos(&self) -> Result<usize, RefreshError> {
        let playlist = self.service.get_playlist().await?;
        let videos = playlist.as_database_model();
        self.database.insert_all(&videos)?;

        metrics::record_videos_refreshed(videos.len());
        info!(
            "Stored {} videos from {}",
            videos.len(),
            self.service.playlist_url()
        );
        Ok(videos.len())
    }
}

/// Binds the shared SQLite video database to the playlist service.
pub struct DevByteRepositoryProvider {
    db_path: PathBuf,
    service: Arc<DevByteService>,
}

impl DevByteRepositoryProvider {
    pub fn new(db_path: PathBuf, service: DevByteService) -> Self {
        Self {
            db_path,
            service: Arc::new(service),
        }
    }
}

impl RepositoryProvider for DevByteRepositoryProvider {
    fn open(&self) -> Result<Arc<dyn VideosRepository>, RefreshError> {
        let database = get_database(&self.db_path)?;
        Ok(Arc::new(DevByteVideosRepository::new(
            database,
            Arc::clone(&self.service),
        )))
    }
}
