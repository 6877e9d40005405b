//! The DevByte playlist refresh: the one piece of periodic work the daemon runs.

mod database;
mod network;
mod repository;
mod worker;

use std::time::Duration;

pub use database::{get_database, DatabaseVideo, SqliteVideoDatabase, VideoDatabase};
pub use network::{DevByteService, NetworkVideo, NetworkVideoContainer};
pub use repository::{
    DevByteRepositoryProvider, DevByteVideosRepository, RefreshError, RepositoryProvider,
    VideosRepository,
};
pub use worker::RefreshDataWorker;

#[cfg(feature = "mock")]
pub use repository::{MockRepositoryProvider, MockVideosRepository};

/// Unique name the refresh is enqueued under.
pub const WORK_NAME: &str = "com.example.android.devbyteviewer.work.RefreshDataWorker";

/// How often the playlist is refreshed.
pub const REFRESH_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);
