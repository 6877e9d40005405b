//! DevByte Sync Library
//!
//! This library exposes the internal modules for testing and potential reuse.

pub mod app;
pub mod config;
pub mod metrics;
pub mod refresh;
pub mod sqlite_persistence;
pub mod work;

// Re-export commonly used types for convenience
pub use app::Application;
pub use refresh::{RefreshDataWorker, WORK_NAME};
pub use work::{create_work_manager, SqliteWorkStore, WorkManager, WorkScheduler};
