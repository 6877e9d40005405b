//! Common test infrastructure
//!
//! End-to-end tests run the real scheduler and refresh worker against a local
//! playlist server. Tests should only import from this module.
//!
//! # Example
//!
//! ```no_run
//! mod common;
//! use common::{PlaylistServer, TestDaemon, PLAYLIST_JSON};
//!
//! #[tokio::test]
//! async fn test_refresh() {
//!     let server = PlaylistServer::spawn(200, PLAYLIST_JSON).await;
//!     let daemon = TestDaemon::start(&server.playlist_url(), TestDaemon::good_device()).await;
//!     let run = daemon.wait_for_finished_run().await;
//!     assert_eq!(run.outcome.as_str(), "success");
//! }
//! ```

mod constants;
mod daemon;
mod server;

pub use constants::*;
pub use daemon::TestDaemon;
pub use server::PlaylistServer;
