//! End-to-end tests for the scheduled playlist refresh
//!
//! Each test runs the scheduler, the refresh worker and the bootstrap against
//! a local playlist server.

mod common;

use common::{PlaylistServer, TestDaemon, PLAYLIST_JSON, PLAYLIST_VIDEO_COUNT};
use devbyte_sync::refresh::WORK_NAME;
use devbyte_sync::work::{NetworkState, RunOutcome, WorkState};
use std::time::Duration;

#[tokio::test]
async fn test_refresh_stores_videos() {
    let server = PlaylistServer::spawn(200, PLAYLIST_JSON).await;
    let daemon = TestDaemon::start(&server.playlist_url(), TestDaemon::good_device()).await;

    let run = daemon.wait_for_finished_run().await;
    assert_eq!(run.outcome, RunOutcome::Success);
    assert_eq!(run.triggered_by, "schedule");
    assert!(run.error_message.is_none());

    let videos = daemon.stored_videos();
    assert_eq!(videos.len(), PLAYLIST_VIDEO_COUNT);
    assert_eq!(videos[0].title, "Android Jetpack: WorkManager");

    // Next run is a full day away
    let infos = daemon
        .work_manager
        .get_work_infos_for_unique_work(WORK_NAME)
        .await
        .unwrap();
    assert_eq!(infos.len(), 1);
    assert_eq!(infos[0].state, WorkState::Enqueued.as_str());
    assert_eq!(infos[0].run_attempt_count, 0);
    assert_eq!(infos[0].last_outcome.as_deref(), Some("success"));

    daemon.shutdown().await;
}

#[tokio::test]
async fn test_server_error_schedules_retry() {
    let server = PlaylistServer::spawn(500, "internal error").await;
    let daemon = TestDaemon::start(&server.playlist_url(), TestDaemon::good_device()).await;

    let run = daemon.wait_for_finished_run().await;
    assert_eq!(run.outcome, RunOutcome::Retry);
    assert_eq!(run.error_message.as_deref(), Some("HTTP 500"));
    assert!(daemon.stored_videos().is_empty());

    let infos = daemon
        .work_manager
        .get_work_infos_for_unique_work(WORK_NAME)
        .await
        .unwrap();
    assert_eq!(infos[0].run_attempt_count, 1);
    assert_eq!(infos[0].last_outcome.as_deref(), Some("retry"));

    daemon.shutdown().await;
}

#[tokio::test]
async fn test_malformed_playlist_fails_run() {
    let server = PlaylistServer::spawn(200, r#"{"items": "nope"}"#).await;
    let daemon = TestDaemon::start(&server.playlist_url(), TestDaemon::good_device()).await;

    let run = daemon.wait_for_finished_run().await;
    assert_eq!(run.outcome, RunOutcome::Failure);
    assert!(run
        .error_message
        .as_deref()
        .unwrap_or_default()
        .contains("Malformed playlist"));

    let infos = daemon
        .work_manager
        .get_work_infos_for_unique_work(WORK_NAME)
        .await
        .unwrap();
    // Failure waits for the next period rather than backing off
    assert_eq!(infos[0].run_attempt_count, 0);

    daemon.shutdown().await;
}

#[tokio::test]
async fn test_metered_network_defers_refresh() {
    let server = PlaylistServer::spawn(200, PLAYLIST_JSON).await;
    let mut device = TestDaemon::good_device();
    device.network = NetworkState {
        connected: true,
        metered: true,
        roaming: false,
    };
    let daemon = TestDaemon::start(&server.playlist_url(), device).await;

    tokio::time::sleep(Duration::from_millis(700)).await;

    assert_eq!(server.request_count(), 0);
    assert!(daemon
        .work_manager
        .get_run_history(WORK_NAME, 10)
        .unwrap()
        .is_empty());

    daemon.shutdown().await;
}

#[tokio::test]
async fn test_run_now_ignores_constraints() {
    let server = PlaylistServer::spawn(200, PLAYLIST_JSON).await;
    let mut device = TestDaemon::good_device();
    device.charging = false;
    let daemon = TestDaemon::start(&server.playlist_url(), device).await;

    daemon.work_manager.run_now(WORK_NAME).await.unwrap();

    let run = daemon.wait_for_finished_run().await;
    assert_eq!(run.outcome, RunOutcome::Success);
    assert_eq!(run.triggered_by, "manual");
    assert_eq!(server.request_count(), 1);
    assert_eq!(daemon.stored_videos().len(), PLAYLIST_VIDEO_COUNT);

    daemon.shutdown().await;
}

#[tokio::test]
async fn test_cancelled_refresh_does_not_run() {
    let server = PlaylistServer::spawn(200, PLAYLIST_JSON).await;
    let mut device = TestDaemon::good_device();
    device.idle = false;
    let daemon = TestDaemon::start(&server.playlist_url(), device).await;

    assert!(daemon
        .work_manager
        .cancel_unique_work(WORK_NAME)
        .await
        .unwrap());

    let infos = daemon
        .work_manager
        .get_work_infos_for_unique_work(WORK_NAME)
        .await
        .unwrap();
    assert_eq!(infos[0].state, WorkState::Cancelled.as_str());
    assert!(daemon.work_manager.run_now(WORK_NAME).await.is_err());

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(server.request_count(), 0);

    daemon.shutdown().await;
}
