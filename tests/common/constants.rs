//! Shared constants for end-to-end tests

use std::time::Duration;

/// Playlist served by [`super::PlaylistServer`] in the happy path.
pub const PLAYLIST_JSON: &str = r#"{
    "videos": [
        {
            "title": "Android Jetpack: EmojiCompat",
            "description": "With EmojiCompat, your app can display the latest emoji.",
            "url": "https://www.youtube.com/watch?v=sYGKUtM2ga8",
            "updated": "2018-06-07T17:09:43+00:00",
            "thumbnail": "https://i4.ytimg.com/vi/sYGKUtM2ga8/hqdefault.jpg"
        },
        {
            "title": "Android Jetpack: Fragments",
            "description": "Fragments, now part of Jetpack.",
            "url": "https://www.youtube.com/watch?v=RS1IACnZLy4",
            "updated": "2018-06-08T17:09:43+00:00",
            "thumbnail": "https://i4.ytimg.com/vi/RS1IACnZLy4/hqdefault.jpg"
        },
        {
            "title": "Android Jetpack: WorkManager",
            "description": "Deferrable background work.",
            "url": "https://www.youtube.com/watch?v=pe_yqM16hPQ",
            "updated": "2018-06-09T17:09:43+00:00",
            "thumbnail": "https://i4.ytimg.com/vi/pe_yqM16hPQ/hqdefault.jpg"
        }
    ]
}"#;

/// Number of videos in [`PLAYLIST_JSON`].
pub const PLAYLIST_VIDEO_COUNT: usize = 3;

/// How long tests wait for the scheduler to finish a run.
pub const RUN_TIMEOUT: Duration = Duration::from_secs(15);
