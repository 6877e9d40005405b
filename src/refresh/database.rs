//! Local cache of the DevByte playlist.

use crate::sqlite_column;
use crate::sqlite_persistence::{open_versioned, Column, SqlType, Table, VersionedSchema};
use anyhow::Result;
use lazy_static::lazy_static;
use rusqlite::{params, Connection};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// A video as stored locally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseVideo {
    pub url: String,
    pub updated: String,
    pub title: String,
    pub description: String,
    pub thumbnail: String,
}

pub trait VideoDatabase: Send + Sync {
    /// Insert or update every video, keyed by url.
    fn insert_all(&self, videos: &[DatabaseVideo]) -> Result<()>;
    fn get_videos(&self) -> Result<Vec<DatabaseVideo>>;
}

const VIDEOS_TABLE_V1: Table = Table {
    name: "videos",
    columns: &[
        sqlite_column!("url", &SqlType::Text, is_primary_key = true),
        sqlite_column!("updated", &SqlType::Text, non_null = true),
        sqlite_column!("title", &SqlType::Text, non_null = true),
        sqlite_column!("description", &SqlType::Text, non_null = true),
        sqlite_column!("thumbnail", &SqlType::Text, non_null = true),
    ],
    indices: &[],
    unique_constraints: &[],
};

pub const VIDEOS_VERSIONED_SCHEMAS: &[VersionedSchema] = &[VersionedSchema {
    version: 1,
    tables: &[VIDEOS_TABLE_V1],
    migration: None,
}];

pub struct SqliteVideoDatabase {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteVideoDatabase {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = open_versioned(db_path.as_ref(), VIDEOS_VERSIONED_SCHEMAS, "videos")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn row_to_video(row: &rusqlite::Row) -> rusqlite::Result<DatabaseVideo> {
        Ok(DatabaseVideo {
            url: row.get("url")?,
            updated: row.get("updated")?,
            title: row.get("title")?,
            description: row.get("description")?,
            thumbnail: row.get("thumbnail")?,
        })
    }
}

impl VideoDatabase for SqliteVideoDatabase {
    fn insert_all(&self, videos: &[DatabaseVideo]) -> Result<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        for video in videos {
            tx.execute(
                "INSERT INTO videos (url, updated, title, description, thumbnail)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(url) DO UPDATE SET
                    updated = ?2, title = ?3, description = ?4, thumbnail = ?5",
                params![
                    video.url,
                    video.updated,
                    video.title,
                    video.description,
                    video.thumbnail
                ],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    fn get_videos(&self) -> Result<Vec<DatabaseVideo>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT url, updated, title, description, thumbnail FROM videos ORDER BY updated DESC",
        )?;

        let videos = stmt
            .query_map([], Self::row_to_video)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(videos)
    }
}

lazy_static! {
    static ref DATABASES: Mutex<HashMap<PathBuf, Arc<SqliteVideoDatabase>>> =
        Mutex::new(HashMap::new());
}

/// Process-wide handle to the video database at `db_path`, opened on first use.
pub fn get_database(db_path: &Path) -> Result<Arc<SqliteVideoDatabase>> {
    let mut databases = DATABASES.lock().unwrap();
    if let Some(database) = databases.get(db_path) {
        return Ok(Arc::clone(database));
    }

    let database = Arc::new(SqliteVideoDatabase::new(db_path)?);
    databases.insert(db_path.to_path_buf(), Arc::clone(&database));
    Ok(database)
}
