//! Catalog persistence layer.
//!
//! All structs in this module mirror how the catalog is serialized to disk and
//! exposed to the API. Both backends follow the same contract: a read returns
//! the whole ordered collection and a write replaces it wholesale. Nothing here
//! coordinates concurrent writers, so two overlapping load/save cycles simply
//! end with whichever snapshot was written last.

use std::{
    fmt,
    path::{Path, PathBuf},
    str::FromStr,
};

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Utc};
use libsql::{Builder, Connection, Row, params};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tracing::debug;

pub const VIDEOS_FILE: &str = "videos.json";
pub const ANNOUNCEMENTS_FILE: &str = "announcements.json";
pub const CATALOG_DB_FILE: &str = "catalog.db";

fn default_published() -> bool {
    true
}

/// A single catalog entry.
///
/// Timestamps stay plain strings: legacy data files carry whatever the old
/// admin panel wrote, and the listing code decides per use how to treat values
/// that do not parse.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoRecord {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub embed_urls: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub notes: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download_link: Option<String>,
    #[serde(default)]
    pub views: u64,
    #[serde(default = "default_published")]
    pub published: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_index: Option<i64>,
}

/// Short-lived notice shown in the public ticker until `expires_at`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnouncementRecord {
    pub id: String,
    pub message: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Which persistence backend holds the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StoreBackend {
    #[default]
    Json,
    Sqlite,
}

impl StoreBackend {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Sqlite => "sqlite",
        }
    }
}

impl fmt::Display for StoreBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StoreBackend {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "json" | "file" | "flat" => Ok(Self::Json),
            "sqlite" | "db" | "libsql" => Ok(Self::Sqlite),
            other => Err(anyhow!("unknown store backend: {other}")),
        }
    }
}

/// Entry point used by the binaries: one of the two interchangeable backends.
pub enum CatalogStore {
    Json(JsonCatalog),
    Sqlite(SqliteCatalog),
}

impl CatalogStore {
    /// Opens the requested backend inside `data_dir`, creating whatever files
    /// or tables are missing.
    pub async fn open(backend: StoreBackend, data_dir: &Path) -> Result<Self> {
        match backend {
            StoreBackend::Json => Ok(Self::Json(JsonCatalog::open(data_dir).await?)),
            StoreBackend::Sqlite => Ok(Self::Sqlite(
                SqliteCatalog::open(&data_dir.join(CATALOG_DB_FILE)).await?,
            )),
        }
    }

    pub fn backend(&self) -> StoreBackend {
        match self {
            Self::Json(_) => StoreBackend::Json,
            Self::Sqlite(_) => StoreBackend::Sqlite,
        }
    }

    pub async fn load_videos(&self) -> Result<Vec<VideoRecord>> {
        match self {
            Self::Json(store) => store.load_videos().await,
            Self::Sqlite(store) => store.load_videos().await,
        }
    }

    pub async fn save_videos(&self, videos: &[VideoRecord]) -> Result<()> {
        match self {
            Self::Json(store) => store.save_videos(videos).await,
            Self::Sqlite(store) => store.save_videos(videos).await,
        }
    }

    pub async fn load_announcements(&self) -> Result<Vec<AnnouncementRecord>> {
        match self {
            Self::Json(store) => store.load_announcements().await,
            Self::Sqlite(store) => store.load_announcements().await,
        }
    }

    pub async fn save_announcements(&self, announcements: &[AnnouncementRecord]) -> Result<()> {
        match self {
            Self::Json(store) => store.save_announcements(announcements).await,
            Self::Sqlite(store) => store.save_announcements(announcements).await,
        }
    }
}

/// Flat-file backend: one pretty-printed JSON array per collection.
#[derive(Debug, Clone)]
pub struct JsonCatalog {
    videos_path: PathBuf,
    announcements_path: PathBuf,
}

impl JsonCatalog {
    /// Creates the data directory and seeds an empty `videos.json` so the
    /// file is there for operators to inspect right after the first start.
    pub async fn open(data_dir: &Path) -> Result<Self> {
        tokio::fs::create_dir_all(data_dir)
            .await
            .with_context(|| format!("creating data directory {}", data_dir.display()))?;
        let store = Self {
            videos_path: data_dir.join(VIDEOS_FILE),
            announcements_path: data_dir.join(ANNOUNCEMENTS_FILE),
        };
        if tokio::fs::metadata(&store.videos_path).await.is_err() {
            write_json_atomic(&store.videos_path, &Vec::<VideoRecord>::new()).await?;
        }
        Ok(store)
    }

    pub async fn load_videos(&self) -> Result<Vec<VideoRecord>> {
        read_json_array(&self.videos_path).await
    }

    pub async fn save_videos(&self, videos: &[VideoRecord]) -> Result<()> {
        write_json_atomic(&self.videos_path, videos).await
    }

    pub async fn load_announcements(&self) -> Result<Vec<AnnouncementRecord>> {
        read_json_array(&self.announcements_path).await
    }

    pub async fn save_announcements(&self, announcements: &[AnnouncementRecord]) -> Result<()> {
        write_json_atomic(&self.announcements_path, announcements).await
    }
}

/// A missing file reads as an empty collection. A malformed one is an error:
/// returning an empty list would get written straight back over the data.
async fn read_json_array<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let raw = match tokio::fs::read_to_string(path).await {
        Ok(raw) => raw,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(err).with_context(|| format!("reading {}", path.display())),
    };
    if raw.trim().is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))
}

async fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    let tmp_path = path.with_extension("tmp");
    let payload = serde_json::to_vec_pretty(value)?;
    tokio::fs::write(&tmp_path, payload)
        .await
        .with_context(|| format!("writing {}", tmp_path.display()))?;
    tokio::fs::rename(&tmp_path, path)
        .await
        .with_context(|| format!("replacing {}", path.display()))?;
    debug!(path = %path.display(), "wrote snapshot");
    Ok(())
}

async fn configure_connection(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        PRAGMA journal_mode=WAL;
        PRAGMA synchronous=NORMAL;
        "#,
    )
    .await?;
    Ok(())
}

async fn ensure_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS videos (
            id TEXT PRIMARY KEY,
            position INTEGER NOT NULL,
            title TEXT NOT NULL,
            embed_urls_json TEXT NOT NULL DEFAULT '[]',
            thumbnail TEXT,
            duration TEXT,
            category TEXT NOT NULL DEFAULT '',
            tags_json TEXT NOT NULL DEFAULT '[]',
            notes TEXT NOT NULL DEFAULT '',
            download_link TEXT,
            views INTEGER NOT NULL DEFAULT 0,
            published INTEGER NOT NULL DEFAULT 1,
            created_at TEXT,
            updated_at TEXT,
            order_index INTEGER
        );

        CREATE TABLE IF NOT EXISTS announcements (
            id TEXT PRIMARY KEY,
            position INTEGER NOT NULL,
            message TEXT NOT NULL,
            created_at TEXT NOT NULL,
            expires_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_videos_position ON videos(position);
        "#,
    )
    .await?;
    Ok(())
}

/// Embedded database backend. Each collection lives in its own table and the
/// `position` column preserves collection order across replace-all writes.
#[derive(Debug)]
pub struct SqliteCatalog {
    conn: Connection,
}

impl SqliteCatalog {
    /// Opens (and if necessary creates) the database and ensures the expected
    /// schema exists.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating catalog directory {}", parent.display()))?;
        }

        let db = Builder::new_local(path)
            .build()
            .await
            .with_context(|| format!("opening catalog DB {}", path.display()))?;
        let conn = db.connect()?;
        configure_connection(&conn).await?;
        ensure_schema(&conn).await?;
        Ok(Self { conn })
    }

    pub async fn load_videos(&self) -> Result<Vec<VideoRecord>> {
        let mut rows = self
            .conn
            .query(
                r#"
                SELECT id, title, embed_urls_json, thumbnail, duration, category,
                       tags_json, notes, download_link, views, published,
                       created_at, updated_at, order_index
                FROM videos
                ORDER BY position ASC
                "#,
                params![],
            )
            .await?;

        let mut records = Vec::new();
        while let Some(row) = rows.next().await? {
            records.push(row_to_video_record(&row)?);
        }
        Ok(records)
    }

    /// Replaces every stored video in one transaction so readers never see a
    /// half-written catalog.
    pub async fn save_videos(&self, videos: &[VideoRecord]) -> Result<()> {
        let tx = self.conn.transaction().await?;
        tx.execute("DELETE FROM videos", params![]).await?;

        for (position, video) in videos.iter().enumerate() {
            let embed_urls_json =
                serde_json::to_string(&video.embed_urls).context("serializing embed urls")?;
            let tags_json = serde_json::to_string(&video.tags).context("serializing tags")?;
            tx.execute(
                r#"
                INSERT INTO videos (
                    id, position, title, embed_urls_json, thumbnail, duration,
                    category, tags_json, notes, download_link, views, published,
                    created_at, updated_at, order_index
                ) VALUES (
                    ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15
                )
                "#,
                params![
                    video.id.as_str(),
                    position as i64,
                    video.title.as_str(),
                    embed_urls_json,
                    video.thumbnail.as_deref(),
                    video.duration.as_deref(),
                    video.category.as_str(),
                    tags_json,
                    video.notes.as_str(),
                    video.download_link.as_deref(),
                    i64::try_from(video.views).unwrap_or(i64::MAX),
                    video.published as i64,
                    video.created_at.as_deref(),
                    video.updated_at.as_deref(),
                    video.order_index,
                ],
            )
            .await
            .with_context(|| format!("inserting video {}", video.id))?;
        }

        tx.commit().await?;
        Ok(())
    }

    pub async fn load_announcements(&self) -> Result<Vec<AnnouncementRecord>> {
        let mut rows = self
            .conn
            .query(
                r#"
                SELECT id, message, created_at, expires_at
                FROM announcements
                ORDER BY position ASC
                "#,
                params![],
            )
            .await?;

        let mut records = Vec::new();
        while let Some(row) = rows.next().await? {
            records.push(row_to_announcement(&row)?);
        }
        Ok(records)
    }

    pub async fn save_announcements(&self, announcements: &[AnnouncementRecord]) -> Result<()> {
        let tx = self.conn.transaction().await?;
        tx.execute("DELETE FROM announcements", params![]).await?;
        for (position, item) in announcements.iter().enumerate() {
            tx.execute(
                r#"
                INSERT INTO announcements (id, position, message, created_at, expires_at)
                VALUES (?1, ?2, ?3, ?4, ?5)
                "#,
                params![
                    item.id.as_str(),
                    position as i64,
                    item.message.as_str(),
                    item.created_at.to_rfc3339(),
                    item.expires_at.to_rfc3339(),
                ],
            )
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }
}

/// Converts a SQL row into a `VideoRecord`, deserializing the list columns.
fn row_to_video_record(row: &Row) -> Result<VideoRecord> {
    // Column order must match the SELECT in load_videos.
    let embed_urls_json: String = row.get(2)?;
    let tags_json: String = row.get(6)?;
    let embed_urls: Vec<String> =
        serde_json::from_str(&embed_urls_json).context("parsing stored embed urls JSON")?;
    let tags: Vec<String> = serde_json::from_str(&tags_json).context("parsing stored tags JSON")?;
    let views: i64 = row.get(9)?;

    Ok(VideoRecord {
        id: row.get(0)?,
        title: row.get(1)?,
        embed_urls,
        thumbnail: row.get(3)?,
        duration: row.get(4)?,
        category: row.get(5)?,
        tags,
        notes: row.get(7)?,
        download_link: row.get(8)?,
        views: u64::try_from(views).unwrap_or(0),
        published: row.get::<i64>(10).map(|value| value != 0)?,
        created_at: row.get(11)?,
        updated_at: row.get(12)?,
        order_index: row.get(13)?,
    })
}

fn row_to_announcement(row: &Row) -> Result<AnnouncementRecord> {
    let created_at: String = row.get(2)?;
    let expires_at: String = row.get(3)?;
    Ok(AnnouncementRecord {
        id: row.get(0)?,
        message: row.get(1)?,
        created_at: parse_stored_instant(&created_at)?,
        expires_at: parse_stored_instant(&expires_at)?,
    })
}

fn parse_stored_instant(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|datetime| datetime.with_timezone(&Utc))
        .with_context(|| format!("parsing stored timestamp {value}"))
}
