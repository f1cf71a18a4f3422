#![forbid(unsafe_code)]

//! Copies the whole catalog from one storage backend to the other.
//!
//! The target is overwritten with the source snapshot, videos and
//! announcements alike. Stop the backend first.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::Parser;
use tracing::info;
use vidshelf::config::{RuntimeOverrides, init_tracing, resolve_runtime_settings};
use vidshelf::metadata::{CatalogStore, StoreBackend};
use vidshelf::security::ensure_not_root;

#[derive(Debug, Parser)]
#[command(name = "migrate_store", about = "Copy the catalog between storage backends")]
struct MigrateArgs {
    /// Backend to read from: json or sqlite
    #[arg(long)]
    from: StoreBackend,
    /// Backend to overwrite: json or sqlite
    #[arg(long)]
    to: StoreBackend,
    #[arg(long)]
    data_dir: Option<PathBuf>,
    #[arg(long)]
    env_file: Option<PathBuf>,
}

#[derive(Debug, PartialEq, Eq)]
struct MigrationSummary {
    videos: usize,
    announcements: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let args = MigrateArgs::parse();
    ensure_not_root("migrate_store")?;

    let settings = resolve_runtime_settings(RuntimeOverrides {
        data_dir: args.data_dir,
        env_path: args.env_file,
        ..RuntimeOverrides::default()
    })?;

    let summary = migrate(args.from, args.to, &settings.data_dir).await?;
    info!(
        from = %args.from,
        to = %args.to,
        videos = summary.videos,
        announcements = summary.announcements,
        "catalog migrated"
    );
    Ok(())
}

async fn migrate(from: StoreBackend, to: StoreBackend, data_dir: &Path) -> Result<MigrationSummary> {
    if from == to {
        bail!("source and target backend are both {from}");
    }

    let source = CatalogStore::open(from, data_dir)
        .await
        .with_context(|| format!("opening {from} store in {}", data_dir.display()))?;
    let target = CatalogStore::open(to, data_dir)
        .await
        .with_context(|| format!("opening {to} store in {}", data_dir.display()))?;

    let videos = source.load_videos().await.context("reading videos")?;
    let announcements = source
        .load_announcements()
        .await
        .context("reading announcements")?;

    target.save_videos(&videos).await.context("writing videos")?;
    target
        .save_announcements(&announcements)
        .await
        .context("writing announcements")?;

    Ok(MigrationSummary {
        videos: videos.len(),
        announcements: announcements.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use tempfile::tempdir;
    use vidshelf::metadata::{AnnouncementRecord, VideoRecord};

    fn video(id: &str) -> VideoRecord {
        VideoRecord {
            id: id.into(),
            title: format!("Video {id}"),
            embed_urls: vec![format!("https://player.example/{id}")],
            thumbnail: None,
            duration: None,
            category: "other".into(),
            tags: vec!["tag".into()],
            notes: String::new(),
            download_link: None,
            views: 3,
            published: true,
            created_at: None,
            updated_at: None,
            order_index: Some(1),
        }
    }

    #[test]
    fn args_require_both_backends() {
        assert!(MigrateArgs::try_parse_from(["migrate_store", "--from", "json"]).is_err());
        let args =
            MigrateArgs::try_parse_from(["migrate_store", "--from", "json", "--to", "sqlite"])
                .unwrap();
        assert_eq!(args.from, StoreBackend::Json);
        assert_eq!(args.to, StoreBackend::Sqlite);
    }

    #[tokio::test]
    async fn same_backend_is_rejected() {
        let dir = tempdir().unwrap();
        let err = migrate(StoreBackend::Json, StoreBackend::Json, dir.path())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("both json"));
    }

    #[tokio::test]
    async fn json_snapshot_lands_in_sqlite_in_order() {
        let dir = tempdir().unwrap();
        let now = Utc::now();
        let json = CatalogStore::open(StoreBackend::Json, dir.path()).await.unwrap();
        let videos = vec![video("2"), video("1"), video("3")];
        let announcements = vec![AnnouncementRecord {
            id: "a1".into(),
            message: "hello".into(),
            created_at: now,
            expires_at: now + Duration::hours(1),
        }];
        json.save_videos(&videos).await.unwrap();
        json.save_announcements(&announcements).await.unwrap();

        let summary = migrate(StoreBackend::Json, StoreBackend::Sqlite, dir.path())
            .await
            .unwrap();
        assert_eq!(
            summary,
            MigrationSummary {
                videos: 3,
                announcements: 1
            }
        );

        let sqlite = CatalogStore::open(StoreBackend::Sqlite, dir.path()).await.unwrap();
        assert_eq!(sqlite.load_videos().await.unwrap(), videos);
        let copied = sqlite.load_announcements().await.unwrap();
        assert_eq!(copied.len(), 1);
        assert_eq!(copied[0].id, "a1");
    }
}
