//! Admin mutations over a loaded catalog snapshot.
//!
//! Every function here works on the in-memory collection only. Callers load
//! the whole snapshot from the store, apply one of these operations and write
//! the whole snapshot back.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::listing::{self, Audience, ListQuery, Pagination};
use crate::metadata::VideoRecord;

pub const DEFAULT_CATEGORY: &str = "other";
pub const DEFAULT_CATEGORIES: &[&str] = &[
    "music",
    "gaming",
    "travel",
    "pets",
    "news",
    "sports",
    "education",
    "other",
];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CatalogError {
    #[error("video not found")]
    NotFound,
    #[error("{0}")]
    Invalid(String),
}

/// Site-specific policy applied to incoming admin edits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogRules {
    pub categories: Vec<String>,
    pub default_category: String,
    /// Give new videos `max(orderIndex) + 1` instead of leaving them unranked.
    pub rank_new_videos: bool,
}

impl Default for CatalogRules {
    fn default() -> Self {
        Self {
            categories: DEFAULT_CATEGORIES.iter().map(|value| value.to_string()).collect(),
            default_category: DEFAULT_CATEGORY.to_string(),
            rank_new_videos: false,
        }
    }
}

impl CatalogRules {
    /// Maps free text onto the closed category vocabulary.
    pub fn normalize_category(&self, raw: Option<&str>) -> String {
        let Some(value) = raw.map(|value| value.trim().to_lowercase()) else {
            return self.default_category.clone();
        };
        if self.categories.iter().any(|category| *category == value) {
            value
        } else {
            self.default_category.clone()
        }
    }
}

/// Editable fields as submitted by the admin panel, for both create and
/// update.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VideoInput {
    pub title: String,
    pub embed_urls: Vec<String>,
    pub thumbnail_url: Option<String>,
    pub duration: Option<String>,
    pub category: Option<String>,
    pub tags: Vec<String>,
    pub notes: Option<String>,
    pub download_link: Option<String>,
    pub published: Option<bool>,
}

fn clean_optional(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn clean_list(values: Vec<String>) -> Vec<String> {
    let mut cleaned: Vec<String> = Vec::with_capacity(values.len());
    for value in values {
        let trimmed = value.trim();
        if !trimmed.is_empty() && !cleaned.iter().any(|existing| existing == trimmed) {
            cleaned.push(trimmed.to_string());
        }
    }
    cleaned
}

fn required_title(title: &str) -> Result<String, CatalogError> {
    let title = title.trim();
    if title.is_empty() {
        return Err(CatalogError::Invalid("title is required".into()));
    }
    Ok(title.to_string())
}

pub fn timestamp(now: DateTime<Utc>) -> String {
    now.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Millisecond clock ids, bumped until they no longer collide.
pub fn next_video_id(videos: &[VideoRecord], now: DateTime<Utc>) -> String {
    let mut candidate = now.timestamp_millis();
    while videos.iter().any(|video| video.id == candidate.to_string()) {
        candidate += 1;
    }
    candidate.to_string()
}

/// Adds a new published video at the front of the collection.
pub fn create_video(
    videos: &mut Vec<VideoRecord>,
    input: VideoInput,
    rules: &CatalogRules,
    now: DateTime<Utc>,
) -> Result<VideoRecord, CatalogError> {
    let title = required_title(&input.title)?;
    let stamp = timestamp(now);
    let order_index = rules.rank_new_videos.then(|| {
        videos
            .iter()
            .filter_map(|video| video.order_index)
            .max()
            .unwrap_or(0)
            + 1
    });

    let record = VideoRecord {
        id: next_video_id(videos, now),
        title,
        embed_urls: clean_list(input.embed_urls),
        thumbnail: clean_optional(input.thumbnail_url),
        duration: clean_optional(input.duration),
        category: rules.normalize_category(input.category.as_deref()),
        tags: clean_list(input.tags),
        notes: input.notes.unwrap_or_default(),
        download_link: clean_optional(input.download_link),
        views: 0,
        published: true,
        created_at: Some(stamp.clone()),
        updated_at: Some(stamp),
        order_index,
    };
    videos.insert(0, record.clone());
    Ok(record)
}

/// Replaces the editable fields of an existing video.
///
/// A missing thumbnail keeps the current one and a missing `published` flag
/// publishes the video, matching what the edit form sends.
pub fn update_video(
    videos: &mut [VideoRecord],
    id: &str,
    input: VideoInput,
    rules: &CatalogRules,
    now: DateTime<Utc>,
) -> Result<VideoRecord, CatalogError> {
    let title = required_title(&input.title)?;
    let video = find_video_mut(videos, id)?;

    video.title = title;
    video.embed_urls = clean_list(input.embed_urls);
    if let Some(thumbnail) = clean_optional(input.thumbnail_url) {
        video.thumbnail = Some(thumbnail);
    }
    video.duration = clean_optional(input.duration);
    video.category = rules.normalize_category(input.category.as_deref());
    video.tags = clean_list(input.tags);
    video.notes = input.notes.unwrap_or_default();
    video.download_link = clean_optional(input.download_link);
    video.published = input.published.unwrap_or(true);
    video.updated_at = Some(timestamp(now));
    Ok(video.clone())
}

/// Permanently removes a video.
pub fn delete_video(videos: &mut Vec<VideoRecord>, id: &str) -> Result<VideoRecord, CatalogError> {
    let index = videos
        .iter()
        .position(|video| video.id == id)
        .ok_or(CatalogError::NotFound)?;
    Ok(videos.remove(index))
}

pub fn toggle_published(
    videos: &mut [VideoRecord],
    id: &str,
    now: DateTime<Utc>,
) -> Result<VideoRecord, CatalogError> {
    let video = find_video_mut(videos, id)?;
    video.published = !video.published;
    video.updated_at = Some(timestamp(now));
    Ok(video.clone())
}

/// Applies a drag-and-drop order from the admin table.
///
/// Listed ids come first in the given order (unknown ids are skipped), the
/// rest keep their current relative order behind them. Ranks count down from
/// the collection length so the first entry sorts highest. Returns the number
/// of records in the rewritten collection.
pub fn reorder_videos(
    videos: &mut Vec<VideoRecord>,
    order: &[String],
    now: DateTime<Utc>,
) -> Result<usize, CatalogError> {
    if order.is_empty() {
        return Err(CatalogError::Invalid("order must list at least one id".into()));
    }

    let mut remaining: Vec<Option<VideoRecord>> = videos.drain(..).map(Some).collect();
    let mut sorted = Vec::with_capacity(remaining.len());
    for id in order {
        if let Some(slot) = remaining
            .iter_mut()
            .find(|slot| slot.as_ref().is_some_and(|video| video.id == *id))
        {
            sorted.extend(slot.take());
        }
    }
    sorted.extend(remaining.into_iter().flatten());

    let total = sorted.len();
    let stamp = timestamp(now);
    for (position, video) in sorted.iter_mut().enumerate() {
        video.order_index = Some((total - position) as i64);
        video.updated_at = Some(stamp.clone());
    }
    *videos = sorted;
    Ok(total)
}

/// Public single-video fetch: counts one view. Unpublished videos do not
/// exist as far as the public is concerned.
pub fn record_view(videos: &mut [VideoRecord], id: &str) -> Result<VideoRecord, CatalogError> {
    let video = videos
        .iter_mut()
        .find(|video| video.id == id && video.published)
        .ok_or(CatalogError::NotFound)?;
    video.views = video.views.saturating_add(1);
    Ok(video.clone())
}

pub fn find_video<'a>(videos: &'a [VideoRecord], id: &str) -> Result<&'a VideoRecord, CatalogError> {
    videos
        .iter()
        .find(|video| video.id == id)
        .ok_or(CatalogError::NotFound)
}

fn find_video_mut<'a>(
    videos: &'a mut [VideoRecord],
    id: &str,
) -> Result<&'a mut VideoRecord, CatalogError> {
    videos
        .iter_mut()
        .find(|video| video.id == id)
        .ok_or(CatalogError::NotFound)
}

/// Admin table row: the full record plus its 1-based position in the whole
/// filtered result, not just the current page.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminVideoRow {
    #[serde(flatten)]
    pub video: VideoRecord,
    pub sequential_id: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AdminVideoPage {
    pub videos: Vec<AdminVideoRow>,
    pub pagination: Pagination,
}

pub fn admin_list_videos(
    all: &[VideoRecord],
    query: &ListQuery,
    now: DateTime<Utc>,
) -> AdminVideoPage {
    let numbered: Vec<AdminVideoRow> = listing::filter_and_sort(all, query, Audience::Admin, now)
        .into_iter()
        .enumerate()
        .map(|(index, video)| AdminVideoRow {
            video,
            sequential_id: index + 1,
        })
        .collect();

    let (videos, pagination) = listing::page_slice(numbered, query.page, query.page_size);
    AdminVideoPage { videos, pagination }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 8, 30, 0).unwrap()
    }

    fn input(title: &str) -> VideoInput {
        VideoInput {
            title: title.into(),
            embed_urls: vec![" https://player.example/1 ".into(), "".into()],
            thumbnail_url: Some("https://img.example/1.jpg".into()),
            duration: Some("10:00".into()),
            category: Some("Travel".into()),
            tags: vec!["beach".into(), " beach ".into(), "sun".into(), " ".into()],
            notes: Some("first cut".into()),
            download_link: Some("   ".into()),
            published: None,
        }
    }

    fn seeded() -> Vec<VideoRecord> {
        let rules = CatalogRules::default();
        let mut videos = Vec::new();
        create_video(&mut videos, input("First"), &rules, now()).unwrap();
        create_video(
            &mut videos,
            input("Second"),
            &rules,
            now() + Duration::seconds(1),
        )
        .unwrap();
        videos
    }

    #[test]
    fn create_normalizes_and_prepends() {
        let videos = seeded();
        assert_eq!(videos[0].title, "Second");
        let first = &videos[1];
        assert_eq!(first.id, now().timestamp_millis().to_string());
        assert_eq!(first.embed_urls, vec!["https://player.example/1"]);
        assert_eq!(first.tags, vec!["beach", "sun"]);
        assert_eq!(first.category, "travel");
        assert_eq!(first.download_link, None);
        assert_eq!(first.views, 0);
        assert!(first.published);
        assert_eq!(first.created_at.as_deref(), Some("2025-03-01T08:30:00.000Z"));
        assert_eq!(first.created_at, first.updated_at);
        assert_eq!(first.order_index, None);
    }

    #[test]
    fn create_rejects_blank_title() {
        let mut videos = Vec::new();
        let err = create_video(&mut videos, input("   "), &CatalogRules::default(), now())
            .unwrap_err();
        assert!(matches!(err, CatalogError::Invalid(_)));
        assert!(videos.is_empty());
    }

    #[test]
    fn ids_do_not_collide_within_the_same_millisecond() {
        let rules = CatalogRules::default();
        let mut videos = Vec::new();
        let a = create_video(&mut videos, input("A"), &rules, now()).unwrap();
        let b = create_video(&mut videos, input("B"), &rules, now()).unwrap();
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn unknown_category_falls_back() {
        let rules = CatalogRules::default();
        assert_eq!(rules.normalize_category(Some("cooking")), DEFAULT_CATEGORY);
        assert_eq!(rules.normalize_category(None), DEFAULT_CATEGORY);
        assert_eq!(rules.normalize_category(Some(" PETS ")), "pets");
    }

    #[test]
    fn ranked_creation_takes_next_index() {
        let rules = CatalogRules {
            rank_new_videos: true,
            ..CatalogRules::default()
        };
        let mut videos = Vec::new();
        let first = create_video(&mut videos, input("A"), &rules, now()).unwrap();
        assert_eq!(first.order_index, Some(1));
        videos[0].order_index = Some(9);
        let second = create_video(&mut videos, input("B"), &rules, now()).unwrap();
        assert_eq!(second.order_index, Some(10));
    }

    #[test]
    fn update_keeps_thumbnail_and_republishes() {
        let mut videos = seeded();
        let id = videos[1].id.clone();
        videos[1].published = false;
        videos[1].views = 12;
        let later = now() + Duration::minutes(5);
        let updated = update_video(
            &mut videos,
            &id,
            VideoInput {
                title: "Renamed".into(),
                category: Some("pets".into()),
                ..VideoInput::default()
            },
            &CatalogRules::default(),
            later,
        )
        .unwrap();
        assert_eq!(updated.title, "Renamed");
        assert_eq!(updated.thumbnail.as_deref(), Some("https://img.example/1.jpg"));
        assert!(updated.published);
        assert_eq!(updated.views, 12);
        assert_eq!(updated.created_at.as_deref(), Some("2025-03-01T08:30:00.000Z"));
        assert_eq!(updated.updated_at, Some(timestamp(later)));
        assert_eq!(videos[1], updated);
    }

    #[test]
    fn update_unknown_id_is_not_found() {
        let mut videos = seeded();
        let err = update_video(
            &mut videos,
            "ghost",
            input("x"),
            &CatalogRules::default(),
            now(),
        )
        .unwrap_err();
        assert_eq!(err, CatalogError::NotFound);
    }

    #[test]
    fn delete_removes_permanently() {
        let mut videos = seeded();
        let id = videos[0].id.clone();
        delete_video(&mut videos, &id).unwrap();
        assert_eq!(videos.len(), 1);
        assert_eq!(delete_video(&mut videos, &id).unwrap_err(), CatalogError::NotFound);
    }

    #[test]
    fn toggle_flips_and_stamps() {
        let mut videos = seeded();
        let id = videos[0].id.clone();
        let later = now() + Duration::hours(1);
        let toggled = toggle_published(&mut videos, &id, later).unwrap();
        assert!(!toggled.published);
        assert_eq!(toggled.updated_at, Some(timestamp(later)));
        assert!(toggle_published(&mut videos, &id, later).unwrap().published);
    }

    #[test]
    fn reorder_puts_listed_ids_first() {
        let rules = CatalogRules::default();
        let mut videos = Vec::new();
        for (offset, title) in ["a", "b", "c", "d"].iter().enumerate() {
            create_video(
                &mut videos,
                input(title),
                &rules,
                now() + Duration::seconds(offset as i64),
            )
            .unwrap();
        }
        // collection is d, c, b, a
        let id_of = |videos: &[VideoRecord], title: &str| {
            videos
                .iter()
                .find(|video| video.title == title)
                .unwrap()
                .id
                .clone()
        };
        let order = vec![id_of(&videos, "b"), "ghost".to_string(), id_of(&videos, "a")];
        let total = reorder_videos(&mut videos, &order, now()).unwrap();
        assert_eq!(total, 4);

        let titles: Vec<&str> = videos.iter().map(|video| video.title.as_str()).collect();
        assert_eq!(titles, vec!["b", "a", "d", "c"]);
        let ranks: Vec<Option<i64>> = videos.iter().map(|video| video.order_index).collect();
        assert_eq!(ranks, vec![Some(4), Some(3), Some(2), Some(1)]);
        assert!(videos.iter().all(|video| video.updated_at == Some(timestamp(now()))));
    }

    #[test]
    fn reorder_requires_ids() {
        let mut videos = seeded();
        assert!(matches!(
            reorder_videos(&mut videos, &[], now()),
            Err(CatalogError::Invalid(_))
        ));
    }

    #[test]
    fn record_view_counts_once_and_hides_drafts() {
        let mut videos = seeded();
        let id = videos[0].id.clone();
        assert_eq!(record_view(&mut videos, &id).unwrap().views, 1);
        assert_eq!(record_view(&mut videos, &id).unwrap().views, 2);

        videos[0].published = false;
        assert_eq!(record_view(&mut videos, &id).unwrap_err(), CatalogError::NotFound);
        assert_eq!(videos[0].views, 2);
        assert!(find_video(&videos, &id).is_ok());
    }

    #[test]
    fn admin_rows_number_across_pages() {
        let mut videos = Vec::new();
        let rules = CatalogRules::default();
        for (offset, title) in ["a", "b", "c"].iter().enumerate() {
            create_video(
                &mut videos,
                input(title),
                &rules,
                now() + Duration::seconds(offset as i64),
            )
            .unwrap();
        }
        videos[0].published = false;

        let query = ListQuery {
            page: 2,
            page_size: 2,
            ..ListQuery::default()
        };
        let page = admin_list_videos(&videos, &query, now());
        assert_eq!(page.pagination.total, 3);
        assert_eq!(page.pagination.pages, 2);
        assert_eq!(page.videos.len(), 1);
        assert_eq!(page.videos[0].sequential_id, 3);
        assert_eq!(page.videos[0].video.title, "a");

        let value = serde_json::to_value(&page.videos[0]).unwrap();
        assert_eq!(value["sequentialId"], 3);
        assert_eq!(value["title"], "a");
    }
}
