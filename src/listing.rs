//! Search, filter, sort and paginate pipeline behind the video listings.
//!
//! The public feed and the admin table share one implementation; the only
//! difference is whether unpublished records survive the first step. Each
//! step narrows the working set before the next one runs, so the order of the
//! steps below is part of the observable behavior.

use std::cmp::Ordering;

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::metadata::VideoRecord;
use crate::search::{self, MIN_TERM_CHARS};

pub const DEFAULT_PAGE_SIZE: usize = 20;
pub const ALL_CATEGORIES: &str = "all";
const RECENT_WINDOW_DAYS: i64 = 7;

/// Who is asking. Admins also see unpublished records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Audience {
    Public,
    Admin,
}

impl Audience {
    fn includes_unpublished(self) -> bool {
        matches!(self, Self::Admin)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortMode {
    /// Manual rank first, then most recent. This is the default label even
    /// though it is not pure recency.
    #[default]
    Newest,
    Oldest,
    Views,
    ViewsAsc,
    Manual,
}

impl SortMode {
    /// Unknown values fall back to [`SortMode::Newest`].
    pub fn parse(value: &str) -> Self {
        match value.trim() {
            "oldest" => Self::Oldest,
            "views" => Self::Views,
            "views_asc" => Self::ViewsAsc,
            "manual" => Self::Manual,
            _ => Self::Newest,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimeWindow {
    #[default]
    Any,
    LastSevenDays,
}

impl TimeWindow {
    pub fn parse(value: &str) -> Self {
        match value.trim() {
            "7d" => Self::LastSevenDays,
            _ => Self::Any,
        }
    }
}

/// Request-scoped listing parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListQuery {
    pub search: String,
    pub category: Option<String>,
    pub time: TimeWindow,
    pub sort: SortMode,
    pub page: usize,
    pub page_size: usize,
}

impl Default for ListQuery {
    fn default() -> Self {
        Self {
            search: String::new(),
            category: None,
            time: TimeWindow::Any,
            sort: SortMode::Newest,
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

/// Raw query string as sent by the browser. Every field is optional text so
/// that malformed numbers degrade to defaults instead of rejecting the
/// request.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListParams {
    pub page: Option<String>,
    pub limit: Option<String>,
    pub search: Option<String>,
    pub category: Option<String>,
    pub sort: Option<String>,
    pub time: Option<String>,
}

impl ListParams {
    pub fn into_query(self) -> ListQuery {
        let page = self
            .page
            .as_deref()
            .and_then(parse_leading_int)
            .unwrap_or(1)
            .max(1);
        let page_size = self
            .limit
            .as_deref()
            .and_then(parse_leading_int)
            .unwrap_or(DEFAULT_PAGE_SIZE as i64)
            .max(1);
        let category = self
            .category
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty());

        ListQuery {
            search: self.search.unwrap_or_default(),
            category,
            time: self
                .time
                .as_deref()
                .map(TimeWindow::parse)
                .unwrap_or_default(),
            sort: self
                .sort
                .as_deref()
                .map(SortMode::parse)
                .unwrap_or_default(),
            page: usize::try_from(page).unwrap_or(1),
            page_size: usize::try_from(page_size).unwrap_or(DEFAULT_PAGE_SIZE),
        }
    }
}

/// Mirrors `parseInt`: optional sign followed by leading digits, anything
/// after them is ignored. Digit runs past `i64` saturate.
fn parse_leading_int(value: &str) -> Option<i64> {
    let trimmed = value.trim();
    let (sign, digits) = match trimmed.strip_prefix('-') {
        Some(rest) => (-1, rest),
        None => (1, trimmed.strip_prefix('+').unwrap_or(trimmed)),
    };
    let end = digits
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(digits.len());
    if end == 0 {
        return None;
    }
    // the run is all digits, so a failed parse can only be an overflow
    Some(sign * digits[..end].parse::<i64>().unwrap_or(i64::MAX))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Pagination {
    pub page: usize,
    pub limit: usize,
    pub total: usize,
    pub pages: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VideoPage {
    pub videos: Vec<VideoRecord>,
    pub pagination: Pagination,
}

/// Runs the full pipeline over a snapshot of the catalog.
pub fn list_videos(
    all: &[VideoRecord],
    query: &ListQuery,
    audience: Audience,
    now: DateTime<Utc>,
) -> VideoPage {
    let sorted = filter_and_sort(all, query, audience, now);
    paginate(sorted, query.page, query.page_size)
}

/// Every step except pagination. The admin table uses this directly to number
/// rows across the whole result set.
pub fn filter_and_sort(
    all: &[VideoRecord],
    query: &ListQuery,
    audience: Audience,
    now: DateTime<Utc>,
) -> Vec<VideoRecord> {
    let term = query.search.trim();
    let searching = term.chars().count() >= MIN_TERM_CHARS;
    let category = query
        .category
        .as_deref()
        .filter(|category| *category != ALL_CATEGORIES);
    let since = now - Duration::days(RECENT_WINDOW_DAYS);

    let mut videos: Vec<VideoRecord> = all
        .iter()
        .filter(|video| audience.includes_unpublished() || video.published)
        .filter(|video| !searching || search_hit(video, term))
        .filter(|video| category.is_none_or(|category| video.category == category))
        .filter(|video| match query.time {
            TimeWindow::Any => true,
            TimeWindow::LastSevenDays => {
                recency_timestamp(video).is_some_and(|instant| instant >= since)
            }
        })
        .cloned()
        .collect();

    sort_videos(&mut videos, query.sort);
    videos
}

fn search_hit(video: &VideoRecord, term: &str) -> bool {
    search::matches(&video.title, term)
        || video
            .tags
            .iter()
            .any(|tag| search::subsequence_match(tag, term))
}

/// `createdAt`, or `updatedAt` when the former is missing or blank.
fn recency_timestamp(video: &VideoRecord) -> Option<DateTime<Utc>> {
    let raw = video
        .created_at
        .as_deref()
        .filter(|value| !value.is_empty())
        .or(video.updated_at.as_deref())?;
    parse_timestamp(raw)
}

/// Stable sort with the comparator picked by `mode`. Equal keys keep their
/// input order.
pub fn sort_videos(videos: &mut [VideoRecord], mode: SortMode) {
    match mode {
        SortMode::Views => videos.sort_by(|a, b| b.views.cmp(&a.views)),
        SortMode::ViewsAsc => videos.sort_by(|a, b| a.views.cmp(&b.views)),
        SortMode::Oldest => videos.sort_by_key(created_millis),
        SortMode::Manual | SortMode::Newest => videos.sort_by(manual_then_recent),
    }
}

fn manual_then_recent(a: &VideoRecord, b: &VideoRecord) -> Ordering {
    // `None` orders below every `Some`, which is exactly "absent = -inf".
    b.order_index
        .cmp(&a.order_index)
        .then_with(|| created_millis(b).cmp(&created_millis(a)))
}

/// Creation time in epoch millis; missing or unparseable values count as 0.
fn created_millis(video: &VideoRecord) -> i64 {
    video
        .created_at
        .as_deref()
        .and_then(parse_timestamp)
        .map(|instant| instant.timestamp_millis())
        .unwrap_or(0)
}

/// Parses the timestamp shapes found in catalog files: RFC 3339, naive
/// date-times (read as UTC) and bare dates.
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(datetime) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(datetime.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Slices one page out of `videos`. Pages past the end are empty, never an
/// error.
pub fn paginate(videos: Vec<VideoRecord>, page: usize, page_size: usize) -> VideoPage {
    let (videos, pagination) = page_slice(videos, page, page_size);
    VideoPage { videos, pagination }
}

/// Pagination over any row type.
pub fn page_slice<T>(items: Vec<T>, page: usize, page_size: usize) -> (Vec<T>, Pagination) {
    let page = page.max(1);
    let page_size = page_size.max(1);
    let total = items.len();
    let start = (page - 1).saturating_mul(page_size);
    let items = items.into_iter().skip(start).take(page_size).collect();

    (
        items,
        Pagination {
            page,
            limit: page_size,
            total,
            pages: total.div_ceil(page_size),
        },
    )
}
