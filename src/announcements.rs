//! Short-lived site announcements shown in the public ticker.

use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use thiserror::Error;

use crate::metadata::AnnouncementRecord;

pub const MAX_MESSAGE_CHARS: usize = 500;
pub const MAX_LIFETIME_DAYS: i64 = 365;

#[derive(Debug, Error, PartialEq)]
pub enum AnnouncementError {
    #[error("message is required")]
    EmptyMessage,
    #[error("message must be at most {MAX_MESSAGE_CHARS} characters")]
    MessageTooLong,
    #[error("duration must be a positive number")]
    InvalidDuration,
    #[error("unknown duration unit `{0}`")]
    UnknownUnit(String),
    #[error("announcement not found")]
    NotFound,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DurationUnit {
    Minutes,
    #[default]
    Hours,
    Days,
    Weeks,
}

impl DurationUnit {
    fn seconds(self) -> f64 {
        match self {
            Self::Minutes => 60.0,
            Self::Hours => 3_600.0,
            Self::Days => 86_400.0,
            Self::Weeks => 604_800.0,
        }
    }
}

impl FromStr for DurationUnit {
    type Err = AnnouncementError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "minute" | "minutes" => Ok(Self::Minutes),
            "" | "hour" | "hours" => Ok(Self::Hours),
            "day" | "days" => Ok(Self::Days),
            "week" | "weeks" => Ok(Self::Weeks),
            other => Err(AnnouncementError::UnknownUnit(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAnnouncement {
    pub message: String,
    pub duration_value: f64,
    #[serde(default)]
    pub duration_unit: Option<String>,
}

/// Millisecond clock ids, bumped past any id already in `existing`.
fn next_announcement_id(existing: &[AnnouncementRecord], now: DateTime<Utc>) -> String {
    let mut candidate = now.timestamp_millis();
    while existing.iter().any(|item| item.id == candidate.to_string()) {
        candidate += 1;
    }
    candidate.to_string()
}

/// Validates `input` and computes its expiry, capped at one year. The id is
/// unique among `existing`.
pub fn create_announcement(
    existing: &[AnnouncementRecord],
    input: &NewAnnouncement,
    now: DateTime<Utc>,
) -> Result<AnnouncementRecord, AnnouncementError> {
    let message = input.message.trim();
    if message.is_empty() {
        return Err(AnnouncementError::EmptyMessage);
    }
    if message.chars().count() > MAX_MESSAGE_CHARS {
        return Err(AnnouncementError::MessageTooLong);
    }
    if !input.duration_value.is_finite() || input.duration_value <= 0.0 {
        return Err(AnnouncementError::InvalidDuration);
    }
    let unit: DurationUnit = input.duration_unit.as_deref().unwrap_or_default().parse()?;

    let cap = Duration::days(MAX_LIFETIME_DAYS);
    let seconds = input.duration_value * unit.seconds();
    let lifetime = if seconds >= cap.num_seconds() as f64 {
        cap
    } else {
        Duration::milliseconds((seconds * 1_000.0).round() as i64)
    };
    if lifetime <= Duration::zero() {
        return Err(AnnouncementError::InvalidDuration);
    }

    Ok(AnnouncementRecord {
        id: next_announcement_id(existing, now),
        message: message.to_string(),
        created_at: now,
        expires_at: now + lifetime,
    })
}

/// Unexpired announcements, newest first.
pub fn active_announcements(
    announcements: &[AnnouncementRecord],
    now: DateTime<Utc>,
) -> Vec<AnnouncementRecord> {
    let mut active: Vec<AnnouncementRecord> = announcements
        .iter()
        .filter(|announcement| announcement.expires_at > now)
        .cloned()
        .collect();
    active.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    active
}

/// Drops expired entries in place and returns how many were removed.
pub fn purge_expired(announcements: &mut Vec<AnnouncementRecord>, now: DateTime<Utc>) -> usize {
    let before = announcements.len();
    announcements.retain(|announcement| announcement.expires_at > now);
    before - announcements.len()
}

pub fn delete_announcement(
    announcements: &mut Vec<AnnouncementRecord>,
    id: &str,
) -> Result<AnnouncementRecord, AnnouncementError> {
    let index = announcements
        .iter()
        .position(|announcement| announcement.id == id)
        .ok_or(AnnouncementError::NotFound)?;
    Ok(announcements.remove(index))
}
