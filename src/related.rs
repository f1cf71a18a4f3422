//! "Related videos" suggestions for the watch page.
//!
//! Candidates go through a four stage cascade: title relevance, same category,
//! shared tag, then random fill. A later stage only runs while fewer than
//! [`RELATED_LIMIT`] videos have been picked, so the panel is only empty when
//! there is nothing else in the catalog.

use std::collections::HashSet;

use rand::{Rng, seq::SliceRandom};
use serde::Serialize;

use crate::metadata::VideoRecord;
use crate::search::{MIN_TERM_CHARS, subsequence_match};

pub const RELATED_LIMIT: usize = 4;
const TITLE_PREFIX_CHARS: usize = 10;

const EXACT_SCORE: u32 = 10;
const CONTAINS_SCORE: u32 = 5;
const SUBSEQUENCE_SCORE: u32 = 3;

/// Public projection of a suggested video. Scores and admin fields stay
/// server side.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RelatedVideo {
    pub id: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,
    pub views: u64,
    pub category: String,
    pub tags: Vec<String>,
}

impl From<&VideoRecord> for RelatedVideo {
    fn from(video: &VideoRecord) -> Self {
        Self {
            id: video.id.clone(),
            title: video.title.clone(),
            thumbnail: video.thumbnail.clone(),
            duration: video.duration.clone(),
            views: video.views,
            category: video.category.clone(),
            tags: video.tags.clone(),
        }
    }
}

/// Everything that may be suggested next to `target`: published and not the
/// target itself.
pub fn related_candidates<'a>(target: &VideoRecord, all: &'a [VideoRecord]) -> Vec<&'a VideoRecord> {
    all.iter()
        .filter(|video| video.id != target.id && video.published)
        .collect()
}

/// Picks up to [`RELATED_LIMIT`] suggestions for `target` out of `others`.
///
/// `others` must already exclude the target and unpublished records.
pub fn related_videos<R: Rng + ?Sized>(
    target: &VideoRecord,
    others: &[&VideoRecord],
    rng: &mut R,
) -> Vec<RelatedVideo> {
    let mut picked: Vec<&VideoRecord> = by_title(target, others);
    let mut seen: HashSet<&str> = picked.iter().map(|&video| video.id.as_str()).collect();

    fill(&mut picked, &mut seen, others, |video| {
        video.category == target.category
    });

    if !target.tags.is_empty() {
        fill(&mut picked, &mut seen, others, |video| {
            video.tags.iter().any(|tag| target.tags.contains(tag))
        });
    }

    if picked.len() < RELATED_LIMIT {
        let mut remaining: Vec<&VideoRecord> = others
            .iter()
            .copied()
            .filter(|video| !seen.contains(video.id.as_str()))
            .collect();
        remaining.shuffle(rng);
        picked.extend(remaining.into_iter().take(RELATED_LIMIT - picked.len()));
    }

    picked.into_iter().map(RelatedVideo::from).collect()
}

/// Appends unseen candidates accepted by `keep`, in collection order, until
/// the limit is reached.
fn fill<'a>(
    picked: &mut Vec<&'a VideoRecord>,
    seen: &mut HashSet<&'a str>,
    others: &[&'a VideoRecord],
    keep: impl Fn(&VideoRecord) -> bool,
) {
    for &video in others {
        if picked.len() >= RELATED_LIMIT {
            return;
        }
        if !seen.contains(video.id.as_str()) && keep(video) {
            seen.insert(video.id.as_str());
            picked.push(video);
        }
    }
}

/// Stage one: candidates whose titles share words with the target, best
/// scores first.
fn by_title<'a>(target: &VideoRecord, others: &[&'a VideoRecord]) -> Vec<&'a VideoRecord> {
    let target_title = target.title.to_lowercase();
    let target_words = title_words(&target_title);
    let prefix: String = target_title.chars().take(TITLE_PREFIX_CHARS).collect();

    let mut scored: Vec<(u32, &VideoRecord)> = others
        .iter()
        .copied()
        .filter_map(|video| {
            let title = video.title.to_lowercase();
            let words = title_words(&title);
            let related = target_words
                .iter()
                .any(|ours| words.iter().any(|theirs| words_related(ours, theirs)))
                || subsequence_match(&title, &prefix);
            related.then(|| (title_score(&target_words, &words), video))
        })
        .collect();

    // sort_by is stable, equal scores keep collection order
    scored.sort_by(|a, b| b.0.cmp(&a.0));
    scored
        .into_iter()
        .take(RELATED_LIMIT)
        .map(|(_, video)| video)
        .collect()
}

fn is_separator(c: char) -> bool {
    c.is_whitespace()
        || matches!(
            c,
            '-' | '_' | '.' | ',' | '!' | '@' | '#' | '$' | '%' | '^' | '&' | '*' | '(' | ')'
        )
}

/// Splits an already lowercased title into words of at least two chars.
pub fn title_words(title: &str) -> Vec<&str> {
    title
        .split(is_separator)
        .filter(|word| word.chars().count() >= MIN_TERM_CHARS)
        .collect()
}

fn char_len(value: &str) -> usize {
    value.chars().count()
}

/// Qualification rule: equal words, containment of a word with at least
/// three chars, or an in-order subsequence of a word with at least four.
fn words_related(ours: &str, theirs: &str) -> bool {
    ours == theirs
        || (char_len(ours) >= 3 && theirs.contains(ours))
        || (char_len(theirs) >= 3 && ours.contains(theirs))
        || (char_len(ours) >= 4 && subsequence_match(theirs, ours))
        || (char_len(theirs) >= 4 && subsequence_match(ours, theirs))
}

fn title_score(target_words: &[&str], words: &[&str]) -> u32 {
    let mut score = 0;
    for ours in target_words {
        for theirs in words {
            score += if ours == theirs {
                EXACT_SCORE
            } else if ours.contains(theirs) || theirs.contains(ours) {
                CONTAINS_SCORE
            } else if subsequence_match(ours, theirs) || subsequence_match(theirs, ours) {
                SUBSEQUENCE_SCORE
            } else {
                0
            };
        }
    }
    score
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{SeedableRng, rngs::StdRng};

    fn video(id: &str, title: &str, category: &str) -> VideoRecord {
        VideoRecord {
            id: id.into(),
            title: title.into(),
            embed_urls: vec![],
            thumbnail: Some(format!("/thumbs/{id}.jpg")),
            duration: Some("1:00".into()),
            category: category.into(),
            tags: vec![],
            notes: "internal".into(),
            download_link: None,
            views: 3,
            published: true,
            created_at: None,
            updated_at: None,
            order_index: Some(2),
        }
    }

    fn rng() -> StdRng {
        StdRng::seed_from_u64(7)
    }

    fn related_ids(target: &VideoRecord, all: &[VideoRecord]) -> Vec<String> {
        let others = related_candidates(target, all);
        related_videos(target, &others, &mut rng())
            .into_iter()
            .map(|video| video.id)
            .collect()
    }

    #[test]
    fn cascade_title_then_category_then_random() {
        let target = video("t", "Summer Beach Trip", "travel");
        let all = vec![
            target.clone(),
            video("random", "Random Clip", "misc"),
            video("ski", "Winter Ski", "travel"),
            video("beach", "Beach Trip Part 2", "misc"),
        ];
        assert_eq!(related_ids(&target, &all), vec!["beach", "ski", "random"]);
    }

    #[test]
    fn higher_scores_come_first() {
        let target = video("t", "Cat Video Compilation", "pets");
        let all = vec![
            video("one", "Cat Facts", "pets"),
            video("three", "Cat Video Compilation Two", "pets"),
            video("two", "Cat Video", "pets"),
        ];
        let ids = related_ids(&target, &all);
        assert_eq!(ids, vec!["three", "two", "one"]);
    }

    #[test]
    fn shared_tags_fill_after_category() {
        let mut target = video("t", "Alpha", "news");
        target.tags = vec!["rust".into()];
        let mut tagged = video("tagged", "Zzz", "music");
        tagged.tags = vec!["rust".into()];
        let all = vec![
            video("other", "Qqq", "music"),
            tagged,
            video("same", "Www", "news"),
        ];
        let ids = related_ids(&target, &all);
        assert_eq!(&ids[..2], &["same".to_string(), "tagged".to_string()]);
        assert_eq!(ids.len(), 3);
    }

    #[test]
    fn never_more_than_four() {
        let target = video("t", "Cat", "pets");
        let all: Vec<VideoRecord> = (0..10)
            .map(|i| video(&i.to_string(), &format!("Cat {i}"), "pets"))
            .collect();
        assert_eq!(related_ids(&target, &all).len(), RELATED_LIMIT);
    }

    #[test]
    fn excludes_target_and_unpublished() {
        let target = video("t", "Cat", "pets");
        let mut hidden = video("hidden", "Cat Again", "pets");
        hidden.published = false;
        let all = vec![target.clone(), hidden, video("visible", "Dog", "birds")];
        let ids = related_ids(&target, &all);
        assert_eq!(ids, vec!["visible"]);
    }

    #[test]
    fn empty_only_when_nothing_else_exists() {
        let target = video("t", "Cat", "pets");
        assert!(related_ids(&target, std::slice::from_ref(&target)).is_empty());
        let all = vec![target.clone(), video("x", "Unrelated", "other")];
        assert_eq!(related_ids(&target, &all).len(), 1);
    }

    #[test]
    fn projection_drops_internal_fields() {
        let target = video("t", "Cat", "pets");
        let all = vec![video("x", "Cat Two", "pets")];
        let others = related_candidates(&target, &all);
        let picked = related_videos(&target, &others, &mut rng());
        let value = serde_json::to_value(&picked[0]).unwrap();
        assert_eq!(value["id"], "x");
        assert_eq!(value["views"], 3);
        assert!(value.get("notes").is_none());
        assert!(value.get("orderIndex").is_none());
        assert!(value.get("score").is_none());
    }

    #[test]
    fn title_prefix_subsequence_qualifies() {
        let target = video("t", "abcdefghijkl", "x");
        let candidate = video("c", "a-b-c-d-e-f-g-h-i-j", "y");
        let ranked = by_title(&target, &[&candidate]);
        assert_eq!(ranked.len(), 1);
    }

    #[test]
    fn word_relation_rules() {
        assert!(words_related("trip", "trip"));
        assert!(words_related("cat", "cats"));
        assert!(!words_related("ca", "cab"));
        assert!(words_related("vdeo", "video"));
        assert!(!words_related("vdo", "video"));
    }

    #[test]
    fn title_words_split_on_punctuation() {
        assert_eq!(
            title_words("summer-beach_trip, part 2!"),
            vec!["summer", "beach", "trip", "part"]
        );
    }
}
