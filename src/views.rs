//! View models: what a listing card, a detail page or a chapter row shows.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

pub const UNKNOWN_TITLE: &str = "Unknown Title";
pub const NO_DESCRIPTION: &str = "No description available";
pub const NO_VOLUME: &str = "Chapters";
const SHORT_DESCRIPTION_CHARS: usize = 100;
const NEW_CHAPTER_DAYS: i64 = 7;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MangaSummary {
    pub id: String,
    pub title: String,
    pub description: String,
    pub alt_titles: Vec<String>,
    pub tags: Vec<String>,
    pub status: String,
    pub demographic: String,
    pub year: Option<u32>,
    pub cover_url: Option<String>,
}

impl MangaSummary {
    /// Card blurb: the first 100 characters, ellipsised.
    pub fn short_description(&self) -> String {
        short_text(&self.description, SHORT_DESCRIPTION_CHARS)
    }
}

pub fn short_text(text: &str, max_chars: usize) -> String {
    if text.chars().count() > max_chars {
        let cut: String = text.chars().take(max_chars).collect();
        format!("{cut}...")
    } else {
        text.to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChapterSummary {
    pub id: String,
    /// Chapter number as published, "N/A" when the uploader left it blank.
    pub number: String,
    pub title: String,
    pub volume: Option<String>,
    pub pages: u32,
    pub published_at: Option<DateTime<Utc>>,
}

impl ChapterSummary {
    pub fn is_new_at(&self, now: DateTime<Utc>) -> bool {
        self.published_at
            .map(|p| p > now - Duration::days(NEW_CHAPTER_DAYS))
            .unwrap_or(false)
    }

    pub fn is_new(&self) -> bool {
        self.is_new_at(Utc::now())
    }

    pub fn publish_date(&self) -> String {
        self.published_at
            .map(|p| p.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| "Unknown date".to_string())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct VolumeGroup {
    pub label: String,
    pub chapters: Vec<ChapterSummary>,
}

/// Group a feed by volume. Numbered volumes come first in numeric order, the
/// volume-less group ("Chapters") last. Chapter order inside a group is kept.
pub fn group_by_volume(chapters: &[ChapterSummary]) -> Vec<VolumeGroup> {
    let mut groups: Vec<VolumeGroup> = Vec::new();
    for ch in chapters {
        let label = ch
            .volume
            .as_deref()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or(NO_VOLUME);
        match groups.iter_mut().find(|g| g.label == label) {
            Some(g) => g.chapters.push(ch.clone()),
            None => groups.push(VolumeGroup { label: label.to_string(), chapters: vec![ch.clone()] }),
        }
    }
    groups.sort_by(|a, b| volume_rank(&a.label).total_cmp(&volume_rank(&b.label)));
    groups
}

fn volume_rank(label: &str) -> f64 {
    if label == NO_VOLUME {
        return f64::INFINITY;
    }
    // Unparseable labels sort just before the volume-less group.
    label.trim().parse::<f64>().unwrap_or(f64::MAX)
}
