//! Paged chapter reading state.

use crate::views::ChapterSummary;

#[derive(Debug, Clone, PartialEq)]
pub struct ReaderSession {
    pub chapter_id: String,
    pages: Vec<String>,
    index: usize,
    pub prev_chapter: Option<String>,
    pub next_chapter: Option<String>,
}

impl ReaderSession {
    pub fn new(chapter_id: impl Into<String>, pages: Vec<String>) -> Self {
        Self { chapter_id: chapter_id.into(), pages, index: 0, prev_chapter: None, next_chapter: None }
    }

    /// Pick the neighbouring chapters out of an ordered feed.
    pub fn with_neighbours(mut self, feed: &[ChapterSummary]) -> Self {
        if let Some(pos) = feed.iter().position(|c| c.id == self.chapter_id) {
            self.prev_chapter = pos.checked_sub(1).map(|p| feed[p].id.clone());
            self.next_chapter = feed.get(pos + 1).map(|c| c.id.clone());
        }
        self
    }

    /// Start at a saved 0-based index, clamped to the chapter.
    pub fn resume_at(mut self, index: usize) -> Self {
        self.index = index.min(self.pages.len().saturating_sub(1));
        self
    }

    pub fn pages(&self) -> &[String] { &self.pages }
    pub fn len(&self) -> usize { self.pages.len() }
    pub fn is_empty(&self) -> bool { self.pages.is_empty() }
    pub fn index(&self) -> usize { self.index }

    pub fn current(&self) -> Option<&str> {
        self.pages.get(self.index).map(String::as_str)
    }

    pub fn is_last(&self) -> bool {
        self.index + 1 >= self.pages.len()
    }

    /// Advance one page; `None` at the end of the chapter.
    pub fn next(&mut self) -> Option<&str> {
        if self.is_last() {
            return None;
        }
        self.index += 1;
        self.current()
    }

    pub fn prev(&mut self) -> Option<&str> {
        if self.index == 0 {
            return None;
        }
        self.index -= 1;
        self.current()
    }

    pub fn first(&mut self) -> Option<&str> {
        self.index = 0;
        self.current()
    }

    pub fn last(&mut self) -> Option<&str> {
        self.index = self.pages.len().saturating_sub(1);
        self.current()
    }

    /// Jump to a 1-based page number.
    pub fn goto(&mut self, page: usize) -> Option<&str> {
        if page == 0 || page > self.pages.len() {
            return None;
        }
        self.index = page - 1;
        self.current()
    }

    /// "3 / 20"
    pub fn position(&self) -> String {
        if self.pages.is_empty() {
            return "0 / 0".to_string();
        }
        format!("{} / {}", self.index + 1, self.pages.len())
    }
}
