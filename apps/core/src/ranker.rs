use std::collections::HashSet;

use url::Url;

use crate::behavior::Behavior;
use crate::model::{
    PlaceRow, QueryType, ResultEntry, ResultStyle, DEFAULT_FAVICON, FAVICON_LINK_PREFIX,
    SWITCH_TAB_PREFIX, TITLE_TAGS_SEPARATOR,
};

/// Turns candidate rows into result entries, in arrival order, skipping rows
/// whose place or URL was already emitted.
#[derive(Debug)]
pub struct ResultRanker {
    max_results: usize,
    behavior: Behavior,
    enable_actions: bool,
    used_place_ids: HashSet<i64>,
    used_urls: HashSet<String>,
    entries: Vec<ResultEntry>,
}

impl ResultRanker {
    pub fn new(max_results: usize, behavior: Behavior, enable_actions: bool) -> Self {
        Self {
            max_results,
            behavior,
            enable_actions,
            used_place_ids: HashSet::new(),
            used_urls: HashSet::new(),
            entries: Vec::new(),
        }
    }

    /// Returns true when the row produced a new entry.
    pub fn push(&mut self, row: &PlaceRow) -> bool {
        if self.is_full() {
            return false;
        }
        if row.place_id.is_some_and(|id| self.used_place_ids.contains(&id))
            || self.used_urls.contains(&row.url)
        {
            return false;
        }

        let entry = build_entry(row, self.behavior, self.enable_actions);
        if self.used_urls.contains(&entry.url) {
            return false;
        }

        if let Some(id) = row.place_id {
            self.used_place_ids.insert(id);
        }
        self.used_urls.insert(row.url.clone());
        self.used_urls.insert(entry.url.clone());
        self.entries.push(entry);
        true
    }

    pub fn is_full(&self) -> bool {
        self.entries.len() >= self.max_results
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[ResultEntry] {
        &self.entries
    }
}

fn show_tags(behavior: Behavior) -> bool {
    !(behavior.contains(Behavior::HISTORY)
        && !behavior.contains(Behavior::BOOKMARK)
        && !behavior.contains(Behavior::TAG))
}

pub fn build_entry(row: &PlaceRow, behavior: Behavior, enable_actions: bool) -> ResultEntry {
    let switch_to_tab =
        enable_actions && row.open_count > 0 && behavior.contains(Behavior::OPENPAGE);
    let url = if switch_to_tab {
        format!("{SWITCH_TAB_PREFIX}{}", row.url)
    } else {
        row.url.clone()
    };

    let mut title = row
        .bookmark_title
        .as_deref()
        .filter(|title| !title.is_empty())
        .or(row.title.as_deref())
        .unwrap_or("")
        .to_string();

    let style = if row.query_type == QueryType::Keyword {
        title = Url::parse(&row.url)
            .ok()
            .and_then(|parsed| parsed.host_str().map(str::to_string))
            .unwrap_or_else(|| row.url.clone());
        ResultStyle::Keyword
    } else if !show_tags(behavior) {
        ResultStyle::Favicon
    } else if let Some(tags) = row.tags.as_deref().filter(|tags| !tags.is_empty()) {
        title = format!("{title}{TITLE_TAGS_SEPARATOR}{tags}");
        ResultStyle::Tag
    } else if row.bookmarked {
        ResultStyle::Bookmark
    } else {
        ResultStyle::Favicon
    };

    let favicon = row
        .favicon_url
        .as_deref()
        .filter(|favicon| !favicon.is_empty())
        .map(|favicon| format!("{FAVICON_LINK_PREFIX}{favicon}"))
        .unwrap_or_else(|| DEFAULT_FAVICON.to_string());

    ResultEntry {
        url,
        title,
        favicon,
        style: if switch_to_tab {
            format!("action {style}")
        } else {
            style.to_string()
        },
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    const DEFAULT: Behavior = Behavior::from_bits(
        Behavior::HISTORY.bits() | Behavior::BOOKMARK.bits() | Behavior::OPENPAGE.bits(),
    );

    #[test]
    fn duplicate_place_ids_keep_the_first_row() {
        let mut ranker = ResultRanker::new(12, DEFAULT, false);
        assert!(ranker.push(&PlaceRow::new(Some(1), "http://a.example/", "Adaptive")));
        assert!(!ranker.push(&PlaceRow::new(Some(1), "http://a.example/", "Main")));
        assert_eq!(ranker.len(), 1);
        assert_eq!(ranker.entries()[0].title, "Adaptive");
    }

    #[test]
    fn duplicate_urls_without_place_are_rejected() {
        let mut ranker = ResultRanker::new(12, DEFAULT, false);
        assert!(ranker.push(&PlaceRow::new(None, "http://tab.example/", "")));
        assert!(!ranker.push(&PlaceRow::new(None, "http://tab.example/", "")));
    }

    #[test]
    fn cap_limits_entries() {
        let mut ranker = ResultRanker::new(2, DEFAULT, false);
        for id in 0..5 {
            ranker.push(&PlaceRow::new(Some(id), &format!("http://{id}.example/"), ""));
        }
        assert_eq!(ranker.len(), 2);
        assert!(ranker.is_full());
    }

    #[test]
    fn bookmark_title_wins_and_tags_are_appended() {
        let row = PlaceRow::new(Some(1), "http://rust-lang.org/", "Rust")
            .with_bookmark(Some("Rust Language"))
            .with_tags("lang,systems")
            .with_favicon("http://rust-lang.org/favicon.ico");
        let entry = build_entry(&row, DEFAULT, false);
        assert_eq!(entry.title, "Rust Language \u{2013} lang,systems");
        assert_eq!(entry.style, "tag");
        assert_eq!(entry.favicon, "moz-anno:favicon:http://rust-lang.org/favicon.ico");
    }

    #[test]
    fn history_only_behavior_hides_tags() {
        let row = PlaceRow::new(Some(1), "http://rust-lang.org/", "Rust")
            .with_bookmark(None)
            .with_tags("lang");
        let entry = build_entry(&row, Behavior::HISTORY, false);
        assert_eq!(entry.title, "Rust");
        assert_eq!(entry.style, "favicon");
        assert_eq!(entry.favicon, DEFAULT_FAVICON);
    }

    #[test]
    fn open_pages_switch_to_tab_only_with_actions() {
        let row = PlaceRow::new(Some(1), "http://news.example/", "News")
            .with_bookmark(None)
            .with_open_count(1);

        let entry = build_entry(&row, DEFAULT, true);
        assert_eq!(entry.url, "moz-action:switchtab,http://news.example/");
        assert_eq!(entry.style, "action bookmark");

        let entry = build_entry(&row, DEFAULT, false);
        assert_eq!(entry.url, "http://news.example/");
        assert_eq!(entry.style, "bookmark");
    }

    #[test]
    fn keyword_rows_show_the_host() {
        let row = PlaceRow::new(Some(3), "http://en.wikipedia.org/wiki/Rust", "")
            .with_bookmark(Some("Wikipedia"))
            .with_query_type(QueryType::Keyword);
        let entry = build_entry(&row, DEFAULT, false);
        assert_eq!(entry.title, "en.wikipedia.org");
        assert_eq!(entry.style, "keyword");
    }
}
