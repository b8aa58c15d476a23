use std::fmt;

use serde::{Deserialize, Serialize};

pub const DEFAULT_FAVICON: &str = "chrome://mozapps/skin/places/defaultFavicon.png";
pub const FAVICON_LINK_PREFIX: &str = "moz-anno:favicon:";
pub const SWITCH_TAB_PREFIX: &str = "moz-action:switchtab,";
pub const TITLE_TAGS_SEPARATOR: &str = " \u{2013} ";

/// Which kind of query produced a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryType {
    Keyword,
    Filtered,
}

impl QueryType {
    pub fn code(self) -> i64 {
        match self {
            Self::Keyword => 0,
            Self::Filtered => 1,
        }
    }

    pub fn from_code(code: i64) -> Self {
        if code == 0 {
            Self::Keyword
        } else {
            Self::Filtered
        }
    }
}

/// One candidate produced by the places store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaceRow {
    pub url: String,
    pub title: Option<String>,
    pub favicon_url: Option<String>,
    pub bookmarked: bool,
    pub bookmark_title: Option<String>,
    pub tags: Option<String>,
    pub visit_count: i64,
    pub typed: bool,
    pub place_id: Option<i64>,
    pub query_type: QueryType,
    pub open_count: i64,
}

impl PlaceRow {
    pub fn new(place_id: Option<i64>, url: &str, title: &str) -> Self {
        Self {
            url: url.to_string(),
            title: (!title.is_empty()).then(|| title.to_string()),
            favicon_url: None,
            bookmarked: false,
            bookmark_title: None,
            tags: None,
            visit_count: 0,
            typed: false,
            place_id,
            query_type: QueryType::Filtered,
            open_count: 0,
        }
    }

    pub fn with_bookmark(mut self, title: Option<&str>) -> Self {
        self.bookmarked = true;
        self.bookmark_title = title.map(str::to_string);
        self
    }

    pub fn with_tags(mut self, tags: &str) -> Self {
        self.tags = Some(tags.to_string());
        self
    }

    pub fn with_open_count(mut self, open_count: i64) -> Self {
        self.open_count = open_count;
        self
    }

    pub fn with_query_type(mut self, query_type: QueryType) -> Self {
        self.query_type = query_type;
        self
    }

    pub fn with_favicon(mut self, favicon_url: &str) -> Self {
        self.favicon_url = Some(favicon_url.to_string());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultStyle {
    Keyword,
    Tag,
    Bookmark,
    Favicon,
}

impl ResultStyle {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Keyword => "keyword",
            Self::Tag => "tag",
            Self::Bookmark => "bookmark",
            Self::Favicon => "favicon",
        }
    }
}

impl fmt::Display for ResultStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultEntry {
    pub url: String,
    pub title: String,
    pub favicon: String,
    pub style: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchStatus {
    Success,
    NoMatch,
    SuccessOngoing,
    NoMatchOngoing,
}

impl SearchStatus {
    pub fn for_matches(has_matches: bool, ongoing: bool) -> Self {
        match (has_matches, ongoing) {
            (true, false) => Self::Success,
            (false, false) => Self::NoMatch,
            (true, true) => Self::SuccessOngoing,
            (false, true) => Self::NoMatchOngoing,
        }
    }

    pub fn is_ongoing(self) -> bool {
        matches!(self, Self::SuccessOngoing | Self::NoMatchOngoing)
    }
}

/// The ordered matches of one search as handed to listeners.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoCompleteResult {
    pub search_string: String,
    pub status: SearchStatus,
    pub entries: Vec<ResultEntry>,
}

impl AutoCompleteResult {
    pub fn no_match(search_string: &str) -> Self {
        Self {
            search_string: search_string.to_string(),
            status: SearchStatus::NoMatch,
            entries: Vec::new(),
        }
    }

    pub fn match_count(&self) -> usize {
        self.entries.len()
    }
}

/// A page to seed into the places store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaceRecord {
    pub url: String,
    pub title: Option<String>,
    pub visit_count: i64,
    pub typed: bool,
    pub frecency: i64,
    pub favicon_url: Option<String>,
}

impl PlaceRecord {
    pub fn new(url: &str, title: &str) -> Self {
        Self {
            url: url.to_string(),
            title: (!title.is_empty()).then(|| title.to_string()),
            visit_count: 0,
            typed: false,
            frecency: -1,
            favicon_url: None,
        }
    }

    pub fn with_visits(mut self, visit_count: i64, frecency: i64) -> Self {
        self.visit_count = visit_count;
        self.frecency = frecency;
        self
    }

    pub fn typed(mut self) -> Self {
        self.typed = true;
        self
    }

    pub fn with_favicon(mut self, favicon_url: &str) -> Self {
        self.favicon_url = Some(favicon_url.to_string());
        self
    }
}
