//! Maps a behavior bitmask onto one of a fixed set of parameterized queries
//! over the places store and binds the search parameters.
//!
//! Every row-producing query returns the same eleven columns, read back by
//! [`crate::executor`]: url, title, favicon url, bookmarked, bookmark title,
//! tags, visit count, typed, place id, query type, open-page count.

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use rusqlite::types::Value;

use crate::behavior::Behavior;
use crate::matcher::MatchBehavior;
use crate::model::QueryType;
use crate::places_store::TAGS_FOLDER_ID;

const BOOK_TAG_COLUMNS: &str = "\
EXISTS(SELECT 1 FROM moz_bookmarks b JOIN moz_bookmarks p ON p.id = b.parent \
       WHERE b.fk = h.id AND p.parent <> :parent) AS bookmarked, \
(SELECT title FROM moz_bookmarks WHERE fk = h.id AND title NOTNULL \
 ORDER BY lastModified DESC LIMIT 1) AS btitle, \
(SELECT GROUP_CONCAT(t.title, ',') FROM moz_bookmarks b \
 JOIN moz_bookmarks t ON t.id = +b.parent AND t.parent = :parent \
 WHERE b.fk = h.id) AS tags";

const MATCH_PREDICATE: &str = "\
AUTOCOMPLETE_MATCH(:search_string, h.url, IFNULL(btitle, h.title), tags, \
                   h.visit_count, h.typed, bookmarked, t.open_count, \
                   :match_behavior, :search_behavior)";

/// A SQL condition that narrows the main search to one source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceFilter {
    Visited,
    Typed,
    Bookmarked,
    Tagged,
}

impl SourceFilter {
    const ALL: [(SourceFilter, Behavior); 4] = [
        (SourceFilter::Visited, Behavior::HISTORY),
        (SourceFilter::Typed, Behavior::TYPED),
        (SourceFilter::Bookmarked, Behavior::BOOKMARK),
        (SourceFilter::Tagged, Behavior::TAG),
    ];

    fn sql(self) -> &'static str {
        match self {
            Self::Visited => "h.visit_count > 0",
            Self::Typed => "h.typed = 1",
            Self::Bookmarked => "bookmarked",
            Self::Tagged => "tags NOTNULL",
        }
    }
}

/// Variant of the main history/bookmark query.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SearchQuery {
    Default,
    History,
    Bookmark,
    Tag,
    Typed,
    Filtered(Vec<SourceFilter>),
}

impl SearchQuery {
    /// Dedicated single-source templates win; two or more restricted sources
    /// are AND-composed. Unrestricted behaviors treat sources as alternatives
    /// and use the default query.
    pub fn for_behavior(behavior: Behavior) -> Self {
        if !behavior.contains(Behavior::RESTRICT) {
            return Self::Default;
        }

        let filters: Vec<SourceFilter> = SourceFilter::ALL
            .iter()
            .filter(|(_, flag)| behavior.contains(*flag))
            .map(|(filter, _)| *filter)
            .collect();

        match filters.as_slice() {
            [] => Self::Default,
            [SourceFilter::Tagged] => Self::Tag,
            [SourceFilter::Bookmarked] => Self::Bookmark,
            [SourceFilter::Typed] => Self::Typed,
            [SourceFilter::Visited] => Self::History,
            _ => Self::Filtered(filters),
        }
    }

    fn conditions(&self) -> Vec<SourceFilter> {
        match self {
            Self::Default => Vec::new(),
            Self::History => vec![SourceFilter::Visited],
            Self::Bookmark => vec![SourceFilter::Bookmarked],
            Self::Tag => vec![SourceFilter::Tagged],
            Self::Typed => vec![SourceFilter::Typed],
            Self::Filtered(filters) => filters.clone(),
        }
    }

    pub fn sql(&self) -> String {
        let additional: String = self
            .conditions()
            .iter()
            .map(|filter| format!(" AND {}", filter.sql()))
            .collect();
        format!(
            "SELECT h.url, h.title, f.url, {BOOK_TAG_COLUMNS}, \
                    h.visit_count, h.typed, h.id, :query_type, t.open_count \
             FROM moz_places h \
             LEFT JOIN moz_favicons f ON f.id = h.favicon_id \
             LEFT JOIN moz_openpages_temp t ON t.url = h.url \
             WHERE h.frecency <> 0 AND {MATCH_PREDICATE}{additional} \
             ORDER BY h.frecency DESC, h.id DESC \
             LIMIT :max_results"
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum QueryKind {
    Keyword,
    Adaptive,
    OpenPages,
    Search(SearchQuery),
}

/// A query with its named parameters already bound.
#[derive(Debug, Clone)]
pub struct BoundQuery {
    pub kind: QueryKind,
    pub sql: String,
    pub params: Vec<(&'static str, Value)>,
}

impl BoundQuery {
    pub fn param(&self, name: &str) -> Option<&Value> {
        self.params
            .iter()
            .find(|(param_name, _)| *param_name == name)
            .map(|(_, value)| value)
    }
}

/// Inputs shared by every query of one search pass.
#[derive(Debug, Clone, Copy)]
pub struct QueryContext<'a> {
    pub tokens: &'a [String],
    pub behavior: Behavior,
    pub match_behavior: MatchBehavior,
    pub max_results: usize,
}

impl QueryContext<'_> {
    fn search_string(&self) -> String {
        self.tokens.join(" ")
    }

    fn match_params(&self) -> Vec<(&'static str, Value)> {
        vec![
            (":match_behavior", Value::Integer(self.match_behavior.code())),
            (":search_behavior", Value::Integer(self.behavior.bits() as i64)),
            (":query_type", Value::Integer(QueryType::Filtered.code())),
        ]
    }
}

pub fn bound_search_query(ctx: &QueryContext<'_>) -> BoundQuery {
    let query = SearchQuery::for_behavior(ctx.behavior);
    let mut params = ctx.match_params();
    params.push((":search_string", Value::Text(ctx.search_string())));
    params.push((":max_results", Value::Integer(ctx.max_results as i64)));
    params.push((":parent", Value::Integer(TAGS_FOLDER_ID)));
    BoundQuery {
        sql: query.sql(),
        kind: QueryKind::Search(query),
        params,
    }
}

/// Pages previously picked for inputs starting with `search_string`, ranked by
/// use count with a bonus for an exact input match.
pub fn bound_adaptive_query(ctx: &QueryContext<'_>, search_string: &str) -> BoundQuery {
    let sql = format!(
        "SELECT h.url, h.title, f.url, {BOOK_TAG_COLUMNS}, \
                h.visit_count, h.typed, h.id, :query_type, t.open_count \
         FROM ( \
           SELECT ROUND(MAX(use_count) * (1 + (input = :search_string)), 1) AS rank, place_id \
           FROM moz_inputhistory \
           WHERE input BETWEEN :search_string AND :search_string || X'FFFF' \
           GROUP BY place_id \
         ) AS i \
         JOIN moz_places h ON h.id = i.place_id \
         LEFT JOIN moz_favicons f ON f.id = h.favicon_id \
         LEFT JOIN moz_openpages_temp t ON t.url = h.url \
         WHERE AUTOCOMPLETE_MATCH(NULL, h.url, IFNULL(btitle, h.title), tags, \
                                  h.visit_count, h.typed, bookmarked, t.open_count, \
                                  :match_behavior, :search_behavior) \
         ORDER BY rank DESC, h.frecency DESC"
    );
    let mut params = ctx.match_params();
    params.push((":search_string", Value::Text(search_string.to_string())));
    params.push((":parent", Value::Integer(TAGS_FOLDER_ID)));
    BoundQuery {
        kind: QueryKind::Adaptive,
        sql,
        params,
    }
}

/// Open tabs whose page is not in history, newest registration first.
pub fn bound_open_pages_query(ctx: &QueryContext<'_>) -> BoundQuery {
    let sql = "SELECT t.url, t.url, NULL, NULL, NULL, NULL, NULL, NULL, NULL, \
                      :query_type, t.open_count \
               FROM moz_openpages_temp t \
               LEFT JOIN moz_places h ON h.url = t.url \
               WHERE h.id IS NULL \
                 AND AUTOCOMPLETE_MATCH(:search_string, t.url, t.url, NULL, NULL, NULL, NULL, \
                                        t.open_count, :match_behavior, :search_behavior) \
               ORDER BY t.ROWID DESC \
               LIMIT :max_results"
        .to_string();
    let mut params = ctx.match_params();
    params.push((":search_string", Value::Text(ctx.search_string())));
    params.push((":max_results", Value::Integer(ctx.max_results as i64)));
    BoundQuery {
        kind: QueryKind::OpenPages,
        sql,
        params,
    }
}

/// URI component escaping: alphanumerics and `-_.!~*'()` stay literal.
const URI_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// The first token is looked up as a bookmark keyword; everything the user
/// typed after the first space replaces `%s` in the keyword's URL.
pub fn bound_keyword_query(original_search: &str, tokens: &[String]) -> Option<BoundQuery> {
    let keyword = tokens.first()?;
    let query_string = original_search
        .split_once(' ')
        .map(|(_, rest)| rest)
        .unwrap_or("");
    let encoded = utf8_percent_encode(query_string, URI_COMPONENT)
        .to_string()
        .replace("%20", "+");

    let sql = "SELECT k.search_url, h.title, f.url, 1, k.btitle, NULL, \
                      h.visit_count, h.typed, IFNULL(h.id, k.fk), :query_type, t.open_count \
               FROM ( \
                 SELECT REPLACE(p.url, '%s', :query_string) AS search_url, \
                        b.fk AS fk, b.title AS btitle, p.favicon_id AS favicon_id \
                 FROM moz_keywords kw \
                 JOIN moz_bookmarks b ON b.keyword_id = kw.id \
                 JOIN moz_places p ON p.id = b.fk \
                 WHERE LOWER(kw.keyword) = LOWER(:keyword) \
               ) AS k \
               LEFT JOIN moz_places h ON h.url = k.search_url \
               LEFT JOIN moz_favicons f ON f.id = IFNULL(h.favicon_id, k.favicon_id) \
               LEFT JOIN moz_openpages_temp t ON t.url = k.search_url \
               ORDER BY h.frecency DESC"
        .to_string();

    Some(BoundQuery {
        kind: QueryKind::Keyword,
        sql,
        params: vec![
            (":keyword", Value::Text(keyword.clone())),
            (":query_string", Value::Text(encoded)),
            (":query_type", Value::Integer(QueryType::Keyword.code())),
        ],
    })
}
