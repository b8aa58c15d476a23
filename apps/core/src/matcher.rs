//! The `AUTOCOMPLETE_MATCH` predicate evaluated by the places store for every
//! candidate page.

use rusqlite::functions::{Context, FunctionFlags};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::behavior::Behavior;
use crate::tokenizer::{strip_prefix, unescape_url};

pub const MATCH_FUNCTION_NAME: &str = "autocomplete_match";
const MATCH_FUNCTION_ARGS: i32 = 10;

/// How a search token has to line up with the candidate text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchBehavior {
    Anywhere,
    BoundaryAnywhere,
    Boundary,
    Beginning,
    BeginningCaseSensitive,
}

impl MatchBehavior {
    pub fn code(self) -> i64 {
        match self {
            Self::Anywhere => 0,
            Self::BoundaryAnywhere => 1,
            Self::Boundary => 2,
            Self::Beginning => 3,
            Self::BeginningCaseSensitive => 4,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(Self::Anywhere),
            1 => Some(Self::BoundaryAnywhere),
            2 => Some(Self::Boundary),
            3 => Some(Self::Beginning),
            4 => Some(Self::BeginningCaseSensitive),
            _ => None,
        }
    }

    fn search_fn(self) -> fn(&str, &str) -> bool {
        match self {
            Self::Anywhere => find_anywhere,
            Self::BoundaryAnywhere | Self::Boundary => find_on_boundary,
            Self::Beginning => find_beginning,
            Self::BeginningCaseSensitive => find_beginning_case_sensitive,
        }
    }
}

/// Arguments of one `AUTOCOMPLETE_MATCH` call.
#[derive(Debug, Clone, Default)]
pub struct MatchInput<'a> {
    pub search: Option<&'a str>,
    pub url: &'a str,
    pub title: Option<&'a str>,
    pub tags: Option<&'a str>,
    pub visit_count: i64,
    pub typed: bool,
    pub bookmarked: bool,
    pub open_count: i64,
}

pub fn autocomplete_match(
    input: &MatchInput<'_>,
    match_behavior: MatchBehavior,
    behavior: Behavior,
) -> bool {
    if !matches_sources(input, behavior) {
        return false;
    }

    let search = input.search.unwrap_or("");
    if !behavior.contains(Behavior::JAVASCRIPT)
        && !search.starts_with("javascript:")
        && input.url.starts_with("javascript:")
    {
        return false;
    }

    let fixed_url = fixup_url(input.url);
    let title = input.title.unwrap_or("");
    let tags = input.tags.unwrap_or("");
    let search_fn = match_behavior.search_fn();
    let want_title = behavior.contains(Behavior::TITLE);
    let want_url = behavior.contains(Behavior::URL);

    search.split_whitespace().all(|token| {
        let in_title = || search_fn(token, title) || search_fn(token, tags);
        let in_url = || search_fn(token, &fixed_url);
        match (want_title, want_url) {
            (true, true) => in_title() && in_url(),
            (true, false) => in_title(),
            (false, true) => in_url(),
            (false, false) => in_title() || in_url(),
        }
    })
}

fn matches_sources(input: &MatchInput<'_>, behavior: Behavior) -> bool {
    let checks = [
        (Behavior::HISTORY, input.visit_count > 0),
        (Behavior::TYPED, input.typed),
        (Behavior::BOOKMARK, input.bookmarked),
        (Behavior::TAG, input.tags.is_some()),
        (Behavior::OPENPAGE, input.open_count > 0),
    ];

    if behavior.contains(Behavior::RESTRICT) {
        checks
            .iter()
            .all(|(flag, satisfied)| !behavior.contains(*flag) || *satisfied)
    } else {
        checks
            .iter()
            .any(|(flag, satisfied)| behavior.contains(*flag) && *satisfied)
    }
}

fn fixup_url(url: &str) -> String {
    let unescaped = unescape_url(url);
    strip_prefix(&unescaped).to_string()
}

fn chars_eq_ignore_case(a: char, b: char) -> bool {
    a == b || a.to_lowercase().eq(b.to_lowercase())
}

fn starts_with_ignore_case(source: &[char], token: &[char]) -> bool {
    source.len() >= token.len()
        && source
            .iter()
            .zip(token)
            .all(|(s, t)| chars_eq_ignore_case(*s, *t))
}

/// Byte length of the prefix of `source` that matches `token` ignoring case,
/// or `None` when `source` does not start with `token`.
pub fn prefix_len_ignore_case(source: &str, token: &str) -> Option<usize> {
    let mut source_chars = source.char_indices();
    for expected in token.chars() {
        let (_, actual) = source_chars.next()?;
        if !chars_eq_ignore_case(actual, expected) {
            return None;
        }
    }
    Some(source_chars.next().map_or(source.len(), |(index, _)| index))
}

pub fn find_anywhere(token: &str, source: &str) -> bool {
    let token: Vec<char> = token.chars().collect();
    let source: Vec<char> = source.chars().collect();
    if token.is_empty() {
        return true;
    }
    (0..source.len()).any(|start| starts_with_ignore_case(&source[start..], &token))
}

/// Matches the token at the start of the source or at any word boundary. A
/// boundary sits before any character that is not a lowercase ASCII letter
/// and after any such character.
pub fn find_on_boundary(token: &str, source: &str) -> bool {
    let source: Vec<char> = source.chars().collect();
    if source.is_empty() {
        return false;
    }
    let token: Vec<char> = token.chars().collect();

    (0..source.len())
        .filter(|&index| {
            index == 0
                || !source[index - 1].is_ascii_lowercase()
                || !source[index].is_ascii_lowercase()
        })
        .any(|start| starts_with_ignore_case(&source[start..], &token))
}

pub fn find_beginning(token: &str, source: &str) -> bool {
    let token: Vec<char> = token.chars().collect();
    let source: Vec<char> = source.chars().collect();
    starts_with_ignore_case(&source, &token)
}

pub fn find_beginning_case_sensitive(token: &str, source: &str) -> bool {
    source.starts_with(token)
}

/// Registers `AUTOCOMPLETE_MATCH(search, url, title, tags, visit_count, typed,
/// bookmarked, open_count, match_behavior, search_behavior)` on `db`.
pub fn register(db: &Connection) -> Result<(), rusqlite::Error> {
    db.create_scalar_function(
        MATCH_FUNCTION_NAME,
        MATCH_FUNCTION_ARGS,
        FunctionFlags::SQLITE_UTF8,
        evaluate,
    )
}

fn evaluate(ctx: &Context<'_>) -> Result<bool, rusqlite::Error> {
    let search: Option<String> = ctx.get(0)?;
    let url: Option<String> = ctx.get(1)?;
    let title: Option<String> = ctx.get(2)?;
    let tags: Option<String> = ctx.get(3)?;
    let visit_count: Option<i64> = ctx.get(4)?;
    let typed: Option<i64> = ctx.get(5)?;
    let bookmarked: Option<i64> = ctx.get(6)?;
    let open_count: Option<i64> = ctx.get(7)?;
    let match_code: Option<i64> = ctx.get(8)?;
    let behavior_bits: Option<i64> = ctx.get(9)?;

    let Some(url) = url else {
        return Ok(false);
    };
    let match_behavior = match_code
        .and_then(MatchBehavior::from_code)
        .unwrap_or(MatchBehavior::BoundaryAnywhere);
    let behavior = Behavior::from_bits(behavior_bits.unwrap_or(0).max(0) as u32);

    let input = MatchInput {
        search: search.as_deref(),
        url: &url,
        title: title.as_deref(),
        tags: tags.as_deref(),
        visit_count: visit_count.unwrap_or(0),
        typed: typed.unwrap_or(0) != 0,
        bookmarked: bookmarked.unwrap_or(0) != 0,
        open_count: open_count.unwrap_or(0),
    };
    Ok(autocomplete_match(&input, match_behavior, behavior))
}
