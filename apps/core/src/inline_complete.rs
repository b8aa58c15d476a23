//! Inline completion of the text typed in the location bar: either a known
//! host (`moz` -> `mozilla.org/`) or, once a path is being typed, the URL up
//! to its next separator.

use rusqlite::types::ToSql;
use rusqlite::{named_params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::behavior::Behavior;
use crate::matcher::{prefix_len_ignore_case, MatchBehavior};
use crate::places_store::{self, StoreError};
use crate::prefs::Preferences;
use crate::tokenizer::{strip_prefix, unescape_url};

const HOST_QUERY: &str = "
SELECT host || '/', IFNULL(prefix, '') || host || '/'
FROM moz_hosts
WHERE host BETWEEN :search_string AND :search_string || X'FFFF'
  AND frecency <> 0
  AND (:typed_only = 0 OR typed = 1)
ORDER BY frecency DESC
LIMIT 1";

const URL_QUERY: &str = "
SELECT h.url
FROM moz_places h
WHERE h.frecency <> 0
  AND AUTOCOMPLETE_MATCH(:search_string, h.url, NULL, NULL, h.visit_count, h.typed,
                         0, 0, :match_behavior, :search_behavior)
ORDER BY h.frecency DESC, h.id DESC
LIMIT 1";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InlineCompletion {
    /// What the location bar should display, keeping the typed characters.
    pub value: String,
    /// The completed URL including the scheme or `www.` the store knows of.
    pub untrimmed: Option<String>,
}

#[derive(Debug, Clone, Copy)]
pub struct UrlInlineComplete {
    autofill: bool,
    typed_only: bool,
}

impl UrlInlineComplete {
    pub fn new(prefs: &Preferences) -> Self {
        Self {
            autofill: prefs.enabled && prefs.autofill,
            typed_only: prefs.autofill_typed,
        }
    }

    /// `db` must have been prepared with
    /// [`places_store::init_autocomplete_connection`].
    pub fn complete(
        &self,
        db: &Connection,
        search: &str,
    ) -> Result<Option<InlineCompletion>, StoreError> {
        if !self.autofill {
            return Ok(None);
        }
        let original = search.trim();
        if original.is_empty() || original.chars().any(char::is_whitespace) {
            return Ok(None);
        }

        let lowered = original.to_ascii_lowercase();
        let prefix_len = lowered.len() - strip_prefix(&lowered).len();
        let (typed_prefix, typed_rest) = original.split_at(prefix_len);
        let current = lowercase_host(&unescape_url(typed_rest));
        if current.is_empty() || places_store::is_keyword(db, &current)? {
            return Ok(None);
        }

        match current.rfind('/') {
            None => self.complete_host(db, &current, typed_prefix, typed_rest),
            Some(index) if index + 1 < current.len() => {
                self.complete_url(db, &current, typed_prefix, typed_rest)
            }
            Some(_) => Ok(None),
        }
    }

    fn complete_host(
        &self,
        db: &Connection,
        current: &str,
        typed_prefix: &str,
        typed_rest: &str,
    ) -> Result<Option<InlineCompletion>, StoreError> {
        let found: Option<(String, String)> = db
            .prepare_cached(HOST_QUERY)?
            .query_row(
                named_params! {
                    ":search_string": current,
                    ":typed_only": self.typed_only,
                },
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        Ok(found.and_then(|(host, untrimmed)| {
            let matched = prefix_len_ignore_case(&host, current)?;
            let remainder = host.get(matched..)?;
            Some(InlineCompletion {
                value: format!("{typed_prefix}{typed_rest}{remainder}"),
                untrimmed: Some(untrimmed),
            })
        }))
    }

    fn complete_url(
        &self,
        db: &Connection,
        current: &str,
        typed_prefix: &str,
        typed_rest: &str,
    ) -> Result<Option<InlineCompletion>, StoreError> {
        let mut behavior = Behavior::RESTRICT | Behavior::URL | Behavior::HISTORY;
        if self.typed_only {
            behavior |= Behavior::TYPED;
        }
        let match_code = MatchBehavior::BeginningCaseSensitive.code();
        let behavior_bits = behavior.bits() as i64;
        let params: [(&str, &dyn ToSql); 3] = [
            (":search_string", &current),
            (":match_behavior", &match_code),
            (":search_behavior", &behavior_bits),
        ];
        let found: Option<String> = db
            .prepare_cached(URL_QUERY)?
            .query_row(params.as_slice(), |row| row.get(0))
            .optional()?;

        let Some(raw_url) = found else {
            return Ok(None);
        };
        let fixed = unescape_url(strip_prefix(&raw_url));
        let Some(matched) = prefix_len_ignore_case(&fixed, current) else {
            return Ok(None);
        };
        let Some(completed) = cut_at_separator(&fixed, matched) else {
            return Ok(None);
        };
        let Some(remainder) = completed.get(matched..) else {
            return Ok(None);
        };
        let scheme_len = raw_url.len() - strip_prefix(&raw_url).len();

        Ok(Some(InlineCompletion {
            value: format!("{typed_prefix}{typed_rest}{remainder}"),
            untrimmed: Some(format!("{}{completed}", &raw_url[..scheme_len])),
        }))
    }
}

/// Hosts compare lower-cased; paths keep the case the user typed.
fn lowercase_host(text: &str) -> String {
    match text.split_once('/') {
        Some((host, path)) => format!("{}/{path}", host.to_lowercase()),
        None => text.to_lowercase(),
    }
}

/// Cuts `url` at the first `/`, `?` or `#` at or after `from`, keeping a
/// trailing `/`.
fn cut_at_separator(url: &str, from: usize) -> Option<&str> {
    let tail = url.get(from..)?;
    let end = match tail.find(['/', '?', '#']) {
        Some(offset) if tail[offset..].starts_with('/') => from + offset + 1,
        Some(offset) => from + offset,
        None => url.len(),
    };
    url.get(..end)
}

#[cfg(test)]
mod tests {
    use super::{cut_at_separator, lowercase_host};

    #[test]
    fn only_the_host_is_lower_cased() {
        assert_eq!(lowercase_host("MoZilla.ORG"), "mozilla.org");
        assert_eq!(lowercase_host("MoZilla.ORG/en-US/Straẞe"), "mozilla.org/en-US/Straẞe");
    }

    #[test]
    fn cut_keeps_slash_but_not_query() {
        assert_eq!(
            cut_at_separator("mozilla.org/en-US/firefox", 13),
            Some("mozilla.org/en-US/")
        );
        assert_eq!(
            cut_at_separator("mozilla.org/en-US?x=1", 13),
            Some("mozilla.org/en-US")
        );
        assert_eq!(cut_at_separator("mozilla.org/abc", 13), Some("mozilla.org/abc"));
        assert_eq!(cut_at_separator("mozilla.org", 40), None);
    }
}
