use std::collections::BTreeMap;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use crate::behavior::Behavior;
use crate::matcher::MatchBehavior;

pub const PREF_NAMESPACE: &str = "browser.urlbar.";

pub const DEFAULT_MAX_RICH_RESULTS: usize = 12;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PrefValue {
    Bool(bool),
    Int(i64),
    String(String),
}

#[derive(Default)]
struct BranchState {
    values: BTreeMap<String, PrefValue>,
    observers: Vec<Sender<String>>,
}

/// Shared preference store under the `browser.urlbar.` namespace. Clones share
/// the same values; every write is announced to subscribers by pref name.
#[derive(Clone, Default)]
pub struct PrefBranch {
    state: Arc<Mutex<BranchState>>,
}

impl PrefBranch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<PrefValue> {
        let state = self.state.lock().ok()?;
        state.values.get(&full_name(name)).cloned()
    }

    pub fn get_bool(&self, name: &str) -> Option<bool> {
        match self.get(name)? {
            PrefValue::Bool(value) => Some(value),
            _ => None,
        }
    }

    pub fn get_int(&self, name: &str) -> Option<i64> {
        match self.get(name)? {
            PrefValue::Int(value) => Some(value),
            _ => None,
        }
    }

    pub fn get_string(&self, name: &str) -> Option<String> {
        match self.get(name)? {
            PrefValue::String(value) => Some(value),
            _ => None,
        }
    }

    pub fn set(&self, name: &str, value: PrefValue) {
        let key = full_name(name);
        let Ok(mut state) = self.state.lock() else {
            return;
        };
        if state.values.get(&key) == Some(&value) {
            return;
        }
        state.values.insert(key.clone(), value);
        state
            .observers
            .retain(|observer| observer.send(key.clone()).is_ok());
    }

    pub fn set_bool(&self, name: &str, value: bool) {
        self.set(name, PrefValue::Bool(value));
    }

    pub fn set_int(&self, name: &str, value: i64) {
        self.set(name, PrefValue::Int(value));
    }

    pub fn set_string(&self, name: &str, value: &str) {
        self.set(name, PrefValue::String(value.to_string()));
    }

    /// Returns a receiver that gets the full name of every pref changed after
    /// this call.
    pub fn subscribe(&self) -> Receiver<String> {
        let (tx, rx) = mpsc::channel();
        if let Ok(mut state) = self.state.lock() {
            state.observers.push(tx);
        }
        rx
    }
}

fn full_name(name: &str) -> String {
    if name.starts_with(PREF_NAMESPACE) {
        name.to_string()
    } else {
        format!("{PREF_NAMESPACE}{name}")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestrictTokens {
    pub history: String,
    pub bookmark: String,
    pub tag: String,
    pub openpage: String,
    pub typed: String,
    pub title: String,
    pub url: String,
}

impl Default for RestrictTokens {
    fn default() -> Self {
        Self {
            history: "^".to_string(),
            bookmark: "*".to_string(),
            tag: "+".to_string(),
            openpage: "%".to_string(),
            typed: "~".to_string(),
            title: "#".to_string(),
            url: "@".to_string(),
        }
    }
}

/// Snapshot of the autocomplete preferences with defaults applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Preferences {
    pub enabled: bool,
    pub autofill: bool,
    pub autofill_typed: bool,
    pub suggest_history: bool,
    pub suggest_bookmark: bool,
    pub suggest_openpage: bool,
    pub suggest_history_only_typed: bool,
    pub match_behavior: MatchBehavior,
    pub filter_javascript: bool,
    pub max_rich_results: usize,
    pub restrict_tokens: RestrictTokens,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            enabled: true,
            autofill: true,
            autofill_typed: true,
            suggest_history: true,
            suggest_bookmark: true,
            suggest_openpage: true,
            suggest_history_only_typed: false,
            match_behavior: MatchBehavior::BoundaryAnywhere,
            filter_javascript: true,
            max_rich_results: DEFAULT_MAX_RICH_RESULTS,
            restrict_tokens: RestrictTokens::default(),
        }
    }
}

impl Preferences {
    /// Reads every pref from `branch`. Missing or malformed values fall back to
    /// their defaults.
    pub fn load(branch: &PrefBranch) -> Self {
        let defaults = Self::default();
        let bool_pref = |name: &str, default: bool| branch.get_bool(name).unwrap_or(default);
        let token_pref = |name: &str, default: &str| {
            branch
                .get_string(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
                .unwrap_or_else(|| default.to_string())
        };

        let match_behavior = match branch.get_int("matchBehavior").and_then(MatchBehavior::from_code) {
            Some(
                behavior @ (MatchBehavior::Anywhere
                | MatchBehavior::Boundary
                | MatchBehavior::Beginning),
            ) => behavior,
            _ => MatchBehavior::BoundaryAnywhere,
        };

        let max_rich_results = branch
            .get_int("maxRichResults")
            .filter(|value| *value > 0)
            .map(|value| value as usize)
            .unwrap_or(defaults.max_rich_results);

        let defaults_tokens = &defaults.restrict_tokens;
        let restrict_tokens = RestrictTokens {
            history: token_pref("restrict.history", &defaults_tokens.history),
            bookmark: token_pref("restrict.bookmark", &defaults_tokens.bookmark),
            tag: token_pref("restrict.tag", &defaults_tokens.tag),
            openpage: token_pref("restrict.openpage", &defaults_tokens.openpage),
            typed: token_pref("restrict.typed", &defaults_tokens.typed),
            title: token_pref("match.title", &defaults_tokens.title),
            url: token_pref("match.url", &defaults_tokens.url),
        };

        let mut prefs = Self {
            enabled: bool_pref("autocomplete.enabled", defaults.enabled),
            autofill: bool_pref("autoFill", defaults.autofill),
            autofill_typed: bool_pref("autoFill.typed", defaults.autofill_typed),
            suggest_history: bool_pref("suggest.history", defaults.suggest_history),
            suggest_bookmark: bool_pref("suggest.bookmark", defaults.suggest_bookmark),
            suggest_openpage: bool_pref("suggest.openpage", defaults.suggest_openpage),
            suggest_history_only_typed: bool_pref(
                "suggest.history.onlyTyped",
                defaults.suggest_history_only_typed,
            ),
            match_behavior,
            filter_javascript: bool_pref("filter.javascript", defaults.filter_javascript),
            max_rich_results,
            restrict_tokens,
        };
        prefs.sync_enabled();
        prefs
    }

    /// Autocomplete is only enabled while at least one suggestion source is.
    fn sync_enabled(&mut self) {
        let any_source = self.suggest_history || self.suggest_bookmark || self.suggest_openpage;
        if !any_source {
            self.enabled = false;
        }
        if !self.enabled {
            self.suggest_history = false;
            self.suggest_bookmark = false;
            self.suggest_openpage = false;
            self.suggest_history_only_typed = false;
        }
        if !self.suggest_history {
            self.suggest_history_only_typed = false;
        }
    }

    pub fn default_behavior(&self) -> Behavior {
        let mut behavior = Behavior::NONE;
        if self.suggest_history {
            behavior |= Behavior::HISTORY;
        }
        if self.suggest_history_only_typed {
            behavior.remove(Behavior::HISTORY);
            behavior |= Behavior::TYPED;
        }
        if self.suggest_bookmark {
            behavior |= Behavior::BOOKMARK;
        }
        if self.suggest_openpage {
            behavior |= Behavior::OPENPAGE;
        }
        behavior
    }

    /// Behavior for searches without any text: typed history when history is
    /// suggested, else bookmarks, else open pages.
    pub fn empty_search_default_behavior(&self) -> Behavior {
        let source = if self.suggest_history {
            Behavior::HISTORY | Behavior::TYPED
        } else if self.suggest_bookmark {
            Behavior::BOOKMARK
        } else {
            Behavior::OPENPAGE
        };
        Behavior::RESTRICT | source
    }
}

#[cfg(test)]
mod tests {
    use super::{PrefBranch, PrefValue, Preferences};
    use crate::behavior::Behavior;
    use crate::matcher::MatchBehavior;

    #[test]
    fn missing_prefs_use_defaults() {
        let prefs = Preferences::load(&PrefBranch::new());
        assert_eq!(prefs, Preferences::default());
        assert_eq!(
            prefs.default_behavior(),
            Behavior::HISTORY | Behavior::BOOKMARK | Behavior::OPENPAGE
        );
    }

    #[test]
    fn malformed_values_fall_back() {
        let branch = PrefBranch::new();
        branch.set_int("matchBehavior", 4);
        branch.set_int("maxRichResults", -3);
        branch.set_string("autocomplete.enabled", "yes");
        branch.set_string("restrict.history", "  ");

        let prefs = Preferences::load(&branch);
        assert_eq!(prefs.match_behavior, MatchBehavior::BoundaryAnywhere);
        assert_eq!(prefs.max_rich_results, 12);
        assert!(prefs.enabled);
        assert_eq!(prefs.restrict_tokens.history, "^");
    }

    #[test]
    fn disabling_every_source_disables_autocomplete() {
        let branch = PrefBranch::new();
        branch.set_bool("suggest.history", false);
        branch.set_bool("suggest.bookmark", false);
        branch.set_bool("suggest.openpage", false);
        assert!(!Preferences::load(&branch).enabled);
    }

    #[test]
    fn disabled_autocomplete_turns_sources_off() {
        let branch = PrefBranch::new();
        branch.set_bool("autocomplete.enabled", false);
        let prefs = Preferences::load(&branch);
        assert!(!prefs.suggest_history);
        assert!(prefs.default_behavior().is_empty());
    }

    #[test]
    fn only_typed_history_swaps_history_for_typed() {
        let branch = PrefBranch::new();
        branch.set_bool("suggest.history.onlyTyped", true);
        let behavior = Preferences::load(&branch).default_behavior();
        assert!(behavior.contains(Behavior::TYPED));
        assert!(!behavior.contains(Behavior::HISTORY));
    }

    #[test]
    fn empty_search_falls_through_enabled_sources() {
        let branch = PrefBranch::new();
        assert_eq!(
            Preferences::load(&branch).empty_search_default_behavior(),
            Behavior::RESTRICT | Behavior::HISTORY | Behavior::TYPED
        );

        branch.set_bool("suggest.history", false);
        assert_eq!(
            Preferences::load(&branch).empty_search_default_behavior(),
            Behavior::RESTRICT | Behavior::BOOKMARK
        );

        branch.set_bool("suggest.bookmark", false);
        assert_eq!(
            Preferences::load(&branch).empty_search_default_behavior(),
            Behavior::RESTRICT | Behavior::OPENPAGE
        );
    }

    #[test]
    fn subscribers_hear_about_changes() {
        let branch = PrefBranch::new();
        let changes = branch.subscribe();
        branch.set_int("maxRichResults", 5);
        branch.set_int("maxRichResults", 5);
        assert_eq!(changes.try_recv().unwrap(), "browser.urlbar.maxRichResults");
        assert!(changes.try_recv().is_err());
        assert_eq!(
            branch.get("browser.urlbar.maxRichResults"),
            Some(PrefValue::Int(5))
        );
    }
}
