//! The autocomplete controller: one active search session at a time, fed by
//! query batches running on worker threads and drained cooperatively through
//! [`AutoComplete::poll`] or [`AutoComplete::wait`].

use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, Sender};
use std::time::Instant;

use log::{debug, warn};
use rusqlite::Connection;

use crate::behavior::{resolve_behavior, Behavior};
use crate::executor::{ExecutorEvent, PendingBatch, QueryExecutor, SearchGeneration};
use crate::inline_complete::{InlineCompletion, UrlInlineComplete};
use crate::matcher::MatchBehavior;
use crate::model::{AutoCompleteResult, SearchStatus};
use crate::open_pages::OpenPageRegistry;
use crate::places_store::{self, StoreError};
use crate::prefs::{PrefBranch, Preferences};
use crate::query_builder::{
    bound_adaptive_query, bound_keyword_query, bound_open_pages_query, bound_search_query,
    BoundQuery, QueryContext,
};
use crate::ranker::ResultRanker;
use crate::tokenizer::{fixup_search_text, tokenize};

pub const ENABLE_ACTIONS_PARAM: &str = "enable-actions";

#[derive(Debug, thiserror::Error)]
pub enum AutoCompleteError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

/// Receives every intermediate and final result of a search.
pub trait AutoCompleteListener {
    fn on_search_result(&mut self, result: &AutoCompleteResult);
}

impl AutoCompleteListener for Sender<AutoCompleteResult> {
    fn on_search_result(&mut self, result: &AutoCompleteResult) {
        let _ = self.send(result.clone());
    }
}

/// Where the places database comes from. Opened on first use.
pub enum StoreSource {
    Path(PathBuf),
    Connection(Connection),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchState {
    Idle,
    /// Queries dispatched, no rows seen yet.
    Running,
    /// Rows are arriving.
    Draining,
    /// The relaxed `Anywhere` pass is running.
    SecondPass,
    Completed,
    Cancelled,
}

struct SearchSession {
    search_string: String,
    original: String,
    current: String,
    tokens: Vec<String>,
    behavior: Behavior,
    match_behavior: MatchBehavior,
    max_results: usize,
    second_pass_done: bool,
    started: Instant,
    ranker: ResultRanker,
    pending: Option<PendingBatch>,
    notified_count: usize,
    listener: Box<dyn AutoCompleteListener>,
}

impl SearchSession {
    fn query_context(&self, match_behavior: MatchBehavior) -> QueryContext<'_> {
        QueryContext {
            tokens: &self.tokens,
            behavior: self.behavior,
            match_behavior,
            max_results: self.max_results,
        }
    }

    fn first_pass_queries(&self) -> Vec<BoundQuery> {
        let ctx = self.query_context(self.match_behavior);
        let mut queries = Vec::with_capacity(4);
        if !self.tokens.is_empty() {
            queries.extend(bound_keyword_query(&self.original, &self.tokens));
        }
        queries.push(bound_adaptive_query(&ctx, &self.current));
        if self.behavior.contains(Behavior::OPENPAGE) {
            queries.push(bound_open_pages_query(&ctx));
        }
        queries.push(bound_search_query(&ctx));
        queries
    }

    fn second_pass_queries(&self) -> Vec<BoundQuery> {
        let ctx = self.query_context(MatchBehavior::Anywhere);
        vec![
            bound_adaptive_query(&ctx, &self.current),
            bound_search_query(&ctx),
        ]
    }

    fn wants_second_pass(&self) -> bool {
        self.match_behavior == MatchBehavior::BoundaryAnywhere
            && !self.second_pass_done
            && !self.ranker.is_full()
    }

    fn notify(&mut self, ongoing: bool) {
        let result = AutoCompleteResult {
            search_string: self.search_string.clone(),
            status: SearchStatus::for_matches(!self.ranker.is_empty(), ongoing),
            entries: self.ranker.entries().to_vec(),
        };
        self.notified_count = self.ranker.len();
        self.listener.on_search_result(&result);
    }
}

pub struct AutoComplete {
    branch: PrefBranch,
    pref_changes: Receiver<String>,
    prefs: Preferences,
    source: Option<StoreSource>,
    executor: Option<QueryExecutor>,
    open_pages: OpenPageRegistry,
    generation: SearchGeneration,
    events_tx: Sender<ExecutorEvent>,
    events_rx: Receiver<ExecutorEvent>,
    session: Option<SearchSession>,
    state: SearchState,
}

impl AutoComplete {
    pub fn new(branch: PrefBranch, source: StoreSource) -> Self {
        let pref_changes = branch.subscribe();
        let prefs = Preferences::load(&branch);
        let (events_tx, events_rx) = mpsc::channel();
        Self {
            branch,
            pref_changes,
            prefs,
            source: Some(source),
            executor: None,
            open_pages: OpenPageRegistry::new(),
            generation: SearchGeneration::new(),
            events_tx,
            events_rx,
            session: None,
            state: SearchState::Idle,
        }
    }

    pub fn state(&self) -> SearchState {
        self.state
    }

    pub fn preferences(&self) -> &Preferences {
        &self.prefs
    }

    pub fn is_initialized(&self) -> bool {
        self.executor.is_some()
    }

    /// Opens the places store and writes open pages registered before it was
    /// ready. Safe to call repeatedly; every call retries queued open-page
    /// writes without waiting on a running batch.
    pub fn initialize(&mut self) -> Result<(), StoreError> {
        if self.executor.is_none() {
            let db = match self.source.take() {
                Some(StoreSource::Connection(db)) => db,
                Some(StoreSource::Path(path)) => match places_store::open_file(&path) {
                    Ok(db) => db,
                    Err(err) => {
                        self.source = Some(StoreSource::Path(path));
                        return Err(err);
                    }
                },
                None => return Err(StoreError::Unavailable),
            };
            places_store::init_autocomplete_connection(&db)?;
            self.executor = Some(QueryExecutor::new(db));
            debug!("places store initialized");
        }

        if let Err(err) = self.flush_open_pages() {
            warn!("failed to write open pages: {err}");
        }
        Ok(())
    }

    /// Never waits for a running batch: the change is queued and written once
    /// the connection is free or by the next batch.
    pub fn register_open_page(&mut self, url: &str) -> Result<(), AutoCompleteError> {
        let url = checked_url(url)?;
        self.open_pages.buffer_register(url);
        Ok(self.flush_open_pages()?)
    }

    pub fn unregister_open_page(&mut self, url: &str) -> Result<(), AutoCompleteError> {
        let url = checked_url(url)?;
        if !self.open_pages.buffer_unregister(url) && self.executor.is_none() {
            debug!("unregistered page {url} was never registered");
        }
        Ok(self.flush_open_pages()?)
    }

    /// Waits for a running batch to release the connection once the store is
    /// initialized.
    pub fn open_page_count(&mut self, url: &str) -> Result<Option<i64>, AutoCompleteError> {
        match &self.executor {
            Some(executor) => {
                let open_pages = &mut self.open_pages;
                Ok(executor.with_connection(|db| {
                    open_pages.flush(db)?;
                    places_store::open_page_count(db, url)
                })?)
            }
            None => {
                let count = self.open_pages.pending_count(url);
                Ok((count > 0).then_some(count as i64))
            }
        }
    }

    /// Inline completion for the text typed so far.
    pub fn autofill(&mut self, search: &str) -> Result<Option<InlineCompletion>, AutoCompleteError> {
        self.sync_prefs();
        self.initialize()?;
        let completer = UrlInlineComplete::new(&self.prefs);
        let executor = self.executor.as_ref().ok_or(StoreError::Unavailable)?;
        Ok(executor.with_connection(|db| completer.complete(db, search))?)
    }

    /// Cancels any running search and starts a new one. Failures end the
    /// search with an empty `NoMatch` result.
    pub fn start_search(
        &mut self,
        search: &str,
        params: &str,
        _previous: Option<&AutoCompleteResult>,
        listener: Box<dyn AutoCompleteListener>,
    ) {
        self.stop_search();
        self.sync_prefs();

        let original = search.trim().to_string();
        let current = fixup_search_text(&original.to_lowercase());
        let enable_actions = params
            .split_whitespace()
            .any(|param| param == ENABLE_ACTIONS_PARAM);

        let mut tokens = tokenize(&current);
        let behavior = resolve_behavior(&mut tokens, &self.prefs, enable_actions);
        let max_results = self.prefs.max_rich_results;

        let mut session = SearchSession {
            search_string: search.to_string(),
            original,
            current,
            tokens,
            behavior,
            match_behavior: self.prefs.match_behavior,
            max_results,
            second_pass_done: false,
            started: Instant::now(),
            ranker: ResultRanker::new(max_results, behavior, enable_actions),
            pending: None,
            notified_count: 0,
            listener,
        };

        if !self.prefs.enabled {
            debug!("autocomplete disabled; ignoring search");
            session.notify(false);
            self.state = SearchState::Completed;
            return;
        }

        if let Err(err) = self.initialize() {
            warn!("places store unavailable: {err}");
            session.notify(false);
            self.state = SearchState::Completed;
            return;
        }

        debug!(
            "search '{}' tokens={:?} behavior={:?}",
            session.current, session.tokens, session.behavior
        );
        let queries = session.first_pass_queries();
        self.session = Some(session);
        self.dispatch(queries, SearchState::Running);
    }

    /// Runs a search to completion and returns its final result.
    pub fn search_blocking(&mut self, search: &str, params: &str) -> AutoCompleteResult {
        let (tx, rx) = mpsc::channel();
        self.start_search(search, params, None, Box::new(tx));
        self.wait();
        rx.try_iter()
            .last()
            .unwrap_or_else(|| AutoCompleteResult::no_match(search))
    }

    /// Idempotent.
    pub fn stop_search(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };
        if let Some(batch) = &session.pending {
            batch.cancel();
        }
        debug!("search '{}' stopped", session.current);
        self.state = SearchState::Cancelled;
    }

    /// Handles every event already delivered without blocking.
    pub fn poll(&mut self) -> SearchState {
        while let Ok(event) = self.events_rx.try_recv() {
            self.handle_event(event);
        }
        self.notify_progress();
        if let Err(err) = self.flush_open_pages() {
            warn!("failed to write open pages: {err}");
        }
        self.state
    }

    /// Blocks until the active search finishes.
    pub fn wait(&mut self) -> SearchState {
        while self.session.is_some() {
            let Ok(event) = self.events_rx.recv() else {
                break;
            };
            self.handle_event(event);
            while let Ok(event) = self.events_rx.try_recv() {
                self.handle_event(event);
            }
            self.notify_progress();
        }
        if let Err(err) = self.flush_open_pages() {
            warn!("failed to write open pages: {err}");
        }
        self.state
    }

    fn sync_prefs(&mut self) {
        let mut changed = false;
        while self.pref_changes.try_recv().is_ok() {
            changed = true;
        }
        if changed {
            self.prefs = Preferences::load(&self.branch);
            debug!("preferences reloaded");
        }
    }

    /// Writes queued open-page changes if the connection is free.
    fn flush_open_pages(&mut self) -> Result<(), StoreError> {
        let Some(executor) = &self.executor else {
            return Ok(());
        };
        if self.open_pages.is_empty() {
            return Ok(());
        }
        let open_pages = &mut self.open_pages;
        if executor.try_with_connection(|db| open_pages.flush(db))?.is_none() {
            debug!(
                "connection busy, deferring {} open page changes",
                open_pages.pending().len()
            );
        }
        Ok(())
    }

    fn dispatch(&mut self, queries: Vec<BoundQuery>, state: SearchState) {
        let generation = self.generation.next();
        let open_pages = self.open_pages.pending().to_vec();
        let dispatched = self
            .executor
            .as_ref()
            .ok_or(StoreError::Unavailable)
            .and_then(|executor| {
                executor.execute(generation, open_pages, queries, self.events_tx.clone())
            });

        match dispatched {
            Ok(batch) => {
                self.open_pages.clear();
                if let Some(session) = self.session.as_mut() {
                    session.pending = Some(batch);
                }
                self.state = state;
            }
            Err(err) => {
                warn!("failed to dispatch queries: {err}");
                self.finish();
            }
        }
    }

    fn handle_event(&mut self, event: ExecutorEvent) {
        let Some(session) = self.session.as_mut() else {
            debug!("dropping event from batch {} with no active search", event.generation());
            return;
        };
        let active = session.pending.as_ref().map(PendingBatch::generation);
        if active != Some(event.generation()) {
            debug!("dropping stale event from batch {}", event.generation());
            return;
        }

        match event {
            ExecutorEvent::Row { row, .. } => {
                if self.state == SearchState::Running {
                    self.state = SearchState::Draining;
                }
                session.ranker.push(&row);
                if session.ranker.is_full() {
                    self.finish();
                }
            }
            ExecutorEvent::Error { query, message, .. } => {
                debug!("{query:?} query failed for '{}': {message}", session.current);
            }
            ExecutorEvent::Completed { .. } => {
                if let Err(err) = self.flush_open_pages() {
                    warn!("failed to write open pages: {err}");
                }
                let Some(session) = self.session.as_mut() else {
                    return;
                };
                if session.wants_second_pass() {
                    session.second_pass_done = true;
                    let queries = session.second_pass_queries();
                    debug!("starting anywhere pass for '{}'", session.current);
                    self.dispatch(queries, SearchState::SecondPass);
                } else {
                    self.finish();
                }
            }
        }
    }

    fn notify_progress(&mut self) {
        if let Some(session) = self.session.as_mut() {
            if session.ranker.len() > session.notified_count {
                session.notify(true);
            }
        }
    }

    fn finish(&mut self) {
        let Some(mut session) = self.session.take() else {
            return;
        };
        if let Some(batch) = session.pending.take() {
            batch.cancel();
        }
        session.notify(false);
        debug!(
            "search '{}' finished with {} results in {:?}",
            session.current,
            session.ranker.len(),
            session.started.elapsed()
        );
        self.state = SearchState::Completed;
    }
}

impl Drop for AutoComplete {
    fn drop(&mut self) {
        self.stop_search();
    }
}

fn checked_url(url: &str) -> Result<&str, AutoCompleteError> {
    let url = url.trim();
    if url.is_empty() {
        return Err(AutoCompleteError::InvalidRequest(
            "page url is required".to_string(),
        ));
    }
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PlaceRecord;

    fn seeded(urls: &[(&str, &str)]) -> Connection {
        let db = places_store::open_memory().unwrap();
        for (index, (url, title)) in urls.iter().enumerate() {
            let record = PlaceRecord::new(url, title).with_visits(1, 1000 - index as i64);
            places_store::upsert_place(&db, &record).unwrap();
        }
        db
    }

    #[test]
    fn first_pass_skips_keyword_and_open_pages_when_not_needed() {
        let mut controller = AutoComplete::new(
            PrefBranch::new(),
            StoreSource::Connection(places_store::open_memory().unwrap()),
        );
        let (tx, _rx) = mpsc::channel();
        controller.start_search("", "", None, Box::new(tx));
        let session = controller.session.as_ref().unwrap();
        assert!(session.tokens.is_empty());
        let kinds: Vec<_> = session
            .first_pass_queries()
            .into_iter()
            .map(|query| query.kind)
            .collect();
        assert_eq!(kinds.len(), 2);
        assert!(!session.behavior.contains(Behavior::OPENPAGE));
    }

    #[test]
    fn new_search_supersedes_running_one() {
        let db = seeded(&[("http://alpha.example/", "Alpha"), ("http://beta.example/", "Beta")]);
        let mut controller = AutoComplete::new(PrefBranch::new(), StoreSource::Connection(db));
        let (tx_a, rx_a) = mpsc::channel();
        let (tx_b, rx_b) = mpsc::channel();

        controller.start_search("alpha", "", None, Box::new(tx_a));
        controller.start_search("beta", "", None, Box::new(tx_b));
        assert_eq!(controller.wait(), SearchState::Completed);

        assert!(rx_a.try_recv().is_err());
        let last = rx_b.try_iter().last().unwrap();
        assert_eq!(last.status, SearchStatus::Success);
        assert_eq!(last.entries[0].url, "http://beta.example/");
    }

    #[test]
    fn stop_search_twice_keeps_cancelled_state() {
        let db = seeded(&[("http://alpha.example/", "Alpha")]);
        let mut controller = AutoComplete::new(PrefBranch::new(), StoreSource::Connection(db));
        let (tx, _rx) = mpsc::channel();
        controller.start_search("alpha", "", None, Box::new(tx));
        controller.stop_search();
        assert_eq!(controller.state(), SearchState::Cancelled);
        controller.stop_search();
        assert_eq!(controller.state(), SearchState::Cancelled);
        assert_eq!(controller.poll(), SearchState::Cancelled);
    }

    #[test]
    fn anywhere_pass_runs_at_most_once() {
        let db = seeded(&[("http://www.mozilla.org/", "Mozilla")]);
        let mut controller = AutoComplete::new(PrefBranch::new(), StoreSource::Connection(db));
        let result = controller.search_blocking("zilla", "");
        assert_eq!(result.match_count(), 1);
        assert_eq!(controller.generation.current_id(), 2);

        let result = controller.search_blocking("nothing-here", "");
        assert_eq!(result.status, SearchStatus::NoMatch);
        assert_eq!(controller.generation.current_id(), 4);

        controller.branch.set_int("matchBehavior", 2);
        controller.search_blocking("zilla", "");
        assert_eq!(controller.generation.current_id(), 5);
    }

    #[test]
    fn registration_does_not_wait_for_a_busy_connection() {
        let db = seeded(&[("http://alpha.example/", "Alpha")]);
        let mut controller = AutoComplete::new(PrefBranch::new(), StoreSource::Connection(db));
        controller.initialize().unwrap();
        let shared = controller.executor.as_ref().unwrap().shared_connection();

        let guard = shared.lock().unwrap();
        controller.register_open_page("http://tab.example/").unwrap();
        controller.register_open_page("http://tab.example/").unwrap();
        controller.unregister_open_page("http://tab.example/").unwrap();
        assert_eq!(controller.open_pages.pending_count("http://tab.example/"), 1);
        drop(guard);

        assert_eq!(controller.poll(), SearchState::Idle);
        assert!(controller.open_pages.is_empty());
        assert_eq!(controller.open_page_count("http://tab.example/").unwrap(), Some(1));
    }

    #[test]
    fn queued_registrations_reach_the_next_batch() {
        let db = seeded(&[("http://alpha.example/", "Alpha")]);
        let mut controller = AutoComplete::new(PrefBranch::new(), StoreSource::Connection(db));
        controller.initialize().unwrap();
        let shared = controller.executor.as_ref().unwrap().shared_connection();

        let guard = shared.lock().unwrap();
        controller.register_open_page("http://tab.example/").unwrap();
        let (tx, rx) = mpsc::channel();
        controller.start_search("tab", ENABLE_ACTIONS_PARAM, None, Box::new(tx));
        assert!(controller.open_pages.is_empty());
        drop(guard);

        assert_eq!(controller.wait(), SearchState::Completed);
        let last = rx.try_iter().last().unwrap();
        assert_eq!(last.entries[0].url, "moz-action:switchtab,http://tab.example/");
    }

    #[test]
    fn failed_open_page_writes_are_retried() {
        let db = places_store::open_memory().unwrap();
        let mut controller = AutoComplete::new(PrefBranch::new(), StoreSource::Connection(db));
        controller.initialize().unwrap();
        let shared = controller.executor.as_ref().unwrap().shared_connection();
        shared
            .lock()
            .unwrap()
            .execute_batch("DROP TABLE moz_openpages_temp")
            .unwrap();

        assert!(controller.register_open_page("http://tab.example/").is_err());
        assert_eq!(controller.open_pages.pending_count("http://tab.example/"), 1);

        places_store::init_autocomplete_connection(&shared.lock().unwrap()).unwrap();
        controller.initialize().unwrap();
        assert!(controller.open_pages.is_empty());
        assert_eq!(controller.open_page_count("http://tab.example/").unwrap(), Some(1));
    }

    #[test]
    fn empty_url_is_rejected() {
        let mut controller = AutoComplete::new(
            PrefBranch::new(),
            StoreSource::Connection(places_store::open_memory().unwrap()),
        );
        assert!(matches!(
            controller.register_open_page("  "),
            Err(AutoCompleteError::InvalidRequest(_))
        ));
    }
}
