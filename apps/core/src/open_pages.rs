use log::debug;
use rusqlite::Connection;

use crate::places_store::{self, StoreError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpenPageChange {
    Register(String),
    Unregister(String),
}

impl OpenPageChange {
    pub fn apply(&self, db: &Connection) -> Result<(), StoreError> {
        match self {
            Self::Register(url) => places_store::register_open_page(db, url),
            Self::Unregister(url) => places_store::unregister_open_page(db, url),
        }
    }
}

/// Tracks tab open/close notifications that have not reached the temp table
/// yet: before the places store is ready, and while a query batch holds the
/// connection. Changes are written in arrival order.
#[derive(Debug, Default)]
pub struct OpenPageRegistry {
    pending: Vec<OpenPageChange>,
}

impl OpenPageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn buffer_register(&mut self, url: &str) {
        self.pending.push(OpenPageChange::Register(url.to_string()));
    }

    /// Cancels the latest pending registration of `url` and returns true.
    /// Without one, queues an unregistration and returns false.
    pub fn buffer_unregister(&mut self, url: &str) -> bool {
        let latest = self
            .pending
            .iter()
            .rposition(|change| matches!(change, OpenPageChange::Register(pending) if pending == url));
        match latest {
            Some(index) => {
                self.pending.remove(index);
                true
            }
            None => {
                self.pending.push(OpenPageChange::Unregister(url.to_string()));
                false
            }
        }
    }

    pub fn pending(&self) -> &[OpenPageChange] {
        &self.pending
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }

    /// Registrations of `url` still waiting for the store.
    pub fn pending_count(&self, url: &str) -> usize {
        self.pending
            .iter()
            .filter(|change| matches!(change, OpenPageChange::Register(pending) if pending == url))
            .count()
    }

    /// Writes pending changes to the temp table. Changes that could not be
    /// written stay pending.
    pub fn flush(&mut self, db: &Connection) -> Result<usize, StoreError> {
        let mut written = 0;
        while let Some(change) = self.pending.first() {
            change.apply(db)?;
            self.pending.remove(0);
            written += 1;
        }
        if written > 0 {
            debug!("flushed {written} pending open page changes");
        }
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn autocomplete_db() -> Connection {
        let db = places_store::open_memory().unwrap();
        places_store::init_autocomplete_connection(&db).unwrap();
        db
    }

    #[test]
    fn unregister_cancels_the_latest_pending_registration() {
        let mut registry = OpenPageRegistry::new();
        registry.buffer_register("http://a.example/");
        registry.buffer_register("http://a.example/");
        assert!(registry.buffer_unregister("http://a.example/"));
        assert!(!registry.buffer_unregister("http://b.example/"));
        assert_eq!(
            registry.pending(),
            [
                OpenPageChange::Register("http://a.example/".to_string()),
                OpenPageChange::Unregister("http://b.example/".to_string()),
            ]
        );
        assert_eq!(registry.pending_count("http://a.example/"), 1);
        assert_eq!(registry.pending_count("http://b.example/"), 0);
    }

    #[test]
    fn flush_counts_repeated_registrations() {
        let db = autocomplete_db();
        let mut registry = OpenPageRegistry::new();
        registry.buffer_register("http://a.example/");
        registry.buffer_register("http://a.example/");
        registry.buffer_register("http://b.example/");

        assert_eq!(registry.flush(&db).unwrap(), 3);
        assert!(registry.is_empty());
        assert_eq!(
            places_store::open_page_count(&db, "http://a.example/").unwrap(),
            Some(2)
        );
        assert_eq!(
            places_store::open_page_count(&db, "http://b.example/").unwrap(),
            Some(1)
        );
    }

    #[test]
    fn queued_unregistration_closes_a_stored_page() {
        let db = autocomplete_db();
        places_store::register_open_page(&db, "http://a.example/").unwrap();

        let mut registry = OpenPageRegistry::new();
        assert!(!registry.buffer_unregister("http://a.example/"));
        registry.flush(&db).unwrap();
        assert_eq!(
            places_store::open_page_count(&db, "http://a.example/").unwrap(),
            None
        );
    }

    #[test]
    fn flush_without_temp_table_keeps_pending_changes() {
        let db = places_store::open_memory().unwrap();
        let mut registry = OpenPageRegistry::new();
        registry.buffer_register("http://a.example/");
        assert!(registry.flush(&db).is_err());
        assert_eq!(registry.pending().len(), 1);
    }
}
