use std::path::Path;

use rusqlite::{params, Connection, OptionalExtension};

use crate::config::Config;
use crate::model::PlaceRecord;

pub const MENU_FOLDER_ID: i64 = 2;
pub const TAGS_FOLDER_ID: i64 = 4;

const TYPE_BOOKMARK: i64 = 1;
const TYPE_FOLDER: i64 = 2;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid url '{0}'")]
    InvalidUrl(String),
    #[error("place not found: {0}")]
    PlaceNotFound(String),
    #[error("store connection lock poisoned")]
    Poisoned,
    #[error("places store is unavailable")]
    Unavailable,
}

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS moz_favicons (
    id INTEGER PRIMARY KEY,
    url TEXT NOT NULL UNIQUE
);
CREATE TABLE IF NOT EXISTS moz_places (
    id INTEGER PRIMARY KEY,
    url TEXT NOT NULL UNIQUE,
    title TEXT,
    visit_count INTEGER NOT NULL DEFAULT 0,
    typed INTEGER NOT NULL DEFAULT 0,
    favicon_id INTEGER,
    frecency INTEGER NOT NULL DEFAULT -1
);
CREATE INDEX IF NOT EXISTS moz_places_frecencyindex ON moz_places (frecency);
CREATE TABLE IF NOT EXISTS moz_keywords (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    keyword TEXT NOT NULL UNIQUE
);
CREATE TABLE IF NOT EXISTS moz_bookmarks (
    id INTEGER PRIMARY KEY,
    type INTEGER NOT NULL,
    fk INTEGER DEFAULT NULL,
    parent INTEGER,
    title TEXT,
    keyword_id INTEGER,
    lastModified INTEGER NOT NULL DEFAULT 0
);
CREATE INDEX IF NOT EXISTS moz_bookmarks_itemindex ON moz_bookmarks (fk, type);
CREATE TABLE IF NOT EXISTS moz_inputhistory (
    place_id INTEGER NOT NULL,
    input TEXT NOT NULL,
    use_count INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (place_id, input)
);
CREATE TABLE IF NOT EXISTS moz_hosts (
    id INTEGER PRIMARY KEY,
    host TEXT NOT NULL UNIQUE,
    frecency INTEGER NOT NULL DEFAULT 0,
    typed INTEGER NOT NULL DEFAULT 0,
    prefix TEXT
);
INSERT OR IGNORE INTO moz_bookmarks (id, type, parent, title) VALUES
    (1, 2, 0, ''),
    (2, 2, 1, 'menu'),
    (3, 2, 1, 'toolbar'),
    (4, 2, 1, 'tags'),
    (5, 2, 1, 'unfiled');
";

const OPEN_PAGES_SCHEMA: &str = "
CREATE TEMP TABLE IF NOT EXISTS moz_openpages_temp (
    url TEXT PRIMARY KEY,
    open_count INTEGER
);
CREATE TEMP TRIGGER IF NOT EXISTS moz_openpages_temp_afterupdate_trigger
AFTER UPDATE OF open_count ON moz_openpages_temp FOR EACH ROW
WHEN NEW.open_count = 0
BEGIN
    DELETE FROM moz_openpages_temp WHERE url = NEW.url;
END;
";

pub fn open_memory() -> Result<Connection, StoreError> {
    let conn = Connection::open_in_memory()?;
    ensure_schema(&conn)?;
    Ok(conn)
}

pub fn open_file(path: &Path) -> Result<Connection, StoreError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let conn = Connection::open(path)?;
    conn.busy_timeout(std::time::Duration::from_secs(5))?;
    ensure_schema(&conn)?;
    Ok(conn)
}

pub fn open_from_config(cfg: &Config) -> Result<Connection, StoreError> {
    open_file(&cfg.places_db_path)
}

pub fn ensure_schema(db: &Connection) -> Result<(), StoreError> {
    db.execute_batch(SCHEMA)?;
    Ok(())
}

/// Prepares a connection for autocomplete: match function, open-pages temp
/// table and its garbage-collecting trigger.
pub fn init_autocomplete_connection(db: &Connection) -> Result<(), StoreError> {
    crate::matcher::register(db)?;
    db.execute_batch(OPEN_PAGES_SCHEMA)?;
    Ok(())
}

pub fn register_open_page(db: &Connection, url: &str) -> Result<(), StoreError> {
    db.prepare_cached(
        "INSERT OR REPLACE INTO moz_openpages_temp (url, open_count)
         VALUES (?1, IFNULL((SELECT open_count + 1 FROM moz_openpages_temp WHERE url = ?1), 1))",
    )?
    .execute(params![url])?;
    Ok(())
}

pub fn unregister_open_page(db: &Connection, url: &str) -> Result<(), StoreError> {
    db.prepare_cached("UPDATE moz_openpages_temp SET open_count = open_count - 1 WHERE url = ?1")?
        .execute(params![url])?;
    Ok(())
}

pub fn open_page_count(db: &Connection, url: &str) -> Result<Option<i64>, StoreError> {
    let count = db
        .query_row(
            "SELECT open_count FROM moz_openpages_temp WHERE url = ?1",
            params![url],
            |row| row.get(0),
        )
        .optional()?;
    Ok(count)
}

/// Inserts or updates a page and keeps its host row current.
pub fn upsert_place(db: &Connection, record: &PlaceRecord) -> Result<i64, StoreError> {
    let parsed =
        url::Url::parse(&record.url).map_err(|_| StoreError::InvalidUrl(record.url.clone()))?;

    let favicon_id = match &record.favicon_url {
        Some(favicon_url) => {
            db.execute(
                "INSERT OR IGNORE INTO moz_favicons (url) VALUES (?1)",
                params![favicon_url],
            )?;
            Some(db.query_row(
                "SELECT id FROM moz_favicons WHERE url = ?1",
                params![favicon_url],
                |row| row.get::<_, i64>(0),
            )?)
        }
        None => None,
    };

    db.execute(
        "INSERT INTO moz_places (url, title, visit_count, typed, favicon_id, frecency)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         ON CONFLICT(url) DO UPDATE SET title=excluded.title, visit_count=excluded.visit_count,
           typed=excluded.typed, favicon_id=IFNULL(excluded.favicon_id, favicon_id),
           frecency=excluded.frecency",
        params![
            record.url,
            record.title,
            record.visit_count,
            record.typed as i64,
            favicon_id,
            record.frecency
        ],
    )?;
    let place_id = place_id_for_url(db, &record.url)?
        .ok_or_else(|| StoreError::PlaceNotFound(record.url.clone()))?;

    if let Some((host, prefix)) = host_and_prefix(&parsed) {
        db.execute(
            "INSERT INTO moz_hosts (host, frecency, typed, prefix) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(host) DO UPDATE SET frecency=MAX(frecency, excluded.frecency),
               typed=MAX(typed, excluded.typed), prefix=IFNULL(excluded.prefix, prefix)",
            params![host, record.frecency.max(0), record.typed as i64, prefix],
        )?;
    }

    Ok(place_id)
}

pub fn place_id_for_url(db: &Connection, url: &str) -> Result<Option<i64>, StoreError> {
    let id = db
        .query_row(
            "SELECT id FROM moz_places WHERE url = ?1",
            params![url],
            |row| row.get(0),
        )
        .optional()?;
    Ok(id)
}

/// Bookmarks a page in the bookmarks menu and returns the bookmark id.
pub fn insert_bookmark(
    db: &Connection,
    place_id: i64,
    title: Option<&str>,
) -> Result<i64, StoreError> {
    db.execute(
        "INSERT INTO moz_bookmarks (type, fk, parent, title, lastModified)
         VALUES (?1, ?2, ?3, ?4, (SELECT IFNULL(MAX(lastModified), 0) + 1 FROM moz_bookmarks))",
        params![TYPE_BOOKMARK, place_id, MENU_FOLDER_ID, title],
    )?;
    Ok(db.last_insert_rowid())
}

pub fn tag_place(db: &Connection, place_id: i64, tag: &str) -> Result<(), StoreError> {
    let existing: Option<i64> = db
        .query_row(
            "SELECT id FROM moz_bookmarks WHERE parent = ?1 AND type = ?2 AND title = ?3",
            params![TAGS_FOLDER_ID, TYPE_FOLDER, tag],
            |row| row.get(0),
        )
        .optional()?;
    let folder_id = match existing {
        Some(id) => id,
        None => {
            db.execute(
                "INSERT INTO moz_bookmarks (type, parent, title) VALUES (?1, ?2, ?3)",
                params![TYPE_FOLDER, TAGS_FOLDER_ID, tag],
            )?;
            db.last_insert_rowid()
        }
    };
    db.execute(
        "INSERT INTO moz_bookmarks (type, fk, parent) VALUES (?1, ?2, ?3)",
        params![TYPE_BOOKMARK, place_id, folder_id],
    )?;
    Ok(())
}

pub fn set_keyword(db: &Connection, bookmark_id: i64, keyword: &str) -> Result<(), StoreError> {
    db.execute(
        "INSERT OR IGNORE INTO moz_keywords (keyword) VALUES (?1)",
        params![keyword],
    )?;
    db.execute(
        "UPDATE moz_bookmarks SET keyword_id = (SELECT id FROM moz_keywords WHERE keyword = ?1)
         WHERE id = ?2",
        params![keyword, bookmark_id],
    )?;
    Ok(())
}

pub fn is_keyword(db: &Connection, keyword: &str) -> Result<bool, StoreError> {
    let found: Option<i64> = db
        .query_row(
            "SELECT 1 FROM moz_keywords k JOIN moz_bookmarks b ON b.keyword_id = k.id
             WHERE LOWER(k.keyword) = LOWER(?1) LIMIT 1",
            params![keyword],
            |row| row.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

/// Records that `input` led the user to pick `place_id`.
pub fn record_input(db: &Connection, place_id: i64, input: &str) -> Result<(), StoreError> {
    db.execute(
        "INSERT INTO moz_inputhistory (place_id, input, use_count) VALUES (?1, ?2, 1)
         ON CONFLICT(place_id, input) DO UPDATE SET use_count = use_count + 1",
        params![place_id, input.to_lowercase()],
    )?;
    Ok(())
}

fn host_and_prefix(parsed: &url::Url) -> Option<(String, Option<String>)> {
    let host = parsed.host_str()?.to_ascii_lowercase();
    let (host, has_www) = match host.strip_prefix("www.") {
        Some(rest) => (rest.to_string(), true),
        None => (host, false),
    };
    let scheme = match parsed.scheme() {
        "https" => Some("https://"),
        "ftp" => Some("ftp://"),
        _ => None,
    };
    let prefix = match (scheme, has_www) {
        (None, false) => None,
        (scheme, has_www) => Some(format!(
            "{}{}",
            scheme.unwrap_or(""),
            if has_www { "www." } else { "" }
        )),
    };
    Some((host, prefix))
}
