use std::time::{SystemTime, UNIX_EPOCH};

use urlbar_core::config::{self, Config, ConfigError};
use urlbar_core::prefs::{PrefBranch, PrefValue, Preferences};

fn unique_path(name: &str) -> std::path::PathBuf {
    let unique = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    std::env::temp_dir()
        .join("urlbar-core")
        .join(format!("{unique}-{name}"))
}

#[test]
fn rejects_max_results_out_of_range() {
    let cfg = Config {
        max_results: 200,
        ..Default::default()
    };
    assert!(matches!(config::validate(&cfg), Err(ConfigError::Invalid(_))));

    let cfg = Config {
        max_results: 0,
        ..Default::default()
    };
    assert!(config::validate(&cfg).is_err());
}

#[test]
fn accepts_default_config() {
    let cfg = Config::default();
    assert_eq!(cfg.max_results, 12);
    assert!(cfg.places_db_path.to_string_lossy().contains("urlbar-core"));
    assert!(cfg.config_path.to_string_lossy().contains("urlbar-core"));
    assert!(config::validate(&cfg).is_ok());
}

#[test]
fn missing_file_loads_defaults_at_that_path() {
    let path = unique_path("missing.toml");
    let cfg = config::load(Some(&path)).unwrap();
    assert_eq!(cfg.config_path, path);
    assert_eq!(cfg.max_results, 12);
    assert!(cfg.prefs.is_empty());
}

#[test]
fn saves_and_reloads_toml() {
    let path = unique_path("config.toml");
    let mut cfg = Config {
        config_path: path.clone(),
        max_results: 8,
        ..Default::default()
    };
    cfg.prefs
        .insert("suggest.bookmark".to_string(), PrefValue::Bool(false));
    cfg.prefs
        .insert("restrict.history".to_string(), PrefValue::String("!".to_string()));
    config::save(&cfg).unwrap();

    let loaded = config::load(Some(&path)).unwrap();
    assert_eq!(loaded, cfg);
    std::fs::remove_file(&path).unwrap();
}

#[test]
fn loads_json5_configs() {
    let path = unique_path("config.json5");
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(
        &path,
        r#"{
            // comments are allowed
            max_results: 5,
            places_db_path: "/tmp/urlbar/places.sqlite",
            prefs: { "restrict.history": "!", "autoFill": false },
        }"#,
    )
    .unwrap();

    let cfg = config::load(Some(&path)).unwrap();
    assert_eq!(cfg.max_results, 5);
    assert_eq!(
        cfg.prefs.get("restrict.history"),
        Some(&PrefValue::String("!".to_string()))
    );
    assert_eq!(cfg.prefs.get("autoFill"), Some(&PrefValue::Bool(false)));
    std::fs::remove_file(&path).unwrap();
}

#[test]
fn invalid_toml_is_reported() {
    let path = unique_path("broken.toml");
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, "max_results = \"many\"").unwrap();
    assert!(matches!(
        config::load(Some(&path)),
        Err(ConfigError::TomlDe(_))
    ));
    std::fs::remove_file(&path).unwrap();
}

#[test]
fn overrides_flow_into_preferences() {
    let mut cfg = Config {
        max_results: 6,
        ..Default::default()
    };
    cfg.prefs
        .insert("autoFill".to_string(), PrefValue::Bool(false));

    let branch = PrefBranch::new();
    cfg.apply_to(&branch);
    let prefs = Preferences::load(&branch);
    assert_eq!(prefs.max_rich_results, 6);
    assert!(!prefs.autofill);
}

#[test]
fn opens_places_store_from_config_path() {
    let cfg = Config {
        places_db_path: unique_path("cfg-open.sqlite"),
        ..Default::default()
    };

    let db = urlbar_core::places_store::open_from_config(&cfg).unwrap();
    let record = urlbar_core::model::PlaceRecord::new("http://example.com/", "Example");
    let id = urlbar_core::places_store::upsert_place(&db, &record).unwrap();
    assert_eq!(
        urlbar_core::places_store::place_id_for_url(&db, "http://example.com/").unwrap(),
        Some(id)
    );

    drop(db);
    std::fs::remove_file(&cfg.places_db_path).unwrap();
}
