pub mod autocomplete;
pub mod behavior;
pub mod config;
pub mod contract;
pub mod executor;
pub mod inline_complete;
pub mod logging;
pub mod matcher;
pub mod model;
pub mod open_pages;
pub mod places_store;
pub mod prefs;
pub mod query_builder;
pub mod ranker;
pub mod runtime;
pub mod tokenizer;
pub mod transport;
