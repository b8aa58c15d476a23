use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use log::{info, LevelFilter};

use crate::autocomplete::{AutoComplete, StoreSource, ENABLE_ACTIONS_PARAM};
use crate::config::{self, ConfigError};
use crate::contract::SearchResponse;
use crate::logging;
use crate::prefs::PrefBranch;

const USAGE: &str =
    "usage: urlbar-core [--config PATH] [--db PATH] [--actions] [--verbose] (--stdio | QUERY...)";

#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("failed to encode response: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("{0}\n{usage}", usage = USAGE)]
    Usage(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuntimeOptions {
    pub config_path: Option<PathBuf>,
    pub db_path: Option<PathBuf>,
    pub actions: bool,
    pub verbose: bool,
    pub stdio: bool,
    pub query: Vec<String>,
}

pub fn parse_cli_args(args: &[String]) -> Result<RuntimeOptions, RuntimeError> {
    let mut options = RuntimeOptions::default();
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--config" => options.config_path = Some(path_value(&mut iter, arg)?),
            "--db" => options.db_path = Some(path_value(&mut iter, arg)?),
            "--actions" => options.actions = true,
            "--verbose" => options.verbose = true,
            "--stdio" => options.stdio = true,
            "--" => options.query.extend(iter.by_ref().cloned()),
            flag if flag.starts_with("--") => {
                return Err(RuntimeError::Usage(format!("unknown option '{flag}'")));
            }
            word => options.query.push(word.to_string()),
        }
    }

    if options.stdio && !options.query.is_empty() {
        return Err(RuntimeError::Usage(
            "--stdio does not take a query".to_string(),
        ));
    }
    Ok(options)
}

fn path_value<'a>(
    iter: &mut impl Iterator<Item = &'a String>,
    flag: &str,
) -> Result<PathBuf, RuntimeError> {
    iter.next()
        .map(PathBuf::from)
        .ok_or_else(|| RuntimeError::Usage(format!("{flag} requires a path")))
}

pub fn run_with_options(options: RuntimeOptions) -> Result<(), RuntimeError> {
    let level = if options.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    if let Err(error) = logging::init(level) {
        eprintln!("[urlbar-core] file logging disabled: {error}");
    }

    let mut cfg = config::load(options.config_path.as_deref())?;
    if !cfg.config_path.exists() {
        config::save(&cfg)?;
        info!("wrote default config to {}", cfg.config_path.display());
    }
    if let Some(db_path) = options.db_path {
        cfg.places_db_path = db_path;
    }
    info!(
        "startup config_path={} places_db_path={} mode={}",
        cfg.config_path.display(),
        cfg.places_db_path.display(),
        if options.stdio { "stdio" } else { "query" }
    );

    let branch = PrefBranch::new();
    cfg.apply_to(&branch);
    let mut autocomplete =
        AutoComplete::new(branch, StoreSource::Path(cfg.places_db_path.clone()));

    if options.stdio {
        return serve_stdio(&mut autocomplete);
    }

    let params = if options.actions { ENABLE_ACTIONS_PARAM } else { "" };
    let result = autocomplete.search_blocking(&options.query.join(" "), params);
    println!(
        "{}",
        serde_json::to_string_pretty(&SearchResponse::from(result))?
    );
    Ok(())
}

/// Answers one JSON request per input line until stdin closes.
fn serve_stdio(autocomplete: &mut AutoComplete) -> Result<(), RuntimeError> {
    let stdin = io::stdin();
    let mut stdout = io::stdout().lock();
    let mut handled = 0_usize;
    for line in stdin.lock().lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let response = crate::transport::handle_json(autocomplete, &line);
        writeln!(stdout, "{response}")?;
        stdout.flush()?;
        handled += 1;
    }
    info!("stdin closed after {handled} requests");
    Ok(())
}
