//! CLI status probe for a cwblog database.
//!
//! # Responsibility
//! - Load an optional JSON config and open (and migrate) the database.
//! - Print version, schema version and row counts per table.

use cwblog_core::db::migrations::current_user_version;
use cwblog_core::db::open_configured;
use cwblog_core::{core_version, init_from_config, CoreConfig, EntityKind, EntityStore, SqliteEntityStore};
use log::info;
use std::error::Error;
use std::process::ExitCode;

fn main() -> ExitCode {
    match run(std::env::args().nth(1)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("cwblog_cli: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(config_path: Option<String>) -> Result<(), Box<dyn Error>> {
    let config = match config_path {
        Some(path) => CoreConfig::load(path)?,
        None => CoreConfig::default(),
    };
    init_from_config(&config)?;

    let conn = open_configured(&config)?;
    let store = SqliteEntityStore::blog(&conn)?;

    println!("cwblog_core version={}", core_version());
    println!("schema_version={}", current_user_version(&conn)?);
    for kind in EntityKind::ALL {
        println!("{}={}", kind.table(), store.count(kind)?);
    }
    info!("event=cli_status module=cli status=ok");
    Ok(())
}
