use serde_json::json;
use shiftwatch_core::commands::parse_participant_id;
use shiftwatch_core::Config;

use super::{open_engine, print_json, CliResult};

pub fn status(config: &Config) -> CliResult {
    let engine = open_engine(config)?;
    print_json(&engine.status()?)
}

pub fn ignore(config: &Config, id: &str) -> CliResult {
    let id = parse_participant_id(id)?;
    let outcome = open_engine(config)?.ignore(id)?;
    print_json(&json!({ "participant_id": id, "outcome": outcome }))
}

pub fn unignore(config: &Config, id: &str) -> CliResult {
    let id = parse_participant_id(id)?;
    let outcome = open_engine(config)?.unignore(id)?;
    print_json(&json!({ "participant_id": id, "outcome": outcome }))
}

pub fn ignored(config: &Config) -> CliResult {
    let ids = open_engine(config)?.ignored()?;
    print_json(&ids)
}

pub fn reset(config: &Config, confirm: bool) -> CliResult {
    if !confirm {
        return Err("refusing to delete all activity data without --confirm".into());
    }
    open_engine(config)?.reset_all()?;
    print_json(&json!({ "reset": true }))
}
