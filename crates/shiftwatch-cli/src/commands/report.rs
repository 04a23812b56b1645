use shiftwatch_core::{Config, DateSpec};

use super::{open_engine, print_json, CliResult};

/// Current shift, or the shift named by `spec` (`YYYY-MM-DD <shift>`).
pub fn report(config: &Config, spec: Option<&str>, text: bool) -> CliResult {
    let engine = open_engine(config)?;
    let report = match spec {
        Some(spec) => engine.historical_report(&spec.parse::<DateSpec>()?)?,
        None => engine.shift_report()?,
    };
    if text {
        println!("{}", report.render());
        return Ok(());
    }
    print_json(&report)
}

/// One sweep, sending warnings through the configured sink.
pub async fn sweep(config: &Config) -> CliResult {
    let engine = open_engine(config)?;
    let report = engine.sweep().await;
    print_json(&report)?;
    if report.aborted {
        return Err("sweep aborted: activity data unavailable".into());
    }
    Ok(())
}
