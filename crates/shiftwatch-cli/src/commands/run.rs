//! Bot daemon: Telegram polling plus the periodic sweep.

use std::sync::Arc;

use shiftwatch_core::integrations::{TelegramBot, TelegramClient};
use shiftwatch_core::{
    ActivityDb, ActivityEngine, AdminDesk, AdminSessions, Config, SweepScheduler, SystemClock,
};
use tokio_util::sync::CancellationToken;

use super::CliResult;

pub async fn run(config: &Config) -> CliResult {
    // Everything is validated before the first network call.
    let engine_config = config.engine_config()?;
    let channels = config.channels()?;
    let client = Arc::new(TelegramClient::new(
        &config.telegram.api_base,
        config.bot_token()?,
    )?);
    let db_path = config.database_path()?;
    let db = ActivityDb::open_at(&db_path)?;

    let session_ttl = engine_config.session_ttl();
    let engine = Arc::new(ActivityEngine::new(
        Arc::new(db),
        client.clone(),
        Arc::new(SystemClock),
        engine_config,
        channels.report,
    ));
    engine.restore_settings();

    let sessions = Arc::new(AdminSessions::new(session_ttl));
    let desk = Arc::new(AdminDesk::new(engine.clone(), sessions.clone(), channels.admin));
    let bot = TelegramBot::new(engine.clone(), desk, client.clone(), channels);

    let config_snapshot = engine.config();
    tracing::info!(
        db = %db_path.display(),
        timeout_minutes = config_snapshot.timeout_minutes(),
        interval_ms = config_snapshot.sweep_interval().as_millis() as u64,
        "shiftwatch started"
    );

    let cancel = CancellationToken::new();
    let scheduler = SweepScheduler::new(engine)
        .with_sessions(sessions)
        .spawn(cancel.clone());

    let shutdown = cancel.clone();
    tokio::spawn(async move {
        match shutdown_signal().await {
            Ok(signal) => {
                tracing::info!(signal, "shutdown requested");
                shutdown.cancel();
            }
            Err(e) => tracing::error!(error = %e, "failed to install signal handlers"),
        }
    });

    bot.run(&client, config.telegram.poll_timeout_secs, cancel.clone())
        .await;
    cancel.cancel();

    let ticks = scheduler.await?;
    tracing::info!(ticks, "shiftwatch stopped");
    Ok(())
}

/// Resolves on SIGINT or, on unix, SIGTERM.
async fn shutdown_signal() -> std::io::Result<&'static str> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate())?;
        tokio::select! {
            res = tokio::signal::ctrl_c() => res.map(|()| "SIGINT"),
            _ = sigterm.recv() => Ok("SIGTERM"),
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await.map(|()| "ctrl-c")
    }
}
