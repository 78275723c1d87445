//! # Punchclock — unattended attendance time-clock automation
//!
//! Drives clock-in/out and break events against a remote attendance service
//! from three triggers: a randomized daily break schedule, host power-state
//! signals, and application startup.
//!
//! Usage:
//!   punchclock run                  # automation daemon
//!   punchclock punch break_begin    # manual, legality-gated punch
//!   punchclock status               # today's state + schedule + token
//!   punchclock events --from 2025-06-01 --to 2025-06-07

use anyhow::{Context, Result, anyhow};
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use tokio::sync::{Mutex, mpsc};
use tracing_subscriber::EnvFilter;

use punchclock_automation::power::{PowerEventAutomator, PowerMonitor, PowerSignal};
use punchclock_automation::schedule::{BreakScheduleEngine, spawn_schedule_loop};
use punchclock_automation::{Notifier, resolver};
use punchclock_client::AttendanceClient;
use punchclock_core::config::AppConfig;
use punchclock_core::traits::AttendanceApi;
use punchclock_core::types::TimeClockKind;

#[derive(Parser)]
#[command(
    name = "punchclock",
    version,
    about = "⏱️ Punchclock — unattended attendance time-clock automation"
)]
struct Cli {
    /// Config file path
    #[arg(long, default_value = "~/.punchclock/config.toml")]
    config: String,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the automation daemon (break schedule + power monitor)
    Run,
    /// Record one time-clock event, gated on legality
    Punch {
        /// clock_in | clock_out | break_begin | break_end
        kind: String,
    },
    /// Show today's state, schedule, and token health
    Status,
    /// List recorded events
    Events {
        /// Start date (YYYY-MM-DD), default today
        #[arg(long)]
        from: Option<String>,
        /// End date (YYYY-MM-DD), default today
        #[arg(long)]
        to: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "punchclock=debug"
    } else {
        "punchclock=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    let config_path = PathBuf::from(shellexpand::tilde(&cli.config).to_string());
    let config = if config_path.exists() {
        AppConfig::load_from(&config_path)?
    } else {
        tracing::info!("No config at {} — using defaults", config_path.display());
        AppConfig::default()
    };

    match cli.command {
        Command::Run => run(config, config_path).await,
        Command::Punch { kind } => punch(config, config_path, &kind).await,
        Command::Status => status(config, config_path).await,
        Command::Events { from, to } => events(config, config_path, from, to).await,
    }
}

/// Build the HTTP client, persisting every token change back to the config
/// file so a restart stays authorized.
fn build_client(config: &AppConfig, config_path: PathBuf) -> Result<Arc<AttendanceClient>> {
    let mut client = AttendanceClient::from_config(config)
        .context("attendance client setup failed — check the [api] config section")?;

    client.set_token_listener(move |tokens| {
        let mut stored = match AppConfig::load_from(&config_path) {
            Ok(c) => c,
            Err(_) => AppConfig::default(),
        };
        stored.api.access_token = Some(tokens.access_token);
        stored.api.refresh_token = Some(tokens.refresh_token);
        stored.api.refresh_token_expires_at = tokens.expires_at;
        if let Err(e) = stored.save_to(&config_path) {
            tracing::warn!("⚠️ Could not persist refreshed tokens: {e}");
        }
    });

    Ok(Arc::new(client))
}

async fn run(config: AppConfig, config_path: PathBuf) -> Result<()> {
    let tz = config.business_timezone()?;
    let client = build_client(&config, config_path)?;
    let api: Arc<dyn AttendanceApi> = client.clone();

    // Presentation layer stand-in: notices go to the log.
    let (notifier, mut notices) = Notifier::channel();
    tokio::spawn(async move {
        while let Some(notice) = notices.recv().await {
            tracing::info!("🔔 {notice:?}");
        }
    });

    let automator = Arc::new(PowerEventAutomator::new(
        api.clone(),
        config.auto_time_clock.clone(),
        config.power_monitor.enabled,
        tz,
        notifier.clone(),
    ));

    // Startup check runs before the loops come up.
    automator.handle(PowerSignal::Startup).await;

    let engine = Arc::new(Mutex::new(BreakScheduleEngine::new(
        config.break_schedule.clone(),
        api,
        tz,
        notifier,
    )));
    let stop_flag = engine.lock().await.stop_flag();
    let schedule_loop = spawn_schedule_loop(engine, 60);

    // Host integrations (desktop shell, logind hook, ...) feed power signals
    // through this channel while the daemon runs.
    let (power_tx, power_rx) = mpsc::channel::<PowerSignal>(16);
    let mut monitor = PowerMonitor::new(automator.clone());
    monitor.start(power_rx);

    tracing::info!("🚀 Punchclock running (business timezone {tz}) — ctrl-c to stop");
    tokio::signal::ctrl_c().await?;

    // Treat termination like an OS shutdown: stop scheduling, then defer
    // exit on the bounded clock-out write.
    tracing::info!("Shutdown requested");
    stop_flag.store(true, Ordering::SeqCst);
    drop(power_tx);
    automator.handle(PowerSignal::ShutdownRequested).await;
    monitor.stop();
    schedule_loop.abort();
    Ok(())
}

async fn punch(config: AppConfig, config_path: PathBuf, kind: &str) -> Result<()> {
    let kind = TimeClockKind::parse(kind)
        .ok_or_else(|| anyhow!("unknown event type '{kind}' (clock_in | clock_out | break_begin | break_end)"))?;
    let tz = config.business_timezone()?;
    let client = build_client(&config, config_path)?;

    let now = Utc::now();
    let today = now.with_timezone(&tz).date_naive();
    let events = client.list_events(today, today).await?;

    if !resolver::can_execute(&events, kind, now) {
        let last = resolver::last_kind(&events)
            .map(|k| k.to_string())
            .unwrap_or_else(|| "none".into());
        println!("❌ {kind} is not legal now (last event today: {last})");
        return Ok(());
    }

    let event = client.record_event(kind).await?;
    println!(
        "✅ Recorded {} at {}",
        event.kind,
        event.datetime.with_timezone(&tz)
    );
    Ok(())
}

async fn status(config: AppConfig, config_path: PathBuf) -> Result<()> {
    let tz = config.business_timezone()?;
    let client = build_client(&config, config_path)?;
    let now = Utc::now();
    let today = now.with_timezone(&tz).date_naive();

    let events = client.list_events(today, today).await?;
    let last = resolver::last_kind(&events)
        .map(|k| k.to_string())
        .unwrap_or_else(|| "none".into());
    let legal: Vec<&str> = resolver::available_actions(&events)
        .iter()
        .map(|k| k.as_str())
        .collect();

    println!("Business date:  {today} ({tz})");
    println!("Events today:   {}", events.len());
    println!("Last event:     {last}");
    println!("Legal actions:  {}", if legal.is_empty() { "none — day is closed".into() } else { legal.join(", ") });

    if config.break_schedule.enabled {
        // Informational preview — the daemon keeps its own jitter for the day.
        let api: Arc<dyn AttendanceApi> = client.clone();
        let mut engine =
            BreakScheduleEngine::new(config.break_schedule.clone(), api, tz, Notifier::disabled());
        engine.generate(today);
        match engine.next_pending(now) {
            Some(entry) => println!(
                "Next break:     {} around {}",
                entry.kind,
                entry.scheduled_at.with_timezone(&tz).format("%H:%M")
            ),
            None => println!("Next break:     none remaining today"),
        }
    } else {
        println!("Next break:     schedule disabled");
    }

    match client.token_remaining_days() {
        Some(days) => println!("Refresh token:  {days} day(s) remaining"),
        None => println!("Refresh token:  no expiry tracked"),
    }
    Ok(())
}

async fn events(
    config: AppConfig,
    config_path: PathBuf,
    from: Option<String>,
    to: Option<String>,
) -> Result<()> {
    let tz = config.business_timezone()?;
    let client = build_client(&config, config_path)?;
    let today = Utc::now().with_timezone(&tz).date_naive();

    let parse = |value: Option<String>| -> Result<NaiveDate> {
        match value {
            Some(s) => s
                .parse()
                .map_err(|e| anyhow!("invalid date '{s}': {e}")),
            None => Ok(today),
        }
    };
    let from = parse(from)?;
    let to = parse(to)?;

    let events = client.list_events(from, to).await?;
    if events.is_empty() {
        println!("No events in {from}..{to}");
        return Ok(());
    }
    for event in events {
        println!(
            "{}  {:<12} (id {})",
            event.datetime.with_timezone(&tz).format("%Y-%m-%d %H:%M:%S"),
            event.kind.to_string(),
            event.id
        );
    }
    Ok(())
}
