//! `anchorsight-cli` – AnchorSight demo session.
//!
//! This binary wires the whole stack together against simulated hardware:
//!
//! 1. Loads `~/.anchorsight/config.toml`, writing the defaults on first run.
//! 2. Opens the SQLite anchor store and seeds the five startup cylinders.
//! 3. Runs the selection loop against a head sweeping left and right, and
//!    prints every highlight change.
//! 4. Places every object (binding it to a world anchor), then tries one
//!    more to show what happens when the anchor budget is spent.
//! 5. Stops after `session_seconds`, or on **Ctrl-C**.

mod config;

use std::sync::Arc;
use std::time::Duration;

use anchorsight_hal::AnchorProvider;
use anchorsight_hal::sim::SweepPoseSource;
use anchorsight_kernel::SelectionReader;
use anchorsight_memory::SqliteAnchorProvider;
use anchorsight_middleware::{Topic, TopicReceiver};
use anchorsight_perception::Vec3;
use anchorsight_runtime::seed::SeedObject;
use anchorsight_runtime::{Session, init_tracing};
use anchorsight_types::{Color, Event, EventPayload, HighlightStatus, SightError};
use colored::Colorize;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Height of the simulated wearer's eyes above the floor plane the
/// cylinders stand on.
const EYE_HEIGHT: f32 = 0.6;
/// Peak head yaw of the sweep, left and right.
const SWEEP_AMPLITUDE_RAD: f32 = 0.9;
/// Time the wearer looks around before placing the objects.
const PLACEMENT_DELAY: Duration = Duration::from_secs(2);

fn main() {
    // Tracing first: the OTLP exporter must exist before the runtime.
    let _telemetry = init_tracing("anchorsight");

    print_banner();

    let cfg = match config::load() {
        Ok(Some(cfg)) => {
            println!(
                "  Config loaded from {}",
                config::config_path().display().to_string().bold()
            );
            cfg
        }
        Ok(None) => first_run(),
        Err(e) => {
            println!("{}: {}", "Config error".red(), e);
            println!("  Using default configuration.");
            config::Config::default()
        }
    };

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("{}: {e}", "Failed to start async runtime".red());
            std::process::exit(1);
        }
    };

    if let Err(e) = runtime.block_on(run(cfg)) {
        eprintln!("{}: {e}", "Session failed".red().bold());
        std::process::exit(1);
    }
}

async fn run(cfg: config::Config) -> Result<(), SightError> {
    let cancel = CancellationToken::new();
    let ctrlc_token = cancel.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "⚠  Ctrl-C received – shutting down …".yellow().bold());
        ctrlc_token.cancel();
    }) {
        warn!(error = %e, "Failed to install Ctrl-C handler");
    }

    if let Some(parent) = cfg.anchor_db_path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| SightError::Storage(format!("cannot create {}: {e}", parent.display())))?;
    }
    let provider = Arc::new(SqliteAnchorProvider::open(&cfg.anchor_db_path, cfg.anchor_capacity)?);
    release_stale_anchors(&provider).await?;

    let pose = Arc::new(SweepPoseSource::new(EYE_HEIGHT, SWEEP_AMPLITUDE_RAD, cfg.sweep_period_seconds));
    let session = Session::start(pose, provider.clone(), cfg.bind_failure_policy).await?;
    println!(
        "  {} startup objects, anchor budget {}, failure policy {}\n",
        session.objects().len().to_string().bold(),
        cfg.anchor_capacity.to_string().bold(),
        cfg.bind_failure_policy.to_string().bold()
    );

    let printer = tokio::spawn(print_notifications(
        session.bus().subscribe_to(Topic::Anchoring),
        session.bus().subscribe_to(Topic::Lifecycle),
        session.selection(),
        cancel.clone(),
    ));
    let selection = session.start_selection();

    tokio::select! {
        biased;
        _ = cancel.cancelled() => {}
        _ = tokio::time::sleep(PLACEMENT_DELAY) => place_everything(&session).await,
    }

    tokio::select! {
        biased;
        _ = cancel.cancelled() => {}
        _ = tokio::time::sleep(Duration::from_secs(cfg.session_seconds)) => {
            info!(seconds = cfg.session_seconds, "session time elapsed");
        }
    }

    selection.shutdown().await?;
    cancel.cancel();
    if let Err(e) = printer.await {
        warn!(error = %e, "notification printer failed");
    }

    let anchored = session.world().lock().anchored().len();
    println!();
    println!(
        "  {} {} object(s) anchored, {} anchor(s) on disk at {}",
        "✓".green().bold(),
        anchored,
        provider.count()?,
        cfg.anchor_db_path.display().to_string().dimmed()
    );
    Ok(())
}

/// Anchors from earlier runs belong to objects that no longer exist; the
/// startup content is seeded fresh every session.
async fn release_stale_anchors(provider: &SqliteAnchorProvider) -> Result<(), SightError> {
    let stale = provider.anchors().await.map_err(|e| SightError::Storage(e.to_string()))?;
    if stale.is_empty() {
        return Ok(());
    }
    println!(
        "  Releasing {} anchor(s) left by a previous session",
        stale.len().to_string().bold()
    );
    for anchor in stale {
        provider
            .remove_anchor(anchor.id)
            .await
            .map_err(|e| SightError::Storage(e.to_string()))?;
    }
    Ok(())
}

/// Bind every startup object concurrently, then place one object too many.
async fn place_everything(session: &Session) {
    println!("{}", "  Placing objects …".cyan());
    let mut binds = JoinSet::new();
    for id in session.objects().iter().copied() {
        let binder = session.binder();
        binds.spawn(async move { binder.bind(id).await });
    }
    while let Some(result) = binds.join_next().await {
        match result {
            // Failures are reported through the bus.
            Ok(_) => {}
            Err(e) => warn!(error = %e, "bind task failed"),
        }
    }

    let extra = SeedObject::cylinder(Color::MAGENTA, Vec3::new(0.0, 0.0, -3.0));
    let id = session
        .world()
        .lock()
        .spawn_object(extra.name.clone(), extra.color, extra.node());
    if let Err(e) = session.binder().bind(id).await {
        info!(error = %e, "extra placement refused");
    }
}

async fn print_notifications(
    mut anchoring: TopicReceiver,
    mut lifecycle: TopicReceiver,
    mut selection: SelectionReader,
    cancel: CancellationToken,
) {
    let mut revision = selection.current().revision;
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            Some(event) = anchoring.recv() => print_event(&event),
            Some(event) = lifecycle.recv() => print_event(&event),
            Some(snap) = selection.changed() => {
                if snap.revision != revision {
                    revision = snap.revision;
                    print_highlight(&snap.status());
                }
            }
            else => break,
        }
    }
}

fn print_highlight(status: &HighlightStatus) {
    match status {
        HighlightStatus::Highlighted { .. } => println!("  {} {}", "◎".magenta().bold(), status.to_string().bold()),
        HighlightStatus::None => println!("  {} {}", "○".dimmed(), status.to_string().dimmed()),
    }
}

fn print_event(event: &Event) {
    match &event.payload {
        EventPayload::AnchorPersisted { object, anchor_id } => {
            println!("  {} {object} anchored ({})", "⚓".green(), anchor_id.to_string().dimmed());
        }
        EventPayload::AnchorCapacityExceeded { object_name, .. } => {
            let message = SightError::AnchorCapacityExceeded {
                object_name: object_name.clone(),
            };
            println!("  {} {}", "✗".red().bold(), message.to_string().red());
        }
        EventPayload::AnchorFailed { anchor_id, cause, .. } => {
            let message = SightError::AnchorFailed {
                anchor_id: *anchor_id,
                cause: cause.clone(),
            };
            println!("  {} {}", "✗".red().bold(), message.to_string().red());
        }
        EventPayload::ObjectRemoved { name, .. } => {
            println!("  {} {} removed from the scene", "–".yellow(), name.bold());
        }
        EventPayload::HighlightChanged(status) => print_highlight(status),
    }
}

fn first_run() -> config::Config {
    let cfg = match config::defaults_with_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            println!("{}: {}", "Config error".red(), e);
            config::Config::default()
        }
    };
    match config::save(&cfg) {
        Ok(()) => println!(
            "  {} Default config written to {}",
            "✓".green().bold(),
            config::config_path().display().to_string().bold()
        ),
        Err(e) => println!("{}: {}", "Error saving config".red(), e),
    }
    cfg
}

fn print_banner() {
    println!();
    println!("{}", r#"    ___                __                _____ _       __    __ "#.bold().cyan());
    println!("{}", r#"   /   |  ____  _____/ /_  ____  _____/ ___/(_)___ _/ /_  / /_"#.bold().cyan());
    println!("{}", r#"  / /| | / __ \/ ___/ __ \/ __ \/ ___/\__ \/ / __ `/ __ \/ __/"#.bold().cyan());
    println!("{}", r#" / ___ |/ / / / /__/ / / / /_/ / /   ___/ / / /_/ / / / / /_  "#.bold().cyan());
    println!("{}", r#"/_/  |_/_/ /_/\___/_/ /_/\____/_/   /____/_/\__, /_/ /_/\__/  "#.bold().cyan());
    println!("{}", r#"                                           /____/             "#.bold().cyan());
    println!();
    println!(
        "  {} {}",
        "AnchorSight".bold(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("  Gaze selection & world-anchor persistence");
    println!();
}
