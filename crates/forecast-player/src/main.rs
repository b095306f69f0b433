use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use crossterm::event::{
    DisableFocusChange, DisableMouseCapture, EnableFocusChange, EnableMouseCapture,
};
use forecast_player::display::TerminalSink;
use forecast_player::{HttpSource, InputRouter, Intent, Session, SessionEvent, SessionSettings};
use forecast_proto::config::Config;
use tokio::sync::mpsc;

#[derive(Parser, Debug)]
#[command(name = "forecast-player", about = "Animate a station's wave forecast frames")]
struct Args {
    /// Station to play (overrides config)
    #[arg(short, long)]
    station: Option<String>,

    /// Forecast server base URL (overrides config)
    #[arg(short, long)]
    base_url: Option<String>,

    /// Initial playback period in milliseconds
    #[arg(short, long)]
    period_ms: Option<u64>,

    /// Config file to use instead of the default location
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Do not warm the frame cache on startup
    #[arg(long)]
    no_prefetch: bool,
}

/// Restores cooked mode however the player exits.
struct RawModeGuard;

impl RawModeGuard {
    fn enable() -> anyhow::Result<Self> {
        crossterm::terminal::enable_raw_mode().context("failed to enable raw mode")?;
        crossterm::execute!(std::io::stdout(), EnableMouseCapture, EnableFocusChange)
            .context("failed to enable mouse and focus reporting")?;
        Ok(Self)
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let _ = crossterm::execute!(std::io::stdout(), DisableFocusChange, DisableMouseCapture);
        let _ = crossterm::terminal::disable_raw_mode();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let data_dir = forecast_proto::platform::data_dir();
    std::fs::create_dir_all(&data_dir)?;
    let log_path = data_dir.join("player.log");
    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)?;

    // Allow RUST_LOG override; keep HTTP client internals quiet by default.
    let log_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        "info,forecast_player=debug,hyper_util=warn,reqwest=warn,hyper=warn".to_string()
    });
    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_env_filter(log_filter.as_str())
        .with_ansi(false)
        .init();

    eprintln!("forecast-player log: {}", log_path.display());

    // ── Load config ──────────────────────────────────────────────────────────
    let mut config = match &args.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load().unwrap_or_default(),
    };
    if let Some(station) = args.station {
        config.playback.station = station;
    }
    if let Some(base_url) = args.base_url {
        config.source.base_url = base_url;
    }
    if let Some(period_ms) = args.period_ms {
        config.playback.default_period_ms = period_ms;
    }
    if args.no_prefetch {
        config.playback.prefetch = false;
    }
    if config.playback.station.is_empty() {
        anyhow::bail!(
            "no station given: pass --station or set playback.station in {}",
            Config::config_path().display()
        );
    }

    tracing::info!(
        "forecast-player starting: station={} source={}",
        config.playback.station,
        config.source.base_url
    );

    let source = Arc::new(HttpSource::new(&config.source)?);
    let router = InputRouter::from_config(&config.playback);
    let (event_tx, event_rx) = mpsc::channel::<SessionEvent>(64);

    let session = Session::new(
        source,
        SessionSettings::from_config(&config),
        router.clone(),
        Arc::new(TerminalSink),
        event_tx.clone(),
    );

    let _raw = RawModeGuard::enable()?;

    // ── Terminal reader (blocking) → session events ──────────────────────────
    std::thread::spawn(move || {
        let mut scroll_px = 0i64;
        loop {
            let event = match crossterm::event::read() {
                Ok(event) => event,
                Err(e) => {
                    tracing::error!("terminal input failed: {}", e);
                    let _ = event_tx.blocking_send(SessionEvent::Shutdown);
                    break;
                }
            };
            let Some(intent) = router.map_event(event, &mut scroll_px) else {
                continue;
            };
            if event_tx.blocking_send(SessionEvent::Input(intent)).is_err() || intent == Intent::Quit {
                break;
            }
        }
    });

    session.run(event_rx).await
}
