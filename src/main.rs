//! Binary entrypoint for the snow globe.
//!
//! Runs the globe against a headless surface; stdin lines and SIGUSR1 stand
//! in for the host's shake input.

use std::io::{self, BufRead, IsTerminal};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use humantime::format_duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{Level, debug, info, warn};
use tracing_subscriber::EnvFilter;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

use rust_snow_globe::config::Configuration;
use rust_snow_globe::decode::FileImageSource;
use rust_snow_globe::events::GlobeCommand;
use rust_snow_globe::scan::discover_images;
use rust_snow_globe::shake::ShakeGesture;
use rust_snow_globe::slideshow::SlideshowController;
use rust_snow_globe::surface::HeadlessSurface;
use rust_snow_globe::tasks::globe;

#[derive(Debug, Parser)]
#[command(
    name = "snow-globe",
    version,
    about = "Snow globe slideshow with shake-to-advance"
)]
struct Args {
    /// Path to YAML config
    #[arg(value_name = "CONFIG", default_value = "config.yaml")]
    config: PathBuf,
    /// Override how long each image is held (e.g. "3s")
    #[arg(long = "display", value_name = "DURATION", value_parser = humantime::parse_duration)]
    display: Option<Duration>,
    /// Override the fade-out length (e.g. "750ms")
    #[arg(long = "fade-out", value_name = "DURATION", value_parser = humantime::parse_duration)]
    fade_out: Option<Duration>,
    /// Deterministic RNG seed for the shake jitter
    #[arg(long = "seed", value_name = "SEED")]
    seed: Option<u64>,
    /// Increase log verbosity (repeatable)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    verbose: u8,
}

fn init_tracing(verbosity: u8) -> Result<()> {
    let level = match verbosity {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn"))
        .add_directive(
            format!("rust_snow_globe={level}")
                .parse()
                .context("invalid log directive")?,
        )
        .add_directive(
            format!("snow_globe={level}")
                .parse()
                .context("invalid log directive")?,
        );
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let Args {
        config,
        display,
        fade_out,
        seed,
        verbose,
    } = Args::parse();
    init_tracing(verbose)?;

    let mut cfg = Configuration::from_yaml_file(&config)
        .with_context(|| format!("failed to load configuration from {}", config.display()))?;
    if let Some(display) = display {
        cfg.slideshow.display_duration = display;
    }
    if let Some(fade_out) = fade_out {
        cfg.slideshow.fade_out_duration = fade_out;
    }
    if seed.is_some() {
        cfg.shake.seed = seed;
    }
    let cfg = cfg.validated().context("invalid configuration values")?;
    info!(
        config = %config.display(),
        display = %format_duration(cfg.slideshow.display_duration),
        fade_out = %format_duration(cfg.slideshow.fade_out_duration),
        max_cached = cfg.slideshow.max_cached_images,
        frame_rate = cfg.frame_rate,
        "configuration loaded"
    );

    let mut images = cfg.images.clone();
    if let Some(root) = cfg.image_library_path.as_deref() {
        let found = discover_images(root)
            .with_context(|| format!("failed to scan {}", root.display()))?;
        info!(root = %root.display(), count = found.len(), "discovered images");
        images.extend(found.into_iter().map(|p| p.to_string_lossy().into_owned()));
    }
    if images.is_empty() {
        warn!("no images configured; the globe will stay empty");
    }

    let (commands_tx, commands_rx) = mpsc::channel::<GlobeCommand>(16);
    let cancel = CancellationToken::new();

    // One command per stdin line; EOF (Ctrl-D) shuts down.
    if io::stdin().is_terminal() {
        let cancel = cancel.clone();
        let commands = commands_tx.clone();
        tokio::task::spawn_blocking(move || {
            for line in io::stdin().lock().lines() {
                let line = match line {
                    Ok(line) => line,
                    Err(err) => {
                        warn!("stdin watcher failed: {err}");
                        break;
                    }
                };
                let command = match line.trim() {
                    "" | "shake" => GlobeCommand::Shake,
                    "next" => GlobeCommand::Advance,
                    "quit" => break,
                    other => {
                        warn!(input = other, "unknown command; expected shake, next or quit");
                        continue;
                    }
                };
                if commands.blocking_send(command).is_err() {
                    return;
                }
            }
            info!("stdin closed; initiating shutdown");
            cancel.cancel();
        });
    } else {
        debug!("stdin is not a terminal; skipping command reader");
    }

    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if let Err(err) = tokio::signal::ctrl_c().await {
                warn!("ctrl-c handler failed: {err}");
                return;
            }
            info!("ctrl-c received; initiating shutdown");
            cancel.cancel();
        });
    }

    #[cfg(unix)]
    {
        let cancel = cancel.clone();
        let commands = commands_tx.clone();
        tokio::spawn(async move {
            match signal(SignalKind::user_defined1()) {
                Ok(mut sigusr1) => loop {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        received = sigusr1.recv() => {
                            if received.is_none() {
                                break;
                            }
                            info!("SIGUSR1 received; shaking globe");
                            if let Err(err) = commands.send(GlobeCommand::Shake).await {
                                warn!("failed to forward shake request: {err}");
                                break;
                            }
                        }
                    }
                },
                Err(err) => warn!("failed to register SIGUSR1 handler: {err}"),
            }
        });
    }
    drop(commands_tx);

    let source = FileImageSource::new(cfg.slideshow.max_texture_size);
    let mut controller = SlideshowController::new(source, cfg.slideshow.clone());
    controller.set_loading_callback(|status| {
        debug!(
            loading = status.is_loading,
            progress = status.progress,
            item = status.current_item.as_deref(),
            "loading progress"
        );
    });
    controller.set_sequence(images);

    let shake = ShakeGesture::new(cfg.shake.clone());
    let host = globe::run(
        controller,
        HeadlessSurface::default(),
        shake,
        commands_rx,
        cancel,
        cfg.frame_interval(),
    )
    .await
    .context("globe task failed")?;

    info!(shown = host.presented.len(), "snow globe exited");
    Ok(())
}
