use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use saturation_viewer::config::Configuration;
use saturation_viewer::events::{PreviewMode, ProcessorEvent, ProcessorJob, ViewerCommand};
use saturation_viewer::gpu::texture::TextureOrigin;
use saturation_viewer::processing::filter_state::FilterState;
use saturation_viewer::processing::saturation::SaturationParams;
use saturation_viewer::source::PhotoAsset;
use saturation_viewer::{export, tasks};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

#[derive(Debug, Parser)]
#[command(
    name = "saturation-viewer",
    version,
    about = "Real-time saturation preview and export for a still photograph"
)]
struct Args {
    /// Path to YAML config (built-in defaults when omitted)
    #[arg(value_name = "CONFIG")]
    config: Option<PathBuf>,
    /// Bundled photograph to show
    #[arg(long, value_enum)]
    asset: Option<PhotoAsset>,
    /// Explicit image path; overrides --asset
    #[arg(long = "image", value_name = "PATH")]
    image: Option<PathBuf>,
    /// Preview mode at startup
    #[arg(long, value_enum)]
    mode: Option<PreviewMode>,
    /// Initial saturation in [0, 2]
    #[arg(long)]
    saturation: Option<f32>,
    /// Row order of the uploaded texture
    #[arg(long = "texture-origin", value_enum)]
    texture_origin: Option<TextureOrigin>,
    /// Filter the image once, write it as JPEG to OUT, and exit without a window
    #[arg(long = "process", value_name = "OUT")]
    process: Option<PathBuf>,
    /// Raise log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Args {
    fn apply_overrides(&self, cfg: &mut Configuration) {
        if let Some(asset) = self.asset {
            cfg.asset = asset;
        }
        if let Some(image) = &self.image {
            cfg.source_path = Some(image.clone());
        }
        if let Some(mode) = self.mode {
            cfg.initial_mode = mode;
        }
        if let Some(saturation) = self.saturation {
            cfg.saturation.initial = saturation;
        }
        if let Some(origin) = self.texture_origin {
            cfg.texture_origin = origin;
        }
    }
}

fn default_filter(verbose: u8) -> EnvFilter {
    match verbose {
        0 => EnvFilter::new("info"),
        1 => EnvFilter::new("info,saturation_viewer=debug"),
        _ => EnvFilter::new("info,saturation_viewer=trace"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // RUST_LOG wins over -v
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter(args.verbose)),
        )
        .with_target(false)
        .compact()
        .init();

    let mut cfg = match &args.config {
        Some(path) => Configuration::from_yaml_file(path)
            .with_context(|| format!("failed to load configuration from {}", path.display()))?,
        None => Configuration::default(),
    };
    args.apply_overrides(&mut cfg);
    let cfg = cfg.validated().context("invalid configuration values")?;
    tracing::debug!("effective configuration:\n{:#?}", cfg);

    let source_path = cfg.source_path();
    let params = SaturationParams::new(cfg.saturation.initial);

    if let Some(out) = &args.process {
        let image = tasks::snapshot::process(&source_path, params)
            .with_context(|| format!("failed to process {}", source_path.display()))?;
        export::save(&image, out).with_context(|| format!("failed to export {}", out.display()))?;
        tracing::info!(
            source = %source_path.display(),
            out = %out.display(),
            saturation = params.saturation(),
            "headless export complete"
        );
        return Ok(());
    }

    let filter_state = Arc::new(FilterState::new(params));
    let (jobs_tx, jobs_rx) = mpsc::unbounded_channel::<ProcessorJob>(); // Viewer -> Processor
    let (results_tx, results_rx) = mpsc::unbounded_channel::<ProcessorEvent>(); // Processor -> Viewer
    let (control_tx, control_rx) = mpsc::unbounded_channel::<ViewerCommand>(); // External -> Viewer

    let cancel = CancellationToken::new();

    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if let Err(err) = tokio::signal::ctrl_c().await {
                tracing::warn!("ctrl-c handler failed: {err}");
                return;
            }
            tracing::info!("ctrl-c received; initiating shutdown");
            cancel.cancel();
        });
    }

    #[cfg(unix)]
    {
        let cancel = cancel.clone();
        let control = control_tx.clone();
        tokio::spawn(async move {
            match signal(SignalKind::user_defined1()) {
                Ok(mut sigusr1) => loop {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        received = sigusr1.recv() => {
                            if received.is_none() {
                                break;
                            }
                            tracing::info!("SIGUSR1 received; toggling preview mode");
                            if control.send(ViewerCommand::ToggleMode).is_err() {
                                tracing::warn!("viewer is gone; dropping mode toggle");
                                break;
                            }
                        }
                    }
                },
                Err(err) => tracing::warn!("failed to register SIGUSR1 handler: {err}"),
            }
        });
    }
    drop(control_tx);

    let processor = tokio::spawn({
        let cancel = cancel.clone();
        let snapshot_source = source_path.clone();
        async move {
            tasks::snapshot::run(snapshot_source, jobs_rx, results_tx, cancel)
                .await
                .context("snapshot task failed")
        }
    });

    // The viewer owns the main thread until the window closes or cancellation occurs
    let viewer_result = tasks::viewer::run_windowed(
        cfg,
        source_path,
        filter_state,
        jobs_tx,
        results_rx,
        control_rx,
        cancel.clone(),
    )
    .context("viewer failed");
    if let Err(e) = &viewer_result {
        tracing::error!("{e:?}");
    }
    cancel.cancel();

    match processor.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::error!("task error: {e:?}"),
        Err(e) => tracing::error!("join error: {e}"),
    }

    viewer_result
}
