use std::fs::{self, OpenOptions};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;

use retrace::capture::{run_capture, CaptureConfig, CaptureSession, EventTape, TapeFeed};
use retrace::config::Settings;
use retrace::core::{SessionOrchestrator, TerminalState};
use retrace::util;
use retrace::verify::{CargoHarness, MockHarness, TestHarness};
use retrace::ReproBundle;

#[derive(Parser)]
#[command(
    name = "retrace",
    version,
    about = "Reproduces observed program failures as standalone regression tests"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the full pipeline over a recorded event tape
    Run {
        /// Event tape recorded from an instrumented run
        #[arg(long)]
        tape: PathBuf,

        /// Target program name for the session record (defaults to the
        /// tape file stem)
        #[arg(long)]
        target: Option<String>,

        /// Settings file (TOML)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Artifact output root (overrides settings)
        #[arg(long)]
        out: Option<PathBuf>,

        /// Cargo.toml of the crate the generated test links against
        #[arg(long)]
        target_manifest: Option<PathBuf>,

        /// Skip the verification stage
        #[arg(long)]
        no_verify: bool,

        /// Also export a repro bundle zip to this path
        #[arg(long)]
        bundle: Option<PathBuf>,
    },

    /// Summarize the trace a tape reconstructs, without analyzing it
    Inspect {
        #[arg(long)]
        tape: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging to file (~/.retrace/logs/retrace.log)
    fs::create_dir_all(util::logs_dir())?;

    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(util::log_file_path())?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(log_file)
        .with_ansi(false) // Disable ANSI colors in log file
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Run {
            tape,
            target,
            config,
            out,
            target_manifest,
            no_verify,
            bundle,
        } => {
            run_pipeline(tape, target, config, out, target_manifest, no_verify, bundle).await
        }
        Command::Inspect { tape } => inspect_tape(tape).await,
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_pipeline(
    tape: PathBuf,
    target: Option<String>,
    config: Option<PathBuf>,
    out: Option<PathBuf>,
    target_manifest: Option<PathBuf>,
    no_verify: bool,
    bundle: Option<PathBuf>,
) -> Result<()> {
    let mut settings = match &config {
        Some(path) => Settings::load(path)
            .with_context(|| format!("could not load settings from {}", path.display()))?,
        None => Settings::default(),
    };
    if let Some(out) = out {
        settings.output_dir = out;
    }
    if target_manifest.is_some() {
        settings.target_manifest = target_manifest;
    }
    if no_verify {
        settings.verify = false;
    }

    let loaded = EventTape::read_jsonl_from_path(&tape)
        .with_context(|| format!("could not read event tape {}", tape.display()))?;
    let target = target.unwrap_or_else(|| {
        tape.file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "unknown-target".to_string())
    });

    let harness: Arc<dyn TestHarness> = if settings.verify {
        Arc::new(
            CargoHarness::new(settings.harness_config())
                .context("verification harness unavailable; pass --no-verify to skip it")?,
        )
    } else {
        // Verification disabled: the harness is never invoked.
        Arc::new(MockHarness::passing())
    };

    let orchestrator = SessionOrchestrator::new(settings.pipeline_config(), harness);
    let result = orchestrator.run(&target, TapeFeed::new(loaded)).await;

    if let Some(artifacts) = &result.artifacts {
        if let Some(dir) = artifacts.source_path.parent() {
            fs::write(
                dir.join("result.json"),
                serde_json::to_vec_pretty(&result)?,
            )?;
        }
    }
    if let Some(bundle_path) = bundle {
        ReproBundle::create(&bundle_path, &result, Some(&tape))
            .with_context(|| format!("could not export bundle to {}", bundle_path.display()))?;
    }

    println!("{}", serde_json::to_string_pretty(&result)?);
    if let TerminalState::Failed { .. } = result.state {
        std::process::exit(1);
    }
    Ok(())
}

async fn inspect_tape(tape: PathBuf) -> Result<()> {
    let loaded = EventTape::read_jsonl_from_path(&tape)
        .with_context(|| format!("could not read event tape {}", tape.display()))?;
    let target = tape
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "unknown-target".to_string());

    let session = CaptureSession::begin(&target);
    let trace = run_capture(
        TapeFeed::new(loaded),
        session,
        &CaptureConfig::default(),
        CancellationToken::new(),
    )
    .await?;

    println!("{}", serde_json::to_string_pretty(&trace.summary())?);
    Ok(())
}
