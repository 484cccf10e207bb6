//! `posegen` command-line client.
//!
//! Submits a generation job and follows it to completion, printing progress
//! as the transport reports it.

mod metrics;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use posegen_core::{
    create_credential_provider, load_config, validate_config, Config, CredentialProvider,
    GenerationOutcome, GenerationRequest, GenerationTransport, GenerationView, HttpGenerationApi,
    JobSubmitter, RealtimeConnector, SanitizedConfig, SchemaImage, StatusSource, TaskStatus,
    TransportPhase, WsConnector,
};

/// Command-line arguments for posegen
#[derive(Parser, Debug)]
#[command(name = "posegen")]
#[command(about = "Submit pose image generation jobs and follow them to completion")]
#[command(version)]
struct Args {
    /// Configuration file
    #[arg(short, long, default_value = "posegen.toml", env = "POSEGEN_CONFIG")]
    config: PathBuf,

    /// Emit logs as JSON lines
    #[arg(long)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Submit a generation job and follow it until it finishes
    Generate {
        /// Schematic image the generation starts from
        image: PathBuf,

        /// Extra instructions appended to the prompt
        #[arg(short, long)]
        prompt: Option<String>,

        /// Also generate the muscle overlay
        #[arg(long)]
        muscles: bool,

        /// Pose the generated images belong to
        #[arg(long)]
        pose_id: Option<i64>,

        /// Print Prometheus metrics after the run
        #[arg(long)]
        print_metrics: bool,
    },
    /// Fetch the current status of a task once
    Status {
        task_id: String,
    },
    /// Print the effective configuration with secrets redacted
    Config,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_logging(args.log_json);

    if let Err(e) = run(args).await {
        error!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

fn init_logging(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info".into());
    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

async fn run(args: Args) -> Result<()> {
    let config = load_config(&args.config)
        .with_context(|| format!("Failed to load config from {:?}", args.config))?;
    validate_config(&config).context("Configuration validation failed")?;

    match args.command {
        Command::Generate {
            image,
            prompt,
            muscles,
            pose_id,
            print_metrics,
        } => {
            let request = build_request(&image, prompt, muscles, pose_id).await?;
            let result = generate(&config, request).await;
            if print_metrics {
                print!("{}", metrics::encode_metrics());
            }
            result
        }
        Command::Status { task_id } => status(&config, &task_id).await,
        Command::Config => {
            let sanitized = SanitizedConfig::from(&config);
            println!("{}", serde_json::to_string_pretty(&sanitized)?);
            Ok(())
        }
    }
}

async fn build_request(
    image: &Path,
    prompt: Option<String>,
    muscles: bool,
    pose_id: Option<i64>,
) -> Result<GenerationRequest> {
    let schema_image = SchemaImage::load(image)
        .await
        .with_context(|| format!("Failed to read schema image {:?}", image))?;

    Ok(GenerationRequest {
        pose_id,
        schema_image: Some(schema_image),
        additional_prompt: prompt.filter(|p| !p.trim().is_empty()),
        generate_muscles: muscles,
    })
}

fn credentials(config: &Config) -> Result<Arc<dyn CredentialProvider>> {
    let provider = create_credential_provider(&config.auth, &config.api)
        .context("Failed to create credential provider")?;
    info!("Using credentials: {}", provider.method_name());
    Ok(Arc::from(provider))
}

async fn generate(config: &Config, request: GenerationRequest) -> Result<()> {
    let credentials = credentials(config)?;
    let api = Arc::new(
        HttpGenerationApi::new(&config.api, Arc::clone(&credentials))
            .context("Failed to create generation API client")?,
    );
    let connector = Arc::new(WsConnector::new(&config.api, &config.transport.realtime));

    let handle = GenerationTransport::new(
        config.transport.clone(),
        Arc::clone(&api) as Arc<dyn JobSubmitter>,
        api as Arc<dyn StatusSource>,
        connector as Arc<dyn RealtimeConnector>,
        credentials,
    )
    .with_finalize_callback(Arc::new(|outcome: &GenerationOutcome| match outcome {
        GenerationOutcome::Completed { task_id, .. } => {
            info!(task_id = %task_id, "Generation completed")
        }
        GenerationOutcome::Failed { task_id, error } => {
            warn!(task_id = ?task_id, "Generation failed: {}", error)
        }
    }))
    .spawn();

    let mut views = handle.subscribe();
    let task_id = tokio::select! {
        result = handle.start(request) => result.context("Failed to start generation")?,
        _ = shutdown_signal() => {
            handle.shutdown().await;
            bail!("Interrupted before the job was accepted");
        }
    };
    info!(task_id = %task_id, "Following generation");

    let mut last_progress = None;
    let view = loop {
        {
            let view = views.borrow_and_update().clone();
            if last_progress != Some(view.progress) {
                last_progress = Some(view.progress);
                report_progress(&view);
            }
            if view.phase == TransportPhase::Terminal {
                break view;
            }
        }

        tokio::select! {
            changed = views.changed() => {
                if changed.is_err() {
                    bail!("Transport stopped unexpectedly");
                }
            }
            _ = shutdown_signal() => {
                info!("Interrupted, cancelling generation");
                handle.cancel();
                handle.shutdown().await;
                bail!("Generation {} cancelled", task_id);
            }
        }
    };
    handle.shutdown().await;

    println!("{}", serde_json::to_string_pretty(&view)?);
    match view.status {
        Some(TaskStatus::Completed) => Ok(()),
        _ => bail!(
            "Generation failed: {}",
            view.error.as_deref().unwrap_or("unknown error")
        ),
    }
}

fn report_progress(view: &GenerationView) {
    match &view.status_message {
        Some(message) => info!(progress = view.progress, "{}", message),
        None => info!(progress = view.progress, "Generating"),
    }
}

async fn status(config: &Config, task_id: &str) -> Result<()> {
    let api = HttpGenerationApi::new(&config.api, credentials(config)?)
        .context("Failed to create generation API client")?;
    let snapshot = api
        .fetch_status(task_id)
        .await
        .with_context(|| format!("Failed to fetch status of {}", task_id))?;
    println!("{}", serde_json::to_string_pretty(&snapshot)?);
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
