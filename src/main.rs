use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::io::AsyncBufReadExt;
use tracing::{info, warn};

use flowsentry::cascade::ModelSet;
use flowsentry::config::SentryConfig;
use flowsentry::event::PacketEvent;
use flowsentry::sink::{DetectionSink, FanoutSink, HttpSink, LogSink};

#[derive(Parser)]
#[command(
    name = "flowsentry",
    about = "Flow-based network intrusion detection core",
    version,
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the detection pipeline, reading packet events as JSON lines on stdin
    Run {
        /// Path to a TOML config file (defaults apply when omitted)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Path to a classifier model file (embedded defaults when omitted)
        #[arg(long)]
        models: Option<PathBuf>,
    },

    /// Validate a config file and exit
    CheckConfig {
        /// Path to the TOML config file
        #[arg(long)]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run { config, models } => {
            let config = match config {
                Some(path) => SentryConfig::load(&path)
                    .with_context(|| format!("loading config from {}", path.display()))?,
                None => SentryConfig::default(),
            };
            // Config errors must fail before any packet is processed.
            config.validate()?;

            let models = match models {
                Some(path) => ModelSet::load(&path),
                None => ModelSet::embedded(),
            };

            let sink: Arc<dyn DetectionSink> = match &config.report_url {
                Some(url) => {
                    info!(%url, "reporting detections over HTTP");
                    Arc::new(FanoutSink::new(vec![
                        Arc::new(LogSink),
                        Arc::new(HttpSink::new(url)),
                    ]))
                }
                None => Arc::new(LogSink),
            };

            info!("starting flowsentry pipeline");
            let handle = flowsentry::start_pipeline(&config, models, sink);
            let sender = handle.sender();

            // Capture collaborator boundary: one JSON packet event per
            // stdin line.
            let reader_cancel = handle.cancellation_token();
            let reader = tokio::spawn(async move {
                let stdin = tokio::io::BufReader::new(tokio::io::stdin());
                let mut lines = stdin.lines();
                let mut parse_errors: u64 = 0;
                loop {
                    let line = tokio::select! {
                        _ = reader_cancel.cancelled() => break,
                        line = lines.next_line() => line,
                    };
                    match line {
                        Ok(Some(line)) => {
                            if line.trim().is_empty() {
                                continue;
                            }
                            match serde_json::from_str::<PacketEvent>(&line) {
                                Ok(event) => {
                                    if sender.send(event).await.is_err() {
                                        break;
                                    }
                                }
                                Err(e) => {
                                    parse_errors += 1;
                                    warn!(error = %e, total = parse_errors, "unparsable packet event dropped");
                                }
                            }
                        }
                        Ok(None) => {
                            info!("event input closed");
                            break;
                        }
                        Err(e) => {
                            warn!(error = %e, "failed to read event input");
                            break;
                        }
                    }
                }
            });

            tokio::signal::ctrl_c()
                .await
                .context("listening for shutdown signal")?;
            info!("shutdown signal received");

            handle.shutdown().await;
            reader.abort();
        }
        Commands::CheckConfig { config } => {
            let loaded = SentryConfig::load(&config)
                .with_context(|| format!("loading config from {}", config.display()))?;
            println!("Configuration OK");
            println!("  idle timeout:       {}s", loaded.idle_timeout_secs);
            println!("  max flow lifetime:  {}s", loaded.max_flow_lifetime_secs);
            println!("  evaluation period:  {}ms", loaded.evaluation_period_ms);
            println!("  normal acceptance:  {}", loaded.normal_acceptance_threshold);
            println!("  default threshold:  {}", loaded.default_attack_threshold);
            for (family, threshold) in &loaded.attack_thresholds {
                println!("  {} threshold: {}", family, threshold);
            }
            if loaded.demo_override_enabled {
                println!("  WARNING: demo signature override is enabled");
            }
        }
    }

    Ok(())
}
