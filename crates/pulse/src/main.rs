use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use futures::StreamExt;
use pulse_models::progress::{Step, StepStatus};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "pulse", about = "Grounded daily market briefs with cited trade signals")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/pulse.toml", global = true)]
    config: String,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the HTTP API
    Serve {
        /// Override the configured bind address
        #[arg(long)]
        bind: Option<String>,
    },
    /// Run the pipeline once, streaming progress to stderr
    Run {
        /// Print the result as JSON instead of Markdown
        #[arg(long)]
        json: bool,
    },
    /// Print the last successful result
    Show {
        #[arg(long)]
        json: bool,
    },
    /// Validate and store the model API key
    SetKey {
        api_key: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Respects RUST_LOG
    let builder = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr);
    if cli.json_logs {
        builder.json().init();
    } else {
        builder.init();
    }

    let config = pulse::load_config(&cli.config)?;
    let service = pulse::build_service(&config).context("Failed to build service")?;

    match cli.command {
        Command::Serve { bind } => {
            let cancel = CancellationToken::new();
            let shutdown = cancel.clone();
            tokio::spawn(async move {
                let _ = tokio::signal::ctrl_c().await;
                tracing::info!("Received shutdown signal");
                shutdown.cancel();
            });
            let bind = bind.unwrap_or_else(|| config.server.bind.clone());
            pulse::server::serve(service, &bind, cancel).await?;
        }
        Command::Run { json } => {
            let run_id = service
                .start_run()
                .await
                .map_err(|e| anyhow::anyhow!("Run not started: {e}"))?;
            let mut events = service.subscribe_progress(run_id, 1)?;
            let mut succeeded = false;
            while let Some(event) = events.next().await {
                eprintln!(
                    "[{:>2}] {:<16} {:<8} {}",
                    event.seq,
                    event.step.as_str(),
                    status_label(event.status),
                    event.detail
                );
                if event.is_terminal() {
                    succeeded = event.step == Step::Run && event.status == StepStatus::Ok;
                }
            }
            if !succeeded {
                bail!("Run {run_id} failed");
            }
            let result = service
                .get_last_result()?
                .context("Run finished but no result was stored")?;
            print_result(&result, json)?;
        }
        Command::Show { json } => match service.get_last_result()? {
            Some(result) => print_result(&result, json)?,
            None => bail!("No run has completed yet"),
        },
        Command::SetKey { api_key } => {
            service
                .validate_and_store_credential(&api_key)
                .await
                .map_err(|e| anyhow::anyhow!("{e}"))?;
            eprintln!("Credential stored");
        }
    }

    Ok(())
}

fn status_label(status: StepStatus) -> &'static str {
    match status {
        StepStatus::Started => "started",
        StepStatus::Ok => "ok",
        StepStatus::Warning => "warning",
        StepStatus::Failed => "failed",
    }
}

fn print_result(result: &pulse_models::report::RunResult, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(result)?);
    } else {
        println!("{}", result.markdown);
    }
    Ok(())
}
