use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use waterfall_core::Outcome;

mod config;
mod pipeline;

const EXIT_CANCELLED: u8 = 124;

use config::PipelineConfig;

#[derive(Parser, Debug)]
#[command(name = "waterfall")]
#[command(about = "Run a pipeline of steps in series, each feeding the next", long_about = None)]
struct Args {
    /// Path to the pipeline file
    #[arg(short, long, default_value = "waterfall.toml", env = "WATERFALL_CONFIG")]
    config: PathBuf,

    /// Terminate the run after this many milliseconds (exits with 124)
    #[arg(long)]
    cancel_after_ms: Option<u64>,

    /// Print the outcome as JSON
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "waterfall=info,waterfall_core=info".into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    tracing::info!("Loading pipeline from {}", args.config.display());
    let config = PipelineConfig::load(&args.config)?;

    let outcome = pipeline::run_pipeline(&config, config.cancel_after(args.cancel_after_ms)).await;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&outcome_json(&outcome))?);
    } else {
        match &outcome {
            Outcome::Completed(values) => println!("completed: {:?}", values),
            Outcome::Failed(error) => println!("failed: {:#}", error),
            Outcome::Cancelled => println!("cancelled"),
        }
    }

    Ok(ExitCode::from(exit_status(&outcome)))
}

/// 0 on success, 1 on a failed step, 124 when the run was terminated
/// (the code `timeout(1)` uses).
fn exit_status<T, E>(outcome: &Outcome<T, E>) -> u8 {
    match outcome {
        Outcome::Completed(_) => 0,
        Outcome::Failed(_) => 1,
        Outcome::Cancelled => EXIT_CANCELLED,
    }
}

fn outcome_json(outcome: &Outcome<pipeline::Values, anyhow::Error>) -> serde_json::Value {
    let mut body = serde_json::json!({ "status": outcome.status() });
    match outcome {
        Outcome::Completed(values) => body["results"] = serde_json::json!(values),
        Outcome::Failed(error) => body["error"] = serde_json::json!(format!("{:#}", error)),
        Outcome::Cancelled => {}
    }
    body
}
