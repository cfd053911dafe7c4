mod cli;
mod commands;
mod formatting;
mod settings;

use std::process::ExitCode;

use cli::Commands;
use commands::{run_capture, run_clean, run_clone};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    run().await
}

async fn run() -> ExitCode {
    let args = cli::parse();
    init_tracing(args.verbose);

    match args.command {
        Commands::Capture {
            url,
            out,
            attempts,
            policy,
            output,
        } => {
            run_capture(
                args.config,
                args.verbose,
                args.format,
                url,
                out,
                attempts,
                policy,
                output,
            )
            .await
        }
        Commands::Clean {
            input,
            policy,
            output,
        } => run_clean(args.config, args.verbose, args.format, input, policy, output).await,
        Commands::Clone {
            url,
            output,
            attempts,
            policy,
        } => {
            run_clone(
                args.config,
                args.verbose,
                args.format,
                url,
                output,
                attempts,
                policy,
            )
            .await
        }
    }
}

/// Logs go to stderr so stdout stays a clean JSON stream.
fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "sitegrab_lib={default_level},sitegrab={default_level}"
        ))
    });
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
