use clap::Parser;
use datatask::cli::{self, Cli, EXIT_SETUP_ERROR};
use datatask::{Config, jobs};
use std::path::Path;
use std::process::ExitCode;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

const LOG_FILE: &str = "data_tasks.log";

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let args = Cli::parse();

    let mut stdout = std::io::stdout();
    let registry = jobs::default_registry();

    // Listing needs no configuration and creates no files
    if args.list_tasks {
        return match cli::list_tasks(&registry, &mut stdout) {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                eprintln!("Error: {e}");
                ExitCode::from(EXIT_SETUP_ERROR)
            }
        };
    }

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            return ExitCode::from(EXIT_SETUP_ERROR);
        }
    };

    let _guard = init_tracing(config.debug, &config.paths.log_dir);

    match cli::run(&args, registry, config, &mut stdout).await {
        Ok(outcome) => ExitCode::from(args.exit_code(&outcome)),
        Err(e) => {
            tracing::error!(error = %e, "run failed");
            eprintln!("Error: {e}");
            ExitCode::from(EXIT_SETUP_ERROR)
        }
    }
}

/// Console logging plus a plain-text log file when `log_dir` can be created
///
/// The returned guard flushes the file writer on drop.
fn init_tracing(debug: bool, log_dir: &Path) -> Option<WorkerGuard> {
    let default_filter = if debug { "datatask=debug" } else { "datatask=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into());

    let (file_layer, guard) = match std::fs::create_dir_all(log_dir) {
        Ok(()) => {
            let appender = tracing_appender::rolling::never(log_dir, LOG_FILE);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(false)
                .with_line_number(true);
            (Some(layer), Some(guard))
        }
        Err(_) => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .init();

    guard
}
