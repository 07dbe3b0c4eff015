//! Sound-Logger: field acoustic data logger with local storage and
//! store-and-forward remote synchronization.

mod aggregate;
mod app;
mod config;
mod error;
mod recorder;
mod sampler;
mod scheduler;
mod store;
mod supervisor;
mod sync;
#[cfg(test)]
mod tests;

pub(crate) use error::{AppError, Result as AppResult};

use crate::app::Application;
use crate::config::{EnvConfig, PARAMETERS_PATH, Parameters};

use std::path::Path;
use std::process::ExitCode;

use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Application entry point.
fn main() -> ExitCode {
    // Configuration problems must be visible before logging goes to file.
    let env = match EnvConfig::load() {
        Ok(env) => env,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            return ExitCode::from(2);
        }
    };

    let Ok(_log_guard) = init_logging(&env) else {
        eprintln!("Failed to initialize logging in {:?}", env.log_dir);
        return ExitCode::from(2);
    };

    let parameters = match Parameters::load(Path::new(PARAMETERS_PATH)) {
        Ok(parameters) => parameters,
        Err(e) => {
            error!(error = %e, "Invalid parameters file");
            eprintln!("Invalid parameters file: {e}");
            return ExitCode::from(2);
        }
    };

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            error!(error = %e, "Failed to create tokio runtime");
            return ExitCode::from(1);
        }
    };

    runtime.block_on(async move {
        let shutdown = CancellationToken::new();
        let app = Application::new(env, parameters);

        let mut app_task = tokio::spawn(app.run(shutdown.clone()));

        let result = tokio::select! {
            () = wait_for_signal() => {
                info!("Shutdown signal received");
                shutdown.cancel();
                app_task.await
            }
            // The application only returns on its own after an
            // unrecoverable startup error or a completed shutdown.
            result = &mut app_task => {
                shutdown.cancel();
                result
            }
        };

        match result {
            Ok(Ok(())) => ExitCode::SUCCESS,
            Ok(Err(e)) => {
                error!(error = %e, "Application error at shutdown");
                ExitCode::from(1)
            }
            Err(e) => {
                error!(error = %e, "Application task panicked");
                ExitCode::from(1)
            }
        }
    })
}

/// File logging with daily rotation under the configured log directory.
fn init_logging(
    env: &EnvConfig,
) -> Result<tracing_appender::non_blocking::WorkerGuard, std::io::Error> {
    std::fs::create_dir_all(&env.log_dir)?;

    let appender = tracing_appender::rolling::daily(&env.log_dir, "app.log");
    let (writer, guard) = tracing_appender::non_blocking(appender);

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("sound_logger=info")),
        )
        .with_writer(writer)
        .with_ansi(false)
        .init();

    Ok(guard)
}

/// Completes on SIGINT or SIGTERM.
async fn wait_for_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut term = match signal(SignalKind::terminate()) {
            Ok(term) => term,
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                let _ = tokio::signal::ctrl_c().await;
                return;
            }
        };

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = term.recv() => {}
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
