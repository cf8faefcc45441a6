use clap::Parser;
use std::process::ExitCode;
use std::sync::Arc;

use config::DashboardConfig;
use engine::DockerEngine;

mod cli;
mod config;
mod engine;
mod signals;
mod stream;
mod web;

#[tokio::main]
async fn main() -> ExitCode {
    // A missing .env file is fine
    let _ = dotenv::dotenv();

    // Initialize the logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = match DashboardConfig::try_from(cli::Args::parse()) {
        Ok(config) => config,
        Err(err) => {
            log::error!("{err}");
            return ExitCode::FAILURE;
        }
    };

    let engine = match DockerEngine::connect(&config.docker_host).await {
        Ok(engine) => engine,
        Err(err) => {
            log::error!("{err}");
            return ExitCode::FAILURE;
        }
    };

    let listener = match tokio::net::TcpListener::bind(config.listen).await {
        Ok(listener) => listener,
        Err(err) => {
            log::error!("Unable to listen on {}: {err}", config.listen);
            return ExitCode::FAILURE;
        }
    };

    log::info!(
        "Dockhand listening on {} (DOCKER_HOST={})",
        config.listen,
        config.docker_host
    );
    if config.token.is_some() {
        log::info!("Bearer token authentication enabled");
    }
    if !config.allow_actions {
        log::info!("Container actions are disabled");
    }

    let state = match web::AppState::new(Arc::new(engine), config) {
        Ok(state) => state,
        Err(err) => {
            log::error!("Unable to load templates: {err}");
            return ExitCode::FAILURE;
        }
    };

    let _ = sd_notify::notify(true, &[sd_notify::NotifyState::Ready]);

    // Open log streams never finish on their own, so the server is dropped
    // rather than drained once a stop signal arrives.
    tokio::select! {
        result = web::serve(listener, state) => {
            if let Err(err) = result {
                log::error!("Server error: {err}");
                return ExitCode::FAILURE;
            }
        }
        _ = signals::shutdown_signal() => {}
    }

    ExitCode::SUCCESS
}
