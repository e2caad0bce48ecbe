//! # XBRL API Server
//!
//! Actix-web server for API-key management and key-authenticated access,
//! with per-address and per-plan rate limiting.

use actix_web::{App, HttpServer, web};
use tracing_actix_web::TracingLogger;

#[cfg(feature = "scheduler")]
mod background;
mod config;
mod handlers;
mod middleware;
mod state;
mod telemetry;

use config::AppConfig;
use state::AppState;
use telemetry::TelemetryConfig;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    telemetry::init_telemetry(&TelemetryConfig::from_env());

    let config = AppConfig::from_env();

    tracing::info!(
        "Starting XBRL API Server on {}:{}",
        config.host,
        config.port
    );

    let (state, sweeper) = AppState::new(&config).await.map_err(|e| {
        tracing::error!("Startup failed: {}", e);
        std::io::Error::other(e)
    })?;

    #[cfg(feature = "scheduler")]
    let mut scheduler = start_scheduler(&config, &state).await;

    let server_state = state.clone();
    let result = HttpServer::new(move || {
        let state = server_state.clone();
        App::new()
            .wrap(TracingLogger::default())
            .app_data(web::Data::new(state.clone()))
            .configure(|cfg| handlers::configure_routes(cfg, &state))
    })
    .bind((config.host.as_str(), config.port))?
    .run()
    .await;

    #[cfg(feature = "scheduler")]
    {
        if let Some(scheduler) = scheduler.as_mut() {
            if let Err(e) = scheduler.shutdown().await {
                tracing::warn!("Scheduler shutdown failed: {}", e);
            }
        }
    }

    if let Some(sweeper) = sweeper {
        sweeper.stop().await;
    }

    tracing::info!("Server stopped");
    result
}

#[cfg(feature = "scheduler")]
async fn start_scheduler(config: &AppConfig, state: &AppState) -> Option<background::Scheduler> {
    use background::{Scheduler, SchedulerConfig, register_cleanup_jobs};

    let scheduler = match Scheduler::new(SchedulerConfig::from_env()).await {
        Ok(scheduler) => scheduler,
        Err(e) => {
            tracing::error!("Failed to create scheduler: {}", e);
            return None;
        }
    };

    if let Err(e) =
        register_cleanup_jobs(&scheduler, &config.cleanup_schedule, state.csrf.clone()).await
    {
        tracing::error!("Failed to register cleanup jobs: {}", e);
    }
    if let Err(e) = scheduler.start().await {
        tracing::error!("Failed to start scheduler: {}", e);
    }

    Some(scheduler)
}
