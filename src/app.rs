use crate::api::ApiClient;
use crate::config::Config;
use crate::data::{MIGRATOR, health};
use crate::sync::scheduler::{DailyTrigger, Scheduler, SyncCycle};
use anyhow::Context;
use chrono::Local;
use sqlx::ConnectOptions;
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::process::ExitCode;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Owns the store handle and the API client for the lifetime of the process.
pub struct App {
    config: Config,
    db_pool: SqlitePool,
    api: Arc<ApiClient>,
}

impl App {
    /// Connect to the store, apply migrations and build the API client.
    pub async fn new(config: Config) -> Result<Self, anyhow::Error> {
        let connect_options = SqliteConnectOptions::from_str(&config.db_url)
            .context("Failed to parse database URL")?
            .create_if_missing(true)
            .foreign_keys(true)
            .log_statements(tracing::log::LevelFilter::Debug)
            .log_slow_statements(tracing::log::LevelFilter::Warn, Duration::from_secs(1));

        let db_pool = SqlitePoolOptions::new()
            .max_connections(1)
            .acquire_timeout(Duration::from_secs(30))
            .connect_with(connect_options)
            .await
            .context("Failed to create database pool")?;

        health::ping(&db_pool)
            .await
            .context("Database did not answer health check")?;
        info!("database pool established");

        info!("Running database migrations...");
        MIGRATOR
            .run(&db_pool)
            .await
            .context("Failed to run database migrations")?;
        info!("Database migrations completed successfully");

        let api = ApiClient::new(&config.api_url, config.request_timeout)
            .context("Failed to create API client")?;
        info!(
            base_url = %api.base_url(),
            timeout = ?config.request_timeout,
            "API client ready"
        );

        Ok(App {
            config,
            db_pool,
            api: Arc::new(api),
        })
    }

    /// Run the scheduler until SIGINT/SIGTERM.
    pub async fn run(self) -> ExitCode {
        let now = Local::now().naive_local();
        let trigger = match self.config.sync_at {
            Some(at) => DailyTrigger::at(at, now),
            None => DailyTrigger::one_minute_after(now),
        };

        let shutdown = CancellationToken::new();
        let job = Arc::new(SyncCycle::new(self.db_pool.clone(), self.api.clone()));
        let mut scheduler = Scheduler::new(job, trigger, self.config.poll_interval);

        let scheduler_handle = tokio::spawn({
            let shutdown = shutdown.clone();
            async move { scheduler.run(shutdown).await }
        });

        wait_for_signal().await;
        info!("Shutdown signal received");
        shutdown.cancel();

        let code = match scheduler_handle.await {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                error!(error = ?e, "Scheduler task failed");
                ExitCode::FAILURE
            }
        };

        self.db_pool.close().await;
        code
    }
}

async fn wait_for_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = ?e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = ?e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
