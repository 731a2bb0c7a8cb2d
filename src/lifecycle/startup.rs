//! Startup orchestration.
//!
//! # Responsibilities
//! - Load the user store
//! - Build the admin watchdog bound to the shutdown scope
//! - Arm the watchdog when no administrator exists yet
//! - Serve HTTP until shutdown, then persist the store

use std::path::Path;
use std::sync::Arc;

use thiserror::Error;
use tokio::net::TcpListener;

use crate::config::ConsoleConfig;
use crate::http::{AppState, HttpServer};
use crate::lifecycle::watchdog::{exit_process, AdminWatchdog, TerminateHook};
use crate::lifecycle::Shutdown;
use crate::store::{StoreError, UserRepository, UserStore};

/// Errors that abort startup or shutdown.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// The assembled console: store, watchdog and the scope they live in.
pub struct Console {
    config: ConsoleConfig,
    users: UserRepository,
    watchdog: Arc<AdminWatchdog>,
    shutdown: Shutdown,
}

impl Console {
    /// Assemble the console with the process-exiting termination hook.
    pub fn bootstrap(config: ConsoleConfig, shutdown: Shutdown) -> Result<Self, StartupError> {
        Self::bootstrap_with(config, shutdown, exit_process())
    }

    /// Assemble the console with a custom termination hook.
    pub fn bootstrap_with(
        config: ConsoleConfig,
        shutdown: Shutdown,
        terminate: TerminateHook,
    ) -> Result<Self, StartupError> {
        let users = match &config.store.data_path {
            Some(path) => UserRepository::load_from_file(Path::new(path))?,
            None => UserRepository::new(None),
        };

        let store: Arc<dyn UserStore> = Arc::new(users.clone());
        let watchdog = AdminWatchdog::new(
            config.admin.init_timeout(),
            Some(store),
            Some(shutdown.clone()),
        )
        .with_terminate(terminate);

        Ok(Self {
            config,
            users,
            watchdog: Arc::new(watchdog),
            shutdown,
        })
    }

    pub fn users(&self) -> &UserRepository {
        &self.users
    }

    pub fn watchdog(&self) -> &Arc<AdminWatchdog> {
        &self.watchdog
    }

    /// Arm the watchdog unless it is disabled or an administrator already
    /// exists. Returns whether it was armed.
    pub fn arm_watchdog(&self) -> Result<bool, StartupError> {
        if !self.config.admin.watchdog_enabled {
            tracing::warn!("Admin watchdog disabled by configuration");
            return Ok(false);
        }

        if self.users.has_administrator()? {
            tracing::info!("Administrator account present, admin watchdog not needed");
            return Ok(false);
        }

        tracing::warn!(
            deadline = ?self.watchdog.deadline(),
            "No administrator account yet, create one before the deadline"
        );
        self.watchdog.start();
        Ok(true)
    }

    /// Serve until the shutdown scope is triggered, then persist the store.
    pub async fn serve(self, listener: TcpListener) -> Result<(), StartupError> {
        let state = AppState::new(self.users.clone(), self.watchdog.clone(), &self.config);
        let server = HttpServer::new(&self.config, state);

        server.run(listener, self.shutdown.clone()).await?;

        self.watchdog.stop();
        self.users.save_to_file()?;
        Ok(())
    }
}
