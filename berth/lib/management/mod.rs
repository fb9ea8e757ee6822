//! Management components: deployment, lifecycle, uninstall, inventory, and
//! persistence.

use std::sync::Arc;

use sqlx::{Pool, Sqlite};
use tokio::fs;

use crate::{
    config::{DeployOptions, Settings},
    engine::Engine,
    progress::{ProgressReporter, ProgressSink, ProgressStatus},
    BerthResult,
};

mod db;
mod deploy;
mod environment;
mod inventory;
mod lifecycle;
mod models;
mod resolve;
mod sanitize;
mod uninstall;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub use db::*;
pub use deploy::*;
pub use environment::*;
pub use inventory::*;
pub use models::*;
pub use resolve::*;
pub use sanitize::*;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// The public face of berth: one connected manager per settings/database.
///
/// Every operation is an independent asynchronous unit of work; nothing here
/// serializes deployments of different apps, and concurrent operations on the
/// *same* app are the caller's responsibility to avoid. No public method
/// raises: failures are logged with full diagnostics and surfaced as flat
/// outcomes.
pub struct AppManager {
    settings: Settings,
    pool: Pool<Sqlite>,
    engine: Engine,
    sink: Arc<dyn ProgressSink>,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl AppManager {
    /// Connects a manager: ensures the home layout (data, installs, trash)
    /// exists, initializes the database, and binds the engine CLI.
    pub async fn connect(settings: Settings, sink: Arc<dyn ProgressSink>) -> BerthResult<Self> {
        fs::create_dir_all(settings.get_data_dir()).await?;
        fs::create_dir_all(settings.get_install_dir()).await?;
        fs::create_dir_all(settings.get_trash_dir()).await?;

        let pool = db::init_db(settings.get_db_path(), &db::APP_DB_MIGRATOR).await?;
        let engine = Engine::new(settings.get_engine_bin().clone());

        Ok(Self {
            settings,
            pool,
            engine,
            sink,
        })
    }

    /// The settings this manager was built with.
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// The state database pool.
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    /// The engine CLI handle.
    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// The progress sink.
    pub fn sink(&self) -> Arc<dyn ProgressSink> {
        self.sink.clone()
    }

    /// Deploys an app through the full pipeline. Never raises; the outcome
    /// carries a flat error message on failure.
    pub async fn deploy(&self, options: DeployOptions) -> DeployOutcome {
        deploy::run(self, options).await
    }

    /// Starts an app (by container name or app id) and verifies it comes up.
    pub async fn start(&self, name: &str) -> bool {
        match lifecycle::start(self, name).await {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(name, "start failed: {}", e);
                false
            }
        }
    }

    /// Stops an app.
    pub async fn stop(&self, name: &str) -> bool {
        match lifecycle::stop(self, name).await {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(name, "stop failed: {}", e);
                false
            }
        }
    }

    /// Restarts an app and verifies it comes back up.
    pub async fn restart(&self, name: &str) -> bool {
        match lifecycle::restart(self, name).await {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(name, "restart failed: {}", e);
                false
            }
        }
    }

    /// Updates an app to its latest images, rolling back on failure. A failed
    /// update always ends in a terminal error progress event, whether or not
    /// the rollback itself succeeded.
    pub async fn update(&self, name: &str) -> bool {
        let mut reporter = ProgressReporter::new(self.sink(), name, None, None);
        reporter.emit(0.0, ProgressStatus::Starting, "preparing update");

        match lifecycle::update(self, name, &mut reporter).await {
            Ok(()) => {
                reporter.complete("app updated");
                true
            }
            Err(e) => {
                tracing::error!(name, "update failed: {}", e);
                reporter.fail(e.to_string());
                false
            }
        }
    }

    /// Uninstalls an app. With `remove_app_data` the data directory is
    /// permanently deleted; otherwise it is moved to the trash, recoverable
    /// until [`AppManager::empty_trash`].
    pub async fn uninstall(&self, app_id: &str, remove_app_data: bool) -> bool {
        match uninstall::uninstall(self, app_id, remove_app_data).await {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(app_id, "uninstall failed: {}", e);
                false
            }
        }
    }

    /// Lists the persisted install records.
    pub async fn list_installed_apps(&self) -> Vec<InstalledApp> {
        match db::list_installed_apps(&self.pool).await {
            Ok(apps) => apps,
            Err(e) => {
                tracing::error!("listing installed apps failed: {}", e);
                Vec::new()
            }
        }
    }

    /// Lists apps as the inventory sees them, reconciling engine state with
    /// persisted records. Falls back to records alone when the engine is
    /// unreachable.
    pub async fn list_apps(&self) -> Vec<AppSummary> {
        match inventory::list_apps(self).await {
            Ok(apps) => apps,
            Err(e) => {
                tracing::warn!("engine unavailable, listing records only: {}", e);
                self.list_installed_apps()
                    .await
                    .into_iter()
                    .map(|record| AppSummary {
                        project: record.app_id.clone(),
                        primary_container: record.container_name.clone(),
                        container_names: record.container_names.clone(),
                        status: AppStatus::Unknown,
                        web_ui_port: record.web_ui_port,
                        managed: true,
                    })
                    .collect()
            }
        }
    }

    /// The aggregate status of one app.
    pub async fn status(&self, app_id: &str) -> AppStatus {
        match inventory::status(self, app_id).await {
            Ok(status) => status,
            Err(e) => {
                tracing::warn!(app_id, "status query failed: {}", e);
                AppStatus::Unknown
            }
        }
    }

    /// The app's web UI URL, when a reachable port resolves.
    pub async fn web_ui_url(&self, app_id: &str) -> Option<String> {
        match inventory::web_ui_url(self, app_id).await {
            Ok(url) => url,
            Err(e) => {
                tracing::warn!(app_id, "web UI resolution failed: {}", e);
                None
            }
        }
    }

    /// The last `lines` log lines of the app's primary container.
    pub async fn logs(&self, name: &str, lines: usize) -> String {
        if let Err(e) = crate::utils::validate_app_id(name) {
            tracing::warn!("log retrieval rejected: {}", e);
            return String::new();
        }

        let container = match db::get_installed_app_by_container_name(&self.pool, name).await {
            Ok(Some(record)) => record.container_name,
            _ => match db::get_installed_apps_by_app_id(&self.pool, name).await {
                Ok(records) if !records.is_empty() => records[0].container_name.clone(),
                _ => name.to_string(),
            },
        };

        match self.engine.logs(&container, lines).await {
            Ok(logs) => logs,
            Err(e) => {
                tracing::warn!(name, "log retrieval failed: {}", e);
                String::new()
            }
        }
    }

    /// Permanently deletes everything in the trash. Returns the number of
    /// entries removed.
    pub async fn empty_trash(&self) -> usize {
        match uninstall::empty_trash(self).await {
            Ok(removed) => removed,
            Err(e) => {
                tracing::error!("emptying trash failed: {}", e);
                0
            }
        }
    }
}
