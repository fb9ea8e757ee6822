//! App lifecycle: start, stop, restart, update.
//!
//! Lifecycle verbs prefer driving the whole compose project; a legacy or
//! unmanaged container with no resolvable manifest falls back to the direct
//! single-container engine verb. Updates back up the canonical manifest
//! before touching anything and roll back to it when the updated app fails
//! health verification.

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use tokio::{fs, time};

use crate::{
    engine::LifecycleVerb,
    management::{db, environment, models::InstalledApp, resolve, sanitize, AppManager},
    progress::{ProgressReporter, ProgressStatus},
    utils::{validate_app_id, MANIFEST_BACKUP_SUFFIX},
    BerthError, BerthResult,
};

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// Post-start health verification polls this many times before giving up.
const HEALTH_ATTEMPTS: u32 = 5;

/// Fixed backoff between health polls.
const HEALTH_BACKOFF: Duration = Duration::from_secs(2);

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// What a lifecycle verb resolved its target name into.
struct Target {
    /// The engine project name (the app id when a record exists).
    project: String,

    /// The container polled for run-state.
    container_name: String,

    /// The resolved manifest, when the app is managed and the file survives.
    manifest: Option<PathBuf>,

    /// The backing record, when one exists.
    record: Option<InstalledApp>,
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Starts an app and waits for its container to report running.
pub(super) async fn start(manager: &AppManager, name: &str) -> BerthResult<()> {
    let target = resolve_target(manager, name).await?;
    run_verb(manager, &target, LifecycleVerb::Start).await?;
    wait_until_running(manager, &target.container_name).await
}

/// Stops an app. No run-state polling; the engine verb is synchronous enough.
pub(super) async fn stop(manager: &AppManager, name: &str) -> BerthResult<()> {
    let target = resolve_target(manager, name).await?;
    run_verb(manager, &target, LifecycleVerb::Stop).await
}

/// Restarts an app and waits for its container to report running.
pub(super) async fn restart(manager: &AppManager, name: &str) -> BerthResult<()> {
    let target = resolve_target(manager, name).await?;
    run_verb(manager, &target, LifecycleVerb::Restart).await?;
    wait_until_running(manager, &target.container_name).await
}

/// Updates an app to the latest images, rolling back on failure.
///
/// The canonical manifest is backed up before any mutation. The update pulls,
/// recreates, and health-verifies; on verification failure *or* any error the
/// backup is restored best-effort and `up -d` re-run with it. The backup is
/// removed regardless of outcome.
pub(super) async fn update(
    manager: &AppManager,
    name: &str,
    reporter: &mut ProgressReporter,
) -> BerthResult<()> {
    let target = resolve_target(manager, name).await?;

    let Some(manifest) = target.manifest.clone() else {
        return Err(BerthError::ComposeNotFound(name.to_string()));
    };

    reporter.emit(0.05, ProgressStatus::Starting, "backing up manifest");
    let backup = backup_path(&manifest);
    fs::copy(&manifest, &backup).await?;

    let result = apply_update(manager, &target, &manifest, reporter).await;

    if let Err(e) = &result {
        tracing::warn!(
            app_id = %target.project,
            "update failed, rolling back manifest: {}",
            e
        );
        roll_back(manager, &target, &manifest, &backup).await;
    }

    if let Err(e) = fs::remove_file(&backup).await {
        tracing::warn!("could not remove manifest backup {}: {}", backup.display(), e);
    }

    result
}

//--------------------------------------------------------------------------------------------------
// Functions: Helpers
//--------------------------------------------------------------------------------------------------

/// Resolves a caller-supplied name (container name or app id) into a target.
async fn resolve_target(manager: &AppManager, name: &str) -> BerthResult<Target> {
    validate_app_id(name)?;

    let record = match db::get_installed_app_by_container_name(manager.pool(), name).await? {
        Some(record) => Some(record),
        None => db::get_installed_apps_by_app_id(manager.pool(), name)
            .await?
            .into_iter()
            .next(),
    };

    let Some(record) = record else {
        // Legacy container unknown to the store: drive it directly.
        return Ok(Target {
            project: name.to_string(),
            container_name: name.to_string(),
            manifest: None,
            record: None,
        });
    };

    let manifest_path = PathBuf::from(&record.compose_path);
    let manifest = if fs::metadata(&manifest_path)
        .await
        .map(|m| m.is_file())
        .unwrap_or(false)
    {
        Some(manifest_path)
    } else {
        resolve::find_manifest_in(&manager.settings().app_install_dir(&record.app_id)).await
    };

    Ok(Target {
        project: record.app_id.clone(),
        container_name: record.container_name.clone(),
        manifest,
        record: Some(record),
    })
}

async fn run_verb(manager: &AppManager, target: &Target, verb: LifecycleVerb) -> BerthResult<()> {
    match &target.manifest {
        Some(manifest) => {
            let sanitized = sanitize::sanitize_manifest(manifest).await;
            manager
                .engine()
                .compose_lifecycle(&target.project, &sanitized.executable_path, verb)
                .await
        }
        None => {
            manager
                .engine()
                .container_lifecycle(&target.container_name, verb)
                .await
        }
    }
}

/// Polls a container's run-state, failing with a health-check error when it
/// never comes up.
async fn wait_until_running(manager: &AppManager, container_name: &str) -> BerthResult<()> {
    for attempt in 1..=HEALTH_ATTEMPTS {
        match manager.engine().is_running(container_name).await {
            Ok(true) => return Ok(()),
            Ok(false) => {
                tracing::debug!(container_name, attempt, "container not running yet");
            }
            Err(e) => {
                tracing::debug!(container_name, attempt, "run-state probe failed: {}", e);
            }
        }
        if attempt < HEALTH_ATTEMPTS {
            time::sleep(HEALTH_BACKOFF).await;
        }
    }

    Err(BerthError::HealthCheck(format!(
        "container {} did not reach running state",
        container_name
    )))
}

async fn apply_update(
    manager: &AppManager,
    target: &Target,
    manifest: &Path,
    reporter: &mut ProgressReporter,
) -> BerthResult<()> {
    let install_config = target
        .record
        .as_ref()
        .and_then(|record| record.install_config.clone());
    let envs = environment::build_app_env(
        manager.settings(),
        &target.project,
        manifest.parent().unwrap_or_else(|| Path::new(".")),
        install_config.as_ref(),
    )
    .await?;

    let sanitized = sanitize::sanitize_manifest(manifest).await;

    reporter.emit(0.2, ProgressStatus::Running, "pulling latest images");
    manager
        .engine()
        .compose_pull(&target.project, &sanitized.executable_path, &envs, |_, _| {})
        .await?;

    reporter.emit(0.7, ProgressStatus::Running, "recreating services");
    manager
        .engine()
        .compose_up(&target.project, &sanitized.executable_path, &envs)
        .await?;

    reporter.emit(0.9, ProgressStatus::Running, "verifying health");
    wait_until_running(manager, &target.container_name).await
}

/// Best-effort restore of the pre-update manifest plus a re-`up` with it.
/// Rollback failures are logged, never surfaced; the update is already being
/// reported as failed.
async fn roll_back(manager: &AppManager, target: &Target, manifest: &Path, backup: &Path) {
    if let Err(e) = fs::copy(backup, manifest).await {
        tracing::warn!(
            "manifest restore from {} failed: {}",
            backup.display(),
            e
        );
        return;
    }

    let install_config = target
        .record
        .as_ref()
        .and_then(|record| record.install_config.clone());
    let envs = match environment::build_app_env(
        manager.settings(),
        &target.project,
        manifest.parent().unwrap_or_else(|| Path::new(".")),
        install_config.as_ref(),
    )
    .await
    {
        Ok(envs) => envs,
        Err(e) => {
            tracing::warn!("rollback environment build failed: {}", e);
            return;
        }
    };

    let sanitized = sanitize::sanitize_manifest(manifest).await;
    if let Err(e) = manager
        .engine()
        .compose_up(&target.project, &sanitized.executable_path, &envs)
        .await
    {
        tracing::warn!(app_id = %target.project, "rollback up failed: {}", e);
    }
}

fn backup_path(manifest: &Path) -> PathBuf {
    let file_name = manifest
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "docker-compose.yml".to_string());

    manifest.with_file_name(format!(".{}.{}", file_name, MANIFEST_BACKUP_SUFFIX))
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backup_path_is_hidden_sibling() {
        let backup = backup_path(Path::new("/installs/app/docker-compose.yml"));

        assert_eq!(backup.parent(), Some(Path::new("/installs/app")));
        assert_eq!(
            backup.file_name().unwrap().to_string_lossy(),
            ".docker-compose.yml.update-backup"
        );
    }
}
