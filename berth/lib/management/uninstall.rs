//! Uninstall and trash management.
//!
//! Teardown is deliberately redundant: a compose project `down` *and* an
//! unconditional force-remove of every container-name candidate, so a partial
//! project teardown cannot leave orphans. Data removal defaults to a
//! recoverable move into the trash; the install directory (manifest and
//! supporting files) is always removed.

use std::path::Path;

use chrono::Utc;
use tokio::fs;

use crate::{
    config::ComposeManifest,
    engine::Engine,
    management::{db, resolve, AppManager},
    utils::validate_app_id,
    BerthResult,
};

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Uninstalls an app: containers, records, install directory, and (depending
/// on `remove_app_data`) either permanent deletion or a trash move of its
/// data directory.
///
/// Partial failures are warned and skipped; leaving an app half-removed is
/// worse than an incompletely logged teardown.
pub(super) async fn uninstall(
    manager: &AppManager,
    app_id: &str,
    remove_app_data: bool,
) -> BerthResult<()> {
    validate_app_id(app_id)?;

    let settings = manager.settings();
    let install_dir = settings.app_install_dir(app_id);
    let manifest = resolve::find_manifest_in(&install_dir).await;

    let candidates = collect_candidates(manager, app_id, manifest.as_deref()).await?;

    ensure_removed(manager.engine(), app_id, manifest.as_deref(), &candidates).await;

    // Data: permanent delete or recoverable trash move.
    let data_dir = settings.app_data_dir(app_id);
    if fs::metadata(&data_dir).await.is_ok() {
        if remove_app_data {
            if let Err(e) = fs::remove_dir_all(&data_dir).await {
                tracing::warn!("could not delete app data {}: {}", data_dir.display(), e);
            }
        } else if let Err(e) = trash_data_dir(settings.get_trash_dir(), &data_dir, app_id).await {
            tracing::warn!("could not trash app data {}: {}", data_dir.display(), e);
        }
    }

    // The install directory always goes.
    if fs::metadata(&install_dir).await.is_ok() {
        if let Err(e) = fs::remove_dir_all(&install_dir).await {
            tracing::warn!(
                "could not remove install dir {}: {}",
                install_dir.display(),
                e
            );
        }
    }

    // Deregister every candidate, not only the primary, so multi-service apps
    // are fully removed from the store.
    let deleted = db::delete_installed_apps_by_container_names(manager.pool(), &candidates).await?;
    tracing::info!(app_id, deleted, "uninstalled app");

    Ok(())
}

/// One idempotent "make sure nothing of this app is running" operation.
///
/// Precedence: the project-level `down` goes first (it knows about networks
/// and orphans), then every candidate is force-removed individually so a
/// partial `down` cannot leave strays. Every step is best-effort; absence of
/// anything to remove is the normal case, not an error.
pub(super) async fn ensure_removed(
    engine: &Engine,
    project: &str,
    manifest: Option<&Path>,
    candidates: &[String],
) {
    if let Err(e) = engine.compose_down(project, manifest).await {
        tracing::warn!(project, "project teardown incomplete: {}", e);
    }

    for candidate in candidates {
        if let Err(e) = engine.force_remove(candidate).await {
            tracing::debug!(container = %candidate, "force-remove skipped: {}", e);
        }
    }
}

/// Empties the trash, permanently deleting all soft-deleted app data.
/// Returns how many entries were removed.
pub(super) async fn empty_trash(manager: &AppManager) -> BerthResult<usize> {
    let trash_dir = manager.settings().get_trash_dir();
    if fs::metadata(trash_dir).await.is_err() {
        return Ok(0);
    }

    let mut removed = 0;
    let mut entries = fs::read_dir(trash_dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let result = if path.is_dir() {
            fs::remove_dir_all(&path).await
        } else {
            fs::remove_file(&path).await
        };

        match result {
            Ok(()) => removed += 1,
            Err(e) => tracing::warn!("could not empty {}: {}", path.display(), e),
        }
    }

    tracing::info!(removed, "emptied trash");
    Ok(removed)
}

//--------------------------------------------------------------------------------------------------
// Functions: Helpers
//--------------------------------------------------------------------------------------------------

/// Every container name that could belong to the app: recorded names, names
/// generated from the manifest, and the app id itself.
async fn collect_candidates(
    manager: &AppManager,
    app_id: &str,
    manifest: Option<&Path>,
) -> BerthResult<Vec<String>> {
    let mut candidates = Vec::new();

    for record in db::get_installed_apps_by_app_id(manager.pool(), app_id).await? {
        candidates.push(record.container_name.clone());
        candidates.extend(record.container_names);
    }

    if let Some(manifest) = manifest {
        if let Ok(parsed) = ComposeManifest::load(manifest).await {
            candidates.extend(parsed.container_name_candidates(app_id));
        }
    }

    candidates.push(app_id.to_string());

    candidates.sort();
    candidates.dedup();
    Ok(candidates)
}

/// Moves a data directory into the trash under `<app_id>_<epoch-ms>`,
/// recoverable until the trash is emptied.
async fn trash_data_dir(trash_dir: &Path, data_dir: &Path, app_id: &str) -> BerthResult<()> {
    fs::create_dir_all(trash_dir).await?;

    let target = trash_dir.join(trash_entry_name(app_id));
    fs::rename(data_dir, &target).await?;

    tracing::info!(
        app_id,
        "moved app data to trash at {}",
        target.display()
    );
    Ok(())
}

fn trash_entry_name(app_id: &str) -> String {
    format!("{}_{}", app_id, Utc::now().timestamp_millis())
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_trash_entry_name_format() {
        let name = trash_entry_name("nextcloud");

        let (app, timestamp) = name.rsplit_once('_').unwrap();
        assert_eq!(app, "nextcloud");
        assert!(timestamp.parse::<i64>().unwrap() > 0);
    }

    #[tokio::test]
    async fn test_trash_move_keeps_data_recoverable() -> BerthResult<()> {
        let root = tempdir()?;
        let trash = root.path().join("trash");
        let data = root.path().join("data").join("app");
        fs::create_dir_all(&data).await?;
        fs::write(data.join("library.db"), "precious").await?;

        trash_data_dir(&trash, &data, "app").await?;

        assert!(!data.exists());

        let mut entries = std::fs::read_dir(&trash)?;
        let entry = entries.next().unwrap()?;
        let name = entry.file_name().to_string_lossy().into_owned();
        assert!(name.starts_with("app_"));
        assert_eq!(
            std::fs::read_to_string(entry.path().join("library.db"))?,
            "precious"
        );

        Ok(())
    }
}
