//! Compose manifest resolution.
//!
//! An app's manifest can come from several places: inline content, a previous
//! install, an explicit path, a catalog record, or a filesystem search of the
//! configured catalog roots. Whatever the source, the manifest an install
//! actually runs from always lives in the app's canonical install directory;
//! anything found outside it is copied in, so installed apps survive catalog
//! refreshes and deletions.

use std::path::{Path, PathBuf};

use sqlx::{Pool, Sqlite};
use tokio::fs;

use crate::{
    config::{DeployOptions, Settings},
    management::db,
    utils::{copy_dir_files, CATALOG_SEARCH_DEPTH, COMPOSE_FILENAME, COMPOSE_FILENAMES},
    BerthError, BerthResult,
};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// The outcome of manifest resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedCompose {
    /// The app's canonical install directory.
    pub install_dir: PathBuf,

    /// The canonical manifest path inside `install_dir`.
    pub manifest_path: PathBuf,
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Resolves the compose manifest for an app. First match wins:
///
/// 1. Inline content from the deploy options, written into the canonical
///    install directory.
/// 2. A manifest already present in the canonical install directory.
/// 3. An explicit external manifest path, copied in.
/// 4. The manifest path recorded on the app's catalog entry, copied in.
/// 5. A bounded-depth search of the configured catalog roots, copied in.
///
/// Returns [`BerthError::ComposeNotFound`] when nothing resolves. That is a
/// terminal validation failure; there is nothing to retry.
pub async fn resolve_compose(
    settings: &Settings,
    pool: &Pool<Sqlite>,
    app_id: &str,
    options: &DeployOptions,
) -> BerthResult<ResolvedCompose> {
    let install_dir = settings.app_install_dir(app_id);

    // (1) Inline content.
    if let Some(content) = options.get_compose_content() {
        fs::create_dir_all(&install_dir).await?;
        let manifest_path = install_dir.join(COMPOSE_FILENAME);
        fs::write(&manifest_path, content).await?;
        tracing::info!(app_id, "wrote inline manifest to {}", manifest_path.display());
        return Ok(ResolvedCompose {
            install_dir,
            manifest_path,
        });
    }

    // (2) Already installed.
    if let Some(manifest_path) = find_manifest_in(&install_dir).await {
        return Ok(ResolvedCompose {
            install_dir,
            manifest_path,
        });
    }

    // (3) Explicit external path.
    if let Some(path) = options.get_compose_path() {
        if fs::metadata(path).await.map(|m| m.is_file()).unwrap_or(false) {
            return copy_into_install(path, &install_dir).await;
        }
        tracing::warn!(
            app_id,
            "supplied compose path does not exist: {}",
            path.display()
        );
    }

    // (4) Catalog record.
    if let Some(entry) = db::get_catalog_app(pool, app_id).await? {
        if let Some(compose_path) = entry.compose_path.as_deref() {
            let path = Path::new(compose_path);
            if fs::metadata(path).await.map(|m| m.is_file()).unwrap_or(false) {
                return copy_into_install(path, &install_dir).await;
            }
        }
    }

    // (5) Filesystem search across catalog roots.
    for root in settings.get_catalog_dirs() {
        if let Some(manifest) = search_catalog_root(root, app_id, CATALOG_SEARCH_DEPTH).await {
            return copy_into_install(&manifest, &install_dir).await;
        }
    }

    Err(BerthError::ComposeNotFound(app_id.to_string()))
}

/// Returns the first recognized manifest filename present in a directory.
pub async fn find_manifest_in(dir: &Path) -> Option<PathBuf> {
    for name in COMPOSE_FILENAMES {
        let candidate = dir.join(name);
        if fs::metadata(&candidate)
            .await
            .map(|m| m.is_file())
            .unwrap_or(false)
        {
            return Some(candidate);
        }
    }
    None
}

//--------------------------------------------------------------------------------------------------
// Functions: Helpers
//--------------------------------------------------------------------------------------------------

/// Copies a manifest (and its sibling regular files) into the canonical
/// install directory, decoupling the install from the source's lifecycle.
async fn copy_into_install(manifest: &Path, install_dir: &Path) -> BerthResult<ResolvedCompose> {
    let source_dir = manifest.parent().unwrap_or_else(|| Path::new("."));

    // A manifest already under the canonical directory needs no copy.
    if source_dir == install_dir {
        return Ok(ResolvedCompose {
            install_dir: install_dir.to_path_buf(),
            manifest_path: manifest.to_path_buf(),
        });
    }

    let copied = copy_dir_files(source_dir, install_dir).await?;
    tracing::info!(
        "copied {} file(s) from {} into {}",
        copied,
        source_dir.display(),
        install_dir.display()
    );

    let file_name = manifest
        .file_name()
        .ok_or_else(|| BerthError::ComposeNotFound(manifest.display().to_string()))?;

    Ok(ResolvedCompose {
        install_dir: install_dir.to_path_buf(),
        manifest_path: install_dir.join(file_name),
    })
}

/// Bounded search of a catalog root for a directory named after the app that
/// contains a manifest, descending at most `max_depth` levels.
async fn search_catalog_root(root: &Path, app_id: &str, max_depth: usize) -> Option<PathBuf> {
    let mut queue: Vec<(PathBuf, usize)> = vec![(root.to_path_buf(), 0)];

    while let Some((dir, depth)) = queue.pop() {
        if dir.file_name().map(|n| n == app_id).unwrap_or(false) {
            if let Some(manifest) = find_manifest_in(&dir).await {
                return Some(manifest);
            }
        }

        if depth >= max_depth {
            continue;
        }

        let Ok(mut entries) = fs::read_dir(&dir).await else {
            continue;
        };
        while let Ok(Some(entry)) = entries.next_entry().await {
            let path = entry.path();
            if path.is_dir() {
                queue.push((path, depth + 1));
            }
        }
    }

    None
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::management::db::APP_DB_MIGRATOR;
    use crate::management::models::CatalogApp;
    use tempfile::tempdir;

    const MANIFEST: &str = "services:\n  web:\n    image: nginx:alpine\n";

    async fn test_fixture() -> (tempfile::TempDir, Settings, Pool<Sqlite>) {
        let home = tempdir().unwrap();
        let settings = Settings::under_home(home.path());
        let pool = db::init_db(settings.get_db_path(), &APP_DB_MIGRATOR)
            .await
            .unwrap();
        (home, settings, pool)
    }

    #[tokio::test]
    async fn test_inline_content_wins_and_lands_in_install_dir() {
        let (_home, settings, pool) = test_fixture().await;

        let options = DeployOptions::builder()
            .app_id("web")
            .compose_content(MANIFEST.to_string())
            .build();

        let resolved = resolve_compose(&settings, &pool, "web", &options)
            .await
            .unwrap();

        assert_eq!(resolved.install_dir, settings.app_install_dir("web"));
        assert_eq!(
            resolved.manifest_path,
            settings.app_install_dir("web").join(COMPOSE_FILENAME)
        );
        let written = std::fs::read_to_string(&resolved.manifest_path).unwrap();
        assert_eq!(written, MANIFEST);
    }

    #[tokio::test]
    async fn test_existing_install_dir_is_reused() {
        let (_home, settings, pool) = test_fixture().await;

        let install_dir = settings.app_install_dir("web");
        std::fs::create_dir_all(&install_dir).unwrap();
        std::fs::write(install_dir.join("compose.yaml"), MANIFEST).unwrap();

        let options = DeployOptions::builder().app_id("web").build();
        let resolved = resolve_compose(&settings, &pool, "web", &options)
            .await
            .unwrap();

        assert_eq!(resolved.manifest_path, install_dir.join("compose.yaml"));
    }

    #[tokio::test]
    async fn test_explicit_path_is_copied_with_siblings() {
        let (_home, settings, pool) = test_fixture().await;

        let store = tempdir().unwrap();
        let source = store.path().join("docker-compose.yml");
        std::fs::write(&source, MANIFEST).unwrap();
        std::fs::write(store.path().join("seed.conf"), "key=value").unwrap();

        let options = DeployOptions::builder()
            .app_id("web")
            .compose_path(source)
            .build();
        let resolved = resolve_compose(&settings, &pool, "web", &options)
            .await
            .unwrap();

        let install_dir = settings.app_install_dir("web");
        assert_eq!(resolved.manifest_path, install_dir.join("docker-compose.yml"));
        assert!(install_dir.join("seed.conf").is_file());
    }

    #[tokio::test]
    async fn test_catalog_record_path_is_copied() {
        let (_home, settings, pool) = test_fixture().await;

        let store = tempdir().unwrap();
        let source = store.path().join("docker-compose.yml");
        std::fs::write(&source, MANIFEST).unwrap();

        db::upsert_catalog_app(
            &pool,
            &CatalogApp {
                slug: "web".to_string(),
                compose_path: Some(source.display().to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        let options = DeployOptions::builder().app_id("web").build();
        let resolved = resolve_compose(&settings, &pool, "web", &options)
            .await
            .unwrap();

        assert_eq!(
            resolved.manifest_path,
            settings.app_install_dir("web").join("docker-compose.yml")
        );
    }

    #[tokio::test]
    async fn test_catalog_root_search_is_depth_bounded() {
        let (home, _settings, pool) = test_fixture().await;

        let catalog = tempdir().unwrap();
        let nested = catalog.path().join("category").join("web");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(nested.join("docker-compose.yml"), MANIFEST).unwrap();

        let settings = Settings::builder()
            .data_dir(home.path().join("data"))
            .install_dir(home.path().join("installs"))
            .trash_dir(home.path().join("trash"))
            .db_path(home.path().join("berth.db"))
            .catalog_dirs(vec![catalog.path().to_path_buf()])
            .build();

        let options = DeployOptions::builder().app_id("web").build();
        let resolved = resolve_compose(&settings, &pool, "web", &options)
            .await
            .unwrap();
        assert!(resolved.manifest_path.starts_with(settings.app_install_dir("web")));

        // Too deep to find.
        let deep = catalog
            .path()
            .join("a")
            .join("b")
            .join("c")
            .join("d")
            .join("e")
            .join("buried");
        std::fs::create_dir_all(&deep).unwrap();
        std::fs::write(deep.join("docker-compose.yml"), MANIFEST).unwrap();

        let options = DeployOptions::builder().app_id("buried").build();
        let result = resolve_compose(&settings, &pool, "buried", &options).await;
        assert!(matches!(result, Err(BerthError::ComposeNotFound(_))));
    }

    #[tokio::test]
    async fn test_nothing_resolves_is_terminal_not_found() {
        let (_home, settings, pool) = test_fixture().await;

        let options = DeployOptions::builder().app_id("ghost").build();
        let result = resolve_compose(&settings, &pool, "ghost", &options).await;

        assert!(matches!(result, Err(BerthError::ComposeNotFound(_))));
    }
}
