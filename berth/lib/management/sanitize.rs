//! Compose manifest sanitization.
//!
//! Imported catalogs routinely ship manifests with placeholder services that
//! declare neither an `image` nor a `build` instruction; the engine refuses
//! the whole file over them. Sanitization strips those entries into a hidden
//! derivative the engine runs from, while the original stays untouched as the
//! canonical manifest that gets persisted and displayed.

use std::path::{Path, PathBuf};

use serde_yaml::Value;
use tokio::fs;

use crate::BerthResult;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// The outcome of sanitizing one manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SanitizedCompose {
    /// The path the engine should execute. Either the original manifest or a
    /// hidden derivative next to it.
    pub executable_path: PathBuf,

    /// The original manifest path. This is what gets persisted and shown.
    pub canonical_path: PathBuf,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl SanitizedCompose {
    /// Whether sanitization left the manifest untouched.
    pub fn is_noop(&self) -> bool {
        self.executable_path == self.canonical_path
    }

    fn noop(manifest_path: &Path) -> Self {
        Self {
            executable_path: manifest_path.to_path_buf(),
            canonical_path: manifest_path.to_path_buf(),
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Sanitizes a manifest before engine execution.
///
/// Services lacking both an image and a build instruction are removed. When
/// removal would empty the service set, the original is returned unchanged so
/// the engine fails loudly instead of silently deploying nothing. The
/// derivative is written in the *same directory* as the original because the
/// engine derives its default project naming from the directory name.
///
/// This never fails the pipeline: any parse or write problem degrades to
/// "run the original, unmodified".
pub async fn sanitize_manifest(manifest_path: &Path) -> SanitizedCompose {
    match try_sanitize(manifest_path).await {
        Ok(result) => result,
        Err(e) => {
            tracing::warn!(
                "sanitization degraded to original manifest {}: {}",
                manifest_path.display(),
                e
            );
            SanitizedCompose::noop(manifest_path)
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Functions: Helpers
//--------------------------------------------------------------------------------------------------

async fn try_sanitize(manifest_path: &Path) -> BerthResult<SanitizedCompose> {
    let contents = fs::read_to_string(manifest_path).await?;
    let mut document: Value = serde_yaml::from_str(&contents)?;

    let Some(services) = document
        .get_mut("services")
        .and_then(Value::as_mapping_mut)
    else {
        return Ok(SanitizedCompose::noop(manifest_path));
    };

    let total = services.len();
    let removed: Vec<String> = services
        .iter()
        .filter(|(_, service)| !is_runnable(service))
        .map(|(name, _)| name.as_str().unwrap_or_default().to_string())
        .collect();

    if removed.is_empty() {
        return Ok(SanitizedCompose::noop(manifest_path));
    }

    if removed.len() == total {
        // Nothing would be left to run. Hand the engine the original and let
        // it produce the loud failure.
        tracing::warn!(
            "all {} service(s) in {} are placeholders; abandoning sanitization",
            total,
            manifest_path.display()
        );
        return Ok(SanitizedCompose::noop(manifest_path));
    }

    services.retain(|_, service| is_runnable(service));

    tracing::info!(
        "sanitized {}: removed placeholder service(s) {}",
        manifest_path.display(),
        removed.join(", ")
    );

    let executable_path = sanitized_path(manifest_path);
    fs::write(&executable_path, serde_yaml::to_string(&document)?).await?;

    Ok(SanitizedCompose {
        executable_path,
        canonical_path: manifest_path.to_path_buf(),
    })
}

/// Whether a service entry declares something the engine can actually run.
fn is_runnable(service: &Value) -> bool {
    service.get("image").is_some() || service.get("build").is_some()
}

/// The hidden derivative path for a manifest, in the same directory.
fn sanitized_path(manifest_path: &Path) -> PathBuf {
    let stem = manifest_path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("compose");

    manifest_path.with_file_name(format!(".{}.engine.yml", stem))
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    async fn write_manifest(dir: &Path, contents: &str) -> PathBuf {
        let path = dir.join("docker-compose.yml");
        fs::write(&path, contents).await.unwrap();
        path
    }

    #[tokio::test]
    async fn test_all_valid_services_is_a_noop() {
        let dir = tempdir().unwrap();
        let path = write_manifest(
            dir.path(),
            "services:\n  web:\n    image: nginx:alpine\n  worker:\n    build: .\n",
        )
        .await;

        let result = sanitize_manifest(&path).await;

        assert!(result.is_noop());
        assert_eq!(result.canonical_path, path);
    }

    #[tokio::test]
    async fn test_placeholder_services_are_stripped_into_hidden_derivative() {
        let dir = tempdir().unwrap();
        let path = write_manifest(
            dir.path(),
            "services:\n  web:\n    image: nginx:alpine\n  stub:\n    restart: always\n",
        )
        .await;

        let result = sanitize_manifest(&path).await;

        assert!(!result.is_noop());
        assert_eq!(result.canonical_path, path);
        // Same directory, hidden filename.
        assert_eq!(result.executable_path.parent(), path.parent());
        assert!(result
            .executable_path
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with('.'));

        let derived = fs::read_to_string(&result.executable_path).await.unwrap();
        assert!(derived.contains("web"));
        assert!(!derived.contains("stub"));

        // The original is untouched.
        let original = fs::read_to_string(&path).await.unwrap();
        assert!(original.contains("stub"));
    }

    #[tokio::test]
    async fn test_removing_every_service_abandons_sanitization() {
        let dir = tempdir().unwrap();
        let path = write_manifest(
            dir.path(),
            "services:\n  a:\n    restart: always\n  b:\n    restart: always\n",
        )
        .await;

        let result = sanitize_manifest(&path).await;

        assert!(result.is_noop());
        assert!(!sanitized_path(&path).exists());
    }

    #[tokio::test]
    async fn test_parse_failure_degrades_to_original() {
        let dir = tempdir().unwrap();
        let path = write_manifest(dir.path(), ": not valid yaml {{{").await;

        let result = sanitize_manifest(&path).await;

        assert!(result.is_noop());
    }

    #[tokio::test]
    async fn test_missing_file_degrades_to_original() {
        let result = sanitize_manifest(Path::new("/definitely/not/here.yml")).await;
        assert!(result.is_noop());
    }
}
