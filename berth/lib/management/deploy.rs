//! Deployment orchestration.
//!
//! A deployment is a forward-only pipeline: validate → check dependencies →
//! resolve → sanitize → pre-seed → pull → start → detect containers →
//! persist. Any stage can fail into a terminal error carrying its stage tag;
//! there is no mid-pipeline cancellation and no partial resume. Callers
//! resubmit the whole operation.

use std::{path::Path, time::Duration};

use tokio::{fs, time};

use crate::{
    config::{ComposeManifest, DeployOptions},
    engine::Engine,
    management::{
        db, environment, inventory, models::InstalledApp, resolve, sanitize, uninstall, AppManager,
    },
    progress::{ProgressReporter, ProgressStatus, PullProgressModel},
    utils::{set_executable, validate_app_id, COMPOSE_FILENAMES},
    BerthError, BerthResult,
};

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// Containers may not register immediately after `up`; detection retries this
/// many times at a fixed backoff before falling back to generated names.
const DETECT_ATTEMPTS: u32 = 3;

/// Fixed backoff between detection attempts.
const DETECT_BACKOFF: Duration = Duration::from_secs(1);

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// The public result of a deployment. Deploy never raises; internal stage
/// detail stays in the logs and only the human message crosses this boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployOutcome {
    /// Whether the app ended up deployed and recorded.
    pub success: bool,

    /// The failure message, when it did not.
    pub error: Option<String>,
}

/// The stages of the deployment pipeline, in order. Transitions are strictly
/// forward; any stage may fail into the terminal error state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum DeployStage {
    /// Identifier and port validation. Zero side effects on failure.
    Validating,
    /// Declared app dependencies must already be installed.
    CheckingDependencies,
    /// Manifest resolution across install/catalog/filesystem tiers.
    ResolvingCompose,
    /// Placeholder-service stripping. Never fails the pipeline.
    Sanitizing,
    /// Copying seed files alongside the manifest into the data directory.
    PreSeeding,
    /// Engine image pull with streamed progress.
    Pulling,
    /// Engine `up -d` under the app's project name.
    Starting,
    /// Discovering the containers the engine actually created.
    DetectingContainers,
    /// Upserting the install record.
    Persisting,
    /// Terminal success.
    Completed,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl DeployStage {
    /// The stage tag used in logs and diagnostics.
    pub fn as_str(&self) -> &'static str {
        match self {
            DeployStage::Validating => "validate",
            DeployStage::CheckingDependencies => "dependencies",
            DeployStage::ResolvingCompose => "compose:resolve",
            DeployStage::Sanitizing => "compose:sanitize",
            DeployStage::PreSeeding => "pre-seed",
            DeployStage::Pulling => "compose:pull",
            DeployStage::Starting => "compose:up",
            DeployStage::DetectingContainers => "detect-containers",
            DeployStage::Persisting => "persist",
            DeployStage::Completed => "completed",
        }
    }

    /// The progress value emitted when the stage begins. Pulling advances
    /// through its own band on top of this floor.
    pub fn progress(&self) -> f32 {
        match self {
            DeployStage::Validating => 0.02,
            DeployStage::CheckingDependencies => 0.06,
            DeployStage::ResolvingCompose => 0.12,
            DeployStage::Sanitizing => 0.20,
            DeployStage::PreSeeding => 0.28,
            DeployStage::Pulling => 0.35,
            DeployStage::Starting => 0.88,
            DeployStage::DetectingContainers => 0.93,
            DeployStage::Persisting => 0.97,
            DeployStage::Completed => 1.0,
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Runs one deployment attempt end to end.
pub(super) async fn run(manager: &AppManager, options: DeployOptions) -> DeployOutcome {
    let mut reporter = ProgressReporter::new(
        manager.sink(),
        options.get_app_id().clone(),
        options.get_display_name().clone(),
        options.get_icon().clone(),
    );
    reporter.emit(0.0, ProgressStatus::Starting, "preparing deployment");

    match run_pipeline(manager, &options, &mut reporter).await {
        Ok(primary) => {
            tracing::info!(
                app_id = %options.get_app_id(),
                primary_container = %primary,
                "deployment completed"
            );
            reporter.complete("app deployed");
            DeployOutcome {
                success: true,
                error: None,
            }
        }
        Err(e) => {
            log_failure(&options, &e);
            let message = e.to_string();
            reporter.fail(message.clone());
            DeployOutcome {
                success: false,
                error: Some(message),
            }
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Functions: Helpers
//--------------------------------------------------------------------------------------------------

async fn run_pipeline(
    manager: &AppManager,
    options: &DeployOptions,
    reporter: &mut ProgressReporter,
) -> BerthResult<String> {
    let app_id = options.get_app_id().as_str();
    let settings = manager.settings();

    // validating
    advance(reporter, DeployStage::Validating, "validating request");
    validate_app_id(app_id)?;
    if let Some(config) = options.get_install_config() {
        for port in &config.ports {
            if port.host() == 0 || port.container() == 0 {
                return Err(BerthError::InvalidPortMapping(port.to_string()));
            }
        }
    }

    // dependency-checking
    advance(
        reporter,
        DeployStage::CheckingDependencies,
        "checking dependencies",
    );
    check_dependencies(manager, options).await?;

    // Fresh inline content means a redeploy/edit: tear down whatever currently
    // runs under this app before touching the manifest. Nothing to remove is
    // not an error.
    if options.get_compose_content().is_some() {
        let candidates = existing_candidates(manager, app_id).await?;
        uninstall::ensure_removed(manager.engine(), app_id, None, &candidates).await;
    }

    // resolving-compose
    advance(
        reporter,
        DeployStage::ResolvingCompose,
        "resolving compose manifest",
    );
    let resolved = resolve::resolve_compose(settings, manager.pool(), app_id, options).await?;

    // sanitizing
    advance(reporter, DeployStage::Sanitizing, "sanitizing manifest");
    let sanitized = sanitize::sanitize_manifest(&resolved.manifest_path).await;

    // Parsed manifest feeds port extraction and fallback container names; a
    // manifest the engine can run but we cannot model is not fatal here.
    let manifest = match ComposeManifest::load(&resolved.manifest_path).await {
        Ok(manifest) => Some(manifest),
        Err(e) => {
            tracing::warn!(app_id, "manifest not modellable: {}", e);
            None
        }
    };

    // pre-seeding
    advance(reporter, DeployStage::PreSeeding, "seeding app data");
    let data_dir = settings.app_data_dir(app_id);
    if let Err(e) = pre_seed(&resolved.install_dir, &data_dir).await {
        tracing::warn!(app_id, "pre-seeding skipped: {}", e);
    }

    let envs = environment::build_app_env(
        settings,
        app_id,
        &resolved.install_dir,
        options.get_install_config().as_ref(),
    )
    .await?;

    // pulling
    advance(reporter, DeployStage::Pulling, "pulling images");
    let mut model = PullProgressModel::new();
    manager
        .engine()
        .compose_pull(app_id, &sanitized.executable_path, &envs, |source, line| {
            if let Some(progress) = model.observe(source, line) {
                reporter.emit(progress, ProgressStatus::Running, "pulling images");
            }
        })
        .await?;

    // starting
    advance(reporter, DeployStage::Starting, "starting containers");
    manager
        .engine()
        .compose_up(app_id, &sanitized.executable_path, &envs)
        .await?;

    // detecting-containers
    advance(
        reporter,
        DeployStage::DetectingContainers,
        "detecting containers",
    );
    let mut container_names = detect_containers(manager.engine(), app_id).await;
    if container_names.is_empty() {
        container_names = fallback_candidates(manifest.as_ref(), app_id);
        tracing::warn!(
            app_id,
            "container detection failed; falling back to generated names {:?}",
            container_names
        );
    }
    let primary = inventory::select_primary(&container_names)
        .cloned()
        .unwrap_or_else(|| app_id.to_string());
    reporter.set_container_name(primary.clone());

    // persisting
    advance(reporter, DeployStage::Persisting, "persisting install record");
    persist_record(
        manager,
        options,
        &resolved.manifest_path,
        manifest.as_ref(),
        &primary,
        container_names,
    )
    .await?;

    Ok(primary)
}

async fn check_dependencies(manager: &AppManager, options: &DeployOptions) -> BerthResult<()> {
    let mut missing = Vec::new();
    for dependency in options.get_dependencies() {
        let installed = db::get_installed_apps_by_app_id(manager.pool(), dependency).await?;
        if installed.is_empty() {
            missing.push(dependency.clone());
        }
    }

    if missing.is_empty() {
        Ok(())
    } else {
        Err(BerthError::MissingDependencies(missing))
    }
}

/// Every container name currently associated with an app: recorded names plus
/// the app id itself (the single expected name when nothing was recorded).
async fn existing_candidates(manager: &AppManager, app_id: &str) -> BerthResult<Vec<String>> {
    let mut candidates = Vec::new();
    for record in db::get_installed_apps_by_app_id(manager.pool(), app_id).await? {
        candidates.push(record.container_name.clone());
        candidates.extend(record.container_names);
    }
    candidates.push(app_id.to_string());
    candidates.dedup();
    Ok(candidates)
}

/// Copies non-metadata files living alongside the manifest into the app's
/// data directory.
///
/// This guards a known engine failure mode: a missing bind-mount source is
/// auto-created by the engine as a *directory*, breaking an intended file
/// mount. Such a directory is deleted and replaced with the real file. A
/// destination that is already a regular file is left alone.
async fn pre_seed(install_dir: &Path, data_dir: &Path) -> BerthResult<usize> {
    fs::create_dir_all(data_dir).await?;

    let mut seeded = 0;
    let mut entries = fs::read_dir(install_dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        // Manifests and hidden files (secrets sidecar, engine derivative) are
        // metadata, not seed data.
        if name.starts_with('.') || COMPOSE_FILENAMES.contains(&name) {
            continue;
        }

        let destination = data_dir.join(name);
        let existing = fs::metadata(&destination).await;
        if let Ok(metadata) = &existing {
            if metadata.is_file() {
                continue;
            }
            if metadata.is_dir() {
                fs::remove_dir_all(&destination).await?;
            }
        }

        fs::copy(&path, &destination).await?;
        if name.ends_with(".sh") {
            #[cfg(unix)]
            set_executable(&destination).await?;
        }
        seeded += 1;
    }

    Ok(seeded)
}

async fn detect_containers(engine: &Engine, project: &str) -> Vec<String> {
    for attempt in 1..=DETECT_ATTEMPTS {
        match engine.project_container_names(project).await {
            Ok(names) if !names.is_empty() => return names,
            Ok(_) => {
                tracing::debug!(project, attempt, "no containers registered yet");
            }
            Err(e) => {
                tracing::warn!(project, attempt, "container detection errored: {}", e);
            }
        }
        if attempt < DETECT_ATTEMPTS {
            time::sleep(DETECT_BACKOFF).await;
        }
    }

    Vec::new()
}

/// Deterministic container names when detection never succeeds: the engine's
/// `<project>-<service>-1` convention from the manifest, the app id as last
/// resort. Detection failure must not fail the whole deployment.
fn fallback_candidates(manifest: Option<&ComposeManifest>, app_id: &str) -> Vec<String> {
    let candidates = manifest
        .map(|m| m.container_name_candidates(app_id))
        .unwrap_or_default();

    if candidates.is_empty() {
        vec![app_id.to_string()]
    } else {
        candidates
    }
}

async fn persist_record(
    manager: &AppManager,
    options: &DeployOptions,
    canonical_path: &Path,
    manifest: Option<&ComposeManifest>,
    primary: &str,
    container_names: Vec<String>,
) -> BerthResult<()> {
    let config = options.get_install_config().clone();

    // Explicit user config wins over manifest-extracted values.
    let web_ui_port = config
        .as_ref()
        .and_then(|c| c.web_ui_port)
        .or_else(|| manifest.and_then(ComposeManifest::web_ui_port));
    let network_mode = config
        .as_ref()
        .and_then(|c| c.network_mode.clone())
        .or_else(|| manifest.and_then(|m| m.network_mode().map(String::from)));

    let mut record = InstalledApp::new(
        options.get_app_id().clone(),
        primary,
        container_names,
        canonical_path.display().to_string(),
    );
    record.install_config = config;
    record.store_id = *options.get_store_id();
    record.metadata = options.get_metadata().clone();
    record.version = options.get_version().clone();
    record.web_ui_port = web_ui_port;
    record.network_mode = network_mode;

    db::upsert_installed_app(manager.pool(), &record).await?;
    Ok(())
}

fn advance(reporter: &mut ProgressReporter, stage: DeployStage, message: &str) {
    tracing::info!(stage = stage.as_str(), "{}", message);
    reporter.emit(stage.progress(), ProgressStatus::Running, message);
}

fn log_failure(options: &DeployOptions, error: &BerthError) {
    match error {
        BerthError::Engine { stage, diagnostic } => {
            tracing::error!(
                app_id = %options.get_app_id(),
                stage = %stage,
                exit_code = ?diagnostic.exit_code,
                signal = ?diagnostic.signal,
                stdout_tail = %diagnostic.stdout_tail,
                stderr_tail = %diagnostic.stderr_tail,
                "deployment failed: {}",
                diagnostic.command
            );
        }
        _ => {
            tracing::error!(
                app_id = %options.get_app_id(),
                "deployment failed: {}",
                error
            );
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_stage_progress_is_strictly_increasing() {
        let stages = [
            DeployStage::Validating,
            DeployStage::CheckingDependencies,
            DeployStage::ResolvingCompose,
            DeployStage::Sanitizing,
            DeployStage::PreSeeding,
            DeployStage::Pulling,
            DeployStage::Starting,
            DeployStage::DetectingContainers,
            DeployStage::Persisting,
            DeployStage::Completed,
        ];

        let values: Vec<f32> = stages.iter().map(DeployStage::progress).collect();
        assert!(values.windows(2).all(|w| w[0] < w[1]), "{:?}", values);
        assert_eq!(*values.last().unwrap(), 1.0);
    }

    #[test]
    fn test_fallback_candidates() {
        let manifest = ComposeManifest::from_str(
            "services:\n  web:\n    image: nginx\n  db:\n    image: mariadb\n",
        )
        .unwrap();

        let candidates = fallback_candidates(Some(&manifest), "app");
        assert!(candidates.contains(&"app-web-1".to_string()));
        assert!(candidates.contains(&"app-db-1".to_string()));

        assert_eq!(fallback_candidates(None, "app"), vec!["app".to_string()]);
    }

    #[tokio::test]
    async fn test_pre_seed_skips_metadata_and_replaces_squatting_dirs() -> BerthResult<()> {
        let install = tempdir()?;
        let data = tempdir()?;

        fs::write(install.path().join("docker-compose.yml"), "services: {}").await?;
        fs::write(install.path().join(".app-secrets.json"), "{}").await?;
        fs::write(install.path().join("seed.conf"), "key=value").await?;
        fs::write(install.path().join("entrypoint.sh"), "#!/bin/sh\n").await?;

        // The engine auto-created a directory where a file mount belongs.
        fs::create_dir(data.path().join("seed.conf")).await?;

        let seeded = pre_seed(install.path(), data.path()).await?;

        assert_eq!(seeded, 2);
        assert!(data.path().join("seed.conf").is_file());
        assert!(data.path().join("entrypoint.sh").is_file());
        assert!(!data.path().join("docker-compose.yml").exists());
        assert!(!data.path().join(".app-secrets.json").exists());

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(data.path().join("entrypoint.sh"))?
                .permissions()
                .mode();
            assert_eq!(mode & 0o111, 0o111);
        }

        Ok(())
    }

    #[tokio::test]
    async fn test_pre_seed_never_overwrites_existing_files() -> BerthResult<()> {
        let install = tempdir()?;
        let data = tempdir()?;

        fs::write(install.path().join("seed.conf"), "fresh").await?;
        fs::write(data.path().join("seed.conf"), "user-edited").await?;

        pre_seed(install.path(), data.path()).await?;

        let contents = fs::read_to_string(data.path().join("seed.conf")).await?;
        assert_eq!(contents, "user-edited");

        Ok(())
    }
}
