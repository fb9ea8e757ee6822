//! Process environment construction for engine invocations.
//!
//! Catalog manifests lean on interpolated variables for everything that
//! differs per device: uid/gid, timezone, data paths, hostnames, generated
//! credentials. This module assembles that environment in a fixed precedence:
//! system defaults first, catalog conventions second, user overrides last.
//! User config always wins.

use std::{collections::BTreeMap, path::Path};

use rand::{distributions::Alphanumeric, Rng};
use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::{
    config::{InstallConfig, Settings},
    utils::{get_device_hostname, set_owner_only, SECRETS_FILENAME},
    BerthResult,
};

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// Length of the generated app password.
const APP_PASSWORD_LENGTH: usize = 24;

/// Size of the generated app seed, in bytes (256 bits).
const APP_SEED_BYTES: usize = 32;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Per-app generated credentials, persisted next to the manifest so dependent
/// services keep stable secrets across restarts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppSecrets {
    /// A random alphanumeric password.
    pub password: String,

    /// A 256-bit hex-encoded seed.
    pub seed: String,
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Builds the process environment for an app's engine invocations.
pub async fn build_app_env(
    settings: &Settings,
    app_id: &str,
    install_dir: &Path,
    config: Option<&InstallConfig>,
) -> BerthResult<BTreeMap<String, String>> {
    let mut env = BTreeMap::new();

    // System defaults.
    env.insert("PUID".to_string(), host_uid().to_string());
    env.insert("PGID".to_string(), host_gid().to_string());
    env.insert("TZ".to_string(), settings.get_timezone().clone());

    // App identity, in the casings different catalogs expect.
    env.insert("APP_ID".to_string(), app_id.to_string());
    env.insert("AppID".to_string(), app_id.to_string());
    env.insert("app_id".to_string(), app_id.to_string());

    // Per-app persistent data directory.
    env.insert(
        "APP_DATA_DIR".to_string(),
        settings.app_data_dir(app_id).display().to_string(),
    );

    // Device identity, best-effort.
    let hostname = settings
        .get_hostname()
        .clone()
        .unwrap_or_else(get_device_hostname);
    env.insert("DEVICE_HOSTNAME".to_string(), hostname.clone());
    env.insert("DEVICE_DOMAIN_NAME".to_string(), format!("{}.local", hostname));

    // Generated credentials, stable across runs.
    let secrets = ensure_app_secrets(install_dir).await?;
    env.insert("APP_PASSWORD".to_string(), secrets.password);
    env.insert("APP_SEED".to_string(), secrets.seed);

    // User overrides are applied last and always win.
    if let Some(config) = config {
        for port in &config.ports {
            env.insert(format!("PORT_{}", port.container()), port.host().to_string());
        }

        for volume in &config.volumes {
            env.insert(volume.env_key(), volume.source().to_string());
        }

        for var in &config.envs {
            env.insert(var.name().to_string(), var.value().to_string());
        }
    }

    Ok(env)
}

/// Loads the app's secrets sidecar, generating and persisting it on first
/// run. The file sits next to the manifest with owner-only permissions.
pub async fn ensure_app_secrets(install_dir: &Path) -> BerthResult<AppSecrets> {
    let path = install_dir.join(SECRETS_FILENAME);

    if let Ok(contents) = fs::read_to_string(&path).await {
        match serde_json::from_str::<AppSecrets>(&contents) {
            Ok(secrets) => return Ok(secrets),
            Err(e) => {
                tracing::warn!(
                    "regenerating unreadable secrets sidecar {}: {}",
                    path.display(),
                    e
                );
            }
        }
    }

    let secrets = generate_secrets();

    fs::create_dir_all(install_dir).await?;
    fs::write(&path, serde_json::to_string_pretty(&secrets)?).await?;
    #[cfg(unix)]
    set_owner_only(&path).await?;

    tracing::info!("generated secrets sidecar at {}", path.display());
    Ok(secrets)
}

//--------------------------------------------------------------------------------------------------
// Functions: Helpers
//--------------------------------------------------------------------------------------------------

fn generate_secrets() -> AppSecrets {
    let mut rng = rand::thread_rng();

    let password: String = (&mut rng)
        .sample_iter(&Alphanumeric)
        .take(APP_PASSWORD_LENGTH)
        .map(char::from)
        .collect();

    let mut seed = [0u8; APP_SEED_BYTES];
    rng.fill(&mut seed[..]);

    AppSecrets {
        password,
        seed: hex::encode(seed),
    }
}

fn host_uid() -> u32 {
    #[cfg(unix)]
    {
        nix::unistd::getuid().as_raw()
    }
    #[cfg(not(unix))]
    {
        1000
    }
}

fn host_gid() -> u32 {
    #[cfg(unix)]
    {
        nix::unistd::getgid().as_raw()
    }
    #[cfg(not(unix))]
    {
        1000
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EnvVar, PortMapping, VolumeMapping};
    use tempfile::tempdir;

    fn test_settings(home: &Path) -> Settings {
        Settings::under_home(home)
    }

    #[tokio::test]
    async fn test_defaults_are_present() {
        let home = tempdir().unwrap();
        let settings = test_settings(home.path());
        let install_dir = home.path().join("installs").join("app");

        let env = build_app_env(&settings, "app", &install_dir, None)
            .await
            .unwrap();

        assert!(env.contains_key("PUID"));
        assert!(env.contains_key("PGID"));
        assert_eq!(env["TZ"], "Etc/UTC");
        assert_eq!(env["APP_ID"], "app");
        assert_eq!(env["AppID"], "app");
        assert_eq!(env["app_id"], "app");
        assert!(env["APP_DATA_DIR"].ends_with("data/app"));
        assert!(env["DEVICE_DOMAIN_NAME"].ends_with(".local"));
        assert_eq!(env["APP_PASSWORD"].len(), APP_PASSWORD_LENGTH);
        assert_eq!(env["APP_SEED"].len(), APP_SEED_BYTES * 2);
    }

    #[tokio::test]
    async fn test_user_overrides_always_win() {
        let home = tempdir().unwrap();
        let settings = test_settings(home.path());
        let install_dir = home.path().join("installs").join("app");

        let config = InstallConfig::builder()
            .ports(vec![PortMapping::new(8080, 80)])
            .volumes(vec![VolumeMapping::new("/srv/media", "/var/www/html", false)])
            .envs(vec![
                EnvVar::new("TZ", "Europe/Rome"),
                EnvVar::new("EXTRA", "1"),
            ])
            .build();

        let env = build_app_env(&settings, "app", &install_dir, Some(&config))
            .await
            .unwrap();

        assert_eq!(env["PORT_80"], "8080");
        assert_eq!(env["VOLUME_VAR_WWW_HTML"], "/srv/media");
        assert_eq!(env["TZ"], "Europe/Rome");
        assert_eq!(env["EXTRA"], "1");
    }

    #[tokio::test]
    async fn test_secrets_are_stable_across_runs() {
        let install_dir = tempdir().unwrap();

        let first = ensure_app_secrets(install_dir.path()).await.unwrap();
        let second = ensure_app_secrets(install_dir.path()).await.unwrap();

        assert_eq!(first, second);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_secrets_sidecar_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let install_dir = tempdir().unwrap();
        ensure_app_secrets(install_dir.path()).await.unwrap();

        let mode = std::fs::metadata(install_dir.path().join(SECRETS_FILENAME))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
