use getset::Getters;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use typed_builder::TypedBuilder;

use crate::config::{EnvVar, PortMapping, VolumeMapping};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// User-supplied overrides applied on top of an app's manifest.
///
/// This is the typed form of what gets persisted in the install record's JSON
/// column; it is validated when read back rather than treated as free-form
/// data.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TypedBuilder)]
pub struct InstallConfig {
    /// Port overrides, surfaced to the engine as `PORT_<container-port>`.
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    #[builder(default)]
    pub ports: Vec<PortMapping>,

    /// Volume overrides, surfaced as normalized `VOLUME_<MOUNT>` entries.
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    #[builder(default)]
    pub volumes: Vec<VolumeMapping>,

    /// Environment entries applied verbatim.
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    #[builder(default)]
    pub envs: Vec<EnvVar>,

    /// The externally reachable web-UI port. Wins over any port extracted
    /// from the manifest.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    #[builder(default, setter(into))]
    pub web_ui_port: Option<u16>,

    /// The network mode. Wins over any mode extracted from the manifest.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    #[builder(default, setter(strip_option, into))]
    pub network_mode: Option<String>,
}

/// Everything a single deployment attempt needs.
///
/// The manifest source is at most one of `compose_content` (inline YAML,
/// takes precedence) or `compose_path` (an external file to copy in); when
/// neither is set the app is expected to already have a canonical install
/// directory or a catalog entry.
#[derive(Debug, Clone, TypedBuilder, Getters)]
#[getset(get = "pub with_prefix")]
pub struct DeployOptions {
    /// The app identifier, used as the engine project name and the install
    /// directory name.
    #[builder(setter(into))]
    app_id: String,

    /// Raw compose manifest content supplied inline.
    #[builder(default, setter(into))]
    compose_content: Option<String>,

    /// An existing compose manifest path outside the install root.
    #[builder(default, setter(into))]
    compose_path: Option<PathBuf>,

    /// User overrides for ports, volumes, environment, web UI, and network.
    #[builder(default, setter(strip_option))]
    install_config: Option<InstallConfig>,

    /// Display name for progress events and listings.
    #[builder(default, setter(into))]
    display_name: Option<String>,

    /// Icon reference for progress events and listings.
    #[builder(default, setter(strip_option, into))]
    icon: Option<String>,

    /// The catalog store this install came from, if any.
    #[builder(default, setter(strip_option))]
    store_id: Option<i64>,

    /// Container metadata preserved across redeploys (free-form snapshot).
    #[builder(default, setter(strip_option))]
    metadata: Option<serde_json::Value>,

    /// The app version being deployed.
    #[builder(default, setter(strip_option, into))]
    version: Option<String>,

    /// Apps that must already be installed before this one deploys.
    #[builder(default)]
    dependencies: Vec<String>,
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_install_config_json_round_trip() {
        let config = InstallConfig::builder()
            .ports(vec!["8080:80".parse().unwrap()])
            .volumes(vec!["/srv/data:/data".parse().unwrap()])
            .envs(vec!["TZ=UTC".parse().unwrap()])
            .web_ui_port(8080)
            .build();

        let json = serde_json::to_string(&config).unwrap();
        let back: InstallConfig = serde_json::from_str(&json).unwrap();

        assert_eq!(back, config);
    }

    #[test]
    fn test_install_config_rejects_malformed_entries() {
        let garbage = r#"{"ports": ["not-a-port"]}"#;
        assert!(serde_json::from_str::<InstallConfig>(garbage).is_err());
    }

    #[test]
    fn test_deploy_options_defaults() {
        let options = DeployOptions::builder().app_id("jellyfin").build();

        assert_eq!(options.get_app_id(), "jellyfin");
        assert!(options.get_compose_content().is_none());
        assert!(options.get_compose_path().is_none());
        assert!(options.get_dependencies().is_empty());
    }
}
