//! Compose manifest model.
//!
//! This is a deliberately loose mapping of the compose format: berth only
//! interprets the handful of keys it needs (service identity, images, ports,
//! network mode) and round-trips everything else untouched through `extra`
//! maps, so manifests written by catalogs or users are never rewritten beyond
//! what sanitization requires.

use std::{collections::BTreeMap, path::Path};

use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use tokio::fs;

use crate::BerthResult;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// A parsed compose manifest: one or more named services.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComposeManifest {
    /// The services declared by the manifest.
    #[serde(default)]
    pub services: BTreeMap<String, ComposeService>,

    /// Top-level keys berth does not interpret (networks, volumes, x-*).
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// A single service entry in a compose manifest.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComposeService {
    /// The image reference to run.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub image: Option<String>,

    /// The build instruction, either a context string or a mapping.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub build: Option<Value>,

    /// An explicit container name, overriding the engine's generated one.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub container_name: Option<String>,

    /// The network mode (e.g. `host`, `bridge`).
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub network_mode: Option<String>,

    /// Port mappings, in short or long syntax.
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub ports: Vec<Value>,

    /// Volume mappings, in short or long syntax.
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub volumes: Vec<Value>,

    /// Environment entries, list or map form.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub environment: Option<Value>,

    /// Service keys berth does not interpret.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl ComposeManifest {
    /// Parses a manifest from YAML text.
    pub fn from_str(contents: &str) -> BerthResult<Self> {
        Ok(serde_yaml::from_str(contents)?)
    }

    /// Reads and parses a manifest file.
    pub async fn load(path: impl AsRef<Path>) -> BerthResult<Self> {
        let contents = fs::read_to_string(path.as_ref()).await?;
        Self::from_str(&contents)
    }

    /// Returns the declared service names.
    pub fn service_names(&self) -> Vec<&str> {
        self.services.keys().map(String::as_str).collect()
    }

    /// Returns the container names the engine is expected to produce for a
    /// given project name: the explicit `container_name` when a service sets
    /// one, otherwise the engine's `<project>-<service>-1` convention.
    pub fn container_name_candidates(&self, project: &str) -> Vec<String> {
        self.services
            .iter()
            .map(|(service, config)| match &config.container_name {
                Some(name) => name.clone(),
                None => format!("{}-{}-1", project, service),
            })
            .collect()
    }

    /// Extracts the lowest host-side port published by any service, used as
    /// the web-UI port when the install config does not set one explicitly.
    pub fn web_ui_port(&self) -> Option<u16> {
        self.services
            .values()
            .flat_map(|service| service.ports.iter())
            .filter_map(host_port_of)
            .min()
    }

    /// Returns the first declared network mode, if any service sets one.
    pub fn network_mode(&self) -> Option<&str> {
        self.services
            .values()
            .find_map(|service| service.network_mode.as_deref())
    }
}

impl ComposeService {
    /// Whether the service can actually be deployed: catalogs commonly emit
    /// placeholder entries with neither an image nor a build instruction.
    pub fn is_runnable(&self) -> bool {
        self.image.is_some() || self.build.is_some()
    }
}

//--------------------------------------------------------------------------------------------------
// Functions: Helpers
//--------------------------------------------------------------------------------------------------

/// Extracts the published host port from one compose `ports` entry.
///
/// Handles the short syntaxes `"8080:80"`, `"127.0.0.1:8080:80"`, and
/// `"8080:80/tcp"`, plus the long-syntax mapping with a `published` key.
/// A bare container port (`"80"`) publishes to an ephemeral host port and
/// yields `None`.
fn host_port_of(entry: &Value) -> Option<u16> {
    match entry {
        Value::String(s) => {
            let without_proto = s.split('/').next().unwrap_or(s);
            let parts: Vec<&str> = without_proto.split(':').collect();
            match parts.as_slice() {
                [host, _container] => host.parse().ok(),
                [_ip, host, _container] => host.parse().ok(),
                _ => None,
            }
        }
        Value::Mapping(map) => {
            let published = map.get("published")?;
            match published {
                Value::Number(n) => n.as_u64().and_then(|n| u16::try_from(n).ok()),
                Value::String(s) => s.parse().ok(),
                _ => None,
            }
        }
        _ => None,
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const MANIFEST: &str = r#"
services:
  web:
    image: nextcloud:latest
    ports:
      - "8080:80"
      - "8443:443/tcp"
  db:
    image: mariadb:11
    container_name: nextcloud-database
  stub:
    restart: unless-stopped
"#;

    #[test]
    fn test_manifest_parses_and_classifies_services() {
        let manifest = ComposeManifest::from_str(MANIFEST).unwrap();

        assert_eq!(manifest.services.len(), 3);
        assert!(manifest.services["web"].is_runnable());
        assert!(manifest.services["db"].is_runnable());
        assert!(!manifest.services["stub"].is_runnable());
    }

    #[test]
    fn test_container_name_candidates_follow_engine_convention() {
        let manifest = ComposeManifest::from_str(MANIFEST).unwrap();
        let candidates = manifest.container_name_candidates("nextcloud");

        assert!(candidates.contains(&"nextcloud-web-1".to_string()));
        assert!(candidates.contains(&"nextcloud-database".to_string()));
    }

    #[test]
    fn test_web_ui_port_picks_lowest_published_port() {
        let manifest = ComposeManifest::from_str(MANIFEST).unwrap();
        assert_eq!(manifest.web_ui_port(), Some(8080));
    }

    #[test]
    fn test_host_port_of_handles_all_syntaxes() {
        let string = Value::String("127.0.0.1:9000:9000".to_string());
        assert_eq!(host_port_of(&string), Some(9000));

        let container_only = Value::String("80".to_string());
        assert_eq!(host_port_of(&container_only), None);

        let long: Value = serde_yaml::from_str("{ target: 80, published: 8081 }").unwrap();
        assert_eq!(host_port_of(&long), Some(8081));
    }

    #[test]
    fn test_unknown_keys_survive_round_trip() {
        let manifest = ComposeManifest::from_str(MANIFEST).unwrap();
        let rendered = serde_yaml::to_string(&manifest).unwrap();
        let reparsed = ComposeManifest::from_str(&rendered).unwrap();

        assert!(reparsed.services["stub"].extra.contains_key("restart"));
    }
}
