use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::BerthError;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// A host-to-container port mapping, following the engine's `host:container`
/// convention.
///
/// A bare port (`"8080"`) maps the same number on both sides. Port `0` is
/// rejected on either side; the engine treats it as "pick any", which would
/// make install records unstable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortMapping {
    host: u16,
    container: u16,
}

/// A host-path-to-container-path volume mapping, `source:target[:ro]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeMapping {
    source: String,
    target: String,
    read_only: bool,
}

/// A `NAME=VALUE` environment variable entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvVar {
    name: String,
    value: String,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl PortMapping {
    /// Creates a new mapping from a host port to a container port.
    pub fn new(host: u16, container: u16) -> Self {
        Self { host, container }
    }

    /// Returns the host-side port.
    pub fn host(&self) -> u16 {
        self.host
    }

    /// Returns the container-side port.
    pub fn container(&self) -> u16 {
        self.container
    }
}

impl VolumeMapping {
    /// Creates a new volume mapping.
    pub fn new(source: impl Into<String>, target: impl Into<String>, read_only: bool) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            read_only,
        }
    }

    /// Returns the host-side source path.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Returns the container-side target path.
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Returns whether the mount is read-only.
    pub fn read_only(&self) -> bool {
        self.read_only
    }

    /// Returns the environment key this override is surfaced under, e.g.
    /// `/var/www/html` becomes `VOLUME_VAR_WWW_HTML`.
    pub fn env_key(&self) -> String {
        let normalized: String = self
            .target
            .trim_matches('/')
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() {
                    c.to_ascii_uppercase()
                } else {
                    '_'
                }
            })
            .collect();

        format!("VOLUME_{}", normalized)
    }
}

impl EnvVar {
    /// Creates a new environment variable entry.
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    /// Returns the variable name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the variable value.
    pub fn value(&self) -> &str {
        &self.value
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl FromStr for PortMapping {
    type Err = BerthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || BerthError::InvalidPortMapping(s.to_string());

        let (host, container) = match s.split_once(':') {
            Some((host, container)) => (
                host.parse::<u16>().map_err(|_| invalid())?,
                container.parse::<u16>().map_err(|_| invalid())?,
            ),
            None => {
                let port = s.parse::<u16>().map_err(|_| invalid())?;
                (port, port)
            }
        };

        if host == 0 || container == 0 {
            return Err(invalid());
        }

        Ok(Self { host, container })
    }
}

impl fmt::Display for PortMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.container)
    }
}

impl FromStr for VolumeMapping {
    type Err = BerthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || BerthError::InvalidVolumeMapping(s.to_string());

        let mut parts = s.split(':');
        let source = parts.next().filter(|p| !p.is_empty()).ok_or_else(invalid)?;
        let target = parts.next().filter(|p| !p.is_empty()).ok_or_else(invalid)?;
        let read_only = match parts.next() {
            None => false,
            Some("ro") => true,
            Some("rw") => false,
            Some(_) => return Err(invalid()),
        };

        if parts.next().is_some() {
            return Err(invalid());
        }

        Ok(Self {
            source: source.to_string(),
            target: target.to_string(),
            read_only,
        })
    }
}

impl fmt::Display for VolumeMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.source, self.target)?;
        if self.read_only {
            write!(f, ":ro")?;
        }
        Ok(())
    }
}

impl FromStr for EnvVar {
    type Err = BerthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, value) = s
            .split_once('=')
            .ok_or_else(|| BerthError::InvalidEnvVar(s.to_string()))?;

        if name.trim().is_empty() {
            return Err(BerthError::InvalidEnvVar(s.to_string()));
        }

        Ok(Self {
            name: name.to_string(),
            value: value.to_string(),
        })
    }
}

impl fmt::Display for EnvVar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.name, self.value)
    }
}

macro_rules! string_serde {
    ($type:ty) => {
        impl Serialize for $type {
            fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
            where
                S: serde::Serializer,
            {
                serializer.serialize_str(&self.to_string())
            }
        }

        impl<'de> Deserialize<'de> for $type {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: serde::Deserializer<'de>,
            {
                let s = String::deserialize(deserializer)?;
                Self::from_str(&s).map_err(serde::de::Error::custom)
            }
        }
    };
}

string_serde!(PortMapping);
string_serde!(VolumeMapping);
string_serde!(EnvVar);

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_port_mapping_from_str() {
        assert_eq!(
            "8080:80".parse::<PortMapping>().unwrap(),
            PortMapping::new(8080, 80)
        );
        assert_eq!(
            "8080".parse::<PortMapping>().unwrap(),
            PortMapping::new(8080, 8080)
        );

        assert!("".parse::<PortMapping>().is_err());
        assert!(":80".parse::<PortMapping>().is_err());
        assert!("80:".parse::<PortMapping>().is_err());
        assert!("0:80".parse::<PortMapping>().is_err());
        assert!("80:0".parse::<PortMapping>().is_err());
        assert!("70000:80".parse::<PortMapping>().is_err());
        assert!("web:80".parse::<PortMapping>().is_err());
    }

    #[test]
    fn test_volume_mapping_from_str() {
        let rw = "/host/path:/container/path".parse::<VolumeMapping>().unwrap();
        assert_eq!(rw.source(), "/host/path");
        assert_eq!(rw.target(), "/container/path");
        assert!(!rw.read_only());

        let ro = "/a:/b:ro".parse::<VolumeMapping>().unwrap();
        assert!(ro.read_only());
        assert_eq!(ro.to_string(), "/a:/b:ro");

        assert!("".parse::<VolumeMapping>().is_err());
        assert!("/only-source".parse::<VolumeMapping>().is_err());
        assert!(":/target".parse::<VolumeMapping>().is_err());
        assert!("/a:/b:rx".parse::<VolumeMapping>().is_err());
        assert!("/a:/b:ro:extra".parse::<VolumeMapping>().is_err());
    }

    #[test]
    fn test_volume_mapping_env_key() {
        let mapping = "/data:/var/www/html".parse::<VolumeMapping>().unwrap();
        assert_eq!(mapping.env_key(), "VOLUME_VAR_WWW_HTML");

        let dashed = "/data:/app/my-files".parse::<VolumeMapping>().unwrap();
        assert_eq!(dashed.env_key(), "VOLUME_APP_MY_FILES");
    }

    #[test]
    fn test_env_var_from_str() {
        let var = "TZ=Europe/Rome".parse::<EnvVar>().unwrap();
        assert_eq!(var.name(), "TZ");
        assert_eq!(var.value(), "Europe/Rome");

        let empty_value = "FLAG=".parse::<EnvVar>().unwrap();
        assert_eq!(empty_value.value(), "");

        assert!("NOEQUALS".parse::<EnvVar>().is_err());
        assert!("=value".parse::<EnvVar>().is_err());
    }
}
