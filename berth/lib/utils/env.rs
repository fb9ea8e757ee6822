use std::{env, path::PathBuf};

use crate::utils::path::{BERTH_HOME_ENV_VAR, DEFAULT_BERTH_HOME};

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Returns the berth home directory, honoring the `BERTH_HOME` override.
pub fn get_berth_home_path() -> PathBuf {
    match env::var(BERTH_HOME_ENV_VAR) {
        Ok(value) if !value.trim().is_empty() => PathBuf::from(value),
        _ => DEFAULT_BERTH_HOME.clone(),
    }
}

/// Returns the device hostname, best-effort.
///
/// Checks the `HOSTNAME` environment variable first, then `/etc/hostname`,
/// falling back to `localhost` when neither yields a usable name.
pub fn get_device_hostname() -> String {
    if let Ok(name) = env::var("HOSTNAME") {
        let name = name.trim().to_string();
        if !name.is_empty() {
            return name;
        }
    }

    if let Ok(contents) = std::fs::read_to_string("/etc/hostname") {
        let name = contents.trim().to_string();
        if !name.is_empty() {
            return name;
        }
    }

    "localhost".to_string()
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_hostname_is_never_empty() {
        assert!(!get_device_hostname().is_empty());
    }
}
