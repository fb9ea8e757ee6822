use std::path::{Path, PathBuf};

use getset::Getters;
use typed_builder::TypedBuilder;

use crate::{
    utils::{
        get_berth_home_path, APP_DATA_SUBDIR, APP_DB_FILENAME, INSTALLS_SUBDIR, TRASH_SUBDIR,
    },
    BerthResult,
};

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// The engine CLI used when none is configured.
pub const DEFAULT_ENGINE_BIN: &str = "docker";

/// The timezone handed to apps when the host gives no better answer.
pub const DEFAULT_TIMEZONE: &str = "Etc/UTC";

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Explicit configuration for every berth operation.
///
/// Built once (usually from the berth home directory) and threaded through
/// all calls; nothing below this layer reads process-global state.
#[derive(Debug, Clone, TypedBuilder, Getters)]
#[getset(get = "pub with_prefix")]
pub struct Settings {
    /// Root under which each app gets a persistent data directory.
    #[builder(setter(into))]
    data_dir: PathBuf,

    /// Root under which each app gets a canonical install directory holding
    /// its manifest and supporting files.
    #[builder(setter(into))]
    install_dir: PathBuf,

    /// Where soft-deleted app data is moved until the trash is emptied.
    #[builder(setter(into))]
    trash_dir: PathBuf,

    /// Path of the berth state database.
    #[builder(setter(into))]
    db_path: PathBuf,

    /// Catalog roots searched (bounded depth) when resolving manifests.
    #[builder(default)]
    catalog_dirs: Vec<PathBuf>,

    /// The container engine CLI binary.
    #[builder(default = DEFAULT_ENGINE_BIN.to_string(), setter(into))]
    engine_bin: String,

    /// Timezone default handed to apps.
    #[builder(default = DEFAULT_TIMEZONE.to_string(), setter(into))]
    timezone: String,

    /// Overrides the detected device hostname when set.
    #[builder(default, setter(strip_option, into))]
    hostname: Option<String>,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl Settings {
    /// Builds settings rooted at the given home directory, using the standard
    /// layout (`data/`, `installs/`, `trash/`, `berth.db`).
    pub fn under_home(home: impl AsRef<Path>) -> Self {
        let home = home.as_ref();
        Settings::builder()
            .data_dir(home.join(APP_DATA_SUBDIR))
            .install_dir(home.join(INSTALLS_SUBDIR))
            .trash_dir(home.join(TRASH_SUBDIR))
            .db_path(home.join(APP_DB_FILENAME))
            .build()
    }

    /// Builds settings from the berth home directory, honoring `BERTH_HOME`.
    pub fn resolve_home() -> BerthResult<Self> {
        Ok(Self::under_home(get_berth_home_path()))
    }

    /// The persistent data directory for one app.
    pub fn app_data_dir(&self, app_id: &str) -> PathBuf {
        self.data_dir.join(app_id)
    }

    /// The canonical install directory for one app.
    pub fn app_install_dir(&self, app_id: &str) -> PathBuf {
        self.install_dir.join(app_id)
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_under_home_layout() {
        let settings = Settings::under_home("/tmp/berth-home");

        assert_eq!(
            settings.app_data_dir("nextcloud"),
            PathBuf::from("/tmp/berth-home/data/nextcloud")
        );
        assert_eq!(
            settings.app_install_dir("nextcloud"),
            PathBuf::from("/tmp/berth-home/installs/nextcloud")
        );
        assert_eq!(settings.get_engine_bin(), DEFAULT_ENGINE_BIN);
        assert!(settings.get_catalog_dirs().is_empty());
    }
}
