use std::{path::PathBuf, sync::LazyLock};

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// The sub directory under the user's home where berth state lives by default.
pub const BERTH_HOME_DIR: &str = ".berth";

/// The environment variable that overrides the berth home directory.
pub const BERTH_HOME_ENV_VAR: &str = "BERTH_HOME";

/// The sub directory where per-app persistent data volumes live.
pub const APP_DATA_SUBDIR: &str = "data";

/// The sub directory where canonical app install directories (manifests and
/// supporting files) live.
pub const INSTALLS_SUBDIR: &str = "installs";

/// The sub directory where soft-deleted app data is kept until the trash is emptied.
pub const TRASH_SUBDIR: &str = "trash";

/// The filename of the berth state database.
pub const APP_DB_FILENAME: &str = "berth.db";

/// The canonical manifest filename written into an app's install directory.
pub const COMPOSE_FILENAME: &str = "docker-compose.yml";

/// Manifest filenames recognized when resolving an app directory.
pub const COMPOSE_FILENAMES: [&str; 4] = [
    "docker-compose.yml",
    "docker-compose.yaml",
    "compose.yml",
    "compose.yaml",
];

/// The sidecar filename holding per-app generated secrets.
pub const SECRETS_FILENAME: &str = ".app-secrets.json";

/// The suffix appended to a manifest path while an update holds a backup of it.
pub const MANIFEST_BACKUP_SUFFIX: &str = "update-backup";

/// The maximum number of directory levels the resolver descends when searching
/// catalog roots for an app's manifest.
pub const CATALOG_SEARCH_DEPTH: usize = 4;

/// The path where all berth state is stored by default.
pub static DEFAULT_BERTH_HOME: LazyLock<PathBuf> = LazyLock::new(|| {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(BERTH_HOME_DIR)
});
