use chrono::{DateTime, Utc};

use crate::config::InstallConfig;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// A catalog store apps can be installed from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Store {
    /// Row id.
    pub id: i64,

    /// The store's display name. Unique.
    pub name: String,

    /// Where the store's feed lives, when it is remote.
    pub url: Option<String>,

    /// When the row was created.
    pub created_at: DateTime<Utc>,
}

/// A catalog app entry, as imported from a store feed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CatalogApp {
    /// Row id.
    pub id: i64,

    /// The store the entry came from, if any.
    pub store_id: Option<i64>,

    /// The app identifier within the catalog.
    pub slug: String,

    /// Display name.
    pub name: Option<String>,

    /// Icon reference.
    pub icon: Option<String>,

    /// Where the store's copy of the compose manifest lives. Never used
    /// directly for a running install; the resolver copies it into the
    /// canonical install directory.
    pub compose_path: Option<String>,

    /// The catalog's current version of the app.
    pub version: Option<String>,
}

/// A durable record of one installed app, keyed by its primary container.
#[derive(Debug, Clone, PartialEq)]
pub struct InstalledApp {
    /// Row id.
    pub id: i64,

    /// The app identifier (also the engine project name).
    pub app_id: String,

    /// The primary container name. Unique across installs.
    pub container_name: String,

    /// Every container name the install owns, primary included.
    pub container_names: Vec<String>,

    /// The canonical (non-sanitized) manifest path.
    pub compose_path: String,

    /// User overrides, validated at the persistence boundary.
    pub install_config: Option<InstallConfig>,

    /// The store this install came from, if any.
    pub store_id: Option<i64>,

    /// Container metadata snapshot preserved across redeploys.
    pub metadata: Option<serde_json::Value>,

    /// The installed app version.
    pub version: Option<String>,

    /// The externally reachable web-UI port.
    pub web_ui_port: Option<u16>,

    /// The network mode the app runs under.
    pub network_mode: Option<String>,

    /// When the record was created.
    pub created_at: DateTime<Utc>,

    /// When the record was last updated.
    pub modified_at: DateTime<Utc>,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl InstalledApp {
    /// Builds a fresh record ready for upserting. Row id and timestamps are
    /// assigned by the database.
    pub fn new(
        app_id: impl Into<String>,
        container_name: impl Into<String>,
        container_names: Vec<String>,
        compose_path: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            app_id: app_id.into(),
            container_name: container_name.into(),
            container_names,
            compose_path: compose_path.into(),
            install_config: None,
            store_id: None,
            metadata: None,
            version: None,
            web_ui_port: None,
            network_mode: None,
            created_at: now,
            modified_at: now,
        }
    }
}
