use std::path::Path;

use sqlx::{migrate::Migrator, sqlite::SqlitePoolOptions, sqlite::SqliteRow, Pool, Row, Sqlite};
use tokio::fs;

use crate::{config::InstallConfig, management::models::{CatalogApp, InstalledApp, Store}, BerthResult};

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// Migrator for the berth state database.
pub static APP_DB_MIGRATOR: Migrator = sqlx::migrate!("lib/management/migrations/app");

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Initializes a new SQLite database if it doesn't already exist at the
/// specified path, then runs migrations.
///
/// ## Arguments
///
/// * `db_path` - Path where the SQLite database file should be created
/// * `migrator` - SQLx migrator containing database schema migrations to run
pub async fn init_db(db_path: impl AsRef<Path>, migrator: &Migrator) -> BerthResult<Pool<Sqlite>> {
    let db_path = db_path.as_ref();

    // Ensure parent directory exists
    if let Some(parent) = db_path.parent() {
        fs::create_dir_all(parent).await?;
    }

    // Create an empty database file if it doesn't exist
    if !db_path.exists() {
        fs::File::create(&db_path).await?;
    }

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&format!("sqlite://{}?mode=rwc", db_path.display()))
        .await?;

    migrator.run(&pool).await?;

    Ok(pool)
}

/// Creates and returns a connection pool for an existing database.
pub async fn get_db_pool(db_path: impl AsRef<Path>) -> BerthResult<Pool<Sqlite>> {
    let db_path = db_path.as_ref();
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&format!("sqlite://{}?mode=rwc", db_path.display()))
        .await?;

    Ok(pool)
}

/// Saves a store, updating its url if the name already exists. Returns its ID.
pub async fn upsert_store(
    pool: &Pool<Sqlite>,
    name: &str,
    url: Option<&str>,
) -> BerthResult<i64> {
    let record = sqlx::query(
        r#"
        INSERT INTO stores (name, url)
        VALUES (?, ?)
        ON CONFLICT(name) DO UPDATE SET
            url = excluded.url,
            modified_at = CURRENT_TIMESTAMP
        RETURNING id
        "#,
    )
    .bind(name)
    .bind(url)
    .fetch_one(pool)
    .await?;

    Ok(record.get::<i64, _>("id"))
}

/// Finds a store by name.
pub async fn get_store(pool: &Pool<Sqlite>, name: &str) -> BerthResult<Option<Store>> {
    let row = sqlx::query(
        r#"
        SELECT id, name, url, created_at
        FROM stores
        WHERE name = ?
        "#,
    )
    .bind(name)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|row| Store {
        id: row.get("id"),
        name: row.get("name"),
        url: row.get("url"),
        created_at: row.get("created_at"),
    }))
}

/// Saves a catalog app entry, updating it if the (store, slug) pair already
/// exists. Returns its ID.
pub async fn upsert_catalog_app(pool: &Pool<Sqlite>, app: &CatalogApp) -> BerthResult<i64> {
    let record = sqlx::query(
        r#"
        INSERT INTO apps (store_id, slug, name, icon, compose_path, version)
        VALUES (?, ?, ?, ?, ?, ?)
        ON CONFLICT(store_id, slug) DO UPDATE SET
            name = excluded.name,
            icon = excluded.icon,
            compose_path = excluded.compose_path,
            version = excluded.version,
            modified_at = CURRENT_TIMESTAMP
        RETURNING id
        "#,
    )
    .bind(app.store_id)
    .bind(&app.slug)
    .bind(&app.name)
    .bind(&app.icon)
    .bind(&app.compose_path)
    .bind(&app.version)
    .fetch_one(pool)
    .await?;

    Ok(record.get::<i64, _>("id"))
}

/// Finds a catalog app entry by slug, any store.
pub async fn get_catalog_app(pool: &Pool<Sqlite>, slug: &str) -> BerthResult<Option<CatalogApp>> {
    let row = sqlx::query(
        r#"
        SELECT id, store_id, slug, name, icon, compose_path, version
        FROM apps
        WHERE slug = ?
        ORDER BY id
        LIMIT 1
        "#,
    )
    .bind(slug)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|row| CatalogApp {
        id: row.get("id"),
        store_id: row.get("store_id"),
        slug: row.get("slug"),
        name: row.get("name"),
        icon: row.get("icon"),
        compose_path: row.get("compose_path"),
        version: row.get("version"),
    }))
}

/// Deletes every catalog app entry belonging to a store.
pub async fn delete_catalog_apps_for_store(pool: &Pool<Sqlite>, store_id: i64) -> BerthResult<u64> {
    let result = sqlx::query("DELETE FROM apps WHERE store_id = ?")
        .bind(store_id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected())
}

/// Upserts an installed-app record, keyed by its primary container name.
/// Returns its ID.
pub async fn upsert_installed_app(pool: &Pool<Sqlite>, app: &InstalledApp) -> BerthResult<i64> {
    let install_config_json = app
        .install_config
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;
    let metadata_json = app
        .metadata
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;
    let container_names_json = serde_json::to_string(&app.container_names)?;

    let record = sqlx::query(
        r#"
        INSERT INTO installed_apps (
            app_id, container_name, container_names_json, compose_path,
            install_config_json, store_id, metadata_json, version,
            web_ui_port, network_mode
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(container_name) DO UPDATE SET
            app_id = excluded.app_id,
            container_names_json = excluded.container_names_json,
            compose_path = excluded.compose_path,
            install_config_json = excluded.install_config_json,
            store_id = excluded.store_id,
            metadata_json = excluded.metadata_json,
            version = excluded.version,
            web_ui_port = excluded.web_ui_port,
            network_mode = excluded.network_mode,
            modified_at = CURRENT_TIMESTAMP
        RETURNING id
        "#,
    )
    .bind(&app.app_id)
    .bind(&app.container_name)
    .bind(container_names_json)
    .bind(&app.compose_path)
    .bind(install_config_json)
    .bind(app.store_id)
    .bind(metadata_json)
    .bind(&app.version)
    .bind(app.web_ui_port.map(i64::from))
    .bind(&app.network_mode)
    .fetch_one(pool)
    .await?;

    Ok(record.get::<i64, _>("id"))
}

/// Finds an installed app by its primary container name.
pub async fn get_installed_app_by_container_name(
    pool: &Pool<Sqlite>,
    container_name: &str,
) -> BerthResult<Option<InstalledApp>> {
    let row = sqlx::query(
        r#"
        SELECT * FROM installed_apps WHERE container_name = ?
        "#,
    )
    .bind(container_name)
    .fetch_optional(pool)
    .await?;

    Ok(row.as_ref().map(row_to_installed_app))
}

/// Finds every installed-app record for an app identifier. Multi-service
/// apps normally have one record; redeploys under a different primary name
/// can briefly leave more.
pub async fn get_installed_apps_by_app_id(
    pool: &Pool<Sqlite>,
    app_id: &str,
) -> BerthResult<Vec<InstalledApp>> {
    let rows = sqlx::query(
        r#"
        SELECT * FROM installed_apps WHERE app_id = ? ORDER BY id
        "#,
    )
    .bind(app_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.iter().map(row_to_installed_app).collect())
}

/// Lists every installed app.
pub async fn list_installed_apps(pool: &Pool<Sqlite>) -> BerthResult<Vec<InstalledApp>> {
    let rows = sqlx::query("SELECT * FROM installed_apps ORDER BY app_id")
        .fetch_all(pool)
        .await?;

    Ok(rows.iter().map(row_to_installed_app).collect())
}

/// Deletes installed-app records for every given container-name candidate.
/// Returns how many rows were removed.
pub async fn delete_installed_apps_by_container_names(
    pool: &Pool<Sqlite>,
    container_names: &[String],
) -> BerthResult<u64> {
    let mut deleted = 0;
    for name in container_names {
        let result = sqlx::query("DELETE FROM installed_apps WHERE container_name = ?")
            .bind(name)
            .execute(pool)
            .await?;
        deleted += result.rows_affected();
    }

    Ok(deleted)
}

//--------------------------------------------------------------------------------------------------
// Functions: Helpers
//--------------------------------------------------------------------------------------------------

/// Maps an `installed_apps` row into its record type.
///
/// JSON columns are validated here, at the persistence boundary: a corrupt
/// column is logged and surfaced as `None`/name-only rather than poisoning
/// every listing.
fn row_to_installed_app(row: &SqliteRow) -> InstalledApp {
    let container_name: String = row.get("container_name");

    let install_config = row
        .get::<Option<String>, _>("install_config_json")
        .and_then(|json| match serde_json::from_str::<InstallConfig>(&json) {
            Ok(config) => Some(config),
            Err(e) => {
                tracing::warn!(
                    container_name = %container_name,
                    "discarding corrupt install config: {}",
                    e
                );
                None
            }
        });

    let metadata = row
        .get::<Option<String>, _>("metadata_json")
        .and_then(|json| serde_json::from_str(&json).ok());

    let mut container_names =
        serde_json::from_str::<Vec<String>>(&row.get::<String, _>("container_names_json"))
            .unwrap_or_default();
    if container_names.is_empty() {
        container_names = vec![container_name.clone()];
    }

    InstalledApp {
        id: row.get("id"),
        app_id: row.get("app_id"),
        container_name,
        container_names,
        compose_path: row.get("compose_path"),
        install_config,
        store_id: row.get("store_id"),
        metadata,
        version: row.get("version"),
        web_ui_port: row
            .get::<Option<i64>, _>("web_ui_port")
            .and_then(|port| u16::try_from(port).ok()),
        network_mode: row.get("network_mode"),
        created_at: row.get("created_at"),
        modified_at: row.get("modified_at"),
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test_log::test(tokio::test)]
    async fn test_init_db_creates_schema() -> BerthResult<()> {
        let temp_dir = tempdir()?;
        let db_path = temp_dir.path().join("test.db");

        init_db(&db_path, &APP_DB_MIGRATOR).await?;

        let pool = get_db_pool(&db_path).await?;
        let tables = sqlx::query("SELECT name FROM sqlite_master WHERE type='table'")
            .fetch_all(&pool)
            .await?;

        let table_names: Vec<String> = tables
            .iter()
            .map(|row| row.get::<String, _>("name"))
            .collect();

        assert!(table_names.contains(&"stores".to_string()));
        assert!(table_names.contains(&"apps".to_string()));
        assert!(table_names.contains(&"installed_apps".to_string()));

        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn test_upsert_installed_app_is_idempotent_by_container_name() -> BerthResult<()> {
        let temp_dir = tempdir()?;
        let pool = init_db(temp_dir.path().join("test.db"), &APP_DB_MIGRATOR).await?;

        let mut app = InstalledApp::new(
            "nextcloud",
            "nextcloud-web-1",
            vec!["nextcloud-web-1".to_string(), "nextcloud-db-1".to_string()],
            "/installs/nextcloud/docker-compose.yml",
        );
        app.web_ui_port = Some(8080);

        let first_id = upsert_installed_app(&pool, &app).await?;

        app.version = Some("2.0".to_string());
        let second_id = upsert_installed_app(&pool, &app).await?;
        assert_eq!(first_id, second_id);

        let all = list_installed_apps(&pool).await?;
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].version.as_deref(), Some("2.0"));
        assert_eq!(all[0].web_ui_port, Some(8080));
        assert_eq!(all[0].container_names.len(), 2);

        Ok(())
    }

    #[tokio::test]
    async fn test_install_config_round_trips_through_json_column() -> BerthResult<()> {
        let temp_dir = tempdir()?;
        let pool = init_db(temp_dir.path().join("test.db"), &APP_DB_MIGRATOR).await?;

        let config = InstallConfig::builder()
            .ports(vec!["8080:80".parse().unwrap()])
            .web_ui_port(8080)
            .build();

        let mut app = InstalledApp::new("app", "app-web-1", vec!["app-web-1".into()], "/x.yml");
        app.install_config = Some(config.clone());
        upsert_installed_app(&pool, &app).await?;

        let loaded = get_installed_app_by_container_name(&pool, "app-web-1")
            .await?
            .unwrap();
        assert_eq!(loaded.install_config, Some(config));

        Ok(())
    }

    #[tokio::test]
    async fn test_corrupt_install_config_is_discarded_not_fatal() -> BerthResult<()> {
        let temp_dir = tempdir()?;
        let pool = init_db(temp_dir.path().join("test.db"), &APP_DB_MIGRATOR).await?;

        sqlx::query(
            r#"
            INSERT INTO installed_apps (app_id, container_name, compose_path, install_config_json)
            VALUES ('bad', 'bad-web-1', '/x.yml', '{not json')
            "#,
        )
        .execute(&pool)
        .await?;

        let loaded = get_installed_app_by_container_name(&pool, "bad-web-1")
            .await?
            .unwrap();
        assert!(loaded.install_config.is_none());
        assert_eq!(loaded.container_names, vec!["bad-web-1".to_string()]);

        Ok(())
    }

    #[tokio::test]
    async fn test_delete_by_candidates_removes_all_matches() -> BerthResult<()> {
        let temp_dir = tempdir()?;
        let pool = init_db(temp_dir.path().join("test.db"), &APP_DB_MIGRATOR).await?;

        let web = InstalledApp::new("app", "app-web-1", vec!["app-web-1".into()], "/x.yml");
        let db = InstalledApp::new("app", "app-db-1", vec!["app-db-1".into()], "/x.yml");
        upsert_installed_app(&pool, &web).await?;
        upsert_installed_app(&pool, &db).await?;

        let deleted = delete_installed_apps_by_container_names(
            &pool,
            &["app-web-1".to_string(), "app-db-1".to_string(), "ghost".to_string()],
        )
        .await?;

        assert_eq!(deleted, 2);
        assert!(list_installed_apps(&pool).await?.is_empty());

        Ok(())
    }

    #[tokio::test]
    async fn test_catalog_store_and_app_round_trip() -> BerthResult<()> {
        let temp_dir = tempdir()?;
        let pool = init_db(temp_dir.path().join("test.db"), &APP_DB_MIGRATOR).await?;

        let store_id = upsert_store(&pool, "community", Some("https://example.test/feed")).await?;
        assert!(get_store(&pool, "community").await?.is_some());

        let entry = CatalogApp {
            store_id: Some(store_id),
            slug: "nextcloud".to_string(),
            compose_path: Some("/stores/community/nextcloud/docker-compose.yml".to_string()),
            ..Default::default()
        };

        let first = upsert_catalog_app(&pool, &entry).await?;
        let second = upsert_catalog_app(&pool, &entry).await?;
        assert_eq!(first, second);

        let found = get_catalog_app(&pool, "nextcloud").await?.unwrap();
        assert_eq!(found.store_id, Some(store_id));

        Ok(())
    }
}
