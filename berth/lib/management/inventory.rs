//! Container inventory.
//!
//! The engine is the source of truth for what is actually running; the
//! database is the source of truth for what was installed. A crash between
//! "containers started" and "record persisted" is possible by design, so
//! every query reconciles live engine state against persisted records instead
//! of trusting either side alone.

use std::{collections::BTreeMap, fmt};

use crate::{
    engine::PsEntry,
    management::{db, AppManager},
    BerthResult,
};

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// Name fragments that mark a container as a helper service (database, cache,
/// proxy, tor, docker-in-docker) rather than the app itself. Matched against
/// `-`/`_`-separated name segments.
pub const HELPER_NAME_PATTERNS: [&str; 15] = [
    "db",
    "database",
    "mysql",
    "mariadb",
    "postgres",
    "postgresql",
    "mongo",
    "redis",
    "memcached",
    "cache",
    "proxy",
    "nginx",
    "traefik",
    "tor",
    "dind",
];

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Aggregated status of a multi-container app.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppStatus {
    /// At least one member container is running.
    Running,
    /// Every member container is stopped.
    Stopped,
    /// No member runs, but not all are cleanly stopped (restarting, paused).
    Degraded,
    /// The app is not visible to the engine at all.
    Unknown,
}

/// One app as the inventory sees it: a compose project (or a lone container)
/// reduced to a primary container, an aggregate status, and a reachable port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppSummary {
    /// The compose project name, or the container name when unlabeled.
    pub project: String,

    /// The container chosen to represent the app.
    pub primary_container: String,

    /// Every member container name.
    pub container_names: Vec<String>,

    /// Aggregate status.
    pub status: AppStatus,

    /// The externally reachable port, when one resolves.
    pub web_ui_port: Option<u16>,

    /// Whether a persisted install record backs this app.
    pub managed: bool,
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Whether a container or service name looks like a helper service.
pub fn is_helper_name(name: &str) -> bool {
    name.to_ascii_lowercase()
        .split(['-', '_', '.'])
        .any(|segment| HELPER_NAME_PATTERNS.contains(&segment))
}

/// Picks the primary container out of a group: the first whose name does not
/// match the helper patterns, else simply the first.
pub fn select_primary(names: &[String]) -> Option<&String> {
    names
        .iter()
        .find(|name| !is_helper_name(name))
        .or_else(|| names.first())
}

/// Parses the engine's port column (`0.0.0.0:8080->80/tcp, :::8080->80/tcp`)
/// into `(host_port, protocol)` pairs.
pub fn parse_host_ports(ports: &str) -> Vec<(u16, String)> {
    ports
        .split(',')
        .filter_map(|segment| {
            let segment = segment.trim();
            let (mapping, target) = segment.split_once("->")?;
            let host_port = mapping.rsplit_once(':')?.1.parse::<u16>().ok()?;
            let protocol = target.rsplit_once('/').map(|(_, p)| p).unwrap_or("tcp");
            Some((host_port, protocol.to_string()))
        })
        .collect()
}

/// Resolves the reachable port: a persisted user-configured port wins, then
/// the lowest mapped TCP port, then any mapped port.
pub fn choose_port(persisted: Option<u16>, mapped: &[(u16, String)]) -> Option<u16> {
    persisted
        .or_else(|| {
            mapped
                .iter()
                .filter(|(_, protocol)| protocol == "tcp")
                .map(|(port, _)| *port)
                .min()
        })
        .or_else(|| mapped.first().map(|(port, _)| *port))
}

//--------------------------------------------------------------------------------------------------
// Functions: Queries
//--------------------------------------------------------------------------------------------------

/// Lists every app the engine or the store knows about.
pub(super) async fn list_apps(manager: &AppManager) -> BerthResult<Vec<AppSummary>> {
    let entries = manager.engine().list_containers().await?;
    let groups = group_by_project(&entries);

    let mut summaries = Vec::new();
    let mut seen_containers = Vec::new();

    for (project, members) in &groups {
        let names: Vec<String> = members.iter().map(|entry| entry.name.clone()).collect();
        seen_containers.extend(names.clone());

        // Prefer a persisted record's primary; fall back to name heuristics.
        let mut record = None;
        for name in &names {
            if let Some(found) =
                db::get_installed_app_by_container_name(manager.pool(), name).await?
            {
                record = Some(found);
                break;
            }
        }

        let primary = record
            .as_ref()
            .map(|r| r.container_name.clone())
            .or_else(|| select_primary(&names).cloned())
            .unwrap_or_else(|| project.clone());

        let mapped: Vec<(u16, String)> = members
            .iter()
            .flat_map(|entry| parse_host_ports(&entry.ports))
            .collect();

        summaries.push(AppSummary {
            project: project.clone(),
            primary_container: primary,
            container_names: names,
            status: aggregate_status(members),
            web_ui_port: choose_port(record.as_ref().and_then(|r| r.web_ui_port), &mapped),
            managed: record.is_some(),
        });
    }

    // Records with no live containers still belong in the listing; the store
    // may be ahead of the engine (or the engine lost the containers).
    for record in db::list_installed_apps(manager.pool()).await? {
        if seen_containers.contains(&record.container_name) {
            continue;
        }
        summaries.push(AppSummary {
            project: record.app_id.clone(),
            primary_container: record.container_name.clone(),
            container_names: record.container_names.clone(),
            status: AppStatus::Unknown,
            web_ui_port: record.web_ui_port,
            managed: true,
        });
    }

    Ok(summaries)
}

/// Aggregated live status for one app.
pub(super) async fn status(manager: &AppManager, app_id: &str) -> BerthResult<AppStatus> {
    crate::utils::validate_app_id(app_id)?;

    let entries = manager.engine().list_containers().await?;

    let mut members: Vec<&PsEntry> = entries
        .iter()
        .filter(|entry| entry.compose_project() == Some(app_id))
        .collect();

    // Legacy/unmanaged installs may predate compose labels; fall back to the
    // recorded container names.
    if members.is_empty() {
        let records = db::get_installed_apps_by_app_id(manager.pool(), app_id).await?;
        let known: Vec<&String> = records
            .iter()
            .flat_map(|record| record.container_names.iter())
            .collect();
        members = entries
            .iter()
            .filter(|entry| known.iter().any(|name| *name == &entry.name))
            .collect();
    }

    let owned: Vec<PsEntry> = members.into_iter().cloned().collect();
    Ok(aggregate_status(&owned))
}

/// The URL of the app's web UI, when a reachable port resolves.
pub(super) async fn web_ui_url(manager: &AppManager, app_id: &str) -> BerthResult<Option<String>> {
    crate::utils::validate_app_id(app_id)?;

    let record = db::get_installed_apps_by_app_id(manager.pool(), app_id)
        .await?
        .into_iter()
        .next();

    let persisted = record.as_ref().and_then(|r| r.web_ui_port);

    let mapped: Vec<(u16, String)> = match manager.engine().list_containers().await {
        Ok(entries) => entries
            .iter()
            .filter(|entry| entry.compose_project() == Some(app_id))
            .flat_map(|entry| parse_host_ports(&entry.ports))
            .collect(),
        Err(e) => {
            tracing::warn!(app_id, "engine unavailable while resolving web UI: {}", e);
            Vec::new()
        }
    };

    let Some(port) = choose_port(persisted, &mapped) else {
        return Ok(None);
    };

    let hostname = manager
        .settings()
        .get_hostname()
        .clone()
        .unwrap_or_else(crate::utils::get_device_hostname);

    Ok(Some(format!("http://{}:{}", hostname, port)))
}

//--------------------------------------------------------------------------------------------------
// Functions: Helpers
//--------------------------------------------------------------------------------------------------

/// Groups containers by compose project, falling back to the container name
/// for unlabeled ones. Helper-named containers inside a labeled project stay
/// members of that project, so they never surface as standalone apps.
fn group_by_project(entries: &[PsEntry]) -> BTreeMap<String, Vec<PsEntry>> {
    let mut groups: BTreeMap<String, Vec<PsEntry>> = BTreeMap::new();

    for entry in entries {
        let key = entry
            .compose_project()
            .unwrap_or(entry.name.as_str())
            .to_string();
        groups.entry(key).or_default().push(entry.clone());
    }

    groups
}

fn aggregate_status(members: &[PsEntry]) -> AppStatus {
    if members.is_empty() {
        return AppStatus::Unknown;
    }

    if members.iter().any(PsEntry::is_running) {
        return AppStatus::Running;
    }

    let all_stopped = members.iter().all(|entry| {
        matches!(
            entry.state.to_ascii_lowercase().as_str(),
            "exited" | "created" | "dead"
        )
    });

    if all_stopped {
        AppStatus::Stopped
    } else {
        AppStatus::Degraded
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl fmt::Display for AppStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered = match self {
            AppStatus::Running => "running",
            AppStatus::Stopped => "stopped",
            AppStatus::Degraded => "degraded",
            AppStatus::Unknown => "unknown",
        };
        write!(f, "{}", rendered)
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str, state: &str, project: Option<&str>, ports: &str) -> PsEntry {
        let mut labels = BTreeMap::new();
        if let Some(project) = project {
            labels.insert(
                crate::engine::COMPOSE_PROJECT_LABEL.to_string(),
                project.to_string(),
            );
        }
        PsEntry {
            name: name.to_string(),
            state: state.to_string(),
            labels,
            ports: ports.to_string(),
        }
    }

    #[test]
    fn test_helper_names_match_on_segments() {
        assert!(is_helper_name("app-db-1"));
        assert!(is_helper_name("app-redis-1"));
        assert!(is_helper_name("nextcloud_postgres_1"));
        assert!(is_helper_name("app-dind-1"));

        assert!(!is_helper_name("app-web-1"));
        // "db" must match whole segments, not substrings.
        assert!(!is_helper_name("app-dashboard-1"));
    }

    #[test]
    fn test_select_primary_prefers_non_helper() {
        let names = vec!["app-db-1".to_string(), "app-web-1".to_string()];
        assert_eq!(select_primary(&names).unwrap(), "app-web-1");

        // All helpers: fall back to the first.
        let helpers = vec!["app-db-1".to_string(), "app-redis-1".to_string()];
        assert_eq!(select_primary(&helpers).unwrap(), "app-db-1");

        assert!(select_primary(&[]).is_none());
    }

    #[test]
    fn test_parse_host_ports() {
        let mapped = parse_host_ports("0.0.0.0:8080->80/tcp, :::8080->80/tcp, 0.0.0.0:514->514/udp");
        assert!(mapped.contains(&(8080, "tcp".to_string())));
        assert!(mapped.contains(&(514, "udp".to_string())));

        // Unpublished container ports produce nothing.
        assert!(parse_host_ports("5432/tcp").is_empty());
        assert!(parse_host_ports("").is_empty());
    }

    #[test]
    fn test_choose_port_preference_order() {
        let mapped = vec![(9000, "udp".to_string()), (8443, "tcp".to_string()), (8080, "tcp".to_string())];

        assert_eq!(choose_port(Some(3000), &mapped), Some(3000));
        assert_eq!(choose_port(None, &mapped), Some(8080));

        let udp_only = vec![(9000, "udp".to_string())];
        assert_eq!(choose_port(None, &udp_only), Some(9000));

        assert_eq!(choose_port(None, &[]), None);
    }

    #[test]
    fn test_aggregate_status() {
        let running = vec![
            entry("a-db-1", "exited", Some("a"), ""),
            entry("a-web-1", "running", Some("a"), ""),
        ];
        assert_eq!(aggregate_status(&running), AppStatus::Running);

        let stopped = vec![
            entry("a-db-1", "exited", Some("a"), ""),
            entry("a-web-1", "created", Some("a"), ""),
        ];
        assert_eq!(aggregate_status(&stopped), AppStatus::Stopped);

        let degraded = vec![
            entry("a-db-1", "exited", Some("a"), ""),
            entry("a-web-1", "restarting", Some("a"), ""),
        ];
        assert_eq!(aggregate_status(&degraded), AppStatus::Degraded);

        assert_eq!(aggregate_status(&[]), AppStatus::Unknown);
    }

    #[test]
    fn test_grouping_keeps_helpers_inside_their_project() {
        let entries = vec![
            entry("a-web-1", "running", Some("a"), ""),
            entry("a-db-1", "running", Some("a"), ""),
            entry("standalone", "running", None, ""),
        ];

        let groups = group_by_project(&entries);

        assert_eq!(groups.len(), 2);
        assert_eq!(groups["a"].len(), 2);
        assert_eq!(groups["standalone"].len(), 1);
    }
}
