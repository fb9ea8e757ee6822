use std::collections::BTreeMap;

use super::{Engine, LifecycleVerb};
use crate::BerthResult;

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// The label the engine stamps on containers with their compose project.
pub const COMPOSE_PROJECT_LABEL: &str = "com.docker.compose.project";

/// The label the engine stamps on containers with their compose service.
pub const COMPOSE_SERVICE_LABEL: &str = "com.docker.compose.service";

/// The `ps` format used for inventory queries: tab-separated name, state,
/// labels, ports.
const PS_FORMAT: &str = "{{.Names}}\t{{.State}}\t{{.Labels}}\t{{.Ports}}";

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// One row of engine `ps` output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PsEntry {
    /// The container name.
    pub name: String,

    /// The raw engine state (`running`, `exited`, `created`, ...).
    pub state: String,

    /// Container labels.
    pub labels: BTreeMap<String, String>,

    /// The raw port mapping column, e.g. `0.0.0.0:8080->80/tcp`.
    pub ports: String,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl PsEntry {
    /// The compose project this container belongs to, when labeled.
    pub fn compose_project(&self) -> Option<&str> {
        self.labels.get(COMPOSE_PROJECT_LABEL).map(String::as_str)
    }

    /// The compose service this container runs, when labeled.
    pub fn compose_service(&self) -> Option<&str> {
        self.labels.get(COMPOSE_SERVICE_LABEL).map(String::as_str)
    }

    /// Whether the engine reports the container as running.
    pub fn is_running(&self) -> bool {
        self.state.eq_ignore_ascii_case("running")
    }
}

impl Engine {
    /// Force-removes a single container. Absence of the container is not an
    /// error worth surfacing; callers treat this as idempotent teardown.
    pub async fn force_remove(&self, name: &str) -> BerthResult<()> {
        let args = vec!["rm".to_string(), "-f".to_string(), name.to_string()];
        self.run_captured(args, &BTreeMap::new(), "container:rm")
            .await?;
        Ok(())
    }

    /// Runs a lifecycle verb on a single container (the fallback path for
    /// legacy containers with no resolvable manifest).
    pub async fn container_lifecycle(&self, name: &str, verb: LifecycleVerb) -> BerthResult<()> {
        let args = vec![verb.as_str().to_string(), name.to_string()];
        self.run_captured(args, &BTreeMap::new(), "container:lifecycle")
            .await?;
        Ok(())
    }

    /// Whether a container currently reports a running state.
    pub async fn is_running(&self, name: &str) -> BerthResult<bool> {
        let args = vec![
            "inspect".to_string(),
            "-f".to_string(),
            "{{.State.Running}}".to_string(),
            name.to_string(),
        ];
        let output = self
            .run_captured(args, &BTreeMap::new(), "container:inspect")
            .await?;

        Ok(String::from_utf8_lossy(&output.stdout).trim() == "true")
    }

    /// Fetches the last `lines` log lines of a container.
    pub async fn logs(&self, name: &str, lines: usize) -> BerthResult<String> {
        let args = vec![
            "logs".to_string(),
            "--tail".to_string(),
            lines.to_string(),
            name.to_string(),
        ];
        let output = self
            .run_captured(args, &BTreeMap::new(), "container:logs")
            .await?;

        // Engines split log output across both streams depending on the
        // container's own stream usage.
        let mut logs = String::from_utf8_lossy(&output.stdout).into_owned();
        logs.push_str(&String::from_utf8_lossy(&output.stderr));
        Ok(logs)
    }

    /// Lists the container names belonging to a compose project, including
    /// stopped ones.
    pub async fn project_container_names(&self, project: &str) -> BerthResult<Vec<String>> {
        let args = vec![
            "ps".to_string(),
            "-a".to_string(),
            "--filter".to_string(),
            format!("label={}={}", COMPOSE_PROJECT_LABEL, project),
            "--format".to_string(),
            "{{.Names}}".to_string(),
        ];
        let output = self
            .run_captured(args, &BTreeMap::new(), "container:ps")
            .await?;

        Ok(String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(String::from)
            .collect())
    }

    /// Lists all engine-visible containers with state, labels, and ports.
    pub async fn list_containers(&self) -> BerthResult<Vec<PsEntry>> {
        let args = vec![
            "ps".to_string(),
            "-a".to_string(),
            "--no-trunc".to_string(),
            "--format".to_string(),
            PS_FORMAT.to_string(),
        ];
        let output = self
            .run_captured(args, &BTreeMap::new(), "container:ps")
            .await?;

        Ok(String::from_utf8_lossy(&output.stdout)
            .lines()
            .filter_map(parse_ps_line)
            .collect())
    }
}

//--------------------------------------------------------------------------------------------------
// Functions: Helpers
//--------------------------------------------------------------------------------------------------

/// Parses one tab-separated `ps` row into a [`PsEntry`].
fn parse_ps_line(line: &str) -> Option<PsEntry> {
    let mut columns = line.split('\t');
    let name = columns.next()?.trim();
    if name.is_empty() {
        return None;
    }

    let state = columns.next().unwrap_or_default().trim().to_string();
    let labels = parse_labels(columns.next().unwrap_or_default());
    let ports = columns.next().unwrap_or_default().trim().to_string();

    Some(PsEntry {
        name: name.to_string(),
        state,
        labels,
        ports,
    })
}

/// Parses the engine's comma-separated `key=value` label column.
fn parse_labels(column: &str) -> BTreeMap<String, String> {
    column
        .split(',')
        .filter_map(|pair| {
            let (key, value) = pair.split_once('=')?;
            let key = key.trim();
            if key.is_empty() {
                return None;
            }
            Some((key.to_string(), value.trim().to_string()))
        })
        .collect()
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ps_line() {
        let line = "nextcloud-web-1\trunning\tcom.docker.compose.project=nextcloud,com.docker.compose.service=web\t0.0.0.0:8080->80/tcp";
        let entry = parse_ps_line(line).unwrap();

        assert_eq!(entry.name, "nextcloud-web-1");
        assert!(entry.is_running());
        assert_eq!(entry.compose_project(), Some("nextcloud"));
        assert_eq!(entry.compose_service(), Some("web"));
        assert_eq!(entry.ports, "0.0.0.0:8080->80/tcp");
    }

    #[test]
    fn test_parse_ps_line_without_labels() {
        let entry = parse_ps_line("legacy\texited\t\t").unwrap();

        assert_eq!(entry.name, "legacy");
        assert!(!entry.is_running());
        assert!(entry.compose_project().is_none());
        assert!(entry.labels.is_empty());
    }

    #[test]
    fn test_parse_ps_line_rejects_blank() {
        assert!(parse_ps_line("").is_none());
        assert!(parse_ps_line("\t\t\t").is_none());
    }
}
