use std::{
    collections::{BTreeMap, VecDeque},
    path::Path,
    process::Stdio,
};

use tokio::io::{AsyncBufReadExt, BufReader};

use crate::{
    progress::StreamSource,
    BerthError, BerthResult,
};

use super::{diagnostic, CommandDiagnostic, Engine, LifecycleVerb};

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// The compose subcommand of the engine CLI.
const COMPOSE_SUBCOMMAND: &str = "compose";

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl Engine {
    /// Pulls the images of a compose project, streaming interleaved
    /// stdout/stderr lines to `on_line` as they arrive.
    ///
    /// The subprocess runs to completion; there is no cancellation. Spawn
    /// failure or a non-zero exit becomes a `compose:pull` error carrying the
    /// last lines of each stream.
    pub async fn compose_pull<F>(
        &self,
        project: &str,
        manifest: &Path,
        envs: &BTreeMap<String, String>,
        mut on_line: F,
    ) -> BerthResult<()>
    where
        F: FnMut(StreamSource, &str) + Send,
    {
        let args = self.compose_args(project, Some(manifest), &["pull"]);
        let command_line = self.render(&args);

        let mut child = self
            .command(&args)
            .envs(envs)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| BerthError::Engine {
                stage: "compose:pull",
                diagnostic: CommandDiagnostic::from_spawn_error(&command_line, &e),
            })?;

        let stdout = child.stdout.take().ok_or_else(|| {
            BerthError::custom(anyhow::anyhow!("engine stdout was not piped"))
        })?;
        let stderr = child.stderr.take().ok_or_else(|| {
            BerthError::custom(anyhow::anyhow!("engine stderr was not piped"))
        })?;

        let mut stdout_lines = BufReader::new(stdout).lines();
        let mut stderr_lines = BufReader::new(stderr).lines();

        let mut stdout_tail = VecDeque::new();
        let mut stderr_tail = VecDeque::new();
        let (mut stdout_done, mut stderr_done) = (false, false);

        while !(stdout_done && stderr_done) {
            tokio::select! {
                line = stdout_lines.next_line(), if !stdout_done => match line? {
                    Some(line) => {
                        diagnostic::push_tail_line(&mut stdout_tail, &line);
                        on_line(StreamSource::Stdout, &line);
                    }
                    None => stdout_done = true,
                },
                line = stderr_lines.next_line(), if !stderr_done => match line? {
                    Some(line) => {
                        diagnostic::push_tail_line(&mut stderr_tail, &line);
                        on_line(StreamSource::Stderr, &line);
                    }
                    None => stderr_done = true,
                },
            }
        }

        let status = child.wait().await?;
        if !status.success() {
            return Err(BerthError::Engine {
                stage: "compose:pull",
                diagnostic: CommandDiagnostic::from_streams(
                    &command_line,
                    status,
                    &stdout_tail,
                    &stderr_tail,
                ),
            });
        }

        Ok(())
    }

    /// Brings a compose project up detached. Stderr status chatter
    /// (creating/starting/pulling lines) is expected there and is not treated
    /// as a warning; only the exit status decides success.
    pub async fn compose_up(
        &self,
        project: &str,
        manifest: &Path,
        envs: &BTreeMap<String, String>,
    ) -> BerthResult<()> {
        let args = self.compose_args(project, Some(manifest), &["up", "-d"]);
        self.run_captured(args, envs, "compose:up").await?;
        Ok(())
    }

    /// Tears a compose project down, removing orphans. Callers treat this as
    /// best-effort; the `compose:down` error exists for logging, not control
    /// flow.
    pub async fn compose_down(&self, project: &str, manifest: Option<&Path>) -> BerthResult<()> {
        let args = self.compose_args(project, manifest, &["down", "--remove-orphans"]);
        self.run_captured(args, &BTreeMap::new(), "compose:down")
            .await?;
        Ok(())
    }

    /// Runs a plain lifecycle verb (`start`/`stop`/`restart`) on a project.
    pub async fn compose_lifecycle(
        &self,
        project: &str,
        manifest: &Path,
        verb: LifecycleVerb,
    ) -> BerthResult<()> {
        let args = self.compose_args(project, Some(manifest), &[verb.as_str()]);
        self.run_captured(args, &BTreeMap::new(), "compose:lifecycle")
            .await?;
        Ok(())
    }

    fn compose_args(&self, project: &str, manifest: Option<&Path>, trailing: &[&str]) -> Vec<String> {
        let mut args = vec![COMPOSE_SUBCOMMAND.to_string()];

        if let Some(manifest) = manifest {
            args.push("-f".to_string());
            args.push(manifest.display().to_string());
        }

        args.push("-p".to_string());
        args.push(project.to_string());

        args.extend(trailing.iter().map(|s| s.to_string()));
        args
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_compose_args_shape() {
        let engine = Engine::new("docker");
        let manifest = PathBuf::from("/installs/app/docker-compose.yml");

        let args = engine.compose_args("app", Some(&manifest), &["up", "-d"]);
        assert_eq!(
            args,
            vec![
                "compose",
                "-f",
                "/installs/app/docker-compose.yml",
                "-p",
                "app",
                "up",
                "-d"
            ]
        );

        let args = engine.compose_args("app", None, &["down", "--remove-orphans"]);
        assert_eq!(args, vec!["compose", "-p", "app", "down", "--remove-orphans"]);
    }

    #[test]
    fn test_render_includes_binary() {
        let engine = Engine::new("podman");
        let args = engine.compose_args("app", None, &["pull"]);
        assert_eq!(engine.render(&args), "podman compose -p app pull");
    }
}
