//! Container engine CLI adapter.
//!
//! berth never links a container runtime; it drives an external
//! compose-capable CLI (`docker`, `podman`, or compatible). This module is
//! the only place subprocesses are spawned, so command rendering, output
//! capture, and diagnostic size caps live here.

use std::process::Stdio;

use tokio::process::Command;

use crate::{BerthError, BerthResult};

mod compose;
mod container;
mod diagnostic;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub use compose::*;
pub use container::*;
pub use diagnostic::*;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Handle to the external container engine CLI.
#[derive(Debug, Clone)]
pub struct Engine {
    bin: String,
}

/// The engine verb used for plain lifecycle operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleVerb {
    /// Start stopped containers.
    Start,
    /// Stop running containers.
    Stop,
    /// Restart containers.
    Restart,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl Engine {
    /// Creates a handle for the given engine binary.
    pub fn new(bin: impl Into<String>) -> Self {
        Self { bin: bin.into() }
    }

    /// The engine binary this handle drives.
    pub fn bin(&self) -> &str {
        &self.bin
    }

    /// Builds a command for the given argument list.
    pub(super) fn command(&self, args: &[String]) -> Command {
        let mut command = Command::new(&self.bin);
        command.args(args).stdin(Stdio::null());
        command
    }

    /// Renders a command line for diagnostics.
    pub(super) fn render(&self, args: &[String]) -> String {
        let mut rendered = self.bin.clone();
        for arg in args {
            rendered.push(' ');
            rendered.push_str(arg);
        }
        rendered
    }

    /// Runs a command to completion with captured output, mapping spawn
    /// failures and non-zero exits into stage-tagged engine errors.
    pub(super) async fn run_captured(
        &self,
        args: Vec<String>,
        envs: &std::collections::BTreeMap<String, String>,
        stage: &'static str,
    ) -> BerthResult<std::process::Output> {
        let command_line = self.render(&args);
        let output = self
            .command(&args)
            .envs(envs)
            .output()
            .await
            .map_err(|e| BerthError::Engine {
                stage,
                diagnostic: CommandDiagnostic::from_spawn_error(&command_line, &e),
            })?;

        if !output.status.success() {
            return Err(BerthError::Engine {
                stage,
                diagnostic: CommandDiagnostic::from_output(&command_line, &output),
            });
        }

        Ok(output)
    }
}

impl LifecycleVerb {
    /// The engine subcommand name.
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleVerb::Start => "start",
            LifecycleVerb::Stop => "stop",
            LifecycleVerb::Restart => "restart",
        }
    }
}
