use std::{collections::VecDeque, fmt, process::Output};

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// How many trailing output lines of each stream a diagnostic keeps.
pub const MAX_TAIL_LINES: usize = 40;

/// Hard cap on each captured stream tail, in characters.
pub const MAX_TAIL_CHARS: usize = 2000;

/// Hard cap on the rendered command line, in characters.
pub const MAX_COMMAND_CHARS: usize = 400;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Structured detail about a failed engine invocation.
///
/// Everything here is size-capped before being stored, so diagnostics are safe
/// to log and to embed in errors regardless of how chatty the engine was.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandDiagnostic {
    /// The rendered command line, truncated.
    pub command: String,

    /// The exit code, when the process ran and exited.
    pub exit_code: Option<i32>,

    /// The signal that terminated the process, when one did.
    pub signal: Option<i32>,

    /// The last lines of stdout, capped.
    pub stdout_tail: String,

    /// The last lines of stderr, capped.
    pub stderr_tail: String,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl CommandDiagnostic {
    /// Builds a diagnostic from a fully captured process output.
    pub fn from_output(command: &str, output: &Output) -> Self {
        Self {
            command: truncate_chars(command, MAX_COMMAND_CHARS),
            exit_code: output.status.code(),
            signal: status_signal(&output.status),
            stdout_tail: tail(&String::from_utf8_lossy(&output.stdout)),
            stderr_tail: tail(&String::from_utf8_lossy(&output.stderr)),
        }
    }

    /// Builds a diagnostic for a process that could not be spawned at all.
    pub fn from_spawn_error(command: &str, error: &std::io::Error) -> Self {
        Self {
            command: truncate_chars(command, MAX_COMMAND_CHARS),
            exit_code: None,
            signal: None,
            stdout_tail: String::new(),
            stderr_tail: truncate_chars(&format!("failed to spawn: {}", error), MAX_TAIL_CHARS),
        }
    }

    /// Builds a diagnostic from line buffers collected while streaming.
    pub fn from_streams(
        command: &str,
        status: std::process::ExitStatus,
        stdout_lines: &VecDeque<String>,
        stderr_lines: &VecDeque<String>,
    ) -> Self {
        Self {
            command: truncate_chars(command, MAX_COMMAND_CHARS),
            exit_code: status.code(),
            signal: status_signal(&status),
            stdout_tail: truncate_chars(
                &stdout_lines.iter().cloned().collect::<Vec<_>>().join("\n"),
                MAX_TAIL_CHARS,
            ),
            stderr_tail: truncate_chars(
                &stderr_lines.iter().cloned().collect::<Vec<_>>().join("\n"),
                MAX_TAIL_CHARS,
            ),
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Pushes a line into a bounded tail buffer, evicting the oldest line.
pub fn push_tail_line(buffer: &mut VecDeque<String>, line: &str) {
    if buffer.len() == MAX_TAIL_LINES {
        buffer.pop_front();
    }
    buffer.push_back(line.to_string());
}

/// Returns the last [`MAX_TAIL_LINES`] lines of `text`, capped at
/// [`MAX_TAIL_CHARS`] characters.
pub fn tail(text: &str) -> String {
    let lines: Vec<&str> = text.lines().collect();
    let start = lines.len().saturating_sub(MAX_TAIL_LINES);
    truncate_chars(&lines[start..].join("\n"), MAX_TAIL_CHARS)
}

fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    text.chars().take(max).collect()
}

fn status_signal(status: &std::process::ExitStatus) -> Option<i32> {
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        status.signal()
    }
    #[cfg(not(unix))]
    {
        let _ = status;
        None
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl fmt::Display for CommandDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "`{}`", self.command)?;

        match (self.exit_code, self.signal) {
            (Some(code), _) => write!(f, " exited with code {}", code)?,
            (None, Some(signal)) => write!(f, " terminated by signal {}", signal)?,
            (None, None) => write!(f, " did not run")?,
        }

        if let Some(line) = self.stderr_tail.lines().last() {
            if !line.trim().is_empty() {
                write!(f, ": {}", line.trim())?;
            }
        }

        Ok(())
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tail_caps_lines_and_chars() {
        let many_lines: String = (0..100).map(|i| format!("line {}\n", i)).collect();
        let tailed = tail(&many_lines);

        assert_eq!(tailed.lines().count(), MAX_TAIL_LINES);
        assert!(tailed.starts_with("line 60"));
        assert!(tailed.ends_with("line 99"));

        let huge_line = "x".repeat(10_000);
        assert_eq!(tail(&huge_line).chars().count(), MAX_TAIL_CHARS);
    }

    #[test]
    fn test_push_tail_line_evicts_oldest() {
        let mut buffer = VecDeque::new();
        for i in 0..(MAX_TAIL_LINES + 5) {
            push_tail_line(&mut buffer, &format!("line {}", i));
        }

        assert_eq!(buffer.len(), MAX_TAIL_LINES);
        assert_eq!(buffer.front().unwrap(), "line 5");
    }

    #[test]
    fn test_display_summarizes_failure() {
        let diagnostic = CommandDiagnostic {
            command: "docker compose pull".to_string(),
            exit_code: Some(18),
            signal: None,
            stdout_tail: String::new(),
            stderr_tail: "manifest unknown".to_string(),
        };

        let rendered = diagnostic.to_string();
        assert!(rendered.contains("docker compose pull"));
        assert!(rendered.contains("code 18"));
        assert!(rendered.contains("manifest unknown"));
    }
}
