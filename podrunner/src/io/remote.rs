//! Command transport: run one command on one node.
//!
//! The [`RemoteExec`] trait decouples step orchestration from how a command
//! reaches a node. [`KubectlExec`] goes through `kubectl exec`; [`LocalExec`]
//! runs a local shell per node for dry runs. Tests use scripted transports
//! that return predetermined outcomes without spawning processes.

use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, instrument};

use crate::io::config::{KubectlConfig, LocalConfig};
use crate::io::pool::NodeHandle;
use crate::io::process::{CommandOutput, run_command_with_timeout};

/// Environment variable carrying the node handle into [`LocalExec`] commands.
pub const LOCAL_NODE_VAR: &str = "PODRUNNER_NODE";

/// What to run on a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// Command from the step definition.
    pub command: String,
    /// Previously captured variables rendered as `A="1" && ` (may be empty).
    pub env_prefix: String,
    /// `None` never times out.
    pub timeout: Option<Duration>,
}

impl Invocation {
    /// Full script handed to the node's shell.
    pub fn script(&self) -> String {
        format!("{}{}", self.env_prefix, self.command)
    }
}

/// Result of one invocation on one node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvocationOutcome {
    /// The command finished before its timeout.
    Completed {
        lines: Vec<String>,
        stderr: String,
        exit_code: Option<i32>,
    },
    /// The command was killed by its timeout; any output is discarded.
    TimedOut,
}

impl InvocationOutcome {
    pub fn completed(lines: Vec<String>) -> Self {
        InvocationOutcome::Completed {
            lines,
            stderr: String::new(),
            exit_code: Some(0),
        }
    }

    fn from_output(output: &CommandOutput) -> Self {
        if output.timed_out {
            return InvocationOutcome::TimedOut;
        }
        InvocationOutcome::Completed {
            lines: split_lines(&output.stdout_lossy()),
            stderr: output.stderr_lossy(),
            exit_code: output.status.code(),
        }
    }
}

/// Abstraction over command transports.
///
/// Implementations are shared by the per-node worker threads of a step.
pub trait RemoteExec: Sync {
    /// Run `invocation` on `node`. `Err` means the transport itself failed
    /// (e.g. the client binary could not be spawned), not the command.
    fn run(&self, node: &NodeHandle, invocation: &Invocation) -> Result<InvocationOutcome>;
}

/// Split stdout into lines: `\n`-separated, trailing empty line dropped,
/// trailing `\r` removed from each line.
pub fn split_lines(stdout: &str) -> Vec<String> {
    let mut lines: Vec<String> = stdout
        .split('\n')
        .map(|line| line.strip_suffix('\r').unwrap_or(line).to_string())
        .collect();
    if lines.last().is_some_and(|line| line.is_empty()) {
        lines.pop();
    }
    lines
}

/// Transport that execs into pods with `kubectl exec`.
pub struct KubectlExec {
    config: KubectlConfig,
    output_limit_bytes: usize,
}

impl KubectlExec {
    pub fn new(config: KubectlConfig, output_limit_bytes: usize) -> Self {
        Self {
            config,
            output_limit_bytes,
        }
    }

    fn command(&self, node: &NodeHandle, invocation: &Invocation) -> Command {
        let mut cmd = Command::new(&self.config.binary);
        if let Some(namespace) = &self.config.namespace {
            cmd.arg("--namespace").arg(namespace);
        }
        cmd.arg("exec").arg(node.name());
        if let Some(container) = &self.config.container {
            cmd.arg("-c").arg(container);
        }
        cmd.arg("--")
            .arg(&self.config.shell)
            .arg("-c")
            .arg(invocation.script());
        cmd
    }
}

impl RemoteExec for KubectlExec {
    #[instrument(skip_all, fields(node = %node))]
    fn run(&self, node: &NodeHandle, invocation: &Invocation) -> Result<InvocationOutcome> {
        let cmd = self.command(node, invocation);
        let output = run_command_with_timeout(cmd, invocation.timeout, self.output_limit_bytes)
            .with_context(|| format!("kubectl exec {node}"))?;
        debug!(timed_out = output.timed_out, exit_code = ?output.status.code(), "kubectl exec finished");
        Ok(InvocationOutcome::from_output(&output))
    }
}

/// Transport that runs every node's command as a local shell process.
///
/// The node handle is exported as [`LOCAL_NODE_VAR`] so commands can tell
/// their pseudo-nodes apart.
pub struct LocalExec {
    config: LocalConfig,
    output_limit_bytes: usize,
}

impl LocalExec {
    pub fn new(config: LocalConfig, output_limit_bytes: usize) -> Self {
        Self {
            config,
            output_limit_bytes,
        }
    }
}

impl RemoteExec for LocalExec {
    #[instrument(skip_all, fields(node = %node))]
    fn run(&self, node: &NodeHandle, invocation: &Invocation) -> Result<InvocationOutcome> {
        let mut cmd = Command::new(&self.config.shell);
        cmd.arg("-c")
            .arg(invocation.script())
            .env(LOCAL_NODE_VAR, node.name());
        let output = run_command_with_timeout(cmd, invocation.timeout, self.output_limit_bytes)
            .with_context(|| format!("{} -c on {node}", self.config.shell))?;
        debug!(timed_out = output.timed_out, exit_code = ?output.status.code(), "local command finished");
        Ok(InvocationOutcome::from_output(&output))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::OsStr;
    use std::path::Path;
    use std::time::Instant;

    use crate::test_support::fake_binary;

    fn invocation(command: &str, env_prefix: &str, timeout: Option<u64>) -> Invocation {
        Invocation {
            command: command.to_string(),
            env_prefix: env_prefix.to_string(),
            timeout: timeout.map(Duration::from_secs),
        }
    }

    #[test]
    fn split_lines_strips_trailing_newline_and_cr() {
        assert_eq!(split_lines("a\nb\n"), vec!["a", "b"]);
        assert_eq!(split_lines("a\r\nb"), vec!["a", "b"]);
        assert_eq!(split_lines("a\n\nb\n"), vec!["a", "", "b"]);
        assert!(split_lines("").is_empty());
    }

    #[test]
    fn kubectl_command_targets_pod_with_prefixed_script() {
        let exec = KubectlExec::new(
            KubectlConfig {
                namespace: Some("ipfs".to_string()),
                container: Some("node".to_string()),
                ..KubectlConfig::default()
            },
            1000,
        );
        let cmd = exec.command(
            &NodeHandle::new("pod-a"),
            &invocation("ipfs cat $HASH", "HASH=\"Qm1\" && ", None),
        );
        assert_eq!(cmd.get_program(), OsStr::new("kubectl"));
        let args: Vec<&OsStr> = cmd.get_args().collect();
        assert_eq!(
            args,
            vec![
                "--namespace",
                "ipfs",
                "exec",
                "pod-a",
                "-c",
                "node",
                "--",
                "bash",
                "-c",
                "HASH=\"Qm1\" && ipfs cat $HASH",
            ]
        );
    }

    #[test]
    fn local_exec_sees_prefix_variables_and_node() {
        let exec = LocalExec::new(LocalConfig::default(), 1000);
        let outcome = exec
            .run(
                &NodeHandle::new("local-2"),
                &invocation("echo \"$HASH\"; echo $PODRUNNER_NODE", "HASH=\"a b\" && ", None),
            )
            .expect("run");
        assert_eq!(
            outcome,
            InvocationOutcome::Completed {
                lines: vec!["a b".to_string(), "local-2".to_string()],
                stderr: String::new(),
                exit_code: Some(0),
            }
        );
    }

    #[test]
    fn local_exec_reports_timeouts() {
        let exec = LocalExec::new(LocalConfig::default(), 1000);
        let outcome = exec
            .run(&NodeHandle::new("local-1"), &invocation("sleep 5", "", Some(1)))
            .expect("run");
        assert_eq!(outcome, InvocationOutcome::TimedOut);
    }

    #[test]
    fn local_exec_times_out_when_background_job_holds_output() {
        let exec = LocalExec::new(LocalConfig::default(), 1000);
        let started = Instant::now();
        let outcome = exec
            .run(
                &NodeHandle::new("local-1"),
                &invocation("sleep 4 & echo started", "", Some(1)),
            )
            .expect("run");
        assert_eq!(outcome, InvocationOutcome::TimedOut);
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    /// Fake `kubectl exec POD -- SHELL -c SCRIPT` that runs the script locally.
    fn fake_kubectl_exec(dir: &Path) -> KubectlExec {
        let binary = fake_binary(
            dir,
            "kubectl",
            r#"[ "$1" = exec ] || exit 1
echo "$2" > "$(dirname "$0")/pod"
shift 3
exec "$@""#,
        )
        .expect("fake kubectl");
        KubectlExec::new(
            KubectlConfig {
                binary: binary.to_string_lossy().into_owned(),
                shell: "sh".to_string(),
                ..KubectlConfig::default()
            },
            1000,
        )
    }

    #[test]
    fn kubectl_exec_captures_lines_from_pod() {
        let temp = tempfile::tempdir().expect("tempdir");
        let exec = fake_kubectl_exec(temp.path());
        let outcome = exec
            .run(
                &NodeHandle::new("ipfs-a"),
                &invocation("printf '%s\\r\\n' \"$HASH\" done", "HASH=\"Qm1\" && ", Some(5)),
            )
            .expect("run");
        assert_eq!(
            outcome,
            InvocationOutcome::Completed {
                lines: vec!["Qm1".to_string(), "done".to_string()],
                stderr: String::new(),
                exit_code: Some(0),
            }
        );
        let pod = std::fs::read_to_string(temp.path().join("pod")).expect("pod");
        assert_eq!(pod.trim(), "ipfs-a");
    }

    #[test]
    fn kubectl_exec_maps_timeout() {
        let temp = tempfile::tempdir().expect("tempdir");
        let exec = fake_kubectl_exec(temp.path());
        let started = Instant::now();
        let outcome = exec
            .run(&NodeHandle::new("ipfs-a"), &invocation("sleep 5; echo late", "", Some(1)))
            .expect("run");
        assert_eq!(outcome, InvocationOutcome::TimedOut);
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[test]
    fn kubectl_exec_reports_missing_binary_as_transport_error() {
        let exec = KubectlExec::new(
            KubectlConfig {
                binary: "/nonexistent/kubectl".to_string(),
                ..KubectlConfig::default()
            },
            1000,
        );
        let err = exec
            .run(&NodeHandle::new("ipfs-a"), &invocation("true", "", None))
            .expect_err("spawn fails");
        assert!(format!("{err:#}").contains("kubectl exec ipfs-a"));
    }

    #[test]
    fn local_exec_keeps_stderr_separate() {
        let exec = LocalExec::new(LocalConfig::default(), 1000);
        let outcome = exec
            .run(
                &NodeHandle::new("local-1"),
                &invocation("echo ok; echo warn >&2; exit 2", "", None),
            )
            .expect("run");
        assert_eq!(
            outcome,
            InvocationOutcome::Completed {
                lines: vec!["ok".to_string()],
                stderr: "warn\n".to_string(),
                exit_code: Some(2),
            }
        );
    }
}
