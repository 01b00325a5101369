//! Test definition model and its semantic invariants.
//!
//! Definitions are human-authored YAML (see `io::definition` for loading).
//! Everything here is immutable once validated.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::LazyLock;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use regex::Regex;
use serde::Deserialize;

use crate::core::summary::Counts;

/// A named test: cluster requirements plus the ordered steps of one repetition.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct TestDefinition {
    pub name: String,
    pub config: TestConfig,
    pub steps: Vec<Step>,
}

/// Cluster requirements and expected outcome for a test.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct TestConfig {
    /// Minimum number of ready nodes.
    pub nodes: usize,
    /// Label selector identifying the nodes of the service under test.
    #[serde(default)]
    pub selector: String,
    /// How many times the full step sequence runs.
    #[serde(default = "default_times")]
    pub times: u32,
    /// Seconds to wait after the last repetition before evaluating.
    #[serde(default)]
    pub grace_shutdown: u64,
    pub expected: Counts,
}

fn default_times() -> u32 {
    1
}

impl TestConfig {
    pub fn grace_period(&self) -> Duration {
        Duration::from_secs(self.grace_shutdown)
    }
}

/// One command addressed to an inclusive, 1-based range of nodes.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct Step {
    pub name: String,
    pub on_node: usize,
    /// Zero (or absent) means "same as `on_node`".
    #[serde(default)]
    pub end_node: usize,
    pub cmd: String,
    /// Seconds; zero means no timeout.
    #[serde(default)]
    pub timeout: u64,
    #[serde(default)]
    pub outputs: Vec<OutputBinding>,
    /// Variables the command expects from earlier steps.
    #[serde(default)]
    pub inputs: Vec<String>,
    #[serde(default)]
    pub assertions: Vec<Assertion>,
    /// Append every node's raw output to this file.
    #[serde(default)]
    pub write_to_file: Option<PathBuf>,
}

impl Step {
    /// Last node of the range, honoring the "zero means `on_node`" default.
    pub fn last_node(&self) -> usize {
        if self.end_node == 0 {
            self.on_node
        } else {
            self.end_node
        }
    }

    /// Number of nodes the step is dispatched to.
    pub fn node_count(&self) -> usize {
        self.last_node().saturating_sub(self.on_node) + 1
    }

    /// Per-invocation timeout, `None` when unlimited.
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout > 0).then(|| Duration::from_secs(self.timeout))
    }
}

/// Capture output line `line` into variable `save_to`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct OutputBinding {
    pub line: usize,
    pub save_to: String,
    /// Also append the captured value to this file.
    #[serde(default)]
    pub save_to_file: Option<PathBuf>,
}

/// Output line `line` must equal `should_be_equal_to`, either a literal or
/// the name of a captured variable.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct Assertion {
    pub line: usize,
    pub should_be_equal_to: String,
}

impl TestDefinition {
    /// Check semantic invariants not expressible in the YAML shape:
    /// - non-empty name, steps, step names and commands
    /// - `nodes > 0`, `times > 0`
    /// - `1 <= on_node <= end_node <= nodes`
    /// - output variables are shell identifiers bound exactly once
    /// - `inputs` only name variables bound by an earlier step
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            bail!("name must be non-empty");
        }
        if self.config.nodes == 0 {
            bail!("config.nodes must be > 0");
        }
        if self.config.times == 0 {
            bail!("config.times must be > 0");
        }
        if self.steps.is_empty() {
            bail!("steps must be a non-empty array");
        }
        let mut bound = HashSet::new();
        for (index, step) in self.steps.iter().enumerate() {
            validate_step(step, self.config.nodes, &mut bound)
                .with_context(|| format!("steps[{}] ({}) invalid", index, step.name))?;
        }
        Ok(())
    }

    /// Total number of node invocations one repetition performs.
    pub fn invocations_per_repetition(&self) -> usize {
        self.steps.iter().map(Step::node_count).sum()
    }
}

fn validate_step(step: &Step, nodes: usize, bound: &mut HashSet<String>) -> Result<()> {
    if step.name.trim().is_empty() {
        bail!("name must be non-empty");
    }
    if step.cmd.trim().is_empty() {
        bail!("cmd must be non-empty");
    }
    if step.on_node == 0 {
        bail!("on_node must be >= 1 (nodes are 1-based)");
    }
    if step.on_node > step.last_node() {
        bail!(
            "on_node {} must not exceed end_node {}",
            step.on_node,
            step.end_node
        );
    }
    if step.last_node() > nodes {
        bail!(
            "node range {}..={} exceeds config.nodes {}",
            step.on_node,
            step.last_node(),
            nodes
        );
    }
    for input in &step.inputs {
        if !bound.contains(input) {
            bail!("input {} is not bound by an earlier step", input);
        }
    }
    for output in &step.outputs {
        if !is_shell_identifier(&output.save_to) {
            bail!(
                "outputs.save_to {:?} must match [A-Za-z_][A-Za-z0-9_]*",
                output.save_to
            );
        }
        if !bound.insert(output.save_to.clone()) {
            bail!("variable {} is bound more than once", output.save_to);
        }
        if let Some(path) = &output.save_to_file
            && path.as_os_str().is_empty()
        {
            bail!("outputs.save_to_file must be non-empty when set");
        }
    }
    if let Some(path) = &step.write_to_file
        && path.as_os_str().is_empty()
    {
        bail!("write_to_file must be non-empty when set");
    }
    Ok(())
}

/// True if `name` can be assigned in a POSIX shell.
pub fn is_shell_identifier(name: &str) -> bool {
    static IDENT_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap());
    IDENT_RE.is_match(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{definition, step};

    #[test]
    fn end_node_defaults_to_on_node() {
        let single = step("one", 3, 0, "true");
        assert_eq!(single.last_node(), 3);
        assert_eq!(single.node_count(), 1);

        let range = step("range", 2, 5, "true");
        assert_eq!(range.node_count(), 4);
    }

    #[test]
    fn zero_timeout_means_unlimited() {
        let mut s = step("s", 1, 0, "true");
        assert_eq!(s.timeout(), None);
        s.timeout = 7;
        assert_eq!(s.timeout(), Some(Duration::from_secs(7)));
    }

    #[test]
    fn accepts_valid_definition() {
        let mut producer = step("produce", 1, 0, "echo abc123");
        producer.outputs.push(OutputBinding {
            line: 0,
            save_to: "HASH".to_string(),
            save_to_file: None,
        });
        let mut consumer = step("consume", 2, 3, "echo $HASH");
        consumer.inputs.push("HASH".to_string());
        let def = definition(3, 1, vec![producer, consumer]);
        def.validate().expect("valid");
        assert_eq!(def.invocations_per_repetition(), 3);
    }

    #[test]
    fn rejects_range_outside_pool() {
        let def = definition(2, 1, vec![step("s", 1, 3, "true")]);
        let err = def.validate().expect_err("range too wide");
        assert!(format!("{err:#}").contains("exceeds config.nodes"));

        let def = definition(2, 1, vec![step("s", 0, 0, "true")]);
        assert!(def.validate().is_err());

        let def = definition(4, 1, vec![step("s", 3, 2, "true")]);
        let err = def.validate().expect_err("inverted range");
        assert!(format!("{err:#}").contains("must not exceed end_node"));
    }

    #[test]
    fn rejects_rebinding_a_variable() {
        let mut first = step("first", 1, 0, "echo a");
        first.outputs.push(OutputBinding {
            line: 0,
            save_to: "X".to_string(),
            save_to_file: None,
        });
        let mut second = first.clone();
        second.name = "second".to_string();
        let def = definition(1, 1, vec![first, second]);
        let err = def.validate().expect_err("rebinding");
        assert!(format!("{err:#}").contains("bound more than once"));
    }

    #[test]
    fn rejects_unbound_inputs_and_bad_identifiers() {
        let mut s = step("s", 1, 0, "echo $MISSING");
        s.inputs.push("MISSING".to_string());
        let err = definition(1, 1, vec![s]).validate().expect_err("unbound");
        assert!(format!("{err:#}").contains("not bound by an earlier step"));

        let mut s = step("s", 1, 0, "echo");
        s.outputs.push(OutputBinding {
            line: 0,
            save_to: "not-a-var".to_string(),
            save_to_file: None,
        });
        assert!(definition(1, 1, vec![s]).validate().is_err());
    }

    #[test]
    fn rejects_zero_times_and_empty_steps() {
        let mut def = definition(1, 1, vec![step("s", 1, 0, "true")]);
        def.config.times = 0;
        assert!(def.validate().is_err());

        let def = definition(1, 1, Vec::new());
        let err = def.validate().expect_err("no steps");
        assert!(err.to_string().contains("steps"));
    }

    #[test]
    fn shell_identifiers() {
        assert!(is_shell_identifier("HASH"));
        assert!(is_shell_identifier("_x1"));
        assert!(!is_shell_identifier("1x"));
        assert!(!is_shell_identifier(""));
        assert!(!is_shell_identifier("A B"));
    }
}
