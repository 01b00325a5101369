//! Test-only helpers: definition builders and scripted collaborators.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Result, anyhow, bail};

use crate::core::definition::{Assertion, OutputBinding, Step, TestConfig, TestDefinition};
use crate::core::summary::Counts;
use crate::io::pool::{NodeHandle, NodePool};
use crate::io::remote::{Invocation, InvocationOutcome, RemoteExec};

/// Create a step with no outputs, assertions or timeout.
pub fn step(name: &str, on_node: usize, end_node: usize, cmd: &str) -> Step {
    Step {
        name: name.to_string(),
        on_node,
        end_node,
        cmd: cmd.to_string(),
        timeout: 0,
        outputs: Vec::new(),
        inputs: Vec::new(),
        assertions: Vec::new(),
        write_to_file: None,
    }
}

/// Create a definition expecting all-zero counters and no grace period.
pub fn definition(nodes: usize, times: u32, steps: Vec<Step>) -> TestDefinition {
    TestDefinition {
        name: "scripted".to_string(),
        config: TestConfig {
            nodes,
            selector: "app=test".to_string(),
            times,
            grace_shutdown: 0,
            expected: Counts::default(),
        },
        steps,
    }
}

pub fn output(line: usize, save_to: &str) -> OutputBinding {
    OutputBinding {
        line,
        save_to: save_to.to_string(),
        save_to_file: None,
    }
}

pub fn assertion(line: usize, should_be_equal_to: &str) -> Assertion {
    Assertion {
        line,
        should_be_equal_to: should_be_equal_to.to_string(),
    }
}

/// A successful invocation that printed `values`, one per line.
pub fn lines(values: &[&str]) -> InvocationOutcome {
    InvocationOutcome::completed(values.iter().map(|value| value.to_string()).collect())
}

/// Write an executable `sh` script standing in for an external binary such
/// as `kubectl`. Scripts can keep state next to themselves via `$(dirname "$0")`.
pub fn fake_binary(dir: &Path, name: &str, body: &str) -> Result<PathBuf> {
    let path = dir.join(name);
    fs::write(&path, format!("#!/bin/sh\n{body}\n"))?;
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755))?;
    Ok(path)
}

/// Handles `node-1..=node-N`.
pub fn handles(count: usize) -> Vec<NodeHandle> {
    (1..=count)
        .map(|index| NodeHandle::new(format!("node-{index}")))
        .collect()
}

type Reply<'a> = dyn Fn(&NodeHandle, &Invocation) -> Result<InvocationOutcome> + Sync + 'a;

/// Transport that answers every invocation with a closure and records calls.
pub struct ScriptedExec<'a> {
    reply: Box<Reply<'a>>,
    calls: Mutex<Vec<(NodeHandle, Invocation)>>,
}

impl<'a> ScriptedExec<'a> {
    pub fn new(
        reply: impl Fn(&NodeHandle, &Invocation) -> Result<InvocationOutcome> + Sync + 'a,
    ) -> Self {
        Self {
            reply: Box::new(reply),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Recorded `(node, invocation)` pairs in call order.
    pub fn calls(&self) -> Vec<(NodeHandle, Invocation)> {
        self.calls.lock().map(|calls| calls.clone()).unwrap_or_default()
    }
}

impl RemoteExec for ScriptedExec<'_> {
    fn run(&self, node: &NodeHandle, invocation: &Invocation) -> Result<InvocationOutcome> {
        self.calls
            .lock()
            .map_err(|_| anyhow!("scripted exec lock poisoned"))?
            .push((node.clone(), invocation.clone()));
        (self.reply)(node, invocation)
    }
}

/// Pool whose ready count jumps to the target on `scale_to`.
pub struct ScriptedPool {
    ready: Mutex<usize>,
    failure: Option<String>,
    scale_calls: Mutex<Vec<usize>>,
    list_calls: Mutex<usize>,
}

impl ScriptedPool {
    pub fn new(ready: usize) -> Self {
        Self {
            ready: Mutex::new(ready),
            failure: None,
            scale_calls: Mutex::new(Vec::new()),
            list_calls: Mutex::new(0),
        }
    }

    /// Pool whose every operation fails with `message`.
    pub fn failing(message: &str) -> Self {
        Self {
            failure: Some(message.to_string()),
            ..Self::new(0)
        }
    }

    pub fn scale_calls(&self) -> Vec<usize> {
        self.scale_calls.lock().map(|calls| calls.clone()).unwrap_or_default()
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.lock().map(|calls| *calls).unwrap_or_default()
    }

    fn check(&self) -> Result<()> {
        if let Some(message) = &self.failure {
            bail!("{message}");
        }
        Ok(())
    }

    fn ready(&self) -> Result<usize> {
        self.ready
            .lock()
            .map(|ready| *ready)
            .map_err(|_| anyhow!("scripted pool lock poisoned"))
    }
}

impl NodePool for ScriptedPool {
    fn ready_count(&self) -> Result<usize> {
        self.check()?;
        self.ready()
    }

    fn scale_to(&self, target: usize) -> Result<()> {
        self.check()?;
        if let Ok(mut calls) = self.scale_calls.lock() {
            calls.push(target);
        }
        if let Ok(mut ready) = self.ready.lock() {
            *ready = target;
        }
        Ok(())
    }

    fn list_handles(&self) -> Result<Vec<NodeHandle>> {
        self.check()?;
        if let Ok(mut calls) = self.list_calls.lock() {
            *calls += 1;
        }
        Ok(handles(self.ready()?))
    }
}
